// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! BlueZ backend: raw ATT over an L2CAP socket on the LE fixed channel.
//!
//! Each link runs in its own task that owns the socket. Client procedures
//! are taken from a queue and run one at a time; while a procedure waits
//! for its response, inbound unsolicited PDUs are still forwarded and
//! outbound control traffic (confirmations, error responses, write
//! commands) is still sent.

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use bluer::l2cap::{SeqPacket, Security, SecurityLevel as BtSecurityLevel, Socket, SocketAddr};
use bluer::{Address, AddressType};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info, warn};

use super::att::{self, AttErrorCode, ATT_CID, ATT_DEFAULT_LE_MTU};
use super::procedures::{self, Bearer};
use super::{
    AddressKind, Completion, ConnectParams, Connector, EventSender, Link, LinkEvent,
    LinkEventKind, LinkId, Request, SecurityLevel, TransportError,
};
use crate::config::Config;
use crate::events;

/// Largest PDU the receive buffer accepts.
const MAX_PDU: usize = u16::MAX as usize;

fn bt_security(level: SecurityLevel) -> Security {
    let level = match level {
        SecurityLevel::Low => BtSecurityLevel::Low,
        SecurityLevel::Medium => BtSecurityLevel::Medium,
        SecurityLevel::High => BtSecurityLevel::High,
    };
    Security { level, key_size: 0 }
}

fn bt_address_type(kind: AddressKind) -> AddressType {
    match kind {
        AddressKind::Public => AddressType::LePublic,
        AddressKind::Random => AddressType::LeRandom,
    }
}

/// Opens ATT channels through the kernel's L2CAP sockets.
pub struct L2capConnector {
    source: Address,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl L2capConnector {
    /// Resolve the local adapter named in the config, or bind to any adapter.
    pub async fn new(config: &Config) -> Result<Self> {
        let source = match &config.adapter {
            Some(name) => {
                let session = bluer::Session::new()
                    .await
                    .context("Failed to create BlueZ session")?;
                let adapter = session
                    .adapter(name)
                    .with_context(|| format!("Bluetooth adapter {} not found", name))?;

                if !adapter.is_powered().await? {
                    info!("Powering on Bluetooth adapter {}...", name);
                    adapter.set_powered(true).await?;
                }

                let address = adapter.address().await?;
                info!("Using Bluetooth adapter: {} ({})", name, address);
                address
            }
            None => {
                debug!("No adapter configured, letting the kernel pick one");
                Address::any()
            }
        };

        Ok(Self {
            source,
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
        })
    }

    fn open_socket(&self, params: &ConnectParams) -> io::Result<Socket<SeqPacket>> {
        let socket = Socket::<SeqPacket>::new_seq_packet()?;
        socket.bind(SocketAddr {
            addr: self.source,
            addr_type: AddressType::LePublic,
            psm: 0,
            cid: ATT_CID,
        })?;
        socket.set_security(bt_security(params.security))?;
        Ok(socket)
    }
}

impl Connector for L2capConnector {
    type Link = L2capLink;

    fn connect(
        &mut self,
        id: LinkId,
        params: &ConnectParams,
        events: EventSender,
    ) -> Result<L2capLink, TransportError> {
        let socket = self.open_socket(params)?;
        let target = SocketAddr {
            addr: params.address,
            addr_type: bt_address_type(params.kind),
            psm: params.psm,
            cid: ATT_CID,
        };

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let pending = PendingLink {
            id,
            events,
            control: control_rx,
            request_timeout: self.request_timeout,
        };

        info!("Connecting to {} (link {})", params.address, id);
        tokio::spawn(pending.run(socket, target, self.connect_timeout, request_rx));

        Ok(L2capLink {
            requests: request_tx,
            control: control_tx,
        })
    }
}

#[derive(Debug)]
enum Control {
    Register(Vec<u8>),
    Send(Vec<u8>),
    Security(SecurityLevel),
}

/// Handle held by the connection. Dropping it closes both queues, which
/// stops the link task and closes the socket.
pub struct L2capLink {
    requests: mpsc::UnboundedSender<Request>,
    control: mpsc::UnboundedSender<Control>,
}

impl L2capLink {
    fn control(&self, control: Control) {
        if let Err(err) = self.control.send(control) {
            debug!("Link task already stopped, dropping {:?}", err.0);
        }
    }
}

impl Link for L2capLink {
    fn register(&mut self, opcodes: &[u8]) {
        self.control(Control::Register(opcodes.to_vec()));
    }

    fn submit(&mut self, request: Request) {
        if let Err(err) = self.requests.send(request) {
            debug!("Link task already stopped, dropping {:?}", err.0);
        }
    }

    fn write_command(&mut self, handle: u16, value: &[u8]) {
        self.control(Control::Send(att::write_cmd(handle, value)));
    }

    fn send(&mut self, pdu: Vec<u8>) {
        self.control(Control::Send(pdu));
    }

    fn set_security(&mut self, level: SecurityLevel) {
        self.control(Control::Security(level));
    }
}

fn emit(events: &EventSender, id: LinkId, kind: LinkEventKind) {
    if events.send(LinkEvent { link: id, kind }).is_err() {
        debug!("Event receiver gone, dropping event from link {}", id);
    }
}

/// Link task state before the socket is connected.
struct PendingLink {
    id: LinkId,
    events: EventSender,
    control: mpsc::UnboundedReceiver<Control>,
    request_timeout: Duration,
}

impl PendingLink {
    async fn run(
        mut self,
        socket: Socket<SeqPacket>,
        target: SocketAddr,
        connect_timeout: Duration,
        requests: mpsc::UnboundedReceiver<Request>,
    ) {
        let connecting = time::timeout(connect_timeout, socket.connect(target));
        tokio::pin!(connecting);

        let stream = loop {
            tokio::select! {
                result = &mut connecting => match result {
                    Ok(Ok(stream)) => break stream,
                    Ok(Err(err)) => {
                        warn!("Connect error on link {}: {}", self.id, err);
                        emit(&self.events, self.id, LinkEventKind::ConnectFailed(err.into()));
                        return;
                    }
                    Err(_) => {
                        warn!("Connect timed out on link {}", self.id);
                        emit(&self.events, self.id, LinkEventKind::ConnectFailed(TransportError::Timeout));
                        return;
                    }
                },
                control = self.control.recv() => match control {
                    Some(control) => debug!("Ignoring {:?} while connecting", control),
                    None => {
                        debug!("Link {} released while connecting", self.id);
                        return;
                    }
                },
            }
        };

        info!("Link {} connected", self.id);
        let channel = AttChannel::new(
            self.id,
            stream,
            self.events,
            self.control,
            self.request_timeout,
        );
        channel.serve(requests).await;
    }
}

/// Whole-PDU transport under an [`AttChannel`].
pub(crate) trait PacketIo {
    async fn send_pdu(&mut self, pdu: &[u8]) -> io::Result<()>;

    /// Receive one PDU into `buf`. `Ok(0)` means the peer hung up.
    async fn recv_pdu(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn set_security_level(&self, level: SecurityLevel) -> io::Result<()>;
}

impl PacketIo for SeqPacket {
    async fn send_pdu(&mut self, pdu: &[u8]) -> io::Result<()> {
        SeqPacket::send(self, pdu).await.map(|_| ())
    }

    async fn recv_pdu(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        SeqPacket::recv(self, buf).await
    }

    fn set_security_level(&self, level: SecurityLevel) -> io::Result<()> {
        self.as_ref().set_security(bt_security(level))
    }
}

/// A connected ATT bearer.
struct AttChannel<P> {
    id: LinkId,
    stream: P,
    events: EventSender,
    control: mpsc::UnboundedReceiver<Control>,
    registered: Vec<u8>,
    mtu: u16,
    request_timeout: Duration,
    buf: Vec<u8>,
    /// Set once a transaction failed in a way that leaves the bearer unusable.
    broken: bool,
}

impl<P: PacketIo> AttChannel<P> {
    /// Wrap a connected stream and report the link as connected.
    ///
    /// Server-role opcodes are forwarded from the start so nothing the peer
    /// sends before the connection registers is lost.
    fn new(
        id: LinkId,
        stream: P,
        events: EventSender,
        control: mpsc::UnboundedReceiver<Control>,
        request_timeout: Duration,
    ) -> Self {
        let channel = Self {
            id,
            stream,
            events,
            control,
            registered: events::registered_opcodes(),
            mtu: ATT_DEFAULT_LE_MTU,
            request_timeout,
            buf: vec![0u8; MAX_PDU],
            broken: false,
        };
        channel.emit(LinkEventKind::Connected {
            mtu: ATT_DEFAULT_LE_MTU,
        });
        channel
    }

    async fn serve(mut self, mut requests: mpsc::UnboundedReceiver<Request>) {
        let hangup = loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => {
                        debug!("Link {} running {:?}", self.id, request);
                        let completion = procedures::execute(&mut self, request).await;
                        self.emit(LinkEventKind::Completed(completion));
                        if self.broken {
                            break None;
                        }
                    }
                    None => return,
                },
                control = self.control.recv() => match control {
                    Some(control) => {
                        if let Err(err) = self.apply(control).await {
                            break Some(err);
                        }
                    }
                    None => return,
                },
                received = self.stream.recv_pdu(&mut self.buf) => match received {
                    Ok(0) => break None,
                    Ok(len) => {
                        if let Err(err) = self.forward(len).await {
                            break Some(err);
                        }
                    }
                    Err(err) => break Some(TransportError::Io(err)),
                },
            }
        };

        match &hangup {
            Some(err) => info!("Link {} closed: {}", self.id, err),
            None => info!("Link {} closed", self.id),
        }
        self.emit(LinkEventKind::Closed(hangup));
    }

    fn emit(&self, kind: LinkEventKind) {
        emit(&self.events, self.id, kind);
    }

    /// Hand an inbound PDU to the connection if its opcode is registered.
    /// Any other request is refused here so the peer is never left waiting.
    async fn forward(&mut self, len: usize) -> Result<(), TransportError> {
        let opcode = self.buf[0];
        if self.registered.contains(&opcode) {
            self.emit(LinkEventKind::Pdu(self.buf[..len].to_vec()));
        } else if att::is_request(opcode) {
            debug!("Refusing unregistered request {:#04x}", opcode);
            let reply = att::error_rsp(opcode, 0, AttErrorCode::REQUEST_NOT_SUPPORTED);
            self.stream.send_pdu(&reply).await?;
        } else {
            debug!("Dropping unregistered PDU with opcode {:#04x}", opcode);
        }
        Ok(())
    }

    async fn apply(&mut self, control: Control) -> Result<(), TransportError> {
        match control {
            Control::Register(opcodes) => self.registered = opcodes,
            Control::Send(pdu) => self.stream.send_pdu(&pdu).await?,
            Control::Security(level) => {
                let result = self
                    .stream
                    .set_security_level(level)
                    .map_err(TransportError::from);
                if let Err(err) = &result {
                    warn!("Failed to set security level {}: {}", level.as_str(), err);
                }
                self.emit(LinkEventKind::Completed(Completion::Security(result)));
            }
        }
        Ok(())
    }

    async fn exchange(&mut self, pdu: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        self.stream.send_pdu(&pdu).await?;

        let deadline = time::sleep(self.request_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => return Err(TransportError::Timeout),
                control = self.control.recv() => match control {
                    Some(control) => self.apply(control).await?,
                    None => return Err(TransportError::Closed),
                },
                received = self.stream.recv_pdu(&mut self.buf) => {
                    let len = received?;
                    if len == 0 {
                        return Err(TransportError::Closed);
                    }
                    if att::is_response(self.buf[0]) {
                        return Ok(self.buf[..len].to_vec());
                    }
                    self.forward(len).await?;
                }
            }
        }
    }
}

impl<P: PacketIo> Bearer for AttChannel<P> {
    async fn transact(&mut self, pdu: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        if self.broken {
            return Err(TransportError::Closed);
        }
        let result = self.exchange(pdu).await;
        if let Err(err) = &result {
            if err.is_fatal() {
                self.broken = true;
            }
        }
        result
    }

    fn mtu(&self) -> u16 {
        self.mtu
    }

    fn set_mtu(&mut self, mtu: u16) {
        self.mtu = mtu;
    }
}
