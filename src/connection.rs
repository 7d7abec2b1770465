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

//! The single peer connection and its state machine.
//!
//! [`Connection`] owns the transport link, validates every operation against
//! the current state and turns link events into response lines. Operations
//! that need the peer return as soon as the request is queued; the matching
//! response is written when [`Connection::handle_event`] sees the completion.

use std::io::{self, Write};

use bluer::Address;
use tracing::{debug, info, warn};

use crate::bluetooth::att::{ATT_DEFAULT_LE_MTU, ATT_MAX_VALUE_LEN};
use crate::bluetooth::{
    AddressKind, AttUuid, Completion, ConnectParams, Connector, EventSender, Link, LinkEvent,
    LinkEventKind, LinkId, Request, SecurityLevel, TransportError,
};
use crate::events;
use crate::wire::{tag, ErrorCode, Output, Response, ResponseKind};

/// Lifecycle of the peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disc",
            Self::Connecting => "tryconn",
            Self::Connected => "conn",
        }
    }
}

/// Destination of a connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub address: Address,
    /// The address exactly as the controller typed it.
    pub text: String,
    pub kind: AddressKind,
}

pub struct Connection<C: Connector, W: Write> {
    connector: C,
    events: EventSender,
    out: Output<W>,
    state: ConnState,
    /// Last destination, reused by a bare `conn`.
    peer: Option<Peer>,
    security: SecurityLevel,
    mtu: u16,
    mtu_exchanged: bool,
    link: Option<C::Link>,
    link_id: LinkId,
}

impl<C: Connector, W: Write> Connection<C, W> {
    /// Create a disconnected connection that writes responses to `writer`.
    pub fn new(connector: C, events: EventSender, writer: W, security: SecurityLevel) -> Self {
        Self {
            connector,
            events,
            out: Output::new(writer),
            state: ConnState::Disconnected,
            peer: None,
            security,
            mtu: 0,
            mtu_exchanged: false,
            link: None,
            link_id: 0,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnState {
        self.state
    }

    /// True once the link is up and requests can be submitted.
    pub fn is_connected(&self) -> bool {
        self.state == ConnState::Connected
    }

    /// ATT MTU in effect, 0 while disconnected.
    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    /// Security level used for the next connect or applied to the live link.
    pub fn security(&self) -> SecurityLevel {
        self.security
    }

    /// Response sink, for informational lines such as the help listing.
    pub fn output_mut(&mut self) -> &mut Output<W> {
        &mut self.out
    }

    /// Write the `stat` line for the current state.
    pub fn send_status(&mut self) -> io::Result<()> {
        let mut rsp = Response::new(ResponseKind::Status).sym(tag::CONN_STATE, self.state.as_str());
        if self.state != ConnState::Disconnected {
            if let Some(peer) = &self.peer {
                rsp = rsp.str(tag::DEVICE, &peer.text);
            }
        }
        let rsp = rsp
            .uint(tag::MTU, self.mtu)
            .str(tag::SEC_LEVEL, self.security.as_str());
        self.out.send(&rsp)
    }

    /// Write an `err` line with `code`.
    pub fn send_error(&mut self, code: ErrorCode) -> io::Result<()> {
        self.out.send(&Response::error(code))
    }

    /// Start connecting to `target`, or to the remembered peer.
    ///
    /// While a link exists this only reports the current status.
    pub fn connect(&mut self, target: Option<Peer>) -> io::Result<()> {
        if self.state != ConnState::Disconnected {
            debug!("Connect ignored in state {:?}", self.state);
            return self.send_status();
        }

        if let Some(target) = target {
            self.peer = Some(target);
        }
        let Some(peer) = &self.peer else {
            return self.send_error(ErrorCode::BadParam);
        };

        let params = ConnectParams {
            address: peer.address,
            kind: peer.kind,
            security: self.security,
            psm: 0,
        };
        self.link_id += 1;

        match self
            .connector
            .connect(self.link_id, &params, self.events.clone())
        {
            Ok(link) => {
                info!("Connecting to {} ({:?})", params.address, params.kind);
                self.link = Some(link);
                self.mtu = ATT_DEFAULT_LE_MTU;
                self.mtu_exchanged = false;
                self.set_state(ConnState::Connecting)
            }
            Err(err) => {
                warn!("Could not start connecting to {}: {}", params.address, err);
                self.fail_connect()
            }
        }
    }

    /// Drop the link. Always reports the resulting status.
    pub fn disconnect(&mut self) -> io::Result<()> {
        self.release();
        self.send_status()
    }

    /// Disconnect on exit; silent when nothing is connected.
    pub fn shutdown(&mut self) -> io::Result<()> {
        if self.state == ConnState::Disconnected {
            return Ok(());
        }
        self.disconnect()
    }

    /// Discover all primary services, or only those with `uuid`.
    pub fn discover_services(&mut self, uuid: Option<AttUuid>) -> io::Result<()> {
        self.submit(Request::DiscoverPrimary { uuid })
    }

    /// Discover characteristic declarations in `[start, end]`.
    pub fn discover_characteristics(
        &mut self,
        start: u16,
        end: u16,
        uuid: Option<AttUuid>,
    ) -> io::Result<()> {
        self.submit(Request::DiscoverCharacteristics { start, end, uuid })
    }

    /// List attribute handles and types in `[start, end]`.
    pub fn discover_descriptors(&mut self, start: u16, end: u16) -> io::Result<()> {
        self.submit(Request::DiscoverDescriptors { start, end })
    }

    /// Read the value at `handle`, following up with blob reads for long values.
    pub fn read(&mut self, handle: u16) -> io::Result<()> {
        if handle == 0 {
            return self.send_error(ErrorCode::BadParam);
        }
        self.submit(Request::Read { handle })
    }

    /// Write with response; long values go out as a prepared write.
    pub fn write(&mut self, handle: u16, value: Vec<u8>) -> io::Result<()> {
        if handle == 0 || value.is_empty() || value.len() > ATT_MAX_VALUE_LEN {
            return self.send_error(ErrorCode::BadParam);
        }
        self.submit(Request::Write { handle, value })
    }

    /// Write without response. Acknowledged as soon as it is queued.
    pub fn write_command(&mut self, handle: u16, value: &[u8]) -> io::Result<()> {
        if !self.is_connected() {
            return self.send_error(ErrorCode::BadState);
        }
        let max = usize::from(self.mtu.saturating_sub(3));
        if handle == 0 || value.is_empty() || value.len() > max {
            return self.send_error(ErrorCode::BadParam);
        }
        if let Some(link) = self.link.as_mut() {
            link.write_command(handle, value);
        }
        self.out.send(&Response::new(ResponseKind::Write))
    }

    /// Remember the level; apply it to the live link when connected.
    pub fn set_security(&mut self, level: SecurityLevel) -> io::Result<()> {
        self.security = level;
        match (self.state, self.link.as_mut()) {
            (ConnState::Connected, Some(link)) => {
                debug!("Applying security level {}", level.as_str());
                link.set_security(level);
                Ok(())
            }
            _ => self.send_status(),
        }
    }

    /// MTU exchange is allowed once per connection.
    pub fn exchange_mtu(&mut self, mtu: u16) -> io::Result<()> {
        if !self.is_connected() || self.mtu_exchanged {
            return self.send_error(ErrorCode::BadState);
        }
        if mtu < ATT_DEFAULT_LE_MTU {
            return self.send_error(ErrorCode::BadParam);
        }
        self.mtu_exchanged = true;
        self.submit(Request::ExchangeMtu { mtu })
    }

    /// Apply one event from the link. Events from a released link are ignored.
    pub fn handle_event(&mut self, event: LinkEvent) -> io::Result<()> {
        if event.link != self.link_id || self.link.is_none() {
            debug!("Ignoring event from stale link {}", event.link);
            return Ok(());
        }

        match event.kind {
            LinkEventKind::Connected { mtu } => {
                if self.state != ConnState::Connecting {
                    warn!("Unexpected connect completion in state {:?}", self.state);
                    return Ok(());
                }
                if let Some(link) = self.link.as_mut() {
                    link.register(&events::registered_opcodes());
                }
                self.mtu = mtu.max(ATT_DEFAULT_LE_MTU);
                info!("Connected, MTU {}", self.mtu);
                self.set_state(ConnState::Connected)
            }
            LinkEventKind::ConnectFailed(err) => {
                warn!("Connect failed: {}", err);
                self.fail_connect()
            }
            LinkEventKind::Completed(completion) => self.complete(completion),
            LinkEventKind::Pdu(pdu) => {
                let routed = events::route(&pdu);
                if let (Some(reply), Some(link)) = (routed.reply, self.link.as_mut()) {
                    link.send(reply);
                }
                match routed.response {
                    Some(rsp) => self.out.send(&rsp),
                    None => Ok(()),
                }
            }
            LinkEventKind::Closed(err) => {
                match &err {
                    Some(err) => info!("Link closed: {}", err),
                    None => info!("Link closed by peer"),
                }
                if self.state == ConnState::Connecting {
                    self.fail_connect()
                } else {
                    self.disconnect()
                }
            }
        }
    }

    fn set_state(&mut self, state: ConnState) -> io::Result<()> {
        self.state = state;
        self.send_status()
    }

    fn release(&mut self) {
        if self.link.take().is_some() {
            debug!("Released link {}", self.link_id);
        }
        self.state = ConnState::Disconnected;
        self.mtu = 0;
        self.mtu_exchanged = false;
    }

    fn fail_connect(&mut self) -> io::Result<()> {
        self.release();
        self.send_status()?;
        self.send_error(ErrorCode::ConnFail)
    }

    fn submit(&mut self, request: Request) -> io::Result<()> {
        match (self.state, self.link.as_mut()) {
            (ConnState::Connected, Some(link)) => {
                debug!("Submitting {:?}", request);
                link.submit(request);
                Ok(())
            }
            _ => self.send_error(ErrorCode::BadState),
        }
    }

    fn complete(&mut self, completion: Completion) -> io::Result<()> {
        let result = match completion {
            Completion::Services(result) => result.map(|services| {
                services.iter().fold(discovery(), |rsp, service| {
                    rsp.uint(tag::RANGE_START, service.range.start)
                        .uint(tag::RANGE_END, service.range.end)
                        .str(tag::UUID, &service.uuid.to_string())
                })
            }),
            Completion::ServiceRanges(result) => result.map(|ranges| {
                ranges.iter().fold(discovery(), |rsp, range| {
                    rsp.uint(tag::RANGE_START, range.start)
                        .uint(tag::RANGE_END, range.end)
                })
            }),
            Completion::Characteristics(result) => result.map(|chars| {
                chars.iter().fold(discovery(), |rsp, decl| {
                    rsp.uint(tag::HANDLE, decl.handle)
                        .uint(tag::PROPERTIES, decl.properties)
                        .uint(tag::VALUE_HANDLE, decl.value_handle)
                        .str(tag::UUID, &decl.uuid.to_string())
                })
            }),
            Completion::Descriptors(result) => result.map(|descs| {
                descs
                    .iter()
                    .fold(Response::new(ResponseKind::Descriptors), |rsp, desc| {
                        rsp.uint(tag::HANDLE, desc.handle)
                            .str(tag::UUID, &desc.uuid.to_string())
                    })
            }),
            Completion::Read(result) => {
                result.map(|value| Response::new(ResponseKind::Read).data(&value))
            }
            Completion::Write(result) => result.map(|()| Response::new(ResponseKind::Write)),
            Completion::Mtu(result) => match result {
                Ok(mtu) => {
                    info!("MTU is now {}", mtu);
                    self.mtu = mtu;
                    return self.send_status();
                }
                Err(err) => {
                    self.mtu_exchanged = false;
                    Err(err)
                }
            },
            Completion::Security(result) => match result {
                Ok(()) => return self.send_status(),
                Err(err) => Err(err),
            },
        };

        match result {
            Ok(rsp) => self.out.send(&rsp),
            Err(err) => self.fail_request(err),
        }
    }

    fn fail_request(&mut self, err: TransportError) -> io::Result<()> {
        warn!("Request failed: {}", err);
        self.send_error(err.wire_code())
    }
}

fn discovery() -> Response {
    Response::new(ResponseKind::Discovery)
}
