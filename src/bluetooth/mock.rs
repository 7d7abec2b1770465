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

//! Recording transport for tests.

use std::cell::RefCell;
use std::rc::Rc;

use bluer::Address;

use super::{
    AddressKind, ConnectParams, Connector, EventSender, Link, LinkId, Request, SecurityLevel,
    TransportError,
};

/// One call made on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect {
        id: LinkId,
        address: Address,
        kind: AddressKind,
        security: SecurityLevel,
    },
    Register(Vec<u8>),
    Submit(Request),
    WriteCommand { handle: u16, value: Vec<u8> },
    Send(Vec<u8>),
    SetSecurity(SecurityLevel),
    Release(LinkId),
}

pub type CallLog = Rc<RefCell<Vec<Call>>>;

/// Records every call; events are injected by the test itself.
#[derive(Default)]
pub struct MockConnector {
    pub calls: CallLog,
    /// Fail `connect` immediately instead of returning a link.
    pub refuse: bool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> CallLog {
        Rc::clone(&self.calls)
    }
}

impl Connector for MockConnector {
    type Link = MockLink;

    fn connect(
        &mut self,
        id: LinkId,
        params: &ConnectParams,
        _events: EventSender,
    ) -> Result<MockLink, TransportError> {
        self.calls.borrow_mut().push(Call::Connect {
            id,
            address: params.address,
            kind: params.kind,
            security: params.security,
        });
        if self.refuse {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "no adapter",
            )));
        }
        Ok(MockLink {
            id,
            calls: Rc::clone(&self.calls),
        })
    }
}

pub struct MockLink {
    id: LinkId,
    calls: CallLog,
}

impl MockLink {
    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl Link for MockLink {
    fn register(&mut self, opcodes: &[u8]) {
        self.record(Call::Register(opcodes.to_vec()));
    }

    fn submit(&mut self, request: Request) {
        self.record(Call::Submit(request));
    }

    fn write_command(&mut self, handle: u16, value: &[u8]) {
        self.record(Call::WriteCommand {
            handle,
            value: value.to_vec(),
        });
    }

    fn send(&mut self, pdu: Vec<u8>) {
        self.record(Call::Send(pdu));
    }

    fn set_security(&mut self, level: SecurityLevel) {
        self.record(Call::SetSecurity(level));
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        self.record(Call::Release(self.id));
    }
}
