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

//! Transport interface between the connection state machine and a GATT link.
//!
//! A [`Connector`] opens one [`Link`] per connection attempt. Everything the
//! link has to say comes back asynchronously as a [`LinkEvent`] on a single
//! channel, tagged with the id of the link that produced it.

pub mod att;
pub mod l2cap;
#[cfg(test)]
pub mod mock;
mod procedures;

use std::fmt;

use bluer::Address;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::wire::ErrorCode;
pub use att::{AttErrorCode, AttUuid};
pub use l2cap::L2capConnector;

/// Identifies one connection attempt.
pub type LinkId = u64;

/// Sender half of the link event channel.
pub type EventSender = mpsc::UnboundedSender<LinkEvent>;

/// LE address type of the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Public,
    Random,
}

impl AddressKind {
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("public") {
            Some(Self::Public)
        } else if s.eq_ignore_ascii_case("random") {
            Some(Self::Random)
        } else {
            None
        }
    }
}

/// Link security level requested from the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl SecurityLevel {
    /// Case-insensitive `low`, `medium` or `high`.
    pub fn parse(s: &str) -> Option<Self> {
        [Self::Low, Self::Medium, Self::High]
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Everything a connector needs to reach the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub address: Address,
    pub kind: AddressKind,
    pub security: SecurityLevel,
    /// Always 0: the ATT fixed channel is used instead of a PSM.
    pub psm: u16,
}

/// Attribute handle range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleRange {
    pub start: u16,
    pub end: u16,
}

/// One primary service found by full discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryService {
    pub range: HandleRange,
    pub uuid: AttUuid,
}

/// One characteristic declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicDecl {
    pub handle: u16,
    pub properties: u8,
    pub value_handle: u16,
    pub uuid: AttUuid,
}

/// One entry of a find-information listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorInfo {
    pub handle: u16,
    pub uuid: AttUuid,
}

/// A client procedure submitted to the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    DiscoverPrimary {
        uuid: Option<AttUuid>,
    },
    DiscoverCharacteristics {
        start: u16,
        end: u16,
        uuid: Option<AttUuid>,
    },
    DiscoverDescriptors {
        start: u16,
        end: u16,
    },
    Read {
        handle: u16,
    },
    Write {
        handle: u16,
        value: Vec<u8>,
    },
    ExchangeMtu {
        mtu: u16,
    },
}

/// Typed outcome of a [`Request`] or of a security change.
#[derive(Debug)]
pub enum Completion {
    Services(Result<Vec<PrimaryService>, TransportError>),
    ServiceRanges(Result<Vec<HandleRange>, TransportError>),
    Characteristics(Result<Vec<CharacteristicDecl>, TransportError>),
    Descriptors(Result<Vec<DescriptorInfo>, TransportError>),
    Read(Result<Vec<u8>, TransportError>),
    Write(Result<(), TransportError>),
    Mtu(Result<u16, TransportError>),
    Security(Result<(), TransportError>),
}

/// Event reported by a link.
#[derive(Debug)]
pub struct LinkEvent {
    pub link: LinkId,
    pub kind: LinkEventKind,
}

#[derive(Debug)]
pub enum LinkEventKind {
    /// Connection established; `mtu` is the ATT MTU in effect.
    Connected { mtu: u16 },
    ConnectFailed(TransportError),
    Completed(Completion),
    /// A PDU that is not a response to one of our requests.
    Pdu(Vec<u8>),
    /// The channel hung up.
    Closed(Option<TransportError>),
}

/// Failure of a transport operation.
#[derive(Debug)]
pub enum TransportError {
    /// The peer answered with an error response.
    Att(AttErrorCode),
    /// The peer sent something we could not make sense of.
    Protocol(String),
    Timeout,
    Closed,
    Io(std::io::Error),
}

impl TransportError {
    /// Protocol error code reported to the controller.
    pub fn wire_code(&self) -> ErrorCode {
        match self {
            Self::Att(code) if *code == AttErrorCode::ATTRIBUTE_NOT_FOUND => ErrorCode::NotFound,
            Self::Att(_) => ErrorCode::ComErr,
            Self::Protocol(_) => ErrorCode::ProtoErr,
            Self::Timeout | Self::Closed | Self::Io(_) => ErrorCode::ComErr,
        }
    }

    /// Errors after which the bearer cannot be used again.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Timeout | Self::Closed | Self::Io(_))
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Att(code) => write!(f, "peer returned {}", code),
            Self::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Self::Timeout => f.write_str("ATT transaction timed out"),
            Self::Closed => f.write_str("link closed"),
            Self::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Opens links to a peer.
pub trait Connector {
    type Link: Link;

    /// Start connecting. Success or failure is reported later on `events`
    /// unless the attempt cannot even be started.
    fn connect(
        &mut self,
        id: LinkId,
        params: &ConnectParams,
        events: EventSender,
    ) -> Result<Self::Link, TransportError>;
}

/// Handle to one connection. Dropping it releases the transport.
pub trait Link {
    /// Forward inbound PDUs with these opcodes as [`LinkEventKind::Pdu`].
    fn register(&mut self, opcodes: &[u8]);

    /// Queue a client procedure; completes with [`LinkEventKind::Completed`].
    fn submit(&mut self, request: Request);

    /// Send an ATT Write Command. No completion is reported.
    fn write_command(&mut self, handle: u16, value: &[u8]);

    /// Send a raw PDU ahead of any queued procedure.
    fn send(&mut self, pdu: Vec<u8>);

    /// Change the link security; completes with [`Completion::Security`].
    fn set_security(&mut self, level: SecurityLevel);
}
