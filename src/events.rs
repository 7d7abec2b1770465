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

//! Routing of unsolicited PDUs from the peer.
//!
//! Notifications and indications become `ntfy`/`ind` response lines.
//! Requests the peer sends to our (empty) server role are refused with
//! "request not supported" so the peer never has to wait for a timeout.

use tracing::{debug, warn};

use crate::bluetooth::att::{self, AttErrorCode, HandleValue};
use crate::wire::{tag, Response, ResponseKind};

/// Server-role opcodes paired with the shortest valid PDU for each.
const SERVER_REQUESTS: [(u8, usize); 12] = [
    (att::ATT_FIND_INFORMATION_REQ, 5),
    (att::ATT_FIND_BY_TYPE_VALUE_REQ, 7),
    (att::ATT_READ_BY_TYPE_REQ, 7),
    (att::ATT_READ_REQ, 3),
    (att::ATT_READ_BLOB_REQ, 5),
    (att::ATT_READ_MULTIPLE_REQ, 5),
    (att::ATT_READ_BY_GROUP_TYPE_REQ, 7),
    (att::ATT_WRITE_REQ, 3),
    (att::ATT_WRITE_CMD, 3),
    (att::ATT_SIGNED_WRITE_CMD, 15),
    (att::ATT_PREPARE_WRITE_REQ, 5),
    (att::ATT_EXECUTE_WRITE_REQ, 2),
];

/// Opcodes a link must forward to [`route`] once connected.
pub fn registered_opcodes() -> Vec<u8> {
    let mut opcodes = vec![att::ATT_HANDLE_VALUE_NTF, att::ATT_HANDLE_VALUE_IND];
    opcodes.extend(SERVER_REQUESTS.iter().map(|(opcode, _)| *opcode));
    opcodes
}

/// What the connection must do with one unsolicited PDU.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Routed {
    /// Line for the controller.
    pub response: Option<Response>,
    /// PDU to send back to the peer.
    pub reply: Option<Vec<u8>>,
}

/// Decide how to answer an unsolicited PDU.
pub fn route(pdu: &[u8]) -> Routed {
    let Some(&opcode) = pdu.first() else {
        warn!("Dropping empty PDU");
        return Routed::default();
    };

    match opcode {
        att::ATT_HANDLE_VALUE_NTF | att::ATT_HANDLE_VALUE_IND => route_handle_value(pdu),
        _ => match SERVER_REQUESTS.iter().find(|(op, _)| *op == opcode) {
            Some(&(_, min_len)) => route_server_request(opcode, min_len, pdu),
            None if att::is_request(opcode) => {
                debug!("Refusing unhandled request {:#04x}", opcode);
                Routed {
                    response: None,
                    reply: Some(att::error_rsp(
                        opcode,
                        0,
                        AttErrorCode::REQUEST_NOT_SUPPORTED,
                    )),
                }
            }
            None => {
                warn!("Dropping PDU with unexpected opcode {:#04x}", opcode);
                Routed::default()
            }
        },
    }
}

fn route_handle_value(pdu: &[u8]) -> Routed {
    let Some(event) = HandleValue::parse(pdu) else {
        warn!("Dropping truncated handle value PDU ({} bytes)", pdu.len());
        return Routed::default();
    };

    let kind = if event.indication {
        ResponseKind::Indication
    } else {
        ResponseKind::Notify
    };
    debug!(
        "{} on handle {:#06x}: {} bytes",
        kind.as_str(),
        event.handle,
        event.value.len()
    );

    Routed {
        response: Some(
            Response::new(kind)
                .uint(tag::HANDLE, event.handle)
                .data(event.value),
        ),
        reply: event.indication.then(att::handle_value_cfm),
    }
}

fn route_server_request(opcode: u8, min_len: usize, pdu: &[u8]) -> Routed {
    if pdu.len() < min_len {
        if att::is_command(opcode) {
            warn!(
                "Dropping undersized command {:#04x} ({} of {} bytes)",
                opcode,
                pdu.len(),
                min_len
            );
            return Routed::default();
        }
        warn!(
            "Rejecting undersized request {:#04x} ({} of {} bytes)",
            opcode,
            pdu.len(),
            min_len
        );
        let handle = att::request_handle(pdu).unwrap_or(0);
        return Routed {
            response: None,
            reply: Some(att::error_rsp(opcode, handle, AttErrorCode::INVALID_PDU)),
        };
    }

    let handle = if opcode == att::ATT_EXECUTE_WRITE_REQ {
        0
    } else {
        att::request_handle(pdu).unwrap_or(0)
    };
    debug!("Refusing server request {:#04x} on handle {:#06x}", opcode, handle);

    Routed {
        response: None,
        reply: Some(att::error_rsp(
            opcode,
            handle,
            AttErrorCode::REQUEST_NOT_SUPPORTED,
        )),
    }
}
