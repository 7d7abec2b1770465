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

//! GATT client procedures built from single ATT transactions.
//!
//! Discovery walks the handle space page by page, restarting after the last
//! handle the peer reported, until the peer answers "attribute not found" or
//! the range is exhausted. An empty walk is reported as "attribute not found".

use tracing::{debug, warn};

use super::att::{self, AttErrorCode, AttRsp, AttUuid, ATT_DEFAULT_LE_MTU, ATT_MAX_VALUE_LEN};
use super::{
    CharacteristicDecl, Completion, DescriptorInfo, HandleRange, PrimaryService, Request,
    TransportError,
};

/// One ATT request/response exchange at a time.
pub(crate) trait Bearer {
    /// Send a request and wait for the PDU that answers it.
    async fn transact(&mut self, pdu: Vec<u8>) -> Result<Vec<u8>, TransportError>;

    fn mtu(&self) -> u16;

    fn set_mtu(&mut self, mtu: u16);
}

/// Run a procedure to completion.
pub(crate) async fn execute<B: Bearer>(bearer: &mut B, request: Request) -> Completion {
    match request {
        Request::DiscoverPrimary { uuid: None } => {
            Completion::Services(discover_primary(bearer).await)
        }
        Request::DiscoverPrimary { uuid: Some(uuid) } => {
            Completion::ServiceRanges(discover_primary_by_uuid(bearer, &uuid).await)
        }
        Request::DiscoverCharacteristics { start, end, uuid } => Completion::Characteristics(
            discover_characteristics(bearer, start, end, uuid.as_ref()).await,
        ),
        Request::DiscoverDescriptors { start, end } => {
            Completion::Descriptors(discover_descriptors(bearer, start, end).await)
        }
        Request::Read { handle } => Completion::Read(read(bearer, handle).await),
        Request::Write { handle, value } => Completion::Write(write(bearer, handle, &value).await),
        Request::ExchangeMtu { mtu } => Completion::Mtu(exchange_mtu(bearer, mtu).await),
    }
}

/// Exchange one request, turning an error response into [`TransportError::Att`].
async fn transact<B: Bearer>(bearer: &mut B, pdu: Vec<u8>) -> Result<AttRsp, TransportError> {
    let opcode = pdu[0];
    let raw = bearer.transact(pdu).await?;
    match AttRsp::decode(&raw)? {
        AttRsp::Error {
            request,
            handle,
            code,
        } => {
            if request != opcode {
                return Err(TransportError::Protocol(format!(
                    "error response for opcode {:#04x} while {:#04x} was outstanding",
                    request, opcode
                )));
            }
            debug!("Request {:#04x} on handle {:#06x} failed: {}", opcode, handle, code);
            Err(TransportError::Att(code))
        }
        rsp => Ok(rsp),
    }
}

fn unexpected(rsp: &AttRsp) -> TransportError {
    TransportError::Protocol(format!("unexpected response {:?}", rsp))
}

fn is_not_found(err: &TransportError) -> bool {
    matches!(err, TransportError::Att(code) if *code == AttErrorCode::ATTRIBUTE_NOT_FOUND)
}

/// Where the next page starts, or `None` once `end` has been reached.
fn next_start(current: u16, last: u16, end: u16) -> Result<Option<u16>, TransportError> {
    if last < current {
        return Err(TransportError::Protocol(format!(
            "peer returned handle {:#06x} before requested start {:#06x}",
            last, current
        )));
    }
    if last >= end {
        return Ok(None);
    }
    Ok(Some(last + 1))
}

fn found<T>(items: Vec<T>) -> Result<Vec<T>, TransportError> {
    if items.is_empty() {
        Err(TransportError::Att(AttErrorCode::ATTRIBUTE_NOT_FOUND))
    } else {
        Ok(items)
    }
}

async fn discover_primary<B: Bearer>(bearer: &mut B) -> Result<Vec<PrimaryService>, TransportError> {
    let group_type = AttUuid::Uuid16(att::PRIMARY_SERVICE);
    let mut services = Vec::new();
    let mut current = 0x0001;

    loop {
        let pdu = att::read_by_group_type_req(current, 0xffff, &group_type);
        let entries = match transact(bearer, pdu).await {
            Ok(AttRsp::ReadByGroupType(entries)) => entries,
            Ok(other) => return Err(unexpected(&other)),
            Err(err) if is_not_found(&err) => break,
            Err(err) => return Err(err),
        };

        let mut last = current;
        for (start, end, value) in entries {
            let uuid = AttUuid::from_le_bytes(&value).ok_or_else(|| {
                TransportError::Protocol(format!("service UUID of {} bytes", value.len()))
            })?;
            services.push(PrimaryService {
                range: HandleRange { start, end },
                uuid,
            });
            last = end;
        }

        match next_start(current, last, 0xffff)? {
            Some(next) => current = next,
            None => break,
        }
    }

    debug!("Discovered {} primary service(s)", services.len());
    found(services)
}

async fn discover_primary_by_uuid<B: Bearer>(
    bearer: &mut B,
    uuid: &AttUuid,
) -> Result<Vec<HandleRange>, TransportError> {
    let value = uuid.to_le_bytes();
    let mut ranges = Vec::new();
    let mut current = 0x0001;

    loop {
        let pdu = att::find_by_type_value_req(current, 0xffff, att::PRIMARY_SERVICE, &value);
        let entries = match transact(bearer, pdu).await {
            Ok(AttRsp::FindByTypeValue(entries)) => entries,
            Ok(other) => return Err(unexpected(&other)),
            Err(err) if is_not_found(&err) => break,
            Err(err) => return Err(err),
        };

        let mut last = current;
        for (start, end) in entries {
            ranges.push(HandleRange { start, end });
            last = end;
        }

        match next_start(current, last, 0xffff)? {
            Some(next) => current = next,
            None => break,
        }
    }

    debug!("Found {} instance(s) of service {}", ranges.len(), uuid);
    found(ranges)
}

async fn discover_characteristics<B: Bearer>(
    bearer: &mut B,
    start: u16,
    end: u16,
    filter: Option<&AttUuid>,
) -> Result<Vec<CharacteristicDecl>, TransportError> {
    let decl_type = AttUuid::Uuid16(att::CHARACTERISTIC);
    let mut characteristics = Vec::new();
    let mut current = start;

    loop {
        let pdu = att::read_by_type_req(current, end, &decl_type);
        let entries = match transact(bearer, pdu).await {
            Ok(AttRsp::ReadByType(entries)) => entries,
            Ok(other) => return Err(unexpected(&other)),
            Err(err) if is_not_found(&err) => break,
            Err(err) => return Err(err),
        };

        let mut last = current;
        for (handle, value) in entries {
            // properties(1) + value handle(2) + UUID(2 or 16)
            let uuid = value
                .get(3..)
                .and_then(AttUuid::from_le_bytes)
                .ok_or_else(|| {
                    TransportError::Protocol(format!(
                        "characteristic declaration of {} bytes",
                        value.len()
                    ))
                })?;
            last = handle;
            if filter.map_or(false, |wanted| *wanted != uuid) {
                continue;
            }
            characteristics.push(CharacteristicDecl {
                handle,
                properties: value[0],
                value_handle: u16::from_le_bytes([value[1], value[2]]),
                uuid,
            });
        }

        match next_start(current, last, end)? {
            Some(next) => current = next,
            None => break,
        }
    }

    debug!("Discovered {} characteristic(s)", characteristics.len());
    found(characteristics)
}

async fn discover_descriptors<B: Bearer>(
    bearer: &mut B,
    start: u16,
    end: u16,
) -> Result<Vec<DescriptorInfo>, TransportError> {
    let mut descriptors = Vec::new();
    let mut current = start;

    loop {
        let entries = match transact(bearer, att::find_information_req(current, end)).await {
            Ok(AttRsp::FindInformation(entries)) => entries,
            Ok(other) => return Err(unexpected(&other)),
            Err(err) if is_not_found(&err) => break,
            Err(err) => return Err(err),
        };

        let mut last = current;
        for (handle, uuid) in entries {
            descriptors.push(DescriptorInfo { handle, uuid });
            last = handle;
        }

        match next_start(current, last, end)? {
            Some(next) => current = next,
            None => break,
        }
    }

    debug!("Discovered {} descriptor(s)", descriptors.len());
    found(descriptors)
}

/// Read a value, following up with blob reads while chunks fill the MTU.
async fn read<B: Bearer>(bearer: &mut B, handle: u16) -> Result<Vec<u8>, TransportError> {
    let mut value = match transact(bearer, att::read_req(handle)).await? {
        AttRsp::Read(value) => value,
        other => return Err(unexpected(&other)),
    };

    let chunk = usize::from(bearer.mtu()) - 1;
    let mut last_len = value.len();
    while last_len == chunk && value.len() < ATT_MAX_VALUE_LEN {
        // Bounded by ATT_MAX_VALUE_LEN, so the offset fits.
        let offset = value.len() as u16;
        match transact(bearer, att::read_blob_req(handle, offset)).await {
            Ok(AttRsp::ReadBlob(part)) => {
                last_len = part.len();
                value.extend_from_slice(&part);
            }
            Ok(other) => return Err(unexpected(&other)),
            Err(TransportError::Att(code))
                if code == AttErrorCode::ATTRIBUTE_NOT_LONG || code == AttErrorCode::INVALID_OFFSET =>
            {
                break;
            }
            Err(err) => return Err(err),
        }
    }

    Ok(value)
}

/// Write with response, switching to a prepared (long) write when needed.
async fn write<B: Bearer>(bearer: &mut B, handle: u16, value: &[u8]) -> Result<(), TransportError> {
    let mtu = usize::from(bearer.mtu());
    if value.len() <= mtu - 3 {
        return match transact(bearer, att::write_req(handle, value)).await? {
            AttRsp::Write => Ok(()),
            other => Err(unexpected(&other)),
        };
    }

    let chunk = mtu - 5;
    for (index, part) in value.chunks(chunk).enumerate() {
        let offset = u16::try_from(index * chunk)
            .map_err(|_| TransportError::Protocol("long write offset overflow".into()))?;
        let echoed = match transact(bearer, att::prepare_write_req(handle, offset, part)).await {
            Ok(echoed) => echoed,
            Err(err) => {
                if !err.is_fatal() {
                    cancel_prepared(bearer).await;
                }
                return Err(err);
            }
        };
        let matches = matches!(
            &echoed,
            AttRsp::PrepareWrite { handle: h, offset: o, value: v }
                if *h == handle && *o == offset && v.as_slice() == part
        );
        if !matches {
            warn!("Prepare write echo mismatch on handle {:#06x}", handle);
            cancel_prepared(bearer).await;
            return Err(unexpected(&echoed));
        }
    }

    match transact(bearer, att::execute_write_req(true)).await? {
        AttRsp::ExecuteWrite => Ok(()),
        other => Err(unexpected(&other)),
    }
}

async fn cancel_prepared<B: Bearer>(bearer: &mut B) {
    if let Err(err) = transact(bearer, att::execute_write_req(false)).await {
        debug!("Cancelling prepared writes failed: {}", err);
    }
}

async fn exchange_mtu<B: Bearer>(bearer: &mut B, requested: u16) -> Result<u16, TransportError> {
    let server = match transact(bearer, att::exchange_mtu_req(requested)).await? {
        AttRsp::ExchangeMtu { mtu } => mtu,
        other => return Err(unexpected(&other)),
    };
    let mtu = requested.min(server).max(ATT_DEFAULT_LE_MTU);
    bearer.set_mtu(mtu);
    debug!("MTU exchanged: requested {}, server {}, using {}", requested, server, mtu);
    Ok(mtu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::att::*;
    use std::collections::VecDeque;

    /// Answers each request with the next scripted PDU.
    struct ScriptedBearer {
        responses: VecDeque<Vec<u8>>,
        sent: Vec<Vec<u8>>,
        mtu: u16,
    }

    impl ScriptedBearer {
        fn new(responses: Vec<Vec<u8>>) -> Self {
            Self {
                responses: responses.into(),
                sent: Vec::new(),
                mtu: ATT_DEFAULT_LE_MTU,
            }
        }
    }

    impl Bearer for ScriptedBearer {
        async fn transact(&mut self, pdu: Vec<u8>) -> Result<Vec<u8>, TransportError> {
            self.sent.push(pdu);
            self.responses.pop_front().ok_or(TransportError::Closed)
        }

        fn mtu(&self) -> u16 {
            self.mtu
        }

        fn set_mtu(&mut self, mtu: u16) {
            self.mtu = mtu;
        }
    }

    fn not_found(request: u8, handle: u16) -> Vec<u8> {
        error_rsp(request, handle, AttErrorCode::ATTRIBUTE_NOT_FOUND)
    }

    #[tokio::test]
    async fn test_primary_discovery_walks_pages() {
        let mut bearer = ScriptedBearer::new(vec![
            vec![ATT_READ_BY_GROUP_TYPE_RSP, 6, 0x01, 0x00, 0x07, 0x00, 0x00, 0x18],
            vec![ATT_READ_BY_GROUP_TYPE_RSP, 6, 0x08, 0x00, 0x0b, 0x00, 0x01, 0x18],
            not_found(ATT_READ_BY_GROUP_TYPE_REQ, 0x000c),
        ]);

        let services = discover_primary(&mut bearer).await.unwrap();

        assert_eq!(services.len(), 2);
        assert_eq!(services[0].range, HandleRange { start: 1, end: 7 });
        assert_eq!(services[1].uuid, AttUuid::Uuid16(0x1801));
        assert_eq!(bearer.sent[1][1..3], [0x08, 0x00]);
        assert_eq!(bearer.sent[2][1..3], [0x0c, 0x00]);
    }

    #[tokio::test]
    async fn test_primary_discovery_stops_at_last_handle() {
        let mut bearer = ScriptedBearer::new(vec![vec![
            ATT_READ_BY_GROUP_TYPE_RSP, 6, 0x01, 0x00, 0xff, 0xff, 0x00, 0x18,
        ]]);

        let services = discover_primary(&mut bearer).await.unwrap();

        assert_eq!(services.len(), 1);
        assert_eq!(bearer.sent.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_discovery_is_not_found() {
        let mut bearer = ScriptedBearer::new(vec![not_found(ATT_FIND_INFORMATION_REQ, 0x0001)]);

        let err = discover_descriptors(&mut bearer, 1, 0xffff).await.unwrap_err();

        assert!(is_not_found(&err));
    }

    #[tokio::test]
    async fn test_primary_by_uuid_sends_short_uuid() {
        let mut bearer = ScriptedBearer::new(vec![
            vec![ATT_FIND_BY_TYPE_VALUE_RSP, 0x10, 0x00, 0x20, 0x00],
            not_found(ATT_FIND_BY_TYPE_VALUE_REQ, 0x0021),
        ]);

        let ranges = discover_primary_by_uuid(&mut bearer, &AttUuid::Uuid16(0x180f))
            .await
            .unwrap();

        assert_eq!(ranges, vec![HandleRange { start: 0x10, end: 0x20 }]);
        assert_eq!(
            bearer.sent[0],
            vec![ATT_FIND_BY_TYPE_VALUE_REQ, 0x01, 0x00, 0xff, 0xff, 0x00, 0x28, 0x0f, 0x18]
        );
    }

    #[tokio::test]
    async fn test_characteristic_filter() {
        let mut bearer = ScriptedBearer::new(vec![
            vec![
                ATT_READ_BY_TYPE_RSP, 7, 0x02, 0x00, 0x12, 0x03, 0x00, 0x00, 0x2a, 0x04, 0x00,
                0x02, 0x05, 0x00, 0x01, 0x2a,
            ],
            not_found(ATT_READ_BY_TYPE_REQ, 0x0006),
        ]);
        let wanted = AttUuid::Uuid16(0x2a01);

        let chars = discover_characteristics(&mut bearer, 1, 0x0010, Some(&wanted))
            .await
            .unwrap();

        assert_eq!(
            chars,
            vec![CharacteristicDecl {
                handle: 4,
                properties: 0x02,
                value_handle: 5,
                uuid: wanted,
            }]
        );
        assert_eq!(bearer.sent[1][1..5], [0x05, 0x00, 0x10, 0x00]);
    }

    #[tokio::test]
    async fn test_backwards_handles_are_rejected() {
        let mut bearer = ScriptedBearer::new(vec![vec![
            ATT_FIND_INFORMATION_RSP, 0x01, 0x02, 0x00, 0x02, 0x29,
        ]]);

        let err = discover_descriptors(&mut bearer, 5, 0xffff).await.unwrap_err();

        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_long_read_uses_blobs() {
        let mut first = vec![ATT_READ_RSP];
        first.extend(std::iter::repeat(0xaa).take(22));
        let mut bearer = ScriptedBearer::new(vec![first, vec![ATT_READ_BLOB_RSP, 1, 2, 3]]);

        let value = read(&mut bearer, 0x0003).await.unwrap();

        assert_eq!(value.len(), 25);
        assert_eq!(&value[22..], &[1, 2, 3]);
        assert_eq!(bearer.sent[1], read_blob_req(0x0003, 22));
    }

    #[tokio::test]
    async fn test_read_stops_when_attribute_not_long() {
        let mut first = vec![ATT_READ_RSP];
        first.extend(std::iter::repeat(0x55).take(22));
        let mut bearer = ScriptedBearer::new(vec![
            first,
            error_rsp(ATT_READ_BLOB_REQ, 0x0003, AttErrorCode::ATTRIBUTE_NOT_LONG),
        ]);

        let value = read(&mut bearer, 0x0003).await.unwrap();

        assert_eq!(value.len(), 22);
    }

    #[tokio::test]
    async fn test_read_error_is_att_error() {
        let mut bearer = ScriptedBearer::new(vec![error_rsp(
            ATT_READ_REQ,
            0x0009,
            AttErrorCode::READ_NOT_PERMITTED,
        )]);

        let err = read(&mut bearer, 0x0009).await.unwrap_err();

        assert!(matches!(err, TransportError::Att(code) if code == AttErrorCode::READ_NOT_PERMITTED));
    }

    #[tokio::test]
    async fn test_mismatched_error_response_is_protocol_error() {
        let mut bearer = ScriptedBearer::new(vec![error_rsp(
            ATT_WRITE_REQ,
            0x0009,
            AttErrorCode::INVALID_HANDLE,
        )]);

        let err = read(&mut bearer, 0x0009).await.unwrap_err();

        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_long_write_prepares_and_executes() {
        let value: Vec<u8> = (0..30).collect();
        let mut echo1 = vec![ATT_PREPARE_WRITE_RSP, 0x07, 0x00, 0x00, 0x00];
        echo1.extend_from_slice(&value[..18]);
        let mut echo2 = vec![ATT_PREPARE_WRITE_RSP, 0x07, 0x00, 18, 0x00];
        echo2.extend_from_slice(&value[18..]);
        let mut bearer = ScriptedBearer::new(vec![echo1, echo2, vec![ATT_EXECUTE_WRITE_RSP]]);

        write(&mut bearer, 0x0007, &value).await.unwrap();

        assert_eq!(bearer.sent.len(), 3);
        assert_eq!(bearer.sent[2], execute_write_req(true));
    }

    #[tokio::test]
    async fn test_short_write_uses_write_request() {
        let mut bearer = ScriptedBearer::new(vec![vec![ATT_WRITE_RSP]]);

        write(&mut bearer, 0x0007, &[0x01, 0x00]).await.unwrap();

        assert_eq!(bearer.sent, vec![write_req(0x0007, &[0x01, 0x00])]);
    }

    #[tokio::test]
    async fn test_exchange_mtu_takes_minimum() {
        let mut bearer = ScriptedBearer::new(vec![vec![ATT_EXCHANGE_MTU_RSP, 100, 0]]);

        let mtu = exchange_mtu(&mut bearer, 185).await.unwrap();

        assert_eq!(mtu, 100);
        assert_eq!(bearer.mtu(), 100);
    }

    #[tokio::test]
    async fn test_execute_maps_request_to_completion() {
        let mut bearer = ScriptedBearer::new(vec![vec![ATT_READ_RSP, 0x01, 0xab]]);

        let completion = execute(&mut bearer, Request::Read { handle: 0x0010 }).await;

        assert!(matches!(completion, Completion::Read(Ok(ref v)) if v == &[0x01, 0xab]));
    }
}
