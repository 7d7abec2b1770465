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

//! Attribute protocol opcodes and the PDUs the client exchanges.
//!
//! Only the subset needed for discovery, reads, writes, MTU exchange and the
//! stub server role is covered. Multi-byte fields are little-endian.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use super::TransportError;

/// Fixed L2CAP channel carrying ATT on an LE link.
pub const ATT_CID: u16 = 0x0004;
/// ATT MTU before any exchange on an LE link.
pub const ATT_DEFAULT_LE_MTU: u16 = 23;
/// Longest attribute value allowed by the protocol.
pub const ATT_MAX_VALUE_LEN: usize = 512;

pub const ATT_ERROR_RSP: u8 = 0x01;
pub const ATT_EXCHANGE_MTU_REQ: u8 = 0x02;
pub const ATT_EXCHANGE_MTU_RSP: u8 = 0x03;
pub const ATT_FIND_INFORMATION_REQ: u8 = 0x04;
pub const ATT_FIND_INFORMATION_RSP: u8 = 0x05;
pub const ATT_FIND_BY_TYPE_VALUE_REQ: u8 = 0x06;
pub const ATT_FIND_BY_TYPE_VALUE_RSP: u8 = 0x07;
pub const ATT_READ_BY_TYPE_REQ: u8 = 0x08;
pub const ATT_READ_BY_TYPE_RSP: u8 = 0x09;
pub const ATT_READ_REQ: u8 = 0x0a;
pub const ATT_READ_RSP: u8 = 0x0b;
pub const ATT_READ_BLOB_REQ: u8 = 0x0c;
pub const ATT_READ_BLOB_RSP: u8 = 0x0d;
pub const ATT_READ_MULTIPLE_REQ: u8 = 0x0e;
pub const ATT_READ_MULTIPLE_RSP: u8 = 0x0f;
pub const ATT_READ_BY_GROUP_TYPE_REQ: u8 = 0x10;
pub const ATT_READ_BY_GROUP_TYPE_RSP: u8 = 0x11;
pub const ATT_WRITE_REQ: u8 = 0x12;
pub const ATT_WRITE_RSP: u8 = 0x13;
pub const ATT_PREPARE_WRITE_REQ: u8 = 0x16;
pub const ATT_PREPARE_WRITE_RSP: u8 = 0x17;
pub const ATT_EXECUTE_WRITE_REQ: u8 = 0x18;
pub const ATT_EXECUTE_WRITE_RSP: u8 = 0x19;
pub const ATT_HANDLE_VALUE_NTF: u8 = 0x1b;
pub const ATT_HANDLE_VALUE_IND: u8 = 0x1d;
pub const ATT_HANDLE_VALUE_CFM: u8 = 0x1e;
pub const ATT_WRITE_CMD: u8 = 0x52;
pub const ATT_SIGNED_WRITE_CMD: u8 = 0xd2;

/// GATT declaration types used during discovery.
pub const PRIMARY_SERVICE: u16 = 0x2800;
pub const CHARACTERISTIC: u16 = 0x2803;

/// Error code carried by an `ATT_ERROR_RSP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttErrorCode {
    value: u8,
}

impl AttErrorCode {
    pub const INVALID_HANDLE: Self = Self { value: 0x01 };
    pub const READ_NOT_PERMITTED: Self = Self { value: 0x02 };
    pub const WRITE_NOT_PERMITTED: Self = Self { value: 0x03 };
    pub const INVALID_PDU: Self = Self { value: 0x04 };
    pub const INSUFFICIENT_AUTHENTICATION: Self = Self { value: 0x05 };
    pub const REQUEST_NOT_SUPPORTED: Self = Self { value: 0x06 };
    pub const INVALID_OFFSET: Self = Self { value: 0x07 };
    pub const INSUFFICIENT_AUTHORISATION: Self = Self { value: 0x08 };
    pub const PREPARE_QUEUE_FULL: Self = Self { value: 0x09 };
    pub const ATTRIBUTE_NOT_FOUND: Self = Self { value: 0x0a };
    pub const ATTRIBUTE_NOT_LONG: Self = Self { value: 0x0b };
    pub const INSUFFICIENT_ENCRYPTION_KEY_SIZE: Self = Self { value: 0x0c };
    pub const INVALID_ATTRIBUTE_VALUE_LENGTH: Self = Self { value: 0x0d };
    pub const UNLIKELY_ERROR: Self = Self { value: 0x0e };
    pub const INSUFFICIENT_ENCRYPTION: Self = Self { value: 0x0f };

    pub fn value(self) -> u8 {
        self.value
    }
}

impl From<u8> for AttErrorCode {
    fn from(value: u8) -> Self {
        Self { value }
    }
}

impl fmt::Display for AttErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match *self {
            Self::INVALID_HANDLE => "invalid handle",
            Self::READ_NOT_PERMITTED => "read not permitted",
            Self::WRITE_NOT_PERMITTED => "write not permitted",
            Self::INVALID_PDU => "invalid PDU",
            Self::INSUFFICIENT_AUTHENTICATION => "insufficient authentication",
            Self::REQUEST_NOT_SUPPORTED => "request not supported",
            Self::INVALID_OFFSET => "invalid offset",
            Self::INSUFFICIENT_AUTHORISATION => "insufficient authorisation",
            Self::PREPARE_QUEUE_FULL => "prepare queue full",
            Self::ATTRIBUTE_NOT_FOUND => "attribute not found",
            Self::ATTRIBUTE_NOT_LONG => "attribute not long",
            Self::INSUFFICIENT_ENCRYPTION_KEY_SIZE => "insufficient encryption key size",
            Self::INVALID_ATTRIBUTE_VALUE_LENGTH => "invalid attribute value length",
            Self::UNLIKELY_ERROR => "unlikely error",
            Self::INSUFFICIENT_ENCRYPTION => "insufficient encryption",
            other => return write!(f, "ATT error {:#04x}", other.value),
        };
        f.write_str(text)
    }
}

/// Bluetooth base UUID, `00000000-0000-1000-8000-00805f9b34fb`.
const BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;
const BASE_UUID_MASK: u128 = 0x0000_0000_ffff_ffff_ffff_ffff_ffff_ffff;

/// An attribute type as it travels on the wire: 16-bit alias or full UUID.
#[derive(Debug, Clone, Copy)]
pub enum AttUuid {
    Uuid16(u16),
    Uuid128(Uuid),
}

impl AttUuid {
    /// Decode a little-endian UUID field of 2 or 16 bytes.
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes.len() {
            2 => Some(Self::Uuid16(u16::from_le_bytes([bytes[0], bytes[1]]))),
            16 => {
                let mut be = [0u8; 16];
                be.copy_from_slice(bytes);
                be.reverse();
                Some(Self::Uuid128(Uuid::from_bytes(be)))
            }
            _ => None,
        }
    }

    /// Full 128-bit form.
    pub fn to_uuid(&self) -> Uuid {
        match *self {
            Self::Uuid16(short) => Uuid::from_u128(BASE_UUID | (u128::from(short) << 96)),
            Self::Uuid128(uuid) => uuid,
        }
    }

    /// Shortest encoding: 2 bytes for base-UUID aliases, 16 otherwise.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let full = self.to_uuid().as_u128();
        if full & BASE_UUID_MASK == BASE_UUID && full >> 96 <= 0xffff {
            return ((full >> 96) as u16).to_le_bytes().to_vec();
        }
        let mut bytes = full.to_be_bytes();
        bytes.reverse();
        bytes.to_vec()
    }
}

impl PartialEq for AttUuid {
    fn eq(&self, other: &Self) -> bool {
        self.to_uuid() == other.to_uuid()
    }
}

impl Eq for AttUuid {}

impl fmt::Display for AttUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uuid())
    }
}

impl FromStr for AttUuid {
    type Err = uuid::Error;

    /// Accepts `180a`, `0x180A`, 32-bit aliases and hyphenated 128-bit UUIDs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let is_short =
            !digits.is_empty() && digits.len() <= 8 && digits.bytes().all(|b| b.is_ascii_hexdigit());
        if is_short {
            if let Ok(short) = u32::from_str_radix(digits, 16) {
                return Ok(match u16::try_from(short) {
                    Ok(short) => Self::Uuid16(short),
                    Err(_) => Self::Uuid128(Uuid::from_u128(BASE_UUID | (u128::from(short) << 96))),
                });
            }
        }
        Uuid::parse_str(s).map(Self::Uuid128)
    }
}

fn put_u16(pdu: &mut Vec<u8>, value: u16) {
    pdu.extend_from_slice(&value.to_le_bytes());
}

fn get_u16(bytes: &[u8], at: usize) -> Option<u16> {
    let field = bytes.get(at..at + 2)?;
    Some(u16::from_le_bytes([field[0], field[1]]))
}

fn range_req(opcode: u8, start: u16, end: u16) -> Vec<u8> {
    let mut pdu = vec![opcode];
    put_u16(&mut pdu, start);
    put_u16(&mut pdu, end);
    pdu
}

pub fn exchange_mtu_req(mtu: u16) -> Vec<u8> {
    let mut pdu = vec![ATT_EXCHANGE_MTU_REQ];
    put_u16(&mut pdu, mtu);
    pdu
}

pub fn find_information_req(start: u16, end: u16) -> Vec<u8> {
    range_req(ATT_FIND_INFORMATION_REQ, start, end)
}

pub fn find_by_type_value_req(start: u16, end: u16, att_type: u16, value: &[u8]) -> Vec<u8> {
    let mut pdu = range_req(ATT_FIND_BY_TYPE_VALUE_REQ, start, end);
    put_u16(&mut pdu, att_type);
    pdu.extend_from_slice(value);
    pdu
}

pub fn read_by_type_req(start: u16, end: u16, att_type: &AttUuid) -> Vec<u8> {
    let mut pdu = range_req(ATT_READ_BY_TYPE_REQ, start, end);
    pdu.extend_from_slice(&att_type.to_le_bytes());
    pdu
}

pub fn read_by_group_type_req(start: u16, end: u16, group_type: &AttUuid) -> Vec<u8> {
    let mut pdu = range_req(ATT_READ_BY_GROUP_TYPE_REQ, start, end);
    pdu.extend_from_slice(&group_type.to_le_bytes());
    pdu
}

pub fn read_req(handle: u16) -> Vec<u8> {
    let mut pdu = vec![ATT_READ_REQ];
    put_u16(&mut pdu, handle);
    pdu
}

pub fn read_blob_req(handle: u16, offset: u16) -> Vec<u8> {
    let mut pdu = vec![ATT_READ_BLOB_REQ];
    put_u16(&mut pdu, handle);
    put_u16(&mut pdu, offset);
    pdu
}

pub fn write_req(handle: u16, value: &[u8]) -> Vec<u8> {
    let mut pdu = vec![ATT_WRITE_REQ];
    put_u16(&mut pdu, handle);
    pdu.extend_from_slice(value);
    pdu
}

pub fn write_cmd(handle: u16, value: &[u8]) -> Vec<u8> {
    let mut pdu = vec![ATT_WRITE_CMD];
    put_u16(&mut pdu, handle);
    pdu.extend_from_slice(value);
    pdu
}

pub fn prepare_write_req(handle: u16, offset: u16, value: &[u8]) -> Vec<u8> {
    let mut pdu = vec![ATT_PREPARE_WRITE_REQ];
    put_u16(&mut pdu, handle);
    put_u16(&mut pdu, offset);
    pdu.extend_from_slice(value);
    pdu
}

/// `commit == false` cancels the queued prepared writes.
pub fn execute_write_req(commit: bool) -> Vec<u8> {
    vec![ATT_EXECUTE_WRITE_REQ, u8::from(commit)]
}

pub fn handle_value_cfm() -> Vec<u8> {
    vec![ATT_HANDLE_VALUE_CFM]
}

pub fn error_rsp(request: u8, handle: u16, code: AttErrorCode) -> Vec<u8> {
    let mut pdu = vec![ATT_ERROR_RSP, request];
    put_u16(&mut pdu, handle);
    pdu.push(code.value());
    pdu
}

/// True for opcodes that answer an outstanding client request.
pub fn is_response(opcode: u8) -> bool {
    matches!(
        opcode,
        ATT_ERROR_RSP
            | ATT_EXCHANGE_MTU_RSP
            | ATT_FIND_INFORMATION_RSP
            | ATT_FIND_BY_TYPE_VALUE_RSP
            | ATT_READ_BY_TYPE_RSP
            | ATT_READ_RSP
            | ATT_READ_BLOB_RSP
            | ATT_READ_MULTIPLE_RSP
            | ATT_READ_BY_GROUP_TYPE_RSP
            | ATT_WRITE_RSP
            | ATT_PREPARE_WRITE_RSP
            | ATT_EXECUTE_WRITE_RSP
    )
}

/// Commands carry bit 6 of the opcode and are never answered.
pub fn is_command(opcode: u8) -> bool {
    opcode & 0x40 != 0
}

/// True for opcodes a client sends and then waits on, so an answer is owed.
pub fn is_request(opcode: u8) -> bool {
    !is_response(opcode)
        && !is_command(opcode)
        && !matches!(
            opcode,
            ATT_HANDLE_VALUE_NTF | ATT_HANDLE_VALUE_IND | ATT_HANDLE_VALUE_CFM
        )
}

/// A decoded server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttRsp {
    Error {
        request: u8,
        handle: u16,
        code: AttErrorCode,
    },
    ExchangeMtu {
        mtu: u16,
    },
    /// `(handle, type)` pairs.
    FindInformation(Vec<(u16, AttUuid)>),
    /// `(found handle, group end handle)` pairs.
    FindByTypeValue(Vec<(u16, u16)>),
    /// `(handle, value)` pairs.
    ReadByType(Vec<(u16, Vec<u8>)>),
    Read(Vec<u8>),
    ReadBlob(Vec<u8>),
    /// `(start, end, value)` triples.
    ReadByGroupType(Vec<(u16, u16, Vec<u8>)>),
    Write,
    PrepareWrite {
        handle: u16,
        offset: u16,
        value: Vec<u8>,
    },
    ExecuteWrite,
}

fn malformed(what: &str) -> TransportError {
    TransportError::Protocol(format!("malformed {}", what))
}

/// Split a list body into fixed-size records.
fn records<'a>(body: &'a [u8], len: usize, what: &str) -> Result<std::slice::ChunksExact<'a, u8>, TransportError> {
    if len == 0 || body.is_empty() || body.len() % len != 0 {
        return Err(malformed(what));
    }
    Ok(body.chunks_exact(len))
}

impl AttRsp {
    pub fn decode(pdu: &[u8]) -> Result<Self, TransportError> {
        let (&opcode, body) = pdu.split_first().ok_or_else(|| malformed("empty PDU"))?;
        match opcode {
            ATT_ERROR_RSP => {
                if body.len() != 4 {
                    return Err(malformed("error response"));
                }
                Ok(Self::Error {
                    request: body[0],
                    handle: u16::from_le_bytes([body[1], body[2]]),
                    code: AttErrorCode::from(body[3]),
                })
            }
            ATT_EXCHANGE_MTU_RSP => get_u16(body, 0)
                .filter(|_| body.len() == 2)
                .map(|mtu| Self::ExchangeMtu { mtu })
                .ok_or_else(|| malformed("exchange MTU response")),
            ATT_FIND_INFORMATION_RSP => {
                let (&format, list) = body
                    .split_first()
                    .ok_or_else(|| malformed("find information response"))?;
                let uuid_len = match format {
                    0x01 => 2,
                    0x02 => 16,
                    _ => return Err(malformed("find information format")),
                };
                records(list, 2 + uuid_len, "find information response")?
                    .map(|rec| {
                        let uuid = AttUuid::from_le_bytes(&rec[2..])
                            .ok_or_else(|| malformed("find information uuid"))?;
                        Ok((u16::from_le_bytes([rec[0], rec[1]]), uuid))
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Self::FindInformation)
            }
            ATT_FIND_BY_TYPE_VALUE_RSP => Ok(Self::FindByTypeValue(
                records(body, 4, "find by type value response")?
                    .map(|rec| {
                        (
                            u16::from_le_bytes([rec[0], rec[1]]),
                            u16::from_le_bytes([rec[2], rec[3]]),
                        )
                    })
                    .collect(),
            )),
            ATT_READ_BY_TYPE_RSP => {
                let (&len, list) = body
                    .split_first()
                    .ok_or_else(|| malformed("read by type response"))?;
                if len < 2 {
                    return Err(malformed("read by type record length"));
                }
                Ok(Self::ReadByType(
                    records(list, usize::from(len), "read by type response")?
                        .map(|rec| (u16::from_le_bytes([rec[0], rec[1]]), rec[2..].to_vec()))
                        .collect(),
                ))
            }
            ATT_READ_RSP => Ok(Self::Read(body.to_vec())),
            ATT_READ_BLOB_RSP => Ok(Self::ReadBlob(body.to_vec())),
            ATT_READ_BY_GROUP_TYPE_RSP => {
                let (&len, list) = body
                    .split_first()
                    .ok_or_else(|| malformed("read by group type response"))?;
                if len < 4 {
                    return Err(malformed("read by group type record length"));
                }
                Ok(Self::ReadByGroupType(
                    records(list, usize::from(len), "read by group type response")?
                        .map(|rec| {
                            (
                                u16::from_le_bytes([rec[0], rec[1]]),
                                u16::from_le_bytes([rec[2], rec[3]]),
                                rec[4..].to_vec(),
                            )
                        })
                        .collect(),
                ))
            }
            ATT_WRITE_RSP if body.is_empty() => Ok(Self::Write),
            ATT_PREPARE_WRITE_RSP => match (get_u16(body, 0), get_u16(body, 2)) {
                (Some(handle), Some(offset)) => Ok(Self::PrepareWrite {
                    handle,
                    offset,
                    value: body[4..].to_vec(),
                }),
                _ => Err(malformed("prepare write response")),
            },
            ATT_EXECUTE_WRITE_RSP if body.is_empty() => Ok(Self::ExecuteWrite),
            other => Err(TransportError::Protocol(format!(
                "unexpected response opcode {:#04x}",
                other
            ))),
        }
    }
}

/// A Handle Value Notification or Indication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleValue<'a> {
    pub indication: bool,
    pub handle: u16,
    pub value: &'a [u8],
}

impl<'a> HandleValue<'a> {
    /// `None` for other opcodes or PDUs too short to carry a handle.
    pub fn parse(pdu: &'a [u8]) -> Option<Self> {
        let indication = match *pdu.first()? {
            ATT_HANDLE_VALUE_NTF => false,
            ATT_HANDLE_VALUE_IND => true,
            _ => return None,
        };
        let handle = get_u16(pdu, 1)?;
        Some(Self {
            indication,
            handle,
            value: &pdu[3..],
        })
    }
}

/// Handle field of a request PDU, when present.
pub fn request_handle(pdu: &[u8]) -> Option<u16> {
    get_u16(pdu, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_parse_forms() {
        let short: AttUuid = "180a".parse().unwrap();
        assert_eq!(short, AttUuid::Uuid16(0x180a));
        assert_eq!("0x180A".parse::<AttUuid>().unwrap(), short);
        assert_eq!(
            "0000180a-0000-1000-8000-00805f9b34fb".parse::<AttUuid>().unwrap(),
            short
        );
        assert_eq!(short.to_string(), "0000180a-0000-1000-8000-00805f9b34fb");
        assert!("not-a-uuid".parse::<AttUuid>().is_err());
        assert!("+180a".parse::<AttUuid>().is_err());
        assert!("0x+180a".parse::<AttUuid>().is_err());
        assert!("".parse::<AttUuid>().is_err());
    }

    #[test]
    fn test_uuid_wire_encoding() {
        assert_eq!(AttUuid::Uuid16(0x2800).to_le_bytes(), vec![0x00, 0x28]);

        // A base-UUID alias written in full still goes out in short form.
        let aliased: AttUuid = "00002a00-0000-1000-8000-00805f9b34fb".parse().unwrap();
        assert_eq!(aliased.to_le_bytes(), vec![0x00, 0x2a]);

        let custom: AttUuid = "6e400001-b5a3-f393-e0a9-e50e24dcca9e".parse().unwrap();
        let bytes = custom.to_le_bytes();
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes[0], 0x9e);
        assert_eq!(bytes[15], 0x6e);
        assert_eq!(AttUuid::from_le_bytes(&bytes), Some(custom));
    }

    #[test]
    fn test_request_encoding() {
        assert_eq!(read_req(0x0010), vec![ATT_READ_REQ, 0x10, 0x00]);
        assert_eq!(read_blob_req(0x0003, 22), vec![ATT_READ_BLOB_REQ, 0x03, 0x00, 22, 0x00]);
        assert_eq!(
            read_by_group_type_req(0x0001, 0xffff, &AttUuid::Uuid16(PRIMARY_SERVICE)),
            vec![ATT_READ_BY_GROUP_TYPE_REQ, 0x01, 0x00, 0xff, 0xff, 0x00, 0x28]
        );
        assert_eq!(exchange_mtu_req(185), vec![ATT_EXCHANGE_MTU_REQ, 185, 0]);
        assert_eq!(
            error_rsp(ATT_READ_REQ, 0x0005, AttErrorCode::REQUEST_NOT_SUPPORTED),
            vec![ATT_ERROR_RSP, ATT_READ_REQ, 0x05, 0x00, 0x06]
        );
    }

    #[test]
    fn test_decode_error_response() {
        let rsp = AttRsp::decode(&[ATT_ERROR_RSP, ATT_READ_REQ, 0x05, 0x00, 0x0a]).unwrap();
        assert_eq!(
            rsp,
            AttRsp::Error {
                request: ATT_READ_REQ,
                handle: 5,
                code: AttErrorCode::ATTRIBUTE_NOT_FOUND,
            }
        );
        assert!(AttRsp::decode(&[ATT_ERROR_RSP, ATT_READ_REQ]).is_err());
    }

    #[test]
    fn test_decode_group_and_type_lists() {
        let rsp = AttRsp::decode(&[
            ATT_READ_BY_GROUP_TYPE_RSP, 6, 0x01, 0x00, 0x05, 0x00, 0x00, 0x18, 0x06, 0x00, 0x09,
            0x00, 0x01, 0x18,
        ])
        .unwrap();
        assert_eq!(
            rsp,
            AttRsp::ReadByGroupType(vec![(1, 5, vec![0x00, 0x18]), (6, 9, vec![0x01, 0x18])])
        );

        // Record length that does not divide the body.
        assert!(AttRsp::decode(&[ATT_READ_BY_TYPE_RSP, 7, 0x02, 0x00, 0x02]).is_err());
    }

    #[test]
    fn test_decode_find_information() {
        let rsp = AttRsp::decode(&[ATT_FIND_INFORMATION_RSP, 0x01, 0x04, 0x00, 0x02, 0x29]).unwrap();
        assert_eq!(rsp, AttRsp::FindInformation(vec![(4, AttUuid::Uuid16(0x2902))]));
        assert!(AttRsp::decode(&[ATT_FIND_INFORMATION_RSP, 0x03, 0x04, 0x00]).is_err());
    }

    #[test]
    fn test_handle_value_parse() {
        let ind = HandleValue::parse(&[ATT_HANDLE_VALUE_IND, 0x10, 0x00, 0xde, 0xad]).unwrap();
        assert!(ind.indication);
        assert_eq!(ind.handle, 0x0010);
        assert_eq!(ind.value, &[0xde, 0xad]);

        assert!(HandleValue::parse(&[ATT_HANDLE_VALUE_NTF, 0x10]).is_none());
        assert!(HandleValue::parse(&[ATT_READ_RSP, 0x10, 0x00]).is_none());
    }

    #[test]
    fn test_is_response() {
        assert!(is_response(ATT_ERROR_RSP));
        assert!(is_response(ATT_WRITE_RSP));
        assert!(!is_response(ATT_HANDLE_VALUE_IND));
        assert!(!is_response(ATT_READ_REQ));
    }

    #[test]
    fn test_is_request() {
        assert!(is_request(ATT_EXCHANGE_MTU_REQ));
        assert!(is_request(ATT_READ_REQ));
        assert!(is_request(ATT_EXECUTE_WRITE_REQ));
        assert!(!is_request(ATT_WRITE_CMD));
        assert!(!is_request(ATT_SIGNED_WRITE_CMD));
        assert!(!is_request(ATT_HANDLE_VALUE_IND));
        assert!(!is_request(ATT_HANDLE_VALUE_CFM));
        assert!(!is_request(ATT_READ_RSP));
    }
}
