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

//! Controller command parsing and dispatch.

use std::io::{self, Write};

use tracing::debug;

use crate::bluetooth::{AddressKind, AttUuid, Connector, SecurityLevel};
use crate::connection::{Connection, Peer};
use crate::wire::ErrorCode;

/// Full handle range used when discovery bounds are omitted.
const FIRST_HANDLE: u16 = 0x0001;
const LAST_HANDLE: u16 = 0xffff;

/// A command line validated into typed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    Quit,
    Connect(Option<Peer>),
    Disconnect,
    Services(Option<AttUuid>),
    Characteristics {
        start: u16,
        end: u16,
        uuid: Option<AttUuid>,
    },
    Descriptors {
        start: u16,
        end: u16,
    },
    Read(u16),
    WriteRequest {
        handle: u16,
        value: Vec<u8>,
    },
    WriteCommand {
        handle: u16,
        value: Vec<u8>,
    },
    Security(SecurityLevel),
    Mtu(u16),
}

/// One entry of the command table.
pub struct CommandSpec {
    pub name: &'static str,
    pub params: &'static str,
    pub description: &'static str,
    /// Rejected with `badstate` unless connected, before arguments are looked at.
    pub needs_connection: bool,
    pub parse: fn(&[String]) -> Result<Command, ErrorCode>,
}

pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "help",
        params: "",
        description: "Show this help",
        needs_connection: false,
        parse: |_| Ok(Command::Help),
    },
    CommandSpec {
        name: "stat",
        params: "",
        description: "Show current status",
        needs_connection: false,
        parse: |_| Ok(Command::Status),
    },
    CommandSpec {
        name: "quit",
        params: "",
        description: "Exit interactive mode",
        needs_connection: false,
        parse: |_| Ok(Command::Quit),
    },
    CommandSpec {
        name: "conn",
        params: "[address [address type]]",
        description: "Connect to a remote device",
        needs_connection: false,
        parse: parse_connect,
    },
    CommandSpec {
        name: "disc",
        params: "",
        description: "Disconnect from a remote device",
        needs_connection: false,
        parse: |_| Ok(Command::Disconnect),
    },
    CommandSpec {
        name: "svcs",
        params: "[UUID]",
        description: "Primary Service Discovery",
        needs_connection: true,
        parse: parse_services,
    },
    CommandSpec {
        name: "char",
        params: "[start hnd [end hnd [UUID]]]",
        description: "Characteristics Discovery",
        needs_connection: true,
        parse: parse_characteristics,
    },
    CommandSpec {
        name: "desc",
        params: "[start hnd] [end hnd]",
        description: "Characteristics Descriptor Discovery",
        needs_connection: true,
        parse: parse_descriptors,
    },
    CommandSpec {
        name: "rd",
        params: "<handle>",
        description: "Characteristics Value/Descriptor Read by handle",
        needs_connection: true,
        parse: |args| Ok(Command::Read(parse_handle(required(args, 0)?)?)),
    },
    CommandSpec {
        name: "wrr",
        params: "<handle> <new value>",
        description: "Characteristic Value Write (Write Request)",
        needs_connection: true,
        parse: |args| {
            let (handle, value) = parse_write(args)?;
            Ok(Command::WriteRequest { handle, value })
        },
    },
    CommandSpec {
        name: "wr",
        params: "<handle> <new value>",
        description: "Characteristic Value Write (No response)",
        needs_connection: true,
        parse: |args| {
            let (handle, value) = parse_write(args)?;
            Ok(Command::WriteCommand { handle, value })
        },
    },
    CommandSpec {
        name: "secu",
        params: "[low | medium | high]",
        description: "Set security level. Default: low",
        needs_connection: false,
        parse: |args| {
            SecurityLevel::parse(required(args, 0)?)
                .map(Command::Security)
                .ok_or(ErrorCode::BadParam)
        },
    },
    CommandSpec {
        name: "mtu",
        params: "<value>",
        description: "Exchange MTU for GATT/ATT",
        needs_connection: true,
        parse: |args| Ok(Command::Mtu(parse_handle(required(args, 0)?)?)),
    },
];

/// Whether the input loop keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

fn required(args: &[String], index: usize) -> Result<&str, ErrorCode> {
    args.get(index).map(String::as_str).ok_or(ErrorCode::BadParam)
}

/// Hexadecimal 16-bit value with an optional `0x` prefix.
fn parse_handle(s: &str) -> Result<u16, ErrorCode> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ErrorCode::BadParam);
    }
    u16::from_str_radix(digits, 16).map_err(|_| ErrorCode::BadParam)
}

fn parse_uuid(s: &str) -> Result<AttUuid, ErrorCode> {
    s.parse().map_err(|_| ErrorCode::BadParam)
}

fn parse_connect(args: &[String]) -> Result<Command, ErrorCode> {
    let Some(text) = args.first() else {
        return Ok(Command::Connect(None));
    };
    let address = text.parse().map_err(|_| ErrorCode::BadParam)?;
    let kind = match args.get(1) {
        Some(kind) => AddressKind::parse(kind).ok_or(ErrorCode::BadParam)?,
        None => AddressKind::Public,
    };
    Ok(Command::Connect(Some(Peer {
        address,
        text: text.clone(),
        kind,
    })))
}

fn parse_services(args: &[String]) -> Result<Command, ErrorCode> {
    let uuid = args.first().map(|s| parse_uuid(s)).transpose()?;
    Ok(Command::Services(uuid))
}

fn parse_range(args: &[String]) -> Result<(u16, u16), ErrorCode> {
    let start = args
        .first()
        .map(|s| parse_handle(s))
        .transpose()?
        .unwrap_or(FIRST_HANDLE);
    let end = args
        .get(1)
        .map(|s| parse_handle(s))
        .transpose()?
        .unwrap_or(LAST_HANDLE);
    Ok((start, end))
}

fn parse_characteristics(args: &[String]) -> Result<Command, ErrorCode> {
    let (start, end) = parse_range(args)?;
    let uuid = args.get(2).map(|s| parse_uuid(s)).transpose()?;
    Ok(Command::Characteristics { start, end, uuid })
}

fn parse_descriptors(args: &[String]) -> Result<Command, ErrorCode> {
    let (start, end) = parse_range(args)?;
    Ok(Command::Descriptors { start, end })
}

fn parse_write(args: &[String]) -> Result<(u16, Vec<u8>), ErrorCode> {
    let handle = parse_handle(required(args, 0)?)?;
    let value = hex::decode(required(args, 1)?).map_err(|_| ErrorCode::BadParam)?;
    if handle == 0 || value.is_empty() {
        return Err(ErrorCode::BadParam);
    }
    Ok((handle, value))
}

/// Parse and run one input line.
pub fn dispatch<C: Connector, W: Write>(
    conn: &mut Connection<C, W>,
    line: &str,
) -> io::Result<Flow> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Flow::Continue);
    }

    let tokens = match shell_words::split(line) {
        Ok(tokens) => tokens,
        Err(err) => {
            debug!("Unparsable line {:?}: {}", line, err);
            conn.send_error(ErrorCode::BadCmd)?;
            return Ok(Flow::Continue);
        }
    };
    let Some((name, args)) = tokens.split_first() else {
        conn.send_error(ErrorCode::BadCmd)?;
        return Ok(Flow::Continue);
    };

    let Some(spec) = COMMANDS.iter().find(|c| c.name.eq_ignore_ascii_case(name)) else {
        debug!("Unknown command {:?}", name);
        conn.send_error(ErrorCode::BadCmd)?;
        return Ok(Flow::Continue);
    };

    if spec.needs_connection && !conn.is_connected() {
        conn.send_error(ErrorCode::BadState)?;
        return Ok(Flow::Continue);
    }

    match (spec.parse)(args) {
        Ok(command) => execute(conn, command),
        Err(code) => {
            debug!("Bad arguments for {}: {:?}", spec.name, args);
            conn.send_error(code)?;
            Ok(Flow::Continue)
        }
    }
}

fn execute<C: Connector, W: Write>(
    conn: &mut Connection<C, W>,
    command: Command,
) -> io::Result<Flow> {
    match command {
        Command::Help => {
            for spec in COMMANDS {
                conn.output_mut().comment(&format!(
                    "{:<15} {:<30} {}",
                    spec.name, spec.params, spec.description
                ))?;
            }
            conn.send_status()?;
        }
        Command::Status => conn.send_status()?,
        Command::Quit => return Ok(Flow::Exit),
        Command::Connect(target) => conn.connect(target)?,
        Command::Disconnect => conn.disconnect()?,
        Command::Services(uuid) => conn.discover_services(uuid)?,
        Command::Characteristics { start, end, uuid } => {
            conn.discover_characteristics(start, end, uuid)?
        }
        Command::Descriptors { start, end } => conn.discover_descriptors(start, end)?,
        Command::Read(handle) => conn.read(handle)?,
        Command::WriteRequest { handle, value } => conn.write(handle, value)?,
        Command::WriteCommand { handle, value } => conn.write_command(handle, &value)?,
        Command::Security(level) => conn.set_security(level)?,
        Command::Mtu(mtu) => conn.exchange_mtu(mtu)?,
    }
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::mock::{Call, CallLog, MockConnector};
    use crate::bluetooth::{LinkEvent, LinkEventKind, Request};
    use anyhow::Result;
    use tokio::sync::mpsc;

    type TestConnection = Connection<MockConnector, Vec<u8>>;

    fn setup() -> (TestConnection, CallLog) {
        let connector = MockConnector::new();
        let log = connector.log();
        let (tx, _rx) = mpsc::unbounded_channel();
        (
            Connection::new(connector, tx, Vec::new(), SecurityLevel::Low),
            log,
        )
    }

    fn run(conn: &mut TestConnection, line: &str) -> Result<Vec<String>> {
        dispatch(conn, line)?;
        let out = conn.output_mut().get_mut();
        let text = String::from_utf8_lossy(out).into_owned();
        out.clear();
        Ok(text.lines().map(str::to_string).collect())
    }

    fn connected() -> Result<(TestConnection, CallLog)> {
        let (mut conn, log) = setup();
        run(&mut conn, "conn AA:BB:CC:DD:EE:FF")?;
        conn.handle_event(LinkEvent {
            link: 1,
            kind: LinkEventKind::Connected { mtu: 23 },
        })?;
        run(&mut conn, "")?;
        log.borrow_mut().clear();
        Ok((conn, log))
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_handle() {
        assert_eq!(parse_handle("0x2a"), Ok(0x2a));
        assert_eq!(parse_handle("FFFF"), Ok(0xffff));
        assert_eq!(parse_handle("0"), Ok(0));
        assert_eq!(parse_handle("zz"), Err(ErrorCode::BadParam));
        assert_eq!(parse_handle("10000"), Err(ErrorCode::BadParam));
        assert_eq!(parse_handle("+1"), Err(ErrorCode::BadParam));
        assert_eq!(parse_handle("0x"), Err(ErrorCode::BadParam));
    }

    #[test]
    fn test_parse_characteristics_defaults() {
        assert_eq!(
            parse_characteristics(&[]),
            Ok(Command::Characteristics {
                start: 1,
                end: 0xffff,
                uuid: None
            })
        );
        assert_eq!(
            parse_characteristics(&args(&["10", "20", "2a00"])),
            Ok(Command::Characteristics {
                start: 0x10,
                end: 0x20,
                uuid: Some(AttUuid::Uuid16(0x2a00))
            })
        );
        assert_eq!(
            parse_characteristics(&args(&["10", "20", "nope"])),
            Err(ErrorCode::BadParam)
        );
    }

    #[test]
    fn test_parse_write_values() {
        assert_eq!(parse_write(&args(&["12", "0100"])), Ok((0x12, vec![0x01, 0x00])));
        assert_eq!(parse_write(&args(&["12"])), Err(ErrorCode::BadParam));
        assert_eq!(parse_write(&args(&["12", "0g"])), Err(ErrorCode::BadParam));
        assert_eq!(parse_write(&args(&["12", "123"])), Err(ErrorCode::BadParam));
        assert_eq!(parse_write(&args(&["0", "01"])), Err(ErrorCode::BadParam));
    }

    #[test]
    fn test_parse_connect() -> Result<()> {
        assert_eq!(parse_connect(&[]), Ok(Command::Connect(None)));
        assert_eq!(
            parse_connect(&args(&["aa:bb:cc:dd:ee:ff", "RANDOM"])),
            Ok(Command::Connect(Some(Peer {
                address: "AA:BB:CC:DD:EE:FF".parse()?,
                text: "aa:bb:cc:dd:ee:ff".to_string(),
                kind: AddressKind::Random,
            })))
        );
        assert_eq!(parse_connect(&args(&["nonsense"])), Err(ErrorCode::BadParam));
        assert_eq!(
            parse_connect(&args(&["aa:bb:cc:dd:ee:ff", "static"])),
            Err(ErrorCode::BadParam)
        );
        Ok(())
    }

    #[test]
    fn test_blank_lines_are_silent() -> Result<()> {
        let (mut conn, _) = setup();
        assert!(run(&mut conn, "")?.is_empty());
        assert!(run(&mut conn, "   \t ")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_unknown_and_malformed_lines() -> Result<()> {
        let (mut conn, _) = setup();
        assert_eq!(run(&mut conn, "frobnicate")?, ["rsp=$err code=$badcmd"]);
        assert_eq!(run(&mut conn, "conn 'unterminated")?, ["rsp=$err code=$badcmd"]);
        assert_eq!(run(&mut conn, "\"\"")?, ["rsp=$err code=$badcmd"]);
        Ok(())
    }

    #[test]
    fn test_names_are_case_insensitive() -> Result<()> {
        let (mut conn, _) = setup();
        assert_eq!(run(&mut conn, "STAT")?, ["rsp=$stat state=$disc mtu=h0 sec='low"]);
        Ok(())
    }

    #[test]
    fn test_state_gate_precedes_argument_checks() -> Result<()> {
        let (mut conn, log) = setup();
        for line in ["svcs", "char", "desc", "rd zz", "wrr 1 00", "wr", "mtu 5"] {
            assert_eq!(run(&mut conn, line)?, ["rsp=$err code=$badstate"], "{}", line);
        }
        assert!(log.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn test_bad_handles_when_connected() -> Result<()> {
        let (mut conn, log) = connected()?;
        assert_eq!(run(&mut conn, "rd zz")?, ["rsp=$err code=$badparam"]);
        assert_eq!(run(&mut conn, "rd 0")?, ["rsp=$err code=$badparam"]);
        assert_eq!(run(&mut conn, "rd")?, ["rsp=$err code=$badparam"]);
        assert!(log.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn test_read_is_submitted() -> Result<()> {
        let (mut conn, log) = connected()?;
        assert!(run(&mut conn, "rd 0x0010")?.is_empty());
        assert_eq!(*log.borrow(), [Call::Submit(Request::Read { handle: 0x10 })]);
        Ok(())
    }

    #[test]
    fn test_quoted_arguments() -> Result<()> {
        let (mut conn, log) = connected()?;
        run(&mut conn, "svcs '0x180A'")?;
        assert_eq!(
            *log.borrow(),
            [Call::Submit(Request::DiscoverPrimary {
                uuid: Some(AttUuid::Uuid16(0x180a))
            })]
        );
        Ok(())
    }

    #[test]
    fn test_secu_rejects_unknown_level() -> Result<()> {
        let (mut conn, _) = setup();
        assert_eq!(run(&mut conn, "secu ultra")?, ["rsp=$err code=$badparam"]);
        assert_eq!(conn.security(), SecurityLevel::Low);
        assert_eq!(run(&mut conn, "secu")?, ["rsp=$err code=$badparam"]);
        assert_eq!(
            run(&mut conn, "secu MEDIUM")?,
            ["rsp=$stat state=$disc mtu=h0 sec='medium"]
        );
        Ok(())
    }

    #[test]
    fn test_help_lists_commands_then_status() -> Result<()> {
        let (mut conn, _) = setup();
        let lines = run(&mut conn, "help")?;

        assert_eq!(lines.len(), COMMANDS.len() + 1);
        assert_eq!(
            lines[0],
            format!("#{:<15} {:<30} {}", "help", "", "Show this help")
        );
        assert!(lines[..COMMANDS.len()].iter().all(|l| l.starts_with('#')));
        assert_eq!(lines[COMMANDS.len()], "rsp=$stat state=$disc mtu=h0 sec='low");
        Ok(())
    }

    #[test]
    fn test_quit_exits() -> Result<()> {
        let (mut conn, _) = setup();
        assert_eq!(dispatch(&mut conn, "quit")?, Flow::Exit);
        assert_eq!(dispatch(&mut conn, "stat")?, Flow::Continue);
        Ok(())
    }
}
