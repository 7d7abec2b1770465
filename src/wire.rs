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

//! Response line encoding for the controller protocol.
//!
//! Every response is a single line: `rsp=$<type>` followed by
//! space-separated `key=<prefix><value>` fields. The prefix tells the
//! controller how to read the value:
//!
//! * `$` symbolic token
//! * `h` unsigned integer, uppercase hex
//! * `'` raw string, not escaped
//! * `b` byte blob, uppercase hex

use std::fmt::{self, Write as _};
use std::io::{self, Write};

/// Field tags.
pub mod tag {
    pub const RESPONSE: &str = "rsp";
    pub const ERROR_CODE: &str = "code";
    pub const HANDLE: &str = "hnd";
    pub const UUID: &str = "uuid";
    pub const DATA: &str = "d";
    pub const CONN_STATE: &str = "state";
    pub const SEC_LEVEL: &str = "sec";
    pub const MTU: &str = "mtu";
    pub const DEVICE: &str = "dst";
    pub const RANGE_START: &str = "hstart";
    pub const RANGE_END: &str = "hend";
    pub const PROPERTIES: &str = "props";
    pub const VALUE_HANDLE: &str = "vhnd";
}

/// Value of the `rsp` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Error,
    Status,
    Notify,
    Indication,
    Discovery,
    Descriptors,
    Read,
    Write,
}

impl ResponseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "err",
            Self::Status => "stat",
            Self::Notify => "ntfy",
            Self::Indication => "ind",
            Self::Discovery => "find",
            Self::Descriptors => "desc",
            Self::Read => "rd",
            Self::Write => "wr",
        }
    }
}

/// Value of the `code` field of an error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ConnFail,
    ComErr,
    ProtoErr,
    NotFound,
    BadCmd,
    BadParam,
    BadState,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnFail => "connfail",
            Self::ComErr => "comerr",
            Self::ProtoErr => "protoerr",
            Self::NotFound => "notfound",
            Self::BadCmd => "badcmd",
            Self::BadParam => "badparam",
            Self::BadState => "badstate",
        }
    }
}

/// One response line under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    line: String,
}

impl Response {
    pub fn new(kind: ResponseKind) -> Self {
        Self {
            line: format!("{}=${}", tag::RESPONSE, kind.as_str()),
        }
    }

    /// `rsp=$err code=$<code>`
    pub fn error(code: ErrorCode) -> Self {
        Self::new(ResponseKind::Error).sym(tag::ERROR_CODE, code.as_str())
    }

    // Writing into a String cannot fail.
    pub fn sym(mut self, tag: &str, value: &str) -> Self {
        let _ = write!(self.line, " {}=${}", tag, value);
        self
    }

    pub fn uint(mut self, tag: &str, value: impl Into<u32>) -> Self {
        let _ = write!(self.line, " {}=h{:X}", tag, value.into());
        self
    }

    /// The value must not contain a space; nothing is escaped.
    pub fn str(mut self, tag: &str, value: &str) -> Self {
        let _ = write!(self.line, " {}='{}", tag, value);
        self
    }

    pub fn data(mut self, value: &[u8]) -> Self {
        let _ = write!(self.line, " {}=b{}", tag::DATA, hex::encode_upper(value));
        self
    }

    pub fn as_str(&self) -> &str {
        &self.line
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

/// Line sink that flushes after every line.
pub struct Output<W: Write> {
    writer: W,
}

impl<W: Write> Output<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn send(&mut self, response: &Response) -> io::Result<()> {
        writeln!(self.writer, "{}", response)?;
        self.writer.flush()
    }

    /// Informational line, prefixed with `#` so controllers can skip it.
    pub fn comment(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.writer, "#{}", text)?;
        self.writer.flush()
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }
}
