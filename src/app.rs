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

//! Main event loop: command lines in, link events in, response lines out.

use std::io::Write;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::bluetooth::{Connector, SecurityLevel};
use crate::commands::{self, Flow};
use crate::connection::Connection;

/// Serve commands from `input` until `quit` or end of input.
pub async fn run<C, R, W>(connector: C, security: SecurityLevel, input: R, output: W) -> Result<()>
where
    C: Connector,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut conn = Connection::new(connector, events_tx, output, security);
    let mut lines = input.lines();

    conn.output_mut()
        .comment(&format!(" gatt-bridge {}", env!("CARGO_PKG_VERSION")))
        .context("Failed to write banner")?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read command")? {
                    Some(line) => {
                        debug!("Command: {}", line);
                        let flow = commands::dispatch(&mut conn, &line)
                            .context("Failed to write response")?;
                        if flow == Flow::Exit {
                            info!("Quit requested");
                            break;
                        }
                    }
                    None => {
                        info!("Input closed");
                        break;
                    }
                }
            }
            Some(event) = events_rx.recv() => {
                conn.handle_event(event).context("Failed to write response")?;
            }
        }
    }

    conn.shutdown().context("Failed to write response")?;
    Ok(())
}
