//! Line-delimited control channel shared by the planner processes.
//!
//! A line reads `<name>: <payload>`. The payloads `Ping!`, `Pong!`, `Cycle`
//! and `Abort` are reserved; anything else is passed through as text.

use std::fmt;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

/// Reserved or free-form payload of a control line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Ping,
    Pong,
    Cycle,
    Abort,
    Text(String),
}

impl ControlCommand {
    fn parse(payload: &str) -> Self {
        match payload {
            "Ping!" => ControlCommand::Ping,
            "Pong!" => ControlCommand::Pong,
            "Cycle" => ControlCommand::Cycle,
            "Abort" => ControlCommand::Abort,
            other => ControlCommand::Text(other.to_string()),
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlCommand::Ping => f.write_str("Ping!"),
            ControlCommand::Pong => f.write_str("Pong!"),
            ControlCommand::Cycle => f.write_str("Cycle"),
            ControlCommand::Abort => f.write_str("Abort"),
            ControlCommand::Text(text) => f.write_str(text),
        }
    }
}

/// One addressed control line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub target: String,
    pub command: ControlCommand,
}

impl ControlMessage {
    pub fn new(target: impl Into<String>, command: ControlCommand) -> Self {
        Self {
            target: target.into(),
            command,
        }
    }

    /// Parse `<name>: <payload>`; `None` for lines without a target.
    pub fn parse(line: &str) -> Option<Self> {
        let (target, payload) = line.trim_end_matches(['\r', '\n']).split_once(':')?;
        let target = target.trim();
        if target.is_empty() || target.contains(char::is_whitespace) {
            return None;
        }
        Some(Self::new(target, ControlCommand::parse(payload.trim())))
    }

    pub fn is_for(&self, name: &str) -> bool {
        self.target == name
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.target, self.command)
    }
}

/// Forward parsed control lines from `reader` until it closes.
pub async fn forward_lines<R>(reader: R, tx: mpsc::Sender<ControlMessage>) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        match ControlMessage::parse(&line) {
            Some(message) => {
                if tx.send(message).await.is_err() {
                    break;
                }
            }
            None if line.trim().is_empty() => {}
            None => log::debug!("Ignoring control line without target: {}", line),
        }
    }
    Ok(())
}
