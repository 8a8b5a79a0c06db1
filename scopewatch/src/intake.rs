//! JSON-lines intake for `scopewatch run`.
//!
//! Each stdin line carries one message:
//!
//! ```text
//! {"type":"navigation","url":"https://www.lib.edu/","top_level":true}
//! {"type":"queue.flush"}
//! ```
//!
//! A flush request is answered on stdout with
//! `{"type":"queue.flush.result","ok":true}`.

use scopewatch_core::{FlushReply, NavigationEvent};
use serde::{Deserialize, Serialize};

/// One intake line
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum IntakeMessage {
    #[serde(rename = "navigation")]
    Navigation(NavigationEvent),

    #[serde(rename = "queue.flush")]
    QueueFlush,
}

/// Reply line for a `queue.flush` request
#[derive(Debug, Serialize)]
pub struct FlushResult {
    #[serde(rename = "type")]
    message_type: &'static str,
    ok: bool,
}

impl From<FlushReply> for FlushResult {
    fn from(reply: FlushReply) -> Self {
        Self {
            message_type: "queue.flush.result",
            ok: reply.ok,
        }
    }
}

/// Parse one raw intake line. Blank lines yield `None`.
///
/// Lines are taken as bytes so that invalid UTF-8 is reported as a
/// malformed message instead of failing the read.
pub fn parse_line(line: &[u8]) -> serde_json::Result<Option<IntakeMessage>> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(line).map(Some)
}
