//! Stdout reader task for one agent subprocess.
//!
//! Decodes NDJSON lines via [`AgentCodec`], forwards every message as an
//! [`AgentEvent::Message`], and remembers what the supervisor needs to
//! decide the agent's terminal state. Malformed and over-long lines are
//! logged and skipped; they never end the stream.

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use crate::agent::codec::{AgentCodec, LINE_TOO_LONG};
use crate::agent::protocol::{parse_line, AgentMessage, ResultMessage};
use crate::agent::AgentEvent;
use crate::AppError;

/// What the reader saw before the stream closed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSummary {
    /// Last terminal `result` message.
    pub result: Option<ResultMessage>,
    /// Sidecar session id from the `system` message or the result.
    pub session_id: Option<String>,
    /// Last `error` message text.
    pub last_error: Option<String>,
    /// Lines skipped because they could not be decoded.
    pub skipped_lines: usize,
    /// Set when the stream ended on an I/O error instead of EOF.
    pub stream_error: Option<String>,
}

/// Consume `stdout` until EOF, forwarding messages through `event_tx`.
///
/// A closed event channel does not stop the reader: the summary is still
/// needed to finalize the agent.
pub async fn run_reader<R>(
    agent_id: String,
    stdout: R,
    event_tx: mpsc::Sender<AgentEvent>,
) -> StreamSummary
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, AgentCodec::new());
    let mut summary = StreamSummary::default();
    let mut forward = true;
    // `FramedRead` yields one `None` right after a decode error before it
    // resumes reading; only a `None` outside that pause is EOF.
    let mut paused_after_error = false;

    loop {
        let Some(item) = framed.next().await else {
            if std::mem::take(&mut paused_after_error) {
                continue;
            }
            break;
        };
        let line = match item {
            Ok(line) => line,
            Err(AppError::Agent(ref msg)) if msg.starts_with(LINE_TOO_LONG) => {
                warn!(agent_id, error = msg.as_str(), "agent reader: oversized line, skipping");
                summary.skipped_lines += 1;
                paused_after_error = true;
                continue;
            }
            Err(err) => {
                warn!(agent_id, error = %err, "agent reader: stream error, stopping");
                summary.stream_error = Some(err.to_string());
                break;
            }
        };

        let message = match parse_line(&line) {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(err) => {
                warn!(
                    agent_id,
                    error = %err,
                    raw_line = %line,
                    "agent reader: parse error, skipping line"
                );
                summary.skipped_lines += 1;
                continue;
            }
        };

        match &message {
            AgentMessage::System { session_id, .. } => {
                if session_id.is_some() {
                    summary.session_id.clone_from(session_id);
                }
            }
            AgentMessage::Result(result) => {
                if result.session_id.is_some() {
                    summary.session_id.clone_from(&result.session_id);
                }
                summary.result = Some(result.clone());
            }
            AgentMessage::Error { message } => {
                summary.last_error = Some(message.clone());
            }
            AgentMessage::Assistant { .. } | AgentMessage::Other { .. } => {}
        }

        if forward {
            let event = AgentEvent::Message {
                agent_id: agent_id.clone(),
                message,
            };
            if event_tx.send(event).await.is_err() {
                debug!(agent_id, "agent reader: event channel closed, no longer forwarding");
                forward = false;
            }
        }
    }

    debug!(agent_id, skipped = summary.skipped_lines, "agent reader: stream closed");
    summary
}
