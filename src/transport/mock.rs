//! Scripted transport double: records every frame written and answers
//! queries from per-opcode reply queues.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::Transport;
use crate::axis::AxisId;
use crate::protocol::command::OpCode;

#[derive(Default)]
struct Script {
    axis: AxisId,
    echo_prefix: bool,
    replies: HashMap<OpCode, VecDeque<String>>,
    pending: VecDeque<String>,
    writes: Vec<String>,
    discards: usize,
    fail_writes: bool,
}

/// Cloning shares the script, so a test can keep a handle after the
/// transport has been moved into a stage.
#[derive(Clone)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Script {
                echo_prefix: true,
                ..Script::default()
            })),
        }
    }

    /// Replies are consumed in order; the last one repeats forever.
    pub fn with_replies(self, opcode: OpCode, payloads: &[&str]) -> Self {
        self.push_replies(opcode, payloads);
        self
    }

    /// Answer with the bare payload, as controllers in the other framing
    /// mode do.
    pub fn without_prefix(self) -> Self {
        self.script().echo_prefix = false;
        self
    }

    pub fn push_replies(&self, opcode: OpCode, payloads: &[&str]) {
        let mut script = self.script();
        let queue = script.replies.entry(opcode).or_default();
        queue.extend(payloads.iter().map(|p| p.to_string()));
    }

    /// Drops queued replies for `opcode` and installs new ones.
    pub fn set_replies(&self, opcode: OpCode, payloads: &[&str]) {
        let mut script = self.script();
        script.replies.insert(
            opcode,
            payloads.iter().map(|p| p.to_string()).collect(),
        );
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.script().fail_writes = fail;
    }

    /// Written frames with the terminator trimmed, e.g. `"1PA12.5"`.
    pub fn writes(&self) -> Vec<String> {
        self.script().writes.clone()
    }

    pub fn count(&self, opcode: OpCode) -> usize {
        let script = self.script();
        let prefix = format!("{}{}", script.axis, opcode);
        script
            .writes
            .iter()
            .filter(|w| w.starts_with(&prefix))
            .count()
    }

    pub fn discard_count(&self) -> usize {
        self.script().discards
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let mut script = self.script();
        if script.fail_writes {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted write failure",
            ));
        }

        let frame = String::from_utf8_lossy(bytes).trim().to_string();
        let axis_prefix = script.axis.to_string();
        let opcode = frame
            .strip_prefix(axis_prefix.as_str())
            .and_then(|rest| rest.get(..2))
            .and_then(|code| code.parse::<OpCode>().ok());
        script.writes.push(frame);

        let Some(opcode) = opcode.filter(|op| op.expects_reply()) else {
            return Ok(());
        };

        let payload = match script.replies.get_mut(&opcode) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        if let Some(payload) = payload {
            let line = if script.echo_prefix {
                format!("{}{}{}\r", script.axis, opcode, payload)
            } else {
                format!("{}\r", payload)
            };
            script.pending.push_back(line);
        }
        Ok(())
    }

    async fn read_line(&mut self, timeout: Duration) -> std::io::Result<String> {
        let line = self.script().pending.pop_front();
        match line {
            Some(line) => Ok(line),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(String::new())
            }
        }
    }

    async fn discard_input(&mut self) -> std::io::Result<()> {
        let mut script = self.script();
        script.pending.clear();
        script.discards += 1;
        Ok(())
    }
}
