use tracing::debug;

// ---------------------------------------------------------------------------
// SSE wire format
// ---------------------------------------------------------------------------

/// One decoded server-sent event: the optional `event:` name plus the joined
/// `data:` payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseMessage {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental parser for `text/event-stream` bodies.
///
/// Feed raw body chunks in arrival order; complete messages come back once
/// their terminating blank line has been seen. Chunk boundaries may fall
/// anywhere, including inside a UTF-8 sequence, because lines are only
/// decoded once their `\n` has arrived.
///
/// Handled per the wire format: multi-line `data:` accumulation, `event:`
/// names, CRLF line endings, `:` comment lines (keep-alives), and `id:` /
/// `retry:` fields (parsed, unused).
#[derive(Debug, Default)]
pub struct SseParser {
    buf: Vec<u8>,
    event: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns every message the chunk completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.buf.extend_from_slice(chunk);

        let mut messages = Vec::new();
        while let Some(line) = self.take_line() {
            if let Some(message) = self.handle_line(&line) {
                messages.push(message);
            }
        }
        messages
    }

    /// Pop the next complete line off the buffer, without its terminator.
    fn take_line(&mut self) -> Option<String> {
        let newline = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=newline).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn handle_line(&mut self, line: &str) -> Option<SseMessage> {
        // Blank line dispatches the buffered message. A blank line with no
        // buffered data resets the event name and emits nothing.
        if line.is_empty() {
            if self.data_lines.is_empty() {
                self.event = None;
                return None;
            }
            let message = SseMessage {
                event: self.event.take(),
                data: self.data_lines.join("\n"),
            };
            self.data_lines.clear();
            return Some(message);
        }

        // Comment / keep-alive line.
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data_lines.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" | "retry" => {}
            other => debug!("ignoring unknown SSE field: {}", other),
        }

        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
