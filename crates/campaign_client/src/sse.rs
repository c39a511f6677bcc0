//! Incremental decoder for `text/event-stream` bodies.

use std::time::Duration;

use snafu::Snafu;

/// Longest unterminated line buffered before the stream is given up on.
pub(crate) const MAX_LINE_BYTES: usize = 256 * 1024;

/// A line grew past [`MAX_LINE_BYTES`] without a terminating newline.
#[derive(Debug, Snafu)]
#[snafu(display("Event stream line exceeded {} bytes without a newline", limit))]
pub(crate) struct LineTooLong {
    limit: usize,
}

/// One dispatched server-sent event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SseEvent {
    /// `None` for unnamed events, which clients treat as `message`.
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl SseEvent {
    pub fn is_message(&self) -> bool {
        self.event.as_deref().is_none_or(|name| name == "message")
    }
}

/// Turns body chunks into events. Chunk boundaries may fall anywhere,
/// including inside a line or a multi-byte character.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    pending: Vec<u8>,
    data: String,
    has_data: bool,
    event: Option<String>,
    last_id: Option<String>,
    retry: Option<Duration>,
}

impl SseDecoder {
    /// Feeds one body chunk and returns the events it completed.
    ///
    /// Fails once a partial line outgrows [`MAX_LINE_BYTES`]; the decoder is
    /// reset and events completed by the same chunk are dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, LineTooLong> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        if self.pending.len() > MAX_LINE_BYTES {
            *self = SseDecoder::default();
            return LineTooLongSnafu {
                limit: MAX_LINE_BYTES,
            }
            .fail();
        }
        Ok(events)
    }

    /// Reconnection delay most recently requested by a `retry:` field.
    pub fn take_retry(&mut self) -> Option<Duration> {
        self.retry.take()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "event" => self.event = Some(value.to_string()),
            "id" if !value.contains('\0') => self.last_id = Some(value.to_string()),
            "retry" => {
                if let Ok(millis) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(millis));
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if !self.has_data {
            return None;
        }
        self.has_data = false;
        Some(SseEvent {
            event,
            data: std::mem::take(&mut self.data),
            id: self.last_id.clone(),
        })
    }
}
