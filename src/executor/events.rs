//! Events of the live execution stream and display cleanup of interpreter
//! output.
//!
//! On the wire each event is one server-sent event whose `event` field is
//! the kind and whose `data` is the payload as a JSON string, so embedded
//! newlines never split a frame.

use super::multiplexer::StreamOrigin;
use crate::models::ExecutionStatus;
use axum::response::sse::Event;
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// CSI sequences (cursor movement, colors), OSC sequences (window titles,
/// hyperlinks) and the remaining two-byte escapes. A stray ESC that starts
/// none of these is matched on its own.
static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b(?:\[[0-?]*[ -/]*[@-~]|\][^\x07\x1b]*(?:\x07|\x1b\\)|[0-Z\\-_])?")
        .expect("constant regex pattern is valid")
});

const ESC: char = '\x1b';

/// Longest unterminated escape held back waiting for the next chunk.
const MAX_HELD_ESCAPE: usize = 4 * 1024;

/// Removes terminal control sequences for display. Never apply this to
/// text that is persisted.
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    ANSI_ESCAPE.replace_all(text, "")
}

/// Strips escapes from one output stream chunk by chunk. A sequence cut off
/// at the end of a chunk is held until the next one completes it.
#[derive(Debug, Default)]
pub struct AnsiFilter {
    held: String,
}

impl AnsiFilter {
    pub fn push(&mut self, chunk: &str) -> String {
        self.held.push_str(chunk);
        let text = std::mem::take(&mut self.held);
        match unfinished_escape_at(&text) {
            Some(at) => {
                self.held = text[at..].to_string();
                strip_ansi(&text[..at]).into_owned()
            }
            None => strip_ansi(&text).into_owned(),
        }
    }

    /// Releases whatever is still held once the stream has ended.
    pub fn finish(self) -> String {
        strip_ansi(&self.held).into_owned()
    }
}

/// Position of an escape sequence that runs to the end of `text` without
/// being terminated.
fn unfinished_escape_at(text: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(offset) = text[from..].find(ESC) {
        let start = from + offset;
        let tail = &text[start..];
        if tail.len() <= MAX_HELD_ESCAPE && could_continue(tail) {
            return Some(start);
        }
        from = match ANSI_ESCAPE.find_at(text, start) {
            Some(m) if m.start() == start => m.end(),
            _ => start + 1,
        };
    }
    None
}

/// Whether more input could still turn `tail` (starting at ESC) into a
/// complete sequence.
fn could_continue(tail: &str) -> bool {
    let rest = &tail[ESC.len_utf8()..];
    if rest.is_empty() {
        return true;
    }
    if let Some(csi) = rest.strip_prefix('[') {
        // Parameter and intermediate bytes only, final byte not seen yet.
        return csi.chars().all(|c| ('\x20'..='\x3f').contains(&c));
    }
    if let Some(osc) = rest.strip_prefix(']') {
        if osc.contains('\x07') {
            return false;
        }
        // The only ESC allowed is the first half of a pending `ESC \`.
        return match osc.find(ESC) {
            None => true,
            Some(i) => i + ESC.len_utf8() == osc.len(),
        };
    }
    false
}

/// Stdout and stderr events carry display text: escapes already stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionEvent {
    ExecutionId(String),
    Stdout(String),
    Stderr(String),
    Error(String),
    Done(ExecutionStatus),
}

impl ExecutionEvent {
    pub fn output(origin: StreamOrigin, text: String) -> Self {
        match origin {
            StreamOrigin::Stdout => Self::Stdout(text),
            StreamOrigin::Stderr => Self::Stderr(text),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExecutionId(_) => "execution_id",
            Self::Stdout(_) => "stdout",
            Self::Stderr(_) => "stderr",
            Self::Error(_) => "error",
            Self::Done(_) => "done",
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            Self::ExecutionId(id) => id,
            Self::Stdout(text) | Self::Stderr(text) | Self::Error(text) => text,
            Self::Done(status) => status.as_str(),
        }
    }

    /// The payload quoted as a JSON string.
    pub fn data(&self) -> String {
        serde_json::Value::String(self.payload().to_string()).to_string()
    }

    pub fn to_sse(&self) -> Event {
        Event::default().event(self.kind()).data(self.data())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_carries_status_token() {
        let success = ExecutionEvent::Done(ExecutionStatus::Success);
        assert_eq!(success.kind(), "done");
        assert_eq!(success.data(), "\"SUCCESS\"");
        assert_eq!(ExecutionEvent::Done(ExecutionStatus::Failed).data(), "\"FAILED\"");
    }

    #[test]
    fn newlines_and_quotes_stay_on_one_data_line() {
        let event = ExecutionEvent::Stdout("line \"one\"\nline two\r\n".to_string());
        let data = event.data();
        assert_eq!(data, "\"line \\\"one\\\"\\nline two\\r\\n\"");
        assert!(!data.contains('\n') && !data.contains('\r'));
    }

    #[test]
    fn error_events_keep_text() {
        let event = ExecutionEvent::Error("pwsh exited with code 1".to_string());
        assert_eq!(event.kind(), "error");
        assert_eq!(event.data(), "\"pwsh exited with code 1\"");
    }

    #[test]
    fn strips_cursor_color_and_title_sequences() {
        let raw = "\u{1b}[2K\u{1b}[1G\u{1b}[32;1mOK\u{1b}[0m \u{1b}]0;title\u{7}done\u{1b}=";
        assert_eq!(strip_ansi(raw), "OK done");
    }

    #[test]
    fn plain_text_is_borrowed() {
        assert!(matches!(strip_ansi("nothing to strip"), Cow::Borrowed(_)));
    }

    #[test]
    fn filter_holds_csi_split_across_chunks() {
        let mut filter = AnsiFilter::default();
        assert_eq!(filter.push("before \u{1b}[3"), "before ");
        assert_eq!(filter.push("1mred\u{1b}[0m\n"), "red\n");
        assert!(filter.finish().is_empty());
    }

    #[test]
    fn filter_holds_lone_escape_and_osc_terminator() {
        let mut filter = AnsiFilter::default();
        assert_eq!(filter.push("a\u{1b}"), "a");
        assert_eq!(filter.push("[0mb"), "b");

        assert_eq!(filter.push("\u{1b}]0;my title\u{1b}"), "");
        assert_eq!(filter.push("\\c"), "c");
    }

    #[test]
    fn filter_passes_complete_text_through() {
        let mut filter = AnsiFilter::default();
        assert_eq!(filter.push("\u{1b}[1mbold\u{1b}[0m done\n"), "bold done\n");
        assert_eq!(filter.push("plain"), "plain");
    }

    #[test]
    fn filter_releases_broken_sequences() {
        let mut filter = AnsiFilter::default();
        // Not a valid CSI byte, so nothing is held.
        assert_eq!(filter.push("\u{1b}[\u{1}x"), "[\u{1}x");

        assert_eq!(filter.push("tail \u{1b}[12"), "tail ");
        assert_eq!(filter.finish(), "[12");
    }
}
