//! Concurrent draining of the interpreter's stdout and stderr.
//!
//! Each pipe gets its own reader task. Readers forward decoded chunks over a
//! shared channel as they arrive and finish with a `Closed` marker, which is
//! sent even when the stream produced nothing.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const READ_BUFFER_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOrigin {
    Stdout,
    Stderr,
}

impl StreamOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSignal {
    Chunk { origin: StreamOrigin, text: String },
    Closed(StreamOrigin),
}

/// Full-text copies of both streams, kept for persistence.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    pub fn append(&mut self, origin: StreamOrigin, text: &str) {
        match origin {
            StreamOrigin::Stdout => self.stdout.push_str(text),
            StreamOrigin::Stderr => self.stderr.push_str(text),
        }
    }
}

pub fn spawn_reader<R>(
    reader: R,
    origin: StreamOrigin,
    signals: mpsc::UnboundedSender<StreamSignal>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(pump(reader, origin, signals))
}

async fn pump<R>(mut reader: R, origin: StreamOrigin, signals: mpsc::UnboundedSender<StreamSignal>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut decoder = Utf8Decoder::default();

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.decode(&buf[..n]);
                if !text.is_empty() && signals.send(StreamSignal::Chunk { origin, text }).is_err() {
                    // Supervisor already finalized and stopped listening.
                    return;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!("Failed to read interpreter {}: {}", origin.as_str(), e);
                break;
            }
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        let _ = signals.send(StreamSignal::Chunk { origin, text: tail });
    }
    let _ = signals.send(StreamSignal::Closed(origin));
}

/// Incremental UTF-8 decoding that carries a split multi-byte sequence over
/// to the next read. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let input = std::mem::take(&mut self.pending);

        let mut out = String::with_capacity(input.len());
        let mut rest = input.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, invalid) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &invalid[len..];
                        }
                        None => {
                            rest = invalid;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }

    fn finish(self) -> String {
        String::from_utf8_lossy(&self.pending).into_owned()
    }
}
