//! Client-side incremental frame reader.

use futures::{Stream, StreamExt};
use thiserror::Error;
use tracing::debug;

use crate::frame::StreamFrame;

/// Errors surfaced while reading a frame stream to completion.
#[derive(Debug, Error)]
pub enum StreamReadError {
    /// The server sent a terminal error frame.
    #[error("{0}")]
    Frame(String),

    /// The underlying transport failed before a terminal frame arrived.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Event produced by [`FrameReader::feed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderEvent {
    /// A chunk arrived; carries the full accumulated text so far, not the
    /// delta.
    Text(String),
    /// The done frame arrived; carries the final accumulated text.
    Done(String),
    /// An error frame arrived. The accumulator is left untouched.
    Error(String),
}

/// Incremental parser that reconstructs [`StreamFrame`]s from raw bytes.
///
/// Network reads may split a frame line anywhere, including inside a UTF-8
/// sequence. The reader buffers the incomplete tail and only parses complete
/// newline-terminated lines, so feeding the same stream in different
/// fragmentations yields the same events. Lines that fail to parse are logged
/// and skipped without ending the stream.
#[derive(Debug, Default)]
pub struct FrameReader {
    buffer: Vec<u8>,
    text: String,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// The accumulated chunk text seen so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consume one network read and return the frame events it completes.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ReaderEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = self.parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    fn parse_line(&mut self, line: &[u8]) -> Option<ReaderEvent> {
        let line = match std::str::from_utf8(line) {
            Ok(line) => line.trim(),
            Err(err) => {
                debug!(error = %err, "skipping non-UTF-8 frame line");
                return None;
            }
        };

        // Blank separator lines between events.
        if line.is_empty() {
            return None;
        }

        let payload = line.strip_prefix("data:")?.trim_start();

        match serde_json::from_str::<StreamFrame>(payload) {
            Ok(StreamFrame::Chunk { chunk }) => {
                self.text.push_str(&chunk);
                Some(ReaderEvent::Text(self.text.clone()))
            }
            Ok(StreamFrame::Done { .. }) => Some(ReaderEvent::Done(self.text.clone())),
            Ok(StreamFrame::Error { error }) => Some(ReaderEvent::Error(error)),
            Err(err) => {
                debug!(error = %err, line = %line, "skipping unparseable frame line");
                None
            }
        }
    }
}

/// Drive a byte stream through a [`FrameReader`] until a terminal frame.
///
/// `on_text` is invoked with the accumulated text after every chunk frame.
/// Returns the final text on a done frame; an error frame surfaces as
/// [`StreamReadError::Frame`]. A transport end without a terminal frame
/// resolves with whatever text accumulated, matching how a display client
/// keeps the partial reply it already rendered.
pub async fn read_frame_stream<S, B, E>(
    stream: S,
    mut on_text: impl FnMut(&str),
) -> Result<String, StreamReadError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut reader = FrameReader::new();

    while let Some(read) = stream.next().await {
        let bytes = read.map_err(|err| StreamReadError::Transport(err.to_string()))?;
        for event in reader.feed(bytes.as_ref()) {
            match event {
                ReaderEvent::Text(text) => on_text(&text),
                ReaderEvent::Done(text) => return Ok(text),
                ReaderEvent::Error(message) => return Err(StreamReadError::Frame(message)),
            }
        }
    }

    Ok(reader.text().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(reader: &mut FrameReader, frames: &[StreamFrame]) -> Vec<ReaderEvent> {
        let mut events = Vec::new();
        for frame in frames {
            events.extend(reader.feed(frame.encode().as_bytes()));
        }
        events
    }

    #[test]
    fn test_chunks_accumulate() {
        let mut reader = FrameReader::new();
        let events = feed_all(
            &mut reader,
            &[
                StreamFrame::chunk("Hola "),
                StreamFrame::chunk("mundo"),
                StreamFrame::chunk("!"),
                StreamFrame::done(),
            ],
        );

        assert_eq!(
            events,
            vec![
                ReaderEvent::Text("Hola ".into()),
                ReaderEvent::Text("Hola mundo".into()),
                ReaderEvent::Text("Hola mundo!".into()),
                ReaderEvent::Done("Hola mundo!".into()),
            ]
        );
    }

    #[test]
    fn test_fragmented_frame_parses_once() {
        let line = StreamFrame::chunk("split me").encode();
        let bytes = line.as_bytes();

        // Any split point must yield exactly one chunk event.
        for cut in 1..bytes.len() {
            let mut reader = FrameReader::new();
            let mut events = reader.feed(&bytes[..cut]);
            events.extend(reader.feed(&bytes[cut..]));
            assert_eq!(events, vec![ReaderEvent::Text("split me".into())], "cut at {cut}");
        }
    }

    #[test]
    fn test_utf8_split_across_reads() {
        let line = StreamFrame::chunk("héllo").encode();
        let bytes = line.as_bytes();
        // Split inside the two-byte 'é' sequence.
        let cut = bytes.iter().position(|&b| b >= 0x80).unwrap() + 1;

        let mut reader = FrameReader::new();
        let mut events = reader.feed(&bytes[..cut]);
        events.extend(reader.feed(&bytes[cut..]));
        assert_eq!(events, vec![ReaderEvent::Text("héllo".into())]);
    }

    #[test]
    fn test_unparseable_line_is_skipped() {
        let mut reader = FrameReader::new();
        let mut events = reader.feed(b"data: {not json}\n\n");
        assert!(events.is_empty());

        events.extend(reader.feed(StreamFrame::chunk("still alive").encode().as_bytes()));
        assert_eq!(events, vec![ReaderEvent::Text("still alive".into())]);
    }

    #[test]
    fn test_non_data_lines_ignored() {
        let mut reader = FrameReader::new();
        let events = reader.feed(b": keepalive comment\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn test_error_frame_does_not_touch_accumulator() {
        let mut reader = FrameReader::new();
        let events = feed_all(
            &mut reader,
            &[StreamFrame::chunk("partial"), StreamFrame::error("upstream failed")],
        );

        assert_eq!(
            events,
            vec![
                ReaderEvent::Text("partial".into()),
                ReaderEvent::Error("upstream failed".into()),
            ]
        );
        assert_eq!(reader.text(), "partial");
    }

    #[test]
    fn test_multiple_frames_in_one_read() {
        let mut reader = FrameReader::new();
        let combined = format!(
            "{}{}",
            StreamFrame::chunk("a").encode(),
            StreamFrame::done().encode()
        );
        let events = reader.feed(combined.as_bytes());
        assert_eq!(
            events,
            vec![ReaderEvent::Text("a".into()), ReaderEvent::Done("a".into())]
        );
    }

    #[tokio::test]
    async fn test_read_frame_stream_happy_path() {
        let reads: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(StreamFrame::chunk("Hola ").encode().into_bytes()),
            Ok(StreamFrame::chunk("mundo!").encode().into_bytes()),
            Ok(StreamFrame::done().encode().into_bytes()),
        ];

        let mut snapshots = Vec::new();
        let text = read_frame_stream(futures::stream::iter(reads), |t| {
            snapshots.push(t.to_string());
        })
        .await
        .unwrap();

        assert_eq!(text, "Hola mundo!");
        assert_eq!(snapshots, vec!["Hola ".to_string(), "Hola mundo!".to_string()]);
    }

    #[tokio::test]
    async fn test_read_frame_stream_error_frame() {
        let reads: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(StreamFrame::chunk("x").encode().into_bytes()),
            Ok(StreamFrame::error("model unavailable").encode().into_bytes()),
        ];

        let err = read_frame_stream(futures::stream::iter(reads), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, StreamReadError::Frame(message) if message == "model unavailable"));
    }
}
