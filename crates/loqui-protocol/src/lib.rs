//! Wire protocol for Loqui chat streaming.
//!
//! A streaming session is delivered as a sequence of server-sent-event lines,
//! one frame per line: `data: <JSON>\n\n`. The JSON payload is the
//! [`StreamFrame`] union. Frames are totally ordered within a session and the
//! stream always ends with a terminal frame (`done` or `error`).
//!
//! The server side encodes frames with [`StreamFrame::encode`]; clients
//! reconstruct them from raw network reads with [`FrameReader`], which
//! tolerates frames fragmented across arbitrary byte boundaries.

mod frame;
mod reader;

pub use frame::StreamFrame;
pub use reader::{FrameReader, ReaderEvent, StreamReadError, read_frame_stream};
