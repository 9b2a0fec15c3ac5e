//! Delimiter framing for the chat wire protocol
//!
//! Every frame on the wire is the UTF-8 text of one message followed by
//! [`END_OF_MSG`]. A single read from a socket may carry several frames, a
//! fraction of one, or both, so decoding always threads a remainder from
//! one call into the next.
//!
//! The delimiter is never escaped. A body that contains it will be split
//! into two frames by the receiver.

use crate::END_OF_MSG;

/// Result of one [`decode`] call
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Decoded {
    /// Complete frames in wire order, delimiter stripped
    pub frames: Vec<String>,
    /// Trailing bytes that do not yet form a complete frame
    pub remainder: Vec<u8>,
}

/// Appends the frame delimiter to a message
pub fn encode(message: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(message.len() + END_OF_MSG.len());
    bytes.extend_from_slice(message.as_bytes());
    bytes.extend_from_slice(END_OF_MSG.as_bytes());
    bytes
}

/// Splits `previous ++ new_bytes` on the delimiter
///
/// Every piece except the last is a complete frame; the last piece (possibly
/// empty) is returned as the new remainder. Splitting happens on raw bytes so
/// a multi-byte character cut by a read boundary is reassembled on the next
/// call instead of being mangled.
pub fn decode(previous: &[u8], new_bytes: &[u8]) -> Decoded {
    let mut buffer = Vec::with_capacity(previous.len() + new_bytes.len());
    buffer.extend_from_slice(previous);
    buffer.extend_from_slice(new_bytes);

    let frames = split_frames(&mut buffer, 0);
    Decoded {
        frames,
        remainder: buffer,
    }
}

/// Removes every complete frame from the front of `buffer`
///
/// The search starts at `search_from`; bytes before it are known not to
/// contain the start of a delimiter.
fn split_frames(buffer: &mut Vec<u8>, mut search_from: usize) -> Vec<String> {
    let delimiter = END_OF_MSG.as_bytes();
    let mut frames = Vec::new();
    let mut start = 0;

    while let Some(offset) = find(&buffer[search_from..], delimiter) {
        let end = search_from + offset;
        frames.push(String::from_utf8_lossy(&buffer[start..end]).into_owned());
        start = end + delimiter.len();
        search_from = start;
    }

    buffer.drain(..start);
    frames
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Stateful decoder that owns the remainder
///
/// The remainder never contains a whole delimiter, so each push only scans
/// the new bytes plus the few remainder bytes a split delimiter could start
/// in. Feeding a long unterminated frame costs linear time overall.
#[derive(Debug, Default, Clone)]
pub struct FrameBuffer {
    remainder: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds freshly read bytes and returns the frames they completed
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        if bytes.is_empty() {
            return Vec::new();
        }
        let search_from = self
            .remainder
            .len()
            .saturating_sub(END_OF_MSG.len() - 1);
        self.remainder.extend_from_slice(bytes);
        split_frames(&mut self.remainder, search_from)
    }

    /// Bytes received so far that are not yet a complete frame
    pub fn pending(&self) -> &[u8] {
        &self.remainder
    }

    pub fn has_partial_frame(&self) -> bool {
        !self.remainder.is_empty()
    }
}
