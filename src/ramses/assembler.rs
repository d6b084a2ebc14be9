/// Stream framing for the transceiver's ASCII output
use log::{debug, trace};

/// Buffer size at which unframed input is cut back
pub const BUFFER_CAP: usize = 8 * 1024;
/// Trailing window kept after a cut
pub const BUFFER_KEEP: usize = 4 * 1024;
/// Line terminator added to every frame written downstream
pub const LINE_TERMINATOR: &str = "\r\n";

/// Turns chunked serial reads into complete frame texts
///
/// A frame starts at a boundary `NNN <verb> ---` (three digits, blanks, a
/// one or two letter verb, blanks, the `---` marker) and ends at the first
/// newline or the next boundary, whichever comes first. Bytes outside any
/// frame are dropped. The tail after the last boundary is held back until
/// it is terminated, so the same stream yields the same frames however it
/// is chunked.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        FrameAssembler {
            buffer: Vec::with_capacity(512),
        }
    }

    /// Append freshly read bytes and return every frame they complete
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer
            .extend(bytes.iter().map(|&b| if b == b'\r' { b'\n' } else { b }));

        let starts = find_boundaries(&self.buffer);
        let mut frames = Vec::new();

        let last = match starts.last() {
            Some(&last) => last,
            None => {
                self.enforce_cap();
                return frames;
            }
        };

        if starts[0] > 0 {
            trace!("Dropping {} unframed bytes", starts[0]);
        }

        for pair in starts.windows(2) {
            push_frame(&mut frames, &self.buffer[pair[0]..pair[1]]);
        }

        let tail = &self.buffer[last..];
        let retained = match tail.iter().rposition(|&b| b == b'\n') {
            Some(last_newline) => {
                push_frame(&mut frames, tail);
                last + last_newline + 1
            }
            None => last,
        };
        self.buffer.drain(..retained);
        self.enforce_cap();

        frames
    }

    /// Bytes to write for a frame text, terminated exactly once
    pub fn format_for_write(text: &str) -> Vec<u8> {
        let mut out = text.as_bytes().to_vec();
        if !text.ends_with('\n') {
            out.extend_from_slice(LINE_TERMINATOR.as_bytes());
        }
        out
    }

    /// Number of bytes currently held back
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn enforce_cap(&mut self) {
        if self.buffer.len() > BUFFER_CAP {
            let discard = self.buffer.len() - BUFFER_KEEP;
            debug!(
                "No frame boundary in {} bytes, discarding oldest {}",
                self.buffer.len(),
                discard
            );
            self.buffer.drain(..discard);
        }
    }
}

/// Emit the part of a span up to its first newline, trimmed
fn push_frame(frames: &mut Vec<String>, span: &[u8]) {
    let end = span.iter().position(|&b| b == b'\n').unwrap_or(span.len());
    let text = String::from_utf8_lossy(&span[..end]);
    let text = text.trim();
    if !text.is_empty() {
        frames.push(text.to_string());
    }
}

/// Start offsets of every boundary pattern, left to right, non-overlapping
fn find_boundaries(buf: &[u8]) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i < buf.len() {
        match match_boundary(&buf[i..]) {
            Some(len) => {
                starts.push(i);
                i += len;
            }
            None => i += 1,
        }
    }
    starts
}

/// Length of the boundary pattern if `buf` starts with one
fn match_boundary(buf: &[u8]) -> Option<usize> {
    if buf.len() < 3 || !buf[..3].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let mut pos = 3;

    pos += blanks(&buf[pos..])?;

    let verb = buf[pos..]
        .iter()
        .take_while(|b| b.is_ascii_alphabetic())
        .count();
    if !(1..=2).contains(&verb) {
        return None;
    }
    pos += verb;

    pos += blanks(&buf[pos..])?;

    if buf[pos..].starts_with(b"---") {
        Some(pos + 3)
    } else {
        None
    }
}

/// Count of leading spaces/tabs, None when there are none
fn blanks(buf: &[u8]) -> Option<usize> {
    let n = buf
        .iter()
        .take_while(|&&b| b == b' ' || b == b'\t')
        .count();
    if n == 0 {
        None
    } else {
        Some(n)
    }
}
