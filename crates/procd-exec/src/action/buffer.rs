//! Bounded byte buffer shared between a reader thread and the dispatcher.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Ring buffer that keeps the newest `ceiling` bytes.
#[derive(Debug)]
pub(crate) struct OutputBuffer {
    bytes: Mutex<VecDeque<u8>>,
    ceiling: usize,
}

impl OutputBuffer {
    pub(crate) fn new(ceiling: usize) -> Self {
        Self {
            bytes: Mutex::new(VecDeque::new()),
            ceiling: ceiling.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<u8>> {
        // A reader that panicked mid-append leaves bytes that are still valid.
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a chunk, dropping the oldest bytes beyond the ceiling.
    pub(crate) fn append(&self, chunk: &[u8]) {
        let mut bytes = self.lock();
        if chunk.len() >= self.ceiling {
            bytes.clear();
            bytes.extend(&chunk[chunk.len() - self.ceiling..]);
            return;
        }
        let overflow = (bytes.len() + chunk.len()).saturating_sub(self.ceiling);
        bytes.drain(..overflow);
        bytes.extend(chunk);
    }

    /// Drains complete UTF-8 text, keeping a trailing partial sequence.
    pub(crate) fn drain_text(&self) -> String {
        let mut bytes = self.lock();
        let contiguous = bytes.make_contiguous();
        let complete = complete_prefix_len(contiguous);
        let text = String::from_utf8_lossy(&contiguous[..complete]).into_owned();
        bytes.drain(..complete);
        text
    }

    /// Drains everything, replacing any partial sequence.
    pub(crate) fn drain_all(&self) -> String {
        let mut bytes = self.lock();
        let text = String::from_utf8_lossy(bytes.make_contiguous()).into_owned();
        bytes.clear();
        text
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Length of `bytes` without a trailing incomplete UTF-8 sequence.
fn complete_prefix_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    let lookback = len.saturating_sub(4);
    for index in (lookback..len).rev() {
        let byte = bytes[index];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let width = match byte {
            0x00..=0x7f => 1,
            0xc0..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf7 => 4,
            _ => 1,
        };
        return if index + width > len { index } else { len };
    }
    len
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn drain_clears_the_buffer() {
        let buffer = OutputBuffer::new(64);
        buffer.append(b"hello ");
        buffer.append(b"world");
        assert_eq!(buffer.drain_text(), "hello world");
        assert_eq!(buffer.drain_text(), "");
    }

    #[rstest]
    #[case::many_small(8, &[b"abcd".as_slice(), b"efgh", b"ijkl"], "efghijkl")]
    #[case::one_large(4, &[b"0123456789".as_slice()], "6789")]
    #[case::exact(4, &[b"ab".as_slice(), b"cd"], "abcd")]
    fn keeps_newest_bytes(#[case] ceiling: usize, #[case] chunks: &[&[u8]], #[case] expected: &str) {
        let buffer = OutputBuffer::new(ceiling);
        for chunk in chunks {
            buffer.append(chunk);
            assert!(buffer.len() <= ceiling);
        }
        assert_eq!(buffer.drain_text(), expected);
    }

    #[test]
    fn holds_back_partial_utf8_sequences() {
        let buffer = OutputBuffer::new(64);
        let euro = "€".as_bytes();
        buffer.append(b"cost: ");
        buffer.append(&euro[..2]);
        assert_eq!(buffer.drain_text(), "cost: ");
        assert_eq!(buffer.len(), 2);
        buffer.append(&euro[2..]);
        assert_eq!(buffer.drain_text(), "€");
    }

    #[test]
    fn drain_all_flushes_partial_sequences() {
        let buffer = OutputBuffer::new(64);
        buffer.append(&"é".as_bytes()[..1]);
        assert_eq!(buffer.drain_all(), "\u{fffd}");
        assert_eq!(buffer.len(), 0);
    }

    #[rstest]
    #[case::ascii(b"abc".as_slice(), 3)]
    #[case::complete_multibyte("aé".as_bytes(), 3)]
    #[case::partial_two(&[0x61, 0xc3], 1)]
    #[case::empty(b"".as_slice(), 0)]
    fn measures_complete_prefix(#[case] bytes: &[u8], #[case] expected: usize) {
        assert_eq!(complete_prefix_len(bytes), expected);
    }
}
