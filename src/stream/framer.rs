//! Newline framing over an arbitrarily-chunked byte stream

/// Splits a byte stream into complete newline-delimited lines.
///
/// Incomplete tails (including partial UTF-8 sequences) are carried across
/// chunks and only decoded once the line completes. Trailing `\r` is
/// stripped so CRLF output frames the same as LF.
#[derive(Debug, Default)]
pub struct LineFramer {
    carry: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every line completed by it, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.carry.extend_from_slice(&rest[..pos]);
            lines.push(self.take_carry());
            rest = &rest[pos + 1..];
        }

        self.carry.extend_from_slice(rest);
        lines
    }

    /// Flush the remaining carry as one final line at end of stream.
    ///
    /// Returns `None` when nothing but whitespace is buffered.
    pub fn finish(&mut self) -> Option<String> {
        if self.carry.is_empty() {
            return None;
        }
        let line = self.take_carry();
        if line.trim().is_empty() {
            None
        } else {
            Some(line)
        }
    }

    fn take_carry(&mut self) -> String {
        if self.carry.last() == Some(&b'\r') {
            self.carry.pop();
        }
        let line = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_multiple_lines() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"A\nB\nC\n");
        assert_eq!(lines, vec!["A", "B", "C"]);
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn lines_survive_arbitrary_chunk_boundaries() {
        // Every split point of "A\nB\nC\n" must yield the same three lines.
        let input = b"A\nB\nC\n";
        for split in 0..=input.len() {
            let mut framer = LineFramer::new();
            let mut lines = framer.feed(&input[..split]);
            lines.extend(framer.feed(&input[split..]));
            assert_eq!(lines, vec!["A", "B", "C"], "split at {split}");
            assert_eq!(framer.finish(), None);
        }
    }

    #[test]
    fn chunk_without_newline_accumulates() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"partial").is_empty());
        assert!(framer.feed(b" line").is_empty());
        assert_eq!(framer.feed(b"\n"), vec!["partial line"]);
    }

    #[test]
    fn chunk_exactly_completing_a_line() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"{\"ty").is_empty());
        assert_eq!(framer.feed(b"pe\":\"foo\"}\n"), vec!["{\"type\":\"foo\"}"]);
    }

    #[test]
    fn crlf_is_stripped() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed(b"one\r\ntwo\r\n"), vec!["one", "two"]);
    }

    #[test]
    fn finish_flushes_nonempty_tail_once() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"tail without newline").is_empty());
        assert_eq!(framer.finish().as_deref(), Some("tail without newline"));
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn finish_skips_whitespace_tail() {
        let mut framer = LineFramer::new();
        framer.feed(b"  \r");
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn multibyte_char_split_across_chunks() {
        let mut framer = LineFramer::new();
        let bytes = "héllo\n".as_bytes();
        // Split in the middle of the two-byte 'é'.
        assert!(framer.feed(&bytes[..2]).is_empty());
        assert_eq!(framer.feed(&bytes[2..]), vec!["héllo"]);
    }
}
