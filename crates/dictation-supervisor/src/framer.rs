//! Newline framing of raw worker output

/// Turns arbitrarily split byte chunks into complete, trimmed lines
///
/// Bytes are buffered rather than decoded per chunk, so a multi-byte UTF-8
/// sequence split across two reads still decodes correctly.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    /// Create an empty framer
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every line it completed
    ///
    /// Lines are trimmed of surrounding whitespace and empty ones are dropped.
    /// The unterminated tail stays buffered for the next chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // Only the new bytes can hold a newline; the buffered tail has none.
        let Some(in_chunk) = chunk.iter().rposition(|&b| b == b'\n') else {
            self.buffer.extend_from_slice(chunk);
            return Vec::new();
        };
        let last_newline = self.buffer.len() + in_chunk;
        self.buffer.extend_from_slice(chunk);

        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        complete
            .split(|&b| b == b'\n')
            .map(|raw| String::from_utf8_lossy(raw).trim().to_string())
            .filter(|line| !line.is_empty())
            .collect()
    }

    /// Bytes currently waiting for their newline
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Discard the framer, returning any unterminated trailing text
    ///
    /// A line without its newline is not a protocol event; callers only log it.
    pub fn finish(self) -> Option<String> {
        let tail = String::from_utf8_lossy(&self.buffer).trim().to_string();
        (!tail.is_empty()).then_some(tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(stream: &[u8]) -> Vec<String> {
        let text = String::from_utf8_lossy(stream);
        let mut segments: Vec<&str> = text.split('\n').collect();
        segments.pop();
        segments
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    fn feed(chunks: &[&[u8]]) -> Vec<String> {
        let mut framer = LineFramer::new();
        chunks.iter().flat_map(|chunk| framer.push(chunk)).collect()
    }

    #[test]
    fn test_emits_only_terminated_lines() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"LOAD").is_empty());
        assert_eq!(framer.push(b"ING\nREA"), vec!["LOADING"]);
        assert_eq!(framer.pending(), 3);
        assert_eq!(framer.push(b"DY\n"), vec!["READY"]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_trims_and_drops_blank_lines() {
        assert_eq!(
            feed(&[b"  READY \r\n\n   \nRESULT:hello world\n"]),
            vec!["READY", "RESULT:hello world"]
        );
    }

    #[test]
    fn test_chunk_boundaries_never_change_output() {
        let stream = "LOADING\nREADY\r\n\nRECORDING\nRESULT:caf\u{e9} con le\u{f1}a\n  ERROR:mic busy  \npartial"
            .as_bytes();
        let expected = reference(stream);

        for split in 0..=stream.len() {
            let (a, b) = stream.split_at(split);
            assert_eq!(feed(&[a, b]), expected, "split at {split}");
        }

        for size in 1..8 {
            let chunks: Vec<&[u8]> = stream.chunks(size).collect();
            assert_eq!(feed(&chunks), expected, "chunk size {size}");
        }
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let word = "ñ".as_bytes();
        let lines = feed(&[b"RESULT:a", &word[..1], &word[1..], b"o\n"]);
        assert_eq!(lines, vec!["RESULT:año"]);
    }

    #[test]
    fn test_long_unterminated_line_accumulates_byte_by_byte() {
        let mut framer = LineFramer::new();
        for _ in 0..20_000 {
            assert!(framer.push(b"x").is_empty());
        }
        assert_eq!(framer.pending(), 20_000);

        let lines = framer.push(b"\nREADY\nREC");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "x".repeat(20_000));
        assert_eq!(lines[1], "READY");
        assert_eq!(framer.pending(), 3);
    }

    #[test]
    fn test_unterminated_tail_is_discarded_on_finish() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b"READY\nRESULT:half"), vec!["READY"]);
        assert_eq!(framer.finish(), Some("RESULT:half".to_string()));

        let empty = LineFramer::new();
        assert_eq!(empty.finish(), None);
    }
}
