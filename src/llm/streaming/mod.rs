//! Server-Sent Events decoding shared by the Gemini provider and the chat client

/// Incremental SSE decoder
///
/// Buffers incoming bytes and yields the `data` payload of every complete
/// event. Multiple `data:` lines belonging to one event are joined with `\n`.
/// Comment lines (`:`) and other fields (`event:`, `id:`) are ignored.
///
/// # Example
/// ```
/// use tabiwa_assistant::llm::streaming::SseDecoder;
///
/// let mut decoder = SseDecoder::new();
/// assert_eq!(decoder.push(b"data: {\"a\":1}\n\ndata: {\"b\""), vec!["{\"a\":1}"]);
/// assert!(decoder.push(b":2}").is_empty());
/// assert_eq!(decoder.finish(), vec!["{\"b\":2}"]);
/// ```
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    pending: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk and return payloads of events completed by it
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        // Split on raw bytes so a multi-byte character cut across chunks stays intact
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            self.process_line(line.trim_end_matches(['\n', '\r']), &mut payloads);
        }
        payloads
    }

    /// Flush the buffered tail at end of stream
    pub fn finish(&mut self) -> Vec<String> {
        let mut payloads = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let rest = String::from_utf8_lossy(&rest).into_owned();
            for line in rest.lines() {
                self.process_line(line, &mut payloads);
            }
        }
        if let Some(data) = self.pending.take() {
            payloads.push(data);
        }
        payloads
    }

    fn process_line(&mut self, line: &str, payloads: &mut Vec<String>) {
        if line.is_empty() {
            // Blank line dispatches the event
            if let Some(data) = self.pending.take() {
                payloads.push(data);
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }
        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            match self.pending.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.pending = Some(value.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::new();
        assert_eq!(
            decoder.push(b"data: {\"hello\":\"world\"}\n\n"),
            vec!["{\"hello\":\"world\"}"]
        );
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"text\":\"hel").is_empty());
        assert!(decoder.push(b"lo\"}\n").is_empty());
        assert_eq!(decoder.push(b"\n"), vec!["{\"text\":\"hello\"}"]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: 広島\n\n".as_bytes();
        // cut inside the first character of 広島
        let (head, tail) = bytes.split_at(8);
        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.push(tail), vec!["広島"]);
    }

    #[test]
    fn test_multiline_data_joined() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(b"data: a\ndata: b\n\n"), vec!["a\nb"]);
    }

    #[test]
    fn test_comments_and_other_fields_ignored() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push(b": keep-alive\n\nevent: message\nid: 7\ndata: x\n\n");
        assert_eq!(payloads, vec!["x"]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(b"data: x\r\n\r\n"), vec!["x"]);
    }

    #[test]
    fn test_finish_flushes_and_clears() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\":1}").is_empty());
        assert_eq!(decoder.finish(), vec!["{\"a\":1}"]);
        assert!(decoder.finish().is_empty());
    }
}
