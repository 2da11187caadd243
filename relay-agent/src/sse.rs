//! Incremental decoding of `text/event-stream` bodies, shared by the MCP
//! SSE transport and the streaming chat-completions client.

#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feeds raw bytes; lines are only decoded once complete, so a UTF-8
    /// sequence split between chunks survives.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(SseEvent {
                        event: self.event.take().unwrap_or_else(|| "message".to_string()),
                        data: self.data.join("\n"),
                    });
                    self.data.clear();
                }
                self.event = None;
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = line.split_once(':').unwrap_or((line, ""));
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_decoder_handles_split_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"event: endpoint\r\nda").is_empty());
        let events = decoder.push(b"ta: /messages/?session_id=abc\r\n\r\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: "endpoint".to_string(),
                data: "/messages/?session_id=abc".to_string(),
            }]
        );
    }

    #[test]
    fn test_sse_decoder_defaults_to_message_and_skips_comments() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(
            b": keep-alive\n\ndata: {\"a\":1}\n\nevent: message\ndata: x\ndata: y\n\n",
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "message");
        assert_eq!(events[0].data, "{\"a\":1}");
        assert_eq!(events[1].data, "x\ny");
    }

    #[test]
    fn test_sse_decoder_keeps_split_utf8() {
        let mut decoder = SseDecoder::default();
        let text = "data: caf\u{e9}\n\n".as_bytes();
        let split = text.len() - 3;
        assert!(decoder.push(&text[..split]).is_empty());
        let events = decoder.push(&text[split..]);
        assert_eq!(events[0].data, "caf\u{e9}");
    }
}
