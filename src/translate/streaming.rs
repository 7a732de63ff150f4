//! Incremental re-framing of W&B server-sent events into OpenAI server-sent events.
//!
//! The [`SseTranscoder`] owns a single piece of state, the unterminated tail of
//! the bytes received so far. Each call to [`SseTranscoder::feed`] appends a
//! network read, processes every complete line in arrival order and keeps the
//! remainder for the next read.

use bytes::Bytes;

use super::response::wandb_chunk_to_openai;
use super::wandb_types::WandbStreamChunk;

pub const DONE_MARKER: &str = "[DONE]";
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// One unit of client-facing output, in the order the upstream produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    /// A translated `data:` event, already serialized as JSON.
    Chunk(String),
    /// The terminating `data: [DONE]` event.
    Done,
    /// A line that is not a `data:` event (comments, keep-alives), relayed unchanged.
    Passthrough(String),
    /// A `data:` line that could not be parsed. Produces no output.
    Skipped { line: String, error: String },
}

impl SseFrame {
    /// Wire bytes for this frame, `None` for skipped lines.
    pub fn to_bytes(&self) -> Option<Bytes> {
        match self {
            Self::Chunk(json) => Some(Bytes::from(format!("data: {json}\n\n"))),
            Self::Done => Some(Bytes::from_static(DONE_FRAME.as_bytes())),
            Self::Passthrough(line) => Some(Bytes::from(format!("{line}\n"))),
            Self::Skipped { .. } => None,
        }
    }
}

/// Stateful line splitter + chunk translator for one upstream stream.
///
/// Usage:
///   let mut transcoder = SseTranscoder::new("meta-llama/Llama-3.1-8B-Instruct");
///   for read in upstream_reads {
///       for frame in transcoder.feed(&read) { /* send frame */ }
///   }
///   if let Some(frame) = transcoder.finish() { /* send frame */ }
#[derive(Debug)]
pub struct SseTranscoder {
    model: String,
    buffer: Vec<u8>,
}

impl SseTranscoder {
    /// `model` is the fallback for chunks that do not name one.
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            buffer: Vec::new(),
        }
    }

    /// Append one upstream read and translate every line it completes.
    ///
    /// Splitting happens on raw bytes; a newline byte never occurs inside a
    /// multi-byte UTF-8 sequence, so characters split across reads survive.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(bytes);

        let Some(last_newline) = self.buffer.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };

        let tail = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, tail);

        complete
            .split(|b| *b == b'\n')
            .filter_map(|line| self.process_line(&String::from_utf8_lossy(line)))
            .collect()
    }

    /// Flush at end of stream. The unterminated tail is never parsed as an event,
    /// but a `[DONE]` anywhere in it still produces the terminating frame.
    pub fn finish(self) -> Option<SseFrame> {
        String::from_utf8_lossy(&self.buffer)
            .contains(DONE_MARKER)
            .then_some(SseFrame::Done)
    }

    #[cfg(test)]
    fn pending(&self) -> &[u8] {
        &self.buffer
    }

    fn process_line(&self, line: &str) -> Option<SseFrame> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let Some(data) = trimmed.strip_prefix("data:") else {
            return Some(SseFrame::Passthrough(line.trim_end_matches('\r').to_string()));
        };

        let data = data.trim();
        if data == DONE_MARKER {
            return Some(SseFrame::Done);
        }

        let parsed = serde_json::from_str::<WandbStreamChunk>(data)
            .map(|chunk| wandb_chunk_to_openai(&chunk, &self.model))
            .and_then(|chunk| serde_json::to_string(&chunk));

        Some(match parsed {
            Ok(json) => SseFrame::Chunk(json),
            Err(e) => SseFrame::Skipped {
                line: data.to_string(),
                error: e.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn chunk_line(content: &str) -> String {
        format!(
            "data: {}\n\n",
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion.chunk",
                "created": 1701234567,
                "model": "m",
                "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
            })
        )
    }

    fn chunk_json(frame: &SseFrame) -> Value {
        match frame {
            SseFrame::Chunk(json) => serde_json::from_str(json).unwrap(),
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    #[test]
    fn test_frame_split_across_reads() {
        let mut transcoder = SseTranscoder::new("m");

        let first = format!("{}da", chunk_line("Hello"));
        let mut frames = transcoder.feed(first.as_bytes());
        frames.extend(transcoder.feed(b"ta: [DONE]\n\n"));
        assert!(transcoder.pending().is_empty());
        assert!(transcoder.finish().is_none());

        assert_eq!(frames.len(), 2);
        assert_eq!(chunk_json(&frames[0])["choices"][0]["delta"]["content"], "Hello");
        assert_eq!(frames[1], SseFrame::Done);
    }

    #[test]
    fn test_json_split_mid_payload() {
        let mut transcoder = SseTranscoder::new("m");
        let line = chunk_line("split");
        let (a, b) = line.split_at(line.len() / 2);

        assert!(transcoder.feed(a.as_bytes()).is_empty());
        let frames = transcoder.feed(b.as_bytes());

        assert_eq!(frames.len(), 1);
        assert_eq!(chunk_json(&frames[0])["choices"][0]["delta"]["content"], "split");
    }

    #[test]
    fn test_multibyte_character_split_across_reads() {
        let mut transcoder = SseTranscoder::new("m");
        let line = chunk_line("你好");
        let bytes = line.as_bytes();
        let split = line.find('你').unwrap() + 1;

        let mut frames = transcoder.feed(&bytes[..split]);
        frames.extend(transcoder.feed(&bytes[split..]));

        assert_eq!(frames.len(), 1);
        assert_eq!(chunk_json(&frames[0])["choices"][0]["delta"]["content"], "你好");
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let mut transcoder = SseTranscoder::new("m");
        let input = format!(
            "{}data: {{not json\n\n{}data: [DONE]\n\n",
            chunk_line("a"),
            chunk_line("b")
        );

        let frames = transcoder.feed(input.as_bytes());

        assert_eq!(frames.len(), 4);
        assert_eq!(chunk_json(&frames[0])["choices"][0]["delta"]["content"], "a");
        assert!(matches!(frames[1], SseFrame::Skipped { .. }));
        assert!(frames[1].to_bytes().is_none());
        assert_eq!(chunk_json(&frames[2])["choices"][0]["delta"]["content"], "b");
        assert_eq!(frames[3], SseFrame::Done);
    }

    #[test]
    fn test_non_data_lines_pass_through() {
        let mut transcoder = SseTranscoder::new("m");
        let frames = transcoder.feed(b": keep-alive\r\nevent: ping\n");

        assert_eq!(
            frames,
            vec![
                SseFrame::Passthrough(": keep-alive".to_string()),
                SseFrame::Passthrough("event: ping".to_string()),
            ]
        );
        assert_eq!(frames[0].to_bytes().unwrap(), Bytes::from_static(b": keep-alive\n"));
    }

    #[test]
    fn test_missing_fields_use_requested_model() {
        let mut transcoder = SseTranscoder::new("requested");
        let frames = transcoder.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n");

        let value = chunk_json(&frames[0]);
        assert_eq!(value["model"], "requested");
        assert_eq!(value["object"], "chat.completion.chunk");
        assert!(value["id"].as_str().unwrap().starts_with("chatcmpl-"));
        assert_eq!(value["system_fingerprint"], "");
    }

    #[test]
    fn test_odd_numeric_fields_do_not_drop_the_chunk() {
        let mut transcoder = SseTranscoder::new("m");
        let frames = transcoder
            .feed(b"data: {\"created\":1.5e9,\"choices\":[{\"index\":0.5,\"delta\":{\"content\":\"x\"}}]}\n");

        assert_eq!(frames.len(), 1);
        let value = chunk_json(&frames[0]);
        assert_eq!(value["created"], 1_500_000_000u64);
        assert_eq!(value["choices"][0]["index"], 0);
        assert_eq!(value["choices"][0]["delta"]["content"], "x");
    }

    #[test]
    fn test_done_without_trailing_newline() {
        let mut transcoder = SseTranscoder::new("m");
        let frames = transcoder.feed(format!("{}data: [DONE]", chunk_line("x")).as_bytes());

        assert_eq!(frames.len(), 1);
        assert_eq!(transcoder.finish(), Some(SseFrame::Done));
    }

    #[test]
    fn test_unterminated_data_is_not_flushed() {
        let mut transcoder = SseTranscoder::new("m");
        let frames = transcoder.feed(b"data: {\"choices\":[]}");

        assert!(frames.is_empty());
        assert!(transcoder.finish().is_none());
    }

    #[test]
    fn test_frame_wire_format() {
        assert_eq!(SseFrame::Done.to_bytes().unwrap(), Bytes::from_static(b"data: [DONE]\n\n"));
        assert_eq!(
            SseFrame::Chunk("{}".to_string()).to_bytes().unwrap(),
            Bytes::from_static(b"data: {}\n\n")
        );
    }
}
