//! Typewriter streamer
//!
//! Presentation-only chunking of transcript messages: clients see a message
//! grow a few characters at a time, terminated by a `final` marker carrying
//! the full text. The store always receives the complete message in one
//! append; only the fan-out is chunked.

use crate::config::TypewriterConfig;
use crate::hub::{HubEvent, RealtimeHub, Topic};
use dialflow_store::TranscriptRole;

/// Split `text` into chunks of at most `chunk_size` characters, respecting
/// UTF-8 boundaries. The concatenation of all chunks is exactly `text`.
pub fn typewriter_chunks(text: &str, chunk_size: usize) -> Vec<&str> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == chunk_size {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

/// Stream one transcript message to the hub with typewriter cadence.
///
/// Emits `transcript_message` events on the global and per-call transcript
/// topics: cumulative partial texts, then a `final` marker with the full
/// message. Runs to completion; callers spawn it.
pub async fn stream_message(
    hub: &RealtimeHub,
    config: &TypewriterConfig,
    call_sid: &str,
    role: TranscriptRole,
    sequence: i64,
    text: &str,
) {
    let per_call = Topic::transcript(call_sid);
    let chunks = typewriter_chunks(text, config.chunk_size);
    let total = chunks.len();

    let mut shown = String::with_capacity(text.len());
    for (i, chunk) in chunks.into_iter().enumerate() {
        shown.push_str(chunk);
        let event = HubEvent::new(
            "transcript_message",
            serde_json::json!({
                "callSid": call_sid,
                "role": role,
                "sequence": sequence,
                "text": shown,
                "final": false,
            }),
        );
        hub.publish(&Topic::Transcripts, event.clone());
        hub.publish(&per_call, event);

        if i + 1 < total {
            tokio::time::sleep(config.interval).await;
        }
    }

    let final_event = HubEvent::new(
        "transcript_message",
        serde_json::json!({
            "callSid": call_sid,
            "role": role,
            "sequence": sequence,
            "text": text,
            "final": true,
        }),
    );
    hub.publish(&Topic::Transcripts, final_event.clone());
    hub.publish(&per_call, final_event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_chunks_cover_text() {
        let text = "hello world";
        let chunks = typewriter_chunks(text, 3);
        assert_eq!(chunks, vec!["hel", "lo ", "wor", "ld"]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_chunks_respect_utf8() {
        let text = "héllo wörld ✓";
        let chunks = typewriter_chunks(text, 4);
        assert_eq!(chunks.concat(), text);
        for chunk in chunks {
            assert!(chunk.chars().count() <= 4);
        }
    }

    #[test]
    fn test_empty_text() {
        assert!(typewriter_chunks("", 3).is_empty());
    }

    #[tokio::test]
    async fn test_stream_ends_with_final_marker() {
        let hub = RealtimeHub::new(50);
        let topic = Topic::transcript("CA1");
        let (_, mut rx) = hub.subscribe(&topic);

        let config = TypewriterConfig {
            chunk_size: 2,
            interval: Duration::from_millis(1),
        };
        stream_message(&hub, &config, "CA1", TranscriptRole::Agent, 1, "abcde").await;

        let mut last = None;
        let mut partials = 0;
        while let Ok(event) = rx.try_recv() {
            if !event.data["final"].as_bool().unwrap() {
                partials += 1;
            }
            last = Some(event);
        }
        assert_eq!(partials, 3); // "ab", "abcd", "abcde" as partials
        let last = last.unwrap();
        assert_eq!(last.data["final"], true);
        assert_eq!(last.data["text"], "abcde");
    }
}
