use serde::{Deserialize, Serialize};

/// Maximum number of finalized segments kept in the display view.
pub const CONFIRMED_SUBTITLE_COUNT: usize = 4;

/// Display-layer representation of one utterance segment.
///
/// `end_time` is set only once the segment is final. `segment_id` is stable
/// across the partial → final → corrected transitions of an utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleSegment {
    pub id: String,
    pub text: String,
    pub speaker: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub is_final: bool,
    pub segment_id: u64,
    pub translation: Option<String>,
}

/// Bounded view sent to the client as a `display.update` snapshot: up to four
/// confirmed segments plus at most one in-flight (non-final) segment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayBuffer {
    pub confirmed: Vec<SubtitleSegment>,
    pub current: Option<SubtitleSegment>,
}

impl DisplayBuffer {
    /// Applies a segment update. A final segment replaces `current` with
    /// nothing and joins `confirmed`, evicting the oldest entry past the cap;
    /// a partial segment becomes the new `current`.
    pub fn apply(&mut self, segment: SubtitleSegment) {
        if segment.is_final {
            self.confirmed.push(segment);
            if self.confirmed.len() > CONFIRMED_SUBTITLE_COUNT {
                self.confirmed.remove(0);
            }
            self.current = None;
        } else {
            self.current = Some(segment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(segment_id: u64, text: &str, is_final: bool) -> SubtitleSegment {
        SubtitleSegment {
            id: format!("seg_{segment_id}"),
            text: text.to_string(),
            speaker: "spk_1".to_string(),
            start_time: 100,
            end_time: is_final.then_some(200),
            is_final,
            segment_id,
            translation: None,
        }
    }

    #[test]
    fn partial_becomes_current() {
        let mut buffer = DisplayBuffer::default();
        buffer.apply(segment(1, "Partial", false));
        assert!(buffer.current.is_some());
        assert!(buffer.confirmed.is_empty());
    }

    #[test]
    fn final_clears_current_and_confirms() {
        let mut buffer = DisplayBuffer::default();
        buffer.apply(segment(1, "Partial", false));
        buffer.apply(segment(1, "Final text", true));
        assert!(buffer.current.is_none());
        assert_eq!(buffer.confirmed.len(), 1);
        assert_eq!(buffer.confirmed[0].text, "Final text");
    }

    #[test]
    fn fifth_final_evicts_oldest() {
        let mut buffer = DisplayBuffer::default();
        for id in 1..=5 {
            buffer.apply(segment(id, &format!("line {id}"), true));
        }
        assert_eq!(buffer.confirmed.len(), CONFIRMED_SUBTITLE_COUNT);
        assert_eq!(buffer.confirmed[0].segment_id, 2);
        assert_eq!(buffer.confirmed[3].segment_id, 5);
    }

    #[test]
    fn segment_serializes_camel_case() {
        let value = serde_json::to_value(segment(3, "Hi", true)).unwrap();
        assert_eq!(value["segmentId"], 3);
        assert_eq!(value["startTime"], 100);
        assert_eq!(value["endTime"], 200);
        assert_eq!(value["isFinal"], true);
        assert!(value["translation"].is_null());
    }
}
