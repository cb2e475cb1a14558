pub mod correction;
pub mod events;
pub mod provider;
pub mod session;
pub mod subtitle;

pub use correction::{Correction, CorrectionQueue};
pub use events::{ErrorCode, ServerEvent, SuggestionItem};
pub use provider::{Corrector, SttClient, SttFactory, Suggester, TranscriptResult, Translator};
pub use session::{MeetingSession, PartialEmit, TranscriptEntry, TranslationEntry};
pub use subtitle::{DisplayBuffer, SubtitleSegment};

use chrono::Utc;

/// Milliseconds since the Unix epoch; the timestamp unit carried by every
/// emitted event.
pub fn epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}
