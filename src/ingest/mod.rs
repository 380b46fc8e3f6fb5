//! Voice note ingestion.
//!
//! The bot downloads each voice note into the audio layout, then the
//! transcriber turns it into text:
//!
//! ```text
//! Telegram voice → audio/<user>/<stem>.ogg → Transcriber → transcriptions/<user>/<stem>.txt
//! ```

pub mod transcriber;

// Re-export key types
pub use transcriber::{TranscriptResult, WhisperTranscriber};
