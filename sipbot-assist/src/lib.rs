//! sipbot collaborators
//!
//! The three external services a call turn depends on, each behind an async
//! trait so the call loop can be driven by fakes in tests:
//!
//! - [`Transcriber`]: clip → text ([`OpenAiTranscriber`], `/audio/transcriptions`)
//! - [`Responder`]: text + history → reply ([`OpenAiResponder`], `/chat/completions`)
//! - [`Synthesizer`]: reply → audio file ([`ElevenLabsSynthesizer`], `/v1/text-to-speech`)
//!
//! Every call is a single attempt. Callers decide what to substitute on failure;
//! the fixed phrases they use live here.

pub mod engine;
pub mod error;
pub mod responder;
pub mod synthesizer;
pub mod transcriber;

pub use engine::{Exchange, Responder, Synthesizer, Transcriber};
pub use error::{AssistError, Result};
pub use responder::OpenAiResponder;
pub use synthesizer::ElevenLabsSynthesizer;
pub use transcriber::OpenAiTranscriber;

/// Persona instruction sent with every chat completion
pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant responding to a phone call. Keep your responses concise and natural.";

/// Stands in for the caller's words when transcription fails
pub const TRANSCRIPTION_APOLOGY: &str =
    "I couldn't understand what you said. Could you please repeat that?";

/// Stands in for the reply when response generation fails
pub const RESPONSE_APOLOGY: &str =
    "I'm sorry, I'm having trouble processing your request right now.";

/// Default OpenAI-compatible API base
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default ElevenLabs API base
pub const DEFAULT_ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";

/// Number of whitespace-separated words in `text`
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
