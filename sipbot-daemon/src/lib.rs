//! sipbot daemon library
//!
//! The call state machine, the turn-taking loop and configuration, exported
//! for the binary and for integration testing.

pub mod config;
pub mod session;
pub mod turn;
pub mod version;

pub use config::{ConfigError, SipbotConfig};
pub use session::{CallController, CallSession, CallState, EventOutcome, Greeting, SessionSummary};
pub use turn::{Collaborators, Conversation, TurnLoop, TurnOutcome, TurnSettings};
