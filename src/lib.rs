//! MixVoice Library
//!
//! Voice command interpretation for mixing consoles: transcript parsing,
//! console state, correction detection and the learned personal dictionary.

pub mod audit;
pub mod commands;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod learning;
pub mod mixer;

pub use engine::{TranscriptOutcome, VoiceEngine};
pub use error::{MixError, MixResult};
