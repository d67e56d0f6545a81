//! Core text processing
//!
//! Normalization, target resolution, compound splitting and the
//! pattern-based command parser.

pub mod compound;
pub mod parser;
pub mod targets;
pub mod text_normalizer;
