//! Generic utility primitives with zero domain knowledge.
//!
//! - `secret` - Random hex secret generation
//! - `shell` - Shell escaping and quoting
//! - `validation` - Identifier and hostname validation

pub mod secret;
pub mod shell;
pub mod validation;
