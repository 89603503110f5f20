//! # UAC Common
//!
//! Shared types, errors, and constants used by the UAC captcha gate.
//!
//! ## Modules
//! - `types` - Wire and domain types (trajectories, verification results, challenges)
//! - `error` - Common error types
//! - `constants` - Shared configuration constants

pub mod constants;
pub mod error;
pub mod types;

pub use error::UacError;
pub use types::*;
