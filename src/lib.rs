//! Release lanes for mobile apps
//!
//! This library sequences the signing, build and store-publishing steps for
//! the Android and iOS targets of an Expo/React Native project:
//! - environment validation before any side effect
//! - ephemeral credential files with guaranteed cleanup
//! - deterministic version codes from the CI run counter
//! - uploads to non-public store channels only
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod cli;
pub mod config;
pub mod error;
pub mod lane;
pub mod metadata;
pub mod preflight;
pub mod utils;
pub mod validation;

// Re-export commonly used types
pub use error::{CliError, LaneError, ReleaseError, Result};
pub use lane::{BuildContext, Lane, LaneExecutor, LaneOutcome, Mode, Platform, TerminalState};
pub use validation::{Finding, ValidationReport};
