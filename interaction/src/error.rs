//! Error types.
//!
//! Nothing in the interaction core is fatal: transition errors abort a
//! single transition and are logged by the caller, config errors keep
//! the previous configuration in place.

use std::path::PathBuf;

use thiserror::Error;

use crate::hand::Hand;
use crate::world::{ItemKey, ObjectRef};

/// Failure to load or parse configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed s-expression: {0}")]
    Parse(String),
    #[error("invalid value for :{key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Reason a single transition was abandoned before mutating anything.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransitionError {
    #[error("identity {0:?} did not resolve to a live item class")]
    Unresolved(ItemKey),
    #[error("object {0} is no longer valid")]
    StaleReference(ObjectRef),
    #[error("{hand:?} slot does not hold the expected token")]
    SlotMismatch { hand: Hand },
    #[error("no equipped item in the {hand:?} model hand")]
    NothingEquipped { hand: Hand },
}
