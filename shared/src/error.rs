//! Errors raised by domain rules

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Cannot move recommendation from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("Unknown recommendation status: {0}")]
    UnknownStatus(String),
}
