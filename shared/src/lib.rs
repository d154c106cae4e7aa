//! Shared domain logic for the Kitcast lab kit supply platform
//!
//! This crate holds the forecast engine and recommendation reconciliation so
//! that the backend and the browser (via WASM) compute identical numbers.

pub mod error;
pub mod forecasting;
pub mod models;
pub mod recommendations;
pub mod types;
pub mod validation;

pub use error::*;
pub use forecasting::*;
pub use models::*;
pub use recommendations::*;
pub use types::*;
pub use validation::*;
