//! Domain models for lab kit supply forecasting

mod demand;
mod forecast;
mod inventory;
mod recommendation;
mod settings;

pub use demand::*;
pub use forecast::*;
pub use inventory::*;
pub use recommendation::*;
pub use settings::*;
