//! Domain layer: bridge logic with no I/O.

pub mod address;
pub mod confirmation;
pub mod consensus;
pub mod deposit;
pub mod finalization;
pub mod model;
pub mod quorum;

pub use model::*;
