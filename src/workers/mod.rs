//! The three polling workers, one per source type.

pub mod price;
pub mod social;
pub mod whale;
