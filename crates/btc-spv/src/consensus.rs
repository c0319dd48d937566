//! Consensus rules and parameters.

mod params;

pub use params::Params;
