//! # tae-types
//!
//! Data model for evaluating a target algorithm: run requests, run results,
//! the run status enumeration, ordered configurations and the scenario
//! configuration.

pub mod configuration;
pub mod errors;
pub mod run;
pub mod scenario;
pub mod status;

pub use configuration::*;
pub use errors::*;
pub use run::*;
pub use scenario::*;
pub use status::*;
