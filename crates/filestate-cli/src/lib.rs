#![warn(missing_docs)]

//! Filestate driver: desired-state manifest, JSON state store, refresh/plan/apply/destroy

#[allow(missing_docs)]
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod manifest;
pub mod resource;
pub mod state;

pub use config::{CliConfig, LogFormat};
pub use driver::{ApplyReport, Driver, PlannedChange};
pub use error::{DriverError, DriverResult};
pub use manifest::{Declared, Manifest};
pub use resource::Resource;
pub use state::{State, StateStore, STATE_VERSION};
