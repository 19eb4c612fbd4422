//! simdex: registry of astrophysical simulation and observation datasets.
//!
//! [`registry`] loads the dataset table (with template expansion) and resolves
//! names and aliases; [`config`] handles user settings and bundled resources;
//! [`layout`] classifies on-disk storage of simulation outputs.

pub mod cli;
pub mod config;
pub mod layout;
pub mod registry;

pub use registry::{ConfigError, DatasetEntry, Identifier, Registry};
