// src/config/mod.rs

//! Service configuration.
//!
//! - [`model`] holds the serde types for the TOML file.
//! - [`validate`] turns a `RawConfigFile` into a checked `ConfigFile`.
//! - [`loader`] reads the file and applies environment overrides.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_with_env};
pub use model::{ConfigFile, RawConfigFile, RenderSection, RendererSection};
