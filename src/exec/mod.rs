// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`renderer`] builds the renderer command line and locates the binary.
//! - [`process`] owns a spawned process and its process group.
//! - [`capture`] drains stdout/stderr into bounded tails.
//! - [`supervisor`] runs one job from spawn to validated artifact.
//! - [`backend`] provides the `RenderBackend` trait the engine calls, with
//!   `ProcessBackend` as the production implementation.

pub mod backend;
pub mod capture;
pub mod process;
pub mod renderer;
pub mod supervisor;

pub use backend::{ProcessBackend, RenderBackend, RenderFuture};
pub use renderer::{RendererCommand, RendererVersion, locate, probe_version};
pub use supervisor::Supervisor;
