// src/codec/mod.rs

//! Parameter codec.
//!
//! Turns a caller's [`AvatarRequest`] into a [`SerializedPayload`]: a JSON
//! parameter file plus an ordered argument vector for the renderer's entry
//! script. Validation happens here, before any process or directory exists.
//!
//! - [`request`] holds the wire-level request and its enum-like values.
//! - [`payload`] validates and serializes.

pub mod payload;
pub mod request;

pub use payload::{AvatarParams, SerializedPayload, encode, encode_with_seed};
pub use request::{AvatarRequest, Pose, Sex};
