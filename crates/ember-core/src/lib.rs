//! Core types for the Ember renderer.
//!
//! This crate provides the foundational types used throughout the renderer:
//! - Typed opaque resource handles and their generators

pub mod handle;

pub use handle::{Handle, HandleGenerator};
