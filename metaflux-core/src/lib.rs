//! Shared primitives for the metaflux pathway-analysis workspace.
//!
//! `metaflux-core` provides the foundation the other metaflux crates build on:
//!
//! - **Error types** — [`MetafluxError`] and [`Result`] for structured error handling
//! - **Traits** — [`Scored`] and [`Summarizable`] for result types

pub mod error;
pub mod traits;

pub use error::{MetafluxError, Result};
pub use traits::*;
