//! # Coffer Core
//!
//! Core types shared by every Coffer crate: the error type, the [`Entity`]
//! contract every stored record satisfies, and the [`Coder`] capability used
//! to put records and snapshots on disk.
//!
//! ## ⚠️ Internal Implementation Detail
//!
//! **This crate is an internal implementation detail of Coffer.**
//!
//! Users should depend on the main [`coffer`](https://crates.io/crates/coffer) crate
//! instead, which provides the stable public API.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coder;
pub mod entity;
pub mod error;
pub mod format_version;

pub use coder::{BinaryCoder, Codec, Coder, JsonCoder, MessagePackCoder};
pub use entity::Entity;
pub use error::{Error, Result};
