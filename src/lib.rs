//! rswidevine-keys - Widevine content key acquisition through a remote
//! license decryption API.
//!
//! This crate provides:
//! - The full acquisition flow (server certificate, challenge, license, keys).
//! - A typestate [`acquisition::Acquisition`] for driving it step by step.
//! - PSSH inspection helpers.
//! - A pluggable HTTP [`transport::Transport`], `reqwest` backed by default.
//!
//! Feature flags:
//! - `cli`: enable the CLI binary.
//! - `chrono`: expose key timestamps as `chrono` date times.
//! - `tracing`: emit logs through `tracing` (default).
#![allow(clippy::result_large_err)]

#[macro_use]
mod macros;

/// Typestate acquisition sequence.
pub mod acquisition;
/// Decryption API boundary and wire envelopes.
pub mod api;
/// Key acquisition client.
pub mod client;
/// Client configuration.
pub mod config;
/// Per-attempt request context.
pub mod context;
/// Common error types and Result alias.
pub mod error;
/// Decrypted key representation.
pub mod key;
/// Certificate, challenge and license blobs.
pub mod message;
/// PSSH parsing utilities.
pub mod pssh;
/// Decryption API session.
pub mod session;
/// HTTP transport seam.
pub mod transport;
/// Shared helper utilities.
pub mod utils;

pub use client::Client;
pub use context::RequestContext;
pub use error::{Error, Result};
pub use key::{Key, KeySet};
