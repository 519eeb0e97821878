//! Client for the HTTP API exposed by Screeps game servers.
//!
//! Every call is a single request raced against a fixed timeout. A timed out or empty call yields
//! "no data" rather than an error; the caller decides whether to skip the account for the tick.

#[macro_use]
extern crate tracing;

mod client;
mod error;
pub mod payload;
mod target;

pub use client::{
    Reply,
    RemoteClient,
    Standing,
    DEFAULT_TIMEOUT,
};
pub use error::{
    ApiError,
    PayloadError,
};
pub use target::ApiTarget;

/// Tracing target every remote call reports its outcome to.
pub const AUDIT_TARGET: &str = "audit";
