//! # replaydiff: replay diff middleware
//!
//! Reads hex-framed request / response / replayed-response records from
//! stdin, pairs the two responses of each request and reports how they
//! differ. Request frames are echoed to stdout so a downstream replayer can
//! consume them.
//!
//! - **Config**: `DiffConfig`, loaded from TOML and overridden by the CLI.
//! - **Service**: `DiffService`, which wires stdio to the core pipeline.

pub mod config;
pub mod service;
