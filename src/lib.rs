//! Upstreamgen - nginx upstream blocks generated from container addresses
//!
//! This library reads a list of containers and, for each one:
//! - Runs the container runtime's `inspect` command
//! - Extracts the address of every network the container is attached to
//! - Renders an nginx `upstream` block with one `server` line per network
//!
//! Blocks are written to a single file in config order. Any failure aborts
//! the run before the file is touched.

pub mod config;
pub mod error;
pub mod generator;
pub mod inspect;
pub mod render;
