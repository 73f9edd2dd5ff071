//! # trellis-common
//!
//! Shared error types, domain primitives, well-known annotation names and
//! the container configuration model used across the trellis workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and every other crate builds on its primitives.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
