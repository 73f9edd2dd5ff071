//! # trellis-core
//!
//! Collaborator contracts consumed by the container resolution engine and
//! their default implementations.
//!
//! - **Metadata**: structural class/annotation model and meta-annotation flattening.
//! - **Source**: reading class metadata by name without executing anything.
//! - **Registry**: the bean definition sink written by scanning and parsing.
//! - **Environment**: property sources, placeholders, and profiles.
//! - **Resource**: turning location strings into readable resources.
//! - **Order**: the priority convention shared by conditions, selectors, and listeners.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod definition;
pub mod environment;
pub mod metadata;
pub mod order;
pub mod registry;
pub mod resource;
pub mod source;
