//! # trellis-descriptor
//!
//! Parser for the `.tcd` class descriptor language.
//!
//! A descriptor file states what a class looks like (annotations, supertypes,
//! methods, nested classes) without any implementation. It is the structural
//! metadata source the container reads instead of loading classes.
//!
//! - **Parser**: Lexing, AST construction, and validation of `.tcd` files.
//! - **Loader**: Name resolution and lowering into [`trellis_core::metadata::ClassMetadata`].

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod loader;
pub mod parser;

pub use loader::{index_from_files, index_from_sources, load_file, load_str};
pub use parser::parse_tcd;
