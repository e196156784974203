//! Source language support
//!
//! Only Java is mined today. The [`SourceParser`] trait is the seam that
//! extraction is written against, so tests can substitute a stub parser.

pub mod java;
pub mod parser;
pub mod tree_sitter_utils;

pub use java::JavaParser;
pub use parser::{ParseError, ParsedUnit, SourceParser};
