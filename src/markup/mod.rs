//! Narrative markup access.
//!
//! FHIR narratives are XHTML fragments stored as strings. They are parsed into
//! an explicit node tree so that element lookup order is fully determined by
//! this module, and written back without touching anything that was not edited.

pub mod tree;
pub mod parse;
pub mod write;

pub use tree::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarkupError {
    #[error("XML syntax error: {0}")]
    Syntax(String),

    #[error("Malformed attribute: {0}")]
    Attribute(String),

    #[error("Unexpected closing tag </{found}>, expected </{expected}>")]
    MismatchedEnd { expected: String, found: String },

    #[error("Closing tag </{0}> has no matching opening tag")]
    UnmatchedEnd(String),

    #[error("Element <{0}> is never closed")]
    UnclosedElement(String),

    #[error("{0} is not allowed in a narrative fragment")]
    Unsupported(&'static str),
}
