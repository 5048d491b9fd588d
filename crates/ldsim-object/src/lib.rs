//! Object model for the ldsim toolchain.
//!
//! This crate provides the vocabulary shared by every pipeline stage:
//! relocatable objects as produced by [`compile`], the image-layer types
//! (placed sections and image-coordinate relocations) consumed by the linker,
//! shared-object builder and loader, and the binary artifact format.

mod format;
mod image;
mod types;
mod unit;

pub use format::*;
pub use image::*;
pub use types::*;
pub use unit::*;

use thiserror::Error;

/// Unit compilation errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CompileError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("line {line}: unknown directive '{directive}'")]
    UnknownDirective { line: usize, directive: String },
    #[error("symbol '{0}' defined more than once")]
    DuplicateSymbol(String),
    #[error("reference to undeclared symbol '{0}'")]
    UndeclaredReference(String),
}

pub type Result<T> = std::result::Result<T, CompileError>;
