//! ldsim - a teaching linker and loader.
//!
//! Compiles toy source units into relocatable objects, groups them into
//! static archives, links executables (statically, or against shared images
//! with GOT indirection), and simulates dynamic loading with selectable
//! binding strategies.
//!
//! # Example
//!
//! ```ignore
//! use ldsim::{Pipeline, compile};
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.add_library(my_archive);
//! let exe = pipeline.link_program(&compile("main", source)?)?;
//! let runtime = pipeline.run(exe)?;
//! ```

// Re-export from sub-crates
pub use ldsim_archive::{
    archive, decode_archive, encode_archive, Archive, ArchiveError, ArchiveMember, MAGIC_ARCHIVE,
};
pub use ldsim_link::{
    decode_executable, encode_executable, link, LinkError, LinkedExecutable, MAGIC_EXECUTABLE,
};
pub use ldsim_loader::{
    LoadState, LoadedImage, Loader, LoaderError, RelocationStrategy, RuntimeImage, BASE_START,
};
pub use ldsim_object::{
    compile, decode_object, encode_object, peek_magic, CompileError, FormatError, Object,
    PlacedSection, RelocKind, Relocation, Section, SectionKind, Symbol, SymbolKind, MAGIC_OBJECT,
};
pub use ldsim_shared::{
    build_shared, decode_shared, encode_shared, SharedError, SharedImage, MAGIC_SHARED,
};

mod pipeline;
pub use pipeline::*;

use thiserror::Error;

/// Toolchain errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),
    #[error("link error: {0}")]
    Link(#[from] LinkError),
    #[error("shared object error: {0}")]
    Shared(#[from] SharedError),
    #[error("loader error: {0}")]
    Loader(#[from] LoaderError),
    #[error("artifact format error: {0}")]
    Format(#[from] FormatError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
