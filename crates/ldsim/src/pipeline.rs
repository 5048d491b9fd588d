//! End-to-end toolchain pipeline - units → objects → images → runtime.

use ldsim_archive::Archive;
use ldsim_link::{link, LinkedExecutable};
use ldsim_loader::{Loader, RelocationStrategy, RuntimeImage};
use ldsim_object::{compile, Object};
use ldsim_shared::SharedImage;

use crate::Result;

/// In-memory pipeline over the whole toolchain.
///
/// Collects link inputs once, then links programs and simulates loads
/// against them. Shared images added here are both link inputs and
/// preloaded loader dependencies, so `run` needs no filesystem.
#[derive(Default)]
pub struct Pipeline {
    libraries: Vec<Archive>,
    shared: Vec<SharedImage>,
    strategy: RelocationStrategy,
}

impl Pipeline {
    /// Create an empty pipeline with the default (position-independent)
    /// binding strategy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the import binding strategy used by [`Pipeline::run`].
    pub fn with_strategy(mut self, strategy: RelocationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Add a static archive; archives are searched in insertion order.
    pub fn add_library(&mut self, library: Archive) {
        self.libraries.push(library);
    }

    /// Add a shared image; images are searched after all archives.
    pub fn add_shared_image(&mut self, image: SharedImage) {
        self.shared.push(image);
    }

    /// Compile one unit source.
    pub fn compile_unit(&self, name: &str, source: &str) -> Result<Object> {
        Ok(compile(name, source)?)
    }

    /// Link a program object against the collected inputs.
    pub fn link_program(&self, program: &Object) -> Result<LinkedExecutable> {
        Ok(link(program, &self.libraries, &self.shared)?)
    }

    /// Simulate loading `executable` with a fresh loader.
    pub fn run(&self, executable: LinkedExecutable) -> Result<RuntimeImage> {
        let mut loader = Loader::new(self.strategy);
        for image in &self.shared {
            loader.register(image.clone());
        }
        Ok(loader.load(executable)?)
    }
}
