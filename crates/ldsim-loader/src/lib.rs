//! Dynamic loader simulation.
//!
//! Loads a linked executable's shared dependencies, assigns synthetic base
//! addresses, and binds every import — either by patching reference sites
//! directly (load-time relocation) or by patching only the runtime GOT
//! (position-independent). Progress is tracked as an explicit state machine
//! with a single terminal failure state; a fresh loader is built per run.

use std::path::PathBuf;

use ldsim_link::LinkedExecutable;
use ldsim_object::{ImageReloc, PlacedSection, RelocKind};
use ldsim_shared::{decode_shared, SharedImage};
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Loading errors. Messages reproduce the classic `ldd`-style diagnostics.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("{0} => not found")]
    LibraryNotFound(String),
    #[error("symbol lookup error: undefined symbol: {0}")]
    SymbolNotFound(String),
    #[error("artifact format error: {0}")]
    Format(#[from] ldsim_object::FormatError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LoaderError>;

/// Base address handed to the first loaded shared image.
pub const BASE_START: u64 = 0x1000_0000;

/// Loaded images are placed at page-aligned bases.
const PAGE: u64 = 0x1000;

/// Loader progress. `Failed` is reachable from any non-`Ready` state and is
/// terminal, as is `Ready`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    NotLoaded,
    DependenciesResolving,
    Relocating,
    Ready,
    Failed,
}

/// How imports are bound during the `Relocating` phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RelocationStrategy {
    /// Patch every reference site directly. Requires image code to be
    /// writable while relocating; section bytes may change.
    LoadTimeRelocation,
    /// Patch only the runtime GOT. Code sections stay byte-identical and
    /// may be shared read-only between runtime images.
    #[default]
    PositionIndependent,
}

/// A shared image mapped at its synthetic base address.
///
/// `sections` is this runtime image's private copy of the bytes; the source
/// [`SharedImage`] is never mutated.
#[derive(Clone, Debug)]
pub struct LoadedImage {
    pub base: u64,
    pub image: SharedImage,
    pub sections: Vec<PlacedSection>,
}

impl LoadedImage {
    /// Absolute address of a symbol this image exports.
    pub fn export(&self, name: &str) -> Option<u64> {
        self.image.export(name).map(|off| self.base + off)
    }
}

/// The product of a successful load: the executable, its mapped
/// dependencies, and the fully resolved runtime GOT.
#[derive(Debug)]
pub struct RuntimeImage {
    pub executable: LinkedExecutable,
    /// Dependencies in declaration order.
    pub images: Vec<LoadedImage>,
    /// Name → resolved absolute address for every GOT entry.
    pub got_table: FxHashMap<String, u64>,
}

impl RuntimeImage {
    /// Name → base address of every loaded shared image.
    pub fn loaded_shared_images(&self) -> FxHashMap<String, u64> {
        self.images
            .iter()
            .map(|img| (img.image.name.clone(), img.base))
            .collect()
    }

    /// Base address of a loaded shared image.
    pub fn base_of(&self, name: &str) -> Option<u64> {
        self.images
            .iter()
            .find(|img| img.image.name == name)
            .map(|img| img.base)
    }
}

/// One simulated process load.
pub struct Loader {
    strategy: RelocationStrategy,
    search_path: Vec<PathBuf>,
    registry: FxHashMap<String, SharedImage>,
    state: LoadState,
    next_base: u64,
}

impl Loader {
    pub fn new(strategy: RelocationStrategy) -> Self {
        Self {
            strategy,
            search_path: Vec::new(),
            registry: FxHashMap::default(),
            state: LoadState::NotLoaded,
            next_base: BASE_START,
        }
    }

    /// Directories scanned, in order, for dependency files.
    pub fn with_search_path(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_path = dirs;
        self
    }

    /// Preload an image so dependency resolution finds it without touching
    /// the filesystem. Registered images take precedence over the search
    /// path.
    pub fn register(&mut self, image: SharedImage) {
        self.registry.insert(image.name.clone(), image);
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Run the full load: locate dependencies, map them, bind imports.
    pub fn load(&mut self, executable: LinkedExecutable) -> Result<RuntimeImage> {
        self.state = LoadState::DependenciesResolving;
        let located = match self.locate_dependencies(&executable) {
            Ok(images) => images,
            Err(e) => return self.fail(e),
        };

        self.state = LoadState::Relocating;
        let mut images: Vec<LoadedImage> = located
            .into_iter()
            .map(|image| self.map_image(image))
            .collect();

        let mut runtime = match self.relocate(executable, &mut images) {
            Ok(runtime) => runtime,
            Err(e) => return self.fail(e),
        };
        runtime.images = images;

        self.state = LoadState::Ready;
        Ok(runtime)
    }

    // ------------------------------------------------------------------
    // NotLoaded → DependenciesResolving
    // ------------------------------------------------------------------

    fn locate_dependencies(&self, executable: &LinkedExecutable) -> Result<Vec<SharedImage>> {
        let mut located = Vec::with_capacity(executable.dynamic_dependencies.len());
        for name in &executable.dynamic_dependencies {
            located.push(self.locate(name)?);
        }
        Ok(located)
    }

    fn locate(&self, name: &str) -> Result<SharedImage> {
        if let Some(image) = self.registry.get(name) {
            return Ok(image.clone());
        }
        for dir in &self.search_path {
            let candidate = dir.join(name);
            if candidate.is_file() {
                let data = std::fs::read(&candidate)?;
                return Ok(decode_shared(&data)?);
            }
        }
        Err(LoaderError::LibraryNotFound(name.to_string()))
    }

    // ------------------------------------------------------------------
    // DependenciesResolving → Relocating
    // ------------------------------------------------------------------

    fn map_image(&mut self, image: SharedImage) -> LoadedImage {
        let base = self.next_base;
        self.next_base = (base + image.extent()).div_ceil(PAGE) * PAGE + PAGE;
        let sections = image.sections.clone();
        LoadedImage {
            base,
            image,
            sections,
        }
    }

    // ------------------------------------------------------------------
    // Relocating → Ready
    // ------------------------------------------------------------------

    fn relocate(
        &self,
        mut executable: LinkedExecutable,
        images: &mut [LoadedImage],
    ) -> Result<RuntimeImage> {
        let mut got_table: FxHashMap<String, u64> = FxHashMap::default();

        // Every GOT entry of every image, and of the executable, resolves to
        // an absolute address under both strategies.
        for idx in 0..images.len() {
            let mut names: Vec<String> = images[idx].image.got_entries.keys().cloned().collect();
            names.sort_unstable();
            for name in names {
                let addr = lookup(images, &name)?;
                got_table.insert(name, addr);
            }
        }
        let mut exe_names: Vec<String> = executable.got_slots.keys().cloned().collect();
        exe_names.sort_unstable();
        for name in exe_names {
            let addr = lookup(images, &name)?;
            got_table.insert(name, addr);
        }

        match self.strategy {
            RelocationStrategy::LoadTimeRelocation => {
                for idx in 0..images.len() {
                    let base = images[idx].base;
                    let pending = images[idx].image.pending_relocs.clone();
                    for reloc in &pending {
                        let target = lookup(images, &reloc.symbol)?;
                        patch_site(&mut images[idx].sections, base, reloc, target);
                    }
                }
                let pending = executable.pending_relocs.clone();
                for reloc in &pending {
                    let target = lookup(images, &reloc.symbol)?;
                    // The executable occupies base 0.
                    patch_site(&mut executable.sections, 0, reloc, target);
                }
            }
            RelocationStrategy::PositionIndependent => {
                // No bytes move; leftover direct references are still
                // resolved so both strategies bind the same symbol set.
                let mut leftover: Vec<String> = images
                    .iter()
                    .flat_map(|img| img.image.pending_relocs.iter())
                    .chain(executable.pending_relocs.iter())
                    .map(|reloc| reloc.symbol.clone())
                    .collect();
                leftover.sort_unstable();
                leftover.dedup();
                for name in leftover {
                    if !got_table.contains_key(&name) {
                        let addr = lookup(images, &name)?;
                        got_table.insert(name, addr);
                    }
                }
            }
        }

        Ok(RuntimeImage {
            executable,
            images: Vec::new(),
            got_table,
        })
    }

    fn fail<T>(&mut self, err: LoaderError) -> Result<T> {
        self.state = LoadState::Failed;
        Err(err)
    }
}

/// Resolve `name` among the loaded images' exports, in dependency
/// declaration order; the first exporter wins.
fn lookup(images: &[LoadedImage], name: &str) -> Result<u64> {
    images
        .iter()
        .find_map(|img| img.export(name))
        .ok_or_else(|| LoaderError::SymbolNotFound(name.to_string()))
}

fn patch_site(
    sections: &mut [PlacedSection],
    base: u64,
    reloc: &ImageReloc,
    target: u64,
) {
    let value = match reloc.kind {
        RelocKind::Absolute => target as u32,
        RelocKind::PcRelative => {
            let site = base + sections[reloc.section].base_offset + reloc.offset;
            target.wrapping_sub(site) as u32
        }
        // GOT sites already hold their slot index; the indirection is
        // satisfied through the runtime GOT.
        RelocKind::GotRelative => return,
    };
    sections[reloc.section].write_slot(reloc.offset, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldsim_link::link;
    use ldsim_object::compile;
    use ldsim_shared::build_shared;

    fn shared_image() -> SharedImage {
        build_shared(
            "libshared_library.so",
            &[
                compile(
                    "sum",
                    "extern mul\nsection code\nsum_and_mul:\n    db 0x55\n    ref rel mul\n    ref abs sum_and_mul\n    db 0xc3\n",
                )
                .unwrap(),
                compile("mul", "section code\nmul:\n    db 0x0f 0xaf\n").unwrap(),
            ],
        )
        .unwrap()
    }

    fn dynamic_executable(image: &SharedImage) -> LinkedExecutable {
        let prog = compile(
            "main",
            "extern sum_and_mul\nsection code\nmain:\n    ref rel sum_and_mul\n    ref got sum_and_mul\n",
        )
        .unwrap();
        link(&prog, &[], std::slice::from_ref(image)).unwrap()
    }

    #[test]
    fn test_missing_library_fails_before_relocation() {
        let image = shared_image();
        let exe = dynamic_executable(&image);

        let mut loader = Loader::new(RelocationStrategy::PositionIndependent);
        let err = loader.load(exe).unwrap_err();
        assert_eq!(
            err.to_string(),
            "libshared_library.so => not found"
        );
        assert_eq!(loader.state(), LoadState::Failed);
    }

    #[test]
    fn test_load_from_registry_reaches_ready() {
        let image = shared_image();
        let exe = dynamic_executable(&image);

        let mut loader = Loader::new(RelocationStrategy::PositionIndependent);
        loader.register(image);
        let runtime = loader.load(exe).unwrap();

        assert_eq!(loader.state(), LoadState::Ready);
        assert_eq!(runtime.base_of("libshared_library.so"), Some(BASE_START));
        let sum = runtime.got_table["sum_and_mul"];
        assert_eq!(sum, BASE_START);
    }

    #[test]
    fn test_base_allocation_is_monotonic_and_page_aligned() {
        let first = shared_image();
        let second = build_shared(
            "libother.so",
            &[compile("o", "section code\nother:\n    db 1\n").unwrap()],
        )
        .unwrap();

        let prog = compile(
            "main",
            "extern sum_and_mul\nextern other\nsection code\nmain:\n    ref got sum_and_mul\n    ref got other\n",
        )
        .unwrap();
        let exe = link(&prog, &[], &[first.clone(), second.clone()]).unwrap();

        let mut loader = Loader::new(RelocationStrategy::PositionIndependent);
        loader.register(first);
        loader.register(second);
        let runtime = loader.load(exe).unwrap();

        let a = runtime.base_of("libshared_library.so").unwrap();
        let b = runtime.base_of("libother.so").unwrap();
        assert_eq!(a, BASE_START);
        assert!(b > a);
        assert_eq!(b % PAGE, 0);
    }

    #[test]
    fn test_missing_symbol_fails() {
        let incomplete = build_shared(
            "libshared_library.so",
            &[compile("sum", "section code\nsum_and_mul:\n    db 0xc3\n").unwrap()],
        )
        .unwrap();
        let prog = compile(
            "main",
            "extern sum_and_mul\nextern absent\nsection code\nmain:\n    ref got sum_and_mul\n    ref got absent\n",
        )
        .unwrap();
        // Fabricate the import by linking against an image that exported
        // `absent` at link time but lost it before load (version skew).
        let stale = build_shared(
            "libshared_library.so",
            &[compile(
                "sum",
                "section code\nsum_and_mul:\n    db 0xc3\nabsent:\n    db 1\n",
            )
            .unwrap()],
        )
        .unwrap();
        let exe = link(&prog, &[], &[stale]).unwrap();

        let mut loader = Loader::new(RelocationStrategy::PositionIndependent);
        loader.register(incomplete);
        let err = loader.load(exe).unwrap_err();
        assert_eq!(
            err.to_string(),
            "symbol lookup error: undefined symbol: absent"
        );
        assert_eq!(loader.state(), LoadState::Failed);
    }

    #[test]
    fn test_position_independent_leaves_code_untouched() {
        let image = shared_image();
        let exe = dynamic_executable(&image);

        let mut loader = Loader::new(RelocationStrategy::PositionIndependent);
        loader.register(image.clone());
        let runtime = loader.load(exe).unwrap();

        for (loaded, original) in runtime.images[0].sections.iter().zip(&image.sections) {
            assert_eq!(loaded.bytes, original.bytes);
        }
    }

    #[test]
    fn test_load_time_relocation_patches_sites() {
        let image = shared_image();
        let exe = dynamic_executable(&image);

        let mut loader = Loader::new(RelocationStrategy::LoadTimeRelocation);
        loader.register(image.clone());
        let runtime = loader.load(exe).unwrap();

        // The image's absolute self-reference (offset 5 of section 0) now
        // holds sum_and_mul's absolute address.
        let patched = runtime.images[0].sections[0].read_slot(5);
        assert_eq!(u64::from(patched), runtime.got_table["sum_and_mul"]);

        // The executable's direct call site holds a PC-relative
        // displacement landing on the resolved address.
        let delta = runtime.executable.sections[0].read_slot(0);
        let site = runtime.executable.sections[0].base_offset;
        assert_eq!(
            site.wrapping_add(u64::from(delta)) as u32 as u64,
            runtime.got_table["sum_and_mul"] as u32 as u64
        );
    }

    #[test]
    fn test_strategies_resolve_identically() {
        let image = shared_image();

        let mut pic = Loader::new(RelocationStrategy::PositionIndependent);
        pic.register(image.clone());
        let pic_runtime = pic.load(dynamic_executable(&image)).unwrap();

        let mut eager = Loader::new(RelocationStrategy::LoadTimeRelocation);
        eager.register(image.clone());
        let eager_runtime = eager.load(dynamic_executable(&image)).unwrap();

        assert_eq!(pic_runtime.got_table, eager_runtime.got_table);
    }

    #[test]
    fn test_search_path_loads_from_disk() {
        let image = shared_image();
        let exe = dynamic_executable(&image);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libshared_library.so");
        std::fs::write(&path, ldsim_shared::encode_shared(&image)).unwrap();

        let mut loader = Loader::new(RelocationStrategy::PositionIndependent)
            .with_search_path(vec![dir.path().to_path_buf()]);
        let runtime = loader.load(exe).unwrap();
        assert_eq!(loader.state(), LoadState::Ready);
        assert!(runtime.got_table.contains_key("sum_and_mul"));
    }
}
