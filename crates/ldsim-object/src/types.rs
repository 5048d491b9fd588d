//! Relocatable object types.

use rustc_hash::FxHashMap;

/// Width in bytes of a relocation site. Every `ref` directive emits one
/// zero-filled slot of this size.
pub const SLOT_SIZE: usize = 4;

/// Section contents classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectionKind {
    Code,
    Data,
}

/// A section owned by a relocatable object.
///
/// Sections have no addresses of their own; a `base_offset` is assigned only
/// when the bytes are copied into an image (see `PlacedSection`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    pub kind: SectionKind,
    pub bytes: Vec<u8>,
}

/// How a relocation site is rewritten once its target is known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelocKind {
    /// Site receives the target's absolute address.
    Absolute,
    /// Site receives `target - site` as a signed 32-bit displacement.
    PcRelative,
    /// Site receives the index of the target's GOT slot.
    GotRelative,
}

/// An unresolved reference from a section to a symbol, in object coordinates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relocation {
    /// Index of the referencing section within the owning object.
    pub section: usize,
    /// Byte offset of the slot within that section.
    pub offset: u64,
    /// Name of the target symbol.
    pub symbol: String,
    pub kind: RelocKind,
}

/// Whether a symbol is defined by its object or demanded from elsewhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    /// Defined at `offset` within section `section` of the owning object.
    Defined { section: usize, offset: u64 },
    /// A placeholder demanding resolution at link or load time.
    Undefined,
}

/// A named symbol table entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Extent of the definition; 0 for undefined symbols.
    pub size: u64,
}

impl Symbol {
    /// Check whether this entry defines the name.
    pub fn is_defined(&self) -> bool {
        matches!(self.kind, SymbolKind::Defined { .. })
    }
}

/// A compiled translation unit: sections, a symbol table, and the
/// relocations that reference it. Immutable once produced; the archiver,
/// linker and shared-object builder only ever read it.
#[derive(Clone, Debug, PartialEq)]
pub struct Object {
    pub name: String,
    pub sections: Vec<Section>,
    pub symbols: FxHashMap<String, Symbol>,
    pub relocations: Vec<Relocation>,
}

impl Object {
    /// Look up a symbol by name.
    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// Check whether this object defines `name`.
    pub fn defines(&self, name: &str) -> bool {
        self.symbols.get(name).is_some_and(Symbol::is_defined)
    }

    /// Names of undefined symbols, sorted for deterministic iteration.
    pub fn undefined_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .symbols
            .values()
            .filter(|s| !s.is_defined())
            .map(|s| s.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Defined symbols, sorted by name for deterministic iteration.
    pub fn defined_symbols(&self) -> Vec<&Symbol> {
        let mut syms: Vec<&Symbol> = self
            .symbols
            .values()
            .filter(|s| s.is_defined())
            .collect();
        syms.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        syms
    }
}
