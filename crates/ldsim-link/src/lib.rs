//! Static linker.
//!
//! Resolves a program object against archives (copying defining members into
//! the image, transitively) and optionally against shared images (recording
//! load-time dependencies). Every relocation is rewritten exactly once; no
//! output is produced if any symbol stays undefined.

mod format;

pub use format::*;

use std::collections::VecDeque;

use ldsim_archive::Archive;
use ldsim_object::{ImageReloc, Object, PlacedSection, RelocKind, SectionLayout, SymbolKind};
use ldsim_shared::SharedImage;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

/// Linking errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LinkError {
    #[error("undefined reference to '{0}'")]
    UndefinedSymbol(String),
    #[error("duplicate symbol '{0}'")]
    DuplicateSymbol(String),
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// Terminal artifact of the linker.
///
/// For a static-only link every symbol is resolved and the dynamic fields
/// are empty. When shared images participate, imported symbols keep GOT
/// indirections and their direct reference sites are deferred to the loader.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkedExecutable {
    pub sections: Vec<PlacedSection>,
    /// Name → absolute offset of every statically resolved symbol.
    pub resolved_symbols: FxHashMap<String, u64>,
    /// Shared image names, in first-use order.
    pub dynamic_dependencies: Vec<String>,
    /// Name → GOT slot index for every dynamic import.
    pub got_slots: FxHashMap<String, usize>,
    /// Import reference sites left for the loader.
    pub pending_relocs: Vec<ImageReloc>,
}

impl LinkedExecutable {
    /// Whether the image is fully static.
    pub fn is_static(&self) -> bool {
        self.dynamic_dependencies.is_empty()
    }

    /// Absolute offset of a statically resolved symbol.
    pub fn symbol(&self, name: &str) -> Option<u64> {
        self.resolved_symbols.get(name).copied()
    }
}

/// Identity of an object pulled into the working set.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum SourceId {
    Program,
    Member { library: usize, member: usize },
}

/// Link `program` against `libraries` (searched in order, members in archive
/// order) and `shared` images (searched after all archives, in order).
pub fn link(
    program: &Object,
    libraries: &[Archive],
    shared: &[SharedImage],
) -> Result<LinkedExecutable> {
    let mut included: Vec<&Object> = vec![program];
    let mut included_ids: FxHashSet<SourceId> = FxHashSet::default();
    included_ids.insert(SourceId::Program);

    // name → (position in `included`, section, offset) for every definition
    // pulled so far. Two definitions of one name are a hard error.
    let mut defined: FxHashMap<String, (usize, usize, u64)> = FxHashMap::default();
    add_definitions(&mut defined, program, 0)?;

    let mut worklist: VecDeque<String> = program
        .undefined_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut queued: FxHashSet<String> = worklist.iter().cloned().collect();

    let mut dynamic_dependencies: Vec<String> = Vec::new();
    let mut got_slots: FxHashMap<String, usize> = FxHashMap::default();
    let mut deferred: Vec<String> = Vec::new();

    while let Some(name) = worklist.pop_front() {
        if defined.contains_key(&name) || got_slots.contains_key(&name) {
            continue;
        }

        if let Some((lib_idx, member_idx)) = find_provider(libraries, &name) {
            let id = SourceId::Member {
                library: lib_idx,
                member: member_idx,
            };
            if included_ids.insert(id) {
                let object = &libraries[lib_idx].members[member_idx].object;
                let position = included.len();
                included.push(object);
                add_definitions(&mut defined, object, position)?;
                // Transitive pull-in: the member's own unresolved names join
                // the working set.
                for undefined in object.undefined_names() {
                    if queued.insert(undefined.to_string()) {
                        worklist.push_back(undefined.to_string());
                    }
                }
            }
            continue;
        }

        if let Some(image) = shared.iter().find(|img| img.export(&name).is_some()) {
            if !dynamic_dependencies.contains(&image.name) {
                dynamic_dependencies.push(image.name.clone());
            }
            let next = got_slots.len();
            got_slots.entry(name).or_insert(next);
            continue;
        }

        // No archive member or shared image provides the name yet; a member
        // pulled in later may still define it, so the verdict waits for the
        // fixed point.
        deferred.push(name);
    }

    for name in deferred {
        if !defined.contains_key(&name) && !got_slots.contains_key(&name) {
            return Err(LinkError::UndefinedSymbol(name));
        }
    }

    // Layout: program sections first, then pulled-in objects in discovery
    // order. Inclusion order fixes every base offset.
    let mut layout = SectionLayout::new();
    let mut sections = Vec::new();
    let mut section_map: FxHashMap<(usize, usize), usize> = FxHashMap::default();
    for (position, object) in included.iter().enumerate() {
        for (sec_idx, sec) in object.sections.iter().enumerate() {
            section_map.insert((position, sec_idx), sections.len());
            sections.push(layout.place(sec.kind, sec.bytes.clone()));
        }
    }

    let mut resolved_symbols: FxHashMap<String, u64> = FxHashMap::default();
    for (name, (position, section, offset)) in &defined {
        let placed = &sections[section_map[&(*position, *section)]];
        resolved_symbols.insert(name.clone(), placed.base_offset + offset);
    }

    let mut pending_relocs: Vec<ImageReloc> = Vec::new();
    for (position, object) in included.iter().enumerate() {
        for reloc in &object.relocations {
            let section = section_map[&(position, reloc.section)];
            if let Some(target) = resolved_symbols.get(&reloc.symbol).copied() {
                let value = match reloc.kind {
                    // A GOT load against a statically bound symbol relaxes
                    // to a direct reference.
                    RelocKind::Absolute | RelocKind::GotRelative => target as u32,
                    RelocKind::PcRelative => {
                        let site = sections[section].base_offset + reloc.offset;
                        target.wrapping_sub(site) as u32
                    }
                };
                sections[section].write_slot(reloc.offset, value);
            } else {
                // Closure guarantees the import has a GOT slot.
                let slot = got_slots[&reloc.symbol];
                match reloc.kind {
                    RelocKind::GotRelative => {
                        sections[section].write_slot(reloc.offset, slot as u32);
                    }
                    RelocKind::Absolute | RelocKind::PcRelative => {
                        pending_relocs.push(ImageReloc {
                            section,
                            offset: reloc.offset,
                            symbol: reloc.symbol.clone(),
                            kind: reloc.kind,
                        });
                    }
                }
            }
        }
    }

    Ok(LinkedExecutable {
        sections,
        resolved_symbols,
        dynamic_dependencies,
        got_slots,
        pending_relocs,
    })
}

/// First archive (command-line order), first member (archive order) defining
/// `name`.
fn find_provider(libraries: &[Archive], name: &str) -> Option<(usize, usize)> {
    for (lib_idx, library) in libraries.iter().enumerate() {
        for (member_idx, member) in library.members.iter().enumerate() {
            if member.object.defines(name) {
                return Some((lib_idx, member_idx));
            }
        }
    }
    None
}

fn add_definitions(
    defined: &mut FxHashMap<String, (usize, usize, u64)>,
    object: &Object,
    position: usize,
) -> Result<()> {
    for sym in object.defined_symbols() {
        let SymbolKind::Defined { section, offset } = sym.kind else {
            unreachable!("defined_symbols returned an undefined symbol");
        };
        if defined
            .insert(sym.name.clone(), (position, section, offset))
            .is_some()
        {
            return Err(LinkError::DuplicateSymbol(sym.name.clone()));
        }
    }
    Ok(())
}
