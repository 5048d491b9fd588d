//! Shared object builder.
//!
//! Packages objects into a dynamically loadable image. Defined symbols are
//! exported at image-relative addresses; unresolved references stay imports
//! with reserved GOT slots, bound only when a loader maps the image.

mod format;

pub use format::*;

use ldsim_object::{
    ImageReloc, Object, PlacedSection, RelocKind, SectionLayout,
};
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Shared object build errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SharedError {
    #[error("symbol '{0}' defined more than once in shared object set")]
    DuplicateSymbol(String),
}

pub type Result<T> = std::result::Result<T, SharedError>;

/// A dynamically loadable image.
///
/// Unlike an archive, the image is a single bundled unit; unlike an
/// executable, its imports remain unresolved until load time.
#[derive(Clone, Debug, PartialEq)]
pub struct SharedImage {
    pub name: String,
    pub sections: Vec<PlacedSection>,
    /// Name → image-relative address of every defined symbol.
    pub exported_symbols: FxHashMap<String, u64>,
    /// Unresolved names, in first-reference order.
    pub imported_symbols: Vec<String>,
    /// Name → reserved GOT slot index. Covers every import plus internal
    /// symbols referenced through the GOT.
    pub got_entries: FxHashMap<String, usize>,
    /// Relocations deferred to load time, in image coordinates.
    pub pending_relocs: Vec<ImageReloc>,
}

impl SharedImage {
    /// Image-relative address of an exported symbol.
    pub fn export(&self, name: &str) -> Option<u64> {
        self.exported_symbols.get(name).copied()
    }

    /// First offset past the last section.
    pub fn extent(&self) -> u64 {
        self.sections.last().map_or(0, PlacedSection::end)
    }
}

/// Package `objects` into a shared image named `name`.
///
/// Sections are concatenated preserving relative order. Internally bound
/// PC-relative references are finished here (their displacement does not
/// depend on the load base); GOT-relative sites get their slot index
/// written; everything else is carried for the loader. Unresolved imports
/// are not an error.
pub fn build_shared(name: &str, objects: &[Object]) -> Result<SharedImage> {
    let mut layout = SectionLayout::new();
    let mut sections = Vec::new();
    let mut section_map: FxHashMap<(usize, usize), usize> = FxHashMap::default();

    for (obj_idx, obj) in objects.iter().enumerate() {
        for (sec_idx, sec) in obj.sections.iter().enumerate() {
            section_map.insert((obj_idx, sec_idx), sections.len());
            sections.push(layout.place(sec.kind, sec.bytes.clone()));
        }
    }

    // Export every defined symbol; a name defined twice in the set would be
    // ambiguous at lookup time.
    let mut exported_symbols: FxHashMap<String, u64> = FxHashMap::default();
    for (obj_idx, obj) in objects.iter().enumerate() {
        for sym in obj.defined_symbols() {
            let ldsim_object::SymbolKind::Defined { section, offset } = sym.kind else {
                unreachable!("defined_symbols returned an undefined symbol");
            };
            let placed = &sections[section_map[&(obj_idx, section)]];
            let addr = placed.base_offset + offset;
            if exported_symbols.insert(sym.name.clone(), addr).is_some() {
                return Err(SharedError::DuplicateSymbol(sym.name.clone()));
            }
        }
    }

    let mut imported_symbols: Vec<String> = Vec::new();
    let mut got_entries: FxHashMap<String, usize> = FxHashMap::default();
    let mut pending_relocs: Vec<ImageReloc> = Vec::new();

    for (obj_idx, obj) in objects.iter().enumerate() {
        for reloc in &obj.relocations {
            let section = section_map[&(obj_idx, reloc.section)];
            let bound = exported_symbols.get(&reloc.symbol).copied();
            if bound.is_none() {
                ensure_import(&reloc.symbol, &mut imported_symbols, &mut got_entries);
            }

            match (reloc.kind, bound) {
                (RelocKind::GotRelative, _) => {
                    // Slot indices are base-independent, so the site can be
                    // finished now and the code never needs patching again.
                    let slot = ensure_slot(&reloc.symbol, &mut got_entries);
                    sections[section].write_slot(reloc.offset, slot as u32);
                }
                (RelocKind::PcRelative, Some(target)) => {
                    let site = sections[section].base_offset + reloc.offset;
                    let delta = target.wrapping_sub(site) as i64 as i32;
                    sections[section].write_slot(reloc.offset, delta as u32);
                }
                _ => pending_relocs.push(ImageReloc {
                    section,
                    offset: reloc.offset,
                    symbol: reloc.symbol.clone(),
                    kind: reloc.kind,
                }),
            }
        }
    }

    // Undefined symbol-table entries without a referencing relocation are
    // still imports the loader must bind.
    for obj in objects {
        for name in obj.undefined_names() {
            if !exported_symbols.contains_key(name) {
                ensure_import(name, &mut imported_symbols, &mut got_entries);
            }
        }
    }

    Ok(SharedImage {
        name: name.to_string(),
        sections,
        exported_symbols,
        imported_symbols,
        got_entries,
        pending_relocs,
    })
}

fn ensure_slot(name: &str, got: &mut FxHashMap<String, usize>) -> usize {
    let next = got.len();
    *got.entry(name.to_string()).or_insert(next)
}

fn ensure_import(
    name: &str,
    imports: &mut Vec<String>,
    got: &mut FxHashMap<String, usize>,
) {
    if !imports.iter().any(|n| n == name) {
        imports.push(name.to_string());
    }
    ensure_slot(name, got);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldsim_object::compile;

    fn objects() -> Vec<Object> {
        vec![
            compile(
                "sum",
                "extern mul\nextern tally\nsection code\nsum_and_mul:\n    db 0x55\n    ref rel mul\n    ref got tally\n    db 0xc3\n",
            )
            .unwrap(),
            compile("mul", "section code\nmul:\n    db 0x0f 0xaf\n").unwrap(),
        ]
    }

    #[test]
    fn test_exports_every_defined_symbol() {
        let image = build_shared("libshared_library.so", &objects()).unwrap();
        let sum = image.export("sum_and_mul").unwrap();
        let mul = image.export("mul").unwrap();
        assert_eq!(sum, 0);
        // sum section: 1 + 4 + 4 + 1 = 10 bytes, next aligned offset is 12.
        assert_eq!(mul, 12);
    }

    #[test]
    fn test_duplicate_definition_fails() {
        let twice = vec![
            compile("a", "section code\nmul:\n    db 1\n").unwrap(),
            compile("b", "section code\nmul:\n    db 2\n").unwrap(),
        ];
        assert_eq!(
            build_shared("lib.so", &twice).unwrap_err(),
            SharedError::DuplicateSymbol("mul".to_string())
        );
    }

    #[test]
    fn test_internal_pc_relative_is_finished_at_build() {
        let image = build_shared("lib.so", &objects()).unwrap();
        // `ref rel mul` sits at offset 1 of section 0; mul lives at 12.
        let delta = image.sections[0].read_slot(1) as i32;
        assert_eq!(delta, 11);
        assert!(
            image
                .pending_relocs
                .iter()
                .all(|r| r.symbol != "mul")
        );
    }

    #[test]
    fn test_imports_keep_got_slots_and_sites_reference_them() {
        let image = build_shared("lib.so", &objects()).unwrap();
        assert_eq!(image.imported_symbols, vec!["tally".to_string()]);
        let slot = image.got_entries["tally"];
        assert_eq!(image.sections[0].read_slot(5), slot as u32);
    }

    #[test]
    fn test_got_slots_are_dense() {
        let objs = vec![compile(
            "many",
            "extern a\nextern b\nextern c\nsection code\nf:\n    ref got a\n    ref got b\n    ref got c\n",
        )
        .unwrap()];
        let image = build_shared("lib.so", &objs).unwrap();
        let mut slots: Vec<usize> = image.got_entries.values().copied().collect();
        slots.sort_unstable();
        assert_eq!(slots, vec![0, 1, 2]);
    }

    #[test]
    fn test_absolute_relocations_are_carried() {
        let objs = vec![compile(
            "abs",
            "section data\ntable:\n    ref abs table\n",
        )
        .unwrap()];
        let image = build_shared("lib.so", &objs).unwrap();
        assert_eq!(image.pending_relocs.len(), 1);
        assert_eq!(image.pending_relocs[0].symbol, "table");
        assert_eq!(image.pending_relocs[0].kind, RelocKind::Absolute);
    }

    #[test]
    fn test_unresolved_imports_do_not_fail() {
        let objs = vec![compile(
            "lonely",
            "extern absent\nsection code\nf:\n    ref rel absent\n",
        )
        .unwrap()];
        let image = build_shared("lib.so", &objs).unwrap();
        assert_eq!(image.imported_symbols, vec!["absent".to_string()]);
        assert!(image.got_entries.contains_key("absent"));
        assert_eq!(image.pending_relocs.len(), 1);
    }
}
