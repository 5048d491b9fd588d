//! Inspect command.

use std::path::Path;

use tracing::error;

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use ldsim::{
    Archive, LinkedExecutable, Object, PlacedSection, SharedImage, SymbolKind, MAGIC_ARCHIVE,
    MAGIC_EXECUTABLE, MAGIC_OBJECT, MAGIC_SHARED,
};

/// Handle the `inspect` command: dump any artifact, dispatching on magic.
pub fn cmd_inspect(input: &Path) -> i32 {
    let data = match std::fs::read(input) {
        Ok(data) => data,
        Err(e) => {
            error!(error = %e, path = %input.display(), "failed to read artifact");
            return EXIT_FAILURE;
        }
    };

    let result = match ldsim::peek_magic(&data) {
        Some(MAGIC_OBJECT) => ldsim::decode_object(&data).map(|o| print_object(&o)),
        Some(MAGIC_ARCHIVE) => ldsim::decode_archive(&data).map(|a| print_archive(&a)),
        Some(MAGIC_SHARED) => ldsim::decode_shared(&data).map(|s| print_shared(&s)),
        Some(MAGIC_EXECUTABLE) => ldsim::decode_executable(&data).map(|e| print_executable(&e)),
        _ => {
            error!(path = %input.display(), "not an ldsim artifact");
            return EXIT_FAILURE;
        }
    };

    match result {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            error!(error = %e, path = %input.display(), "failed to decode artifact");
            EXIT_FAILURE
        }
    }
}

fn print_object(object: &Object) {
    println!("object '{}'", object.name);
    for (i, sec) in object.sections.iter().enumerate() {
        println!("  section {i}: {:?}, {} bytes", sec.kind, sec.bytes.len());
    }
    let mut names: Vec<&String> = object.symbols.keys().collect();
    names.sort_unstable();
    for name in names {
        match object.symbols[name].kind {
            SymbolKind::Defined { section, offset } => println!(
                "  symbol {name}: defined at section {section} + {offset:#x}, size {}",
                object.symbols[name].size
            ),
            SymbolKind::Undefined => println!("  symbol {name}: undefined"),
        }
    }
    for reloc in &object.relocations {
        println!(
            "  reloc {:?} -> '{}' at section {} + {:#x}",
            reloc.kind, reloc.symbol, reloc.section, reloc.offset
        );
    }
}

fn print_archive(archive: &Archive) {
    println!("archive '{}'", archive.name);
    for member in &archive.members {
        println!(
            "  member '{}': object '{}', {} sections",
            member.name,
            member.object.name,
            member.object.sections.len()
        );
    }
}

fn print_shared(image: &SharedImage) {
    println!("shared image '{}'", image.name);
    print_sections(&image.sections);
    let mut exports: Vec<(&String, &u64)> = image.exported_symbols.iter().collect();
    exports.sort_unstable();
    for (name, addr) in exports {
        println!("  export {name} @ {addr:#x}");
    }
    for name in &image.imported_symbols {
        println!("  import {name} (GOT slot {})", image.got_entries[name]);
    }
    println!("  {} pending relocation(s)", image.pending_relocs.len());
}

fn print_executable(exe: &LinkedExecutable) {
    println!(
        "executable ({})",
        if exe.is_static() { "static" } else { "dynamic" }
    );
    print_sections(&exe.sections);
    let mut symbols: Vec<(&String, &u64)> = exe.resolved_symbols.iter().collect();
    symbols.sort_unstable();
    for (name, addr) in symbols {
        println!("  symbol {name} @ {addr:#x}");
    }
    for dep in &exe.dynamic_dependencies {
        println!("  needs {dep}");
    }
    let mut slots: Vec<(&String, &usize)> = exe.got_slots.iter().collect();
    slots.sort_unstable();
    for (name, slot) in slots {
        println!("  import {name} (GOT slot {slot})");
    }
}

fn print_sections(sections: &[PlacedSection]) {
    for (i, sec) in sections.iter().enumerate() {
        println!(
            "  section {i}: {:?} @ {:#x}, {} bytes",
            sec.kind,
            sec.base_offset,
            sec.bytes.len()
        );
    }
}
