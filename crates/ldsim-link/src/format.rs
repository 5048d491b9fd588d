//! `LDX1` executable codec.

use ldsim_object::{
    read_image_reloc, read_placed_section, write_image_reloc, write_placed_section,
    write_sorted_map, ArtifactReader, ArtifactWriter, FormatError,
};
use rustc_hash::FxHashMap;

use crate::LinkedExecutable;

/// Magic for serialized [`LinkedExecutable`] artifacts.
pub const MAGIC_EXECUTABLE: [u8; 4] = *b"LDX1";

/// Serialize an executable to `LDX1` bytes.
pub fn encode_executable(exe: &LinkedExecutable) -> Vec<u8> {
    let mut w = ArtifactWriter::new(MAGIC_EXECUTABLE);

    w.u32(exe.sections.len() as u32);
    for sec in &exe.sections {
        write_placed_section(&mut w, sec);
    }

    write_sorted_map(&mut w, &exe.resolved_symbols, |w, addr| w.u64(*addr));

    w.u32(exe.dynamic_dependencies.len() as u32);
    for dep in &exe.dynamic_dependencies {
        w.str(dep);
    }

    write_sorted_map(&mut w, &exe.got_slots, |w, slot| w.u32(*slot as u32));

    w.u32(exe.pending_relocs.len() as u32);
    for reloc in &exe.pending_relocs {
        write_image_reloc(&mut w, reloc);
    }

    w.finish()
}

/// Deserialize an executable from `LDX1` bytes.
pub fn decode_executable(data: &[u8]) -> Result<LinkedExecutable, FormatError> {
    let mut r = ArtifactReader::new(data, MAGIC_EXECUTABLE)?;

    let num_sections = r.u32()?;
    let mut sections = Vec::with_capacity(num_sections as usize);
    for _ in 0..num_sections {
        sections.push(read_placed_section(&mut r)?);
    }

    let num_symbols = r.u32()?;
    let mut resolved_symbols = FxHashMap::default();
    for _ in 0..num_symbols {
        let sym = r.str()?;
        let addr = r.u64()?;
        resolved_symbols.insert(sym, addr);
    }

    let num_deps = r.u32()?;
    let mut dynamic_dependencies = Vec::with_capacity(num_deps as usize);
    for _ in 0..num_deps {
        dynamic_dependencies.push(r.str()?);
    }

    let num_got = r.u32()?;
    let mut got_slots = FxHashMap::default();
    for _ in 0..num_got {
        let sym = r.str()?;
        let slot = r.u32()? as usize;
        got_slots.insert(sym, slot);
    }

    let num_relocs = r.u32()?;
    let mut pending_relocs = Vec::with_capacity(num_relocs as usize);
    for _ in 0..num_relocs {
        pending_relocs.push(read_image_reloc(&mut r)?);
    }

    Ok(LinkedExecutable {
        sections,
        resolved_symbols,
        dynamic_dependencies,
        got_slots,
        pending_relocs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link;
    use ldsim_archive::archive;
    use ldsim_object::compile;
    use ldsim_shared::build_shared;

    #[test]
    fn test_executable_round_trip() {
        let prog = compile(
            "main",
            "extern sum_and_mul\nextern tally\nsection code\nmain:\n    ref rel sum_and_mul\n    ref got tally\n",
        )
        .unwrap();
        let lib = archive(
            None,
            "libstatic_library.a",
            vec![compile("sum", "section code\nsum_and_mul:\n    db 0xc3\n").unwrap()],
            vec!["sum".to_string()],
        )
        .unwrap();
        let image = build_shared(
            "libshared_library.so",
            &[compile("tally", "section data\ntally:\n    dd 0\n").unwrap()],
        )
        .unwrap();

        let exe = link(&prog, &[lib], &[image]).unwrap();
        let decoded = decode_executable(&encode_executable(&exe)).unwrap();
        assert_eq!(decoded, exe);
    }

    #[test]
    fn test_bad_magic() {
        assert_eq!(
            decode_executable(b"LDS1....").unwrap_err(),
            FormatError::BadMagic
        );
    }
}
