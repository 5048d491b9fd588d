//! `LDS1` shared image codec.

use ldsim_object::{
    read_image_reloc, read_placed_section, write_image_reloc, write_placed_section,
    write_sorted_map, ArtifactReader, ArtifactWriter, FormatError,
};
use rustc_hash::FxHashMap;

use crate::SharedImage;

/// Magic for serialized [`SharedImage`] artifacts.
pub const MAGIC_SHARED: [u8; 4] = *b"LDS1";

/// Serialize a shared image to `LDS1` bytes.
pub fn encode_shared(image: &SharedImage) -> Vec<u8> {
    let mut w = ArtifactWriter::new(MAGIC_SHARED);
    w.str(&image.name);

    w.u32(image.sections.len() as u32);
    for sec in &image.sections {
        write_placed_section(&mut w, sec);
    }

    write_sorted_map(&mut w, &image.exported_symbols, |w, addr| w.u64(*addr));

    w.u32(image.imported_symbols.len() as u32);
    for name in &image.imported_symbols {
        w.str(name);
    }

    write_sorted_map(&mut w, &image.got_entries, |w, slot| w.u32(*slot as u32));

    w.u32(image.pending_relocs.len() as u32);
    for reloc in &image.pending_relocs {
        write_image_reloc(&mut w, reloc);
    }

    w.finish()
}

/// Deserialize a shared image from `LDS1` bytes.
pub fn decode_shared(data: &[u8]) -> Result<SharedImage, FormatError> {
    let mut r = ArtifactReader::new(data, MAGIC_SHARED)?;
    let name = r.str()?;

    let num_sections = r.u32()?;
    let mut sections = Vec::with_capacity(num_sections as usize);
    for _ in 0..num_sections {
        sections.push(read_placed_section(&mut r)?);
    }

    let num_exports = r.u32()?;
    let mut exported_symbols = FxHashMap::default();
    for _ in 0..num_exports {
        let sym = r.str()?;
        let addr = r.u64()?;
        exported_symbols.insert(sym, addr);
    }

    let num_imports = r.u32()?;
    let mut imported_symbols = Vec::with_capacity(num_imports as usize);
    for _ in 0..num_imports {
        imported_symbols.push(r.str()?);
    }

    let num_got = r.u32()?;
    let mut got_entries = FxHashMap::default();
    for _ in 0..num_got {
        let sym = r.str()?;
        let slot = r.u32()? as usize;
        got_entries.insert(sym, slot);
    }

    let num_relocs = r.u32()?;
    let mut pending_relocs = Vec::with_capacity(num_relocs as usize);
    for _ in 0..num_relocs {
        pending_relocs.push(read_image_reloc(&mut r)?);
    }

    Ok(SharedImage {
        name,
        sections,
        exported_symbols,
        imported_symbols,
        got_entries,
        pending_relocs,
    })
}
