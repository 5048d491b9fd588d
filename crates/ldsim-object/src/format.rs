//! Binary artifact format.
//!
//! Every pipeline artifact is a tagged little-endian byte stream: a 4-byte
//! magic, then the entity fields. Strings are u32 length + UTF-8; maps are
//! written sorted by key so encoding is canonical. The primitives here are
//! reused by the archive, executable and shared-image codecs downstream.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::image::{ImageReloc, PlacedSection};
use crate::types::{Object, RelocKind, Relocation, Section, SectionKind, Symbol, SymbolKind};

/// Magic for serialized [`Object`] artifacts.
pub const MAGIC_OBJECT: [u8; 4] = *b"LDO1";

/// Artifact decoding errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FormatError {
    #[error("bad magic number")]
    BadMagic,
    #[error("artifact truncated")]
    Truncated,
    #[error("invalid string data")]
    BadString,
    #[error("invalid tag byte {0:#04x}")]
    BadTag(u8),
}

/// Identify an artifact by its leading magic, without decoding it.
pub fn peek_magic(data: &[u8]) -> Option<[u8; 4]> {
    let head: [u8; 4] = data.get(..4)?.try_into().ok()?;
    Some(head)
}

// ============================================================================
// Primitives
// ============================================================================

/// Append-only artifact encoder. Writing into memory cannot fail.
pub struct ArtifactWriter {
    buf: Vec<u8>,
}

impl ArtifactWriter {
    pub fn new(magic: [u8; 4]) -> Self {
        Self { buf: magic.to_vec() }
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn str(&mut self, s: &str) {
        self.bytes(s.as_bytes());
    }

    /// Length-prefixed byte run.
    pub fn bytes(&mut self, b: &[u8]) {
        self.u32(b.len() as u32);
        self.buf.extend_from_slice(b);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked artifact decoder.
pub struct ArtifactReader<'a> {
    cur: Cursor<&'a [u8]>,
}

impl<'a> ArtifactReader<'a> {
    /// Open `data`, validating the expected magic.
    pub fn new(data: &'a [u8], magic: [u8; 4]) -> Result<Self, FormatError> {
        if peek_magic(data) != Some(magic) {
            return Err(FormatError::BadMagic);
        }
        let mut cur = Cursor::new(data);
        cur.set_position(4);
        Ok(Self { cur })
    }

    pub fn u8(&mut self) -> Result<u8, FormatError> {
        self.cur.read_u8().map_err(|_| FormatError::Truncated)
    }

    pub fn u32(&mut self) -> Result<u32, FormatError> {
        self.cur
            .read_u32::<LittleEndian>()
            .map_err(|_| FormatError::Truncated)
    }

    pub fn u64(&mut self) -> Result<u64, FormatError> {
        self.cur
            .read_u64::<LittleEndian>()
            .map_err(|_| FormatError::Truncated)
    }

    pub fn str(&mut self) -> Result<String, FormatError> {
        let raw = self.bytes()?;
        String::from_utf8(raw).map_err(|_| FormatError::BadString)
    }

    pub fn bytes(&mut self) -> Result<Vec<u8>, FormatError> {
        let len = self.u32()? as usize;
        let mut buf = vec![0; len];
        self.cur
            .read_exact(&mut buf)
            .map_err(|_| FormatError::Truncated)?;
        Ok(buf)
    }
}

// ============================================================================
// Shared tag codecs
// ============================================================================

pub fn section_kind_tag(kind: SectionKind) -> u8 {
    match kind {
        SectionKind::Code => 0,
        SectionKind::Data => 1,
    }
}

pub fn section_kind_from_tag(tag: u8) -> Result<SectionKind, FormatError> {
    match tag {
        0 => Ok(SectionKind::Code),
        1 => Ok(SectionKind::Data),
        other => Err(FormatError::BadTag(other)),
    }
}

pub fn reloc_kind_tag(kind: RelocKind) -> u8 {
    match kind {
        RelocKind::Absolute => 0,
        RelocKind::PcRelative => 1,
        RelocKind::GotRelative => 2,
    }
}

pub fn reloc_kind_from_tag(tag: u8) -> Result<RelocKind, FormatError> {
    match tag {
        0 => Ok(RelocKind::Absolute),
        1 => Ok(RelocKind::PcRelative),
        2 => Ok(RelocKind::GotRelative),
        other => Err(FormatError::BadTag(other)),
    }
}

/// Write a placed section (image layer).
pub fn write_placed_section(w: &mut ArtifactWriter, sec: &PlacedSection) {
    w.u8(section_kind_tag(sec.kind));
    w.u64(sec.base_offset);
    w.bytes(&sec.bytes);
}

/// Read a placed section (image layer).
pub fn read_placed_section(r: &mut ArtifactReader<'_>) -> Result<PlacedSection, FormatError> {
    let kind = section_kind_from_tag(r.u8()?)?;
    let base_offset = r.u64()?;
    let bytes = r.bytes()?;
    Ok(PlacedSection {
        kind,
        bytes,
        base_offset,
    })
}

/// Write an image-coordinate relocation.
pub fn write_image_reloc(w: &mut ArtifactWriter, reloc: &ImageReloc) {
    w.u32(reloc.section as u32);
    w.u64(reloc.offset);
    w.u8(reloc_kind_tag(reloc.kind));
    w.str(&reloc.symbol);
}

/// Read an image-coordinate relocation.
pub fn read_image_reloc(r: &mut ArtifactReader<'_>) -> Result<ImageReloc, FormatError> {
    let section = r.u32()? as usize;
    let offset = r.u64()?;
    let kind = reloc_kind_from_tag(r.u8()?)?;
    let symbol = r.str()?;
    Ok(ImageReloc {
        section,
        offset,
        symbol,
        kind,
    })
}

/// Write a string-keyed map sorted by key.
pub fn write_sorted_map<V, F>(w: &mut ArtifactWriter, map: &FxHashMap<String, V>, mut write_value: F)
where
    F: FnMut(&mut ArtifactWriter, &V),
{
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort_unstable();
    w.u32(keys.len() as u32);
    for key in keys {
        w.str(key);
        write_value(w, &map[key]);
    }
}

// ============================================================================
// Object codec
// ============================================================================

const SYM_UNDEFINED: u8 = 0;
const SYM_DEFINED: u8 = 1;

/// Serialize an object to `LDO1` bytes.
pub fn encode_object(obj: &Object) -> Vec<u8> {
    let mut w = ArtifactWriter::new(MAGIC_OBJECT);
    w.str(&obj.name);

    w.u32(obj.sections.len() as u32);
    for sec in &obj.sections {
        w.u8(section_kind_tag(sec.kind));
        w.bytes(&sec.bytes);
    }

    write_sorted_map(&mut w, &obj.symbols, |w, sym: &Symbol| {
        match sym.kind {
            SymbolKind::Undefined => w.u8(SYM_UNDEFINED),
            SymbolKind::Defined { section, offset } => {
                w.u8(SYM_DEFINED);
                w.u32(section as u32);
                w.u64(offset);
            }
        }
        w.u64(sym.size);
    });

    w.u32(obj.relocations.len() as u32);
    for reloc in &obj.relocations {
        w.u32(reloc.section as u32);
        w.u64(reloc.offset);
        w.u8(reloc_kind_tag(reloc.kind));
        w.str(&reloc.symbol);
    }

    w.finish()
}

/// Deserialize an object from `LDO1` bytes.
pub fn decode_object(data: &[u8]) -> Result<Object, FormatError> {
    let mut r = ArtifactReader::new(data, MAGIC_OBJECT)?;
    let name = r.str()?;

    let num_sections = r.u32()?;
    let mut sections = Vec::with_capacity(num_sections as usize);
    for _ in 0..num_sections {
        let kind = section_kind_from_tag(r.u8()?)?;
        let bytes = r.bytes()?;
        sections.push(Section { kind, bytes });
    }

    let num_symbols = r.u32()?;
    let mut symbols = FxHashMap::default();
    for _ in 0..num_symbols {
        let name = r.str()?;
        let kind = match r.u8()? {
            SYM_UNDEFINED => SymbolKind::Undefined,
            SYM_DEFINED => {
                let section = r.u32()? as usize;
                let offset = r.u64()?;
                SymbolKind::Defined { section, offset }
            }
            other => return Err(FormatError::BadTag(other)),
        };
        let size = r.u64()?;
        symbols.insert(name.clone(), Symbol { name, kind, size });
    }

    let num_relocs = r.u32()?;
    let mut relocations = Vec::with_capacity(num_relocs as usize);
    for _ in 0..num_relocs {
        let section = r.u32()? as usize;
        let offset = r.u64()?;
        let kind = reloc_kind_from_tag(r.u8()?)?;
        let symbol = r.str()?;
        relocations.push(Relocation {
            section,
            offset,
            symbol,
            kind,
        });
    }

    Ok(Object {
        name,
        sections,
        symbols,
        relocations,
    })
}
