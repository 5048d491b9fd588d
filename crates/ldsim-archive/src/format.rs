//! `LDA1` archive codec. Members are nested `LDO1` blobs.

use ldsim_object::{
    decode_object, encode_object, ArtifactReader, ArtifactWriter, FormatError,
};

use crate::{Archive, ArchiveMember};

/// Magic for serialized [`Archive`] artifacts.
pub const MAGIC_ARCHIVE: [u8; 4] = *b"LDA1";

/// Serialize an archive to `LDA1` bytes.
pub fn encode_archive(archive: &Archive) -> Vec<u8> {
    let mut w = ArtifactWriter::new(MAGIC_ARCHIVE);
    w.str(&archive.name);
    w.u32(archive.members.len() as u32);
    for member in &archive.members {
        w.str(&member.name);
        w.bytes(&encode_object(&member.object));
    }
    w.finish()
}

/// Deserialize an archive from `LDA1` bytes.
pub fn decode_archive(data: &[u8]) -> Result<Archive, FormatError> {
    let mut r = ArtifactReader::new(data, MAGIC_ARCHIVE)?;
    let name = r.str()?;
    let num_members = r.u32()?;
    let mut members = Vec::with_capacity(num_members as usize);
    for _ in 0..num_members {
        let member_name = r.str()?;
        let blob = r.bytes()?;
        members.push(ArchiveMember {
            name: member_name,
            object: decode_object(&blob)?,
        });
    }
    Ok(Archive { name, members })
}
