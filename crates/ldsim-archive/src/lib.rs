//! Static archive container.
//!
//! An archive groups relocatable objects by member name without resolving
//! any symbol; an archive whose members are wholly undefined is valid.

mod format;

pub use format::*;

use ldsim_object::Object;
use thiserror::Error;

/// Archiving errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ArchiveError {
    #[error("duplicate member name '{0}' in one archive call")]
    DuplicateMemberName(String),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

/// One named member of an archive.
#[derive(Clone, Debug, PartialEq)]
pub struct ArchiveMember {
    pub name: String,
    pub object: Object,
}

/// An ordered collection of named objects.
#[derive(Clone, Debug, PartialEq)]
pub struct Archive {
    pub name: String,
    pub members: Vec<ArchiveMember>,
}

impl Archive {
    /// Create an empty archive.
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: Vec::new(),
        }
    }

    /// Look up a member by name.
    pub fn member(&self, name: &str) -> Option<&ArchiveMember> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Member names in first-appearance order.
    pub fn member_names(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.name.as_str()).collect()
    }
}

/// Add objects to an archive, replacing members whose name already exists.
///
/// For each `(object, name)` pair: an existing member of that name is
/// replaced in place (keeping its position), otherwise the member is
/// appended. First-appearance order is preserved, so archive listings are
/// deterministic. Symbols are never inspected. The only error is a name
/// appearing twice within the same call, which would make the replacement
/// target ambiguous.
pub fn archive(
    existing: Option<Archive>,
    name: &str,
    objects: Vec<Object>,
    names: Vec<String>,
) -> Result<Archive> {
    debug_assert_eq!(objects.len(), names.len());

    for (i, member_name) in names.iter().enumerate() {
        if names[..i].contains(member_name) {
            return Err(ArchiveError::DuplicateMemberName(member_name.clone()));
        }
    }

    let mut out = existing.unwrap_or_else(|| Archive::empty(name));
    out.name = name.to_string();

    for (object, member_name) in objects.into_iter().zip(names) {
        match out.members.iter_mut().find(|m| m.name == member_name) {
            Some(member) => member.object = object,
            None => out.members.push(ArchiveMember {
                name: member_name,
                object,
            }),
        }
    }

    Ok(out)
}
