use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::error::{ParseError, ParseOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Declared sizes are untrusted; buffers grow past this as bytes arrive.
const INITIAL_MEMBER_CAPACITY: u64 = 1 << 20;

fn archive_error(err: impl std::fmt::Display) -> ParseError {
    ParseError::Archive {
        detail: err.to_string(),
    }
}

fn is_ignored(name: &str) -> bool {
    let base = name.rsplit('/').next().unwrap_or(name);
    name.starts_with("__MACOSX/") || base.starts_with('.') || base.is_empty()
}

/// Extracts every regular member, sorted by name. Members larger than
/// `max_member_bytes` (declared or actual) are refused.
pub fn read_members(bytes: &[u8], max_member_bytes: u64) -> ParseOutcome<Vec<ArchiveMember>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(archive_error)?;
    let mut members = Vec::new();
    for idx in 0..archive.len() {
        let file = archive.by_index(idx).map_err(archive_error)?;
        if file.is_dir() || is_ignored(file.name()) {
            continue;
        }
        let name = file.name().to_string();
        if file.size() > max_member_bytes {
            return Err(ParseError::Archive {
                detail: format!(
                    "member '{name}' declares {} bytes, above the {max_member_bytes} byte limit",
                    file.size()
                ),
            });
        }
        let mut buffer = Vec::with_capacity(file.size().min(INITIAL_MEMBER_CAPACITY) as usize);
        file.take(max_member_bytes + 1)
            .read_to_end(&mut buffer)
            .map_err(|err| archive_error(format!("reading member '{name}': {err}")))?;
        if buffer.len() as u64 > max_member_bytes {
            return Err(ParseError::Archive {
                detail: format!("member '{name}' inflates past {max_member_bytes} bytes"),
            });
        }
        members.push(ArchiveMember {
            name,
            bytes: buffer,
        });
    }
    members.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(members)
}
