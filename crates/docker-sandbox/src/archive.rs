//! Tar codec for the file-transfer format used by the runtime's archive
//! upload and download endpoints.

use std::io::{self, Read};

use types::{ArchiveError, StagedFile};

pub fn pack(files: &[StagedFile]) -> Result<Vec<u8>, ArchiveError> {
    let mut builder = tar::Builder::new(Vec::new());
    for file in files {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(file.data.len() as u64);
        header.set_mode(file.mode);
        header.set_uid(u64::from(file.uid));
        header.set_gid(u64::from(file.gid));
        header.set_mtime(0);
        builder
            .append_data(&mut header, &file.name, file.data.as_slice())
            .map_err(|source| ArchiveError::Encode {
                name: file.name.clone(),
                source,
            })?;
    }
    builder
        .into_inner()
        .map_err(|source| ArchiveError::Encode {
            name: "<end of archive>".to_owned(),
            source,
        })
}

/// Regular-file entries in archive order. Directories and links are skipped.
pub fn unpack(bytes: &[u8]) -> Result<Vec<StagedFile>, ArchiveError> {
    let mut archive = tar::Archive::new(bytes);
    let mut files = Vec::new();
    for entry in archive.entries().map_err(decode_error)? {
        let mut entry = entry.map_err(decode_error)?;
        let header = entry.header();
        if !header.entry_type().is_file() {
            continue;
        }
        let mode = header.mode().map_err(decode_error)?;
        let uid = owner_id(header.uid().map_err(decode_error)?);
        let gid = owner_id(header.gid().map_err(decode_error)?);
        let name = entry
            .path()
            .map_err(decode_error)?
            .to_string_lossy()
            .into_owned();

        let mut data = Vec::new();
        entry.read_to_end(&mut data).map_err(decode_error)?;
        files.push(StagedFile {
            name,
            mode,
            uid,
            gid,
            data,
        });
    }
    Ok(files)
}

fn owner_id(raw: u64) -> u32 {
    u32::try_from(raw).unwrap_or(u32::MAX)
}

fn decode_error(source: io::Error) -> ArchiveError {
    ArchiveError::Decode { source }
}
