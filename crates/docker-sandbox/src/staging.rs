use std::path::Path;

use tracing::debug;
use types::{
    PROGRAM_FILE_MODE, RunOptions, SandboxConfig, StagedFile, StagingError, sandbox_basename,
};

use crate::{archive, runtime::RuntimeClient};

pub async fn read_program(path: &Path) -> Result<Vec<u8>, StagingError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| StagingError::ReadProgram {
            path: path.to_path_buf(),
            source,
        })
}

/// Caller input files followed by the program, all owned by the sandbox user.
pub fn stage_files(
    options: &RunOptions,
    program: Vec<u8>,
    config: &SandboxConfig,
) -> Result<Vec<StagedFile>, StagingError> {
    let mut files = Vec::with_capacity(options.input_files.len() + 1);
    for input in &options.input_files {
        files.push(StagedFile {
            name: basename(&input.name)?.to_owned(),
            mode: input.mode,
            uid: config.sandbox_uid,
            gid: config.sandbox_gid,
            data: input.data.clone(),
        });
    }

    let program_name = options.program.to_string_lossy();
    files.push(StagedFile {
        name: basename(&program_name)?.to_owned(),
        mode: PROGRAM_FILE_MODE,
        uid: config.sandbox_uid,
        gid: config.sandbox_gid,
        data: program,
    });
    Ok(files)
}

/// Packs `files` and extracts them under `dest` inside the container.
pub async fn inject(
    runtime: &dyn RuntimeClient,
    container_id: &str,
    files: &[StagedFile],
    dest: &str,
) -> Result<(), StagingError> {
    let archive = archive::pack(files)?;
    debug!(
        container_id,
        dest,
        files = files.len(),
        archive_bytes = archive.len(),
        "uploading staged files"
    );
    runtime
        .put_archive(container_id, dest, archive)
        .await
        .map_err(|source| StagingError::Upload {
            container_id: container_id.to_owned(),
            path: dest.to_owned(),
            source,
        })
}

fn basename(name: &str) -> Result<&str, StagingError> {
    sandbox_basename(name).ok_or_else(|| StagingError::InvalidFileName {
        name: name.to_owned(),
    })
}
