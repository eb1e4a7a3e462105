use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read};
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::FileOperationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveOutcome {
    Moved,
    /// The destination already holds this file from an earlier run.
    AlreadyPresent,
}

/// Filesystem primitives used by the pipeline. Implementations never
/// overwrite an existing destination on move.
pub trait FileOperations: Send + Sync {
    fn move_file(&self, src: &Path, dst: &Path) -> Result<MoveOutcome, FileOperationError>;
    fn copy_file(&self, src: &Path, dst: &Path, overwrite: bool) -> Result<(), FileOperationError>;
    /// Must succeed when the directory already exists.
    fn create_directory(&self, path: &Path) -> Result<(), FileOperationError>;
    fn read_file(&self, path: &Path) -> Result<String, FileOperationError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileOperations;

/// SHA-256 of a file's content, hex encoded.
fn file_digest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

impl LocalFileOperations {
    fn copy_exclusive(src: &Path, dst: &Path) -> Result<(), FileOperationError> {
        let mut reader = File::open(src).map_err(|e| FileOperationError::io("open", src, e))?;
        let out = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dst)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => FileOperationError::DestinationExists(dst.to_path_buf()),
                _ => FileOperationError::io("create", dst, e),
            })?;
        let mut writer = BufWriter::new(out);
        let copied = io::copy(&mut reader, &mut writer).and_then(|_| {
            writer.into_inner().map_err(|e| e.into_error())?.sync_all()
        });
        if let Err(e) = copied {
            let _ = fs::remove_file(dst);
            return Err(FileOperationError::io("copy", dst, e));
        }
        Ok(())
    }

    /// Both files exist: an earlier run already moved this file only when
    /// the destination holds the same bytes.
    fn settle_existing(src: &Path, dst: &Path) -> Result<MoveOutcome, FileOperationError> {
        let src_len = fs::metadata(src).map_err(|e| FileOperationError::io("stat", src, e))?.len();
        let dst_len = fs::metadata(dst).map_err(|e| FileOperationError::io("stat", dst, e))?.len();
        if src_len != dst_len {
            return Err(FileOperationError::DestinationExists(dst.to_path_buf()));
        }

        let src_hash = file_digest(src).map_err(|e| FileOperationError::io("hash", src, e))?;
        let dst_hash = file_digest(dst).map_err(|e| FileOperationError::io("hash", dst, e))?;
        if src_hash != dst_hash {
            tracing::debug!(dst = %dst.display(), %src_hash, %dst_hash, "destination differs from source");
            return Err(FileOperationError::DestinationExists(dst.to_path_buf()));
        }
        tracing::debug!(dst = %dst.display(), "destination holds the same content, move already applied");
        Ok(MoveOutcome::AlreadyPresent)
    }
}

impl FileOperations for LocalFileOperations {
    /// The destination is claimed with a hard link, which fails when it
    /// exists, so concurrent moves onto one target cannot replace each
    /// other. Filesystems without hard links, or a target on another
    /// device, fall back to an exclusive copy.
    fn move_file(&self, src: &Path, dst: &Path) -> Result<MoveOutcome, FileOperationError> {
        if fs::metadata(src).is_err() {
            if fs::metadata(dst).is_ok() {
                tracing::debug!(dst = %dst.display(), "source gone and destination present, move already applied");
                return Ok(MoveOutcome::AlreadyPresent);
            }
            return Err(FileOperationError::SourceMissing(src.to_path_buf()));
        }

        match fs::hard_link(src, dst) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Self::settle_existing(src, dst),
            Err(e) if e.kind() == io::ErrorKind::NotFound && fs::metadata(src).is_err() => {
                return Err(FileOperationError::SourceMissing(src.to_path_buf()));
            }
            Err(e) => {
                tracing::debug!(src = %src.display(), error = %e, "hard link failed, falling back to copy");
                match Self::copy_exclusive(src, dst) {
                    Ok(()) => {}
                    Err(FileOperationError::DestinationExists(_)) => return Self::settle_existing(src, dst),
                    Err(e) => return Err(e),
                }
            }
        }

        fs::remove_file(src).map_err(|e| FileOperationError::io("remove", src, e))?;
        Ok(MoveOutcome::Moved)
    }

    fn copy_file(&self, src: &Path, dst: &Path, overwrite: bool) -> Result<(), FileOperationError> {
        if overwrite {
            fs::copy(src, dst).map_err(|e| FileOperationError::io("copy", dst, e))?;
            return Ok(());
        }
        Self::copy_exclusive(src, dst)
    }

    fn create_directory(&self, path: &Path) -> Result<(), FileOperationError> {
        fs::create_dir_all(path).map_err(|e| FileOperationError::io("create_dir", path, e))
    }

    fn read_file(&self, path: &Path) -> Result<String, FileOperationError> {
        fs::read_to_string(path).map_err(|e| FileOperationError::io("read", path, e))
    }
}
