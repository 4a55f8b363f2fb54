//! Mapping request targets onto files under the document root.

use std::ffi::OsString;
use std::fs::{self, File, Metadata};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::http::FILENAME_LEN;
use crate::http::parser::HttpCode;

/// Read permission for "others" in a Unix mode.
const WORLD_READABLE: u32 = 0o004;

/// Builds the filesystem path for a request target.
///
/// The path is the document root followed by the target. Targets that
/// try to climb out of the root with `..` are refused with
/// [`HttpCode::ForbiddenRequest`], and a result that would not fit in
/// [`FILENAME_LEN`] bytes is a [`HttpCode::BadRequest`].
pub fn resolve(doc_root: &Path, url: &str) -> Result<PathBuf, HttpCode> {
    if url.split('/').any(|segment| segment == "..") {
        return Err(HttpCode::ForbiddenRequest);
    }

    let mut real = OsString::from(doc_root.as_os_str());
    real.push(url);

    if real.len() >= FILENAME_LEN {
        return Err(HttpCode::BadRequest);
    }

    Ok(PathBuf::from(real))
}

/// A file opened for serving, mapped read-only into memory.
///
/// The mapping lives exactly as long as this value; dropping it unmaps
/// the file. Empty files are not mapped at all.
#[derive(Debug)]
pub struct MappedFile {
    map: Option<Mmap>,
    metadata: Metadata,
}

impl MappedFile {
    /// Checks the file at `path` and maps it.
    ///
    /// - missing path: [`HttpCode::NoResource`]
    /// - not world-readable, a directory, or not a regular file:
    ///   [`HttpCode::ForbiddenRequest`]
    /// - mapping failure: [`HttpCode::InternalError`]
    pub fn open(path: &Path) -> Result<Self, HttpCode> {
        let metadata = fs::metadata(path).map_err(|e| {
            tracing::debug!(path = %path.display(), error = %e, "stat failed");
            HttpCode::NoResource
        })?;

        if metadata.permissions().mode() & WORLD_READABLE == 0 {
            return Err(HttpCode::ForbiddenRequest);
        }
        if !metadata.is_file() {
            return Err(HttpCode::ForbiddenRequest);
        }

        let file = File::open(path).map_err(|e| {
            tracing::debug!(path = %path.display(), error = %e, "open failed");
            HttpCode::ForbiddenRequest
        })?;

        let map = if metadata.len() == 0 {
            None
        } else {
            // The file is only read through this mapping. Truncation by
            // another process while it is being sent is not guarded against.
            let map = unsafe { Mmap::map(&file) }.map_err(|e| {
                tracing::warn!(path = %path.display(), error = %e, "mmap failed");
                HttpCode::InternalError
            })?;
            Some(map)
        };

        Ok(Self { map, metadata })
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}
