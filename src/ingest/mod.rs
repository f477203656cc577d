pub mod hasher;

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result, ValidationErrors};

/// Ceiling for uploads that have no size rule of their own, such as avatars.
pub const MAX_READ_BYTES: usize = 64 * 1024 * 1024;

/// A binary selected for upload, before it reaches object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub file_name: String,
    pub declared_mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(file_name: &str, declared_mime: Option<&str>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.to_string(),
            declared_mime: declared_mime.map(str::to_string),
            bytes,
        }
    }

    /// Reads at most `max_bytes` from `path`. Anything longer is reported
    /// against `field` without being read in full; the length is checked
    /// up front for regular files and enforced while reading for streams.
    pub fn read(path: &Path, field: &str, max_bytes: usize) -> Result<Self> {
        let too_large = || {
            Error::Validation(ValidationErrors::single(
                field,
                format!("Image must be {} MB or smaller", max_bytes / (1024 * 1024)),
            ))
        };
        if fs::metadata(path)?.len() > max_bytes as u64 {
            return Err(too_large());
        }

        let mut bytes = Vec::new();
        File::open(path)?
            .take(max_bytes as u64 + 1)
            .read_to_end(&mut bytes)?;
        if bytes.len() > max_bytes {
            return Err(too_large());
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        Ok(Self {
            file_name,
            declared_mime: None,
            bytes,
        })
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}
