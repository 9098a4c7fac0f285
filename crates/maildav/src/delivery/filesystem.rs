use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::sanitize::{redact_path, sanitize_directory, sanitize_filename, split_extension};

use super::{DeliveryError, Result};

/// Highest numbered variant tried before giving up on a filename.
const MAX_NAME_VARIANTS: usize = 1000;

/// Writes attachments below a root directory.
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stores `content` as `<root>/<directory>/<filename>`.
    ///
    /// Never overwrites: an existing name gets a numbered variant
    /// (`invoice_2.pdf`, `invoice_3.pdf`, ...).
    pub fn store(&self, directory: &str, filename: &str, content: &[u8]) -> Result<PathBuf> {
        let dir_path = self.root.join(sanitize_directory(directory));
        ensure_directory(&dir_path)?;

        let filename = sanitize_filename(filename);
        let path = create_exclusive(&dir_path, &filename, content)?;

        debug!("Wrote {} bytes to {}", content.len(), redact_path(&path));
        Ok(path)
    }
}

fn ensure_directory(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| DeliveryError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// Creates the first free name among `filename` and its numbered variants.
///
/// `create_new` makes check-and-create a single step, so concurrent writers
/// never clobber each other.
fn create_exclusive(dir_path: &Path, filename: &str, content: &[u8]) -> Result<PathBuf> {
    let (base, ext) = split_extension(filename);

    for counter in 1..=MAX_NAME_VARIANTS {
        let candidate = if counter == 1 {
            filename.to_string()
        } else {
            format!("{}_{}{}", base, counter, ext)
        };
        let path = dir_path.join(&candidate);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                file.write_all(content)
                    .map_err(|e| DeliveryError::WriteFile {
                        path: path.clone(),
                        source: e,
                    })?;
                return Ok(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(DeliveryError::WriteFile { path, source: e }),
        }
    }

    Err(DeliveryError::FileExists(dir_path.join(filename)))
}
