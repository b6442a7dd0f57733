//! Memory-mapped symbol file output with atomic commit.
//!
//! [`Output`] writes into a sibling temporary file (`<target>.tmp`) through a writable
//! memory mapping. Only [`Output::finalize`] flushes the mapping and renames the temporary
//! file over the target, so a failed or abandoned write never leaves a truncated symbol
//! file behind: dropping an unfinalized [`Output`] removes the temporary file and leaves
//! any previous target untouched.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotpdb::file::Output;
//!
//! let mut output = Output::create("app.pdb", 4)?;
//! output.write_at(0, b"BSJB")?;
//! output.finalize()?;
//! # Ok::<(), dotpdb::Error>(())
//! ```

use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};

use crate::{Error, Result};

/// A fixed-size, memory-mapped output file committed by rename.
pub struct Output {
    mmap: MmapMut,
    temp_path: PathBuf,
    target_path: PathBuf,
    finalized: bool,
}

impl Output {
    /// Creates the temporary file next to `target_path` and maps `size` bytes of it.
    ///
    /// # Errors
    /// Returns [`crate::Error::WriteFailed`] if the file cannot be created, sized or mapped,
    /// or if `size` is zero.
    pub fn create<P: AsRef<Path>>(target_path: P, size: u64) -> Result<Self> {
        let target_path = target_path.as_ref().to_path_buf();
        if size == 0 {
            return Err(Error::WriteFailed {
                message: format!("Refusing to map an empty file for {}", target_path.display()),
            });
        }

        let mut temp_name = target_path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(".tmp");
        let temp_path = target_path.with_file_name(temp_name);

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| Error::WriteFailed {
                message: format!("Failed to create {}: {e}", temp_path.display()),
            })?;

        let prepared = file
            .set_len(size)
            .map_err(|e| Error::WriteFailed {
                message: format!("Failed to set file size: {e}"),
            })
            .and_then(|()| {
                // SAFETY: the temporary file was just created by us and is not shared.
                unsafe { MmapOptions::new().map_mut(&file) }.map_err(|e| Error::WriteFailed {
                    message: format!("Failed to create memory mapping: {e}"),
                })
            });

        match prepared {
            Ok(mmap) => Ok(Self {
                mmap,
                temp_path,
                target_path,
                finalized: false,
            }),
            Err(error) => {
                let _ = std::fs::remove_file(&temp_path);
                Err(error)
            }
        }
    }

    /// Copies `data` to `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::WriteFailed`] if the write would exceed the file size.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let start = usize::try_from(offset).map_err(|_| Error::WriteFailed {
            message: format!("Offset {offset} is not addressable"),
        })?;
        let end = start.checked_add(data.len()).unwrap_or(usize::MAX);

        if end > self.mmap.len() {
            return Err(Error::WriteFailed {
                message: format!(
                    "Write would exceed file size: offset={}, len={}, file_size={}",
                    offset,
                    data.len(),
                    self.mmap.len()
                ),
            });
        }

        self.mmap[start..end].copy_from_slice(data);
        Ok(())
    }

    /// Size of the mapped file.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Final location of the file once committed.
    #[must_use]
    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    /// Flushes the mapping and atomically moves the file to its target path.
    ///
    /// # Errors
    /// Returns [`crate::Error::WriteFailed`] if flushing or renaming fails; the temporary
    /// file is removed in that case.
    pub fn finalize(mut self) -> Result<()> {
        self.mmap.flush().map_err(|e| Error::WriteFailed {
            message: format!("Failed to flush memory mapping: {e}"),
        })?;

        std::fs::rename(&self.temp_path, &self.target_path).map_err(|e| Error::WriteFailed {
            message: format!("Failed to move symbol file into place: {e}"),
        })?;

        self.finalized = true;
        log::debug!(
            "Wrote {} bytes to {}",
            self.mmap.len(),
            self.target_path.display()
        );
        Ok(())
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        if !self.finalized {
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn finalize_moves_file_into_place() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("app.pdb");

        let mut output = Output::create(&target, 8).unwrap();
        output.write_at(0, b"BSJB").unwrap();
        output.write_at(4, &[1, 2, 3, 4]).unwrap();
        assert!(!target.exists());
        output.finalize().unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"BSJB\x01\x02\x03\x04");
        assert!(!dir.path().join("app.pdb.tmp").exists());
    }

    #[test]
    fn drop_without_finalize_leaves_no_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("app.pdb");

        {
            let mut output = Output::create(&target, 4).unwrap();
            output.write_at(0, b"half").unwrap();
        }

        assert!(!target.exists());
        assert!(!dir.path().join("app.pdb.tmp").exists());
    }

    #[test]
    fn drop_keeps_previous_target() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("app.pdb");
        std::fs::write(&target, b"old").unwrap();

        drop(Output::create(&target, 4).unwrap());

        assert_eq!(std::fs::read(&target).unwrap(), b"old");
    }

    #[test]
    fn bounds_checking() {
        let dir = tempdir().unwrap();
        let mut output = Output::create(dir.path().join("x.pdb"), 10).unwrap();
        assert_eq!(output.size(), 10);
        assert!(output.write_at(8, b"too long").is_err());
        assert!(output.write_at(u64::MAX, b"x").is_err());
    }

    #[test]
    fn empty_file_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Output::create(dir.path().join("x.pdb"), 0),
            Err(Error::WriteFailed { .. })
        ));
    }
}
