use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile, TempPath};

/// A local temporary file owned by one job attempt.
///
/// The file is removed by [`ScratchFile::release`] or, failing that, when the
/// guard is dropped, so every exit path out of a job leaves nothing behind.
#[derive(Debug)]
pub struct ScratchFile {
    path: TempPath,
}

impl ScratchFile {
    /// Create a uniquely named file `<prefix>XXXXXX<suffix>` in `dir` holding `data`.
    pub fn write(dir: &Path, prefix: &str, suffix: &str, data: &[u8]) -> std::io::Result<Self> {
        let mut file: NamedTempFile = Builder::new().prefix(prefix).suffix(suffix).tempfile_in(dir)?;
        file.write_all(data)?;
        file.flush()?;
        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now, logging instead of failing if removal goes wrong.
    pub fn release(self) {
        let path: PathBuf = self.path.to_path_buf();
        match self.path.close() {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed scratch file"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove scratch file"),
        }
    }
}

impl AsRef<Path> for ScratchFile {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}
