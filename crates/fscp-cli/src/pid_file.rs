//! PID file handling.
//!
//! Exclusive creation so two daemons cannot share one PID file; removed on
//! drop during clean shutdown.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// An exclusively created PID file, unlinked on drop
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Create the PID file, failing if it already exists.
    pub fn create(path: PathBuf) -> Result<Self> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("cannot create PID file {}", path.display()))?;

        writeln!(file, "{}", std::process::id())
            .with_context(|| format!("cannot write PID file {}", path.display()))?;

        tracing::debug!(path = %path.display(), "PID file created");
        Ok(Self { path })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %err, "cannot remove PID file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_write_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fscpd.pid");

        {
            let _pid = PidFile::create(path.clone()).unwrap();
            let content = std::fs::read_to_string(&path).unwrap();
            assert_eq!(content.trim().parse::<u32>().unwrap(), std::process::id());
        }

        // Dropped: file is gone.
        assert!(!path.exists());
    }

    #[test]
    fn test_exclusive_creation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fscpd.pid");

        let _first = PidFile::create(path.clone()).unwrap();
        assert!(PidFile::create(path).is_err());
    }
}
