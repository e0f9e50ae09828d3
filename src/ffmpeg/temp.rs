//! Two-pass statistics files. FFmpeg writes them under a prefix derived from the
//! input's base name; every file under that prefix is removed once the encode ends.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Suffixes libx264 and libx265 append to the stats prefix, including in-progress `.temp` files.
const PASS_LOG_SUFFIXES: &[&str] = &[
    "-0.log",
    "-0.log.temp",
    "-0.log.mbtree",
    "-0.log.mbtree.temp",
    "-0.log.cutree",
    "-0.log.cutree.temp",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassLogFiles {
    prefix: PathBuf,
}

impl PassLogFiles {
    pub fn for_input(dir: &Path, base_name: &str) -> Self {
        Self {
            prefix: dir.join(format!("ffmpeg2pass_{}", base_name)),
        }
    }

    /// Value for `-passlogfile`.
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Stats file the x265 encoder reads and writes (x264 derives the same name itself).
    pub fn stats_file(&self) -> PathBuf {
        self.with_suffix(PASS_LOG_SUFFIXES[0])
    }

    pub fn artifacts(&self) -> Vec<PathBuf> {
        PASS_LOG_SUFFIXES
            .iter()
            .map(|suffix| self.with_suffix(suffix))
            .collect()
    }

    pub fn existing(&self) -> Vec<PathBuf> {
        self.artifacts().into_iter().filter(|p| p.exists()).collect()
    }

    /// Remove every artifact. Failures are logged, never returned.
    pub fn cleanup(&self) {
        for path in self.artifacts() {
            match fs::remove_file(&path) {
                Ok(()) => log::debug!(
                    target: "fitvid::ffmpeg::temp",
                    "Removed pass log {}",
                    path.display()
                ),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => log::warn!(
                    target: "fitvid::ffmpeg::temp",
                    "Failed to remove pass log {}: {}",
                    path.display(),
                    e
                ),
            }
        }
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut s = self.prefix.clone().into_os_string();
        s.push(suffix);
        PathBuf::from(s)
    }
}

/// Removes the pass logs when dropped, so every exit path of an encode cleans up.
pub struct PassLogGuard {
    files: PassLogFiles,
}

impl PassLogGuard {
    /// Clears leftovers from an earlier crashed run before handing out the guard.
    pub fn acquire(files: PassLogFiles) -> Self {
        files.cleanup();
        Self { files }
    }

    pub fn files(&self) -> &PassLogFiles {
        &self.files
    }
}

impl Drop for PassLogGuard {
    fn drop(&mut self) {
        self.files.cleanup();
    }
}

/// Best-effort removal of a partially written output.
pub fn remove_partial_output(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != io::ErrorKind::NotFound
    {
        log::warn!(
            target: "fitvid::ffmpeg::temp",
            "Failed to remove partial output {}: {}",
            path.display(),
            e
        );
    }
}
