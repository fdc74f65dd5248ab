use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Result of clearing a previous run's artifacts.
#[derive(Debug)]
pub enum ClearOutcome {
    Cleared,
    /// Deletion failed (locked file, permissions); stale files may remain.
    ClearedWithWarning(io::Error),
}

/// Per-project scratch directory, exclusively owned by one run.
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    outcome: ClearOutcome,
}

impl Workspace {
    /// Wipe and recreate `<root>/<project_key>`.
    ///
    /// A failed deletion is logged and tolerated; only failing to create the
    /// directory is an error.
    pub fn prepare(root: &Path, project_key: &str) -> io::Result<Self> {
        let dir = root.join(project_key);
        let mut outcome = ClearOutcome::Cleared;

        if dir.exists() {
            match fs::remove_dir_all(&dir) {
                Ok(()) => info!("Cleared temp folder: {}", dir.display()),
                Err(e) => {
                    warn!(
                        "Could not clear temp folder {} (file locked?): {}",
                        dir.display(),
                        e
                    );
                    outcome = ClearOutcome::ClearedWithWarning(e);
                }
            }
        }
        fs::create_dir_all(&dir)?;
        info!("Workspace ready at {}", dir.display());

        Ok(Self { dir, outcome })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn outcome(&self) -> &ClearOutcome {
        &self.outcome
    }

    pub fn slide_image(&self, index: usize) -> PathBuf {
        self.dir.join(format!("slide_{:03}.png", index))
    }

    pub fn slide_audio(&self, index: usize) -> PathBuf {
        self.dir.join(format!("audio_{:03}.wav", index))
    }

    pub fn silence_audio(&self, index: usize) -> PathBuf {
        self.dir.join(format!("silence_{:03}.wav", index))
    }

    pub fn video_list(&self) -> PathBuf {
        self.dir.join("__video_concat.txt")
    }

    pub fn audio_list(&self) -> PathBuf {
        self.dir.join("__audio_concat.txt")
    }

    pub fn subtitles(&self) -> PathBuf {
        self.dir.join("subtitles.ass")
    }
}
