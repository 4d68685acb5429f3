//! Still capture through an external command.
//!
//! On Raspberry Pi OS the default is `rpicam-still -n -o <path>`. Any program
//! that accepts an output path as its last argument works.

use std::path::{Path, PathBuf};
use std::process::Command;

use super::Camera;
use crate::error::{PetCareError, Result};

pub const DEFAULT_CAPTURE_PROGRAM: &str = "rpicam-still";
pub const DEFAULT_SNAPSHOT_DIR: &str = "snapshots";

pub struct CommandCamera {
    program: String,
    args: Vec<String>,
    snapshot_dir: PathBuf,
}

impl CommandCamera {
    pub fn new<P: AsRef<Path>>(program: &str, snapshot_dir: P) -> Self {
        Self {
            program: program.to_string(),
            args: vec!["-n".to_string(), "-o".to_string()],
            snapshot_dir: snapshot_dir.as_ref().to_path_buf(),
        }
    }

    /// Replace the arguments placed before the output path.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn snapshot_path(&self, label: &str) -> PathBuf {
        self.snapshot_dir.join(format!("{}.jpg", sanitize_label(label)))
    }
}

impl Default for CommandCamera {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTURE_PROGRAM, DEFAULT_SNAPSHOT_DIR)
    }
}

impl Camera for CommandCamera {
    fn capture(&mut self, label: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.snapshot_dir)?;
        let path = self.snapshot_path(label);
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(&path)
            .status()
            .map_err(|e| {
                PetCareError::ImageDecode(format!("failed to run {}: {}", self.program, e))
            })?;
        if !status.success() {
            return Err(PetCareError::ImageDecode(format!(
                "{} exited with {}",
                self.program, status
            )));
        }
        log::info!("image captured: {}", path.display());
        Ok(path)
    }
}

fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
