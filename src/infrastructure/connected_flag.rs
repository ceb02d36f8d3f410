use crate::domain::models::IdeKind;
use crate::infrastructure::error::InfraError;
use chrono::Utc;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const FLAG_FILE_NAME: &str = "ide-connected.flag";
const DISCONNECTED_MARKER: &str = "disconnected";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagState {
    /// No agent on this host has connected yet.
    Absent,
    Connected,
    /// The user disconnected explicitly; only an explicit connect lifts it.
    DisconnectedByUser,
}

/// On-disk marker of whether this host considers the agent connected. Shared by every agent
/// process on the host and outlives any one of them.
///
/// The first line is either an IDE name (connected) or `disconnected`; the second line is the
/// RFC 3339 time it was written.
#[derive(Debug, Clone)]
pub struct ConnectedFlag {
    path: PathBuf,
}

impl ConnectedFlag {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            path: state_dir.as_ref().join(FLAG_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> Result<FlagState, InfraError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(FlagState::Absent),
            Err(error) => return Err(error.into()),
        };
        let first_line = contents.lines().next().unwrap_or_default().trim();
        if first_line == DISCONNECTED_MARKER {
            Ok(FlagState::DisconnectedByUser)
        } else {
            Ok(FlagState::Connected)
        }
    }

    /// Heartbeats are only sent while this holds.
    pub fn is_set(&self) -> bool {
        matches!(self.state(), Ok(FlagState::Connected))
    }

    pub fn set(&self, ide: IdeKind) -> Result<(), InfraError> {
        self.write(ide.as_str())
    }

    pub fn mark_disconnected(&self) -> Result<(), InfraError> {
        self.write(DISCONNECTED_MARKER)
    }

    fn write(&self, first_line: &str) -> Result<(), InfraError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(
            &self.path,
            format!("{first_line}\n{}\n", Utc::now().to_rfc3339()),
        )?;
        Ok(())
    }
}
