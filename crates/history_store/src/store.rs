use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::HistoryStoreError;
use crate::normalize::normalize_history;
use crate::paths::staging_path;
use crate::schema::HistoryState;

/// JSON file holding the whole conversation history.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    state: HistoryState,
}

impl HistoryStore {
    /// Loads history from `path`, normalizing legacy records.
    ///
    /// A missing file yields empty history; it is created on the first save.
    pub fn open(path: &Path) -> Result<Self, HistoryStoreError> {
        let path = path.to_path_buf();
        let mut state = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => HistoryState::default(),
            Ok(text) => serde_json::from_str::<HistoryState>(&text)
                .map_err(|source| HistoryStoreError::json_parse(&path, source))?,
            Err(error) if error.kind() == ErrorKind::NotFound => HistoryState::default(),
            Err(source) => {
                return Err(HistoryStoreError::io("reading history file", &path, source))
            }
        };
        normalize_history(&mut state);

        Ok(Self { path, state })
    }

    /// Store that has never touched disk, for hosts running without persistence.
    #[must_use]
    pub fn in_memory(path: impl Into<PathBuf>, state: HistoryState) -> Self {
        Self {
            path: path.into(),
            state,
        }
    }

    /// Writes the full history through a sibling staging file and an atomic rename.
    pub fn save(&self) -> Result<(), HistoryStoreError> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| HistoryStoreError::NoParentDirectory {
                path: self.path.clone(),
            })?;
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| {
                HistoryStoreError::io("creating history directory", parent, source)
            })?;
        }

        let text = serde_json::to_string_pretty(&self.state)
            .map_err(|source| HistoryStoreError::json_serialize(&self.path, source))?;
        let staging = staging_path(&self.path);
        fs::write(&staging, text)
            .map_err(|source| HistoryStoreError::io("writing staged history", &staging, source))?;
        fs::rename(&staging, &self.path)
            .map_err(|source| HistoryStoreError::io("replacing history file", &self.path, source))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn state(&self) -> &HistoryState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut HistoryState {
        &mut self.state
    }

    pub fn replace_state(&mut self, state: HistoryState) {
        self.state = state;
    }

    #[must_use]
    pub fn into_state(self) -> HistoryState {
        self.state
    }
}
