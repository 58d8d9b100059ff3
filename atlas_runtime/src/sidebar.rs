//! Sidebar collapse state persisted between sessions.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::SidebarSection;

#[derive(Debug, Error)]
pub enum SidebarStateError {
    #[error("failed to read sidebar state from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write sidebar state to {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse sidebar state: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SidebarState {
    collapsed_sections: BTreeSet<SidebarSection>,
}

impl SidebarState {
    /// Load the persisted state. A missing file is an empty state.
    pub fn load(path: &Path) -> Result<Self, SidebarStateError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(SidebarStateError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let collapsed_sections: BTreeSet<SidebarSection> = serde_json::from_str(&contents)?;
        Ok(Self { collapsed_sections })
    }

    pub fn save(&self, path: &Path) -> Result<(), SidebarStateError> {
        let contents = serde_json::to_string(&self.collapsed_sections)?;
        fs::write(path, contents).map_err(|source| SidebarStateError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn is_collapsed(&self, section: SidebarSection) -> bool {
        self.collapsed_sections.contains(&section)
    }

    pub fn toggle(&mut self, section: SidebarSection) {
        if !self.collapsed_sections.remove(&section) {
            self.collapsed_sections.insert(section);
        }
    }

    pub fn set_collapsed(&mut self, section: SidebarSection, collapsed: bool) {
        if collapsed {
            self.collapsed_sections.insert(section);
        } else {
            self.collapsed_sections.remove(&section);
        }
    }
}
