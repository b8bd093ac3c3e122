//! Workspace layout.
//!
//! ```text
//! <workspace>/
//! ├── state.md                     # cross-iteration memory, owned by the agent
//! ├── output/                      # files the agent produces
//! ├── .ralph_tokens.json           # token window snapshot
//! ├── .ralph_last_iteration_time   # start time of the latest iteration
//! └── .ralph/runs/<run-id>.json    # run metrics
//! ```

mod state;

use std::io;
use std::path::{Path, PathBuf};

pub use state::{
    read_state, write_state, StateError, StateResult, WorkspaceState, STATUS_IN_PROGRESS,
};

pub const STATE_FILE: &str = "state.md";
pub const OUTPUT_DIR: &str = "output";
pub const TRACKER_FILE: &str = ".ralph_tokens.json";
pub const SPACING_MARKER_FILE: &str = ".ralph_last_iteration_time";

/// Paths inside one workspace directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    /// Default location of the token window snapshot.
    pub fn tracker_file(&self) -> PathBuf {
        self.root.join(TRACKER_FILE)
    }

    pub fn spacing_marker(&self) -> PathBuf {
        self.root.join(SPACING_MARKER_FILE)
    }

    /// Create the workspace and its output directory.
    pub fn ensure(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.output_dir())
    }

    /// Load `state.md`, creating it for `task` when absent or unreadable.
    ///
    /// Returns the state and whether it was freshly created.
    pub fn load_or_init(&self, task: &str) -> StateResult<(WorkspaceState, bool)> {
        if let Some(state) = read_state(&self.root) {
            return Ok((state, false));
        }
        let mut state = WorkspaceState::create_initial(task);
        write_state(&self.root, &mut state)?;
        Ok((state, true))
    }
}
