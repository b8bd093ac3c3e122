//! The `state.md` file: the agent's only memory between iterations.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use thiserror::Error;
use tracing::warn;

use super::STATE_FILE;

/// Status written into a fresh state file.
pub const STATUS_IN_PROGRESS: &str = "in_progress";

const FIRST_ITERATION_NOTE: &str =
    "This is the first iteration. Start by understanding the task and creating a plan.";

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^## (.+?)[ \t]*$").expect("header regex should compile"));
static LEADING_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)").expect("number regex should compile"));
static LEADING_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\w+)").expect("word regex should compile"));
static CHECKED_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^- \[x\] (.+?)[ \t]*$").expect("item regex should compile"));
static FILE_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^- (/\S+)").expect("file regex should compile"));

/// Errors reading or writing `state.md`.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("could not parse task from state.md")]
    MissingTask,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StateResult<T> = Result<T, StateError>;

/// Parsed contents of `state.md`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceState {
    pub iteration: u64,
    pub task: String,
    pub status: String,
    pub completed_items: Vec<String>,
    pub files_created: Vec<String>,
    pub notes: String,
    pub last_updated: DateTime<Utc>,
}

impl WorkspaceState {
    /// State for a task that has not started yet.
    pub fn create_initial(task: impl Into<String>) -> Self {
        Self {
            iteration: 1,
            task: task.into(),
            status: STATUS_IN_PROGRESS.to_string(),
            completed_items: Vec::new(),
            files_created: Vec::new(),
            notes: FIRST_ITERATION_NOTE.to_string(),
            last_updated: Utc::now(),
        }
    }

    pub fn to_markdown(&self) -> String {
        let completed = if self.completed_items.is_empty() {
            "- [ ] No items completed yet".to_string()
        } else {
            self.completed_items
                .iter()
                .map(|item| format!("- [x] {item}"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let files = if self.files_created.is_empty() {
            "- No files created yet".to_string()
        } else {
            self.files_created
                .iter()
                .map(|file| format!("- {file}"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            "# Ralph State

## Task
{task}

## Iteration
{iteration}

## Status
{status}

## Completed Work
{completed}

## Files Created
{files}

## Notes for Next Iteration
{notes}

## Last Updated
{updated}
",
            task = self.task,
            iteration = self.iteration,
            status = self.status,
            notes = self.notes,
            updated = self.last_updated.to_rfc3339_opts(SecondsFormat::Micros, false),
        )
    }

    /// Parse `state.md` content.
    ///
    /// Only the task is required. The agent edits this file freely, so every
    /// other section falls back to a default when missing or malformed.
    pub fn from_markdown(content: &str) -> StateResult<Self> {
        let sections = split_sections(content);
        let section = |name: &str| {
            sections
                .iter()
                .find(|(header, _)| *header == name)
                .map(|(_, body)| *body)
        };

        let task = section("Task").map(str::trim).unwrap_or_default();
        if task.is_empty() {
            return Err(StateError::MissingTask);
        }

        let iteration = section("Iteration")
            .and_then(|body| LEADING_NUMBER_RE.captures(body))
            .and_then(|caps| caps[1].parse().ok())
            .unwrap_or(1);

        let status = section("Status")
            .and_then(|body| LEADING_WORD_RE.captures(body))
            .map(|caps| caps[1].to_string())
            .unwrap_or_else(|| STATUS_IN_PROGRESS.to_string());

        let completed_items = section("Completed Work")
            .map(|body| {
                CHECKED_ITEM_RE
                    .captures_iter(body)
                    .map(|caps| caps[1].to_string())
                    .collect()
            })
            .unwrap_or_default();

        let files_created = section("Files Created")
            .map(|body| {
                FILE_ITEM_RE
                    .captures_iter(body)
                    .map(|caps| caps[1].to_string())
                    .collect()
            })
            .unwrap_or_default();

        let notes = section("Notes for Next Iteration")
            .map(|body| body.trim().to_string())
            .unwrap_or_default();

        let last_updated = section("Last Updated")
            .and_then(|body| DateTime::parse_from_rfc3339(body.trim()).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(Self {
            iteration,
            task: task.to_string(),
            status,
            completed_items,
            files_created,
            notes,
            last_updated,
        })
    }
}

/// `(header, body)` pairs for every `## ` section, in document order.
fn split_sections(content: &str) -> Vec<(&str, &str)> {
    let headers: Vec<_> = HEADER_RE.captures_iter(content).collect();
    headers
        .iter()
        .enumerate()
        .filter_map(|(idx, caps)| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str();
            let end = headers
                .get(idx + 1)
                .and_then(|next| next.get(0))
                .map_or(content.len(), |next| next.start());
            Some((name, &content[whole.end()..end]))
        })
        .collect()
}

/// Read `state.md` from `workspace_dir`.
///
/// A missing file is `None`. An unreadable or unparseable one is also `None`
/// after a warning, so the loop can start fresh.
pub fn read_state(workspace_dir: &Path) -> Option<WorkspaceState> {
    let path = workspace_dir.join(STATE_FILE);
    if !path.exists() {
        return None;
    }

    let parsed = fs::read_to_string(&path)
        .map_err(StateError::from)
        .and_then(|content| WorkspaceState::from_markdown(&content));
    match parsed {
        Ok(state) => Some(state),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "could not read state.md");
            None
        }
    }
}

/// Write `state` to `workspace_dir/state.md`, refreshing its timestamp.
pub fn write_state(workspace_dir: &Path, state: &mut WorkspaceState) -> StateResult<()> {
    state.last_updated = Utc::now();
    fs::write(workspace_dir.join(STATE_FILE), state.to_markdown())?;
    Ok(())
}
