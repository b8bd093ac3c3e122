//! Agent executor that shells out to a CLI agent.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{AgentError, AgentExecutor, AgentRun, WorkUnit};
use crate::budget::TokenUsageParser;

/// Lines of stderr kept in a failure message.
const STDERR_TAIL_LINES: usize = 20;

static RATE_LIMIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\brate[ _-]?limit|\btoo many requests\b|\b429\b").expect("rate limit regex should compile")
});

/// Runs the configured agent command once per unit of work.
///
/// The command is a shell string run with `sh -c` in the workspace directory.
/// `{max_steps}` and `{model}` are substituted before running, and the prompt
/// is written to the agent's stdin.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    command: String,
    workspace: PathBuf,
    model: String,
    parser: TokenUsageParser,
}

impl CommandExecutor {
    pub fn new(command: impl Into<String>, workspace: impl Into<PathBuf>, model: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            workspace: workspace.into(),
            model: model.into(),
            parser: TokenUsageParser::new(),
        }
    }

    /// Command line after placeholder substitution.
    pub fn render_command(&self, unit: &WorkUnit) -> String {
        self.command
            .replace("{max_steps}", &unit.max_steps.to_string())
            .replace("{model}", &self.model)
    }
}

#[async_trait]
impl AgentExecutor for CommandExecutor {
    async fn execute(&self, unit: &WorkUnit) -> Result<AgentRun, AgentError> {
        let command_line = self.render_command(unit);
        debug!(iteration = unit.iteration, command = %command_line, "spawning agent");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&command_line)
            .current_dir(&self.workspace)
            .env("RALPH_MAX_STEPS", unit.max_steps.to_string())
            .env("RALPH_MODEL", &self.model)
            .env("RALPH_ITERATION", unit.iteration.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Feed stdin concurrently so a chatty agent cannot deadlock on a full pipe.
        // Agents that never read stdin close it early; that write error is expected.
        if let Some(mut stdin) = child.stdin.take() {
            let prompt = unit.prompt.clone().into_bytes();
            tokio::spawn(async move {
                let _ = stdin.write_all(&prompt).await;
                let _ = stdin.shutdown().await;
            });
        }

        let output = child.wait_with_output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let total_tokens = self.parser.parse(&stdout).map(|usage| usage.total());

        if output.status.success() {
            return Ok(AgentRun {
                completed: true,
                total_tokens,
                output: stdout,
            });
        }

        // Stdout is the agent's own transcript and token counts; only stderr
        // carries provider errors.
        if is_rate_limit_message(&stderr) {
            return Err(AgentError::RateLimited(tail(&stderr, STDERR_TAIL_LINES)));
        }

        // The agent did some work before failing; its usage still counts.
        if total_tokens.is_some() {
            return Ok(AgentRun {
                completed: false,
                total_tokens,
                output: stdout,
            });
        }

        Err(AgentError::Failed {
            code: output.status.code(),
            message: tail(&stderr, STDERR_TAIL_LINES),
        })
    }
}

/// Whether an error message describes a provider rate limit.
pub fn is_rate_limit_message(message: &str) -> bool {
    RATE_LIMIT_RE.is_match(message)
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim_end().lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn unit(prompt: &str) -> WorkUnit {
        WorkUnit {
            iteration: 3,
            prompt: prompt.to_string(),
            max_steps: 80,
        }
    }

    #[test]
    fn test_render_command_substitutes_placeholders() {
        let executor = CommandExecutor::new("agent --max-turns {max_steps} --model {model}", ".", "gpt-4o-mini");
        assert_eq!(
            executor.render_command(&unit("x")),
            "agent --max-turns 80 --model gpt-4o-mini"
        );
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(is_rate_limit_message("Error: Rate limit reached for requests"));
        assert!(is_rate_limit_message("HTTP 429 Too Many Requests"));
        assert!(is_rate_limit_message("anthropic error: rate_limit_error"));
        assert!(is_rate_limit_message("too many requests, slow down"));
        assert!(!is_rate_limit_message("permission denied"));
        assert!(!is_rate_limit_message("failed to generate response: context length limit exceeded"));
        assert!(!is_rate_limit_message(r#"{"usage": {"input_tokens": 4290}}"#));
        assert!(!is_rate_limit_message("request id 14290"));
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\nc\n", 2), "b\nc");
        assert_eq!(tail("", 5), "");
    }

    #[tokio::test]
    async fn test_execute_reports_usage() {
        let temp_dir = TempDir::new().expect("temp dir");
        let executor = CommandExecutor::new(
            r#"cat > prompt.txt; echo '{"type": "result", "usage": {"input_tokens": 120, "output_tokens": 30}}'"#,
            temp_dir.path(),
            "test-model",
        );

        let run = executor.execute(&unit("hello agent")).await.expect("run");
        assert!(run.completed);
        assert_eq!(run.total_tokens, Some(150));

        let prompt = std::fs::read_to_string(temp_dir.path().join("prompt.txt")).expect("prompt");
        assert_eq!(prompt, "hello agent");
    }

    #[tokio::test]
    async fn test_execute_exports_environment() {
        let temp_dir = TempDir::new().expect("temp dir");
        let executor = CommandExecutor::new(
            "echo \"$RALPH_ITERATION $RALPH_MAX_STEPS $RALPH_MODEL\"",
            temp_dir.path(),
            "m1",
        );

        let run = executor.execute(&unit("")).await.expect("run");
        assert_eq!(run.output.trim(), "3 80 m1");
        assert_eq!(run.total_tokens, None);
    }

    #[tokio::test]
    async fn test_execute_classifies_rate_limit() {
        let temp_dir = TempDir::new().expect("temp dir");
        let executor = CommandExecutor::new("echo 'Error 429: rate limit exceeded' >&2; exit 1", temp_dir.path(), "m");

        let err = executor.execute(&unit("")).await.unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_execute_failure_without_usage() {
        let temp_dir = TempDir::new().expect("temp dir");
        let executor = CommandExecutor::new("echo 'no api key' >&2; exit 3", temp_dir.path(), "m");

        match executor.execute(&unit("")).await {
            Err(AgentError::Failed { code, message }) => {
                assert_eq!(code, Some(3));
                assert_eq!(message, "no api key");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_partial_result_keeps_usage() {
        let temp_dir = TempDir::new().expect("temp dir");
        let executor = CommandExecutor::new(
            r#"echo '{"usage": {"prompt_tokens": 70, "completion_tokens": 5}}'; exit 1"#,
            temp_dir.path(),
            "m",
        );

        let run = executor.execute(&unit("")).await.expect("partial run");
        assert!(!run.completed);
        assert_eq!(run.total_tokens, Some(75));
    }

    #[tokio::test]
    async fn test_token_counts_on_stdout_are_not_rate_limits() {
        let temp_dir = TempDir::new().expect("temp dir");
        let executor = CommandExecutor::new(
            r#"echo '{"usage": {"input_tokens": 4290, "output_tokens": 5}}'; echo 'hit the rate limit, stopping' ; exit 1"#,
            temp_dir.path(),
            "m",
        );

        let run = executor.execute(&unit("")).await.expect("partial run");
        assert!(!run.completed);
        assert_eq!(run.total_tokens, Some(4295));
    }

    #[tokio::test]
    async fn test_unrelated_limit_errors_are_failures() {
        let temp_dir = TempDir::new().expect("temp dir");
        let executor = CommandExecutor::new(
            "echo 'failed to generate response: context length limit exceeded' >&2; exit 2",
            temp_dir.path(),
            "m",
        );

        match executor.execute(&unit("")).await {
            Err(AgentError::Failed { code, message }) => {
                assert_eq!(code, Some(2));
                assert!(message.contains("context length limit"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
