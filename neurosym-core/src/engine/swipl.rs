//! SWI-Prolog engine - runs `swipl` as a child process
//!
//! Invocation:
//! ```text
//! swipl --on-error=status -q -g <wrapper> -t halt <program.pl>
//! ```
//!
//! The wrapper runs the entry goal once (`->` commits to the first solution)
//! and prints every goal variable on its own marker line:
//!
//! ```text
//! @@binding Solution\t[person(alice,dog),person(bob,cat)]
//! ```
//!
//! Exit status: 0 solved, 2 goal failed, 3 uncaught exception, anything
//! else is a load error (`--on-error=status` turns printed load errors into
//! status 1 at halt). SWI-Prolog keeps consulting after a syntax error and
//! still runs the goal, so a `Syntax error` on stderr is a load error
//! whatever the status, unless the goal printed its bindings.

use super::term::goal_variables;
use super::{Bindings, ExecutionFailure, ExecutionResult, FailureKind, LogicEngine, Solution};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Prefix of the lines carrying variable bindings
pub const BINDING_MARKER: &str = "@@binding ";

const EXIT_GOAL_FAILED: i32 = 2;
const EXIT_EXCEPTION: i32 = 3;

pub struct SwiProlog {
    program: PathBuf,
    timeout: Duration,
}

impl SwiProlog {
    /// Resolve the engine binary on the PATH (or as a direct path)
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let program = which::which(&config.program).map_err(|e| {
            Error::engine_unavailable(&config.program, format!("'{}' not found: {}", config.program, e))
                .with_operation("swipl::new")
        })?;
        tracing::debug!(program = %program.display(), "resolved logic engine");

        Ok(Self::with_program(program, Duration::from_secs(config.timeout_secs)))
    }

    /// Use `program` as-is, without a PATH lookup
    pub fn with_program(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The `-g` goal that runs `goal` and reports its bindings
    pub fn wrapper_goal(goal: &str) -> String {
        let prints: Vec<String> = goal_variables(goal)
            .iter()
            // `~N` starts a fresh line if the program left one unterminated
            .map(|var| format!("format('~N{}{}\\t~q~n', [{}])", BINDING_MARKER, var, var))
            .collect();
        let report = if prints.is_empty() {
            "true".to_string()
        } else {
            prints.join(", ")
        };

        format!(
            "catch((({goal}) -> ({report}) ; (format(user_error, 'no solution~n', []), halt({failed}))), \
             E, (print_message(error, E), halt({exception})))",
            goal = goal.trim().trim_end_matches('.'),
            report = report,
            failed = EXIT_GOAL_FAILED,
            exception = EXIT_EXCEPTION,
        )
    }

    /// Map the child's exit status and output to a result
    pub fn classify(status: Option<i32>, stdout: &str, stderr: &str) -> ExecutionResult {
        let mut bindings = Bindings::new();
        let mut output = String::new();

        for line in stdout.lines() {
            match line.strip_prefix(BINDING_MARKER).and_then(|rest| rest.split_once('\t')) {
                Some((name, value)) => bindings.insert(name, value),
                None => {
                    output.push_str(line);
                    output.push('\n');
                }
            }
        }

        let stderr = stderr.trim();
        let syntax_error = stderr.lines().any(|line| line.contains("Syntax error"));

        match status {
            Some(0) => ExecutionResult::Solved(Solution { bindings, output }),
            // Bindings were printed, so the goal succeeded despite load errors
            Some(1) if !bindings.is_empty() => {
                tracing::warn!("program loaded with errors but the goal succeeded: {}", stderr);
                ExecutionResult::Solved(Solution { bindings, output })
            }
            None => ExecutionResult::Failed(ExecutionFailure::new(
                FailureKind::RuntimeError,
                "swipl was terminated by a signal",
            )),
            Some(_) if syntax_error => {
                ExecutionResult::Failed(ExecutionFailure::new(FailureKind::LoadError, stderr))
            }
            Some(EXIT_GOAL_FAILED) => {
                ExecutionResult::Failed(ExecutionFailure::new(FailureKind::GoalFailed, stderr))
            }
            Some(EXIT_EXCEPTION) => {
                ExecutionResult::Failed(ExecutionFailure::new(FailureKind::RuntimeError, stderr))
            }
            Some(code) => ExecutionResult::Failed(ExecutionFailure::new(
                FailureKind::LoadError,
                if stderr.is_empty() {
                    format!("swipl exited with status {}", code)
                } else {
                    stderr.to_string()
                },
            )),
        }
    }

    fn spawn_error(&self, err: std::io::Error) -> Error {
        Error::engine_unavailable(
            self.program.display().to_string(),
            format!("failed to start: {}", err),
        )
        .set_source(err)
    }
}

impl LogicEngine for SwiProlog {
    fn name(&self) -> &str {
        "swi-prolog"
    }

    async fn check(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e).with_operation("swipl::check"))?;

        if !output.status.success() {
            return Err(Error::engine_unavailable(
                self.program.display().to_string(),
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            )
            .with_operation("swipl::check"));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn solve(&self, program: &Path, goal: &str) -> Result<ExecutionResult> {
        let wrapper = Self::wrapper_goal(goal);
        tracing::debug!(program = %program.display(), %wrapper, "running logic program");

        let child = Command::new(&self.program)
            .arg("--on-error=status")
            .arg("-q")
            .arg("-g")
            .arg(&wrapper)
            .arg("-t")
            .arg("halt")
            .arg(program)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e).with_operation("swipl::solve"))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|e| {
                Error::from(e)
                    .with_operation("swipl::solve")
                    .with_context("program", program.display().to_string())
            })?,
            Err(_) => {
                tracing::warn!(timeout_secs = self.timeout.as_secs(), "logic program timed out");
                return Ok(ExecutionResult::Failed(ExecutionFailure::new(
                    FailureKind::Timeout,
                    format!(
                        "no answer within {}s (unbounded search?)",
                        self.timeout.as_secs()
                    ),
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let result = Self::classify(output.status.code(), &stdout, &stderr);
        tracing::info!(
            status = ?output.status.code(),
            solved = result.is_solved(),
            "logic program finished"
        );
        Ok(result)
    }
}
