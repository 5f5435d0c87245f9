//! # Logic Engine Interface
//!
//! The engine loads an archived program and runs one entry goal against it.
//! Only the first solution is reported; unification, search and constraint
//! handling all stay inside the engine.
//!
//! - `LogicEngine` trait: the seam the pipeline depends on
//! - `SwiProlog`: runs `swipl` as a child process
//! - `ExecutionResult`: a solution or a classified failure

pub mod swipl;
pub mod term;

pub use swipl::SwiProlog;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Variable name -> printed term, ordered by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bindings(BTreeMap<String, String>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// The first solution of the entry goal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Solution {
    pub bindings: Bindings,
    /// Anything the program printed to stdout while running
    pub output: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The goal ran and has no solution
    GoalFailed,
    /// The program did not load cleanly (syntax errors and the like)
    LoadError,
    /// The goal raised an uncaught exception
    RuntimeError,
    /// The engine ran past its time limit
    Timeout,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::GoalFailed => "goal failed",
            FailureKind::LoadError => "load error",
            FailureKind::RuntimeError => "runtime error",
            FailureKind::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Engine-reported failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ExecutionFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn into_error(self) -> Error {
        let message = if self.message.is_empty() {
            self.kind.to_string()
        } else {
            format!("{}: {}", self.kind, self.message)
        };
        Error::execution_failed(message).with_context("failure", self.kind.as_str())
    }
}

/// Outcome of running the entry goal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    Solved(Solution),
    Failed(ExecutionFailure),
}

impl ExecutionResult {
    pub fn is_solved(&self) -> bool {
        matches!(self, ExecutionResult::Solved(_))
    }

    /// Plain-text form handed to the narrator and shown as a fallback.
    ///
    /// A binding whose value is a list is printed one element per line.
    pub fn render(&self) -> String {
        match self {
            ExecutionResult::Solved(solution) => {
                let mut lines = Vec::new();
                for (name, value) in solution.bindings.iter() {
                    match term::split_list(value) {
                        Some(items) if !items.is_empty() => {
                            lines.push(format!("{}:", name));
                            lines.extend(items.iter().map(|item| format!("  {}", item)));
                        }
                        _ => lines.push(format!("{} = {}", name, value)),
                    }
                }

                let output = solution.output.trim();
                if !output.is_empty() {
                    if !lines.is_empty() {
                        lines.push(String::new());
                    }
                    lines.push(output.to_string());
                }

                if lines.is_empty() {
                    "true.".to_string()
                } else {
                    lines.join("\n")
                }
            }
            ExecutionResult::Failed(failure) => match failure.kind {
                FailureKind::GoalFailed => "false. (no solution exists)".to_string(),
                kind => format!("Prolog {}: {}", kind, failure.message.trim()),
            },
        }
    }
}

/// The logic-engine collaborator
#[allow(async_fn_in_trait)]
pub trait LogicEngine {
    fn name(&self) -> &str;

    /// Verify the engine can start; returns its version banner
    async fn check(&self) -> Result<String>;

    /// Load `program` and run `goal` once.
    ///
    /// Goal failure, load errors and timeouts are `Ok(ExecutionResult::Failed)`;
    /// `Err` is reserved for the engine itself being unusable.
    async fn solve(&self, program: &Path, goal: &str) -> Result<ExecutionResult>;
}
