//! Interaction loop states and the per-cycle trace

use std::fmt;
use std::time::Duration;

/// Where the interaction loop is.
///
/// ```text
/// AwaitingInput -> Translating -> Archiving -> Executing -> Narrating -> AwaitingInput
///       |
///       +-> Exit
/// ```
/// Any failure jumps straight back to `AwaitingInput`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingInput,
    Translating,
    Archiving,
    Executing,
    Narrating,
    Exit,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::AwaitingInput => "AWAITING_INPUT",
            LoopState::Translating => "TRANSLATING",
            LoopState::Archiving => "ARCHIVING",
            LoopState::Executing => "EXECUTING",
            LoopState::Narrating => "NARRATING",
            LoopState::Exit => "EXIT",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Exit)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One stage of a cycle, as recorded in the trace
#[derive(Debug, Clone)]
pub struct CycleStep {
    pub state: LoopState,
    pub elapsed: Duration,
    /// Short outcome, e.g. the archive path or the error message
    pub note: String,
    pub ok: bool,
}
