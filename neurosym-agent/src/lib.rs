//! # Neurosym Agent
//!
//! The agent drives one interaction cycle per problem statement:
//! 1. The forward translator asks the LLM for a Prolog program
//! 2. The archiver writes it to a timestamped file
//! 3. The logic engine runs the entry goal against that file
//! 4. The narrator asks the LLM to explain the result
//!
//! Any stage failure is reported and the loop goes back to waiting for input.

mod agent;
mod state;

pub use agent::{is_exit_token, Agent, AgentConfig, CycleReport, Turn};
pub use state::{CycleStep, LoopState};
