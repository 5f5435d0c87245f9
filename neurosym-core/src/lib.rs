//! # Neurosym Core
//!
//! The building blocks of the neurosym pipeline:
//!
//! ```text
//! statement -> ForwardTranslator -> Archiver -> LogicEngine -> Narrator -> prose
//!                 (LLM)             (disk)      (SWI-Prolog)     (LLM)
//! ```
//!
//! ## Core Concepts
//! - **Provider**: Trait-based LLM communication (any OpenAI-compatible endpoint, e.g. Ollama)
//! - **Translate**: Prompt template + code block extraction for the forward call
//! - **Archive**: Timestamped `.pl` files written before execution, plus a JSONL journal
//! - **Engine**: Trait-based logic engine; `SwiProlog` runs `swipl` as a child process
//! - **Narrate**: Prompt template for turning a solution back into prose
//!
//! Every component takes its settings from [`Config`] at construction time.

pub mod error;
pub mod config;
pub mod provider;
pub mod translate;
pub mod archive;
pub mod engine;
pub mod narrate;

pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use config::{ArchiveConfig, Config, EngineConfig, LlmConfig};
pub use provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
    OpenAIProvider, ProviderConfig, ProviderError, Role, StreamChunk, StreamReceiver, Usage,
};
pub use translate::{extract_code_block, CodeBlockError, ForwardTranslator, GeneratedProgram};
pub use archive::{ArchiveRecord, Archiver, Clock, FixedClock, SystemClock};
pub use engine::{
    Bindings, ExecutionFailure, ExecutionResult, FailureKind, LogicEngine, Solution, SwiProlog,
};
pub use narrate::Narrator;
