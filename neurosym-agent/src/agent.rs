//! Agent implementation - orchestrates the LLM -> Prolog -> LLM cycle

use crate::state::{CycleStep, LoopState};
use neurosym_core::{
    ArchiveRecord, Archiver, Clock, Config, Error, ErrorKind, ExecutionResult, ForwardTranslator,
    GeneratedProgram, LlmProvider, LogicEngine, Narrator, Result, SystemClock,
};
use std::io::{self, Write};
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::Instrument;

/// Inputs that end the session (compared case-insensitively)
pub const EXIT_TOKENS: &[&str] = &["exit", "quit", "q"];

const RULE: &str = "--------------------------------------";

pub fn is_exit_token(input: &str) -> bool {
    let input = input.trim();
    EXIT_TOKENS.iter().any(|token| input.eq_ignore_ascii_case(token))
}

/// Configuration for the agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Entry goal run against each generated program
    pub goal: String,
    /// Narrate execution failures instead of aborting the cycle
    pub narrate_failures: bool,
    /// Stream the narration as it is generated
    pub stream: bool,
    /// Print error details and the per-cycle trace
    pub verbose: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            goal: "solve(Solution)".to_string(),
            narrate_failures: false,
            stream: false,
            verbose: false,
        }
    }
}

impl AgentConfig {
    pub fn from_config(config: &Config, verbose: bool) -> Self {
        Self {
            goal: config.engine.goal.clone(),
            narrate_failures: config.narrate_failures,
            stream: config.stream,
            verbose,
        }
    }
}

/// Everything one successful cycle produced
#[derive(Debug)]
pub struct CycleReport {
    pub statement: String,
    pub program: GeneratedProgram,
    pub record: ArchiveRecord,
    pub result: ExecutionResult,
    /// Text shown to the operator (the raw result if narration failed)
    pub narrative: String,
    pub narration_error: Option<Error>,
    pub steps: Vec<CycleStep>,
}

/// What handling one line of input amounted to
#[derive(Debug)]
pub enum Turn {
    /// An exit token was read
    Exit,
    /// Blank input, nothing ran
    Skipped,
    Completed(CycleReport),
    /// A stage failed; the loop is back to awaiting input
    Failed(Error),
}

/// The agent orchestrator - owns the collaborators and the loop state
pub struct Agent<P, E, C: Clock = SystemClock> {
    provider: P,
    engine: E,
    forward: ForwardTranslator,
    narrator: Narrator,
    archiver: Archiver<C>,
    config: AgentConfig,
    state: LoopState,
    /// Trace of the current (or last) cycle
    steps: Vec<CycleStep>,
    cycles: usize,
}

impl<P: LlmProvider, E: LogicEngine> Agent<P, E, SystemClock> {
    /// Build every component from the loaded configuration
    pub fn new(provider: P, engine: E, config: &Config, verbose: bool) -> Self {
        Self::from_parts(
            provider,
            engine,
            ForwardTranslator::new(&config.llm),
            Narrator::new(&config.llm),
            Archiver::new(&config.archive),
            AgentConfig::from_config(config, verbose),
        )
    }
}

impl<P, E, C> Agent<P, E, C>
where
    P: LlmProvider,
    E: LogicEngine,
    C: Clock,
{
    pub fn from_parts(
        provider: P,
        engine: E,
        forward: ForwardTranslator,
        narrator: Narrator,
        archiver: Archiver<C>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            engine,
            forward,
            narrator,
            archiver,
            config,
            state: LoopState::AwaitingInput,
            steps: Vec::new(),
            cycles: 0,
        }
    }

    /// Swap the archive clock
    pub fn with_clock<D: Clock>(self, clock: D) -> Agent<P, E, D> {
        Agent {
            provider: self.provider,
            engine: self.engine,
            forward: self.forward,
            narrator: self.narrator,
            archiver: self.archiver.with_clock(clock),
            config: self.config,
            state: self.state,
            steps: self.steps,
            cycles: self.cycles,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Number of cycles started (blank input and exit tokens don't count)
    pub fn cycles(&self) -> usize {
        self.cycles
    }

    pub fn trace(&self) -> &[CycleStep] {
        &self.steps
    }

    /// Read statements from `input` until an exit token or end of input
    pub async fn run<R, W>(&mut self, mut input: R, out: &mut W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut buf = Vec::new();

        while !self.state.is_terminal() {
            writeln!(out, "Enter a logic problem (or 'exit' to quit):")?;
            write!(out, "> ")?;
            out.flush()?;

            buf.clear();
            if input.read_until(b'\n', &mut buf).await? == 0 {
                tracing::debug!("end of input");
                writeln!(out)?;
                self.handle_line(EXIT_TOKENS[0], out).await?;
                continue;
            }

            // Terminals in a legacy encoding must not end the session
            let line = String::from_utf8_lossy(&buf);
            if let std::borrow::Cow::Owned(_) = line {
                tracing::warn!(bytes = buf.len(), "input line is not valid UTF-8, decoding lossily");
            }
            self.handle_line(&line, out).await?;
        }

        Ok(())
    }

    /// Handle one line of operator input.
    ///
    /// Stage failures are reported to `out` and returned as `Turn::Failed`;
    /// only a failure to write to `out` itself is an `Err`.
    pub async fn handle_line<W: Write>(&mut self, line: &str, out: &mut W) -> io::Result<Turn> {
        if self.state.is_terminal() {
            return Ok(Turn::Exit);
        }

        let statement = line.trim();
        if is_exit_token(statement) {
            self.transition(LoopState::Exit);
            writeln!(out, "\nGoodbye!")?;
            return Ok(Turn::Exit);
        }
        if statement.is_empty() {
            return Ok(Turn::Skipped);
        }

        writeln!(out)?;
        self.cycles += 1;
        let span = tracing::info_span!("cycle", n = self.cycles);
        let outcome = self.run_cycle(statement, out).instrument(span).await;
        self.transition(LoopState::AwaitingInput);

        let turn = match outcome {
            Ok(report) => Turn::Completed(report),
            Err(err) => {
                self.report_error(&err, out)?;
                Turn::Failed(err)
            }
        };

        if self.config.verbose {
            self.print_trace(out)?;
        }
        Ok(turn)
    }

    async fn run_cycle<W: Write>(&mut self, statement: &str, out: &mut W) -> Result<CycleReport> {
        self.steps.clear();

        // Translate
        self.transition(LoopState::Translating);
        writeln!(out, "[Converting problem to Prolog...]")?;
        let started = Instant::now();
        let program = self.forward.translate(&self.provider, statement).await;
        let program = self.finish_step(started, program, |p| format!("{} chars of Prolog", p.code.len()))?;

        // Archive
        self.transition(LoopState::Archiving);
        let started = Instant::now();
        let record = self
            .archiver
            .archive(statement, &program.code)
            .map_err(|e| e.into_stage(ErrorKind::ArchiveFailed));
        let record = self.finish_step(started, record, |r| r.path.display().to_string())?;
        writeln!(out, "[Prolog code saved to: {}]", record.path.display())?;

        // Execute
        self.transition(LoopState::Executing);
        writeln!(out, "[Executing Prolog program...]")?;
        tracing::debug!(engine = self.engine.name(), goal = %self.config.goal, "executing program");
        let started = Instant::now();
        let result = self
            .engine
            .solve(&record.path, &self.config.goal)
            .await
            .map_err(|e| {
                e.into_stage(ErrorKind::ExecutionFailed)
                    .with_operation("agent::execute")
            });
        let result = self.finish_step(started, result, |r| summarize(&r.render()))?;

        if let ExecutionResult::Failed(failure) = &result {
            if let Some(step) = self.steps.last_mut() {
                step.ok = false;
            }
            if !self.config.narrate_failures {
                return Err(failure
                    .clone()
                    .into_error()
                    .with_operation("agent::execute")
                    .with_context("program", record.path.display().to_string()));
            }
            tracing::info!(failure = %failure.kind, "narrating execution failure");
        }

        // Narrate
        self.transition(LoopState::Narrating);
        writeln!(out, "[Translating results to natural language...]")?;
        let started = Instant::now();

        let narration = if self.config.stream {
            write_header(out)?;
            let mut write_error: Option<io::Error> = None;
            let narrated = self
                .narrator
                .narrate_streaming(&self.provider, statement, &result, |chunk| {
                    if write_error.is_some() {
                        return;
                    }
                    if let Err(e) = out.write_all(chunk.as_bytes()) {
                        write_error = Some(e);
                    } else if let Err(e) = out.flush() {
                        write_error = Some(e);
                    }
                })
                .await;
            if let Some(e) = write_error {
                return Err(e.into());
            }
            narrated
        } else {
            self.narrator.narrate(&self.provider, statement, &result).await
        };

        let (narrative, narration_error) = match narration {
            Ok(text) => {
                self.push_step(started, true, format!("{} chars", text.len()));
                (text, None)
            }
            Err(err) => {
                self.push_step(started, false, err.message().to_string());
                tracing::warn!("narration failed: {}", err);
                writeln!(out, "[WARNING] Failed to translate result: {}", err.message())?;
                writeln!(out, "[FALLBACK] Showing raw Prolog output instead")?;
                (result.render(), Some(err))
            }
        };

        if !self.config.stream {
            write_header(out)?;
        }
        if self.config.stream && narration_error.is_none() {
            writeln!(out)?;
        } else {
            writeln!(out, "{}", narrative)?;
        }
        writeln!(out, "{}\n", RULE)?;

        Ok(CycleReport {
            statement: statement.to_string(),
            program,
            record,
            result,
            narrative,
            narration_error,
            steps: self.steps.clone(),
        })
    }

    fn transition(&mut self, next: LoopState) {
        tracing::debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
    }

    fn push_step(&mut self, started: Instant, ok: bool, note: String) {
        self.steps.push(CycleStep {
            state: self.state,
            elapsed: started.elapsed(),
            note,
            ok,
        });
    }

    /// Record the outcome of the current stage and pass it through
    fn finish_step<T>(&mut self, started: Instant, outcome: Result<T>, note: impl FnOnce(&T) -> String) -> Result<T> {
        match &outcome {
            Ok(value) => self.push_step(started, true, note(value)),
            Err(err) => self.push_step(started, false, err.message().to_string()),
        }
        outcome
    }

    fn report_error<W: Write>(&self, err: &Error, out: &mut W) -> io::Result<()> {
        // Stage failures are expected with a small model; anything else is not
        if err.kind().is_stage_failure() {
            tracing::warn!(kind = %err.kind(), "cycle failed: {}", err);
        } else {
            tracing::error!(kind = %err.kind(), "cycle failed: {}", err);
        }

        writeln!(out, "[ERROR] {}: {}", stage_label(err.kind()), err.message())?;
        if let Some(hint) = hint(err) {
            writeln!(out, "[HINT] {}", hint)?;
        }
        if self.config.verbose {
            writeln!(out, "[DEBUG] {}", err)?;
        }
        if err.is_retryable() {
            writeln!(out, "This looks transient; the same problem may work on a second try.")?;
        }
        writeln!(out, "Please try again.\n")
    }

    fn print_trace<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "--- Cycle Trace ({} steps) ---", self.steps.len())?;
        for (i, step) in self.steps.iter().enumerate() {
            writeln!(
                out,
                "  {:2}. {:<11} {:>6}ms {}{}",
                i + 1,
                step.state.as_str(),
                step.elapsed.as_millis(),
                if step.ok { "" } else { "FAILED " },
                truncate(&step.note, 60)
            )?;
        }
        writeln!(out)
    }
}

fn write_header<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "\n{}", RULE)?;
    writeln!(out, "Solution:")?;
    writeln!(out, "{}", RULE)
}

fn stage_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::TranslationFailed => "Could not generate Prolog code",
        ErrorKind::ArchiveFailed => "Could not save Prolog code",
        ErrorKind::ExecutionFailed => "Prolog execution failed",
        ErrorKind::NarrationFailed => "Could not translate the result",
        _ => "Unexpected error",
    }
}

fn hint(err: &Error) -> Option<&'static str> {
    match (err.kind(), err.context_value("cause")) {
        (_, Some("NetworkFailed")) | (_, Some("ProviderUnavailable")) => {
            Some("Ensure the LLM server (e.g. Ollama) is running and the model is installed")
        }
        (_, Some("Timeout")) => Some("The LLM server did not answer in time; a smaller model may help"),
        (_, Some("EngineUnavailable")) => Some("Ensure SWI-Prolog 9.0+ is installed and in your PATH"),
        (ErrorKind::ExecutionFailed, _) if err.message().starts_with("timeout") => {
            Some("The program may search an unbounded domain; try restating the problem")
        }
        (ErrorKind::TranslationFailed, _) => Some("Try rephrasing the problem more explicitly"),
        _ => None,
    }
}

/// First line of `text`, shortened for the trace
fn summarize(text: &str) -> String {
    let first = text.lines().next().unwrap_or("");
    if text.lines().nth(1).is_some() {
        format!("{} ...", first)
    } else {
        first.to_string()
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use neurosym_core::{
        ArchiveConfig, CompletionRequest, CompletionResponse, ExecutionFailure, FailureKind,
        FinishReason, FixedClock, ProviderError, Solution, StreamChunk, StreamReceiver, Usage,
    };
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    const STATEMENT: &str = "Alice and Bob each have a different pet: cat, dog. Alice doesn't have the cat.";
    const PROGRAM: &str = "solve([alice-A, bob-B]) :-\n    member(A, [cat, dog]),\n    member(B, [cat, dog]),\n    A \\= B,\n    A \\= cat.";
    const NARRATIVE: &str = "Alice has the dog; Bob has the cat.";

    // ------------------------------------------------------------------
    // Scripted collaborators
    // ------------------------------------------------------------------

    struct ScriptedProvider {
        replies: Mutex<VecDeque<std::result::Result<String, ProviderError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<std::result::Result<String, ProviderError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn replying(replies: &[&str]) -> Self {
            Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request(&self, i: usize) -> CompletionRequest {
            self.requests.lock().unwrap()[i].clone()
        }

        fn next_reply(&self, request: CompletionRequest) -> std::result::Result<String, ProviderError> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::Other("no scripted reply left".into())))
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn default_model(&self) -> &str {
            "mock"
        }

        async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
            Ok(vec!["mock".into()])
        }

        async fn complete(&self, request: CompletionRequest) -> std::result::Result<CompletionResponse, ProviderError> {
            let content = self.next_reply(request)?;
            Ok(CompletionResponse {
                model: "mock".into(),
                content: Some(content),
                finish_reason: FinishReason::Stop,
                usage: Usage::default(),
            })
        }

        async fn stream(&self, request: CompletionRequest) -> std::result::Result<StreamReceiver, ProviderError> {
            let content = self.next_reply(request)?;
            let mut chunks: Vec<StreamChunk> = content
                .split_inclusive(' ')
                .map(|word| StreamChunk::Text(word.to_string()))
                .collect();
            chunks.push(StreamChunk::Done { finish_reason: FinishReason::Stop });
            Ok(StreamReceiver::new(futures_util::stream::iter(chunks)))
        }
    }

    struct ScriptedEngine {
        results: Mutex<VecDeque<Result<ExecutionResult>>>,
        calls: Mutex<Vec<(PathBuf, String)>>,
    }

    impl ScriptedEngine {
        fn new(results: Vec<Result<ExecutionResult>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn solving(pairs: &[(&str, &str)]) -> Self {
            Self::new(vec![Ok(ExecutionResult::Solved(Solution {
                bindings: pairs.iter().copied().collect(),
                output: String::new(),
            }))])
        }

        fn calls(&self) -> Vec<(PathBuf, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl LogicEngine for ScriptedEngine {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn check(&self) -> Result<String> {
            Ok("scripted engine".into())
        }

        async fn solve(&self, program: &Path, goal: &str) -> Result<ExecutionResult> {
            self.calls.lock().unwrap().push((program.to_path_buf(), goal.to_string()));
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::engine_unavailable("scripted", "no scripted result left")))
        }
    }

    /// An engine that rejects every program
    struct BrokenEngine;

    impl LogicEngine for BrokenEngine {
        fn name(&self) -> &str {
            "broken"
        }

        async fn check(&self) -> Result<String> {
            Ok("broken".into())
        }

        async fn solve(&self, _program: &Path, _goal: &str) -> Result<ExecutionResult> {
            Ok(ExecutionResult::Failed(ExecutionFailure::new(
                FailureKind::LoadError,
                "Syntax error: Operator expected",
            )))
        }
    }

    fn new_year() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn agent<E: LogicEngine>(
        provider: ScriptedProvider,
        engine: E,
        dir: &Path,
        config: AgentConfig,
    ) -> Agent<ScriptedProvider, E, FixedClock> {
        let archive = ArchiveConfig {
            dir: dir.to_path_buf(),
            ..ArchiveConfig::default()
        };
        Agent::from_parts(
            provider,
            engine,
            ForwardTranslator::default(),
            Narrator::default(),
            Archiver::new(&archive),
            config,
        )
        .with_clock(FixedClock(new_year()))
    }

    fn fenced(code: &str) -> String {
        format!("```prolog\n{}\n```", code)
    }

    fn text(out: &[u8]) -> String {
        String::from_utf8(out.to_vec()).unwrap()
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_end_to_end_with_mocks() {
        let dir = tempfile::tempdir().unwrap();
        let program_reply = fenced(PROGRAM);
        let provider = ScriptedProvider::replying(&[&program_reply, NARRATIVE]);
        let engine = ScriptedEngine::solving(&[("Alice", "dog"), ("Bob", "cat")]);
        let mut agent = agent(provider, engine, dir.path(), AgentConfig::default());
        let mut out = Vec::new();

        let turn = agent.handle_line(STATEMENT, &mut out).await.unwrap();

        let report = match turn {
            Turn::Completed(report) => report,
            other => panic!("expected a completed cycle, got {:?}", other),
        };
        assert_eq!(report.narrative, NARRATIVE);
        assert!(report.narration_error.is_none());
        assert_eq!(report.record.path, dir.path().join("problem_20250101_000000.pl"));
        assert_eq!(std::fs::read_to_string(&report.record.path).unwrap(), PROGRAM);
        assert_eq!(agent.state(), LoopState::AwaitingInput);

        let calls = agent.engine().calls();
        assert_eq!(calls, vec![(report.record.path.clone(), "solve(Solution)".to_string())]);

        assert_eq!(agent.provider().calls(), 2);
        let narration_prompt = agent.provider().request(1).messages[0].content.clone();
        assert!(narration_prompt.contains(STATEMENT));
        assert!(narration_prompt.contains("Alice = dog\nBob = cat"));

        let shown = text(&out);
        assert!(shown.contains(&format!("Solution:\n{}\n{}\n{}\n", RULE, NARRATIVE, RULE)));

        let states: Vec<LoopState> = report.steps.iter().map(|s| s.state).collect();
        assert_eq!(
            states,
            vec![
                LoopState::Translating,
                LoopState::Archiving,
                LoopState::Executing,
                LoopState::Narrating
            ]
        );
    }

    #[tokio::test]
    async fn test_exit_tokens_skip_collaborators() {
        for token in ["exit", "quit", "EXIT", "  Quit  ", "q"] {
            let dir = tempfile::tempdir().unwrap();
            let mut agent = agent(
                ScriptedProvider::replying(&[]),
                ScriptedEngine::new(vec![]),
                dir.path(),
                AgentConfig::default(),
            );
            let mut out = Vec::new();

            let turn = agent.handle_line(token, &mut out).await.unwrap();

            assert!(matches!(turn, Turn::Exit), "token {:?}", token);
            assert_eq!(agent.state(), LoopState::Exit);
            assert_eq!(agent.provider().calls(), 0);
            assert!(agent.engine().calls().is_empty());
            assert_eq!(agent.cycles(), 0);
        }
    }

    #[test]
    fn test_is_exit_token() {
        assert!(is_exit_token("Exit"));
        assert!(!is_exit_token("exit now"));
        assert!(!is_exit_token(""));
    }

    #[tokio::test]
    async fn test_blank_input_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = agent(
            ScriptedProvider::replying(&[]),
            ScriptedEngine::new(vec![]),
            dir.path(),
            AgentConfig::default(),
        );
        let mut out = Vec::new();

        assert!(matches!(agent.handle_line("   ", &mut out).await.unwrap(), Turn::Skipped));
        assert_eq!(agent.state(), LoopState::AwaitingInput);
        assert_eq!(agent.provider().calls(), 0);
    }

    #[tokio::test]
    async fn test_execution_failure_returns_to_awaiting_input() {
        let dir = tempfile::tempdir().unwrap();
        let program_reply = fenced(PROGRAM);
        let provider = ScriptedProvider::replying(&[&program_reply, &program_reply]);
        let mut agent = agent(provider, BrokenEngine, dir.path(), AgentConfig::default());
        let mut out = Vec::new();

        for _ in 0..2 {
            let turn = agent.handle_line(STATEMENT, &mut out).await.unwrap();
            match turn {
                Turn::Failed(err) => {
                    assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
                    assert!(err.message().contains("Operator expected"));
                }
                other => panic!("expected a failed cycle, got {:?}", other),
            }
            assert_eq!(agent.state(), LoopState::AwaitingInput);
        }

        assert_eq!(agent.cycles(), 2);
        // no narration call after a failed execution
        assert_eq!(agent.provider().calls(), 2);
        assert!(!agent.trace().last().unwrap().ok);

        let shown = text(&out);
        assert!(shown.contains("[ERROR] Prolog execution failed: load error: Syntax error: Operator expected"));
        assert!(dir.path().join("problem_20250101_000000_1.pl").exists());
    }

    #[tokio::test]
    async fn test_engine_unavailable_is_execution_failure() {
        let dir = tempfile::tempdir().unwrap();
        let program_reply = fenced(PROGRAM);
        let mut agent = agent(
            ScriptedProvider::replying(&[&program_reply]),
            ScriptedEngine::new(vec![]),
            dir.path(),
            AgentConfig::default(),
        );
        let mut out = Vec::new();

        let turn = agent.handle_line(STATEMENT, &mut out).await.unwrap();

        let Turn::Failed(err) = turn else {
            panic!("expected a failed cycle");
        };
        assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
        assert_eq!(err.context_value("cause"), Some("EngineUnavailable"));
        assert!(text(&out).contains("[HINT] Ensure SWI-Prolog"));
    }

    #[tokio::test]
    async fn test_translation_failure_archives_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let archive_dir = dir.path().join("programs");
        let mut agent = agent(
            ScriptedProvider::replying(&["I am not sure how to model this puzzle"]),
            ScriptedEngine::new(vec![]),
            &archive_dir,
            AgentConfig::default(),
        );
        let mut out = Vec::new();

        let turn = agent.handle_line(STATEMENT, &mut out).await.unwrap();

        let Turn::Failed(err) = turn else {
            panic!("expected a failed cycle");
        };
        assert_eq!(err.kind(), ErrorKind::TranslationFailed);
        assert!(!archive_dir.exists());
        assert!(agent.engine().calls().is_empty());
        assert!(text(&out).contains("[ERROR] Could not generate Prolog code: response contains no code block"));
    }

    #[tokio::test]
    async fn test_unreachable_llm_is_translation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![Err(ProviderError::Network("connection refused".into()))]);
        let mut agent = agent(provider, ScriptedEngine::new(vec![]), dir.path(), AgentConfig::default());
        let mut out = Vec::new();

        let turn = agent.handle_line(STATEMENT, &mut out).await.unwrap();

        let Turn::Failed(err) = turn else {
            panic!("expected a failed cycle");
        };
        assert_eq!(err.kind(), ErrorKind::TranslationFailed);
        assert!(err.is_retryable());
        assert!(text(&out).contains("[HINT] Ensure the LLM server"));
        assert_eq!(agent.state(), LoopState::AwaitingInput);
    }

    #[tokio::test]
    async fn test_archive_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let program_reply = fenced(PROGRAM);
        let mut agent = agent(
            ScriptedProvider::replying(&[&program_reply]),
            ScriptedEngine::new(vec![]),
            &blocker,
            AgentConfig::default(),
        );
        let mut out = Vec::new();

        let turn = agent.handle_line(STATEMENT, &mut out).await.unwrap();

        let Turn::Failed(err) = turn else {
            panic!("expected a failed cycle");
        };
        assert_eq!(err.kind(), ErrorKind::ArchiveFailed);
        assert!(agent.engine().calls().is_empty());
    }

    #[tokio::test]
    async fn test_narrate_failures_option() {
        let dir = tempfile::tempdir().unwrap();
        let program_reply = fenced(PROGRAM);
        let provider = ScriptedProvider::replying(&[&program_reply, "No assignment satisfies the clues."]);
        let engine = ScriptedEngine::new(vec![Ok(ExecutionResult::Failed(ExecutionFailure::new(
            FailureKind::GoalFailed,
            "no solution",
        )))]);
        let config = AgentConfig {
            narrate_failures: true,
            ..AgentConfig::default()
        };
        let mut agent = agent(provider, engine, dir.path(), config);
        let mut out = Vec::new();

        let turn = agent.handle_line(STATEMENT, &mut out).await.unwrap();

        let Turn::Completed(report) = turn else {
            panic!("expected the failure to be narrated");
        };
        assert!(!report.result.is_solved());
        assert_eq!(report.narrative, "No assignment satisfies the clues.");
        let prompt = agent.provider().request(1).messages[0].content.clone();
        assert!(prompt.contains("false. (no solution exists)"));
    }

    #[tokio::test]
    async fn test_narration_failure_falls_back_to_raw_result() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![
            Ok(fenced(PROGRAM)),
            Err(ProviderError::Network("connection reset".into())),
        ]);
        let engine = ScriptedEngine::solving(&[("Alice", "dog"), ("Bob", "cat")]);
        let mut agent = agent(provider, engine, dir.path(), AgentConfig::default());
        let mut out = Vec::new();

        let turn = agent.handle_line(STATEMENT, &mut out).await.unwrap();

        let Turn::Completed(report) = turn else {
            panic!("expected a completed cycle");
        };
        let err = report.narration_error.as_ref().unwrap();
        assert_eq!(err.kind(), ErrorKind::NarrationFailed);
        assert_eq!(report.narrative, "Alice = dog\nBob = cat");

        let shown = text(&out);
        assert!(shown.contains("[FALLBACK] Showing raw Prolog output instead"));
        assert!(shown.contains("Alice = dog\nBob = cat\n"));
        assert_eq!(agent.state(), LoopState::AwaitingInput);
    }

    #[tokio::test]
    async fn test_streaming_narration() {
        let dir = tempfile::tempdir().unwrap();
        let program_reply = fenced(PROGRAM);
        let provider = ScriptedProvider::replying(&[&program_reply, NARRATIVE]);
        let engine = ScriptedEngine::solving(&[("Alice", "dog"), ("Bob", "cat")]);
        let config = AgentConfig {
            stream: true,
            ..AgentConfig::default()
        };
        let mut agent = agent(provider, engine, dir.path(), config);
        let mut out = Vec::new();

        let turn = agent.handle_line(STATEMENT, &mut out).await.unwrap();

        let Turn::Completed(report) = turn else {
            panic!("expected a completed cycle");
        };
        assert_eq!(report.narrative, NARRATIVE);
        assert!(agent.provider().request(1).stream);
        assert!(!agent.provider().request(0).stream);
        assert!(text(&out).contains(&format!("Solution:\n{}\n{}\n{}\n", RULE, NARRATIVE, RULE)));
    }

    #[tokio::test]
    async fn test_run_until_quit() {
        let dir = tempfile::tempdir().unwrap();
        let program_reply = fenced(PROGRAM);
        let provider = ScriptedProvider::replying(&[&program_reply, NARRATIVE]);
        let engine = ScriptedEngine::solving(&[("Alice", "dog"), ("Bob", "cat")]);
        let mut agent = agent(provider, engine, dir.path(), AgentConfig::default());
        let input = format!("\n{}\nquit\nnever read\n", STATEMENT);
        let mut out = Vec::new();

        agent.run(input.as_bytes(), &mut out).await.unwrap();

        assert_eq!(agent.state(), LoopState::Exit);
        assert_eq!(agent.cycles(), 1);
        assert_eq!(agent.provider().calls(), 2);
        let shown = text(&out);
        assert!(shown.contains(NARRATIVE));
        assert!(shown.ends_with("Goodbye!\n"));
    }

    #[tokio::test]
    async fn test_run_stops_at_end_of_input() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = agent(
            ScriptedProvider::replying(&[]),
            BrokenEngine,
            dir.path(),
            AgentConfig::default(),
        );
        let mut out = Vec::new();

        agent.run(&b""[..], &mut out).await.unwrap();

        assert_eq!(agent.state(), LoopState::Exit);
        assert_eq!(agent.provider().calls(), 0);
    }

    #[tokio::test]
    async fn test_run_survives_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let program_reply = fenced(PROGRAM);
        let provider = ScriptedProvider::replying(&[&program_reply, NARRATIVE]);
        let engine = ScriptedEngine::solving(&[("Alice", "dog"), ("Bob", "cat")]);
        let mut agent = agent(provider, engine, dir.path(), AgentConfig::default());
        let mut out = Vec::new();

        agent
            .run(&b"Alic\xe9 and Bob each have a different pet\r\nquit\n"[..], &mut out)
            .await
            .unwrap();

        assert_eq!(agent.state(), LoopState::Exit);
        assert_eq!(agent.cycles(), 1);
        let prompt = &agent.provider().request(0).messages[0].content;
        assert!(prompt.contains("Alic\u{FFFD} and Bob each have a different pet"));
        assert!(!prompt.contains('\r'));
        assert!(text(&out).ends_with("Goodbye!\n"));
    }

    #[tokio::test]
    async fn test_verbose_prints_trace() {
        let dir = tempfile::tempdir().unwrap();
        let program_reply = fenced(PROGRAM);
        let config = AgentConfig {
            verbose: true,
            ..AgentConfig::default()
        };
        let mut agent = agent(ScriptedProvider::replying(&[&program_reply]), BrokenEngine, dir.path(), config);
        let mut out = Vec::new();

        agent.handle_line(STATEMENT, &mut out).await.unwrap();

        let shown = text(&out);
        assert!(shown.contains("--- Cycle Trace (3 steps) ---"));
        assert!(shown.contains("EXECUTING"));
        assert!(shown.contains("FAILED Prolog load error"));
        assert!(shown.contains("[DEBUG] ExecutionFailed"));
    }

    #[test]
    fn test_truncate_and_summarize() {
        assert_eq!(truncate("héllo", 10), "héllo");
        assert_eq!(truncate("héllo", 2), "hé…");
        assert_eq!(summarize("Solution:\n  a\n  b"), "Solution: ...");
        assert_eq!(summarize("X = 1"), "X = 1");
    }
}
