//! Forward translation: problem statement -> Prolog program
//!
//! One LLM call per statement. The response is free text; `extract_code_block`
//! pulls the program out of it or reports why it could not.

use crate::error::{self, Error, ErrorKind, Result};
use crate::provider::{ChatMessage, CompletionRequest, LlmProvider};
use std::fmt;

/// Instructional template for the forward call. `{problem}` is replaced by
/// the operator's statement.
///
/// The template ends inside an open ```` ```prolog ```` fence, so models
/// often answer with bare code followed by a single closing fence.
pub const PROBLEM_TO_PROLOG_PROMPT: &str = r#"You are a Prolog expert. Generate ONLY valid SWI-Prolog code with NO text outside code.

CRITICAL RULES:
1. ALWAYS define finite domains BEFORE using member/2
2. Use member(X, [val1, val2, val3]) with EXPLICIT lists only
3. NEVER use member(X, List) where List is undefined - causes infinite loops
4. Put all constraints EARLY to prune search space
5. Use atoms (lowercase): alice, bob, red, blue, knight, knave
6. Variables (Uppercase): X, Y, Z, Solution
7. Define solve(Solution) as the entry point. Do NOT add :- initialization directives and do NOT call halt

GOOD PATTERN - Use this structure:
```
% Define solution with explicit finite domains
solve(Solution) :-
    % Step 1: Define structure with variables
    Solution = [person(name1, Attr1), person(name2, Attr2), person(name3, Attr3)],

    % Step 2: Define finite domains for each variable
    member(Attr1, [value1, value2, value3]),
    member(Attr2, [value1, value2, value3]),
    member(Attr3, [value1, value2, value3]),

    % Step 3: Add constraints early
    Attr1 \= Attr2,
    Attr2 \= Attr3,
    Attr1 \= Attr3,

    % Step 4: Add problem-specific constraints
    % (your logic here based on problem clues).
```

BAD PATTERNS - AVOID:
- member(X, SomeList) where SomeList is not a concrete list
- Recursive predicates without base cases
- Missing constraints (generates too many solutions)

PROBLEM TO SOLVE:
{problem}

Generate ONLY the Prolog code:
```prolog"#;

/// Programs shorter than this are treated as a failed generation
pub const MIN_CODE_CHARS: usize = 20;

const FENCE: &str = "```";

/// Why no program could be extracted from a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeBlockError {
    /// No fence and nothing that looks like a clause
    NoCodeBlock,
    /// A code block was found but it is blank
    Empty,
    /// The extracted code is implausibly short
    TooShort(usize),
}

impl fmt::Display for CodeBlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeBlockError::NoCodeBlock => write!(f, "response contains no code block"),
            CodeBlockError::Empty => write!(f, "generated code is empty"),
            CodeBlockError::TooShort(n) => {
                write!(f, "generated code is too short ({} chars, need {})", n, MIN_CODE_CHARS)
            }
        }
    }
}

impl std::error::Error for CodeBlockError {}

/// Extract the Prolog program from an LLM response.
///
/// - Paired fences: the body of the first `prolog`/`pl` tagged block, or the
///   first block if none is tagged. Clauses ahead of a bare first fence
///   count as a tagged block closed by that fence.
/// - A single bare fence closes the template's open fence, so the text
///   before it is the program. A single tagged fence opens an unterminated
///   block, so the text after its tag line is.
/// - No fence: the whole response, if it contains a clause.
pub fn extract_code_block(text: &str) -> std::result::Result<String, CodeBlockError> {
    let body = match fenced_body(text) {
        Some(body) => body,
        None if looks_like_clauses(text) => text,
        None => return Err(CodeBlockError::NoCodeBlock),
    };

    let code = body.trim();
    let len = code.chars().count();
    if len == 0 {
        Err(CodeBlockError::Empty)
    } else if len < MIN_CODE_CHARS {
        Err(CodeBlockError::TooShort(len))
    } else {
        Ok(code.to_string())
    }
}

fn fenced_body(text: &str) -> Option<&str> {
    let fences: Vec<usize> = text.match_indices(FENCE).map(|(i, _)| i).collect();

    match fences.len() {
        0 => None,
        1 => {
            let fence = fences[0];
            let before = &text[..fence];
            let (tag, body_start) = info_line(text, fence + FENCE.len(), text.len());
            if tag.is_empty() && !before.trim().is_empty() {
                Some(before)
            } else {
                Some(&text[body_start..])
            }
        }
        _ => {
            let mut blocks = Vec::new();
            let mut pairs = &fences[..];

            // Clauses before a bare first fence continue the template's open block
            let before = &text[..fences[0]];
            let (first_tag, _) = info_line(text, fences[0] + FENCE.len(), fences[1]);
            if first_tag.is_empty() && looks_like_clauses(before) {
                blocks.push(("prolog", before));
                pairs = &fences[1..];
            }

            for pair in pairs.chunks(2) {
                let open = pair[0] + FENCE.len();
                let close = pair.get(1).copied().unwrap_or(text.len());
                let (tag, body_start) = info_line(text, open, close);
                blocks.push((tag, &text[body_start..close]));
            }

            blocks
                .iter()
                .find(|(tag, _)| is_prolog_tag(tag))
                .or_else(|| blocks.first())
                .map(|(_, body)| *body)
        }
    }
}

/// The info string after an opening fence and where the body starts.
/// Both are bounded by `end` so a same-line closing fence yields an empty body.
fn info_line(text: &str, start: usize, end: usize) -> (&str, usize) {
    let line = &text[start..end];
    match line.find('\n') {
        Some(n) => (line[..n].trim(), start + n + 1),
        None => (line.trim(), end),
    }
}

fn is_prolog_tag(tag: &str) -> bool {
    matches!(
        tag.to_ascii_lowercase().as_str(),
        "prolog" | "pl" | "swipl" | "swi-prolog"
    )
}

fn looks_like_clauses(text: &str) -> bool {
    let text = text.trim();
    text.contains(":-") || (text.ends_with('.') && text.contains('('))
}

/// Replace `{name}` placeholders in one pass, so substituted text is never
/// scanned for further placeholders.
pub(crate) fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + values.iter().map(|(_, v)| v.len()).sum::<usize>());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let hit = after.find('}').and_then(|close| {
            let name = &after[..close];
            values.iter().find(|(key, _)| *key == name).map(|(_, value)| (close, *value))
        });
        match hit {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// A program produced by the forward translator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedProgram {
    pub code: String,
}

impl GeneratedProgram {
    pub fn as_str(&self) -> &str {
        &self.code
    }
}

/// Turns a problem statement into a Prolog program via the LLM
#[derive(Debug, Clone)]
pub struct ForwardTranslator {
    template: String,
    model: Option<String>,
    temperature: Option<f32>,
}

impl Default for ForwardTranslator {
    fn default() -> Self {
        Self {
            template: PROBLEM_TO_PROLOG_PROMPT.to_string(),
            model: None,
            temperature: None,
        }
    }
}

impl ForwardTranslator {
    pub fn new(config: &crate::LlmConfig) -> Self {
        Self {
            template: PROBLEM_TO_PROLOG_PROMPT.to_string(),
            model: Some(config.model.clone()),
            temperature: config.temperature,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn prompt(&self, statement: &str) -> String {
        fill_template(&self.template, &[("problem", statement)])
    }

    /// The request sent for `statement`; a pure function of its inputs
    pub fn build_request(&self, statement: &str) -> CompletionRequest {
        let mut request = CompletionRequest::new(vec![ChatMessage::user(self.prompt(statement))]);
        if let Some(model) = &self.model {
            request = request.with_model(model);
        }
        if let Some(temp) = self.temperature {
            request = request.with_temperature(temp);
        }
        request
    }

    pub async fn translate<P: LlmProvider>(&self, provider: &P, statement: &str) -> Result<GeneratedProgram> {
        let request = self.build_request(statement);
        tracing::debug!(
            provider = provider.name(),
            model = request.model.as_deref().unwrap_or(provider.default_model()),
            "forward translation"
        );

        let response = provider.complete(request).await.map_err(|e| {
            error::from_provider(e)
                .into_stage(ErrorKind::TranslationFailed)
                .with_operation("translate::forward")
        })?;

        let content = response.content.unwrap_or_default();
        tracing::debug!(chars = content.len(), "forward translation received");

        let code = extract_code_block(&content).map_err(|e| {
            Error::translation_failed(e.to_string())
                .with_operation("translate::extract")
                .with_context("response_chars", content.len().to_string())
                .set_source(e)
        })?;

        Ok(GeneratedProgram { code })
    }
}
