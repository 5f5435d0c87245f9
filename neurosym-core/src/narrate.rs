//! Reverse translation: execution result -> prose
//!
//! The narrative is displayed verbatim, whatever the model returns.

use crate::engine::ExecutionResult;
use crate::error::{self, ErrorKind, Result};
use crate::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::translate::fill_template;

/// `{problem}` is the operator's statement, `{result}` the rendered result
pub const RESULT_TO_TEXT_PROMPT: &str = r#"You are helping translate a Prolog solution into natural language.

Original Problem:
{problem}

Prolog Output:
{result}

Provide a clear, natural language explanation of the solution. Be concise and direct."#;

#[derive(Debug, Clone)]
pub struct Narrator {
    template: String,
    model: Option<String>,
    temperature: Option<f32>,
}

impl Default for Narrator {
    fn default() -> Self {
        Self {
            template: RESULT_TO_TEXT_PROMPT.to_string(),
            model: None,
            temperature: None,
        }
    }
}

impl Narrator {
    pub fn new(config: &crate::LlmConfig) -> Self {
        Self {
            model: Some(config.model.clone()),
            temperature: config.temperature,
            ..Self::default()
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn prompt(&self, statement: &str, result: &ExecutionResult) -> String {
        let rendered = result.render();
        fill_template(&self.template, &[("problem", statement), ("result", &rendered)])
    }

    pub fn build_request(&self, statement: &str, result: &ExecutionResult) -> CompletionRequest {
        let mut request = CompletionRequest::new(vec![ChatMessage::user(self.prompt(statement, result))]);
        if let Some(model) = &self.model {
            request = request.with_model(model);
        }
        if let Some(temp) = self.temperature {
            request = request.with_temperature(temp);
        }
        request
    }

    pub async fn narrate<P: LlmProvider>(
        &self,
        provider: &P,
        statement: &str,
        result: &ExecutionResult,
    ) -> Result<String> {
        let request = self.build_request(statement, result);
        log_request(provider, &request);

        let response = provider
            .complete(request)
            .await
            .map_err(|e| {
                error::from_provider(e)
                    .into_stage(ErrorKind::NarrationFailed)
                    .with_operation("narrate::complete")
            })?;

        Ok(response.content.unwrap_or_default())
    }

    /// Like `narrate`, handing each text fragment to `on_chunk` as it arrives
    pub async fn narrate_streaming<P, F>(
        &self,
        provider: &P,
        statement: &str,
        result: &ExecutionResult,
        on_chunk: F,
    ) -> Result<String>
    where
        P: LlmProvider,
        F: FnMut(&str),
    {
        let to_error = |e| {
            error::from_provider(e)
                .into_stage(ErrorKind::NarrationFailed)
                .with_operation("narrate::stream")
        };

        let request = self.build_request(statement, result).with_streaming(true);
        log_request(provider, &request);
        let receiver = provider.stream(request).await.map_err(to_error)?;
        receiver.collect_text(on_chunk).await.map_err(to_error)
    }
}

fn log_request<P: LlmProvider>(provider: &P, request: &CompletionRequest) {
    tracing::debug!(
        provider = provider.name(),
        model = request.model.as_deref().unwrap_or(provider.default_model()),
        stream = request.stream,
        "reverse translation"
    );
}
