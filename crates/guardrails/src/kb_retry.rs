//! Knowledge-base retry: re-run once when the lookup tool was never used.

use askwise_core::error::InvocationError;
use askwise_core::invoker::InvocationOutput;
use askwise_core::message::Message;
use std::future::Future;
use tracing::info;

pub use askwise_core::invoker::FILE_SEARCH_TOOL;

pub const KB_GUIDANCE: &str = "Before finalizing your answer, perform a knowledge-base file search using the file_search tool so your response reflects the latest KB context.";

/// Inspects the trace of a finished invocation; when the expected tool is
/// absent, re-invokes exactly once with the traced input messages plus a
/// system guidance message. The retry output is used whatever it contains.
#[derive(Debug, Clone)]
pub struct KnowledgeBaseRetry {
    tool: String,
    guidance: String,
}

impl Default for KnowledgeBaseRetry {
    fn default() -> Self {
        Self::new(FILE_SEARCH_TOOL, KB_GUIDANCE)
    }
}

impl KnowledgeBaseRetry {
    pub fn new(tool: impl Into<String>, guidance: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            guidance: guidance.into(),
        }
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Whether `output` needs the retry.
    pub fn needs_retry(&self, output: &InvocationOutput) -> bool {
        !output.trace.used_tool(&self.tool)
    }

    /// Return `first` unchanged when the tool was used, otherwise the output
    /// of a single `reinvoke` with the guidance appended.
    pub async fn run<F, Fut>(
        &self,
        first: InvocationOutput,
        reinvoke: F,
    ) -> Result<InvocationOutput, InvocationError>
    where
        F: FnOnce(Vec<Message>) -> Fut,
        Fut: Future<Output = Result<InvocationOutput, InvocationError>>,
    {
        if !self.needs_retry(&first) {
            return Ok(first);
        }

        info!(tool = %self.tool, "Knowledge-base tool not used, retrying once");
        let mut messages = first.trace.input_messages;
        messages.push(Message::system(self.guidance.clone()));
        reinvoke(messages).await
    }
}
