//! LLM seam used for post-run automation analysis.
//!
//! Analysis is best-effort: a failed or slow LLM call logs a warning and the
//! run record simply has no analysis. It never changes a run's outcome.

use async_trait::async_trait;

/// Maximum characters of command output fed into an analysis prompt.
const MAX_RESULT_CHARS: usize = 8_000;

#[async_trait]
pub trait AiClient: Send + Sync {
    async fn call(&self, prompt: &str, system: Option<&str>) -> Result<String, String>;
}

/// Summarize an automation's output against its stated task.
pub async fn analyze_automation_result(
    client: &dyn AiClient,
    task: &str,
    result: &str,
) -> Option<String> {
    let truncated: String = if result.chars().count() > MAX_RESULT_CHARS {
        result.chars().take(MAX_RESULT_CHARS).collect()
    } else {
        result.to_string()
    };

    let prompt = format!(
        "An automation with the task \"{task}\" just finished. \
         Summarize what it accomplished in two sentences or less.\n\nOutput:\n{truncated}"
    );

    match client
        .call(&prompt, Some("You review automation output for a personal dashboard."))
        .await
    {
        Ok(analysis) => Some(analysis),
        Err(e) => {
            log::warn!("Automation analysis failed: {e}");
            None
        }
    }
}
