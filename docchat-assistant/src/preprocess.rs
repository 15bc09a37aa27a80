//! Query translation and history-aware rewriting
//!
//! Retrieval works best on self-contained English queries. The preprocessor
//! asks the model to translate the raw question and, once there is a
//! conversation to draw on, to resolve references such as "it" or "that" and
//! add retrieval keywords.

use crate::error::LlmError;
use crate::history::ChatHistory;
use crate::llm::LlmProvider;
use std::sync::Arc;
use tracing::debug;

pub const TRANSLATOR_SYSTEM_PROMPT: &str = "You are a multilingual translator. Your task is to:

1. Translate the user's query to English if it's not already in English
2. Keep the query meaning intact
3. Make minimal changes if the query is already in English

Return ONLY the translated English query, with no additional explanations.";

pub const ENRICH_SYSTEM_PROMPT: &str = "You are a multilingual query assistant. Your task is to:

1. Translate the user's query to English if it's in another language
2. Analyze the conversation history and the translated query
3. Produce an enriched search query IN ENGLISH that will help retrieve relevant information from a vector database

The enriched query should:
1. Capture the core intent of the user's latest query
2. Include relevant context from previous conversation
3. Add relevant keywords that might help with document retrieval
4. Maintain clarity and focus on the main question
5. Resolve any references to previous messages (like \"it\", \"that\", etc.)

Return ONLY the enriched English query text, with no additional explanations.";

/// Rewrites user questions into English search queries.
pub struct QueryPreprocessor {
    llm: Arc<dyn LlmProvider>,
    enrich_prompt: String,
}

impl QueryPreprocessor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            enrich_prompt: ENRICH_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Replace the system prompt used when history is present.
    pub fn with_enrich_prompt<S: Into<String>>(self, prompt: S) -> Self {
        Self {
            enrich_prompt: prompt.into(),
            ..self
        }
    }

    /// Translate `query`, or rewrite it against `history` when there is one.
    ///
    /// Exactly one model call per invocation; errors are returned unchanged.
    pub async fn enrich(&self, query: &str, history: &ChatHistory) -> Result<String, LlmError> {
        if history.is_empty() {
            return self.translate(query).await;
        }

        let user_content = format!(
            "Conversation History:\n{}\n\nLatest User Query: {query}\n\n\
             Translate the query to English if needed, and rewrite it to create a more \
             comprehensive English search query that will retrieve relevant information.",
            history.transcript()
        );
        let enriched = self.llm.generate(&self.enrich_prompt, &user_content).await?;
        let enriched = enriched.trim().to_string();
        debug!("Enriched query: {enriched}");
        Ok(enriched)
    }

    async fn translate(&self, query: &str) -> Result<String, LlmError> {
        let user_content = format!("Translate this query to English if needed: \"{query}\"");
        let translated = self
            .llm
            .generate(TRANSLATOR_SYSTEM_PROMPT, &user_content)
            .await?;
        Ok(translated.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockLlm;

    #[tokio::test]
    async fn test_empty_history_translates_only() -> anyhow::Result<()> {
        let llm = Arc::new(MockLlm::replying("  What is a cache?\n"));
        let preprocessor = QueryPreprocessor::new(llm.clone());

        let query = preprocessor
            .enrich("Qu'est-ce qu'un cache ?", &ChatHistory::default())
            .await?;

        assert_eq!(query, "What is a cache?");
        let calls = llm.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, TRANSLATOR_SYSTEM_PROMPT);
        assert_eq!(
            calls[0].1,
            "Translate this query to English if needed: \"Qu'est-ce qu'un cache ?\""
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_history_resolves_references() -> anyhow::Result<()> {
        let llm = Arc::new(MockLlm::new(|system, user| {
            if system == ENRICH_SYSTEM_PROMPT && user.contains("User: What is a TLB?") {
                Ok("How large is a translation lookaside buffer (TLB)?".to_string())
            } else {
                Ok("How large is it?".to_string())
            }
        }));
        let preprocessor = QueryPreprocessor::new(llm.clone());
        let mut history = ChatHistory::default();
        history.push("What is a TLB?", "A cache of page table entries.");

        let raw = "How large is it?";
        let query = preprocessor.enrich(raw, &history).await?;

        assert_ne!(query, raw);
        assert!(query.contains("TLB"));
        let calls = llm.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1.starts_with(
            "Conversation History:\nUser: What is a TLB?\nAssistant: A cache of page table entries.\n\n"
        ));
        assert!(calls[0].1.contains("Latest User Query: How large is it?"));
        Ok(())
    }

    #[tokio::test]
    async fn test_errors_propagate() {
        let preprocessor = QueryPreprocessor::new(Arc::new(MockLlm::failing()));
        let result = preprocessor.enrich("anything", &ChatHistory::default()).await;
        assert!(matches!(result, Err(LlmError::Api { status: 500, .. })));
    }
}
