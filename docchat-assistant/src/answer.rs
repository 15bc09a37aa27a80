//! Grounded answer generation

use crate::error::LlmError;
use crate::llm::LlmProvider;
use docchat_retriever::QueryResult;
use std::sync::Arc;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Use the provided context to answer the user's question.
If the context doesn't contain relevant information, say so. Always base your answers on the provided context.
If the context has the source name and maybe page number, mention it at the end of your response.";

/// Appended to every question so the model answers in the asker's language.
pub const LANGUAGE_SUFFIX: &str = "\n\nRespond in the same language as the question above.";

/// Render retrieved chunks (and optional history) as the context block.
///
/// Each chunk becomes `[Document (Distance: d, Collection: c, key: value, ...)]`
/// followed by its text. Metadata keys come out sorted.
pub fn format_context(documents: &[QueryResult], history_text: Option<&str>) -> String {
    let parts: Vec<String> = documents
        .iter()
        .map(|doc| {
            let mut fields = vec![
                format!("Distance: {:.4}", doc.distance),
                format!("Collection: {}", doc.collection),
            ];
            fields.extend(
                doc.metadata
                    .iter()
                    .map(|(key, value)| format!("{key}: {value}")),
            );
            format!("[Document ({})]\n{}\n", fields.join(", "), doc.text)
        })
        .collect();
    let context = parts.join("\n");

    match history_text {
        Some(history) => format!("Conversation History:\n{history}\n{context}"),
        None => context,
    }
}

/// Produces the final answer from retrieved context.
pub struct AnswerGenerator {
    llm: Arc<dyn LlmProvider>,
    system_prompt: String,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt<S: Into<String>>(self, system_prompt: S) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            ..self
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Ask the model to answer `query` from `documents`. The reply is returned as is.
    pub async fn answer(
        &self,
        query: &str,
        documents: &[QueryResult],
        system_prompt: Option<&str>,
        history_text: Option<&str>,
    ) -> Result<String, LlmError> {
        let context = format_context(documents, history_text);
        let user_content = format!("Context:\n{context}\n\nQuestion: {query}{LANGUAGE_SUFFIX}");
        self.llm
            .generate(system_prompt.unwrap_or(&self.system_prompt), &user_content)
            .await
    }
}
