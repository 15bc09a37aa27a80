//! Retrieval-augmented question answering
//!
//! One [`RagPipeline::ask`] runs three stages in order:
//!
//! 1. **Preprocess**: translate the question, or rewrite it against history
//! 2. **Retrieve**: nearest chunks from the default collection or the
//!    selected topic collections
//! 3. **Answer**: generate a reply grounded in those chunks
//!
//! The turn is added to history only after all three succeed.

use crate::answer::AnswerGenerator;
use crate::error::Result;
use crate::history::{ChatHistory, DEFAULT_HISTORY_DEPTH};
use crate::llm::LlmProvider;
use crate::preprocess::QueryPreprocessor;
use docchat_retriever::{QueryResult, VectorStore};
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_CONTEXT_LIMIT: usize = 5;
pub const DEFAULT_RESULTS_PER_TOPIC: usize = 2;

pub struct RagPipeline {
    store: Arc<VectorStore>,
    preprocessor: QueryPreprocessor,
    generator: AnswerGenerator,
    history: ChatHistory,
    context_limit: usize,
    selected_topics: Vec<String>,
    results_per_topic: usize,
}

impl RagPipeline {
    /// Pipeline with default prompts, no topics selected and a 5-turn history.
    pub fn new(store: Arc<VectorStore>, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            store,
            preprocessor: QueryPreprocessor::new(llm.clone()),
            generator: AnswerGenerator::new(llm),
            history: ChatHistory::new(DEFAULT_HISTORY_DEPTH),
            context_limit: DEFAULT_CONTEXT_LIMIT,
            selected_topics: Vec::new(),
            results_per_topic: DEFAULT_RESULTS_PER_TOPIC,
        }
    }

    /// Number of chunks retrieved when no topics are selected.
    pub fn with_context_limit(self, context_limit: usize) -> Self {
        Self {
            context_limit,
            ..self
        }
    }

    pub fn with_history_depth(self, depth: usize) -> Self {
        Self {
            history: ChatHistory::new(depth),
            ..self
        }
    }

    pub fn with_system_prompt<S: Into<String>>(self, system_prompt: S) -> Self {
        Self {
            generator: self.generator.with_system_prompt(system_prompt),
            ..self
        }
    }

    /// Restrict retrieval to `topics`, taking at most `results_per_topic` from each.
    ///
    /// An empty list goes back to querying the default collection.
    pub fn set_selected_topics(&mut self, topics: Vec<String>, results_per_topic: usize) {
        info!(
            "Selected topics: {:?} ({results_per_topic} results per topic)",
            topics
        );
        self.selected_topics = topics;
        self.results_per_topic = results_per_topic;
    }

    pub fn clear_selected_topics(&mut self) {
        self.selected_topics.clear();
    }

    pub fn selected_topics(&self) -> &[String] {
        &self.selected_topics
    }

    pub fn results_per_topic(&self) -> usize {
        self.results_per_topic
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    /// Nearest chunks for an already preprocessed query.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<QueryResult>> {
        let results = if self.selected_topics.is_empty() {
            self.store.query(&[], query, self.context_limit, None).await?
        } else {
            let k = self.results_per_topic * self.selected_topics.len();
            self.store
                .query(&self.selected_topics, query, k, Some(self.results_per_topic))
                .await?
        };
        debug!("Retrieved {} chunks", results.len());
        Ok(results)
    }

    /// Answer a chat message, using and then extending the conversation history.
    ///
    /// On error the history is left untouched.
    pub async fn ask(&mut self, question: &str) -> Result<String> {
        let answer = self.answer_with_history(question, &self.history).await?;
        self.history.push(question, answer.clone());
        Ok(answer)
    }

    /// Answer a single question without reading or writing history.
    pub async fn query(&self, question: &str) -> Result<String> {
        self.answer_with_history(question, &ChatHistory::new(0)).await
    }

    async fn answer_with_history(&self, question: &str, history: &ChatHistory) -> Result<String> {
        let search_query = self.preprocessor.enrich(question, history).await?;
        info!("Search query: {search_query}");
        let documents = self.retrieve(&search_query).await?;

        let transcript = (!history.is_empty()).then(|| history.transcript());
        let answer = self
            .generator
            .answer(question, &documents, None, transcript.as_deref())
            .await?;
        Ok(answer)
    }
}
