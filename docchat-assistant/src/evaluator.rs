//! RAG answer quality evaluation
//!
//! Samples chunks from one collection, asks a judge model to write questions
//! that each chunk answers, runs those questions through a [`RagPipeline`],
//! and has the judge score every answer against its source chunk.
//!
//! Model replies are expected as JSON but are parsed leniently. A reply
//! that cannot be understood yields a neutral result rather than an error:
//! score 5.0 for an unparseable evaluation, or an empty question list.

use crate::error::{AssistantError, Result};
use crate::llm::LlmProvider;
use crate::pipeline::RagPipeline;
use chrono::{DateTime, Local};
use docchat_retriever::{Metadata, StoredDocument};
use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const QUESTION_SYSTEM_PROMPT: &str = "You are an expert at creating insightful and diverse questions about text passages.
Given a passage of text (which may be a chunk from a textbook, article, or document),
your task is to generate thoughtful questions that:

1. Test understanding of the key concepts in the passage
2. Require information specifically contained in the passage to answer correctly
3. Are clear, concise, and unambiguous
4. Cover different aspects and difficulty levels
5. Would be appropriate for a computer engineering student

Focus on generating questions where the information in the passage is sufficient to provide a good answer.
Important:
- The RAG system doesn't know on what passage you are basing your questions, it will have to retrieve the correct passage to answer them.
- Don't base your questions on figures or tables, they may not be available to the RAG system.";

const EVALUATION_SYSTEM_PROMPT: &str = "You are an expert evaluator of AI assistant responses for a retrieval-augmented generation (RAG) system.
Your job is to evaluate how well the RAG system's response answers the user's question based on the retrieved document.

Provide an evaluation score from 0 to 10, where:
- 0: Completely irrelevant, incorrect, or misleading
- 5: Partially correct but missing key information or containing some errors
- 10: Perfect, comprehensive, accurate, and well-explained answer

Also provide a brief explanation (2-3 sentences) of your evaluation that addresses:
1. How well the response answers the specific question
2. Whether the response is accurate given the retrieved document
3. If the response is satisfactory for a computer engineering student
4. If the response is missing important information or is misleading

YOUR RESPONSE MUST BE A JSON OBJECT WITH EXACTLY TWO FIELDS:
- \"score\": a number from 0 to 10
- \"explanation\": a string with your brief explanation

Important:
- The responses may refer to figures or tables, do not consider them in your evaluation.

Example: {\"score\": 7, \"explanation\": \"The response addresses the main question accurately but omits some details about X that would be useful for a complete understanding. The information provided is correct based on the source document, and would be helpful but not comprehensive for a computer engineering student.\"}";

/// Used when the judge cannot be reached while writing questions.
pub const DEFAULT_QUESTIONS: [&str; 2] = [
    "What is the main topic of this passage?",
    "Can you explain the key concepts in this text?",
];

const NEUTRAL_SCORE: f64 = 5.0;

static JSON_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.*\]").expect("array pattern is valid"));
static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("object pattern is valid"));
static QUOTED_QUESTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+\?)""#).expect("question pattern is valid"));
static JSON_SCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""score":\s*(\d+(?:\.\d+)?)"#).expect("score pattern is valid")
});
static JSON_EXPLANATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""explanation":\s*"([^"]+)""#).expect("explanation pattern is valid")
});
static LOOSE_SCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)score[:\s]+(\d+(?:\.\d+)?)").expect("score pattern is valid")
});
static LOOSE_EXPLANATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)explanation[:\s]+(.*?)(?:\n\n|\z)").expect("explanation pattern is valid")
});

/// Evaluation run parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorConfig {
    /// Documents sampled from the collection
    pub num_samples: usize,
    pub questions_per_document: usize,
    /// Retrieval depth handed to the pipeline
    pub results_per_topic: usize,
    pub collection_name: String,
    /// Wait before scoring, to stay under provider rate limits
    pub rate_limit_pause: Duration,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            num_samples: 5,
            questions_per_document: 2,
            results_per_topic: 2,
            collection_name: "Computer_Architecture".to_string(),
            rate_limit_pause: Duration::from_secs(60),
        }
    }
}

impl EvaluatorConfig {
    pub fn with_num_samples(self, num_samples: usize) -> Self {
        Self {
            num_samples,
            ..self
        }
    }

    pub fn with_questions_per_document(self, questions_per_document: usize) -> Self {
        Self {
            questions_per_document,
            ..self
        }
    }

    pub fn with_results_per_topic(self, results_per_topic: usize) -> Self {
        Self {
            results_per_topic,
            ..self
        }
    }

    pub fn with_collection<S: Into<String>>(self, collection_name: S) -> Self {
        Self {
            collection_name: collection_name.into(),
            ..self
        }
    }

    pub fn with_rate_limit_pause(self, rate_limit_pause: Duration) -> Self {
        Self {
            rate_limit_pause,
            ..self
        }
    }
}

/// A question answered by the pipeline, alongside its source chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedQuestion {
    pub question: String,
    pub document_id: String,
    pub document_text: String,
    pub document_metadata: Metadata,
    pub rag_response: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluatedQuestion {
    #[serde(flatten)]
    pub item: ProcessedQuestion,
    pub evaluation_score: f64,
    pub evaluation_explanation: String,
}

/// A parsed judge verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub score: f64,
    pub explanation: String,
}

/// Question counts per whole-point score band, `"0"` through `"10"`.
///
/// Band `s` holds scores in `[s, s + 1)`, so a perfect 10 lands in `"10"`.
/// Serializes as an empty map when nothing was scored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreDistribution(Vec<usize>);

impl ScoreDistribution {
    pub fn from_scores<I: IntoIterator<Item = f64>>(scores: I) -> Self {
        let scores: Vec<f64> = scores.into_iter().collect();
        if scores.is_empty() {
            return Self::default();
        }
        let buckets = (0..=10)
            .map(|band| {
                let low = band as f64;
                scores
                    .iter()
                    .filter(|&&score| low <= score && score < low + 1.0)
                    .count()
            })
            .collect();
        Self(buckets)
    }

    pub fn count(&self, band: usize) -> usize {
        self.0.get(band).copied().unwrap_or(0)
    }
}

impl Serialize for ScoreDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (band, count) in self.0.iter().enumerate() {
            map.serialize_entry(&band.to_string(), count)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub average_score: f64,
    pub total_questions: usize,
    pub score_distribution: ScoreDistribution,
}

impl EvaluationSummary {
    pub fn from_evaluations(evaluations: &[EvaluatedQuestion]) -> Self {
        let total_questions = evaluations.len();
        let average_score = if total_questions == 0 {
            0.0
        } else {
            evaluations.iter().map(|e| e.evaluation_score).sum::<f64>() / total_questions as f64
        };
        Self {
            average_score,
            total_questions,
            score_distribution: ScoreDistribution::from_scores(
                evaluations.iter().map(|e| e.evaluation_score),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationMetadata {
    pub timestamp: DateTime<Local>,
    pub num_samples: usize,
    pub questions_per_document: usize,
    pub results_per_topic: usize,
    pub collection_name: String,
}

/// Everything written to the results file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub metadata: EvaluationMetadata,
    pub evaluations: Vec<EvaluatedQuestion>,
    pub summary: EvaluationSummary,
}

impl EvaluationReport {
    /// Write the report as pretty-printed JSON.
    pub async fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        info!("Saved evaluation results to {}", path.display());
        Ok(())
    }
}

/// Scores pipeline answers with a judge model.
pub struct RagQualityEvaluator {
    judge: Arc<dyn LlmProvider>,
    pipeline: RagPipeline,
    config: EvaluatorConfig,
}

impl RagQualityEvaluator {
    /// The pipeline is pointed at the evaluated collection and its history cleared.
    pub fn new(
        judge: Arc<dyn LlmProvider>,
        mut pipeline: RagPipeline,
        config: EvaluatorConfig,
    ) -> Self {
        pipeline.set_selected_topics(
            vec![config.collection_name.clone()],
            config.results_per_topic,
        );
        pipeline.clear_history();
        Self {
            judge,
            pipeline,
            config,
        }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Up to `num_samples` distinct documents, chosen uniformly at random.
    pub async fn select_random_documents(&self) -> Result<Vec<StoredDocument>> {
        let mut documents = self
            .pipeline
            .store()
            .get_documents(&self.config.collection_name, None)
            .await?;
        if documents.len() <= self.config.num_samples {
            warn!(
                "Collection '{}' has only {} documents, evaluating all of them",
                self.config.collection_name,
                documents.len()
            );
            return Ok(documents);
        }

        let mut picked = rand::seq::index::sample(
            &mut rand::rng(),
            documents.len(),
            self.config.num_samples,
        )
        .into_vec();
        picked.sort_unstable();
        let sampled = picked
            .into_iter()
            .rev()
            .map(|index| documents.swap_remove(index))
            .collect();
        Ok(sampled)
    }

    /// Ask the judge for questions answerable from `document`.
    pub async fn generate_questions(&self, document: &StoredDocument) -> Vec<String> {
        let n = self.config.questions_per_document;
        info!("Generating {n} questions for document {}", document.id);

        let metadata = serde_json::to_string_pretty(&document.metadata).unwrap_or_default();
        let user_prompt = format!(
            "Please generate {n} insightful questions based on the following passage.\n\
             Each question should be answerable using the information in this passage.\n\n\
             PASSAGE:\n{}\n\n\
             METADATA:\n{metadata}\n\n\
             FORMAT YOUR RESPONSE AS A JSON LIST OF STRINGS, ONLY THE QUESTIONS WITH NO ADDITIONAL TEXT.\n\
             Example: [\"Question 1?\", \"Question 2?\"]",
            document.text
        );

        match self.judge.generate(QUESTION_SYSTEM_PROMPT, &user_prompt).await {
            Ok(response) => {
                let questions = parse_questions(&response, n);
                info!("Generated {} questions", questions.len());
                debug!("Questions: {questions:?}");
                questions
            }
            Err(e) => {
                error!("Error generating questions: {e}");
                DEFAULT_QUESTIONS.iter().map(|q| q.to_string()).collect()
            }
        }
    }

    /// Answer each question with the pipeline. Failed questions are logged and skipped.
    pub async fn process_questions(
        &self,
        document: &StoredDocument,
        questions: &[String],
    ) -> Vec<ProcessedQuestion> {
        let mut processed = Vec::with_capacity(questions.len());
        for question in questions {
            info!("Processing question: {question}");
            match self.pipeline.query(question).await {
                Ok(rag_response) => {
                    info!("Received RAG response of length {}", rag_response.len());
                    processed.push(ProcessedQuestion {
                        question: question.clone(),
                        document_id: document.id.clone(),
                        document_text: document.text.clone(),
                        document_metadata: document.metadata.clone(),
                        rag_response,
                    });
                }
                Err(e) => error!("Error processing question with RAG: {e}"),
            }
        }
        processed
    }

    /// Have the judge score one answer. A judge failure scores 0.
    pub async fn evaluate_response(&self, item: ProcessedQuestion) -> EvaluatedQuestion {
        info!("Evaluating response for question: {}", item.question);
        let user_prompt = format!(
            "QUESTION: {}\n\n\
             RETRIEVED DOCUMENT:\n{}\n\n\
             RAG SYSTEM RESPONSE:\n{}\n\n\
             Please evaluate the quality of the RAG system's response. \
             Return only a JSON object with the score and explanation.",
            item.question, item.document_text, item.rag_response
        );

        let evaluation = match self.judge.generate(EVALUATION_SYSTEM_PROMPT, &user_prompt).await {
            Ok(response) => parse_evaluation(&response),
            Err(e) => {
                error!("Error evaluating response: {e}");
                Evaluation {
                    score: 0.0,
                    explanation: format!("Error during evaluation: {e}"),
                }
            }
        };
        info!("Evaluation score: {}", evaluation.score);

        EvaluatedQuestion {
            item,
            evaluation_score: evaluation.score,
            evaluation_explanation: evaluation.explanation,
        }
    }

    pub async fn evaluate_responses(&self, items: Vec<ProcessedQuestion>) -> Vec<EvaluatedQuestion> {
        if !self.config.rate_limit_pause.is_zero() && !items.is_empty() {
            info!(
                "Pausing {:?} before scoring to avoid rate limiting",
                self.config.rate_limit_pause
            );
            tokio::time::sleep(self.config.rate_limit_pause).await;
        }
        let mut evaluations = Vec::with_capacity(items.len());
        for item in items {
            evaluations.push(self.evaluate_response(item).await);
        }
        evaluations
    }

    /// Sample, question, answer and score; returns the full report.
    pub async fn run_evaluation(&self) -> Result<EvaluationReport> {
        info!("Starting RAG quality evaluation");
        let documents = self.select_random_documents().await?;
        if documents.is_empty() {
            return Err(AssistantError::NoDocuments {
                collection: self.config.collection_name.clone(),
            });
        }
        info!("Selected {} documents for evaluation", documents.len());

        let mut processed = Vec::new();
        for document in &documents {
            info!("Processing document {}", document.id);
            let questions = self.generate_questions(document).await;
            processed.extend(self.process_questions(document, &questions).await);
        }

        let evaluations = self.evaluate_responses(processed).await;
        let summary = EvaluationSummary::from_evaluations(&evaluations);
        info!(
            "Evaluation complete. Average score: {:.2} over {} questions",
            summary.average_score, summary.total_questions
        );

        Ok(EvaluationReport {
            metadata: EvaluationMetadata {
                timestamp: Local::now(),
                num_samples: self.config.num_samples,
                questions_per_document: self.config.questions_per_document,
                results_per_topic: self.config.results_per_topic,
                collection_name: self.config.collection_name.clone(),
            },
            evaluations,
            summary,
        })
    }
}

fn strings_of(value: &Value) -> Option<Vec<String>> {
    let items = value.as_array()?;
    Some(
        items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

/// Extract at most `n` questions from a judge reply.
///
/// Tried in order: the whole reply as a JSON list, the first `[...]` span as
/// a JSON list, quoted strings ending in `?`, then lines ending in `?`.
pub fn parse_questions(response: &str, n: usize) -> Vec<String> {
    let from_json = serde_json::from_str::<Value>(response.trim())
        .ok()
        .and_then(|value| strings_of(&value))
        .or_else(|| {
            warn!("Question reply is not a JSON list, attempting fallback parsing");
            let span = JSON_ARRAY.find(response)?;
            serde_json::from_str::<Value>(span.as_str())
                .ok()
                .and_then(|value| strings_of(&value))
        });

    let mut questions = match from_json {
        Some(questions) => questions,
        None => {
            let quoted: Vec<String> = QUOTED_QUESTION
                .captures_iter(response)
                .map(|caps| caps[1].trim().to_string())
                .collect();
            if quoted.is_empty() {
                response
                    .lines()
                    .map(str::trim)
                    .filter(|line| line.ends_with('?'))
                    .map(str::to_string)
                    .collect()
            } else {
                quoted
            }
        }
    };
    questions.truncate(n);
    questions
}

fn score_of(value: &Value) -> Option<f64> {
    let score: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    score.filter(|score| score.is_finite())
}

fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 10.0)
}

fn evaluation_from_json(value: &Value, response: &str) -> Evaluation {
    if let (Some(score), Some(explanation)) = (value.get("score"), value.get("explanation")) {
        let score = score_of(score).unwrap_or_else(|| {
            warn!("Could not parse score as a number: {score}");
            NEUTRAL_SCORE
        });
        let explanation = match explanation {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Evaluation {
            score: clamp_score(score),
            explanation,
        };
    }

    warn!("Evaluation missing required fields, attempting fallback parsing");
    let score = JSON_SCORE
        .captures(response)
        .and_then(|caps| caps[1].parse::<f64>().ok());
    let explanation = JSON_EXPLANATION
        .captures(response)
        .map(|caps| caps[1].to_string());
    match (score, explanation) {
        (Some(score), Some(explanation)) => Evaluation {
            score: clamp_score(score),
            explanation,
        },
        _ => Evaluation {
            score: NEUTRAL_SCORE,
            explanation: "Could not parse evaluation response".to_string(),
        },
    }
}

/// Read a judge verdict, falling back to loose text matching.
pub fn parse_evaluation(response: &str) -> Evaluation {
    let parsed = serde_json::from_str::<Value>(response.trim()).ok().or_else(|| {
        JSON_OBJECT
            .find(response)
            .and_then(|span| serde_json::from_str::<Value>(span.as_str()).ok())
    });
    if let Some(value) = parsed {
        return evaluation_from_json(&value, response);
    }

    warn!("JSON parsing failed for evaluation, attempting manual extraction");
    let score = LOOSE_SCORE
        .captures(response)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .unwrap_or(NEUTRAL_SCORE);
    let explanation = LOOSE_EXPLANATION
        .captures(response)
        .map(|caps| caps[1].trim().to_string())
        .unwrap_or_else(|| "Could not parse explanation".to_string());
    Evaluation {
        score: clamp_score(score),
        explanation,
    }
}
