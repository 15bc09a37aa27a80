use super::TopicModel;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{L}+").expect("word pattern is valid"));

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "have", "his", "how", "its", "may", "who", "did", "this", "that",
    "with", "from", "they", "them", "then", "than", "there", "their", "were", "what", "when",
    "which", "will", "would", "been", "into", "more", "also", "such", "these", "those", "some",
    "only", "other", "each", "very", "where", "while", "about", "after", "before", "between",
];

/// Sparse, L2-normalized term-frequency vector.
type SparseVector = Vec<(usize, f32)>;

/// Seeded k-means over bag-of-words sentence vectors.
///
/// The same seed, sentences and topic count always produce the same
/// assignment. Sentences without content words inherit the topic of the
/// sentence before them so they stay attached to their neighbours.
#[derive(Debug, Clone)]
pub struct KMeansTopicModel {
    seed: u64,
    max_iterations: usize,
}

impl KMeansTopicModel {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            max_iterations: 25,
        }
    }

    pub fn with_max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }
}

impl Default for KMeansTopicModel {
    fn default() -> Self {
        Self::new(42)
    }
}

impl TopicModel for KMeansTopicModel {
    fn assign(&self, sentences: &[&str], num_topics: usize) -> Vec<usize> {
        let (vectors, vocab_size) = vectorize(sentences);
        let populated: Vec<usize> = (0..vectors.len())
            .filter(|&i| !vectors[i].is_empty())
            .collect();

        let k = num_topics.min(populated.len());
        if k <= 1 {
            return vec![0; sentences.len()];
        }

        let mut centroids = initial_centroids(&vectors, &populated, k, vocab_size, self.seed);
        let mut labels = vec![0usize; vectors.len()];
        for _ in 0..self.max_iterations {
            let mut changed = false;
            for &i in &populated {
                let best = nearest(&vectors[i], &centroids);
                if labels[i] != best {
                    labels[i] = best;
                    changed = true;
                }
            }
            if !changed {
                break;
            }

            for (topic, centroid) in centroids.iter_mut().enumerate() {
                let mut members = populated.iter().filter(|&&i| labels[i] == topic).peekable();
                if members.peek().is_none() {
                    continue;
                }
                centroid.iter_mut().for_each(|v| *v = 0.0);
                for &i in members {
                    for &(term, weight) in &vectors[i] {
                        centroid[term] += weight;
                    }
                }
                normalize(centroid);
            }
        }

        let mut previous = 0;
        for (i, vector) in vectors.iter().enumerate() {
            if vector.is_empty() {
                labels[i] = previous;
            }
            previous = labels[i];
        }
        labels
    }
}

fn vectorize(sentences: &[&str]) -> (Vec<SparseVector>, usize) {
    let mut vocab: HashMap<String, usize> = HashMap::new();
    let mut vectors = Vec::with_capacity(sentences.len());

    for sentence in sentences {
        let mut counts: HashMap<usize, f32> = HashMap::new();
        for word in WORD.find_iter(sentence) {
            let word = word.as_str().to_lowercase();
            if word.chars().count() < 3 || STOP_WORDS.contains(&word.as_str()) {
                continue;
            }
            let next_id = vocab.len();
            let id = *vocab.entry(word).or_insert(next_id);
            *counts.entry(id).or_insert(0.0) += 1.0;
        }

        let mut vector: SparseVector = counts.into_iter().collect();
        vector.sort_by_key(|&(term, _)| term);
        let norm = vector.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|(_, w)| *w /= norm);
        }
        vectors.push(vector);
    }

    (vectors, vocab.len())
}

/// First centroid is picked by the seeded rng; each further centroid is the
/// sentence least similar to every centroid chosen so far.
fn initial_centroids(
    vectors: &[SparseVector],
    populated: &[usize],
    k: usize,
    vocab_size: usize,
    seed: u64,
) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let first = populated[rng.random_range(0..populated.len())];
    let mut centroids = vec![densify(&vectors[first], vocab_size)];

    while centroids.len() < k {
        let mut farthest = populated[0];
        let mut lowest = f32::INFINITY;
        for &i in populated {
            let closest = centroids
                .iter()
                .map(|c| similarity(&vectors[i], c))
                .fold(f32::NEG_INFINITY, f32::max);
            if closest < lowest {
                lowest = closest;
                farthest = i;
            }
        }
        centroids.push(densify(&vectors[farthest], vocab_size));
    }
    centroids
}

fn densify(vector: &SparseVector, size: usize) -> Vec<f32> {
    let mut dense = vec![0.0; size];
    for &(term, weight) in vector {
        dense[term] = weight;
    }
    dense
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

/// Index of the most similar centroid; ties go to the lowest index.
fn nearest(vector: &SparseVector, centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (topic, centroid) in centroids.iter().enumerate() {
        let score = similarity(vector, centroid);
        if score > best_score {
            best = topic;
            best_score = score;
        }
    }
    best
}

fn similarity(vector: &SparseVector, centroid: &[f32]) -> f32 {
    vector.iter().map(|&(term, w)| centroid[term] * w).sum()
}
