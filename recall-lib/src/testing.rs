//! Deterministic collaborator fakes for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::candidate::{Candidate, Metadata};
use crate::error::Collaborator;
use crate::expand::TextGenerator;
use crate::index::{IndexHit, VectorIndex};
use crate::rerank::RelevanceScorer;
use crate::{Error, Result};

pub fn hit(doc_id: &str, distance: f32) -> IndexHit {
    IndexHit {
        doc_id: doc_id.to_string(),
        text: format!("text of {doc_id}"),
        metadata: Metadata::new(),
        distance,
    }
}

pub fn candidate(doc_id: &str, distance: f32) -> Candidate {
    Candidate::new(doc_id, format!("text of {doc_id}"), distance)
}

/// Index that answers from a fixed table keyed by query text.
#[derive(Default)]
pub struct FakeIndex {
    hits: HashMap<String, Vec<IndexHit>>,
    failing: HashSet<String>,
    fail_all: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hits(mut self, text: &str, hits: Vec<IndexHit>) -> Self {
        self.hits.insert(text.to_string(), hits);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_all = true;
        self
    }

    pub fn failing_for(mut self, text: &str) -> Self {
        self.failing.insert(text.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of searches observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for FakeIndex {
    async fn search_nearest(&self, text: &str, k: usize) -> Result<Vec<IndexHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.fail_all || self.failing.contains(text) {
            return Err(Error::unavailable(Collaborator::VectorIndex, "index offline"));
        }

        let mut hits = self.hits.get(text).cloned().unwrap_or_default();
        hits.truncate(k);
        Ok(hits)
    }
}

/// Scorer that looks scores up by document text.
#[derive(Default)]
pub struct FakeScorer {
    scores: HashMap<String, f32>,
    fail: bool,
    drop_last: bool,
    calls: AtomicUsize,
}

impl FakeScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score the document `text of {doc_id}` with `score`.
    pub fn with_score(mut self, doc_id: &str, score: f32) -> Self {
        self.scores.insert(format!("text of {doc_id}"), score);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Return one score fewer than requested.
    pub fn short(mut self) -> Self {
        self.drop_last = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelevanceScorer for FakeScorer {
    async fn score(&self, _query: &str, documents: &[&str]) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::unavailable(Collaborator::RelevanceScorer, "model unavailable"));
        }

        let mut scores: Vec<f32> = documents
            .iter()
            .map(|doc| self.scores.get(*doc).copied().unwrap_or(0.0))
            .collect();
        if self.drop_last {
            scores.pop();
        }
        Ok(scores)
    }
}

type Reply = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Generator that answers every prompt through a closure and records prompts.
pub struct FakeGenerator {
    reply: Reply,
    prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn replying_with(reply: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            reply: Box::new(reply),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::replying_with(move |_| Ok(text.clone()))
    }

    pub fn failing() -> Self {
        Self::replying_with(|_| Err(Error::unavailable(Collaborator::TextGenerator, "timeout")))
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.reply)(prompt)
    }
}
