//! Shared test doubles for the provider seams.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chatlore::providers::{
    CompletionProvider, EmbeddingProvider, ProviderError, ProviderResult,
};

/// Scripted embedding provider: deterministic vectors, optional transient
/// failure run-up, optional payload limit, optional permanent failure.
pub struct ScriptedEmbedder {
    dimension: usize,
    transient_failures: AtomicUsize,
    permanent: bool,
    max_batch: Option<usize>,
    poison_marker: Option<String>,
    pub calls: AtomicUsize,
    pub batch_sizes: Mutex<Vec<usize>>,
}

#[allow(dead_code)]
impl ScriptedEmbedder {
    pub fn ok(dimension: usize) -> Self {
        Self {
            dimension,
            transient_failures: AtomicUsize::new(0),
            permanent: false,
            max_batch: None,
            poison_marker: None,
            calls: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
        }
    }

    /// Fails transiently `n` times before succeeding.
    pub fn transient_then_ok(dimension: usize, n: usize) -> Self {
        let mut embedder = Self::ok(dimension);
        embedder.transient_failures = AtomicUsize::new(n);
        embedder
    }

    /// Every call fails permanently.
    pub fn permanent_failure(dimension: usize) -> Self {
        let mut embedder = Self::ok(dimension);
        embedder.permanent = true;
        embedder
    }

    /// Rejects batches larger than `max_batch` with `PayloadTooLarge`.
    pub fn payload_limited(dimension: usize, max_batch: usize) -> Self {
        let mut embedder = Self::ok(dimension);
        embedder.max_batch = Some(max_batch);
        embedder
    }

    /// Fails permanently for any batch containing the marker text.
    pub fn poisoned_by(dimension: usize, marker: &str) -> Self {
        let mut embedder = Self::ok(dimension);
        embedder.poison_marker = Some(marker.to_string());
        embedder
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn recorded_batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedEmbedder {
    async fn embed(&self, texts: &[String]) -> ProviderResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().unwrap().push(texts.len());

        if self.permanent {
            return Err(ProviderError::Permanent("invalid api key".to_string()));
        }

        if let Some(marker) = &self.poison_marker {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                return Err(ProviderError::Permanent("malformed input".to_string()));
            }
        }

        if let Some(max_batch) = self.max_batch {
            if texts.len() > max_batch {
                return Err(ProviderError::PayloadTooLarge(format!(
                    "batch of {} exceeds limit {}",
                    texts.len(),
                    max_batch
                )));
            }
        }

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ProviderError::Transient("rate limited".to_string()));
        }

        Ok(texts
            .iter()
            .enumerate()
            .map(|(i, _)| vec![i as f32 * 0.01; self.dimension])
            .collect())
    }
}

/// Mock answer model that either returns a canned response or fails, and
/// records the prompts it was called with.
pub struct MockLlm {
    response: Option<String>,
    pub calls: AtomicUsize,
    pub last_prompt: Mutex<Option<(String, String)>>,
}

#[allow(dead_code)]
impl MockLlm {
    pub fn responding(response: &str) -> Self {
        Self {
            response: Some(response.to_string()),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: None,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<(String, String)> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for MockLlm {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        _max_output_tokens: u32,
    ) -> ProviderResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some((system.to_string(), user.to_string()));

        match &self.response {
            Some(response) => Ok(response.clone()),
            None => Err(ProviderError::Transient("model overloaded".to_string())),
        }
    }
}
