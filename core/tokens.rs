use crate::config::BudgetConfig;
use crate::error::{AppError, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, r50k_base};

/// A precise cost model. Implementations may fail; the estimator absorbs the failure.
pub trait CostModel: Send + Sync {
    fn name(&self) -> &str;

    fn count(&self, text: &str) -> Result<usize>;
}

pub struct BpeCostModel {
    encoding: String,
    bpe: CoreBPE,
}

impl BpeCostModel {
    /// Loads an encoding by name (`cl100k_base`, `o200k_base`, `p50k_base`, `r50k_base`)
    /// or by model name (`gpt-4o`, `gpt-3.5-turbo`, ...).
    pub fn load(encoding_or_model: &str) -> Result<Self> {
        let lower = encoding_or_model.to_ascii_lowercase();
        let loaded = match lower.as_str() {
            "cl100k_base" => cl100k_base(),
            "o200k_base" => o200k_base(),
            "p50k_base" => p50k_base(),
            "r50k_base" => r50k_base(),
            model => get_bpe_from_model(model),
        };
        let bpe = loaded.map_err(|e| {
            AppError::TikToken(format!(
                "Failed to load tokenizer '{}': {}",
                encoding_or_model, e
            ))
        })?;
        log::debug!("Loaded BPE tokenizer '{}'", lower);
        Ok(Self {
            encoding: lower,
            bpe,
        })
    }
}

impl CostModel for BpeCostModel {
    fn name(&self) -> &str {
        &self.encoding
    }

    fn count(&self, text: &str) -> Result<usize> {
        Ok(self.bpe.encode_ordinary(text).len())
    }
}

pub fn heuristic_estimate(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

#[derive(Clone)]
pub struct TokenEstimator {
    model: Option<Arc<dyn CostModel>>,
    off_thread_threshold_bytes: usize,
}

impl std::fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEstimator")
            .field("model", &self.model.as_ref().map(|m| m.name().to_string()))
            .field("off_thread_threshold_bytes", &self.off_thread_threshold_bytes)
            .finish()
    }
}

impl TokenEstimator {
    pub fn from_config(budget: &BudgetConfig) -> Self {
        let model: Option<Arc<dyn CostModel>> = match BpeCostModel::load(&budget.encoding) {
            Ok(model) => Some(Arc::new(model)),
            Err(e) => {
                log::warn!("{}. Falling back to character-based estimates.", e);
                None
            }
        };
        Self {
            model,
            off_thread_threshold_bytes: budget.off_thread_threshold_bytes,
        }
    }

    pub fn with_model(model: Arc<dyn CostModel>) -> Self {
        Self {
            model: Some(model),
            off_thread_threshold_bytes: crate::config::DEFAULT_OFF_THREAD_THRESHOLD_BYTES,
        }
    }

    pub fn heuristic_only() -> Self {
        Self {
            model: None,
            off_thread_threshold_bytes: crate::config::DEFAULT_OFF_THREAD_THRESHOLD_BYTES,
        }
    }

    pub fn with_off_thread_threshold(mut self, bytes: usize) -> Self {
        self.off_thread_threshold_bytes = bytes;
        self
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model.as_deref().map(CostModel::name)
    }

    pub fn estimate(&self, text: &str) -> usize {
        estimate_with(self.model.as_deref(), text)
    }

    /// Like [`estimate`](Self::estimate), but inputs above the configured threshold are
    /// tokenized on the blocking pool so the calling executor stays responsive.
    pub async fn estimate_off_thread(&self, text: String) -> usize {
        if text.len() < self.off_thread_threshold_bytes {
            return self.estimate(&text);
        }
        let model = self.model.clone();
        let fallback = heuristic_estimate(&text);
        match tokio::task::spawn_blocking(move || estimate_with(model.as_deref(), &text)).await {
            Ok(tokens) => tokens,
            Err(e) => {
                log::warn!(
                    "Token estimation task failed ({}); using heuristic estimate",
                    e
                );
                fallback
            }
        }
    }
}

fn estimate_with(model: Option<&dyn CostModel>, text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let Some(model) = model else {
        return heuristic_estimate(text);
    };
    let counted = panic::catch_unwind(AssertUnwindSafe(|| model.count(text))).unwrap_or_else(|_| {
        Err(AppError::TikToken(format!(
            "Tokenizer '{}' panicked on input",
            model.name()
        )))
    });
    match counted {
        Ok(tokens) => tokens,
        Err(e) => {
            log::warn!(
                "Token model '{}' failed ({}); using heuristic estimate",
                model.name(),
                e
            );
            heuristic_estimate(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl CostModel for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn count(&self, _text: &str) -> Result<usize> {
            Err(AppError::TikToken("unsupported characters".into()))
        }
    }

    struct Panicky;

    impl CostModel for Panicky {
        fn name(&self) -> &str {
            "panicky"
        }
        fn count(&self, _text: &str) -> Result<usize> {
            panic!("boom")
        }
    }

    #[test]
    fn empty_text_costs_nothing() {
        assert_eq!(TokenEstimator::heuristic_only().estimate(""), 0);
        assert_eq!(TokenEstimator::with_model(Arc::new(Broken)).estimate(""), 0);
    }

    #[test]
    fn heuristic_rounds_up_on_characters() {
        assert_eq!(heuristic_estimate("a"), 1);
        assert_eq!(heuristic_estimate("abcd"), 1);
        assert_eq!(heuristic_estimate("abcde"), 2);
        // four characters, twelve bytes
        assert_eq!(heuristic_estimate("日本語字"), 1);
    }

    #[test]
    fn failing_model_falls_back_to_heuristic() {
        let estimator = TokenEstimator::with_model(Arc::new(Broken));
        assert_eq!(estimator.estimate("abcdefgh!"), 3);
    }

    #[test]
    fn bpe_counts_tokens() {
        let estimator = TokenEstimator::from_config(&BudgetConfig::default());
        assert_eq!(estimator.model_name(), Some("cl100k_base"));
        let tokens = estimator.estimate("hello world");
        assert!(tokens >= 1 && tokens <= 3, "got {tokens}");
    }

    #[test]
    fn unknown_encoding_degrades_to_heuristic() {
        let budget = BudgetConfig {
            encoding: "no-such-encoding".into(),
            ..BudgetConfig::default()
        };
        let estimator = TokenEstimator::from_config(&budget);
        assert_eq!(estimator.model_name(), None);
        assert_eq!(estimator.estimate("abcdefgh"), 2);
    }

    #[tokio::test]
    async fn large_inputs_are_estimated_off_thread() {
        let estimator = TokenEstimator::with_model(Arc::new(Broken)).with_off_thread_threshold(4);
        let text = "x".repeat(40);
        assert_eq!(estimator.estimate_off_thread(text).await, 10);
    }

    #[test]
    fn panicking_model_never_reaches_the_caller() {
        let estimator = TokenEstimator::with_model(Arc::new(Panicky));
        assert_eq!(estimator.estimate("abcdefgh"), 2);
    }

    #[tokio::test]
    async fn panicking_model_off_thread_falls_back() {
        let estimator = TokenEstimator::with_model(Arc::new(Panicky)).with_off_thread_threshold(1);
        assert_eq!(estimator.estimate_off_thread("abcdefgh".into()).await, 2);
    }
}
