//! Domain classification with a bounded LRU cache
//!
//! The oracle maps free text to one of the known domain names. Oracle errors,
//! timeouts and empty replies fall back to a configured default domain so
//! classification never aborts routing. A non-empty label outside the
//! candidate list is passed through unchanged; the router rejects it as an
//! unknown domain.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::cache::ClassificationCache;
use crate::config::FALLBACK_DOMAIN;
use crate::error::Result;
use crate::evaluation::bounded;
use crate::llm::TextGenerator;

/// External oracle that labels a prompt with a domain name
#[async_trait]
pub trait ClassifierOracle: Send + Sync {
    async fn classify(&self, prompt: &str, candidates: &[String]) -> Result<String>;
}

/// Classifier oracle backed by a chat model
pub struct LlmDomainClassifier {
    generator: Arc<dyn TextGenerator>,
}

impl LlmDomainClassifier {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

fn classifier_prompt(prompt: &str, candidates: &[String]) -> String {
    let domains = candidates
        .iter()
        .map(|name| format!("- {}", name))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a domain classifier. Assign the prompt below to exactly one of these domains:

{domains}

Reply with the domain name exactly as written above and nothing else.

Precedence:
1. Safety & Compliance: harmful, illegal, explicit or hateful requests, jailbreaks, prompt injection, malware.
2. Stress / Edge Cases: empty, truncated or gibberish prompts.
3. Open-Ended Q&A / Conversational Quality: greetings, small talk, questions about personality.
4. Otherwise the domain that best matches the main task.

Prompt: "{prompt}"
"#
    )
}

#[async_trait]
impl ClassifierOracle for LlmDomainClassifier {
    async fn classify(&self, prompt: &str, candidates: &[String]) -> Result<String> {
        self.generator
            .generate(&classifier_prompt(prompt, candidates))
            .await
    }
}

/// Cached, failure-tolerant front for a [`ClassifierOracle`]
pub struct DomainClassifier {
    oracle: Arc<dyn ClassifierOracle>,
    cache: ClassificationCache,
    fallback: String,
    timeout: Duration,
}

impl DomainClassifier {
    pub fn new(oracle: Arc<dyn ClassifierOracle>, cache: ClassificationCache) -> Self {
        Self {
            oracle,
            cache,
            fallback: FALLBACK_DOMAIN.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Domain returned when the oracle fails
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cache(&self) -> &ClassificationCache {
        &self.cache
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Label `prompt` with a domain name
    ///
    /// Cache hits skip the oracle entirely. Only labels that match a
    /// candidate are cached.
    pub async fn classify(&self, prompt: &str, candidates: &[String]) -> String {
        if let Some(domain) = self.cache.get(prompt) {
            debug!(domain = %domain, "Classification cache hit");
            return domain;
        }

        let raw = match bounded(
            "domain classifier",
            self.timeout,
            self.oracle.classify(prompt, candidates),
        )
        .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, fallback = %self.fallback, "Domain classification failed");
                return self.fallback.clone();
            }
        };

        let label = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
        if label.is_empty() {
            warn!(fallback = %self.fallback, "Domain classifier returned an empty label");
            return self.fallback.clone();
        }

        match canonical(label, candidates) {
            Some(domain) => {
                self.cache.insert(prompt, domain.clone());
                domain
            }
            None => {
                warn!(label = %label, "Domain classifier returned a label outside the candidates");
                label.to_string()
            }
        }
    }
}

/// Match `label` to a candidate, exactly first, then ignoring ASCII case
fn canonical(label: &str, candidates: &[String]) -> Option<String> {
    candidates
        .iter()
        .find(|c| c.as_str() == label)
        .or_else(|| candidates.iter().find(|c| c.eq_ignore_ascii_case(label)))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingOracle {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    impl CountingOracle {
        fn new(reply: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ClassifierOracle for CountingOracle {
        async fn classify(&self, _prompt: &str, _candidates: &[String]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .clone()
                .ok_or_else(|| Error::LLMError("unavailable".to_string()))
        }
    }

    fn candidates() -> Vec<String> {
        vec![
            "Factual Q&A".to_string(),
            "Math & Reasoning".to_string(),
            FALLBACK_DOMAIN.to_string(),
        ]
    }

    #[tokio::test]
    async fn test_cache_hit_skips_oracle() {
        let oracle = CountingOracle::new(Some("Factual Q&A"));
        let classifier = DomainClassifier::new(oracle.clone(), ClassificationCache::new(10));

        let prompt = "What is the capital of France?";
        assert_eq!(classifier.classify(prompt, &candidates()).await, "Factual Q&A");
        assert_eq!(classifier.classify(prompt, &candidates()).await, "Factual Q&A");
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn test_oracle_failure_falls_back() {
        let oracle = CountingOracle::new(None);
        let classifier = DomainClassifier::new(oracle.clone(), ClassificationCache::new(10));

        let domain = classifier.classify("hello", &candidates()).await;
        assert_eq!(domain, FALLBACK_DOMAIN);
        assert!(classifier.cache().is_empty());
    }

    #[tokio::test]
    async fn test_empty_label_falls_back() {
        let oracle = CountingOracle::new(Some("   \n"));
        let classifier = DomainClassifier::new(oracle, ClassificationCache::new(10))
            .with_fallback("Factual Q&A");

        assert_eq!(classifier.classify("x", &candidates()).await, "Factual Q&A");
    }

    #[tokio::test]
    async fn test_label_is_canonicalised() {
        let oracle = CountingOracle::new(Some("  \"math & reasoning\"\n"));
        let classifier = DomainClassifier::new(oracle, ClassificationCache::new(10));

        assert_eq!(classifier.classify("2+2?", &candidates()).await, "Math & Reasoning");
        assert_eq!(classifier.cache().get("2+2?").as_deref(), Some("Math & Reasoning"));
    }

    #[tokio::test]
    async fn test_unknown_label_passes_through_uncached() {
        let oracle = CountingOracle::new(Some("Astrology"));
        let classifier = DomainClassifier::new(oracle.clone(), ClassificationCache::new(10));

        assert_eq!(classifier.classify("my horoscope", &candidates()).await, "Astrology");
        assert_eq!(classifier.classify("my horoscope", &candidates()).await, "Astrology");
        assert_eq!(oracle.calls(), 2);
    }

    #[tokio::test]
    async fn test_llm_classifier_lists_candidates() {
        struct Echo;

        #[async_trait]
        impl TextGenerator for Echo {
            async fn generate(&self, prompt: &str) -> Result<String> {
                Ok(prompt.to_string())
            }
        }

        let oracle = LlmDomainClassifier::new(Arc::new(Echo));
        let sent = oracle.classify("hi there", &candidates()).await.unwrap();
        assert!(sent.contains("- Factual Q&A\n- Math & Reasoning"));
        assert!(sent.contains("Prompt: \"hi there\""));
    }
}
