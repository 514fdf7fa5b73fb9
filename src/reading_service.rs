use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::config::{ProvidersConfig, ReadingConfig};
use crate::fallback::FallbackReader;
use crate::llm_providers::{GenerationBackend, LLMProviderFactory, ProviderError};
use crate::models::{Card, Provenance, ReadingRequest, ReadingResult, ReadingType};
use crate::prompt::{Prompt, PromptAssembler};
use crate::retry::{run_with_retry, ProviderReport, ProviderVerdict, RetryPolicy};

// Import logging macros
use crate::{log_chain_event, log_performance};

#[derive(Clone)]
enum ChainEntry {
    Configured(Arc<dyn GenerationBackend>),
    Unconfigured(String),
}

/// Ordered provider chain with a deterministic fallback. `generate` never fails.
#[derive(Clone)]
pub struct ReadingService {
    chain: Vec<ChainEntry>,
    assembler: PromptAssembler,
    fallback: FallbackReader,
    retry: RetryPolicy,
    min_reading_chars: usize,
    deadline: Option<Duration>,
}

impl ReadingService {
    /// Empty chain; add backends with `with_backend`
    pub fn new(reading: &ReadingConfig) -> Self {
        Self {
            chain: Vec::new(),
            assembler: PromptAssembler::new(reading.boilerplate.clone()),
            fallback: FallbackReader,
            retry: reading.retry.clone(),
            min_reading_chars: reading.min_reading_chars,
            deadline: reading.deadline,
        }
    }

    /// Build the chain in configured order; providers without a key are kept as skipped entries
    pub fn from_config(providers: &ProvidersConfig, reading: &ReadingConfig) -> Self {
        let mut service = Self::new(reading);

        for credentials in providers.chain() {
            match &credentials.api_key {
                Some(api_key) => {
                    let provider = LLMProviderFactory::create_provider(
                        credentials.provider_type,
                        api_key.clone(),
                        credentials.base_url.clone(),
                        credentials.model.clone(),
                        reading.request,
                    );
                    service = service.with_backend(Arc::new(provider));
                }
                None => {
                    service = service.with_unconfigured(credentials.provider_type.name());
                }
            }
        }

        service
    }

    pub fn with_backend(mut self, backend: Arc<dyn GenerationBackend>) -> Self {
        self.chain.push(ChainEntry::Configured(backend));
        self
    }

    pub fn with_unconfigured(mut self, name: &str) -> Self {
        self.chain.push(ChainEntry::Unconfigured(name.to_string()));
        self
    }

    /// Names of providers that will actually be called, in order
    pub fn configured_providers(&self) -> Vec<String> {
        self.chain
            .iter()
            .filter_map(|entry| match entry {
                ChainEntry::Configured(backend) => Some(backend.name().to_string()),
                ChainEntry::Unconfigured(_) => None,
            })
            .collect()
    }

    pub async fn generate_reading(&self, request: &ReadingRequest) -> ReadingResult {
        self.run(&request.question, request.reading_type, &request.cards)
            .await
    }

    pub async fn generate(&self, question: &str, reading_type: &str, cards: &[Card]) -> ReadingResult {
        self.run(question, ReadingType::parse(reading_type), cards)
            .await
    }

    async fn run(&self, question: &str, reading_type: ReadingType, cards: &[Card]) -> ReadingResult {
        let span = info_span!(
            "reading",
            reading_id = %Uuid::new_v4(),
            reading_type = %reading_type,
            card_count = cards.len()
        );
        self.run_inner(question, reading_type, cards)
            .instrument(span)
            .await
    }

    async fn run_inner(&self, question: &str, reading_type: ReadingType, cards: &[Card]) -> ReadingResult {
        let started = Instant::now();
        let prompt = self.assembler.assemble(question, reading_type, cards);
        let mut reports = Vec::with_capacity(self.chain.len());

        let accepted = match self.deadline {
            Some(deadline) => {
                tokio::time::timeout(deadline, self.run_chain(&prompt, &mut reports))
                    .await
                    .unwrap_or(None)
            }
            None => self.run_chain(&prompt, &mut reports).await,
        };

        let result = match accepted {
            Some((provider, text)) => ReadingResult {
                text,
                provenance: Provenance::Provider(provider),
                reports,
            },
            None => {
                log_chain_event!(fallback, fallback_reason(&reports));
                ReadingResult {
                    text: self.fallback.render(question, reading_type, cards),
                    provenance: Provenance::Fallback,
                    reports,
                }
            }
        };

        log_performance!("generate_reading", duration_ms = started.elapsed().as_millis() as u64);
        result
    }

    /// Try each configured provider in order; returns the first substantial response.
    ///
    /// A report is pushed before each provider runs so a deadline that cuts the
    /// chain short leaves it marked `DeadlineExceeded`.
    async fn run_chain(
        &self,
        prompt: &Prompt,
        reports: &mut Vec<ProviderReport>,
    ) -> Option<(String, String)> {
        for entry in &self.chain {
            let backend = match entry {
                ChainEntry::Configured(backend) => backend,
                ChainEntry::Unconfigured(name) => {
                    log_chain_event!(skip, provider = name);
                    reports.push(ProviderReport::skipped(name));
                    continue;
                }
            };

            let name = backend.name().to_string();
            let index = reports.len();
            reports.push(ProviderReport {
                provider: name.clone(),
                attempts: Vec::new(),
                verdict: ProviderVerdict::DeadlineExceeded,
            });

            let result =
                run_with_retry(backend.as_ref(), prompt, &self.retry, &mut reports[index].attempts)
                    .await;

            let verdict = match result {
                Ok(text) => {
                    let text = text.trim();
                    let chars = text.chars().count();
                    if chars > self.min_reading_chars {
                        log_chain_event!(accepted, provider = name, chars = chars);
                        reports[index].verdict = ProviderVerdict::Accepted;
                        return Some((name, text.to_string()));
                    }
                    log_chain_event!(
                        insufficient,
                        provider = name,
                        chars = chars,
                        min_chars = self.min_reading_chars
                    );
                    ProviderVerdict::Insufficient {
                        chars,
                        min_chars: self.min_reading_chars,
                    }
                }
                Err(error @ ProviderError::NonRetryable { .. }) => ProviderVerdict::Rejected {
                    reason: error.to_string(),
                },
                Err(error) => ProviderVerdict::Exhausted {
                    reason: error.to_string(),
                },
            };
            reports[index].verdict = verdict;
        }

        None
    }
}

fn fallback_reason(reports: &[ProviderReport]) -> &'static str {
    if reports
        .iter()
        .any(|r| r.verdict == ProviderVerdict::DeadlineExceeded)
    {
        "deadline exceeded"
    } else if reports
        .iter()
        .all(|r| r.verdict == ProviderVerdict::NotConfigured)
    {
        "no providers configured"
    } else {
        "all providers exhausted"
    }
}
