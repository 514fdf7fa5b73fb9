use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tarot_reading::config::ReadingConfig;
use tarot_reading::retry::AttemptDisposition;
use tarot_reading::{
    Card, Element, FallbackReader, GenerationBackend, Meanings, Prompt, Provenance, ProviderError,
    ProviderVerdict, ReadingRequest, ReadingService, ReadingType, RetryPolicy,
};

const LONG_READING: &str = "The Sun shines on your path: warmth, clarity and success are gathering around you now.";

/// Backend that replays a fixed script, then repeats its last outcome
struct ScriptedBackend {
    name: String,
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    repeat: Result<String, ProviderError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    fn new(name: &str, script: Vec<Result<String, ProviderError>>) -> Arc<Self> {
        let repeat = script
            .last()
            .cloned()
            .unwrap_or_else(|| Err(ProviderError::Network("empty script".to_string())));
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            repeat,
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn always(name: &str, outcome: Result<String, ProviderError>) -> Arc<Self> {
        Self::new(name, vec![outcome])
    }

    fn slow(name: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            repeat: Ok(LONG_READING.to_string()),
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, _prompt: &Prompt) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.repeat.clone())
    }
}

fn fast_config() -> ReadingConfig {
    ReadingConfig {
        retry: RetryPolicy {
            max_tries: 6,
            base_delay: Duration::from_millis(1),
            multiplier: 1.5,
            busy_wait_cap: Duration::from_millis(2),
            default_busy_wait: Duration::from_millis(1),
        },
        ..ReadingConfig::default()
    }
}

fn create_test_card() -> Card {
    Card {
        id: 19,
        name: "The Sun".to_string(),
        element: Element::Fire,
        keywords: vec!["positivity".to_string(), "fun".to_string(), "warmth".to_string()],
        meanings: Meanings::default(),
        description: "The Sun represents positivity, fun, warmth, and success.".to_string(),
        image: "sun.png".to_string(),
    }
}

fn rejected(status: u16) -> Result<String, ProviderError> {
    Err(ProviderError::NonRetryable {
        status,
        detail: "rejected".to_string(),
    })
}

fn busy() -> Result<String, ProviderError> {
    Err(ProviderError::ServerBusy { wait_hint: None })
}

#[tokio::test]
async fn test_no_providers_returns_fallback() {
    let service = ReadingService::new(&fast_config());
    let cards = vec![create_test_card()];

    let result = service.generate("Will I find love?", "one-card", &cards).await;

    assert_eq!(result.provenance, Provenance::Fallback);
    assert_eq!(
        result.text,
        FallbackReader.render("Will I find love?", ReadingType::OneCard, &cards)
    );
    assert!(result.reports.is_empty());
}

#[tokio::test]
async fn test_first_substantial_response_wins() {
    let first = ScriptedBackend::always("primary", Ok(LONG_READING.to_string()));
    let second = ScriptedBackend::always("secondary", Ok(LONG_READING.to_string()));
    let service = ReadingService::new(&fast_config())
        .with_backend(first.clone())
        .with_backend(second.clone());

    let result = service.generate("Q", "one-card", &[create_test_card()]).await;

    assert_eq!(result.text, LONG_READING);
    assert_eq!(result.provenance, Provenance::Provider("primary".to_string()));
    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 0);
}

#[tokio::test]
async fn test_two_rejections_then_third_provider_answers() {
    let reading = "x".repeat(80);
    let a = ScriptedBackend::always("A", rejected(401));
    let b = ScriptedBackend::always("B", rejected(400));
    let c = ScriptedBackend::always("C", Ok(reading.clone()));
    let service = ReadingService::new(&fast_config())
        .with_backend(a.clone())
        .with_backend(b.clone())
        .with_backend(c.clone());

    let result = service.generate("Q", "three-card", &[create_test_card()]).await;

    assert_eq!(result.text, reading);
    assert_eq!(result.provenance, Provenance::Provider("C".to_string()));
    assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 1));
    assert!(matches!(result.reports[0].verdict, ProviderVerdict::Rejected { .. }));
    assert!(matches!(result.reports[1].verdict, ProviderVerdict::Rejected { .. }));
    assert_eq!(result.reports[2].verdict, ProviderVerdict::Accepted);
}

#[tokio::test]
async fn test_short_response_is_not_accepted() {
    let short = ScriptedBackend::always("terse", Ok("Good luck.".to_string()));
    let service = ReadingService::new(&fast_config()).with_backend(short.clone());

    let result = service.generate("Q", "one-card", &[create_test_card()]).await;

    assert_eq!(result.provenance, Provenance::Fallback);
    assert_eq!(short.calls(), 1);
    assert_eq!(
        result.reports[0].verdict,
        ProviderVerdict::Insufficient {
            chars: 10,
            min_chars: 50
        }
    );
}

#[tokio::test]
async fn test_threshold_is_strict() {
    let exactly = ScriptedBackend::always("exact", Ok("a".repeat(50)));
    let service = ReadingService::new(&fast_config()).with_backend(exactly);
    let result = service.generate("Q", "one-card", &[create_test_card()]).await;
    assert_eq!(result.provenance, Provenance::Fallback);

    let above = ScriptedBackend::always("above", Ok("a".repeat(51)));
    let service = ReadingService::new(&fast_config()).with_backend(above);
    let result = service.generate("Q", "one-card", &[create_test_card()]).await;
    assert_eq!(result.provenance, Provenance::Provider("above".to_string()));
}

#[tokio::test]
async fn test_whitespace_does_not_count_toward_substance() {
    let padded = format!("{}{}{}", " ".repeat(40), "a".repeat(20), "\n".repeat(40));
    let backend = ScriptedBackend::always("padded", Ok(padded));
    let service = ReadingService::new(&fast_config()).with_backend(backend);

    let result = service.generate("Q", "one-card", &[create_test_card()]).await;
    assert_eq!(result.provenance, Provenance::Fallback);
}

#[tokio::test]
async fn test_always_busy_provider_is_tried_max_times() {
    let loading = ScriptedBackend::always("loading", busy());
    let service = ReadingService::new(&fast_config()).with_backend(loading.clone());
    let cards = vec![create_test_card()];

    let result = service.generate("Q", "one-card", &cards).await;

    assert_eq!(loading.calls(), 6);
    assert_eq!(result.provenance, Provenance::Fallback);
    assert_eq!(result.text, FallbackReader.render("Q", ReadingType::OneCard, &cards));

    let report = &result.reports[0];
    assert!(matches!(report.verdict, ProviderVerdict::Exhausted { .. }));
    assert_eq!(report.attempts.len(), 6);
    assert!(report.attempts[..5]
        .iter()
        .all(|a| a.disposition == AttemptDisposition::Retry));
    assert_eq!(report.attempts[5].disposition, AttemptDisposition::Exhausted);
}

#[tokio::test]
async fn test_transient_failure_then_success() {
    let flaky = ScriptedBackend::new(
        "flaky",
        vec![
            Err(ProviderError::Transient { status: 429 }),
            Err(ProviderError::Network("connection reset".to_string())),
            Ok(LONG_READING.to_string()),
        ],
    );
    let service = ReadingService::new(&fast_config()).with_backend(flaky.clone());

    let result = service.generate("Q", "one-card", &[create_test_card()]).await;

    assert_eq!(flaky.calls(), 3);
    assert_eq!(result.provenance, Provenance::Provider("flaky".to_string()));
    assert_eq!(result.reports[0].attempts.len(), 3);
    assert_eq!(result.reports[0].attempts[0].status, Some(429));
}

#[tokio::test]
async fn test_busy_then_next_provider() {
    let loading = ScriptedBackend::always("loading", busy());
    let backup = ScriptedBackend::always("backup", Ok(LONG_READING.to_string()));
    let service = ReadingService::new(&fast_config())
        .with_backend(loading.clone())
        .with_backend(backup.clone());

    let result = service.generate("Q", "celtic-cross", &[create_test_card()]).await;

    assert_eq!(loading.calls(), 6);
    assert_eq!(backup.calls(), 1);
    assert_eq!(result.provenance, Provenance::Provider("backup".to_string()));
}

#[tokio::test]
async fn test_unconfigured_providers_are_skipped() {
    let backend = ScriptedBackend::always("HuggingFace", Ok(LONG_READING.to_string()));
    let service = ReadingService::new(&fast_config())
        .with_unconfigured("OpenAI")
        .with_unconfigured("Gemini")
        .with_backend(backend.clone());

    let result = service.generate("Q", "one-card", &[create_test_card()]).await;

    assert_eq!(service.configured_providers(), vec!["HuggingFace".to_string()]);
    assert_eq!(result.provenance, Provenance::Provider("HuggingFace".to_string()));
    assert_eq!(result.reports[0].verdict, ProviderVerdict::NotConfigured);
    assert_eq!(result.reports[1].verdict, ProviderVerdict::NotConfigured);
    assert!(result.reports[0].attempts.is_empty());
}

#[tokio::test]
async fn test_deadline_returns_fallback() {
    let slow = ScriptedBackend::slow("slow", Duration::from_secs(30));
    let config = ReadingConfig {
        deadline: Some(Duration::from_millis(50)),
        ..fast_config()
    };
    let service = ReadingService::new(&config).with_backend(slow.clone());

    let result = service.generate("Q", "one-card", &[create_test_card()]).await;

    assert_eq!(slow.calls(), 1);
    assert_eq!(result.provenance, Provenance::Fallback);
    assert_eq!(result.reports[0].verdict, ProviderVerdict::DeadlineExceeded);
}

#[tokio::test]
async fn test_every_reading_type_yields_text() {
    let service = ReadingService::new(&fast_config())
        .with_backend(ScriptedBackend::always("down", Err(ProviderError::Transient { status: 502 })));

    for reading_type in ["one-card", "three-card", "celtic-cross", "mystery", ""] {
        let result = service.generate("", reading_type, &[create_test_card()]).await;
        assert!(!result.text.trim().is_empty());
        assert_eq!(result.provenance, Provenance::Fallback);
    }
}

#[tokio::test]
async fn test_generate_reading_from_request() {
    let backend = ScriptedBackend::always("primary", Ok(LONG_READING.to_string()));
    let service = ReadingService::new(&fast_config()).with_backend(backend);
    let request = ReadingRequest::new("Career?", "3-card", vec![create_test_card()]);

    assert_eq!(request.reading_type, ReadingType::ThreeCard);
    let result = service.generate_reading(&request).await;
    assert_eq!(result.text, LONG_READING);
}
