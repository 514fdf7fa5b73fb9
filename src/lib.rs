pub mod api;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod fallback;
pub mod llm_providers;
pub mod logging;
pub mod models;
pub mod prompt;
pub mod reading_service;
pub mod retry;

pub use catalog::{CardCatalog, CatalogError};
pub use config::Config;
pub use errors::*;
pub use fallback::FallbackReader;
pub use llm_providers::{GenerationBackend, LLMProvider, LLMProviderFactory, LLMProviderType, ProviderError};
pub use models::*;
pub use prompt::{Prompt, PromptAssembler, PromptBoilerplate};
pub use reading_service::ReadingService;
pub use retry::{ProviderAttempt, ProviderReport, ProviderVerdict, RetryPolicy};
