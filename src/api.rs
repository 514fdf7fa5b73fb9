use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    api_error,
    catalog::CardCatalog,
    models::{Card, Provenance, ReadingType},
    reading_service::ReadingService,
};

// Import logging macros
use crate::{log_api_start, log_api_success, log_api_warn};

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CardCatalog>,
    pub reading_service: Arc<ReadingService>,
}

#[derive(Debug, Deserialize)]
pub struct ReadingPayload {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub selected_cards: Vec<i64>,
    #[serde(default)]
    pub reading_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReadingResponse {
    pub success: bool,
    pub reading: String,
    pub cards: Vec<Card>,
    pub provenance: Provenance,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub card_count: usize,
    pub providers: Vec<String>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiResponse<()>>)>;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/get_reading", post(get_reading))
        .route("/get_card/:card_id", get(get_card))
        .route("/api/cards", get(list_cards))
        .route("/api/health", get(health))
        .with_state(state)
}

pub async fn get_reading(
    State(state): State<AppState>,
    Json(payload): Json<ReadingPayload>,
) -> ApiResult<ReadingResponse> {
    let reading_type = ReadingType::parse(payload.reading_type.as_deref().unwrap_or_default());
    log_api_start!(
        "get_reading",
        reading_type = reading_type,
        card_count = payload.selected_cards.len()
    );

    if payload.selected_cards.is_empty() {
        return Err(api_error!(validation, "get_reading", "reading", "No cards selected"));
    }

    let cards = state.catalog.select(&payload.selected_cards);
    if cards.is_empty() {
        return Err(api_error!(validation, "get_reading", "reading", "Invalid card selection"));
    }

    if cards.len() != reading_type.expected_cards() {
        log_api_warn!(
            "get_reading",
            format!(
                "{} spread laid out with {} cards (expected {})",
                reading_type,
                cards.len(),
                reading_type.expected_cards()
            )
        );
    }

    let result = state
        .reading_service
        .generate(&payload.question, reading_type.as_str(), &cards)
        .await;

    log_api_success!("get_reading", provenance = result.provenance, "reading generated");

    Ok(Json(ReadingResponse {
        success: true,
        reading: result.text,
        cards,
        provenance: result.provenance,
    }))
}

pub async fn get_card(
    State(state): State<AppState>,
    Path(card_id): Path<i64>,
) -> ApiResult<Card> {
    log_api_start!("get_card", card_id = card_id);

    match u32::try_from(card_id).ok().and_then(|id| state.catalog.get(id)) {
        Some(card) => {
            log_api_success!("get_card", card_id = card_id, "card returned");
            Ok(Json(card.clone()))
        }
        None => {
            log_api_warn!("get_card", card_id = card_id, "card not found");
            Err(api_error!(not_found, "get_card", "card", card_id))
        }
    }
}

pub async fn list_cards(State(state): State<AppState>) -> Json<ApiResponse<Vec<Card>>> {
    log_api_start!("list_cards");
    let cards = state.catalog.all().to_vec();
    log_api_success!("list_cards", count = cards.len(), "catalog returned");
    Json(ApiResponse::success(cards))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        card_count: state.catalog.len(),
        providers: state.reading_service.configured_providers(),
    })
}
