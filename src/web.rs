//! HTTP surface: recommendation and keyword search endpoints, health and
//! stats probes, and pass-through proxies to the personalized
//! recommendation backend.

use crate::app::{AppContext, AppError};
use crate::keyword_search::KeywordSearchError;
use crate::recommend::{Candidate, RecommendError};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

async fn start_app(ctx: Arc<AppContext>) {
    async fn shutdown_signal() {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    let addr = format!("{}:{}", ctx.config.host, ctx.config.port);
    let app = router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    log::info!("listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}

pub fn start_daemon(ctx: Arc<AppContext>) {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async { start_app(ctx).await });
}

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/api/v1/reviews/tags/recommend", post(recommend))
        .route("/api/v1/keywordSearch", post(keyword_search))
        .route("/api/v1/recommendations/:kind", post(proxy_recommendations))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(ctx)
}

// Make our own error that wraps `AppError`.
#[derive(Debug)]
struct HttpError(AppError);

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            AppError::NotReady(_) => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidRequest(_) => axum::http::StatusCode::BAD_REQUEST,
            AppError::Recommend(RecommendError::NotReady) => {
                axum::http::StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::KeywordSearch(KeywordSearchError::NotReady) => {
                axum::http::StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Recommend(_) | AppError::KeywordSearch(_) | AppError::Other(_) => {
                log::error!("{self:?}");
                axum::http::StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Upstream(_) => {
                log::error!("{self:?}");
                axum::http::StatusCode::BAD_GATEWAY
            }
        };
        (status, json!({"error": self.0.to_string()}).to_string()).into_response()
    }
}

// This enables using `?` on functions that return `Result<_, RecommendError>`
// and friends to turn them into `Result<_, HttpError>`.
impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Scores cross the wire rounded to 4 decimals.
fn round4(value: f32) -> f32 {
    (value * 10_000.0).round() / 10_000.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendRequest {
    #[serde(default)]
    pub title: String,
    /// Optional; a title-only request is valid and yields no candidates
    #[serde(default)]
    pub content: String,
    pub count: Option<usize>,
    pub max_content_length: Option<usize>,
    pub use_dual: Option<bool>,
    pub use_hybrid: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct RecommendedTag {
    pub hashtag_id: u64,
    pub hashtag: String,
    pub similarity_score: f32,
    pub source: String,
}

#[derive(Debug, Serialize)]
pub struct RecommendResponse {
    pub success: bool,
    pub hashtags: Vec<RecommendedTag>,
    pub total_count: usize,
    pub message: String,
}

impl From<Candidate> for RecommendedTag {
    fn from(candidate: Candidate) -> Self {
        Self {
            hashtag_id: candidate.tag_id,
            hashtag: candidate.tag_text,
            similarity_score: round4(candidate.score),
            source: candidate.source,
        }
    }
}

async fn recommend(
    State(ctx): State<Arc<AppContext>>,
    Json(payload): Json<RecommendRequest>,
) -> Result<axum::Json<RecommendResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    let rec = &ctx.config.recommend;
    let count = payload.count.unwrap_or(rec.default_count);
    if count == 0 || count > rec.max_count {
        return Err(HttpError(AppError::InvalidRequest(format!(
            "count must be between 1 and {}",
            rec.max_count
        ))));
    }
    let max_content_length = payload
        .max_content_length
        .unwrap_or(rec.default_max_content_length);

    // use_hybrid forces the single-pass strategy regardless of use_dual
    let use_dual = payload.use_dual.unwrap_or(true) && !payload.use_hybrid.unwrap_or(false);

    let candidates = tokio::task::block_in_place(|| {
        if use_dual {
            ctx.recommender
                .recommend_dual(&payload.title, &payload.content, count, max_content_length)
        } else {
            ctx.recommender
                .recommend(&payload.title, &payload.content, count, max_content_length)
        }
    })?;

    let hashtags: Vec<RecommendedTag> =
        candidates.into_iter().map(RecommendedTag::from).collect();
    Ok(axum::Json(RecommendResponse {
        success: true,
        total_count: hashtags.len(),
        hashtags,
        message: "hashtag recommendation completed".to_string(),
    }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeywordSearchRequest {
    pub query: String,
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct KeywordSearchResult {
    /// Serialized camelCase; the consuming service binds `keywordId`
    #[serde(rename = "keywordId")]
    pub keyword_id: u64,
    pub score: f32,
    pub rank: usize,
}

#[derive(Debug, Serialize)]
pub struct KeywordSearchResponse {
    pub success: bool,
    pub query: String,
    pub results: Vec<KeywordSearchResult>,
    pub count: usize,
    pub message: String,
}

async fn keyword_search(
    State(ctx): State<Arc<AppContext>>,
    Json(payload): Json<KeywordSearchRequest>,
) -> Result<axum::Json<KeywordSearchResponse>, HttpError> {
    let service = ctx
        .keyword_search
        .as_ref()
        .ok_or(HttpError(AppError::NotReady("keyword search unavailable")))?;

    let cfg = &ctx.config.keyword_search;
    let top_k = payload.top_k.unwrap_or(cfg.default_top_k);
    if top_k == 0 || top_k > cfg.max_top_k {
        return Err(HttpError(AppError::InvalidRequest(format!(
            "top_k must be between 1 and {}",
            cfg.max_top_k
        ))));
    }

    let hits = tokio::task::block_in_place(|| service.search(&payload.query, top_k))?;

    let results: Vec<KeywordSearchResult> = hits
        .into_iter()
        .map(|hit| KeywordSearchResult {
            keyword_id: hit.keyword_id,
            score: round4(hit.score),
            rank: hit.rank,
        })
        .collect();
    Ok(axum::Json(KeywordSearchResponse {
        success: true,
        query: payload.query,
        count: results.len(),
        results,
        message: "keyword search completed".to_string(),
    }))
}

async fn index() -> axum::Json<serde_json::Value> {
    axum::Json(json!({
        "service": "tagrec",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "recommend": "POST /api/v1/reviews/tags/recommend",
            "keyword_search": "POST /api/v1/keywordSearch",
            "health": "GET /health",
            "stats": "GET /stats",
        },
    }))
}

async fn health(State(ctx): State<Arc<AppContext>>) -> axum::Json<serde_json::Value> {
    let recommend_ready = ctx.recommender.is_ready();
    let keyword_ready = ctx
        .keyword_search
        .as_ref()
        .map(|s| s.is_ready())
        .unwrap_or(false);

    let status = if recommend_ready && keyword_ready {
        "healthy"
    } else if recommend_ready {
        "partial"
    } else {
        "unhealthy"
    };

    axum::Json(json!({
        "status": status,
        "recommend": {
            "ready": recommend_ready,
            "tags": ctx.recommender.catalog().len(),
            "model": ctx.recommender.model_name(),
        },
        "keyword_search": {
            "ready": keyword_ready,
            "keywords": ctx.keyword_search.as_ref().map(|s| s.index().len()).unwrap_or(0),
            "model": ctx
                .keyword_search
                .as_ref()
                .map(|s| s.model_name().to_string())
                .unwrap_or_else(|| ctx.config.keyword_search.model.clone()),
        },
    }))
}

async fn stats(State(ctx): State<Arc<AppContext>>) -> axum::Json<serde_json::Value> {
    axum::Json(json!({
        "tags": ctx.recommender.catalog().len(),
        "dimensions": ctx.recommender.dimensions(),
        "clusters": ctx.recommender.clusters().map(|c| c.len()).unwrap_or(0),
        "cluster_members": ctx.recommender.clusters().map(|c| c.member_count()).unwrap_or(0),
        "keywords": ctx.keyword_search.as_ref().map(|s| s.index().len()).unwrap_or(0),
        "defaults": {
            "count": ctx.config.recommend.default_count,
            "max_content_length": ctx.config.recommend.default_max_content_length,
            "min_similarity": ctx.config.recommend.min_similarity,
            "top_k": ctx.config.keyword_search.default_top_k,
        },
    }))
}

/// Forwards the JSON body unchanged to the configured recommendation
/// backend. Only the known endpoint kinds are accepted.
async fn proxy_recommendations(
    State(ctx): State<Arc<AppContext>>,
    Path(kind): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Result<impl IntoResponse, HttpError> {
    if !matches!(kind.as_str(), "user" | "new_user" | "feed") {
        return Err(HttpError(AppError::InvalidRequest(format!(
            "unknown recommendation endpoint '{kind}'"
        ))));
    }

    let base = ctx
        .config
        .backend_url
        .as_deref()
        .ok_or(HttpError(AppError::NotReady("no recommendation backend configured")))?;

    let url = format!(
        "{}/api/v1/recommendations/{kind}",
        base.trim_end_matches('/')
    );
    let upstream = ctx.http.post(&url).json(&payload).send().await?;

    let status = axum::http::StatusCode::from_u16(upstream.status().as_u16())
        .unwrap_or(axum::http::StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = upstream.json().await?;
    Ok((status, axum::Json(body)))
}
