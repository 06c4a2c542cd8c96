use std::net::SocketAddr;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::engine::Engine;
use crate::error::FisoError;
use crate::types::{
    ApprovedPool, CampaignDetails, CampaignDraft, DelegationSnapshot, EpochTotalStake,
    FisoCampaign, FisoRewardInfo, PoolInfoBundle,
};

#[derive(Clone)]
struct ApiState {
    config: Config,
    engine: Engine,
}

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<FisoError> for ApiError {
    fn from(error: FisoError) -> Self {
        let status = match &error {
            FisoError::NotFound(_) => StatusCode::NOT_FOUND,
            FisoError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            FisoError::Upstream(_) | FisoError::InvalidData(_) | FisoError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            warn!("request failed: {error}");
        }
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody {
            ok: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Deserialize)]
struct RewardsQuery {
    account: Option<String>,
    epoch: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TotalsQuery {
    epoch: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PoolsRequest {
    #[serde(default)]
    ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApprovedPoolsRequest {
    #[serde(default)]
    pools: Vec<ApprovedPool>,
}

#[derive(Debug, Deserialize)]
struct EpochsRequest {
    start_epoch: u64,
    end_epoch: u64,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct TotalsResponse {
    fiso_id: i64,
    totals: Vec<EpochTotalStake>,
}

pub fn router(config: Config, engine: Engine) -> Router {
    let state = ApiState { config, engine };
    Router::new()
        .route("/health", get(health))
        .route("/v1/fiso", post(create_campaign))
        .route("/v1/fiso/:id", get(get_campaign))
        .route("/v1/fiso/:id/rewards", get(rewards))
        .route("/v1/fiso/:id/totals", get(totals))
        .route("/v1/fiso/:id/pools", put(set_pools))
        .route("/v1/fiso/:id/epochs", put(set_epochs))
        .route("/v1/pools", post(pools))
        .route("/v1/accounts/:address", get(account))
        .route("/v1/config", get(show_config))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(config: Config, engine: Engine, bind: SocketAddr) -> Result<()> {
    let app = router(config, engine);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("REST API listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<ApiResponse<HealthResponse>> {
    ok(HealthResponse { status: "ok" })
}

async fn show_config(State(state): State<ApiState>) -> Json<ApiResponse<Config>> {
    ok(state.config)
}

async fn rewards(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(query): Query<RewardsQuery>,
) -> ApiResult<FisoRewardInfo> {
    let account = query
        .account
        .filter(|account| !account.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("query parameter `account` is required"))?;
    let info = state
        .engine
        .rewards
        .reward_info(id, &account, query.epoch)
        .await?;
    Ok(ok(info))
}

async fn totals(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(query): Query<TotalsQuery>,
) -> ApiResult<TotalsResponse> {
    let totals = state.engine.epoch_totals(id, query.epoch).await?;
    Ok(ok(TotalsResponse { fiso_id: id, totals }))
}

async fn pools(
    State(state): State<ApiState>,
    Json(request): Json<PoolsRequest>,
) -> ApiResult<PoolInfoBundle> {
    if request.ids.iter().all(|id| id.trim().is_empty()) {
        return Err(ApiError::bad_request("at least one pool id is required"));
    }
    Ok(ok(state.engine.pools.pool_info(request.ids.as_slice()).await?))
}

async fn account(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> ApiResult<DelegationSnapshot> {
    Ok(ok(state.engine.account_snapshot(&address).await?))
}

async fn create_campaign(
    State(state): State<ApiState>,
    Json(draft): Json<CampaignDraft>,
) -> ApiResult<FisoCampaign> {
    Ok(ok(state.engine.campaigns.create_campaign(&draft)?))
}

async fn get_campaign(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<CampaignDetails> {
    Ok(ok(state.engine.campaigns.get_campaign(id)?))
}

async fn set_pools(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(request): Json<ApprovedPoolsRequest>,
) -> ApiResult<CampaignDetails> {
    Ok(ok(state
        .engine
        .campaigns
        .set_approved_pools(id, &request.pools)?))
}

async fn set_epochs(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(request): Json<EpochsRequest>,
) -> ApiResult<CampaignDetails> {
    Ok(ok(state.engine.campaigns.update_campaign_epochs(
        id,
        request.start_epoch,
        request.end_epoch,
    )?))
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { ok: true, data })
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    use crate::config::Config;
    use crate::engine::tests::seeded_engine;
    use crate::error::FisoError;
    use crate::indexer::IndexerError;
    use crate::server::{router, ApiError};

    async fn spawn_server() -> String {
        let (engine, _, _) = seeded_engine();
        let app = router(Config::default(), engine);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        format!("http://{addr}")
    }

    #[test]
    fn maps_errors_to_statuses() {
        let cases = [
            (FisoError::not_found("FISO campaign 7"), StatusCode::NOT_FOUND),
            (
                FisoError::InvalidInput("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                FisoError::Upstream(IndexerError::Status {
                    url: "/epochs/latest".to_string(),
                    status: 503,
                    body: String::new(),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status, status);
        }
    }

    #[tokio::test]
    async fn serves_rewards_and_totals() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let body: Value = client
            .get(format!("{base}/v1/fiso/1/rewards?account=stake1u&epoch=105"))
            .send()
            .await
            .expect("request")
            .json()
            .await
            .expect("json");
        assert_eq!(body["ok"], json!(true));
        assert_eq!(body["data"]["token_ticker"], json!("DEMO"));
        let earned = body["data"]["user_earned"].as_f64().expect("earned");
        assert!((earned - 100.0).abs() < 1e-9);

        let body: Value = client
            .get(format!("{base}/v1/fiso/1/totals?epoch=105"))
            .send()
            .await
            .expect("request")
            .json()
            .await
            .expect("json");
        assert_eq!(body["data"]["totals"].as_array().map(Vec::len), Some(5));
    }

    #[tokio::test]
    async fn reports_missing_campaign_and_bad_input() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let response = client
            .get(format!("{base}/v1/fiso/99/rewards?account=stake1u&epoch=105"))
            .send()
            .await
            .expect("request");
        assert_eq!(response.status().as_u16(), 404);
        let body: Value = response.json().await.expect("json");
        assert_eq!(body["ok"], json!(false));

        let response = client
            .get(format!("{base}/v1/fiso/1/rewards"))
            .send()
            .await
            .expect("request");
        assert_eq!(response.status().as_u16(), 400);

        let response = client
            .get(format!("{base}/v1/fiso/1/rewards?account=stake1u&epoch=999"))
            .send()
            .await
            .expect("request");
        assert_eq!(response.status().as_u16(), 400);

        let response = client
            .put(format!("{base}/v1/fiso/1/epochs"))
            .json(&json!({ "start_epoch": 10, "end_epoch": 5 }))
            .send()
            .await
            .expect("request");
        assert_eq!(response.status().as_u16(), 400);
    }
}
