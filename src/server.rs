use anyhow::{anyhow, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    handler::Handler,
    http::{
        header::{self, HeaderValue},
        Method, StatusCode,
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{get, on, MethodFilter, MethodRouter},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::{
    config::Config,
    error::InsightError,
    ethereum::utils,
    insight::{self, InsightBackend, InsightServices},
};

const VERIFY_ALLOWED_METHODS: &str = "GET,OPTIONS,PATCH,DELETE,POST,PUT";
const VERIFY_ALLOWED_HEADERS: &str = "X-CSRF-Token, X-Requested-With, Accept, Accept-Version, Content-Length, Content-MD5, Content-Type, Date, X-Api-Version";

#[derive(Clone)]
pub struct AppState {
    backend: Arc<dyn InsightBackend>,
}

impl AppState {
    pub fn new(backend: Arc<dyn InsightBackend>) -> Self {
        Self { backend }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<InsightError> for ApiError {
    fn from(error: InsightError) -> Self {
        let status = match &error {
            InsightError::InvalidInput(_)
            | InsightError::UnsupportedChain(_)
            | InsightError::UnknownSelector(_)
            | InsightError::Decode(_)
            | InsightError::MissingPrecondition(_) => StatusCode::BAD_REQUEST,
            InsightError::IdentityRejected(_) => StatusCode::UNAUTHORIZED,
            InsightError::MethodNotFound(_) => StatusCode::NOT_FOUND,
            InsightError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            InsightError::FetchFailed(_)
            | InsightError::RpcCallFailed { .. }
            | InsightError::SocialGraphUnavailable(_)
            | InsightError::SummarizationFailed(_) => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            error!("{}", error);
        } else {
            warn!("{}", error);
        }
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult = std::result::Result<Json<Value>, ApiError>;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsightParams {
    wallet_address: Option<String>,
    contract_address: Option<String>,
    operator_address: Option<String>,
    input_data: Option<String>,
    chain_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenParams {
    token: Option<String>,
}

fn required<'a>(value: &'a Option<String>, name: &str) -> std::result::Result<&'a str, ApiError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("Missing required parameter: {}", name)))
}

fn required_address<'a>(value: &'a Option<String>, name: &str) -> std::result::Result<&'a str, ApiError> {
    let address = required(value, name)?;
    utils::validate_address(address)?;
    Ok(address)
}

fn required_chain_id(value: &Option<String>) -> std::result::Result<u64, ApiError> {
    Ok(utils::parse_chain_id(required(value, "chainId")?)?)
}

/// `get` also answers HEAD; HEAD is routed to the 405 handler explicitly
fn get_only_route<H, T>(handler: H) -> MethodRouter<AppState>
where
    H: Handler<T, AppState>,
    T: 'static,
{
    get(handler).head(get_only).fallback(get_only)
}

pub fn build_router(state: AppState) -> Router {
    let api_cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    let api = Router::new()
        .route("/api/lens/profile", get_only_route(lens_profile))
        .route("/api/lens/following", get_only_route(lens_following))
        .route(
            "/api/lens/approvedFollowing",
            get_only_route(lens_approved_following),
        )
        .route(
            "/api/lens/txSendFollowing",
            get_only_route(lens_tx_send_following),
        )
        .route("/api/gpt/completion", get_only_route(gpt_completion))
        .layer(api_cors);

    let verify_methods = MethodFilter::GET
        .or(MethodFilter::POST)
        .or(MethodFilter::PUT)
        .or(MethodFilter::PATCH)
        .or(MethodFilter::DELETE);
    let verify = Router::new().route(
        "/api/worldcoin/verify",
        on(verify_methods, worldcoin_verify)
            .options(preflight)
            .fallback(verify_methods_only)
            .layer(middleware::map_response(verify_cors_headers)),
    );

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .merge(verify)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn lens_profile(State(state): State<AppState>, Query(params): Query<InsightParams>) -> ApiResult {
    let wallet = required_address(&params.wallet_address, "walletAddress")?;
    let profile = state.backend.default_profile(wallet).await?;
    Ok(Json(json!({ "data": profile })))
}

async fn lens_following(State(state): State<AppState>, Query(params): Query<InsightParams>) -> ApiResult {
    let wallet = required_address(&params.wallet_address, "walletAddress")?;
    let following = state.backend.following(wallet).await?;
    Ok(Json(json!({ "data": following })))
}

async fn lens_approved_following(
    State(state): State<AppState>,
    Query(params): Query<InsightParams>,
) -> ApiResult {
    let wallet = required_address(&params.wallet_address, "walletAddress")?;
    let contract = required_address(&params.contract_address, "contractAddress")?;
    let chain_id = required_chain_id(&params.chain_id)?;
    let input = match params.operator_address {
        Some(_) => None,
        None => params
            .input_data
            .as_deref()
            .map(utils::parse_input_data)
            .transpose()?,
    };

    let backend = state.backend.as_ref();
    let operator = insight::resolve_operator(
        backend,
        chain_id,
        contract,
        params.operator_address.as_deref(),
        input.as_ref().map(|bytes| &bytes[..]),
    )
    .await?;

    let report = insight::approved_following(backend, chain_id, wallet, contract, &operator).await?;
    Ok(Json(json!({ "data": report.approved })))
}

async fn lens_tx_send_following(
    State(state): State<AppState>,
    Query(params): Query<InsightParams>,
) -> ApiResult {
    let wallet = required_address(&params.wallet_address, "walletAddress")?;
    let contract = required_address(&params.contract_address, "contractAddress")?;
    let chain_id = required_chain_id(&params.chain_id)?;

    let handles =
        insight::tx_send_following(state.backend.as_ref(), chain_id, wallet, contract).await?;
    Ok(Json(json!({ "data": handles })))
}

async fn gpt_completion(State(state): State<AppState>, Query(params): Query<InsightParams>) -> ApiResult {
    let contract = required_address(&params.contract_address, "contractAddress")?;
    let chain_id = required_chain_id(&params.chain_id)?;
    let input = utils::parse_input_data(required(&params.input_data, "inputData")?)?;

    let explanation = insight::explain_call(state.backend.as_ref(), chain_id, contract, &input).await?;
    Ok(Json(json!({ "data": explanation.text() })))
}

/// Accepts `{"token": ..}` as the body (or a JSON string of it) or `?token=`
async fn worldcoin_verify(
    State(state): State<AppState>,
    Query(query): Query<TokenParams>,
    body: Bytes,
) -> ApiResult {
    let token = match token_from_body(&body)? {
        Some(token) => token,
        None => query
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::bad_request("Missing required parameter: token"))?,
    };

    let result = state.backend.verify_identity(&token).await?;
    Ok(Json(json!({ "result": result })))
}

fn token_from_body(body: &[u8]) -> std::result::Result<Option<String>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let mut value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))?;
    if let Value::String(inner) = &value {
        value = serde_json::from_str(inner)
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))?;
    }

    let params: TokenParams = serde_json::from_value(value)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))?;
    Ok(params.token.filter(|t| !t.is_empty()))
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn verify_cors_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(VERIFY_ALLOWED_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(VERIFY_ALLOWED_HEADERS),
    );
    response
}

fn method_not_allowed(method: &Method, allow: &'static str) -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, HeaderValue::from_static(allow))],
        format!("Method {} Not Allowed", method),
    )
        .into_response()
}

async fn get_only(method: Method) -> Response {
    method_not_allowed(&method, "GET")
}

async fn verify_methods_only(method: Method) -> Response {
    method_not_allowed(&method, VERIFY_ALLOWED_METHODS)
}

pub async fn serve(config: Config) -> Result<()> {
    let services = InsightServices::new(&config)?;
    let router = build_router(AppState::new(Arc::new(services)));

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .map_err(|e| anyhow!("Failed to bind {}: {}", config.server.bind, e))?;
    info!("Listening on {}", config.server.bind);

    axum::serve(listener, router)
        .await
        .map_err(|e| anyhow!("Server error: {}", e))
}
