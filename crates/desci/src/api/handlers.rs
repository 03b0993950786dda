//! Request handlers.
//!
//! Experiment reads fall back to the mock catalog and experiment writes fall
//! back to simulated receipts in development. Dataset and portfolio routes
//! have no fallback and report an unreachable chain as 503.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::model::{NewDataset, NewExperiment};
use crate::units::{Address, Wei};

use super::fallback;
use super::views::{
    AccessView, CitationsView, DatasetView, ExperimentView, NftsView, PortfolioView, TokenView,
    TxResponse,
};
use super::{ApiError, ApiJson, AppState};

/// Funding period used when a create request names none.
pub const DEFAULT_DURATION_DAYS: u32 = 30;

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

// === Request bodies ===

/// Body of `POST /api/experiments/create`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExperimentRequest {
    /// Short title.
    pub title: Option<String>,
    /// What the experiment is about.
    pub description: Option<String>,
    /// Goal in ether, as a decimal string or number.
    pub funding_goal: Option<Value>,
    /// Length of the funding period.
    pub duration_days: Option<u32>,
    /// Sending account; the first provider account when absent.
    pub from: Option<Address>,
}

/// Body of `POST /api/experiments/{id}/fund` and `POST /api/datasets/{id}/purchase`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// Amount in ether, as a decimal string or number.
    pub amount: Option<Value>,
    /// Sending account.
    pub from: Option<Address>,
}

/// Body of `POST /api/datasets/upload`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDatasetRequest {
    /// Experiment the dataset belongs to.
    pub experiment_id: u64,
    /// Short title.
    pub title: String,
    /// Description of the data.
    #[serde(default)]
    pub description: String,
    /// Where the data lives.
    pub data_uri: String,
    /// Price of read access in ether; free when absent.
    pub access_price: Option<Value>,
    /// Anyone may read the data.
    #[serde(default)]
    pub is_open_access: bool,
    /// Sending account.
    pub from: Option<Address>,
}

/// Body of `POST /api/datasets/{id}/nftize`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftizeRequest {
    /// Metadata URI of the token.
    pub token_uri: String,
    /// Sending account.
    pub from: Option<Address>,
}

/// Body of `POST /api/datasets/{id}/cite`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiteRequest {
    /// The dataset being cited by the one in the path.
    pub cited_id: u64,
    /// Sending account.
    pub from: Option<Address>,
}

// === Health and provider ===

/// `GET /api/health`
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let network = state.chain.network().await;

    let mut body = json!({
        "status": "ok",
        "timestamp": Utc::now(),
        "environment": state.environment,
        "provider": state.chain.name(),
        "blockchainConnected": network.is_ok(),
    });
    if let Ok(network) = network {
        body["network"] = json!(network.name);
        body["chainId"] = json!(network.chain_id);
        body["blockNumber"] = json!(network.block_number);
        body["contractAddress"] = json!(network.contract_address);
    }
    Json(body)
}

/// `GET /api/accounts`
pub async fn accounts(State(state): State<AppState>) -> ApiResult<Value> {
    let accounts = state.chain.accounts().await?;
    Ok(Json(json!({ "accounts": accounts })))
}

// === Experiments ===

/// `GET /api/experiments`
pub async fn list_experiments(State(state): State<AppState>) -> Json<Vec<ExperimentView>> {
    match chain_experiments(&state).await {
        Ok(views) => Json(views.into_iter().map(fallback::enrich).collect()),
        Err(err) => {
            warn!("Listing experiments from the chain failed, serving catalog: {}", err);
            Json(fallback::catalog())
        }
    }
}

/// `GET /api/experiments/{id}`
pub async fn get_experiment(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<ExperimentView> {
    match chain_experiment(&state, id).await {
        Ok(view) => Ok(Json(fallback::enrich(view))),
        Err(err) => {
            if !err.is_not_found() {
                warn!("Reading experiment {} from the chain failed: {}", id, err);
            }
            fallback::catalog_entry(id)
                .map(Json)
                .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "experiment not found"))
        }
    }
}

/// `POST /api/experiments/create`
pub async fn create_experiment(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateExperimentRequest>,
) -> ApiResult<TxResponse> {
    let (Some(title), Some(description), Some(goal)) = (
        non_empty(body.title),
        non_empty(body.description),
        present(body.funding_goal),
    ) else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "missing required fields: title, description, fundingGoal",
        ));
    };

    let args = NewExperiment {
        title,
        description,
        funding_goal: parse_amount("fundingGoal", &goal)?,
        duration_days: body.duration_days.unwrap_or(DEFAULT_DURATION_DAYS),
    };

    let result = submit_create(&state, body.from, args).await;
    settle(&state, "createExperiment", body.from, result)
}

/// `POST /api/experiments/{id}/fund`
pub async fn fund_experiment(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    ApiJson(body): ApiJson<PaymentRequest>,
) -> ApiResult<TxResponse> {
    let Some(amount) = present(body.amount) else {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "missing amount"));
    };
    let amount = parse_amount("amount", &amount)?;

    let result = submit_fund(&state, body.from, id, amount).await;
    settle(&state, "fundExperiment", body.from, result)
}

// === Datasets ===

/// `GET /api/datasets`
pub async fn list_datasets(State(state): State<AppState>) -> ApiResult<Vec<DatasetView>> {
    let datasets = state.chain.datasets().await?;
    Ok(Json(datasets.into_iter().map(Into::into).collect()))
}

/// `GET /api/datasets/{id}`
pub async fn get_dataset(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<DatasetView> {
    Ok(Json(state.chain.dataset(id).await?.into()))
}

/// `POST /api/datasets/upload`
pub async fn upload_dataset(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<UploadDatasetRequest>,
) -> ApiResult<TxResponse> {
    let access_price = match present(body.access_price) {
        Some(price) => parse_amount("accessPrice", &price)?,
        None => Wei::ZERO,
    };
    let from = sender(&state, body.from).await?;

    let (id, receipt) = state
        .chain
        .upload_dataset(
            from,
            NewDataset {
                experiment_id: body.experiment_id,
                title: body.title,
                description: body.description,
                data_uri: body.data_uri,
                access_price,
                is_open_access: body.is_open_access,
            },
        )
        .await?;
    Ok(Json(
        TxResponse::submitted(&receipt, "dataset uploaded").with_dataset(id),
    ))
}

/// `POST /api/datasets/{id}/nftize`
pub async fn nftize_dataset(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    ApiJson(body): ApiJson<NftizeRequest>,
) -> ApiResult<TxResponse> {
    let from = sender(&state, body.from).await?;
    let receipt = state.chain.nftize_dataset(from, id, body.token_uri).await?;
    Ok(Json(
        TxResponse::submitted(&receipt, "dataset minted").with_dataset(id),
    ))
}

/// `POST /api/datasets/{id}/purchase`
///
/// Pays the dataset's access price unless `amount` says otherwise.
pub async fn purchase_access(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    ApiJson(body): ApiJson<PaymentRequest>,
) -> ApiResult<TxResponse> {
    let amount = match present(body.amount) {
        Some(amount) => parse_amount("amount", &amount)?,
        None => state.chain.dataset(id).await?.access_price,
    };
    let from = sender(&state, body.from).await?;

    let receipt = state.chain.purchase_data_access(from, id, amount).await?;
    Ok(Json(
        TxResponse::submitted(&receipt, "data access purchased").with_dataset(id),
    ))
}

/// `POST /api/datasets/{id}/cite`
pub async fn cite_dataset(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    ApiJson(body): ApiJson<CiteRequest>,
) -> ApiResult<TxResponse> {
    let from = sender(&state, body.from).await?;
    let receipt = state.chain.cite_dataset(from, id, body.cited_id).await?;
    Ok(Json(
        TxResponse::submitted(&receipt, "citation recorded").with_dataset(id),
    ))
}

/// `GET /api/datasets/{id}/citations`
pub async fn dataset_citations(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<CitationsView> {
    let citations = state.chain.dataset_citations(id).await?;
    Ok(Json(CitationsView {
        dataset_id: id,
        citation_count: citations.len() as u64,
        citations,
    }))
}

/// `GET /api/datasets/{id}/access/{address}`
pub async fn dataset_access(
    State(state): State<AppState>,
    Path((id, account)): Path<(u64, Address)>,
) -> ApiResult<AccessView> {
    let has_access = state.chain.has_access(id, account).await?;
    Ok(Json(AccessView {
        dataset_id: id,
        account,
        has_access,
    }))
}

// === Tokens ===

/// `GET /api/tokens/{id}`
pub async fn token(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<TokenView> {
    Ok(Json(token_view(&state, id).await?))
}

/// `GET /api/accounts/{address}/nfts`
pub async fn account_nfts(
    State(state): State<AppState>,
    Path(address): Path<Address>,
) -> ApiResult<NftsView> {
    let balance = state.chain.balance_of(address).await?;
    let mut tokens = Vec::new();
    for id in state.chain.tokens_of(address).await? {
        tokens.push(token_view(&state, id).await?);
    }
    Ok(Json(NftsView {
        address,
        balance,
        tokens,
    }))
}

// === Portfolio ===

/// `GET /api/portfolio/{address}`
pub async fn portfolio(
    State(state): State<AppState>,
    Path(address): Path<Address>,
) -> ApiResult<PortfolioView> {
    Ok(Json(state.chain.portfolio(address).await?.into()))
}

// === Helpers ===

async fn chain_experiments(state: &AppState) -> Result<Vec<ExperimentView>> {
    let contract = state.chain.network().await?.contract_address;
    let now = Utc::now();
    Ok(state
        .chain
        .experiments()
        .await?
        .iter()
        .map(|experiment| ExperimentView::from_chain(experiment, contract, now))
        .collect())
}

async fn chain_experiment(state: &AppState, id: u64) -> Result<ExperimentView> {
    let contract = state.chain.network().await?.contract_address;
    let experiment = state.chain.experiment(id).await?;
    Ok(ExperimentView::from_chain(&experiment, contract, Utc::now()))
}

async fn token_view(state: &AppState, id: u64) -> Result<TokenView> {
    Ok(TokenView {
        token_id: id,
        owner: state.chain.owner_of(id).await?,
        token_uri: state.chain.token_uri(id).await?,
    })
}

async fn submit_create(
    state: &AppState,
    from: Option<Address>,
    args: NewExperiment,
) -> Result<TxResponse> {
    let from = sender(state, from).await?;
    let (id, receipt) = state.chain.create_experiment(from, args).await?;
    Ok(TxResponse::submitted(&receipt, "experiment creation submitted").with_experiment(id))
}

async fn submit_fund(
    state: &AppState,
    from: Option<Address>,
    id: u64,
    amount: Wei,
) -> Result<TxResponse> {
    let from = sender(state, from).await?;
    let receipt = state.chain.fund_experiment(from, id, amount).await?;
    Ok(TxResponse::submitted(&receipt, "funding submitted"))
}

/// The explicit sender, or the provider's first account.
async fn sender(state: &AppState, from: Option<Address>) -> Result<Address> {
    if let Some(from) = from {
        return Ok(from);
    }
    state
        .chain
        .accounts()
        .await?
        .first()
        .copied()
        .ok_or_else(|| Error::chain_unavailable("provider exposes no accounts"))
}

/// Apply the write fallback policy to the outcome of an experiment call.
///
/// Caller mistakes are reported as such. Any other failure becomes a
/// simulated receipt in development and a 500 in production.
fn settle(
    state: &AppState,
    method: &str,
    from: Option<Address>,
    result: Result<TxResponse>,
) -> ApiResult<TxResponse> {
    match result {
        Ok(response) => {
            info!("{} submitted in block {}", method, response.transaction.block_number);
            Ok(Json(response))
        }
        Err(err) if err.is_client_error() => Err(err.into()),
        Err(err) if state.environment.is_development() => {
            warn!("{} failed ({}); answering with a simulated receipt", method, err);
            let receipt =
                fallback::simulated_receipt(method, &from.unwrap_or(Address::ZERO), Utc::now());
            Ok(Json(TxResponse {
                simulated: true,
                ..TxResponse::submitted(&receipt, format!("development: simulated {method}"))
            }))
        }
        Err(err) => {
            error!("{} failed: {}", method, err);
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                err.to_string(),
            ))
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn present(value: Option<Value>) -> Option<Value> {
    value.filter(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    })
}

fn parse_amount(field: &str, value: &Value) -> Result<Wei> {
    match value {
        Value::String(s) => Wei::parse_ether(s),
        Value::Number(n) => Wei::parse_ether(&n.to_string()),
        _ => Err(Error::InvalidAmount(format!(
            "{field} must be a decimal string or number"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(
            parse_amount("amount", &json!("0.5")).unwrap(),
            Wei::new(500_000_000_000_000_000)
        );
        assert_eq!(
            parse_amount("amount", &json!(3)).unwrap(),
            Wei::from_ether(3)
        );
        assert_eq!(
            parse_amount("amount", &json!(1.25)).unwrap(),
            Wei::parse_ether("1.25").unwrap()
        );
        assert!(parse_amount("amount", &json!(true)).is_err());
        assert!(parse_amount("amount", &json!("-1")).is_err());
    }

    #[test]
    fn test_present() {
        assert!(present(None).is_none());
        assert!(present(Some(Value::Null)).is_none());
        assert!(present(Some(json!("  "))).is_none());
        assert!(present(Some(json!("1"))).is_some());
        assert!(present(Some(json!(0))).is_some());
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some(" ".to_string())), None);
        assert_eq!(non_empty(Some("x".to_string())), Some("x".to_string()));
    }
}
