//! Lido subgraph (GraphQL) client with request spacing and page-wise fetching.
//!
//! No retries: a failed request is returned to the caller as-is.

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::chain::cache::CacheError;
use crate::lido::IndexedQuery;

const RATE_LIMIT_MS: u64 = 200;
const TIMEOUT_SECS: u64 = 30;
/// Hosted Graph nodes reject `first` above this.
const MAX_PAGE_SIZE: u64 = 1_000;

#[derive(Clone, Debug)]
pub struct FetchConfig {
    pub subgraph_url: String,
    /// Sent as a bearer token when set.
    pub api_key: Option<String>,
    pub rate_limit_ms: u64,
    pub timeout_secs: u64,
}

impl FetchConfig {
    pub fn new(subgraph_url: impl Into<String>) -> Self {
        Self {
            subgraph_url: subgraph_url.into(),
            api_key: None,
            rate_limit_ms: RATE_LIMIT_MS,
            timeout_secs: TIMEOUT_SECS,
        }
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("rpc: {0}")]
    Rpc(#[from] alloy::transports::TransportError),
    #[error("contract call: {0}")]
    Contract(#[from] alloy::contract::Error),
    #[error("cache: {0}")]
    Cache(#[from] CacheError),
    #[error("url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api error: status {0} body {1}")]
    Api(u16, String),
    #[error("graphql: {0}")]
    GraphQl(String),
    #[error("decode: {0}")]
    Decode(String),
    #[error("no block at or before timestamp {0}")]
    NoBlockBefore(u64),
}

/// `LidoTransfer` entity. Amounts are GraphQL `BigInt` decimal strings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferEntity {
    pub from: Address,
    pub to: Address,
    pub value: String,
    pub shares: String,
    pub shares_after_increase: String,
    pub shares_after_decrease: String,
    pub balance_after_increase: String,
    pub balance_after_decrease: String,
    pub total_pooled_ether: String,
    pub total_shares: String,
    pub block: String,
    pub log_index: String,
    pub transaction_hash: Option<B256>,
}

/// `TotalReward` entity: one per oracle report (rebase).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebaseEntity {
    pub total_pooled_ether_before: String,
    pub total_pooled_ether_after: String,
    pub total_shares_before: String,
    pub total_shares_after: String,
    pub apr: Option<String>,
    pub block: String,
    pub log_index: String,
    pub transaction_hash: Option<B256>,
}

const TRANSFER_FIELDS: &str = "from to value shares sharesAfterIncrease sharesAfterDecrease \
     balanceAfterIncrease balanceAfterDecrease totalPooledEther totalShares block logIndex \
     transactionHash";

const REBASE_FIELDS: &str = "totalPooledEtherBefore totalPooledEtherAfter totalSharesBefore \
     totalSharesAfter apr block logIndex transactionHash";

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct TransfersData {
    #[serde(rename = "lidoTransfers")]
    transfers: Vec<TransferEntity>,
}

#[derive(Deserialize)]
struct RebasesData {
    #[serde(rename = "totalRewards")]
    rebases: Vec<RebaseEntity>,
}

#[derive(Deserialize)]
struct MetaData {
    #[serde(rename = "_meta")]
    meta: Meta,
}

#[derive(Deserialize)]
struct Meta {
    block: MetaBlock,
}

#[derive(Deserialize)]
struct MetaBlock {
    number: u64,
}

/// Client for a Lido subgraph deployment.
pub struct SubgraphClient {
    config: FetchConfig,
    url: url::Url,
    client: reqwest::Client,
    last_request: Mutex<Option<OffsetDateTime>>,
    request_count: AtomicU64,
}

impl SubgraphClient {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let url = url::Url::parse(&config.subgraph_url)?;
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config,
            url,
            client,
            last_request: Mutex::new(None),
            request_count: AtomicU64::new(0),
        })
    }

    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = (OffsetDateTime::now_utc() - prev).whole_milliseconds();
            let need = i128::from(self.config.rate_limit_ms);
            if elapsed < need {
                let ms = u64::try_from(need - elapsed).unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
        }
        *last = Some(OffsetDateTime::now_utc());
    }

    async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, FetchError> {
        self.rate_limit().await;
        let body = serde_json::json!({ "query": query, "variables": variables });
        let mut req = self.client.post(self.url.clone()).json(&body);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await?;
        let status = res.status();
        let text = res.text().await?;
        self.request_count.fetch_add(1, Ordering::Relaxed);
        if !status.is_success() {
            return Err(FetchError::Api(status.as_u16(), text));
        }
        parse_response(&text)
    }

    /// Pull `first`/`skip` pages until a short page arrives. `page_size` is capped at
    /// [`MAX_PAGE_SIZE`].
    async fn paginate<T, D, F>(
        &self,
        query: &str,
        mut variables: serde_json::Value,
        page_size: u64,
        extract: F,
    ) -> Result<Vec<T>, FetchError>
    where
        D: DeserializeOwned,
        F: Fn(D) -> Vec<T>,
    {
        let page_size = capped_page_size(page_size);
        let mut out = Vec::new();
        let mut skip = 0u64;
        loop {
            variables["first"] = page_size.into();
            variables["skip"] = skip.into();
            let page = extract(self.query::<D>(query, variables.clone()).await?);
            let n = page.len() as u64;
            debug!(skip, n, "subgraph page");
            out.extend(page);
            if n < page_size {
                break;
            }
            skip += page_size;
        }
        Ok(out)
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }
}

fn capped_page_size(requested: u64) -> u64 {
    requested.clamp(1, MAX_PAGE_SIZE)
}

fn parse_response<T: DeserializeOwned>(text: &str) -> Result<T, FetchError> {
    let parsed: GraphQlResponse<T> =
        serde_json::from_str(text).map_err(|e| FetchError::Decode(e.to_string()))?;
    if let Some(errors) = parsed.errors.filter(|e| !e.is_empty()) {
        let msg = errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(FetchError::GraphQl(msg));
    }
    parsed
        .data
        .ok_or_else(|| FetchError::GraphQl("response has no data".to_string()))
}

fn address_var(account: Address) -> String {
    format!("{account:#x}")
}

#[async_trait]
impl IndexedQuery for SubgraphClient {
    async fn last_indexed_block(&self) -> Result<u64, FetchError> {
        let data: MetaData = self
            .query("query { _meta { block { number } } }", serde_json::json!({}))
            .await?;
        Ok(data.meta.block.number)
    }

    async fn transfers_in_range(
        &self,
        account: Address,
        from_block: u64,
        to_block: u64,
        page_size: u64,
    ) -> Result<Vec<TransferEntity>, FetchError> {
        let query = format!(
            "query Transfers($first: Int!, $skip: Int!, $account: Bytes!, \
             $from: BigInt!, $to: BigInt!) {{ \
             lidoTransfers(first: $first, skip: $skip, orderBy: block, orderDirection: asc, \
             where: {{ and: [{{ or: [{{ from: $account }}, {{ to: $account }}] }}, \
             {{ block_gte: $from, block_lte: $to }}] }}) {{ {TRANSFER_FIELDS} }} }}"
        );
        let vars = serde_json::json!({
            "account": address_var(account),
            "from": from_block.to_string(),
            "to": to_block.to_string(),
        });
        let transfers = self
            .paginate(&query, vars, page_size, |d: TransfersData| d.transfers)
            .await?;
        info!(count = transfers.len(), "subgraph transfers");
        Ok(transfers)
    }

    async fn rebases_in_range(
        &self,
        from_block: u64,
        to_block: u64,
        page_size: u64,
    ) -> Result<Vec<RebaseEntity>, FetchError> {
        let query = format!(
            "query Rebases($first: Int!, $skip: Int!, $from: BigInt!, $to: BigInt!) {{ \
             totalRewards(first: $first, skip: $skip, orderBy: block, orderDirection: asc, \
             where: {{ block_gte: $from, block_lte: $to }}) {{ {REBASE_FIELDS} }} }}"
        );
        let vars = serde_json::json!({
            "from": from_block.to_string(),
            "to": to_block.to_string(),
        });
        let rebases = self
            .paginate(&query, vars, page_size, |d: RebasesData| d.rebases)
            .await?;
        info!(count = rebases.len(), "subgraph rebases");
        Ok(rebases)
    }

    async fn last_transfer_before(
        &self,
        account: Address,
        block: u64,
    ) -> Result<Option<TransferEntity>, FetchError> {
        let query = format!(
            "query LastTransfer($account: Bytes!, $block: BigInt!) {{ \
             lidoTransfers(first: 1, orderBy: block, orderDirection: desc, \
             where: {{ and: [{{ or: [{{ from: $account }}, {{ to: $account }}] }}, \
             {{ block_lt: $block }}] }}) {{ {TRANSFER_FIELDS} }} }}"
        );
        let vars = serde_json::json!({
            "account": address_var(account),
            "block": block.to_string(),
        });
        let data: TransfersData = self.query(&query, vars).await?;
        Ok(data.transfers.into_iter().next())
    }

    async fn last_rebase_before(&self, block: u64) -> Result<Option<RebaseEntity>, FetchError> {
        let query = format!(
            "query LastRebase($block: BigInt!) {{ \
             totalRewards(first: 1, orderBy: block, orderDirection: desc, \
             where: {{ block_lt: $block }}) {{ {REBASE_FIELDS} }} }}"
        );
        let vars = serde_json::json!({ "block": block.to_string() });
        let data: RebasesData = self.query(&query, vars).await?;
        Ok(data.rebases.into_iter().next())
    }
}
