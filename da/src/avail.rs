//! Avail light client adapter (JSON over HTTP).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use containers::{Block, NamespaceId};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use storage::Datastore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::DaError;
use crate::types::{BaseResult, ResultCheckBlock, ResultRetrieveBlocks, ResultSubmitBlock};
use crate::{BlockRetriever, DataAvailabilityLayerClient};

const NOT_FOUND: &str = "Not found";
const PROCESSING: &str = "Processing block";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Availability requires a confidence strictly above this value.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Wait between retrievals of a block the light client is still processing.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:7000".to_string()
}

fn default_confidence() -> f64 {
    92.0
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    10
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for AvailConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            confidence: default_confidence(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retries: default_max_retries(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl AvailConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Serialize)]
struct SubmitRequest {
    data: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    block_number: Option<u32>,
    #[serde(default)]
    block_hash: String,
    #[serde(default)]
    hash: String,
    #[serde(default)]
    index: u32,
}

#[derive(Debug, Deserialize)]
struct Confidence {
    block: u32,
    confidence: f64,
    #[serde(default)]
    #[allow(dead_code)]
    serialised_confidence: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AppData {
    block: u32,
    #[serde(default)]
    extrinsics: Vec<String>,
}

/// `/v1/appdata` answers with either a bare status string or the data.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AppDataResponse {
    Status(String),
    Data(AppData),
}

enum Retrieved {
    Blocks(u64, Vec<Block>),
    Processing,
}

pub struct AvailClient {
    config: AvailConfig,
    namespace: NamespaceId,
    client: Client,
    /// Interrupts retry waits on shutdown.
    cancel: CancellationToken,
}

impl AvailClient {
    pub fn new() -> Self {
        Self {
            config: AvailConfig::default(),
            namespace: NamespaceId::default(),
            client: Client::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn set_cancellation(&mut self, cancel: CancellationToken) {
        self.cancel = cancel;
    }

    pub fn config(&self) -> &AvailConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn try_submit(&self, block: &Block) -> Result<(u64, String), DaError> {
        let request = SubmitRequest {
            data: STANDARD.encode(block.to_bytes()),
        };
        let response = self.client.post(self.url("/v2/submit")).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(DaError::Status { status, body });
        }

        let submitted: SubmitResponse = serde_json::from_slice(&response.bytes().await?)?;
        let da_height = u64::from(submitted.block_number.unwrap_or(submitted.index));
        debug!(
            da_height,
            block_hash = %submitted.block_hash,
            tx_hash = %submitted.hash,
            "Block submitted to Avail"
        );
        Ok((da_height, submitted.hash))
    }

    async fn try_confidence(&self, da_height: u64) -> Result<(u64, bool), DaError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/confidence/{da_height}")))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(DaError::Status { status, body });
        }

        let confidence: Confidence = serde_json::from_slice(&response.bytes().await?)?;
        Ok((
            u64::from(confidence.block),
            confidence.confidence > self.config.confidence,
        ))
    }

    async fn try_retrieve(&self, da_height: u64) -> Result<Retrieved, DaError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/appdata/{da_height}?decode=true")))
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;

        let app_data = match serde_json::from_slice::<AppDataResponse>(&body) {
            Ok(AppDataResponse::Status(message)) if message == NOT_FOUND => {
                return Ok(Retrieved::Blocks(da_height, Vec::new()));
            }
            Ok(AppDataResponse::Status(message)) if message == PROCESSING => {
                return Ok(Retrieved::Processing);
            }
            Ok(AppDataResponse::Data(app_data)) if status.is_success() => app_data,
            _ => {
                return Err(DaError::Status {
                    status,
                    body: String::from_utf8_lossy(&body).into_owned(),
                });
            }
        };

        let blocks = app_data
            .extrinsics
            .iter()
            .map(|extrinsic| {
                let raw = STANDARD
                    .decode(extrinsic)
                    .map_err(|err| DaError::InvalidData(format!("extrinsic is not base64: {err}")))?;
                Block::from_bytes(&raw).map_err(|err| DaError::InvalidData(err.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Retrieved::Blocks(u64::from(app_data.block), blocks))
    }
}

impl Default for AvailClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataAvailabilityLayerClient for AvailClient {
    fn init(&mut self, namespace: NamespaceId, config: &[u8], _store: Arc<dyn Datastore>) -> Result<(), DaError> {
        if !config.is_empty() {
            self.config = serde_json::from_slice(config)?;
        }
        self.client = Client::builder().timeout(self.config.timeout()).build()?;
        self.namespace = namespace;
        Ok(())
    }

    async fn start(&self) -> Result<(), DaError> {
        info!(
            base_url = %self.config.base_url,
            namespace = %self.namespace,
            "Starting Avail data availability client"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<(), DaError> {
        info!("Stopping Avail data availability client");
        Ok(())
    }

    async fn submit_block(&self, block: &Block) -> ResultSubmitBlock {
        match self.try_submit(block).await {
            Ok((da_height, tx_hash)) => BaseResult::success(da_height)
                .with_message(format!("tx hash: {tx_hash}"))
                .into(),
            Err(err) => {
                warn!(height = block.height(), %err, "Failed to submit block to Avail");
                BaseResult::error(err.to_string()).into()
            }
        }
    }

    async fn check_block_availability(&self, da_height: u64) -> ResultCheckBlock {
        match self.try_confidence(da_height).await {
            Ok((block, data_available)) => ResultCheckBlock {
                base: BaseResult::success(block),
                data_available,
            },
            Err(err) => BaseResult::error(err.to_string()).into(),
        }
    }
}

#[async_trait]
impl BlockRetriever for AvailClient {
    async fn retrieve_blocks(&self, da_height: u64) -> ResultRetrieveBlocks {
        let mut retries = 0;
        loop {
            match self.try_retrieve(da_height).await {
                Ok(Retrieved::Blocks(block, blocks)) => {
                    return ResultRetrieveBlocks {
                        base: BaseResult::success(block),
                        blocks,
                    };
                }
                Ok(Retrieved::Processing) if retries < self.config.max_retries => {
                    retries += 1;
                    debug!(da_height, retries, "Avail block still processing, retrying");
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            return BaseResult::error(format!("retrieve_blocks at {da_height}: cancelled")).into();
                        }
                        _ = tokio::time::sleep(self.config.retry_delay()) => {}
                    }
                }
                Ok(Retrieved::Processing) => {
                    return BaseResult::not_yet_available(
                        da_height,
                        format!("block {da_height} still processing after {retries} retries"),
                    )
                    .into();
                }
                Err(err) => return BaseResult::error(err.to_string()).into(),
            }
        }
    }
}
