//! Triage Bot Client
//!
//! A small, type-safe HTTP client for forwarding incident analyses and job
//! statuses to the chat-bot that fronts the triage controller.
//!
//! # Example
//!
//! ```no_run
//! use triage_bot_client::BotClient;
//! use triage_core::dto::AnalysisReport;
//!
//! # async fn example() -> triage_bot_client::Result<()> {
//! let bot = BotClient::new("localhost:7001")?;
//! bot.post_analysis(&AnalysisReport {
//!     uuid: "5e6cbe2a-0f14-4f53-8a3e-3f2b6a6c9d41".to_string(),
//!     analysis: String::new(),
//!     actions: vec![],
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod error;

pub use error::{ClientError, Result};

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use triage_core::dto::{AnalysisReport, JobStatus};

/// Path both analysis and status payloads are posted to.
const ANALYSIS_PATH: &str = "/api/analysis";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the chat-bot endpoint.
///
/// Cheap to clone; safe for concurrent use by any number of coordinators.
#[derive(Debug, Clone)]
pub struct BotClient {
    base_url: String,
    client: Client,
}

/// Builder for [`BotClient`].
///
/// The `insecure` knob disables TLS certificate verification towards the
/// bot. It exists for deployments still running the legacy self-signed
/// endpoint and defaults to off; turning it on is a conscious decision the
/// caller should log.
#[derive(Debug)]
pub struct BotClientBuilder {
    base_url: String,
    insecure: bool,
    timeout: Duration,
}

impl BotClientBuilder {
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<BotClient> {
        let client = Client::builder()
            .danger_accept_invalid_certs(self.insecure)
            .timeout(self.timeout)
            .build()?;

        Ok(BotClient {
            base_url: normalize_base_url(&self.base_url),
            client,
        })
    }
}

impl BotClient {
    /// Create a client with default settings (TLS verified, 30s timeout).
    ///
    /// A bare `host:port` address gets an `http://` scheme; trailing
    /// slashes are trimmed.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::builder(base_url).build()
    }

    pub fn builder(base_url: impl Into<String>) -> BotClientBuilder {
        BotClientBuilder {
            base_url: base_url.into(),
            insecure: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Forward an aggregated incident analysis.
    pub async fn post_analysis(&self, report: &AnalysisReport) -> Result<()> {
        self.post_json(report).await
    }

    /// Forward a batch of job status snapshots.
    pub async fn post_job_statuses(&self, statuses: &[JobStatus]) -> Result<()> {
        self.post_json(&statuses).await
    }

    async fn post_json<T: Serialize + ?Sized>(&self, body: &T) -> Result<()> {
        let url = format!("{}{}", self.base_url, ANALYSIS_PATH);
        let response = self.client.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::unexpected_status(status.as_u16(), message));
        }

        Ok(())
    }
}

fn normalize_base_url(base_url: &str) -> String {
    let with_scheme = if base_url.contains("://") {
        base_url.to_string()
    } else {
        format!("http://{base_url}")
    };
    with_scheme.trim_end_matches('/').to_string()
}
