//! HTTP client for the remote blacklist/whitelist feed.
//!
//! The feed is one JSON object with four newline-separated string fields:
//! `ipv4`, `ipv6` (addresses to block) and `white4`, `white6` (addresses
//! that must never be blocked).

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::address::{Address, Family, RuleSet};
use crate::config::{FeedConfig, SecureString};
use crate::error::SyncError;

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_MS: u64 = 2000;

/// Maximum accepted feed document size (20 MB)
const MAX_FEED_SIZE: usize = 20 * 1024 * 1024;

/// Raw feed document. Missing or null fields read as empty lists.
#[derive(Debug, Default, Deserialize)]
struct FeedDocument {
    #[serde(default)]
    ipv4: Option<String>,
    #[serde(default)]
    ipv6: Option<String>,
    #[serde(default)]
    white4: Option<String>,
    #[serde(default)]
    white6: Option<String>,
}

/// Feed entry that failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedEntry {
    /// Feed field the entry came from
    pub list: &'static str,
    pub value: String,
    pub reason: String,
}

/// Target state for one run
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub blacklist_v4: RuleSet,
    pub blacklist_v6: RuleSet,
    pub whitelist_v4: RuleSet,
    pub whitelist_v6: RuleSet,
    pub rejected: Vec<RejectedEntry>,
}

impl FeedSnapshot {
    pub fn empty() -> Self {
        Self {
            blacklist_v4: RuleSet::new(Family::V4),
            blacklist_v6: RuleSet::new(Family::V6),
            whitelist_v4: RuleSet::new(Family::V4),
            whitelist_v6: RuleSet::new(Family::V6),
            rejected: Vec::new(),
        }
    }

    pub fn blacklist(&self, family: Family) -> &RuleSet {
        match family {
            Family::V4 => &self.blacklist_v4,
            Family::V6 => &self.blacklist_v6,
        }
    }

    pub fn whitelist(&self, family: Family) -> &RuleSet {
        match family {
            Family::V4 => &self.whitelist_v4,
            Family::V6 => &self.whitelist_v6,
        }
    }
}

/// Parse a feed document.
///
/// With `dual_stack` off the IPv6 fields are ignored entirely.
pub fn parse_feed(body: &str, dual_stack: bool) -> Result<FeedSnapshot, SyncError> {
    let doc: FeedDocument = serde_json::from_str(body)
        .map_err(|e| SyncError::FeedUnavailable(format!("invalid feed document: {}", e)))?;

    let mut snapshot = FeedSnapshot::empty();
    let mut rejected = Vec::new();

    snapshot.blacklist_v4 = parse_list("ipv4", doc.ipv4.as_deref(), Family::V4, &mut rejected);
    snapshot.whitelist_v4 = parse_list("white4", doc.white4.as_deref(), Family::V4, &mut rejected);
    if dual_stack {
        snapshot.blacklist_v6 = parse_list("ipv6", doc.ipv6.as_deref(), Family::V6, &mut rejected);
        snapshot.whitelist_v6 =
            parse_list("white6", doc.white6.as_deref(), Family::V6, &mut rejected);
    }

    snapshot.rejected = rejected;
    Ok(snapshot)
}

/// Parse one newline-separated list. Blank lines are dropped silently;
/// malformed entries are recorded in `rejected`.
fn parse_list(
    list: &'static str,
    content: Option<&str>,
    family: Family,
    rejected: &mut Vec<RejectedEntry>,
) -> RuleSet {
    let mut set = RuleSet::new(family);
    for line in content.unwrap_or_default().split('\n') {
        if line.trim().is_empty() {
            continue;
        }
        match Address::parse(line, family) {
            Ok(address) => {
                set.insert(address);
            }
            Err(e) => rejected.push(RejectedEntry {
                list,
                value: line.trim().to_string(),
                reason: e.to_string(),
            }),
        }
    }
    set
}

/// HTTP client for fetching the feed
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Create a new fetcher with the given request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("blocksync/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    /// Fetch and parse the feed described by `config`.
    pub async fn fetch_snapshot(
        &self,
        config: &FeedConfig,
        dual_stack: bool,
    ) -> Result<FeedSnapshot, SyncError> {
        info!("Fetching feed from {}...", config.url);
        let key = config.get_key();
        let body = self
            .fetch_with_retry(&config.url, &key)
            .await
            .map_err(|e| SyncError::FeedUnavailable(format!("{:#}", e)))?;

        let snapshot = parse_feed(&body, dual_stack)?;
        for entry in &snapshot.rejected {
            warn!("Ignoring {} entry {:?}: {}", entry.list, entry.value, entry.reason);
        }
        Ok(snapshot)
    }

    /// Fetch the feed body with retry logic and size validation
    async fn fetch_with_retry(&self, url: &str, key: &SecureString) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = RETRY_DELAY_MS * (1 << (attempt - 1));
                debug!("Retry {} after {}ms for {}", attempt, delay, url);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let mut request = self.client.get(url);
            if !key.is_empty() {
                request = request.query(&[("key", key.as_str())]);
            }

            match request.send().await {
                Ok(response) => {
                    if !response.status().is_success() {
                        last_error = Some(anyhow::anyhow!("HTTP {}", response.status()));
                        continue;
                    }

                    if let Some(content_length) = response.content_length() {
                        if content_length as usize > MAX_FEED_SIZE {
                            anyhow::bail!(
                                "Response too large: {} bytes (max: {} bytes)",
                                content_length,
                                MAX_FEED_SIZE
                            );
                        }
                    }

                    let body = response
                        .text()
                        .await
                        .context("Failed to read response body")?;

                    if body.len() > MAX_FEED_SIZE {
                        anyhow::bail!(
                            "Downloaded content too large: {} bytes (max: {} bytes)",
                            body.len(),
                            MAX_FEED_SIZE
                        );
                    }

                    return Ok(body);
                }
                Err(e) => {
                    // reqwest errors embed the URL, which carries the key
                    last_error = Some(anyhow::anyhow!("{}", e.without_url()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Unknown error")))
    }
}
