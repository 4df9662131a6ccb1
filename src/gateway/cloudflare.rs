//! Cloudflare v4 API client for custom firewall rulesets.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{Account, RulesetGateway, Zone, ZoneDirectory};
use crate::config::SecureString;
use crate::error::AsnwallError;
use crate::ruleset::{RuleEntry, RulesetSnapshot};
use crate::utils::truncate;

pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Ruleset phase holding zone-level custom firewall rules
pub const FIREWALL_PHASE: &str = "http_request_firewall_custom";

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_MS: u64 = 1000;
const PER_PAGE: u32 = 50;
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Standard Cloudflare response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct RulesetBody {
    id: String,
    #[serde(default)]
    rules: Vec<RuleEntry>,
}

#[derive(Serialize)]
struct RulesPayload<'a> {
    rules: &'a [RuleEntry],
}

/// Decode an envelope, turning API-level failures into errors
fn decode_envelope<T: DeserializeOwned>(
    status: StatusCode,
    body: &str,
) -> Result<Envelope<T>, AsnwallError> {
    let envelope: Envelope<T> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) if status.is_success() => {
            return Err(AsnwallError::Parse(format!("invalid API response: {}", e)))
        }
        Err(_) => {
            return Err(AsnwallError::Api {
                status: status.as_u16(),
                code: 0,
                message: truncate(body.trim(), 200),
            })
        }
    };

    if !status.is_success() || !envelope.success {
        let (code, message) = match envelope.errors.first() {
            Some(e) => (e.code, e.message.clone()),
            None => (0, "request failed".to_string()),
        };
        return Err(AsnwallError::Api {
            status: status.as_u16(),
            code,
            message,
        });
    }

    Ok(envelope)
}

/// Delay before retry `attempt` (1-based), doubling each time.
/// The exponent is capped so large retry counts cannot overflow.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    base.saturating_mul(1u32 << exponent)
}

/// HTTP client for the Cloudflare API
pub struct CloudflareClient {
    client: Client,
    base_url: String,
    token: SecureString,
    max_retries: u32,
    retry_delay: Duration,
}

impl CloudflareClient {
    /// Create a client. `base_url` is normally [`DEFAULT_API_BASE`].
    pub fn new(token: SecureString, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("asnwall/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            max_retries: MAX_RETRIES,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        })
    }

    /// Override the transport retry policy
    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = retry_delay;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn entrypoint_path(zone_id: &str) -> String {
        format!("/zones/{}/rulesets/phases/{}/entrypoint", zone_id, FIREWALL_PHASE)
    }

    /// Send a request, retrying on connection errors, 429 and 5xx
    async fn send<F>(&self, build: F) -> Result<Response, AsnwallError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.retry_delay, attempt);
                debug!("Retry {} after {}ms", attempt, delay.as_millis());
                tokio::time::sleep(delay).await;
            }

            match build().bearer_auth(self.token.as_str()).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                        last_error = Some(AsnwallError::Transport(format!("HTTP {}", status)));
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) => last_error = Some(AsnwallError::Transport(e.to_string())),
            }
        }

        Err(last_error.unwrap_or_else(|| AsnwallError::Transport("no request sent".to_string())))
    }

    async fn read<T: DeserializeOwned>(response: Response) -> Result<Envelope<T>, AsnwallError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AsnwallError::Transport(format!("failed to read response: {}", e)))?;
        decode_envelope(status, &body)
    }

    /// GET every page of a listing endpoint
    async fn list_paged<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, AsnwallError> {
        let url = self.url(path);
        let per_page = PER_PAGE.to_string();
        let mut items = Vec::new();
        let mut page: u32 = 1;

        loop {
            let page_str = page.to_string();
            let response = self
                .send(|| {
                    self.client.get(&url).query(query).query(&[
                        ("page", page_str.as_str()),
                        ("per_page", per_page.as_str()),
                    ])
                })
                .await?;
            let envelope: Envelope<Vec<T>> = Self::read(response).await?;
            let total_pages = envelope.result_info.as_ref().map_or(1, |i| i.total_pages);
            items.extend(envelope.result.unwrap_or_default());

            if page >= total_pages {
                break;
            }
            page += 1;
        }

        Ok(items)
    }

    async fn put_rules(&self, path: &str, rules: &[RuleEntry]) -> Result<(), AsnwallError> {
        let url = self.url(path);
        let payload = RulesPayload { rules };
        let response = self.send(|| self.client.put(&url).json(&payload)).await?;
        Self::read::<serde_json::Value>(response).await?;
        Ok(())
    }
}

#[async_trait]
impl RulesetGateway for CloudflareClient {
    async fn fetch(&self, zone_id: &str) -> Result<Option<RulesetSnapshot>> {
        let url = self.url(&Self::entrypoint_path(zone_id));
        debug!("GET {}", url);

        let response = self.send(|| self.client.get(&url)).await?;
        let body = match Self::read::<RulesetBody>(response).await {
            Ok(envelope) => envelope.result,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to fetch ruleset for zone {}", zone_id))
            }
        };

        let body = body.context("Ruleset response has no result")?;
        Ok(Some(RulesetSnapshot {
            ruleset_id: body.id,
            rules: body.rules,
        }))
    }

    async fn replace(&self, zone_id: &str, ruleset_id: &str, rules: &[RuleEntry]) -> Result<()> {
        let path = format!("/zones/{}/rulesets/{}", zone_id, ruleset_id);
        debug!("PUT {} ({} rules)", path, rules.len());
        self.put_rules(&path, rules)
            .await
            .with_context(|| format!("Failed to update ruleset {}", ruleset_id))
    }

    async fn create(&self, zone_id: &str, rules: &[RuleEntry]) -> Result<()> {
        // PUT on the phase entrypoint creates the ruleset when it is missing
        let path = Self::entrypoint_path(zone_id);
        debug!("PUT {} ({} rules)", path, rules.len());
        self.put_rules(&path, rules)
            .await
            .with_context(|| format!("Failed to create ruleset for zone {}", zone_id))
    }
}

#[async_trait]
impl ZoneDirectory for CloudflareClient {
    async fn list_accounts(&self) -> Result<Vec<Account>> {
        self.list_paged("/accounts", &[])
            .await
            .context("Failed to list accounts")
    }

    async fn list_zones(&self, account_id: &str) -> Result<Vec<Zone>> {
        self.list_paged("/zones", &[("account.id", account_id)])
            .await
            .with_context(|| format!("Failed to list zones for account {}", account_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay_doubles_and_saturates() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(400));
        assert_eq!(backoff_delay(base, 40), backoff_delay(base, 17));
        assert_eq!(backoff_delay(Duration::MAX, 5), Duration::MAX);
    }

    #[test]
    fn test_decode_success() {
        let body = r#"{
            "success": true,
            "errors": [],
            "messages": [],
            "result": {"id": "rs1", "name": "default", "rules": [
                {"id": "r1", "description": "Block-Bad-ASNs-Part-1",
                 "expression": "(ip.geoip.asnum in {1})", "action": "block",
                 "enabled": true, "version": "1"}
            ]}
        }"#;
        let envelope: Envelope<RulesetBody> = decode_envelope(StatusCode::OK, body).unwrap();
        let ruleset = envelope.result.unwrap();
        assert_eq!(ruleset.id, "rs1");
        assert_eq!(ruleset.rules.len(), 1);
        assert_eq!(ruleset.rules[0].sequence(), Some(1));
    }

    #[test]
    fn test_decode_empty_ruleset_without_rules_field() {
        let body = r#"{"success": true, "errors": [], "result": {"id": "rs1"}}"#;
        let envelope: Envelope<RulesetBody> = decode_envelope(StatusCode::OK, body).unwrap();
        assert!(envelope.result.unwrap().rules.is_empty());
    }

    #[test]
    fn test_decode_api_error() {
        let body = r#"{"success": false, "errors": [{"code": 10000, "message": "Authentication error"}], "result": null}"#;
        let err = decode_envelope::<RulesetBody>(StatusCode::FORBIDDEN, body).unwrap_err();
        match err {
            AsnwallError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 403);
                assert_eq!(code, 10000);
                assert_eq!(message, "Authentication error");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_decode_success_false_with_200() {
        let body = r#"{"success": false, "errors": [{"code": 20021, "message": "filter parsing error"}]}"#;
        let err = decode_envelope::<serde_json::Value>(StatusCode::OK, body).unwrap_err();
        assert!(err.to_string().contains("filter parsing error"));
    }

    #[test]
    fn test_decode_non_json_error_body() {
        let err =
            decode_envelope::<RulesetBody>(StatusCode::NOT_FOUND, "<html>Not Found</html>").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_decode_non_json_success_body_is_parse_error() {
        let err = decode_envelope::<RulesetBody>(StatusCode::OK, "garbage").unwrap_err();
        assert!(matches!(err, AsnwallError::Parse(_)));
    }

    #[test]
    fn test_entrypoint_path() {
        assert_eq!(
            CloudflareClient::entrypoint_path("z1"),
            "/zones/z1/rulesets/phases/http_request_firewall_custom/entrypoint"
        );
    }

    #[test]
    fn test_rules_payload_shape() {
        let rules = vec![RuleEntry::managed(1, "(ip.geoip.asnum in {1})")];
        let value = serde_json::to_value(RulesPayload { rules: &rules }).unwrap();
        assert_eq!(value["rules"][0]["description"], "Block-Bad-ASNs-Part-1");
        assert_eq!(value["rules"][0]["action"], "block");
        assert!(value["rules"][0].get("id").is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = CloudflareClient::new(
            SecureString::from("t"),
            "https://api.example.com/client/v4/",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.url("/accounts"), "https://api.example.com/client/v4/accounts");
    }
}
