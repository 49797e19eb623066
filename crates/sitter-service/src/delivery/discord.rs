//! Discord REST delivery.
//!
//! Posts to `POST {base}/channels/{id}/messages` with the bot token.
//!
//! # Status mapping
//!
//! - 2xx: delivered
//! - 403 (missing access) and 404 (unknown channel): `Unreachable`
//! - anything else, transport errors and timeouts: `Failed`

use crate::delivery::Delivery;
use crate::errors::DeliveryError;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use common::types::ChannelId;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, trace, warn};

/// Connection timeout for the Discord API.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct CreateMessage<'a> {
    content: &'a str,
    allowed_mentions: AllowedMentions,
}

#[derive(Debug, Serialize)]
struct AllowedMentions {
    parse: Vec<&'static str>,
}

impl AllowedMentions {
    fn for_attention(wide_attention: bool) -> Self {
        let mut parse = vec!["users"];
        if wide_attention {
            parse.push("everyone");
        }
        Self { parse }
    }
}

/// Delivers messages through the Discord REST API.
#[derive(Clone)]
pub struct DiscordDelivery {
    http_client: reqwest::Client,
    base_url: String,
    bot_token: SecretString,
}

impl fmt::Debug for DiscordDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordDelivery")
            .field("base_url", &self.base_url)
            .field("bot_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl DiscordDelivery {
    /// Build a delivery client.
    ///
    /// `request_timeout` bounds each delivery call end to end.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Failed` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        bot_token: SecretString,
        request_timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(request_timeout))
            .build()
            .map_err(|e| DeliveryError::Failed(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bot_token,
        })
    }
}

#[async_trait]
impl Delivery for DiscordDelivery {
    #[instrument(skip_all, fields(channel_id = %target, wide_attention = wide_attention))]
    async fn deliver(
        &self,
        target: ChannelId,
        text: &str,
        wide_attention: bool,
    ) -> Result<(), DeliveryError> {
        let url = format!("{}/channels/{target}/messages", self.base_url);
        let body = CreateMessage {
            content: text,
            allowed_mentions: AllowedMentions::for_attention(wide_attention),
        };

        let response = self
            .http_client
            .post(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bot {}", self.bot_token.expose_secret()),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() { "timeout" } else { "transport" };
                warn!(
                    target: "sitter.delivery.discord",
                    kind,
                    error = %e,
                    "Discord request failed"
                );
                DeliveryError::Failed(format!("{kind}: {e}"))
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(target: "sitter.delivery.discord", "Message delivered");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        trace!(target: "sitter.delivery.discord", body = %body, "Discord error response body");

        match status {
            reqwest::StatusCode::FORBIDDEN | reqwest::StatusCode::NOT_FOUND => {
                warn!(
                    target: "sitter.delivery.discord",
                    status = %status,
                    "Channel unreachable"
                );
                Err(DeliveryError::Unreachable(format!("Status {status}")))
            }
            _ => {
                warn!(
                    target: "sitter.delivery.discord",
                    status = %status,
                    "Discord rejected message"
                );
                Err(DeliveryError::Failed(format!("Status {status}")))
            }
        }
    }
}
