//! Notification handlers

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::config::{Notification, NotifyTarget};

type HmacSha256 = Hmac<Sha256>;

/// Delivers notifications
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifierError>;
}

/// Fans a notification out to every configured target
pub struct Notifier {
    client: reqwest::Client,
    targets: Vec<NotifyTarget>,
}

impl Notifier {
    /// Create a new notifier
    pub fn new(targets: Vec<NotifyTarget>) -> Result<Self, NotifierError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifierError::Client(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, targets })
    }

    pub fn targets(&self) -> &[NotifyTarget] {
        &self.targets
    }

    /// Send to all targets. A failing target does not stop delivery to the
    /// others; every failure is reported.
    pub async fn notify(&self, notification: &Notification) -> Result<(), NotifierError> {
        let mut errors = Vec::new();

        for target in &self.targets {
            if let Err(e) = self.notify_target(target, notification).await {
                tracing::warn!(target = target.kind(), error = %e, "Notification target failed");
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotifierError::Multiple(errors))
        }
    }

    /// Send notification to a single target
    async fn notify_target(
        &self,
        target: &NotifyTarget,
        notification: &Notification,
    ) -> Result<(), NotifierError> {
        match target {
            NotifyTarget::Log => {
                tracing::warn!(
                    title = %notification.title,
                    mention_all = notification.mention_all,
                    "Notification: {}",
                    notification.body
                );
                Ok(())
            }
            NotifyTarget::Webhook { url, headers } => {
                self.send_webhook(url, headers, notification).await
            }
            NotifyTarget::Lark { url, secret } => {
                let signature = if secret.is_empty() {
                    None
                } else {
                    let timestamp = chrono::Utc::now().timestamp();
                    Some((timestamp, lark_sign(timestamp, secret)?))
                };
                let payload = lark_payload(notification, signature);
                let body = self.post_json(url, &[], &payload).await?;
                check_lark_response(&body)
            }
            NotifyTarget::DingTalk { url, secret, mobiles } => {
                let payload = dingtalk_payload(notification, mobiles);
                let mut query = Vec::new();
                if !secret.is_empty() {
                    let timestamp = chrono::Utc::now().timestamp_millis();
                    query.push(("timestamp", timestamp.to_string()));
                    query.push(("sign", dingtalk_sign(timestamp, secret)?));
                }
                let body = self.post_json(url, &query, &payload).await?;
                check_dingtalk_response(&body)
            }
        }
    }

    /// Send webhook notification
    async fn send_webhook(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        notification: &Notification,
    ) -> Result<(), NotifierError> {
        let payload = serde_json::json!({
            "title": notification.title,
            "color": notification.color,
            "body": notification.body,
            "mention_all": notification.mention_all,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let mut request = self.client.post(url).json(&payload);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| {
            NotifierError::Webhook(format!("Failed to send webhook: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(NotifierError::Webhook(format!(
                "Webhook returned status {}",
                response.status()
            )));
        }

        tracing::debug!(url = %url, "Webhook notification sent");

        Ok(())
    }

    /// POST a JSON payload and return the decoded response body
    async fn post_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, NotifierError> {
        let response = self
            .client
            .post(url)
            .query(query)
            .json(payload)
            .send()
            .await
            .map_err(|e| NotifierError::Webhook(format!("Failed to send webhook: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifierError::Webhook(format!("Webhook returned status {}", status)));
        }

        response
            .json()
            .await
            .map_err(|e| NotifierError::Webhook(format!("Unreadable webhook response: {}", e)))
    }
}

#[async_trait]
impl Dispatcher for Notifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifierError> {
        self.notify(notification).await
    }
}

/// Lark signature: the HMAC key is `"<timestamp>\n<secret>"` over an
/// empty message.
pub fn lark_sign(timestamp_secs: i64, secret: &str) -> Result<String, NotifierError> {
    let key = format!("{}\n{}", timestamp_secs, secret);
    let mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| NotifierError::Signing(e.to_string()))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// DingTalk signature: HMAC of `"<timestamp>\n<secret>"` keyed by the secret.
pub fn dingtalk_sign(timestamp_ms: i64, secret: &str) -> Result<String, NotifierError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| NotifierError::Signing(e.to_string()))?;
    mac.update(format!("{}\n{}", timestamp_ms, secret).as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

fn lark_payload(notification: &Notification, signature: Option<(i64, String)>) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "msg_type": "interactive",
        "card": {
            "config": { "wide_screen_mode": true },
            "header": {
                "title": { "tag": "plain_text", "content": notification.title },
                "template": notification.color,
            },
            "elements": [{
                "tag": "div",
                "text": { "tag": "plain_text", "content": notification.body },
            }],
        },
    });

    if let (Some((timestamp, sign)), Some(obj)) = (signature, payload.as_object_mut()) {
        obj.insert("timestamp".to_string(), timestamp.to_string().into());
        obj.insert("sign".to_string(), sign.into());
    }
    payload
}

fn dingtalk_payload(notification: &Notification, mobiles: &[String]) -> serde_json::Value {
    let at_mobiles: &[String] = if notification.mention_all { mobiles } else { &[] };
    serde_json::json!({
        "msgtype": "text",
        "text": { "content": format!("{}\n\n{}", notification.title, notification.body) },
        "at": { "atMobiles": at_mobiles, "isAtAll": false },
    })
}

fn check_lark_response(body: &serde_json::Value) -> Result<(), NotifierError> {
    let code = body
        .get("code")
        .or_else(|| body.get("StatusCode"))
        .and_then(|c| c.as_i64())
        .unwrap_or(0);
    if code == 0 {
        return Ok(());
    }
    let msg = body
        .get("msg")
        .or_else(|| body.get("StatusMessage"))
        .and_then(|m| m.as_str())
        .unwrap_or("unknown");
    Err(NotifierError::Webhook(format!("Lark error {}: {}", code, msg)))
}

fn check_dingtalk_response(body: &serde_json::Value) -> Result<(), NotifierError> {
    match body.get("errcode").and_then(|c| c.as_i64()) {
        Some(0) | None => Ok(()),
        Some(code) => {
            let msg = body
                .get("errmsg")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown");
            Err(NotifierError::Webhook(format!("DingTalk error {}: {}", code, msg)))
        }
    }
}

/// Notifier errors
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("Multiple notification failures: {0:?}")]
    Multiple(Vec<NotifierError>),
}
