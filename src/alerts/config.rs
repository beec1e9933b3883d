//! Notification types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A message handed to every notification target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    /// Card color / template name, interpreted by the target
    pub color: String,
    pub body: String,
    /// Mention the configured on-call recipients
    pub mention_all: bool,
}

impl Notification {
    pub fn new(title: impl Into<String>, color: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            color: color.into(),
            body: body.into(),
            mention_all: false,
        }
    }

    pub fn with_mention(mut self, mention_all: bool) -> Self {
        self.mention_all = mention_all;
        self
    }
}

/// Notification target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotifyTarget {
    /// Log to tracing
    Log,
    /// Plain JSON webhook
    Webhook {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    /// Lark / Feishu custom bot, card message
    Lark {
        url: String,
        #[serde(default)]
        secret: String,
    },
    /// DingTalk custom bot, text message
    DingTalk {
        url: String,
        #[serde(default)]
        secret: String,
        /// Phone numbers mentioned on alerts
        #[serde(default)]
        mobiles: Vec<String>,
    },
}

impl NotifyTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            NotifyTarget::Log => "log",
            NotifyTarget::Webhook { .. } => "webhook",
            NotifyTarget::Lark { .. } => "lark",
            NotifyTarget::DingTalk { .. } => "dingtalk",
        }
    }
}
