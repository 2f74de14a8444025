//! Instagram Graph API 出站端。
//!
//! 每次 send 前有一段强制间隔（缺省 1.5s），这是对平台限流的
//! 让步策略而不是硬编码业务；间隔只阻塞当前这条记录的 future。

use crate::traits::{Delivery, Dispatcher};
use async_trait::async_trait;
use domain::Error;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.facebook.com/v18.0";

#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub base_url: String,
    pub pacing: Duration,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            pacing: Duration::from_millis(1500),
        }
    }
}

pub struct GraphDispatcher {
    http: reqwest::Client,
    config: GraphConfig,
}

impl GraphDispatcher {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// 成功响应带 message_id，错误响应带 error.message，两者都是 JSON
    fn classify(&self, body: serde_json::Value) -> Result<Delivery, Error> {
        if let Some(err) = body.get("error") {
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("Unknown provider error");
            return Err(Error::Delivery(message.to_string()));
        }
        match body.get("message_id").and_then(|m| m.as_str()) {
            Some(id) => Ok(Delivery {
                message_id: id.to_string(),
            }),
            None => Err(Error::Delivery(
                "Provider response missing message_id".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Dispatcher for GraphDispatcher {
    async fn send(
        &self,
        sender_ig_user_id: &str,
        recipient_id: &str,
        text: &str,
        access_token: &str,
    ) -> Result<Delivery, Error> {
        tokio::time::sleep(self.config.pacing).await;

        let url = format!("{}/{}/messages", self.config.base_url, sender_ig_user_id);
        debug!(recipient = recipient_id, "Sending DM via Graph API");

        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "recipient": { "id": recipient_id },
                "message": { "text": text },
                "access_token": access_token,
            }))
            .send()
            .await
            .map_err(|e| Error::Delivery(e.to_string()))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Delivery(e.to_string()))?;

        self.classify(body)
    }

    async fn ensure_subscription(&self, page_id: &str, access_token: &str) -> Result<(), Error> {
        let url = format!("{}/{}/subscribed_apps", self.config.base_url, page_id);

        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "subscribed_fields": ["feed", "mention", "comments"],
                "access_token": access_token,
            }))
            .send()
            .await
            .map_err(|e| Error::Delivery(e.to_string()))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Delivery(e.to_string()))?;

        if let Some(err) = body.get("error") {
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("Unknown provider error");
            return Err(Error::Delivery(message.to_string()));
        }
        Ok(())
    }
}

// --- 接入期的账号解析 ---

#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub access_token: String,
    pub instagram_business_account: Option<ConnectedAccount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectedAccount {
    pub id: String,
    pub username: String,
}

/// 在候选页面里按给定顺序找第一个挂了商业账号的页面。
/// 策略就是"第一个命中的赢"；遍历完没有就是没有，不做任何兜底。
pub fn first_connected_account(pages: &[Page]) -> Option<(&Page, &ConnectedAccount)> {
    pages
        .iter()
        .find_map(|page| page.instagram_business_account.as_ref().map(|acc| (page, acc)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: &str, connected: Option<&str>) -> Page {
        Page {
            id: id.into(),
            name: format!("page-{}", id),
            access_token: "tok".into(),
            instagram_business_account: connected.map(|c| ConnectedAccount {
                id: c.into(),
                username: format!("user-{}", c),
            }),
        }
    }

    #[test]
    fn first_match_wins_in_order() {
        let pages = vec![page("p1", None), page("p2", Some("ig2")), page("p3", Some("ig3"))];
        let (matched_page, account) = first_connected_account(&pages).unwrap();
        assert_eq!(matched_page.id, "p2");
        assert_eq!(account.id, "ig2");
    }

    #[test]
    fn exhausted_list_is_none() {
        assert!(first_connected_account(&[]).is_none());
        assert!(first_connected_account(&[page("p1", None), page("p2", None)]).is_none());
    }

    #[test]
    fn classify_provider_responses() {
        let dispatcher = GraphDispatcher::new(GraphConfig::default());

        let ok = dispatcher
            .classify(serde_json::json!({ "message_id": "mid.123" }))
            .unwrap();
        assert_eq!(ok.message_id, "mid.123");

        let err = dispatcher
            .classify(serde_json::json!({ "error": { "message": "token expired" } }))
            .unwrap_err();
        assert!(err.to_string().contains("token expired"));

        assert!(dispatcher.classify(serde_json::json!({})).is_err());
    }
}
