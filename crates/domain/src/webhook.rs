//! 入站 Webhook 载荷模型。
//!
//! 载荷来自外部平台，完全不可信：所有字段带 default，未知字段忽略，
//! 解析永远不应让上层把一个畸形批次当作传输层错误处理。

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub from: Commenter,
    #[serde(default)]
    pub media: MediaRef,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Commenter {
    #[serde(default)]
    pub id: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaRef {
    #[serde(default)]
    pub id: String,
}

/// 从批次中抽出的单条评论事件，处理器的最小工作单元。
#[derive(Debug, Clone)]
pub struct CommentEvent {
    pub media_id: String,
    pub commenter_id: String,
    pub commenter_username: Option<String>,
    pub text: String,
}

impl WebhookPayload {
    /// 只取 `field == "comments"` 的变更；缺 id 的畸形记录直接丢弃。
    pub fn comment_events(&self) -> Vec<CommentEvent> {
        self.entry
            .iter()
            .flat_map(|entry| entry.changes.iter())
            .filter(|change| change.field == "comments")
            .filter(|change| !change.value.from.id.is_empty() && !change.value.media.id.is_empty())
            .map(|change| CommentEvent {
                media_id: change.value.media.id.clone(),
                commenter_id: change.value.from.id.clone(),
                commenter_username: change.value.from.username.clone(),
                text: change.value.text.clone(),
            })
            .collect()
    }
}
