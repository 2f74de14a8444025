//! 事件处理器：一次 Webhook 批次的编排核心。
//!
//! 每条评论记录独立走完自己的状态机，互不阻塞也互不拖累；
//! 任何单条失败都被吞成一条 failed 台账，绝不让批次本身报错，
//! 否则平台会把整个批次重投出一场风暴。

use crate::traits::Dispatcher;
use domain::webhook::{CommentEvent, WebhookPayload};
use domain::{matches, DeliveryStatus, Error, Rule};
use futures::future::join_all;
use std::sync::Arc;
use storage::{AccountStore, DeliveryLedger, RuleStore};
use tracing::{debug, error, info, warn};

/// 单条记录的终态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    NoRule,
    NoMatch,
    Skipped,
    Sent,
    Failed,
}

pub struct EventProcessor {
    rules: Arc<dyn RuleStore>,
    ledger: Arc<dyn DeliveryLedger>,
    accounts: Arc<dyn AccountStore>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl EventProcessor {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        ledger: Arc<dyn DeliveryLedger>,
        accounts: Arc<dyn AccountStore>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            rules,
            ledger,
            accounts,
            dispatcher,
        }
    }

    /// 整批处理。不会失败：调用方拿到结果后无条件向平台回 ACK。
    pub async fn process_batch(&self, payload: &WebhookPayload) -> Vec<Outcome> {
        if payload.object != "instagram" {
            debug!(object = %payload.object, "Ignoring non-instagram payload");
            return Vec::new();
        }

        let events = payload.comment_events();
        if events.is_empty() {
            return Vec::new();
        }

        // 各记录并发跑，一条记录里的节流等待不会卡住别的记录
        join_all(events.iter().map(|event| self.process_comment(event))).await
    }

    /// 单条记录的状态机，所有错误就地吞掉
    pub async fn process_comment(&self, event: &CommentEvent) -> Outcome {
        match self.try_process(event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    media = %event.media_id,
                    commenter = %event.commenter_id,
                    "Record processing failed: {}",
                    e
                );
                Outcome::Failed
            }
        }
    }

    async fn try_process(&self, event: &CommentEvent) -> Result<Outcome, Error> {
        // RULE_LOOKUP
        let Some(rule) = self.rules.active_rule_for_media(&event.media_id).await? else {
            debug!(media = %event.media_id, "No active rule for media");
            return Ok(Outcome::NoRule);
        };

        // KEYWORD_CHECK
        if !matches(&event.text, &rule.keyword) {
            debug!(rule = %rule.id, "Comment does not contain keyword");
            return Ok(Outcome::NoMatch);
        }

        if rule.reply_once_per_user {
            self.deliver_once(&rule, event).await
        } else {
            self.deliver_unconditionally(&rule, event).await
        }
    }

    /// reply-once 路径：占位即查重，发送结果落回占位行
    async fn deliver_once(&self, rule: &Rule, event: &CommentEvent) -> Result<Outcome, Error> {
        // DEDUP_CHECK 快路径
        if self
            .ledger
            .has_sent(&rule.id, &event.commenter_id)
            .await?
        {
            return self.skip(rule, event).await;
        }

        // 占位失败说明并发的另一条投递刚拿到键
        let Some(claim_id) = self
            .ledger
            .claim(
                &rule.id,
                &event.commenter_id,
                event.commenter_username.as_deref(),
                &event.text,
            )
            .await?
        else {
            return self.skip(rule, event).await;
        };

        // DISPATCHING
        match self.send_dm(rule, event).await {
            Ok(message_id) => {
                self.ledger
                    .finalize(&claim_id, DeliveryStatus::Sent, None)
                    .await?;
                self.ledger.increment_dms_sent(&rule.id).await?;
                info!(rule = %rule.id, recipient = %event.commenter_id, message_id, "DM sent");
                Ok(Outcome::Sent)
            }
            Err(e) => {
                // 发送失败是这条事件的终点：不自动重试，键释放给未来的重投
                warn!(rule = %rule.id, recipient = %event.commenter_id, "DM failed: {}", e);
                self.ledger
                    .finalize(&claim_id, DeliveryStatus::Failed, Some(&e.to_string()))
                    .await?;
                Ok(Outcome::Failed)
            }
        }
    }

    /// 不去重的规则：每次命中都发，结果直接追加
    async fn deliver_unconditionally(
        &self,
        rule: &Rule,
        event: &CommentEvent,
    ) -> Result<Outcome, Error> {
        let (status, error, outcome) = match self.send_dm(rule, event).await {
            Ok(message_id) => {
                info!(rule = %rule.id, recipient = %event.commenter_id, message_id, "DM sent");
                (DeliveryStatus::Sent, None, Outcome::Sent)
            }
            Err(e) => {
                warn!(rule = %rule.id, recipient = %event.commenter_id, "DM failed: {}", e);
                (DeliveryStatus::Failed, Some(e.to_string()), Outcome::Failed)
            }
        };

        self.ledger
            .record(
                &rule.id,
                &event.commenter_id,
                event.commenter_username.as_deref(),
                &event.text,
                status,
                error.as_deref(),
            )
            .await?;

        if status == DeliveryStatus::Sent {
            self.ledger.increment_dms_sent(&rule.id).await?;
        }
        Ok(outcome)
    }

    async fn skip(&self, rule: &Rule, event: &CommentEvent) -> Result<Outcome, Error> {
        info!(rule = %rule.id, recipient = %event.commenter_id, "Already sent, skipping");
        self.ledger
            .record(
                &rule.id,
                &event.commenter_id,
                event.commenter_username.as_deref(),
                &event.text,
                DeliveryStatus::Skipped,
                None,
            )
            .await?;
        Ok(Outcome::Skipped)
    }

    async fn send_dm(&self, rule: &Rule, event: &CommentEvent) -> Result<String, Error> {
        let account = self
            .accounts
            .account(&rule.account_id)
            .await?
            .ok_or_else(|| Error::Delivery("Owning account not found".to_string()))?;

        let delivery = self
            .dispatcher
            .send(
                &account.ig_user_id,
                &event.commenter_id,
                &rule.dm_message,
                &account.access_token,
            )
            .await?;

        Ok(delivery.message_id)
    }
}
