//! 存储抽象：业务逻辑只依赖这些 trait，不直接摸任何全局状态。

use async_trait::async_trait;
use domain::{Account, DeliveryStatus, Error, LedgerEntry, NewRule, Rule, RuleUpdate};

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// 命中该媒体的启用规则（至多一条，由唯一索引保证）
    async fn active_rule_for_media(&self, media_id: &str) -> Result<Option<Rule>, Error>;

    async fn rule(&self, id: &str) -> Result<Option<Rule>, Error>;

    async fn rules_for_account(&self, account_id: &str) -> Result<Vec<Rule>, Error>;

    async fn create_rule(&self, account_id: &str, new: &NewRule) -> Result<Rule, Error>;

    async fn update_rule(&self, id: &str, update: &RuleUpdate) -> Result<Rule, Error>;

    async fn delete_rule(&self, id: &str) -> Result<(), Error>;
}

#[async_trait]
pub trait DeliveryLedger: Send + Sync {
    /// 追加一条终态记录（skipped，或不去重规则的 sent/failed）
    #[allow(clippy::too_many_arguments)]
    async fn record(
        &self,
        rule_id: &str,
        recipient_id: &str,
        recipient_username: Option<&str>,
        comment_text: &str,
        status: DeliveryStatus,
        error: Option<&str>,
    ) -> Result<LedgerEntry, Error>;

    async fn has_sent(&self, rule_id: &str, recipient_id: &str) -> Result<bool, Error>;

    /// 原子占位：插入 pending 行并占住 (rule, recipient) 去重键。
    /// 返回 None 表示键已被占（已发送或正在发送），本次必须跳过。
    async fn claim(
        &self,
        rule_id: &str,
        recipient_id: &str,
        recipient_username: Option<&str>,
        comment_text: &str,
    ) -> Result<Option<String>, Error>;

    /// pending -> sent/failed；failed 会释放去重键，允许之后的重投重试
    async fn finalize(
        &self,
        claim_id: &str,
        status: DeliveryStatus,
        error: Option<&str>,
    ) -> Result<(), Error>;

    async fn entries_for_rule(&self, rule_id: &str) -> Result<Vec<LedgerEntry>, Error>;

    /// 规则计数器 +1，单条 SQL，天然原子
    async fn increment_dms_sent(&self, rule_id: &str) -> Result<(), Error>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn account(&self, id: &str) -> Result<Option<Account>, Error>;

    async fn account_by_token(&self, access_token: &str) -> Result<Option<Account>, Error>;

    async fn upsert_account(&self, account: &Account) -> Result<(), Error>;
}
