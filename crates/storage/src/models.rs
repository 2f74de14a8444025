use chrono::NaiveDateTime;
use domain::{Account, DeliveryStatus, Error, LedgerEntry, Rule};
use sqlx::FromRow;
use std::str::FromStr;

#[derive(FromRow)]
pub struct SqlRule {
    pub id: String,
    pub account_id: String,
    pub media_id: String,
    pub media_thumbnail: Option<String>,
    pub media_caption: Option<String>,
    pub keyword: String,
    pub dm_message: String,
    pub reply_once_per_user: bool,
    pub active: bool,
    pub dms_sent: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<SqlRule> for Rule {
    fn from(sql: SqlRule) -> Self {
        Rule {
            id: sql.id,
            account_id: sql.account_id,
            media_id: sql.media_id,
            media_thumbnail: sql.media_thumbnail,
            media_caption: sql.media_caption,
            keyword: sql.keyword,
            dm_message: sql.dm_message,
            reply_once_per_user: sql.reply_once_per_user,
            active: sql.active,
            dms_sent: sql.dms_sent,
            created_at: sql.created_at,
            updated_at: sql.updated_at,
        }
    }
}

#[derive(FromRow)]
pub struct SqlLedgerEntry {
    pub id: String,
    pub rule_id: String,
    pub recipient_id: String,
    pub recipient_username: Option<String>,
    pub comment_text: String,
    pub status: String,
    pub error: Option<String>,
    pub created_at: NaiveDateTime,
}

impl TryFrom<SqlLedgerEntry> for LedgerEntry {
    type Error = Error;

    fn try_from(sql: SqlLedgerEntry) -> Result<Self, Error> {
        let status = DeliveryStatus::from_str(&sql.status).map_err(Error::Internal)?;
        Ok(LedgerEntry {
            id: sql.id,
            rule_id: sql.rule_id,
            recipient_id: sql.recipient_id,
            recipient_username: sql.recipient_username,
            comment_text: sql.comment_text,
            status,
            error: sql.error,
            created_at: sql.created_at,
        })
    }
}

#[derive(FromRow)]
pub struct SqlAccount {
    pub id: String,
    pub ig_user_id: String,
    pub username: String,
    pub page_id: String,
    pub access_token: String,
    pub token_expires_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<SqlAccount> for Account {
    fn from(sql: SqlAccount) -> Self {
        Account {
            id: sql.id,
            ig_user_id: sql.ig_user_id,
            username: sql.username,
            page_id: sql.page_id,
            access_token: sql.access_token,
            token_expires_at: sql.token_expires_at,
            created_at: sql.created_at,
            updated_at: sql.updated_at,
        }
    }
}
