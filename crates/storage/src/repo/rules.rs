use super::{db_err, is_unique_violation};
use crate::{models::SqlRule, new_id, traits::RuleStore, Db};
use async_trait::async_trait;
use chrono::Utc;
use domain::{Error, NewRule, Rule, RuleUpdate};

#[async_trait]
impl RuleStore for Db {
    async fn active_rule_for_media(&self, media_id: &str) -> Result<Option<Rule>, Error> {
        let row = sqlx::query_as::<_, SqlRule>(
            "SELECT * FROM rules WHERE media_id = ? AND active LIMIT 1",
        )
        .bind(media_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(Into::into))
    }

    async fn rule(&self, id: &str) -> Result<Option<Rule>, Error> {
        let row = sqlx::query_as::<_, SqlRule>("SELECT * FROM rules WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(row.map(Into::into))
    }

    async fn rules_for_account(&self, account_id: &str) -> Result<Vec<Rule>, Error> {
        let rows = sqlx::query_as::<_, SqlRule>(
            "SELECT * FROM rules WHERE account_id = ? ORDER BY created_at DESC",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_rule(&self, account_id: &str, new: &NewRule) -> Result<Rule, Error> {
        new.validate()?;

        let now = Utc::now().naive_utc();
        let rule = Rule {
            id: new_id(),
            account_id: account_id.to_string(),
            media_id: new.media_id.trim().to_string(),
            media_thumbnail: new.media_thumbnail.clone(),
            media_caption: new.media_caption.clone(),
            keyword: new.keyword.trim().to_string(),
            dm_message: new.dm_message.trim().to_string(),
            reply_once_per_user: new.reply_once_per_user,
            active: true,
            dms_sent: 0,
            created_at: now,
            updated_at: now,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO rules (
                id, account_id, media_id, media_thumbnail, media_caption,
                keyword, dm_message, reply_once_per_user, active, dms_sent,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.account_id)
        .bind(&rule.media_id)
        .bind(&rule.media_thumbnail)
        .bind(&rule.media_caption)
        .bind(&rule.keyword)
        .bind(&rule.dm_message)
        .bind(rule.reply_once_per_user)
        .bind(rule.active)
        .bind(rule.dms_sent)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(rule),
            // 唯一索引 ux_rules_active_media 兜底"每个媒体一条启用规则"
            Err(ref e) if is_unique_violation(e) => Err(Error::Conflict(
                "An automation rule already exists for this post. Edit or delete it first."
                    .to_string(),
            )),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn update_rule(&self, id: &str, update: &RuleUpdate) -> Result<Rule, Error> {
        update.validate()?;

        let mut rule = self
            .rule(id)
            .await?
            .ok_or_else(|| Error::NotFound("Rule".to_string()))?;

        if let Some(ref keyword) = update.keyword {
            rule.keyword = keyword.trim().to_string();
        }
        if let Some(ref message) = update.dm_message {
            rule.dm_message = message.trim().to_string();
        }
        if let Some(reply_once) = update.reply_once_per_user {
            rule.reply_once_per_user = reply_once;
        }
        if let Some(active) = update.active {
            rule.active = active;
        }
        rule.updated_at = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            UPDATE rules
            SET keyword = ?, dm_message = ?, reply_once_per_user = ?,
                active = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&rule.keyword)
        .bind(&rule.dm_message)
        .bind(rule.reply_once_per_user)
        .bind(rule.active)
        .bind(rule.updated_at)
        .bind(&rule.id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(rule),
            // 重新启用时撞上同媒体的另一条启用规则
            Err(ref e) if is_unique_violation(e) => Err(Error::Conflict(
                "Another active rule already exists for this post.".to_string(),
            )),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn delete_rule(&self, id: &str) -> Result<(), Error> {
        // 只删规则行，delivery_log 没有外键，审计记录保留
        let result = sqlx::query("DELETE FROM rules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Rule".to_string()));
        }
        Ok(())
    }
}
