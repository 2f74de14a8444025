use super::db_err;
use crate::{models::SqlLedgerEntry, new_id, traits::DeliveryLedger, Db};
use async_trait::async_trait;
use chrono::Utc;
use domain::{DeliveryStatus, Error, LedgerEntry};

#[async_trait]
impl DeliveryLedger for Db {
    async fn record(
        &self,
        rule_id: &str,
        recipient_id: &str,
        recipient_username: Option<&str>,
        comment_text: &str,
        status: DeliveryStatus,
        error: Option<&str>,
    ) -> Result<LedgerEntry, Error> {
        let entry = LedgerEntry {
            id: new_id(),
            rule_id: rule_id.to_string(),
            recipient_id: recipient_id.to_string(),
            recipient_username: recipient_username.map(str::to_string),
            comment_text: comment_text.to_string(),
            status,
            error: error.map(str::to_string),
            created_at: Utc::now().naive_utc(),
        };

        sqlx::query(
            r#"
            INSERT INTO delivery_log (
                id, rule_id, recipient_id, recipient_username,
                comment_text, status, error, dedup_key, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.rule_id)
        .bind(&entry.recipient_id)
        .bind(&entry.recipient_username)
        .bind(&entry.comment_text)
        .bind(entry.status.as_str())
        .bind(&entry.error)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(entry)
    }

    async fn has_sent(&self, rule_id: &str, recipient_id: &str) -> Result<bool, Error> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM delivery_log
                WHERE rule_id = ? AND recipient_id = ? AND status = 'sent'
            )
            "#,
        )
        .bind(rule_id)
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.0 != 0)
    }

    async fn claim(
        &self,
        rule_id: &str,
        recipient_id: &str,
        recipient_username: Option<&str>,
        comment_text: &str,
    ) -> Result<Option<String>, Error> {
        let id = new_id();
        let dedup_key = format!("{}:{}", rule_id, recipient_id);
        let now = Utc::now().naive_utc();

        // INSERT OR IGNORE 撞上 ux_delivery_dedup 即告负：
        // 占位与查重是同一条语句，并发下两边不可能都拿到键
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO delivery_log (
                id, rule_id, recipient_id, recipient_username,
                comment_text, status, error, dedup_key, created_at
            )
            VALUES (?, ?, ?, ?, ?, 'pending', NULL, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(rule_id)
        .bind(recipient_id)
        .bind(recipient_username)
        .bind(comment_text)
        .bind(&dedup_key)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(id))
    }

    async fn finalize(
        &self,
        claim_id: &str,
        status: DeliveryStatus,
        error: Option<&str>,
    ) -> Result<(), Error> {
        if !matches!(status, DeliveryStatus::Sent | DeliveryStatus::Failed) {
            return Err(Error::Internal(format!(
                "Cannot finalize claim to status {}",
                status
            )));
        }

        // failed 释放去重键，平台重投时允许再试；sent 永久占住
        let result = sqlx::query(
            r#"
            UPDATE delivery_log
            SET status = ?,
                error = ?,
                dedup_key = CASE WHEN ? = 'failed' THEN NULL ELSE dedup_key END
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(status.as_str())
        .bind(claim_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Pending ledger entry".to_string()));
        }
        Ok(())
    }

    async fn entries_for_rule(&self, rule_id: &str) -> Result<Vec<LedgerEntry>, Error> {
        let rows = sqlx::query_as::<_, SqlLedgerEntry>(
            r#"
            SELECT id, rule_id, recipient_id, recipient_username,
                   comment_text, status, error, created_at
            FROM delivery_log
            WHERE rule_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(rule_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn increment_dms_sent(&self, rule_id: &str) -> Result<(), Error> {
        sqlx::query("UPDATE rules SET dms_sent = dms_sent + 1 WHERE id = ?")
            .bind(rule_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        traits::{DeliveryLedger, RuleStore},
        Db,
    };
    use domain::{DeliveryStatus, NewRule};

    async fn db_with_rule() -> (Db, String) {
        let db = Db::in_memory().await.unwrap();
        let rule = db
            .create_rule(
                "acc1",
                &NewRule {
                    media_id: "post1".into(),
                    media_thumbnail: None,
                    media_caption: None,
                    keyword: "LINK".into(),
                    dm_message: "here".into(),
                    reply_once_per_user: true,
                },
            )
            .await
            .unwrap();
        (db, rule.id)
    }

    #[tokio::test]
    async fn claim_is_exclusive_per_recipient() {
        let (db, rule_id) = db_with_rule().await;

        let first = db.claim(&rule_id, "u1", None, "text").await.unwrap();
        assert!(first.is_some());

        // 键被 pending 占住，第二次占位必须失败
        let second = db.claim(&rule_id, "u1", None, "text").await.unwrap();
        assert!(second.is_none());

        // 其他评论者不受影响
        assert!(db.claim(&rule_id, "u2", None, "text").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sent_claim_blocks_forever_failed_claim_frees_key() {
        let (db, rule_id) = db_with_rule().await;

        let claim = db.claim(&rule_id, "u1", None, "text").await.unwrap().unwrap();
        db.finalize(&claim, DeliveryStatus::Sent, None).await.unwrap();

        assert!(db.has_sent(&rule_id, "u1").await.unwrap());
        assert!(db.claim(&rule_id, "u1", None, "text").await.unwrap().is_none());

        let claim = db.claim(&rule_id, "u2", None, "text").await.unwrap().unwrap();
        db.finalize(&claim, DeliveryStatus::Failed, Some("provider said no"))
            .await
            .unwrap();

        assert!(!db.has_sent(&rule_id, "u2").await.unwrap());
        // 失败后重投可以再次占位
        assert!(db.claim(&rule_id, "u2", None, "text").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn finalize_is_single_shot() {
        let (db, rule_id) = db_with_rule().await;

        let claim = db.claim(&rule_id, "u1", None, "text").await.unwrap().unwrap();
        db.finalize(&claim, DeliveryStatus::Sent, None).await.unwrap();

        // 终态行不可再改写
        assert!(db
            .finalize(&claim, DeliveryStatus::Failed, Some("late"))
            .await
            .is_err());

        let entries = db.entries_for_rule(&rule_id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn skipped_entries_append_freely() {
        let (db, rule_id) = db_with_rule().await;

        for _ in 0..3 {
            db.record(&rule_id, "u1", Some("alice"), "text", DeliveryStatus::Skipped, None)
                .await
                .unwrap();
        }

        let entries = db.entries_for_rule(&rule_id).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.status == DeliveryStatus::Skipped));
        assert!(!db.has_sent(&rule_id, "u1").await.unwrap());
    }

    #[tokio::test]
    async fn ledger_outlives_rule_deletion() {
        let (db, rule_id) = db_with_rule().await;

        let claim = db.claim(&rule_id, "u1", None, "text").await.unwrap().unwrap();
        db.finalize(&claim, DeliveryStatus::Sent, None).await.unwrap();

        db.delete_rule(&rule_id).await.unwrap();
        assert_eq!(db.entries_for_rule(&rule_id).await.unwrap().len(), 1);
    }
}
