use super::db_err;
use crate::{models::SqlAccount, traits::AccountStore, Db};
use async_trait::async_trait;
use domain::{Account, Error};

#[async_trait]
impl AccountStore for Db {
    async fn account(&self, id: &str) -> Result<Option<Account>, Error> {
        let row = sqlx::query_as::<_, SqlAccount>("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(row.map(Into::into))
    }

    async fn account_by_token(&self, access_token: &str) -> Result<Option<Account>, Error> {
        let row = sqlx::query_as::<_, SqlAccount>("SELECT * FROM accounts WHERE access_token = ?")
            .bind(access_token)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(row.map(Into::into))
    }

    // OAuth 回调侧按 ig_user_id 覆盖写入（换 token 续期也走这里）
    async fn upsert_account(&self, account: &Account) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, ig_user_id, username, page_id, access_token,
                token_expires_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ig_user_id) DO UPDATE SET
                username = excluded.username,
                page_id = excluded.page_id,
                access_token = excluded.access_token,
                token_expires_at = excluded.token_expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&account.id)
        .bind(&account.ig_user_id)
        .bind(&account.username)
        .bind(&account.page_id)
        .bind(&account.access_token)
        .bind(account.token_expires_at)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
