use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use domain::{Error, LedgerEntry, NewRule, Rule, RuleUpdate};
use storage::{DeliveryLedger, RuleStore};
use tracing::warn;

use super::{authenticate, error_response, ApiError};
use crate::state::AppState;

/// 404 在 403 之前：不暴露"规则存在但不是你的"
async fn owned_rule(state: &AppState, account_id: &str, rule_id: &str) -> Result<Rule, ApiError> {
    let rule = state
        .db
        .rule(rule_id)
        .await
        .map_err(error_response)?
        .ok_or_else(|| error_response(Error::NotFound("Automation".to_string())))?;

    if rule.account_id != account_id {
        return Err(error_response(Error::Forbidden));
    }
    Ok(rule)
}

pub async fn list_rules(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Rule>>, ApiError> {
    let account = authenticate(&state, &headers).await?;

    let rules = state
        .db
        .rules_for_account(&account.id)
        .await
        .map_err(error_response)?;

    Ok(Json(rules))
}

pub async fn create_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewRule>,
) -> Result<(StatusCode, Json<Rule>), ApiError> {
    let account = authenticate(&state, &headers).await?;

    let rule = state
        .db
        .create_rule(&account.id, &payload)
        .await
        .map_err(error_response)?;

    // 尽力而为的订阅保障：失败只记日志，规则照样创建成功
    if let Err(e) = state
        .dispatcher
        .ensure_subscription(&account.page_id, &account.access_token)
        .await
    {
        warn!(account = %account.id, "Webhook subscription setup failed, continuing: {}", e);
    }

    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn patch_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(update): Json<RuleUpdate>,
) -> Result<Json<Rule>, ApiError> {
    let account = authenticate(&state, &headers).await?;
    owned_rule(&state, &account.id, &id).await?;

    let updated = state
        .db
        .update_rule(&id, &update)
        .await
        .map_err(error_response)?;

    Ok(Json(updated))
}

pub async fn delete_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let account = authenticate(&state, &headers).await?;
    owned_rule(&state, &account.id, &id).await?;

    state.db.delete_rule(&id).await.map_err(error_response)?;

    Ok(Json(serde_json::json!({ "success": true })))
}

/// 规则的投递台账（仪表盘审计视图）
pub async fn rule_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<LedgerEntry>>, ApiError> {
    let account = authenticate(&state, &headers).await?;
    owned_rule(&state, &account.id, &id).await?;

    let entries = state
        .db
        .entries_for_rule(&id)
        .await
        .map_err(error_response)?;

    Ok(Json(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;
    use chrono::Utc;
    use domain::Account;
    use storage::AccountStore;

    async fn seed_account(state: &AppState, id: &str, token: &str) {
        let now = Utc::now().naive_utc();
        state
            .db
            .upsert_account(&Account {
                id: id.into(),
                ig_user_id: format!("ig_{}", id),
                username: id.into(),
                page_id: format!("page_{}", id),
                access_token: token.into(),
                token_expires_at: now + chrono::Duration::days(60),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {}", token).parse().unwrap(),
        );
        headers
    }

    fn payload(media_id: &str) -> NewRule {
        NewRule {
            media_id: media_id.into(),
            media_thumbnail: None,
            media_caption: None,
            keyword: "LINK".into(),
            dm_message: "here: example.com".into(),
            reply_once_per_user: true,
        }
    }

    #[tokio::test]
    async fn create_succeeds_even_when_subscription_setup_fails() {
        let state = test_state(None).await;
        seed_account(&state, "acc_a", "tok_a").await;

        // test_state 的 dispatcher 指向废端口，ensure_subscription 必然失败
        let (status, Json(rule)) = create_rule(
            State(state.clone()),
            bearer("tok_a"),
            Json(payload("post1")),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert!(rule.active);
        assert_eq!(state.db.rules_for_account("acc_a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unauthenticated_requests_are_rejected() {
        let state = test_state(None).await;

        let err = list_rules(State(state.clone()), HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);

        let err = list_rules(State(state), bearer("unknown_token"))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn ownership_is_isolated_between_accounts() {
        let state = test_state(None).await;
        seed_account(&state, "acc_a", "tok_a").await;
        seed_account(&state, "acc_b", "tok_b").await;

        let (_, Json(rule)) = create_rule(
            State(state.clone()),
            bearer("tok_a"),
            Json(payload("post1")),
        )
        .await
        .unwrap();

        // B 改不动 A 的规则
        let err = patch_rule(
            State(state.clone()),
            bearer("tok_b"),
            Path(rule.id.clone()),
            Json(RuleUpdate {
                keyword: Some("hijacked".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::FORBIDDEN);

        let err = delete_rule(State(state.clone()), bearer("tok_b"), Path(rule.id.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::FORBIDDEN);

        // 规则原样无损
        let unchanged = state.db.rule(&rule.id).await.unwrap().unwrap();
        assert_eq!(unchanged.keyword, "LINK");

        // 主人自己可以改
        let Json(updated) = patch_rule(
            State(state),
            bearer("tok_a"),
            Path(rule.id),
            Json(RuleUpdate {
                keyword: Some("promo".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(updated.keyword, "promo");
    }

    #[tokio::test]
    async fn missing_rule_is_404_and_conflict_is_409() {
        let state = test_state(None).await;
        seed_account(&state, "acc_a", "tok_a").await;

        let err = patch_rule(
            State(state.clone()),
            bearer("tok_a"),
            Path("nope".into()),
            Json(RuleUpdate::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);

        create_rule(
            State(state.clone()),
            bearer("tok_a"),
            Json(payload("post1")),
        )
        .await
        .unwrap();
        let err = create_rule(State(state.clone()), bearer("tok_a"), Json(payload("post1")))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::CONFLICT);

        // 超长关键词
        let mut bad = payload("post2");
        bad.keyword = "k".repeat(51);
        let err = create_rule(State(state), bearer("tok_a"), Json(bad))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }
}
