use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use domain::webhook::WebhookPayload;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::signature;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// 平台握手：mode + token 对上才回显 challenge，无状态
pub async fn verify(State(state): State<AppState>, Query(params): Query<VerifyParams>) -> Response {
    if params.mode.as_deref() == Some("subscribe")
        && params.verify_token.as_deref() == Some(state.verify_token.as_str())
    {
        info!("Webhook verified successfully");
        return (StatusCode::OK, params.challenge.unwrap_or_default()).into_response();
    }
    (StatusCode::FORBIDDEN, "Forbidden").into_response()
}

/// 事件入口。处理结果无论如何都回 200 ACK：
/// 回非 200 只会让平台重投整批，制造重复通知
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(ref secret) = state.app_secret {
        let header = headers
            .get("X-Hub-Signature-256")
            .and_then(|h| h.to_str().ok());
        if !signature::verify_sha256(secret, &body, header) {
            warn!("Webhook payload signature mismatch");
            return (StatusCode::FORBIDDEN, "Invalid signature").into_response();
        }
    }

    match serde_json::from_slice::<WebhookPayload>(&body) {
        Ok(payload) => {
            let outcomes = state.processor.process_batch(&payload).await;
            debug!(records = outcomes.len(), "Webhook batch processed");
        }
        Err(e) => {
            // 解析不了也要 ACK
            warn!("Ignoring unparseable webhook body: {}", e);
        }
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({ "received": true })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;

    fn verify_params(mode: &str, token: &str, challenge: &str) -> VerifyParams {
        VerifyParams {
            mode: Some(mode.into()),
            verify_token: Some(token.into()),
            challenge: Some(challenge.into()),
        }
    }

    #[tokio::test]
    async fn handshake_echoes_challenge_only_on_token_match() {
        let state = test_state(None).await;

        let resp = verify(
            State(state.clone()),
            Query(verify_params("subscribe", "hub_token", "12345")),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = verify(
            State(state.clone()),
            Query(verify_params("subscribe", "wrong", "12345")),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = verify(
            State(state.clone()),
            Query(verify_params("unsubscribe", "hub_token", "12345")),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = verify(
            State(state),
            Query(VerifyParams {
                mode: None,
                verify_token: None,
                challenge: None,
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn any_body_is_acknowledged_with_200() {
        let state = test_state(None).await;

        let bodies: Vec<Bytes> = vec![
            Bytes::from_static(b"not json at all"),
            Bytes::from_static(br#"{"object":"page","entry":[]}"#),
            Bytes::from_static(br#"{"entry":[{"changes":[{"field":"comments","value":{}}]}]}"#),
            Bytes::from_static(br#"{}"#),
        ];

        for body in bodies {
            let resp = receive(State(state.clone()), HeaderMap::new(), body).await;
            assert_eq!(resp.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn signature_enforced_when_secret_configured() {
        let state = test_state(Some("app_secret".into())).await;
        let body = Bytes::from_static(br#"{"object":"instagram","entry":[]}"#);

        // 缺签名
        let resp = receive(State(state.clone()), HeaderMap::new(), body.clone()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        // 正确签名
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Hub-Signature-256",
            crate::signature::tests_sign("app_secret", &body).parse().unwrap(),
        );
        let resp = receive(State(state), headers, body).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
