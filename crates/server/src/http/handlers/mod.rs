pub mod rules;
pub mod webhook;

use axum::http::{header, HeaderMap, StatusCode};
use domain::{Account, Error};
use storage::AccountStore;

use crate::state::AppState;

pub(crate) type ApiError = (StatusCode, String);

/// Bearer 鉴权：token 即账号能力，由 OAuth 流程写入 accounts 表
pub(crate) async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Account, ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or((
            StatusCode::UNAUTHORIZED,
            "Missing Authorization header".to_string(),
        ))?;

    match state.db.account_by_token(token).await {
        Ok(Some(account)) => Ok(account),
        Ok(None) => Err((StatusCode::UNAUTHORIZED, "Not authenticated".to_string())),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

pub(crate) fn error_response(e: Error) -> ApiError {
    let status = match e {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Forbidden => StatusCode::FORBIDDEN,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::Delivery(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}
