use spin_sdk::http::Request;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{token_expiration_hours, token_key, TOKENS_LIST_KEY};
use crate::core::errors::{ApiError, ApiResult, StoreResult};
use crate::core::helpers::{json_response, now_iso, parse_body, verify_password};
use crate::core::store::KvStore;
use crate::models::models::TokenData;
use crate::permissions::Principal;
use crate::users::{find_by_username, get_user};

pub fn issue_token<S: KvStore>(store: &S, user_id: u64) -> StoreResult<String> {
    let token = Uuid::new_v4().to_string();
    let data = TokenData {
        user_id,
        created_at: now_iso(),
    };
    store.set_json(&token_key(&token), &data)?;
    remember_token(store, &token)?;
    Ok(token)
}

/// Adds `token` to the token index, dropping expired or revoked entries
/// (and their records) on the way.
fn remember_token<S: KvStore>(store: &S, token: &str) -> StoreResult<()> {
    let tokens: Vec<String> = store.get_json(TOKENS_LIST_KEY)?.unwrap_or_default();
    let mut live = Vec::with_capacity(tokens.len() + 1);
    for existing in tokens {
        match store.get_json::<TokenData>(&token_key(&existing))? {
            Some(data) if !is_expired(&data) => live.push(existing),
            Some(_) => store.delete(&token_key(&existing))?,
            None => {}
        }
    }
    live.push(token.to_string());
    store.set_json(TOKENS_LIST_KEY, &live)
}

/// A token is expired once it is older than the configured lifetime.
/// An unreadable timestamp counts as expired.
fn is_expired(data: &TokenData) -> bool {
    match chrono::DateTime::parse_from_rfc3339(&data.created_at) {
        Ok(created) => {
            let age_hours = (chrono::Utc::now() - created.with_timezone(&chrono::Utc)).num_hours();
            age_hours > token_expiration_hours()
        }
        Err(_) => true,
    }
}

pub fn login_user<S: KvStore>(store: &S, req: &Request) -> ApiResult {
    let creds: serde_json::Value = parse_body(req.body())?;
    let username = creds["username"].as_str().unwrap_or_default();
    let password = creds["password"].as_str().unwrap_or_default();

    let user = match find_by_username(store, username)? {
        Some(u) if verify_password(password, &u.password) => u,
        _ => return Err(ApiError::Unauthorized),
    };

    let token = issue_token(store, user.id)?;
    info!(user_id = user.id, "login");

    let resp = serde_json::json!({
        "token": token,
        "user_id": user.id
    });
    Ok(json_response(200, &resp)?)
}

pub fn logout_user<S: KvStore>(store: &S, req: &Request) -> ApiResult {
    let token = bearer_token(req).ok_or(ApiError::Unauthorized)?;
    store.delete(&token_key(token))?;

    let mut tokens: Vec<String> = store.get_json(TOKENS_LIST_KEY)?.unwrap_or_default();
    tokens.retain(|t| t != token);
    store.set_json(TOKENS_LIST_KEY, &tokens)?;

    let resp = serde_json::json!({
        "message": "Logged out successfully"
    });
    Ok(json_response(200, &resp)?)
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.header("Authorization")?
        .as_str()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolves the bearer token to a user id, if it is known and unexpired.
pub fn validate_token<S: KvStore>(store: &S, req: &Request) -> StoreResult<Option<u64>> {
    let Some(token) = bearer_token(req) else {
        return Ok(None);
    };
    let Some(data) = store.get_json::<TokenData>(&token_key(token))? else {
        debug!("unknown token");
        return Ok(None);
    };

    if is_expired(&data) {
        debug!(user_id = data.user_id, "expired token");
        return Ok(None);
    }

    Ok(Some(data.user_id))
}

/// The request's principal; anything short of a valid token for an
/// existing user is anonymous.
pub fn principal<S: KvStore>(store: &S, req: &Request) -> StoreResult<Principal> {
    let Some(user_id) = validate_token(store, req)? else {
        return Ok(Principal::Anonymous);
    };
    Ok(get_user(store, user_id)?
        .map(|user| Principal::from_user(&user))
        .unwrap_or(Principal::Anonymous))
}
