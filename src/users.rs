use ammonia::Builder;
use spin_sdk::http::Request;
use tracing::info;

use crate::config::*;
use crate::core::errors::{ApiError, ApiResult, StoreResult};
use crate::core::helpers::{hash_password, json_response, parse_body};
use crate::core::store::{load_all, next_id, push_to_list, KvStore};
use crate::models::models::User;

fn sanitize_text(text: &str) -> String {
    // Plain text only: ammonia with every tag disabled strips all HTML
    Builder::default()
        .tags(std::collections::HashSet::new())
        .clean(text)
        .to_string()
}

fn build_user_json(user: &User) -> serde_json::Value {
    serde_json::json!({
        "id": user.id,
        "username": user.username,
    })
}

pub fn get_user<S: KvStore>(store: &S, user_id: u64) -> StoreResult<Option<User>> {
    store.get_json(&user_key(user_id))
}

pub fn find_by_username<S: KvStore>(store: &S, username: &str) -> StoreResult<Option<User>> {
    let users: Vec<User> = load_all(store, USERS_LIST_KEY, user_key)?;
    Ok(users.into_iter().find(|u| u.username == username))
}

/// Stores a new account. Usernames are unique; callers validate lengths.
pub fn insert_user<S: KvStore>(
    store: &S,
    username: &str,
    password: &str,
    is_superuser: bool,
) -> Result<User, ApiError> {
    let username = sanitize_text(username);
    if username.trim().is_empty() {
        return Err(ApiError::BadRequest("Username is required".to_string()));
    }
    if find_by_username(store, &username)?.is_some() {
        return Err(ApiError::Conflict("Username exists".to_string()));
    }

    let user = User {
        id: next_id(store, "user")?,
        username,
        password: hash_password(password)?,
        is_superuser,
    };

    store.set_json(&user_key(user.id), &user)?;
    push_to_list(store, USERS_LIST_KEY, user.id)?;

    info!(user_id = user.id, username = %user.username, is_superuser, "user created");
    Ok(user)
}

pub fn create_superuser<S: KvStore>(store: &S, username: &str, password: &str) -> Result<User, ApiError> {
    insert_user(store, username, password, true)
}

pub fn create_user<S: KvStore>(store: &S, req: &Request) -> ApiResult {
    let new_user: serde_json::Value = parse_body(req.body())?;
    let username = sanitize_text(new_user["username"].as_str().unwrap_or(""));
    let password = new_user["password"].as_str().unwrap_or("");

    if username.trim().is_empty() {
        return Err(ApiError::BadRequest("Username is required".to_string()));
    }
    let length = username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&length) {
        return Err(ApiError::BadRequest(format!(
            "Username must be {}-{} characters",
            MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH
        )));
    }
    if password.is_empty() {
        return Err(ApiError::BadRequest("Password is required".to_string()));
    }
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    let user = insert_user(store, &username, password, false)?;
    Ok(json_response(201, &build_user_json(&user))?)
}
