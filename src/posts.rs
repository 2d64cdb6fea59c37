use ammonia::Builder;
use chrono::Utc;
use spin_sdk::http::{Method, Request};
use tracing::{debug, info};

use crate::auth::principal;
use crate::comments::{comments_for_post, delete_comments_for_post};
use crate::config::*;
use crate::core::errors::{ApiError, ApiResult, StoreResult};
use crate::core::helpers::{json_response, no_content, parse_body, refreshed};
use crate::core::store::{load_all, next_id, push_to_list, remove_from_list, KvStore};
use crate::models::models::{Post, User};
use crate::permissions::{check_collection, check_object, IsOwnerOrAdminOrReadOnly, Principal};
use crate::serializers::{post_detail, post_summary, Links, PostInput};
use crate::users::get_user;

/// Strips script tags, event handlers and other unsafe HTML from user text.
pub(crate) fn sanitize_body(content: &str) -> String {
    Builder::default()
        .link_rel(Some("noopener noreferrer"))
        .clean(content)
        .to_string()
}

/// Sanitises `body` and returns the cleaned text, rejecting input that is
/// too long or has nothing left once markup is stripped.
pub(crate) fn validate_body(body: &str) -> Result<String, ApiError> {
    if body.chars().count() > MAX_BODY_LENGTH {
        return Err(ApiError::BadRequest("Invalid body".to_string()));
    }
    let clean = sanitize_body(body);
    if clean.trim().is_empty() {
        return Err(ApiError::BadRequest("Invalid body".to_string()));
    }
    Ok(clean)
}

fn validate_title(title: &str) -> Result<(), ApiError> {
    if title.trim().is_empty() || title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ApiError::BadRequest("Invalid title".to_string()));
    }
    Ok(())
}

// === Storage ===

pub fn get_post<S: KvStore>(store: &S, post_id: u64) -> StoreResult<Option<Post>> {
    store.get_json(&post_key(post_id))
}

pub fn all_posts<S: KvStore>(store: &S) -> StoreResult<Vec<Post>> {
    let mut posts: Vec<Post> = load_all(store, POSTS_LIST_KEY, post_key)?;
    posts.sort_by_key(|p| p.id);
    Ok(posts)
}

pub fn insert_post<S: KvStore>(store: &S, owner: u64, title: &str, body: &str) -> StoreResult<Post> {
    let now = Utc::now();
    let post = Post {
        id: next_id(store, "post")?,
        title: title.to_string(),
        body: sanitize_body(body),
        owner,
        created: now,
        updated: now,
    };

    store.set_json(&post_key(post.id), &post)?;
    push_to_list(store, POSTS_LIST_KEY, post.id)?;

    info!(post_id = post.id, owner, "post created");
    Ok(post)
}

pub fn save_post<S: KvStore>(store: &S, post: &mut Post) -> StoreResult<()> {
    post.updated = refreshed(post.updated);
    store.set_json(&post_key(post.id), post)
}

/// Removes the post together with every comment attached to it.
pub fn delete_post<S: KvStore>(store: &S, post_id: u64) -> StoreResult<()> {
    let removed = delete_comments_for_post(store, post_id)?;
    store.delete(&post_key(post_id))?;
    remove_from_list(store, POSTS_LIST_KEY, post_id)?;

    info!(post_id, comments_removed = removed, "post deleted");
    Ok(())
}

fn owner_of<S: KvStore>(store: &S, user_id: u64) -> Result<User, ApiError> {
    get_user(store, user_id)?
        .ok_or_else(|| ApiError::InternalError(format!("owner {} of stored entity is missing", user_id)))
}

// === HTTP Handlers ===

/// `/api/posts/`
pub fn handle_collection<S: KvStore>(store: &S, req: &Request) -> ApiResult {
    let principal = principal(store, req)?;
    check_collection(&IsOwnerOrAdminOrReadOnly, req.method(), &principal)?;

    match req.method() {
        Method::Get | Method::Head | Method::Options => list_posts(store),
        Method::Post => create_post(store, req, &principal),
        _ => Err(ApiError::MethodNotAllowed),
    }
}

/// `/api/posts/{id}/`
pub fn handle_detail<S: KvStore>(store: &S, req: &Request, post_id: u64, links: &Links) -> ApiResult {
    let principal = principal(store, req)?;
    check_collection(&IsOwnerOrAdminOrReadOnly, req.method(), &principal)?;

    let mut post = get_post(store, post_id)?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;
    check_object(&IsOwnerOrAdminOrReadOnly, req.method(), &principal, &post)?;

    match req.method() {
        Method::Get | Method::Head | Method::Options => {
            debug!(post_id, "post detail");
            render_detail(store, &post, links)
        }
        Method::Put => {
            let input: PostInput = parse_body(req.body())?;
            let (Some(title), Some(body)) = (input.title, input.body) else {
                return Err(ApiError::BadRequest("title and body are required".to_string()));
            };
            apply_update(store, &mut post, Some(title), Some(body), &principal)?;
            render_detail(store, &post, links)
        }
        Method::Patch => {
            let input: PostInput = parse_body(req.body())?;
            apply_update(store, &mut post, input.title, input.body, &principal)?;
            render_detail(store, &post, links)
        }
        Method::Delete => {
            delete_post(store, post_id)?;
            Ok(no_content())
        }
        _ => Err(ApiError::MethodNotAllowed),
    }
}

fn list_posts<S: KvStore>(store: &S) -> ApiResult {
    let mut summaries = Vec::new();
    for post in all_posts(store)? {
        let owner = owner_of(store, post.owner)?;
        summaries.push(post_summary(&post, &owner));
    }
    Ok(json_response(200, &summaries)?)
}

fn create_post<S: KvStore>(store: &S, req: &Request, principal: &Principal) -> ApiResult {
    let owner_id = principal.id().ok_or(ApiError::Unauthorized)?;
    let input: PostInput = parse_body(req.body())?;
    let title = input.title.unwrap_or_default();
    let body = input.body.unwrap_or_default();
    validate_title(&title)?;
    let body = validate_body(&body)?;

    let post = insert_post(store, owner_id, &title, &body)?;
    let owner = owner_of(store, post.owner)?;
    Ok(json_response(201, &post_summary(&post, &owner))?)
}

fn apply_update<S: KvStore>(
    store: &S,
    post: &mut Post,
    title: Option<String>,
    body: Option<String>,
    principal: &Principal,
) -> Result<(), ApiError> {
    if let Some(title) = title {
        validate_title(&title)?;
        post.title = title;
    }
    if let Some(body) = body {
        post.body = validate_body(&body)?;
    }
    save_post(store, post)?;
    info!(post_id = post.id, editor = ?principal.id(), "post updated");
    Ok(())
}

fn render_detail<S: KvStore>(store: &S, post: &Post, links: &Links) -> ApiResult {
    let owner = owner_of(store, post.owner)?;
    let comments = comments_for_post(store, post.id)?;
    Ok(json_response(200, &post_detail(post, &owner, &comments, links))?)
}
