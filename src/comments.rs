use chrono::Utc;
use spin_sdk::http::{Method, Request};
use tracing::info;

use crate::auth::principal;
use crate::config::*;
use crate::core::errors::{ApiError, ApiResult, StoreResult};
use crate::core::helpers::{json_response, no_content, parse_body, refreshed};
use crate::core::store::{load_all, load_list, next_id, push_to_list, remove_from_list, KvStore};
use crate::models::models::Comment;
use crate::permissions::{check_collection, check_object, IsOwnerOrAdminOrReadOnly};
use crate::posts::{get_post, sanitize_body, validate_body};
use crate::serializers::{comment_view, CommentInput, CommentView, Links};
use crate::users::get_user;

// === Storage ===

pub fn get_comment<S: KvStore>(store: &S, comment_id: u64) -> StoreResult<Option<Comment>> {
    store.get_json(&comment_key(comment_id))
}

/// The post's comments in id order.
pub fn comments_for_post<S: KvStore>(store: &S, post_id: u64) -> StoreResult<Vec<Comment>> {
    let mut comments: Vec<Comment> = load_all(store, &post_comments_key(post_id), comment_key)?;
    comments.sort_by_key(|c| c.id);
    Ok(comments)
}

pub fn insert_comment<S: KvStore>(store: &S, post_id: u64, owner: u64, body: &str) -> StoreResult<Comment> {
    let now = Utc::now();
    let comment = Comment {
        id: next_id(store, "comment")?,
        post: post_id,
        owner,
        body: sanitize_body(body),
        created: now,
        updated: now,
    };

    store.set_json(&comment_key(comment.id), &comment)?;
    push_to_list(store, &post_comments_key(post_id), comment.id)?;

    info!(comment_id = comment.id, post_id, owner, "comment created");
    Ok(comment)
}

pub fn delete_comment<S: KvStore>(store: &S, comment: &Comment) -> StoreResult<()> {
    store.delete(&comment_key(comment.id))?;
    remove_from_list(store, &post_comments_key(comment.post), comment.id)?;
    info!(comment_id = comment.id, post_id = comment.post, "comment deleted");
    Ok(())
}

/// Drops every comment of a post along with the post's index. Returns how many went.
pub fn delete_comments_for_post<S: KvStore>(store: &S, post_id: u64) -> StoreResult<usize> {
    let index = post_comments_key(post_id);
    let ids = load_list(store, &index)?;
    for id in &ids {
        store.delete(&comment_key(*id))?;
    }
    store.delete(&index)?;
    Ok(ids.len())
}

fn render<S: KvStore>(store: &S, comment: &Comment, links: &Links) -> Result<CommentView, ApiError> {
    let owner = get_user(store, comment.owner)?
        .ok_or_else(|| ApiError::InternalError(format!("owner {} of comment is missing", comment.owner)))?;
    Ok(comment_view(comment, &owner, links))
}

// === HTTP Handlers ===

/// `/api/posts/{post_id}/comments/`
pub fn handle_collection<S: KvStore>(store: &S, req: &Request, post_id: u64, links: &Links) -> ApiResult {
    let principal = principal(store, req)?;
    check_collection(&IsOwnerOrAdminOrReadOnly, req.method(), &principal)?;

    if get_post(store, post_id)?.is_none() {
        return Err(ApiError::NotFound("Post not found".to_string()));
    }

    match req.method() {
        Method::Get | Method::Head | Method::Options => {
            let mut views = Vec::new();
            for comment in comments_for_post(store, post_id)? {
                views.push(render(store, &comment, links)?);
            }
            Ok(json_response(200, &views)?)
        }
        Method::Post => {
            let owner = principal.id().ok_or(ApiError::Unauthorized)?;
            let input: CommentInput = parse_body(req.body())?;
            let body = input.body.unwrap_or_default();
            let body = validate_body(&body)?;

            let comment = insert_comment(store, post_id, owner, &body)?;
            Ok(json_response(201, &render(store, &comment, links)?)?)
        }
        _ => Err(ApiError::MethodNotAllowed),
    }
}

/// `/api/posts/{post_id}/comments/{comment_id}/`
pub fn handle_detail<S: KvStore>(
    store: &S,
    req: &Request,
    post_id: u64,
    comment_id: u64,
    links: &Links,
) -> ApiResult {
    let principal = principal(store, req)?;
    check_collection(&IsOwnerOrAdminOrReadOnly, req.method(), &principal)?;

    let mut comment = get_comment(store, comment_id)?
        .filter(|c| c.post == post_id)
        .ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))?;
    check_object(&IsOwnerOrAdminOrReadOnly, req.method(), &principal, &comment)?;

    match req.method() {
        Method::Get | Method::Head | Method::Options => Ok(json_response(200, &render(store, &comment, links)?)?),
        Method::Put | Method::Patch => {
            let input: CommentInput = parse_body(req.body())?;
            match input.body {
                Some(body) => {
                    comment.body = validate_body(&body)?;
                }
                None if matches!(req.method(), Method::Put) => {
                    return Err(ApiError::BadRequest("body is required".to_string()));
                }
                None => {}
            }
            comment.updated = refreshed(comment.updated);
            store.set_json(&comment_key(comment.id), &comment)?;
            info!(comment_id, editor = ?principal.id(), "comment updated");
            Ok(json_response(200, &render(store, &comment, links)?)?)
        }
        Method::Delete => {
            delete_comment(store, &comment)?;
            Ok(no_content())
        }
        _ => Err(ApiError::MethodNotAllowed),
    }
}
