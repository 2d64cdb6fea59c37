//! Client-facing shapes of stored entities.
//!
//! Every function here works on entities whose relations were already
//! fetched by the caller; nothing in this module touches the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::models::{Comment, Membership, Post, Project, User};

/// Builds absolute reference links from a configured base.
#[derive(Clone, Debug)]
pub struct Links {
    base: String,
}

impl Links {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self { base: base.trim_end_matches('/').to_string() }
    }

    pub fn from_env() -> Self {
        Self::new(crate::config::link_base())
    }

    pub fn post(&self, post_id: u64) -> String {
        format!("{}/api/posts/{}/", self.base, post_id)
    }

    pub fn comment(&self, post_id: u64, comment_id: u64) -> String {
        format!("{}/api/posts/{}/comments/{}/", self.base, post_id, comment_id)
    }
}

#[derive(Serialize, Debug)]
pub struct PostSummary {
    pub title: String,
    pub body: String,
    pub created: DateTime<Utc>,
    pub owner: String,
}

#[derive(Serialize, Debug)]
pub struct PostDetail {
    pub title: String,
    pub body: String,
    pub created: DateTime<Utc>,
    pub owner: String,
    pub updated: DateTime<Utc>,
    pub comment_set: Vec<String>,
}

#[derive(Serialize, Debug)]
pub struct CommentView {
    pub post: String,
    pub owner: String,
    pub body: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Serialize, Debug)]
pub struct ProjectView {
    pub title: String,
    pub description: String,
    pub category: u64,
    pub members: Vec<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Writable post fields. Owner and timestamps are never read from clients.
#[derive(Deserialize, Debug, Default)]
pub struct PostInput {
    pub title: Option<String>,
    pub body: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct CommentInput {
    pub body: Option<String>,
}

pub fn post_summary(post: &Post, owner: &User) -> PostSummary {
    PostSummary {
        title: post.title.clone(),
        body: post.body.clone(),
        created: post.created,
        owner: owner.username.clone(),
    }
}

/// `comments` must be the post's own comments; they are linked in id order.
pub fn post_detail(post: &Post, owner: &User, comments: &[Comment], links: &Links) -> PostDetail {
    let mut ids: Vec<u64> = comments.iter().map(|c| c.id).collect();
    ids.sort_unstable();

    PostDetail {
        title: post.title.clone(),
        body: post.body.clone(),
        created: post.created,
        owner: owner.username.clone(),
        updated: post.updated,
        comment_set: ids.into_iter().map(|id| links.comment(post.id, id)).collect(),
    }
}

pub fn comment_view(comment: &Comment, owner: &User, links: &Links) -> CommentView {
    CommentView {
        post: links.post(comment.post),
        owner: owner.username.clone(),
        body: comment.body.clone(),
        created: comment.created,
        updated: comment.updated,
    }
}

/// Flattens memberships to the ids of the people holding them, whatever their role.
pub fn project_view(project: &Project, memberships: &[Membership]) -> ProjectView {
    ProjectView {
        title: project.title.clone(),
        description: project.description.clone(),
        category: project.category,
        members: memberships
            .iter()
            .filter(|m| m.project == project.id)
            .map(|m| m.person)
            .collect(),
        created_at: project.created_at,
        updated_at: project.updated_at,
    }
}
