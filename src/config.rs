pub const MAX_TITLE_LENGTH: usize = 255;
pub const MAX_BODY_LENGTH: usize = 10_000;
pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 3;

pub const DEFAULT_LINK_BASE: &str = "http://localhost:8000";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

// === Store keys ===
pub const USERS_LIST_KEY: &str = "users_list";
pub const TOKENS_LIST_KEY: &str = "tokens_list";
pub const POSTS_LIST_KEY: &str = "posts_list";
pub const CATEGORIES_LIST_KEY: &str = "categories_list";
pub const PROJECTS_LIST_KEY: &str = "projects_list";
pub const MEMBERSHIPS_LIST_KEY: &str = "memberships_list";

pub fn user_key(id: u64) -> String {
    format!("user:{}", id)
}

pub fn token_key(token: &str) -> String {
    format!("token:{}", token)
}

pub fn post_key(id: u64) -> String {
    format!("post:{}", id)
}

pub fn comment_key(id: u64) -> String {
    format!("comment:{}", id)
}

/// Index of comment ids attached to one post.
pub fn post_comments_key(post_id: u64) -> String {
    format!("comments:{}", post_id)
}

pub fn category_key(id: u64) -> String {
    format!("category:{}", id)
}

pub fn project_key(id: u64) -> String {
    format!("project:{}", id)
}

pub fn membership_key(id: u64) -> String {
    format!("membership:{}", id)
}

/// Uniqueness marker for a (project, person) pair.
pub fn membership_pair_key(project_id: u64, person_id: u64) -> String {
    format!("membership_pair:{}:{}", project_id, person_id)
}

pub fn sequence_key(entity: &str) -> String {
    format!("seq:{}", entity)
}

// === Environment ===
pub fn token_expiration_hours() -> i64 {
    std::env::var("TRELLIS_TOKEN_EXPIRATION_HOURS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(24)
}

/// Scheme and authority prefixed to every reference link in API responses.
pub fn link_base() -> String {
    std::env::var("TRELLIS_LINK_BASE")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LINK_BASE.to_string())
        .trim_end_matches('/')
        .to_string()
}

pub fn bind_addr() -> String {
    std::env::var("TRELLIS_BIND").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
}

pub fn seed_enabled() -> bool {
    std::env::var("TRELLIS_SEED")
        .map(|v| !matches!(v.as_str(), "0" | "false" | "no"))
        .unwrap_or(true)
}
