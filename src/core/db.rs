use tracing::info;

use crate::comments::insert_comment;
use crate::core::errors::ApiError;
use crate::core::store::KvStore;
use crate::models::models::RoleType;
use crate::posts::insert_post;
use crate::projects::{add_membership, create_category, create_project};
use crate::users::{create_superuser, find_by_username, insert_user};

/// Populates an empty store with demo accounts, posts and projects.
///
/// Does nothing once the `admin` account exists.
pub fn init_test_data<S: KvStore>(store: &S) -> Result<(), ApiError> {
    if find_by_username(store, "admin")?.is_some() {
        return Ok(()); // Already initialized
    }

    let test = insert_user(store, "test", "test", false)?;
    let alice = insert_user(store, "alice", "alice", false)?;
    let bob = insert_user(store, "bob", "bob", false)?;
    create_superuser(store, "admin", "admin")?;

    let first = insert_post(store, test.id, "Hello", "This is my first post!")?;
    insert_comment(store, first.id, alice.id, "Welcome aboard.")?;

    let board = insert_post(
        store,
        alice.id,
        "My board",
        "Welcome to my board! Excited to share thoughts here.",
    )?;
    insert_comment(store, board.id, bob.id, "Looking forward to it.")?;

    let joined = insert_post(
        store,
        bob.id,
        "Just joined",
        "Hey everyone! Looking forward to connecting with you all.",
    )?;
    insert_comment(store, joined.id, test.id, "Hi Bob!")?;

    let technology = create_category(store, "Technology", None)?;
    let web = create_category(store, "Web Development", Some(technology.id))?;
    let marketing = create_category(store, "Marketing", None)?;

    let ecommerce = create_project(
        store,
        "E-commerce Platform",
        "Building a modern e-commerce platform",
        web.id,
    )?;
    let campaign = create_project(
        store,
        "Marketing Campaign",
        "Q4 marketing campaign for product launch",
        marketing.id,
    )?;
    let mobile = create_project(
        store,
        "Mobile App Development",
        "Cross-platform mobile app",
        web.id,
    )?;

    add_membership(store, test.id, ecommerce.id, RoleType::Owner)?;
    add_membership(store, alice.id, ecommerce.id, RoleType::Member)?;
    add_membership(store, test.id, campaign.id, RoleType::Member)?;
    add_membership(store, alice.id, mobile.id, RoleType::Owner)?;

    info!("demo data created");
    Ok(())
}
