use std::collections::HashMap;

use chrono::Utc;
use spin_sdk::http::{Method, Request};
use tracing::{debug, info};

use crate::auth::principal;
use crate::config::*;
use crate::core::errors::{ApiError, ApiResult, StoreError, StoreResult};
use crate::core::helpers::{json_response, refreshed};
use crate::core::store::{load_all, next_id, push_to_list, remove_from_list, KvStore};
use crate::models::models::{Category, Membership, Project, RoleType};
use crate::permissions::{check_collection, IsAuthenticated};
use crate::serializers::{project_view, ProjectView};
use crate::users::get_user;

// === Categories ===

pub fn get_category<S: KvStore>(store: &S, category_id: u64) -> StoreResult<Option<Category>> {
    store.get_json(&category_key(category_id))
}

pub fn all_categories<S: KvStore>(store: &S) -> StoreResult<Vec<Category>> {
    load_all(store, CATEGORIES_LIST_KEY, category_key)
}

pub fn create_category<S: KvStore>(store: &S, name: &str, parent: Option<u64>) -> StoreResult<Category> {
    if let Some(parent_id) = parent {
        if get_category(store, parent_id)?.is_none() {
            return Err(StoreError::Integrity(format!("parent category {} does not exist", parent_id)));
        }
    }

    let category = Category {
        id: next_id(store, "category")?,
        name: name.to_string(),
        parent,
    };
    store.set_json(&category_key(category.id), &category)?;
    push_to_list(store, CATEGORIES_LIST_KEY, category.id)?;

    info!(category_id = category.id, parent = ?parent, "category created");
    Ok(category)
}

/// Deletes the category, every descendant category, and the projects filed
/// under any of them.
pub fn delete_category<S: KvStore>(store: &S, category_id: u64) -> StoreResult<()> {
    let categories = all_categories(store)?;
    let mut doomed = vec![category_id];
    let mut cursor = 0;
    while cursor < doomed.len() {
        let parent = doomed[cursor];
        doomed.extend(categories.iter().filter(|c| c.parent == Some(parent)).map(|c| c.id));
        cursor += 1;
    }

    for project in all_projects(store)? {
        if doomed.contains(&project.category) {
            delete_project(store, project.id)?;
        }
    }
    for id in &doomed {
        store.delete(&category_key(*id))?;
        remove_from_list(store, CATEGORIES_LIST_KEY, *id)?;
    }

    info!(category_id, removed = doomed.len(), "category deleted");
    Ok(())
}

// === Projects ===

pub fn get_project<S: KvStore>(store: &S, project_id: u64) -> StoreResult<Option<Project>> {
    store.get_json(&project_key(project_id))
}

pub fn all_projects<S: KvStore>(store: &S) -> StoreResult<Vec<Project>> {
    load_all(store, PROJECTS_LIST_KEY, project_key)
}

pub fn create_project<S: KvStore>(store: &S, title: &str, description: &str, category: u64) -> StoreResult<Project> {
    if get_category(store, category)?.is_none() {
        return Err(StoreError::Integrity(format!("category {} does not exist", category)));
    }

    let now = Utc::now();
    let project = Project {
        id: next_id(store, "project")?,
        title: title.to_string(),
        description: description.to_string(),
        category,
        created_at: now,
        updated_at: now,
    };
    store.set_json(&project_key(project.id), &project)?;
    push_to_list(store, PROJECTS_LIST_KEY, project.id)?;

    info!(project_id = project.id, category, "project created");
    Ok(project)
}

/// Persists the project's current fields and refreshes `updated_at`.
pub fn update_project<S: KvStore>(store: &S, project: &mut Project) -> StoreResult<()> {
    if get_category(store, project.category)?.is_none() {
        return Err(StoreError::Integrity(format!("category {} does not exist", project.category)));
    }
    project.updated_at = refreshed(project.updated_at);
    store.set_json(&project_key(project.id), project)?;
    debug!(project_id = project.id, "project updated");
    Ok(())
}

pub fn delete_project<S: KvStore>(store: &S, project_id: u64) -> StoreResult<()> {
    for membership in memberships_for(store, project_id)? {
        remove_membership(store, &membership)?;
    }
    store.delete(&project_key(project_id))?;
    remove_from_list(store, PROJECTS_LIST_KEY, project_id)?;
    info!(project_id, "project deleted");
    Ok(())
}

// === Memberships ===

/// Links `person` to `project`. A second membership for the same pair is
/// an integrity error and leaves the existing one untouched.
pub fn add_membership<S: KvStore>(store: &S, person: u64, project: u64, role: RoleType) -> StoreResult<Membership> {
    let pair_key = membership_pair_key(project, person);
    if store.exists(&pair_key)? {
        return Err(StoreError::Integrity(format!(
            "membership for person {} in project {} already exists",
            person, project
        )));
    }
    if get_user(store, person)?.is_none() {
        return Err(StoreError::Integrity(format!("user {} does not exist", person)));
    }
    if get_project(store, project)?.is_none() {
        return Err(StoreError::Integrity(format!("project {} does not exist", project)));
    }

    let membership = Membership {
        id: next_id(store, "membership")?,
        person,
        project,
        role,
    };
    store.set_json(&membership_key(membership.id), &membership)?;
    store.set_json(&pair_key, &membership.id)?;
    push_to_list(store, MEMBERSHIPS_LIST_KEY, membership.id)?;

    info!(membership_id = membership.id, person, project, ?role, "membership created");
    Ok(membership)
}

fn remove_membership<S: KvStore>(store: &S, membership: &Membership) -> StoreResult<()> {
    store.delete(&membership_key(membership.id))?;
    store.delete(&membership_pair_key(membership.project, membership.person))?;
    remove_from_list(store, MEMBERSHIPS_LIST_KEY, membership.id)
}

pub fn all_memberships<S: KvStore>(store: &S) -> StoreResult<Vec<Membership>> {
    let mut memberships: Vec<Membership> = load_all(store, MEMBERSHIPS_LIST_KEY, membership_key)?;
    memberships.sort_by_key(|m| m.id);
    Ok(memberships)
}

/// The project's memberships in creation order.
pub fn memberships_for<S: KvStore>(store: &S, project_id: u64) -> StoreResult<Vec<Membership>> {
    Ok(all_memberships(store)?
        .into_iter()
        .filter(|m| m.project == project_id)
        .collect())
}

// === Listing ===

/// Every project, most recently updated first (ties by id), each paired
/// with its memberships fetched in a single pass.
pub fn list_projects<S: KvStore>(store: &S) -> StoreResult<Vec<(Project, Vec<Membership>)>> {
    let mut projects = all_projects(store)?;
    projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));

    let mut by_project: HashMap<u64, Vec<Membership>> = HashMap::new();
    for membership in all_memberships(store)? {
        by_project.entry(membership.project).or_default().push(membership);
    }

    Ok(projects
        .into_iter()
        .map(|project| {
            let memberships = by_project.remove(&project.id).unwrap_or_default();
            (project, memberships)
        })
        .collect())
}

// === HTTP Handlers ===

/// `/api/projects/`, readable by any authenticated user.
pub fn handle_list<S: KvStore>(store: &S, req: &Request) -> ApiResult {
    let principal = principal(store, req)?;
    check_collection(&IsAuthenticated, req.method(), &principal)?;

    if !matches!(req.method(), Method::Get | Method::Head | Method::Options) {
        return Err(ApiError::MethodNotAllowed);
    }

    let views: Vec<ProjectView> = list_projects(store)?
        .iter()
        .map(|(project, memberships)| project_view(project, memberships))
        .collect();
    debug!(count = views.len(), viewer = ?principal.id(), "projects listed");
    Ok(json_response(200, &views)?)
}
