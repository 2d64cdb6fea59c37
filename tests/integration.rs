use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use serde_json::{json, Value};
use spin_sdk::http::{Method, Request};
use trellis::core::store::MemoryStore;
use trellis::models::models::RoleType;
use trellis::projects::{add_membership, create_category, create_project, delete_category, update_project};
use trellis::serializers::Links;
use trellis::Dispatcher;

const BASE_URL: &str = "http://api.test";

struct Harness {
    store: MemoryStore,
    links: Links,
}

impl Harness {
    fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            links: Links::new(BASE_URL),
        }
    }

    fn send(&self, method: Method, path: &str, token: Option<&str>, body: Option<Value>) -> (u16, Value) {
        let mut builder = Request::builder();
        builder.method(method).uri(path);
        if let Some(token) = token {
            builder.header("Authorization", format!("Bearer {}", token));
        }
        let bytes = body.map(|b| serde_json::to_vec(&b).unwrap()).unwrap_or_default();
        let req = builder.body(bytes).build();

        let resp = trellis::handle_request(&self.store, &req, &self.links);
        let status = *resp.status();
        let value = if resp.body().is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(resp.body()).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(resp.body()).into_owned()))
        };
        (status, value)
    }

    fn login(&self, username: &str, password: &str) -> String {
        let (status, body) = self.send(
            Method::Post,
            "/login",
            None,
            Some(json!({"username": username, "password": password})),
        );
        assert_eq!(status, 200, "login failed: {:?}", body);
        body["token"].as_str().unwrap().to_string()
    }

    /// Registers through the API and returns (user id, token).
    fn register(&self, username: &str) -> (u64, String) {
        let (status, body) = self.send(
            Method::Post,
            "/users",
            None,
            Some(json!({"username": username, "password": "password123"})),
        );
        assert_eq!(status, 201, "registration failed: {:?}", body);
        let id = body["id"].as_u64().unwrap();
        (id, self.login(username, "password123"))
    }

    fn superuser(&self, username: &str) -> String {
        trellis::users::create_superuser(&self.store, username, "rootpass").unwrap();
        self.login(username, "rootpass")
    }

    fn create_post(&self, token: &str, title: &str) -> u64 {
        let (status, _) = self.send(
            Method::Post,
            "/api/posts/",
            Some(token),
            Some(json!({"title": title, "body": "Some body"})),
        );
        assert_eq!(status, 201);
        // Ids are sequential per store
        trellis::posts::all_posts(&self.store).unwrap().last().unwrap().id
    }
}

// === Accounts ===

#[test]
fn test_login_invalid_credentials() {
    let h = Harness::new();
    h.register("alice");
    let (status, _) = h.send(
        Method::Post,
        "/login",
        None,
        Some(json!({"username": "alice", "password": "wrongpass"})),
    );
    assert_eq!(status, 401);
}

#[test]
fn test_duplicate_username_conflicts() {
    let h = Harness::new();
    h.register("alice");
    let (status, _) = h.send(
        Method::Post,
        "/users",
        None,
        Some(json!({"username": "alice", "password": "another"})),
    );
    assert_eq!(status, 409);
}

#[test]
fn test_markup_only_username_is_rejected() {
    let h = Harness::new();
    let (status, _) = h.send(
        Method::Post,
        "/users",
        None,
        Some(json!({"username": "<br><br>", "password": "pw123"})),
    );
    assert_eq!(status, 400);

    // Length is measured after markup is stripped
    let (status, _) = h.send(
        Method::Post,
        "/users",
        None,
        Some(json!({"username": "<i>ab</i>", "password": "pw123"})),
    );
    assert_eq!(status, 400);
}

#[test]
fn test_logout_revokes_token() {
    let h = Harness::new();
    let (_, token) = h.register("alice");
    let (status, _) = h.send(Method::Post, "/logout", Some(&token), None);
    assert_eq!(status, 200);

    let (status, _) = h.send(
        Method::Post,
        "/api/posts/",
        Some(&token),
        Some(json!({"title": "t", "body": "b"})),
    );
    assert_eq!(status, 401);
}

// === Posts ===

#[test]
fn test_anonymous_can_read_but_not_write() {
    let h = Harness::new();
    let (_, token) = h.register("alice");
    let post_id = h.create_post(&token, "Hello");

    let (status, list) = h.send(Method::Get, "/api/posts/", None, None);
    assert_eq!(status, 200);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, _) = h.send(Method::Get, &format!("/api/posts/{}/", post_id), None, None);
    assert_eq!(status, 200);

    let (status, _) = h.send(Method::Post, "/api/posts/", None, Some(json!({"title": "x", "body": "y"})));
    assert_eq!(status, 401);

    let (status, _) = h.send(Method::Delete, &format!("/api/posts/{}/", post_id), None, None);
    assert_eq!(status, 401);
}

#[test]
fn test_anonymous_mutation_is_denied_before_lookup() {
    let h = Harness::new();
    let (status, _) = h.send(Method::Delete, "/api/posts/999/", None, None);
    assert_eq!(status, 401);

    let (_, token) = h.register("alice");
    let (status, _) = h.send(Method::Delete, "/api/posts/999/", Some(&token), None);
    assert_eq!(status, 404);
}

#[test]
fn test_post_list_projection_shape() {
    let h = Harness::new();
    let (_, token) = h.register("alice");
    let (status, created) = h.send(
        Method::Post,
        "/api/posts/",
        Some(&token),
        Some(json!({
            "title": "Hello",
            "body": "World",
            "owner": "mallory",
            "created": "2000-01-01T00:00:00Z"
        })),
    );
    assert_eq!(status, 201);
    assert_eq!(created["owner"], "alice");
    assert_ne!(created["created"], "2000-01-01T00:00:00Z");
    assert!(created.get("updated").is_none());
    assert!(created.get("id").is_none());

    let (_, list) = h.send(Method::Get, "/api/posts", None, None);
    let first = &list[0];
    for field in ["title", "body", "created", "owner"] {
        assert!(first.get(field).is_some(), "missing {}", field);
    }
    assert!(first.get("updated").is_none());
}

#[test]
fn test_post_detail_links_comments() {
    let h = Harness::new();
    let (_, alice) = h.register("alice");
    let (_, bob) = h.register("bob");
    let post_id = h.create_post(&alice, "Hello");

    let path = format!("/api/posts/{}/comments/", post_id);
    let (status, comment) = h.send(Method::Post, &path, Some(&bob), Some(json!({"body": "Nice post"})));
    assert_eq!(status, 201);
    assert_eq!(comment["owner"], "bob");
    assert_eq!(comment["post"], format!("{}/api/posts/{}/", BASE_URL, post_id));

    let (status, detail) = h.send(Method::Get, &format!("/api/posts/{}/", post_id), None, None);
    assert_eq!(status, 200);
    assert!(detail.get("updated").is_some());
    let links = detail["comment_set"].as_array().unwrap();
    assert_eq!(links.len(), 1);
    let link = links[0].as_str().unwrap();
    assert!(link.starts_with(&format!("{}/api/posts/{}/comments/", BASE_URL, post_id)));

    // The link is dereferenceable through the same router
    let relative = link.trim_start_matches(BASE_URL);
    let (status, fetched) = h.send(Method::Get, relative, None, None);
    assert_eq!(status, 200);
    assert_eq!(fetched["body"], "Nice post");
}

#[test]
fn test_only_owner_or_superuser_may_modify_posts() {
    let h = Harness::new();
    let (_, alice) = h.register("alice");
    let (_, bob) = h.register("bob");
    let admin = h.superuser("root");
    let post_id = h.create_post(&alice, "Hello");
    let path = format!("/api/posts/{}/", post_id);

    let (status, _) = h.send(Method::Patch, &path, Some(&bob), Some(json!({"title": "Hijacked"})));
    assert_eq!(status, 403);
    let (status, _) = h.send(Method::Delete, &path, Some(&bob), None);
    assert_eq!(status, 403);

    let (status, body) = h.send(Method::Patch, &path, Some(&alice), Some(json!({"title": "Edited"})));
    assert_eq!(status, 200);
    assert_eq!(body["title"], "Edited");
    assert_eq!(body["body"], "Some body");

    let (status, body) = h.send(
        Method::Put,
        &path,
        Some(&admin),
        Some(json!({"title": "Moderated", "body": "Cleaned up", "owner": "root"})),
    );
    assert_eq!(status, 200);
    assert_eq!(body["title"], "Moderated");
    assert_eq!(body["owner"], "alice");

    let (status, _) = h.send(Method::Delete, &path, Some(&admin), None);
    assert_eq!(status, 204);
    let (status, _) = h.send(Method::Get, &path, None, None);
    assert_eq!(status, 404);
}

#[test]
fn test_put_requires_all_fields() {
    let h = Harness::new();
    let (_, alice) = h.register("alice");
    let post_id = h.create_post(&alice, "Hello");
    let (status, _) = h.send(
        Method::Put,
        &format!("/api/posts/{}/", post_id),
        Some(&alice),
        Some(json!({"title": "Only title"})),
    );
    assert_eq!(status, 400);
}

#[test]
fn test_post_validation() {
    let h = Harness::new();
    let (_, alice) = h.register("alice");

    let (status, _) = h.send(Method::Post, "/api/posts/", Some(&alice), Some(json!({"title": "", "body": "b"})));
    assert_eq!(status, 400);

    let long_body = "a".repeat(10_001);
    let (status, _) = h.send(
        Method::Post,
        "/api/posts/",
        Some(&alice),
        Some(json!({"title": "t", "body": long_body})),
    );
    assert_eq!(status, 400);
}

#[test]
fn test_markup_only_bodies_are_rejected() {
    let h = Harness::new();
    let (_, alice) = h.register("alice");
    let script = json!({"title": "t", "body": "<script>x</script>"});

    let (status, _) = h.send(Method::Post, "/api/posts/", Some(&alice), Some(script.clone()));
    assert_eq!(status, 400);
    assert!(trellis::posts::all_posts(&h.store).unwrap().is_empty());

    let post_id = h.create_post(&alice, "Kept");
    let detail = format!("/api/posts/{}/", post_id);
    let (status, _) = h.send(Method::Patch, &detail, Some(&alice), Some(json!({"body": "<script>x</script>"})));
    assert_eq!(status, 400);
    let (_, body) = h.send(Method::Get, &detail, None, None);
    assert_eq!(body["body"], "Some body");

    let comments = format!("/api/posts/{}/comments/", post_id);
    let (status, _) = h.send(Method::Post, &comments, Some(&alice), Some(json!({"body": "<script>x</script>"})));
    assert_eq!(status, 400);

    let (status, _) = h.send(Method::Post, &comments, Some(&alice), Some(json!({"body": "fine"})));
    assert_eq!(status, 201);
    let comment_id = trellis::comments::comments_for_post(&h.store, post_id).unwrap()[0].id;
    let (status, _) = h.send(
        Method::Patch,
        &format!("{}{}/", comments, comment_id),
        Some(&alice),
        Some(json!({"body": "<script>x</script>"})),
    );
    assert_eq!(status, 400);
}

#[test]
fn test_long_persian_body_is_accepted() {
    let h = Harness::new();
    let (_, alice) = h.register("alice");
    let body = "۴".repeat(10_000);
    let (status, _) = h.send(Method::Post, "/api/posts/", Some(&alice), Some(json!({"title": "t", "body": body})));
    assert_eq!(status, 201);
}

// === Comments ===

#[test]
fn test_comment_permissions_and_scoping() {
    let h = Harness::new();
    let (_, alice) = h.register("alice");
    let (_, bob) = h.register("bob");
    let first = h.create_post(&alice, "First");
    let second = h.create_post(&alice, "Second");

    let (_, on_first) = h.send(
        Method::Post,
        &format!("/api/posts/{}/comments/", first),
        Some(&bob),
        Some(json!({"body": "one"})),
    );
    let (_, on_second) = h.send(
        Method::Post,
        &format!("/api/posts/{}/comments/", second),
        Some(&bob),
        Some(json!({"body": "two"})),
    );
    assert_ne!(on_first["post"], on_second["post"]);

    let comment_id = trellis::comments::comments_for_post(&h.store, first).unwrap()[0].id;
    let right = format!("/api/posts/{}/comments/{}/", first, comment_id);
    let wrong = format!("/api/posts/{}/comments/{}/", second, comment_id);

    let (status, _) = h.send(Method::Get, &wrong, None, None);
    assert_eq!(status, 404);

    // The post owner does not own bob's comment
    let (status, _) = h.send(Method::Patch, &right, Some(&alice), Some(json!({"body": "edited"})));
    assert_eq!(status, 403);

    let (status, body) = h.send(Method::Patch, &right, Some(&bob), Some(json!({"body": "edited"})));
    assert_eq!(status, 200);
    assert_eq!(body["body"], "edited");

    let (status, _) = h.send(Method::Post, &format!("/api/posts/{}/comments/", first), None, Some(json!({"body": "anon"})));
    assert_eq!(status, 401);

    let (status, _) = h.send(Method::Post, "/api/posts/999/comments/", Some(&bob), Some(json!({"body": "x"})));
    assert_eq!(status, 404);
}

#[test]
fn test_deleting_post_removes_its_comments() {
    let h = Harness::new();
    let (_, alice) = h.register("alice");
    let post_id = h.create_post(&alice, "Doomed");
    h.send(
        Method::Post,
        &format!("/api/posts/{}/comments/", post_id),
        Some(&alice),
        Some(json!({"body": "gone soon"})),
    );
    let comment_id = trellis::comments::comments_for_post(&h.store, post_id).unwrap()[0].id;

    let (status, _) = h.send(Method::Delete, &format!("/api/posts/{}/", post_id), Some(&alice), None);
    assert_eq!(status, 204);
    assert!(trellis::comments::get_comment(&h.store, comment_id).unwrap().is_none());
}

// === Projects ===

struct Board {
    user1: (u64, String),
    user2: (u64, String),
    child_category: u64,
    standalone_category: u64,
}

fn board(h: &Harness) -> Board {
    let user1 = h.register("testuser1");
    let user2 = h.register("testuser2");

    let parent = create_category(&h.store, "Technology", None).unwrap();
    let child = create_category(&h.store, "Web Development", Some(parent.id)).unwrap();
    let standalone = create_category(&h.store, "Marketing", None).unwrap();

    let p1 = create_project(&h.store, "E-commerce Platform", "Modern shop", child.id).unwrap();
    let p2 = create_project(&h.store, "Marketing Campaign", "Q4 launch", standalone.id).unwrap();
    let p3 = create_project(&h.store, "Mobile App Development", "Cross-platform", child.id).unwrap();

    add_membership(&h.store, user1.0, p1.id, RoleType::Owner).unwrap();
    add_membership(&h.store, user2.0, p1.id, RoleType::Member).unwrap();
    add_membership(&h.store, user1.0, p2.id, RoleType::Member).unwrap();
    add_membership(&h.store, user2.0, p3.id, RoleType::Owner).unwrap();

    Board {
        user1,
        user2,
        child_category: child.id,
        standalone_category: standalone.id,
    }
}

fn find<'a>(projects: &'a Value, title: &str) -> &'a Value {
    projects
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["title"] == title)
        .unwrap_or_else(|| panic!("project {} missing", title))
}

#[test]
fn test_projects_api_requires_authentication() {
    let h = Harness::new();
    board(&h);
    let (status, _) = h.send(Method::Get, "/api/projects/", None, None);
    assert_eq!(status, 401);
}

#[test]
fn test_projects_api_response_structure() {
    let h = Harness::new();
    let b = board(&h);
    let (status, projects) = h.send(Method::Get, "/api/projects/", Some(&b.user1.1), None);
    assert_eq!(status, 200);
    assert_eq!(projects.as_array().unwrap().len(), 3);

    let first = &projects[0];
    for field in ["title", "description", "category", "members", "created_at", "updated_at"] {
        assert!(first.get(field).is_some(), "missing {}", field);
    }
    assert!(first["members"].is_array());
    assert!(first.get("id").is_none());
}

#[test]
fn test_project_members_are_person_ids() {
    let h = Harness::new();
    let b = board(&h);
    let (_, projects) = h.send(Method::Get, "/api/projects/", Some(&b.user1.1), None);

    let ecommerce = find(&projects, "E-commerce Platform");
    let mut members: Vec<u64> = ecommerce["members"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_u64().unwrap())
        .collect();
    members.sort_unstable();
    let mut expected = vec![b.user1.0, b.user2.0];
    expected.sort_unstable();
    assert_eq!(members, expected);
}

#[test]
fn test_category_relationships() {
    let h = Harness::new();
    let b = board(&h);
    let (_, projects) = h.send(Method::Get, "/api/projects/", Some(&b.user1.1), None);

    assert_eq!(find(&projects, "E-commerce Platform")["category"], b.child_category);
    assert_eq!(find(&projects, "Marketing Campaign")["category"], b.standalone_category);
    assert_eq!(find(&projects, "Mobile App Development")["category"], b.child_category);
}

#[test]
fn test_different_users_see_same_projects() {
    let h = Harness::new();
    let b = board(&h);
    let (_, first) = h.send(Method::Get, "/api/projects/", Some(&b.user1.1), None);
    let (_, second) = h.send(Method::Get, "/api/projects/", Some(&b.user2.1), None);
    assert_eq!(first, second);
}

#[test]
fn test_projects_ordered_by_updated_at_desc() {
    let h = Harness::new();
    let b = board(&h);

    let mut campaign = trellis::projects::all_projects(&h.store)
        .unwrap()
        .into_iter()
        .find(|p| p.title == "Marketing Campaign")
        .unwrap();
    campaign.description = "Pushed to Q1".to_string();
    update_project(&h.store, &mut campaign).unwrap();

    let (_, projects) = h.send(Method::Get, "/api/projects/", Some(&b.user1.1), None);
    let projects = projects.as_array().unwrap();
    assert_eq!(projects[0]["title"], "Marketing Campaign");

    let stamps: Vec<chrono::DateTime<chrono::Utc>> = projects
        .iter()
        .map(|p| p["updated_at"].as_str().unwrap().parse().unwrap())
        .collect();
    for pair in stamps.windows(2) {
        assert!(pair[0] >= pair[1]);
    }
}

#[test]
fn test_project_without_members() {
    let h = Harness::new();
    let b = board(&h);
    create_project(&h.store, "Solo Project", "No team", b.standalone_category).unwrap();

    let (_, projects) = h.send(Method::Get, "/api/projects/", Some(&b.user1.1), None);
    assert_eq!(find(&projects, "Solo Project")["members"], json!([]));
}

#[test]
fn test_empty_projects_list() {
    let h = Harness::new();
    let (_, token) = h.register("loner");
    let category = create_category(&h.store, "Temp", None).unwrap();
    create_project(&h.store, "Short-lived", "d", category.id).unwrap();
    delete_category(&h.store, category.id).unwrap();

    let (status, projects) = h.send(Method::Get, "/api/projects/", Some(&token), None);
    assert_eq!(status, 200);
    assert_eq!(projects, json!([]));
}

#[test]
fn test_projects_listing_is_read_only() {
    let h = Harness::new();
    let (_, token) = h.register("writer");
    let (status, _) = h.send(Method::Post, "/api/projects/", Some(&token), Some(json!({"title": "x"})));
    assert_eq!(status, 405);
}

// === Postcard & routing ===

#[test]
fn test_postcard_localizes_digits() {
    let h = Harness::new();
    let req = Request::builder()
        .method(Method::Get)
        .uri("/postcard?text=Order%20%2342!")
        .build();
    let resp = trellis::handle_request(&h.store, &req, &h.links);
    assert_eq!(*resp.status(), 200);
    let html = String::from_utf8(resp.body().to_vec()).unwrap();
    assert!(html.contains("Order #۴۲!"));
}

#[test]
fn test_unknown_route_is_not_found() {
    let h = Harness::new();
    let (status, body) = h.send(Method::Get, "/nowhere", None, None);
    assert_eq!(status, 404);
    assert_eq!(body["error"], "No route found");

    let (status, _) = h.send(Method::Get, "/api/posts/abc/", None, None);
    assert_eq!(status, 404);
}

// === Concurrency ===

fn json_request(method: Method, path: &str, token: Option<&str>, body: Value) -> Request {
    let mut builder = Request::builder();
    builder.method(method).uri(path);
    if let Some(token) = token {
        builder.header("Authorization", format!("Bearer {}", token));
    }
    builder.body(serde_json::to_vec(&body).unwrap()).build()
}

#[test]
fn test_concurrent_creates_are_not_lost() {
    let dispatcher = Arc::new(Dispatcher::new(MemoryStore::new(), Links::new(BASE_URL)));
    let credentials = json!({"username": "writer", "password": "password123"});
    let resp = dispatcher.handle(&json_request(Method::Post, "/users", None, credentials.clone()));
    assert_eq!(*resp.status(), 201);
    let resp = dispatcher.handle(&json_request(Method::Post, "/login", None, credentials));
    let login: Value = serde_json::from_slice(resp.body()).unwrap();
    let token = login["token"].as_str().unwrap().to_string();

    let threads: Vec<_> = (0..8)
        .map(|t| {
            let dispatcher = Arc::clone(&dispatcher);
            let token = token.clone();
            thread::spawn(move || {
                let mut created = 0;
                for i in 0..50 {
                    let body = json!({"title": format!("t{}-{}", t, i), "body": "b"});
                    let resp = dispatcher.handle(&json_request(Method::Post, "/api/posts/", Some(&token), body));
                    if *resp.status() == 201 {
                        created += 1;
                    }
                }
                created
            })
        })
        .collect();
    let created: usize = threads.into_iter().map(|h| h.join().unwrap()).sum();

    let posts = trellis::posts::all_posts(dispatcher.store()).unwrap();
    assert_eq!(created, 400);
    assert_eq!(posts.len(), 400);
    let titles: HashSet<_> = posts.iter().map(|p| p.title.clone()).collect();
    assert_eq!(titles.len(), 400);
}

#[test]
fn test_concurrent_duplicate_usernames_conflict() {
    let dispatcher = Arc::new(Dispatcher::new(MemoryStore::new(), Links::new(BASE_URL)));
    let threads: Vec<_> = (0..8)
        .map(|_| {
            let dispatcher = Arc::clone(&dispatcher);
            thread::spawn(move || {
                let body = json!({"username": "same", "password": "password123"});
                *dispatcher.handle(&json_request(Method::Post, "/users", None, body)).status()
            })
        })
        .collect();
    let statuses: Vec<u16> = threads.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(statuses.iter().filter(|s| **s == 201).count(), 1);
    assert_eq!(statuses.iter().filter(|s| **s == 409).count(), 7);
}
