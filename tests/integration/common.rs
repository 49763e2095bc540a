use rocket::http::{Cookie, Status};
use rocket::local::blocking::Client;

/// Wrapper around `Client` that auto-deletes the temp DB on drop. Avoids
/// accumulating `/tmp` files across test runs, the same problem the
/// teacher's own integration suite works around.
pub struct TestClient {
    client: Option<Client>,
    db_path: String,
}

impl Drop for TestClient {
    fn drop(&mut self) {
        drop(self.client.take());
        let _ = std::fs::remove_file(&self.db_path);
        let _ = std::fs::remove_file(format!("{}-wal", self.db_path));
        let _ = std::fs::remove_file(format!("{}-shm", self.db_path));
    }
}

impl std::ops::Deref for TestClient {
    type Target = Client;
    fn deref(&self) -> &Client {
        self.client.as_ref().unwrap()
    }
}

fn unique_db_path() -> String {
    format!("/tmp/messaging_core_test_{}.db", uuid::Uuid::new_v4().simple())
}

/// `untracked` rather than `tracked`: several tests juggle more than one
/// logged-in user against the same rocket instance, so each request carries
/// its own session cookie explicitly (see `Session`) instead of relying on
/// the client's single shared jar.
pub fn test_client() -> TestClient {
    let db_path = unique_db_path();
    let rocket = messaging_core::rocket_with_db(&db_path);
    let client = Client::untracked(rocket).expect("valid rocket instance");
    TestClient { client: Some(client), db_path }
}

pub fn test_client_with_rate_limits(config: messaging_core::rate_limit::RateLimitConfig) -> TestClient {
    let db_path = unique_db_path();
    let rocket = messaging_core::rocket_with_db_and_config(&db_path, config);
    let client = Client::untracked(rocket).expect("valid rocket instance");
    TestClient { client: Some(client), db_path }
}

/// A logged-in identity: the private session cookie issued at register/login,
/// replayed explicitly on every subsequent request that acts as this user.
pub struct Session {
    pub user_id: i64,
    pub cookie: Cookie<'static>,
}

fn extract_session_cookie(res: &rocket::local::blocking::LocalResponse<'_>) -> Cookie<'static> {
    res.cookies()
        .get_private("session")
        .expect("response must set a session cookie")
        .into_owned()
}

pub fn register(client: &Client, username: &str) -> Session {
    use rocket::http::ContentType;
    let res = client
        .post("/auth/register")
        .header(ContentType::JSON)
        .body(format!(
            r#"{{"username": "{username}", "email": "{username}@example.com", "password": "correct-horse-battery"}}"#
        ))
        .dispatch();
    assert_eq!(res.status(), Status::Ok, "register failed");
    let cookie = extract_session_cookie(&res);
    let body: serde_json::Value = res.into_json().unwrap();
    Session { user_id: body["id"].as_i64().unwrap(), cookie }
}

pub fn create_room(client: &Client, owner: &Session, is_group: bool) -> i64 {
    use rocket::http::ContentType;
    let res = client
        .post("/rooms")
        .header(ContentType::JSON)
        .private_cookie(owner.cookie.clone())
        .body(format!(r#"{{"is_group": {is_group}}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Ok, "create_room failed");
    let body: serde_json::Value = res.into_json().unwrap();
    body["id"].as_i64().unwrap()
}

pub fn add_participant(client: &Client, actor: &Session, room_id: i64, user_id: i64) -> Status {
    use rocket::http::ContentType;
    let res = client
        .post(format!("/rooms/{room_id}/participants"))
        .header(ContentType::JSON)
        .private_cookie(actor.cookie.clone())
        .body(format!(r#"{{"user_id": {user_id}}}"#))
        .dispatch();
    res.status()
}

pub fn send_message(client: &Client, sender: &Session, room_id: i64, content: &str) -> serde_json::Value {
    use rocket::http::ContentType;
    let res = client
        .post(format!("/messages/{room_id}"))
        .header(ContentType::JSON)
        .private_cookie(sender.cookie.clone())
        .body(format!(r#"{{"content": "{content}"}}"#))
        .dispatch();
    res.into_json().unwrap_or_else(|| panic!("send_message did not return json"))
}
