use rocket::http::{ContentType, Status};

use crate::common::{register, test_client};

#[test]
fn register_then_me_round_trips_the_session_cookie() {
    let client = test_client();
    let alice = register(&client, "alice");

    let res = client.get("/auth/me").private_cookie(alice.cookie.clone()).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["id"].as_i64().unwrap(), alice.user_id);
    assert_eq!(body["username"], "alice");
    // password_hash must never be exposed.
    assert!(body.get("password_hash").is_none());
    assert!(body.get("passwordHash").is_none());
}

#[test]
fn me_without_a_session_cookie_is_unauthorized() {
    let client = test_client();
    let res = client.get("/auth/me").dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn duplicate_username_is_rejected() {
    let client = test_client();
    register(&client, "alice");
    let res = client
        .post("/auth/register")
        .header(ContentType::JSON)
        .body(r#"{"username": "alice", "email": "another@example.com", "password": "correct-horse-battery"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Conflict);
}

#[test]
fn short_password_is_rejected() {
    let client = test_client();
    let res = client
        .post("/auth/register")
        .header(ContentType::JSON)
        .body(r#"{"username": "bob", "email": "bob@example.com", "password": "short"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn login_with_wrong_password_is_unauthorized() {
    let client = test_client();
    register(&client, "carol");
    let res = client
        .post("/auth/login")
        .header(ContentType::JSON)
        .body(r#"{"identifier": "carol", "password": "totally-wrong-pw"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn login_with_correct_password_issues_a_fresh_session() {
    let client = test_client();
    register(&client, "dave");
    let res = client
        .post("/auth/login")
        .header(ContentType::JSON)
        .body(r#"{"identifier": "dave", "password": "correct-horse-battery"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let cookie = res.cookies().get_private("session");
    assert!(cookie.is_some());
}

#[test]
fn logout_destroys_the_session_server_side() {
    let client = test_client();
    let alice = register(&client, "erin");

    let res = client.post("/auth/logout").private_cookie(alice.cookie.clone()).dispatch();
    assert_eq!(res.status(), Status::Ok);

    // The old cookie is now pointless: the session it names no longer exists.
    let res = client.get("/auth/me").private_cookie(alice.cookie.clone()).dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn forgot_password_never_reveals_whether_the_email_exists() {
    let client = test_client();
    register(&client, "frank");

    let known = client
        .post("/auth/forgot-password")
        .header(ContentType::JSON)
        .body(r#"{"email": "frank@example.com"}"#)
        .dispatch();
    let unknown = client
        .post("/auth/forgot-password")
        .header(ContentType::JSON)
        .body(r#"{"email": "nobody-here@example.com"}"#)
        .dispatch();
    assert_eq!(known.status(), Status::Ok);
    assert_eq!(unknown.status(), Status::Ok);
}

#[test]
fn reset_password_with_bogus_token_is_rejected() {
    let client = test_client();
    let res = client
        .post("/auth/reset-password")
        .header(ContentType::JSON)
        .body(r#"{"token": "not-a-real-token", "new_password": "brand-new-password-1"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn two_factor_login_rejects_an_unknown_mfa_token() {
    let client = test_client();
    let res = client
        .post("/auth/2fa/login")
        .header(ContentType::JSON)
        .body(r#"{"mfa_token": "mfa_deadbeef", "code": "000000"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}
