use rocket::http::Status;

use crate::common::{register, test_client};

#[test]
fn health_is_public_and_reports_ok() {
    let client = test_client();
    let res = client.get("/health").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["status"], "ok");
}

#[test]
fn stats_requires_a_global_admin() {
    let client = test_client();
    let alice = register(&client, "alice");

    let res = client.get("/stats").private_cookie(alice.cookie.clone()).dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn stats_is_rejected_without_a_session_at_all() {
    let client = test_client();
    let res = client.get("/stats").dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn unknown_route_returns_the_json_404_catcher() {
    let client = test_client();
    let res = client.get("/this/route/does/not/exist").dispatch();
    assert_eq!(res.status(), Status::NotFound);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["error"], "Not found");
}

