use rocket::http::{ContentType, Status};

use crate::common::{register, test_client};

#[test]
fn multipart_upload_then_download_round_trips_the_bytes() {
    let client = test_client();
    let alice = register(&client, "alice_uploads");

    let res = client
        .post("/uploads?original_name=photo.jpg&mime_type=image%2Fjpeg")
        .header(ContentType::Binary)
        .private_cookie(alice.cookie.clone())
        .body(b"not-really-a-jpeg".to_vec())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["originalName"], "photo.jpg");
    assert_eq!(body["mimeType"], "image/jpeg");
    let download_path = body["url"].as_str().unwrap().to_string();
    let res = client.get(&download_path).dispatch();
    assert_eq!(res.status(), Status::Ok);
    assert_eq!(res.into_bytes().unwrap(), b"not-really-a-jpeg".to_vec());
}

#[test]
fn download_with_a_different_owner_id_is_forbidden() {
    let client = test_client();
    let alice = register(&client, "bob_uploads");

    let res = client
        .post("/uploads?original_name=secret.txt&mime_type=text%2Fplain")
        .header(ContentType::Binary)
        .private_cookie(alice.cookie.clone())
        .body(b"top secret".to_vec())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    let url = body["url"].as_str().unwrap().to_string();
    let download_path = url.strip_prefix("http://localhost").unwrap_or(&url);

    // Tamper with the owner query parameter without re-signing: the HMAC no
    // longer matches, so this must be rejected regardless of what the DB
    // row's real owner is (spec.md §8 "signed-URL binding").
    let (before, after) = download_path.split_once("owner=").expect("url carries an owner param");
    let (real_owner, rest) = after.split_once('&').expect("owner param is followed by more params");
    let tampered = format!("{before}owner={}&{rest}", real_owner.parse::<i64>().unwrap() + 1);
    let res = client.get(&tampered).dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn identical_bytes_from_the_same_owner_reuse_the_existing_upload() {
    let client = test_client();
    let alice = register(&client, "helen_uploads");

    let res = client
        .post("/uploads?original_name=photo.jpg&mime_type=image%2Fjpeg")
        .header(ContentType::Binary)
        .private_cookie(alice.cookie.clone())
        .body(b"same-bytes-twice".to_vec())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let first: serde_json::Value = res.into_json().unwrap();

    let res = client
        .post("/uploads?original_name=photo-again.jpg&mime_type=image%2Fjpeg")
        .header(ContentType::Binary)
        .private_cookie(alice.cookie.clone())
        .body(b"same-bytes-twice".to_vec())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let second: serde_json::Value = res.into_json().unwrap();

    // Same owner, same content: the second upload reuses the first row
    // instead of minting a new key and a second copy on disk.
    assert_eq!(first["id"], second["id"]);
    assert_eq!(first["key"], second["key"]);
}

#[test]
fn rejects_svg_upload_by_mime_type() {
    let client = test_client();
    let alice = register(&client, "carol_uploads");

    let res = client
        .post("/uploads?original_name=evil.svg&mime_type=image%2Fsvg%2Bxml")
        .header(ContentType::Binary)
        .private_cookie(alice.cookie.clone())
        .body(b"<svg onload=alert(1)>".to_vec())
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn rejects_executable_upload_by_extension() {
    let client = test_client();
    let alice = register(&client, "dave_uploads");

    let res = client
        .post("/uploads?original_name=setup.exe&mime_type=application%2Foctet-stream")
        .header(ContentType::Binary)
        .private_cookie(alice.cookie.clone())
        .body(b"MZ\x90\x00".to_vec())
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn upload_without_a_session_is_unauthorized() {
    let client = test_client();
    let res = client
        .post("/uploads?original_name=photo.jpg&mime_type=image%2Fjpeg")
        .header(ContentType::Binary)
        .body(b"bytes".to_vec())
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn presigned_intent_then_complete_returns_a_signed_url() {
    let client = test_client();
    let alice = register(&client, "erin_uploads");

    let res = client
        .post("/uploads/intent")
        .header(ContentType::JSON)
        .private_cookie(alice.cookie.clone())
        .body(r#"{"original_name": "clip.mp4", "mime_type": "video/mp4", "size": 2048}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let intent: serde_json::Value = res.into_json().unwrap();
    let upload_id = intent["uploadId"].as_i64().unwrap();
    assert!(intent["putUrl"].as_str().unwrap().contains(&intent["key"].as_str().unwrap().to_string()));

    let res = client
        .post("/uploads/complete")
        .header(ContentType::JSON)
        .private_cookie(alice.cookie.clone())
        .body(format!(r#"{{"upload_id": {upload_id}}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let completed: serde_json::Value = res.into_json().unwrap();
    assert_eq!(completed["ok"], true);
    assert!(completed["url"].as_str().unwrap().starts_with("/uploads/"));
}

#[test]
fn completing_an_upload_owned_by_someone_else_is_forbidden() {
    let client = test_client();
    let alice = register(&client, "frank_uploads");
    let mallory = register(&client, "mallory_uploads");

    let res = client
        .post("/uploads/intent")
        .header(ContentType::JSON)
        .private_cookie(alice.cookie.clone())
        .body(r#"{"original_name": "clip.mp4", "mime_type": "video/mp4", "size": 2048}"#)
        .dispatch();
    let intent: serde_json::Value = res.into_json().unwrap();
    let upload_id = intent["uploadId"].as_i64().unwrap();

    let res = client
        .post("/uploads/complete")
        .header(ContentType::JSON)
        .private_cookie(mallory.cookie.clone())
        .body(format!(r#"{{"upload_id": {upload_id}}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn oversized_intent_is_rejected() {
    let client = test_client();
    let alice = register(&client, "grace_uploads");

    let res = client
        .post("/uploads/intent")
        .header(ContentType::JSON)
        .private_cookie(alice.cookie.clone())
        .body(r#"{"original_name": "huge.bin", "mime_type": "application/octet-stream", "size": 999999999999}"#)
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}
