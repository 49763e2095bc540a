use rocket::http::{ContentType, Status};

use crate::common::{add_participant, create_room, register, send_message, test_client};

#[test]
fn reacting_then_reacting_again_toggles_it_off() {
    let client = test_client();
    let alice = register(&client, "alice");
    let bob = register(&client, "bob");
    let room_id = create_room(&client, &alice, true);
    add_participant(&client, &alice, room_id, bob.user_id);
    let view = send_message(&client, &alice, room_id, "react to me");
    let id = view["id"].as_i64().unwrap();

    let res = client
        .post(format!("/messages/{id}/reactions"))
        .header(ContentType::JSON)
        .private_cookie(bob.cookie.clone())
        .body(r#"{"emoji": "👍"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["op"], "added");
    assert_eq!(body["count"].as_i64().unwrap(), 1);

    let res = client
        .post(format!("/messages/{id}/reactions"))
        .header(ContentType::JSON)
        .private_cookie(bob.cookie.clone())
        .body(r#"{"emoji": "👍"}"#)
        .dispatch();
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["op"], "removed");
    assert_eq!(body["count"].as_i64().unwrap(), 0);
}

#[test]
fn non_member_cannot_react() {
    let client = test_client();
    let alice = register(&client, "alice");
    let mallory = register(&client, "mallory");
    let room_id = create_room(&client, &alice, true);
    let view = send_message(&client, &alice, room_id, "no strangers");
    let id = view["id"].as_i64().unwrap();

    let res = client
        .post(format!("/messages/{id}/reactions"))
        .header(ContentType::JSON)
        .private_cookie(mallory.cookie.clone())
        .body(r#"{"emoji": "👍"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn different_emoji_react_independently() {
    let client = test_client();
    let alice = register(&client, "alice");
    let room_id = create_room(&client, &alice, true);
    let view = send_message(&client, &alice, room_id, "two reactions");
    let id = view["id"].as_i64().unwrap();

    let res = client
        .post(format!("/messages/{id}/reactions"))
        .header(ContentType::JSON)
        .private_cookie(alice.cookie.clone())
        .body(r#"{"emoji": "👍"}"#)
        .dispatch();
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["count"].as_i64().unwrap(), 1);

    let res = client
        .post(format!("/messages/{id}/reactions"))
        .header(ContentType::JSON)
        .private_cookie(alice.cookie.clone())
        .body(r#"{"emoji": "🎉"}"#)
        .dispatch();
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["count"].as_i64().unwrap(), 1);
}
