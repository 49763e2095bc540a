use rocket::http::{ContentType, Status};

use crate::common::{add_participant, create_room, register, send_message, test_client};

#[test]
fn a_message_expiring_immediately_never_shows_up_in_the_list() {
    let client = test_client();
    let alice = register(&client, "alice");
    let room_id = create_room(&client, &alice, true);

    let res = client
        .post(format!("/messages/{room_id}"))
        .header(ContentType::JSON)
        .private_cookie(alice.cookie.clone())
        .body(r#"{"content": "self destructs", "expire_seconds": -1}"#)
        .dispatch();
    // expire_seconds must be positive: a non-positive value means "no expiry",
    // so this is just an ordinary persisted message.
    assert_eq!(res.status(), Status::Ok);
    let res = client.get(format!("/messages/{room_id}")).private_cookie(alice.cookie.clone()).dispatch();
    let page: serde_json::Value = res.into_json().unwrap();
    assert_eq!(page["count"].as_i64().unwrap(), 1);
}

#[test]
fn rejoining_a_room_does_not_resurface_messages_sent_before_the_prior_leave() {
    let client = test_client();
    let alice = register(&client, "alice");
    let bob = register(&client, "bob");
    let room_id = create_room(&client, &alice, true);
    add_participant(&client, &alice, room_id, bob.user_id);
    send_message(&client, &alice, room_id, "seen before leaving");

    client.post(format!("/rooms/{room_id}/leave")).private_cookie(bob.cookie.clone()).dispatch();
    add_participant(&client, &alice, room_id, bob.user_id);

    send_message(&client, &alice, room_id, "sent after rejoining");
    let res = client.get(format!("/messages/{room_id}")).private_cookie(bob.cookie.clone()).dispatch();
    let page: serde_json::Value = res.into_json().unwrap();
    let items = page["items"].as_array().unwrap();
    assert!(items.iter().all(|m| m["raw_content"] != "seen before leaving"));
    assert!(items.iter().any(|m| m["raw_content"] == "sent after rejoining"));
}

#[test]
fn a_non_member_cannot_list_messages_in_a_room_they_never_joined() {
    let client = test_client();
    let alice = register(&client, "alice");
    let mallory = register(&client, "mallory");
    let room_id = create_room(&client, &alice, true);
    send_message(&client, &alice, room_id, "private chatter");

    let res = client.get(format!("/messages/{room_id}")).private_cookie(mallory.cookie.clone()).dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}
