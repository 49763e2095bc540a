use rocket::http::Status;

use crate::common::{add_participant, create_room, register, send_message, test_client};

#[test]
fn clearing_a_thread_hides_prior_messages_only_for_the_caller() {
    let client = test_client();
    let alice = register(&client, "alice");
    let bob = register(&client, "bob");
    let room_id = create_room(&client, &alice, true);
    add_participant(&client, &alice, room_id, bob.user_id);
    send_message(&client, &alice, room_id, "before the clear");

    let res = client.post(format!("/messages/{room_id}/clear")).private_cookie(bob.cookie.clone()).dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client.get(format!("/messages/{room_id}")).private_cookie(bob.cookie.clone()).dispatch();
    let page: serde_json::Value = res.into_json().unwrap();
    assert_eq!(page["count"].as_i64().unwrap(), 0);

    let res = client.get(format!("/messages/{room_id}")).private_cookie(alice.cookie.clone()).dispatch();
    let page: serde_json::Value = res.into_json().unwrap();
    assert_eq!(page["count"].as_i64().unwrap(), 1);
}

#[test]
fn messages_sent_after_a_clear_are_still_visible() {
    let client = test_client();
    let alice = register(&client, "alice");
    let room_id = create_room(&client, &alice, true);
    send_message(&client, &alice, room_id, "old message");

    client.post(format!("/messages/{room_id}/clear")).private_cookie(alice.cookie.clone()).dispatch();
    send_message(&client, &alice, room_id, "new message");

    let res = client.get(format!("/messages/{room_id}")).private_cookie(alice.cookie.clone()).dispatch();
    let page: serde_json::Value = res.into_json().unwrap();
    assert_eq!(page["count"].as_i64().unwrap(), 1);
    assert_eq!(page["items"][0]["raw_content"], "new message");
}

#[test]
fn clear_all_tombstones_the_room_for_everyone() {
    let client = test_client();
    let alice = register(&client, "alice");
    let bob = register(&client, "bob");
    let room_id = create_room(&client, &alice, true);
    add_participant(&client, &alice, room_id, bob.user_id);
    send_message(&client, &bob, room_id, "group chatter");

    let res = client.post(format!("/messages/{room_id}/clear-all")).private_cookie(alice.cookie.clone()).dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client.get(format!("/messages/{room_id}")).private_cookie(bob.cookie.clone()).dispatch();
    let page: serde_json::Value = res.into_json().unwrap();
    let items = page["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["deleted_for_all"], true);
}

#[test]
fn plain_member_cannot_clear_all() {
    let client = test_client();
    let alice = register(&client, "alice");
    let bob = register(&client, "bob");
    let room_id = create_room(&client, &alice, true);
    add_participant(&client, &alice, room_id, bob.user_id);
    send_message(&client, &alice, room_id, "owner's message");

    let res = client.post(format!("/messages/{room_id}/clear-all")).private_cookie(bob.cookie.clone()).dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}
