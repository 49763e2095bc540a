use rocket::http::{ContentType, Status};

use crate::common::{add_participant, create_room, register, test_client};

#[test]
fn admin_or_owner_demote_changes_role_to_member() {
    let client = test_client();
    let alice = register(&client, "alice");
    let bob = register(&client, "bob");
    let room_id = create_room(&client, &alice, true);
    add_participant(&client, &alice, room_id, bob.user_id);
    client
        .post(format!("/rooms/{room_id}/participants/{}/promote", bob.user_id))
        .private_cookie(alice.cookie.clone())
        .dispatch();

    let res = client
        .patch(format!("/rooms/{room_id}/participants/{}/role", bob.user_id))
        .header(ContentType::JSON)
        .private_cookie(alice.cookie.clone())
        .body(r#"{"role": "MEMBER"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client.get(format!("/rooms/{room_id}/participants")).private_cookie(alice.cookie.clone()).dispatch();
    let participants: serde_json::Value = res.into_json().unwrap();
    let bob_row = participants
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["user_id"].as_i64().unwrap() == bob.user_id)
        .unwrap();
    assert_eq!(bob_row["role"], "MEMBER");
}

#[test]
fn owner_kicks_a_plain_member() {
    let client = test_client();
    let alice = register(&client, "alice");
    let bob = register(&client, "bob");
    let room_id = create_room(&client, &alice, true);
    add_participant(&client, &alice, room_id, bob.user_id);

    let res = client
        .delete(format!("/rooms/{room_id}/participants/{}", bob.user_id))
        .private_cookie(alice.cookie.clone())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client.get(format!("/rooms/{room_id}/participants")).private_cookie(alice.cookie.clone()).dispatch();
    let participants: serde_json::Value = res.into_json().unwrap();
    assert_eq!(participants.as_array().unwrap().len(), 1);
}

#[test]
fn plain_member_cannot_kick_another_member() {
    let client = test_client();
    let alice = register(&client, "alice");
    let bob = register(&client, "bob");
    let carol = register(&client, "carol");
    let room_id = create_room(&client, &alice, true);
    add_participant(&client, &alice, room_id, bob.user_id);
    add_participant(&client, &alice, room_id, carol.user_id);

    let res = client
        .delete(format!("/rooms/{room_id}/participants/{}", carol.user_id))
        .private_cookie(bob.cookie.clone())
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn adding_the_same_participant_twice_is_idempotent() {
    let client = test_client();
    let alice = register(&client, "alice");
    let bob = register(&client, "bob");
    let room_id = create_room(&client, &alice, true);

    let first = add_participant(&client, &alice, room_id, bob.user_id);
    assert_eq!(first, Status::Ok);
    let second = add_participant(&client, &alice, room_id, bob.user_id);
    assert_eq!(second, Status::Ok);

    let res = client.get(format!("/rooms/{room_id}/participants")).private_cookie(alice.cookie.clone()).dispatch();
    let participants: serde_json::Value = res.into_json().unwrap();
    assert_eq!(participants.as_array().unwrap().len(), 2);
}
