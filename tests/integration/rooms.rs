use rocket::http::{ContentType, Status};

use crate::common::{add_participant, create_room, register, test_client};

#[test]
fn creating_a_room_makes_the_caller_its_owner() {
    let client = test_client();
    let alice = register(&client, "alice");
    let room_id = create_room(&client, &alice, true);

    let res = client.get(format!("/rooms/{room_id}/participants")).private_cookie(alice.cookie.clone()).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let participants: serde_json::Value = res.into_json().unwrap();
    let participants = participants.as_array().unwrap();
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0]["user_id"].as_i64().unwrap(), alice.user_id);
    assert_eq!(participants[0]["role"], "OWNER");
}

#[test]
fn only_owner_or_admin_may_add_participants() {
    let client = test_client();
    let alice = register(&client, "alice");
    let bob = register(&client, "bob");
    let carol = register(&client, "carol");
    let room_id = create_room(&client, &alice, true);
    add_participant(&client, &alice, room_id, bob.user_id);

    // Bob is a plain MEMBER, not the owner: he may not add Carol.
    let status = add_participant(&client, &bob, room_id, carol.user_id);
    assert_eq!(status, Status::Forbidden);
}

#[test]
fn owner_promotes_a_member_to_admin_who_can_then_add_others() {
    let client = test_client();
    let alice = register(&client, "alice");
    let bob = register(&client, "bob");
    let carol = register(&client, "carol");
    let room_id = create_room(&client, &alice, true);
    add_participant(&client, &alice, room_id, bob.user_id);

    let res = client
        .post(format!("/rooms/{room_id}/participants/{}/promote", bob.user_id))
        .private_cookie(alice.cookie.clone())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    let status = add_participant(&client, &bob, room_id, carol.user_id);
    assert_eq!(status, Status::Ok);
}

#[test]
fn only_the_owner_may_grant_admin() {
    let client = test_client();
    let alice = register(&client, "alice");
    let bob = register(&client, "bob");
    let carol = register(&client, "carol");
    let room_id = create_room(&client, &alice, true);
    add_participant(&client, &alice, room_id, bob.user_id);
    add_participant(&client, &alice, room_id, carol.user_id);

    // Promote bob to admin via the owner.
    client
        .post(format!("/rooms/{room_id}/participants/{}/promote", bob.user_id))
        .private_cookie(alice.cookie.clone())
        .dispatch();

    // Bob (ADMIN) tries to grant ADMIN to Carol — only the OWNER may.
    let res = client
        .patch(format!("/rooms/{room_id}/participants/{}/role", carol.user_id))
        .header(ContentType::JSON)
        .private_cookie(bob.cookie.clone())
        .body(r#"{"role": "ADMIN"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn the_owners_role_cannot_be_changed_and_the_owner_cannot_be_kicked() {
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
        .patch(format!("/rooms/{room_id}/participants/{}/role", alice.user_id))
        .header(ContentType::JSON)
        .private_cookie(bob.cookie.clone())
        .body(r#"{"role": "MEMBER"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);

    let res = client
        .delete(format!("/rooms/{room_id}/participants/{}", alice.user_id))
        .private_cookie(bob.cookie.clone())
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn owner_must_transfer_ownership_before_leaving() {
    let client = test_client();
    let alice = register(&client, "alice");
    let room_id = create_room(&client, &alice, true);

    let res = client.post(format!("/rooms/{room_id}/leave")).private_cookie(alice.cookie.clone()).dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn a_member_can_leave_on_their_own() {
    let client = test_client();
    let alice = register(&client, "alice");
    let bob = register(&client, "bob");
    let room_id = create_room(&client, &alice, true);
    add_participant(&client, &alice, room_id, bob.user_id);

    let res = client.post(format!("/rooms/{room_id}/leave")).private_cookie(bob.cookie.clone()).dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client.get(format!("/rooms/{room_id}/participants")).private_cookie(alice.cookie.clone()).dispatch();
    let participants: serde_json::Value = res.into_json().unwrap();
    assert_eq!(participants.as_array().unwrap().len(), 1);
}

#[test]
fn invite_code_lets_a_stranger_join_as_a_member() {
    let client = test_client();
    let alice = register(&client, "alice");
    let dave = register(&client, "dave");
    let room_id = create_room(&client, &alice, true);

    let res = client.post(format!("/group-invites/{room_id}")).private_cookie(alice.cookie.clone()).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    let code = body["code"].as_str().unwrap().to_string();

    let res = client.post(format!("/group-invites/{code}/join")).private_cookie(dave.cookie.clone()).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["chatRoomId"].as_i64().unwrap(), room_id);
}

#[test]
fn expired_invite_code_is_rejected() {
    let client = test_client();
    let alice = register(&client, "alice");
    let dave = register(&client, "dave");
    let room_id = create_room(&client, &alice, true);

    let res = client
        .post(format!("/group-invites/{room_id}?ttl_secs=0"))
        .private_cookie(alice.cookie.clone())
        .dispatch();
    let body: serde_json::Value = res.into_json().unwrap();
    let code = body["code"].as_str().unwrap().to_string();

    std::thread::sleep(std::time::Duration::from_millis(5));
    let res = client.post(format!("/group-invites/{code}/join")).private_cookie(dave.cookie.clone()).dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn typing_update_requires_room_membership() {
    let client = test_client();
    let alice = register(&client, "alice");
    let mallory = register(&client, "mallory");
    let room_id = create_room(&client, &alice, true);

    let res = client
        .post(format!("/rooms/{room_id}/typing"))
        .header(ContentType::JSON)
        .private_cookie(alice.cookie.clone())
        .body(r#"{"is_typing": true}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client
        .post(format!("/rooms/{room_id}/typing"))
        .header(ContentType::JSON)
        .private_cookie(mallory.cookie.clone())
        .body(r#"{"is_typing": true}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn non_member_cannot_list_participants() {
    let client = test_client();
    let alice = register(&client, "alice");
    let mallory = register(&client, "mallory");
    let room_id = create_room(&client, &alice, true);

    let res = client
        .get(format!("/rooms/{room_id}/participants"))
        .private_cookie(mallory.cookie.clone())
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}
