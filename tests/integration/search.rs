use crate::common::{create_room, register, send_message, test_client};

#[test]
fn search_finds_a_message_by_word() {
    let client = test_client();
    let alice = register(&client, "alice");
    let room_id = create_room(&client, &alice, true);
    send_message(&client, &alice, room_id, "the quick brown fox");
    send_message(&client, &alice, room_id, "completely unrelated");

    let res = client.get("/messages/search?q=quick").private_cookie(alice.cookie.clone()).dispatch();
    let hits: serde_json::Value = res.into_json().unwrap();
    let hits = hits.as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["raw_content"], "the quick brown fox");
}

#[test]
fn search_is_scoped_to_the_callers_rooms() {
    let client = test_client();
    let alice = register(&client, "alice");
    let mallory = register(&client, "mallory");
    let room_id = create_room(&client, &alice, true);
    send_message(&client, &alice, room_id, "a secret plan about penguins");

    let res = client.get("/messages/search?q=penguins").private_cookie(mallory.cookie.clone()).dispatch();
    let hits: serde_json::Value = res.into_json().unwrap();
    assert_eq!(hits.as_array().unwrap().len(), 0);
}

#[test]
fn search_rejects_an_empty_query() {
    let client = test_client();
    let alice = register(&client, "alice");
    let _room_id = create_room(&client, &alice, true);

    let res = client.get("/messages/search?q=").private_cookie(alice.cookie.clone()).dispatch();
    assert_eq!(res.status(), rocket::http::Status::BadRequest);
}
