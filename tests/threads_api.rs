#![cfg(feature = "inmem-store")]

use actix_web::{test, web, App};
use anonboard::hasher::{Argon2Hasher, HashCost};
use anonboard::models::ThreadView;
use anonboard::repo::inmem::InMemRepo;
use anonboard::{config, AppState};
use serde_json::{json, Value};
use std::sync::Arc;

fn state() -> AppState {
    let hasher = Argon2Hasher::new(HashCost { memory_kib: 8, iterations: 1, parallelism: 1 }).unwrap();
    AppState::new(Arc::new(InMemRepo::ephemeral()), Arc::new(hasher))
}

macro_rules! post_thread {
    ($app:expr, $board:expr, $text:expr, $pw:expr) => {{
        let req = test::TestRequest::post()
            .uri(&format!("/api/threads/{}", $board))
            .set_json(json!({ "text": $text, "delete_password": $pw }))
            .to_request();
        let resp = test::call_service($app, req).await;
        assert_eq!(resp.status(), 303);
        let ack: Value = test::read_body_json(resp).await;
        ack["thread_id"].as_str().unwrap().to_string()
    }};
}

macro_rules! list_board {
    ($app:expr, $board:expr) => {{
        let req = test::TestRequest::get().uri(&format!("/api/threads/{}", $board)).to_request();
        let threads: Vec<ThreadView> = test::call_and_read_body_json($app, req).await;
        threads
    }};
}

async fn body_text<B: actix_web::body::MessageBody>(resp: actix_web::dev::ServiceResponse<B>) -> String {
    String::from_utf8(test::read_body(resp).await.to_vec()).unwrap()
}

#[actix_web::test]
async fn new_thread_is_listed_first_with_redirect_ack() {
    let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(config)).await;

    post_thread!(&app, "tech", "older", "pw");
    let req = test::TestRequest::post()
        .uri("/api/threads/tech")
        .set_json(json!({ "text": "newest", "delete_password": "pw" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 303);
    assert_eq!(resp.headers().get("location").unwrap(), "/b/tech/");
    let ack: Value = test::read_body_json(resp).await;
    assert_eq!(ack["status"], "success");
    assert_eq!(ack["board"], "tech");

    let threads = list_board!(&app, "tech");
    assert_eq!(threads.len(), 2);
    assert_eq!(threads[0].id.to_string(), ack["thread_id"].as_str().unwrap());
    assert_eq!(threads[0].text, "newest");
    assert_eq!(threads[0].reply_count, 0);
    assert!(threads[0].replies.is_empty());
}

#[actix_web::test]
async fn board_listing_caps_at_ten_dropping_the_oldest() {
    let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(config)).await;

    let first = post_thread!(&app, "b", "thread 0", "pw");
    for i in 1..11 {
        post_thread!(&app, "b", format!("thread {i}"), "pw");
    }
    let threads = list_board!(&app, "b");
    assert_eq!(threads.len(), 10);
    assert!(threads.iter().all(|t| t.id.to_string() != first));
    assert_eq!(threads[0].text, "thread 10");
}

#[actix_web::test]
async fn empty_board_is_an_empty_array() {
    let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(config)).await;
    assert!(list_board!(&app, "ghost-town").is_empty());
}

#[actix_web::test]
async fn board_preview_embeds_three_newest_replies() {
    let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(config)).await;
    let tid = post_thread!(&app, "g", "op", "pw");
    for text in ["r1", "r2", "r3", "r4", "r5"] {
        let req = test::TestRequest::post()
            .uri("/api/replies/g")
            .set_json(json!({ "thread_id": tid, "text": text, "delete_password": "pw" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 303);
    }
    let threads = list_board!(&app, "g");
    assert_eq!(threads[0].reply_count, 5);
    let texts: Vec<_> = threads[0].replies.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, ["r5", "r4", "r3"]);
}

#[actix_web::test]
async fn listings_never_expose_password_hash_or_report_flag() {
    let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(config)).await;
    let tid = post_thread!(&app, "g", "op", "pw");
    let req = test::TestRequest::post()
        .uri("/api/replies/g")
        .set_json(json!({ "thread_id": tid, "text": "r", "delete_password": "pw" }))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get().uri("/api/threads/g").to_request();
    let board = String::from_utf8(test::call_and_read_body(&app, req).await.to_vec()).unwrap();
    let req = test::TestRequest::get().uri(&format!("/api/replies/g?thread_id={tid}")).to_request();
    let page = String::from_utf8(test::call_and_read_body(&app, req).await.to_vec()).unwrap();

    for body in [board, page] {
        assert!(!body.contains("delete_password"), "leaked hash: {body}");
        assert!(!body.contains("reported"), "leaked flag: {body}");
        assert!(!body.contains("$argon2"), "leaked hash: {body}");
    }
}

#[actix_web::test]
async fn delete_thread_checks_password() {
    let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(config)).await;
    let tid = post_thread!(&app, "g", "doomed", "letmein");

    let req = test::TestRequest::delete()
        .uri("/api/threads/g")
        .set_json(json!({ "thread_id": tid, "delete_password": "wrong" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert_eq!(body_text(resp).await, "incorrect password");
    assert_eq!(list_board!(&app, "g").len(), 1);

    let req = test::TestRequest::delete()
        .uri("/api/threads/g")
        .set_json(json!({ "thread_id": tid, "delete_password": "letmein" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(body_text(resp).await, "success");
    assert!(list_board!(&app, "g").is_empty());
}

#[actix_web::test]
async fn delete_unknown_thread_reads_as_incorrect_password() {
    let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(config)).await;
    let req = test::TestRequest::delete()
        .uri("/api/threads/g")
        .set_json(json!({ "thread_id": uuid::Uuid::new_v4(), "delete_password": "pw" }))
        .to_request();
    assert_eq!(body_text(test::call_service(&app, req).await).await, "incorrect password");
}

#[actix_web::test]
async fn report_answers_success_even_for_unknown_ids() {
    let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(config)).await;
    let tid = post_thread!(&app, "g", "spam", "pw");

    let req = test::TestRequest::put()
        .uri("/api/threads/g")
        .set_json(json!({ "report_id": tid }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.headers().get("content-type").unwrap().to_str().unwrap().starts_with("text/plain"));
    assert_eq!(body_text(resp).await, "success");

    let req = test::TestRequest::put()
        .uri("/api/threads/g")
        .set_json(json!({ "thread_id": uuid::Uuid::new_v4() }))
        .to_request();
    assert_eq!(body_text(test::call_service(&app, req).await).await, "success");

    // reporting never hides a thread
    assert_eq!(list_board!(&app, "g").len(), 1);
}

#[actix_web::test]
async fn form_encoded_bodies_are_accepted() {
    let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(config)).await;
    let req = test::TestRequest::post()
        .uri("/api/threads/forms")
        .set_form(json!({ "board": "forms", "text": "from a form", "delete_password": "pw" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 303);
    let threads = list_board!(&app, "forms");
    assert_eq!(threads[0].text, "from a form");

    let req = test::TestRequest::delete()
        .uri("/api/threads/forms")
        .set_form(json!({ "thread_id": threads[0].id.to_string(), "delete_password": "pw" }))
        .to_request();
    assert_eq!(body_text(test::call_service(&app, req).await).await, "success");
}

#[actix_web::test]
async fn longest_non_ascii_text_fits_in_a_form_post() {
    let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(config)).await;
    let max = anonboard::models::MAX_TEXT_LENGTH;

    for ch in ["é", "€", "𝄞"] {
        let text = ch.repeat(max);
        let req = test::TestRequest::post()
            .uri("/api/threads/wide")
            .set_form(json!({ "text": text, "delete_password": "pw" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 303, "form post of {ch} rejected");
    }
    let threads = list_board!(&app, "wide");
    assert_eq!(threads.len(), 3);
    assert_eq!(threads[0].text.chars().count(), max);

    let req = test::TestRequest::post()
        .uri("/api/threads/wide")
        .set_form(json!({ "text": "é".repeat(max + 1), "delete_password": "pw" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let err: Value = test::read_body_json(resp).await;
    assert!(err["error"].as_str().unwrap().contains("text"));
}

#[actix_web::test]
async fn malformed_form_reports_the_form_error() {
    let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(config)).await;
    let req = test::TestRequest::post()
        .uri("/api/threads/g")
        .insert_header(("content-type", "application/x-www-form-urlencoded"))
        .set_payload("text=hello")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let err: Value = test::read_body_json(resp).await;
    assert!(!err["error"].as_str().unwrap().contains("Content type"), "{err}");
}

#[actix_web::test]
async fn invalid_bodies_are_rejected_before_dispatch() {
    let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/threads/g")
        .set_json(json!({ "text": "", "delete_password": "pw" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/threads/g")
        .set_json(json!({ "text": "x".repeat(anonboard::models::MAX_TEXT_LENGTH + 1), "delete_password": "pw" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/threads/g")
        .set_json(json!({ "text": "no password" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::put()
        .uri("/api/threads/g")
        .set_json(json!({ "report_id": "not-a-uuid" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let err: Value = test::read_body_json(resp).await;
    assert!(err["error"].as_str().unwrap().contains("invalid request body"));

    assert!(list_board!(&app, "g").is_empty());
}

#[actix_web::test]
async fn delete_all_reports_how_many_records_went() {
    let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(config)).await;
    let tid = post_thread!(&app, "a", "one", "pw");
    post_thread!(&app, "b", "two", "pw");
    let req = test::TestRequest::post()
        .uri("/api/replies/a")
        .set_json(json!({ "thread_id": tid, "text": "r", "delete_password": "pw" }))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get().uri("/_api/delete-all-threads").to_request();
    let summary: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(summary, json!({ "acknowledged": true, "deleted_count": 3 }));
    assert!(list_board!(&app, "a").is_empty());
    assert!(list_board!(&app, "b").is_empty());
}
