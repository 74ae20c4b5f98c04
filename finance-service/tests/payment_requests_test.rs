mod common;

use common::{amount, data, id_of, TestApp};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

async fn submit(app: &TestApp, rep: &str, collection_id: &str, student_id: &str, paid: &str) -> Value {
    let response = app
        .post(
            "/payment-requests",
            &app.rep_token(rep),
            &json!({
                "collection_id": collection_id,
                "student_id": student_id,
                "amount_paid": paid,
                "voucher": "TRX-001"
            }),
        )
        .await;
    assert_eq!(response.status(), 201);
    data(response).await
}

#[tokio::test]
async fn approved_request_settles_payment_and_credits_petty_cash() {
    let app = TestApp::spawn().await;
    let student_id = app.create_student("Ana", "rep-1").await;
    let collection = app.create_collection("Excursión", "100").await;
    let collection_id = id_of(&collection);

    let request = submit(&app, "rep-1", &collection_id, &student_id, "50").await;
    assert_eq!(request["status"], "Pending");
    assert_eq!(amount(&request["pending_amount"]), dec!(100));

    let response = app
        .post(
            &format!("/payment-requests/{}/approve", id_of(&request)),
            &app.admin_token(),
            &json!({ "comment": "Verificado" }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let approved = data(response).await;
    assert_eq!(approved["status"], "Approved");
    assert_eq!(approved["approved_by_admin_id"], "admin-1");
    assert!(approved["student_payment_id"].is_string());

    let payments = data(
        app.get(
            &format!("/student-payments?collection_id={}", collection_id),
            &app.admin_token(),
        )
        .await,
    )
    .await;
    assert_eq!(payments.as_array().map(Vec::len), Some(1));
    assert_eq!(amount(&payments[0]["amount_paid"]), dec!(50));
    assert_eq!(amount(&payments[0]["pending"]), dec!(50));
    assert_eq!(payments[0]["payment_status"], "PartiallyPaid");

    assert_eq!(app.balance().await, dec!(50));

    let collection = data(
        app.get(&format!("/collections/{}", collection_id), &app.admin_token())
            .await,
    )
    .await;
    assert_eq!(amount(&collection["percentage_paid"]), dec!(50));
}

#[tokio::test]
async fn terminal_requests_refuse_further_transitions() {
    let app = TestApp::spawn().await;
    let student_id = app.create_student("Ana", "rep-1").await;
    let collection_id = id_of(&app.create_collection("Excursión", "100").await);
    let request = submit(&app, "rep-1", &collection_id, &student_id, "50").await;
    let path = format!("/payment-requests/{}", id_of(&request));

    let response = app
        .post(
            &format!("{}/reject", path),
            &app.admin_token(),
            &json!({ "reason": "Comprobante ilegible" }),
        )
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(data(response).await["rejection_reason"], "Comprobante ilegible");

    let response = app
        .post(&format!("{}/approve", path), &app.admin_token(), &json!({}))
        .await;
    assert_eq!(response.status(), 400);
    assert_eq!(app.balance().await, dec!(0));

    let response = app
        .put(&path, &app.rep_token("rep-1"), &json!({ "amount_paid": "60" }))
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn changes_requested_then_resubmitted() {
    let app = TestApp::spawn().await;
    let student_id = app.create_student("Ana", "rep-1").await;
    let collection_id = id_of(&app.create_collection("Excursión", "100").await);
    let request = submit(&app, "rep-1", &collection_id, &student_id, "50").await;
    let path = format!("/payment-requests/{}", id_of(&request));

    let response = app
        .post(
            &format!("{}/request-changes", path),
            &app.admin_token(),
            &json!({ "comment": "Falta el comprobante" }),
        )
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(data(response).await["status"], "NeedsChanges");

    let response = app
        .put(&path, &app.rep_token("rep-1"), &json!({ "amount_paid": "55" }))
        .await;
    assert_eq!(response.status(), 200);
    let resubmitted = data(response).await;
    assert_eq!(resubmitted["status"], "Pending");
    assert_eq!(amount(&resubmitted["amount_paid"]), dec!(55));
    assert_eq!(
        resubmitted["admin_comments"].as_array().map(Vec::len),
        Some(1)
    );
}

#[tokio::test]
async fn representatives_are_scoped_to_their_students() {
    let app = TestApp::spawn().await;
    let student_id = app.create_student("Ana", "rep-1").await;
    let collection_id = id_of(&app.create_collection("Excursión", "100").await);

    let response = app
        .post(
            "/payment-requests",
            &app.rep_token("rep-2"),
            &json!({ "collection_id": collection_id, "student_id": student_id, "amount_paid": "10" }),
        )
        .await;
    assert_eq!(response.status(), 403);

    let request = submit(&app, "rep-1", &collection_id, &student_id, "10").await;
    let response = app
        .get(
            &format!("/payment-requests/{}", id_of(&request)),
            &app.rep_token("rep-2"),
        )
        .await;
    assert_eq!(response.status(), 403);

    let listed = data(app.get("/payment-requests", &app.rep_token("rep-2")).await).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(0));

    let response = app
        .post(
            &format!("/payment-requests/{}/approve", id_of(&request)),
            &app.rep_token("rep-1"),
            &json!({}),
        )
        .await;
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn only_open_requests_can_be_deleted() {
    let app = TestApp::spawn().await;
    let student_id = app.create_student("Ana", "rep-1").await;
    let collection_id = id_of(&app.create_collection("Excursión", "100").await);

    let open = submit(&app, "rep-1", &collection_id, &student_id, "10").await;
    let path = format!("/payment-requests/{}", id_of(&open));
    let response = app.delete(&path, &app.rep_token("rep-1")).await;
    assert_eq!(response.status(), 200);
    let response = app.get(&path, &app.admin_token()).await;
    assert_eq!(response.status(), 404);

    let approved = submit(&app, "rep-1", &collection_id, &student_id, "10").await;
    let path = format!("/payment-requests/{}", id_of(&approved));
    let response = app
        .post(&format!("{}/approve", path), &app.admin_token(), &json!({}))
        .await;
    assert_eq!(response.status(), 200);
    let response = app.delete(&path, &app.admin_token()).await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn unknown_status_filter_is_a_bad_request() {
    let app = TestApp::spawn().await;

    let response = app
        .get("/payment-requests?status=Lost", &app.admin_token())
        .await;
    assert_eq!(response.status(), 400);
}
