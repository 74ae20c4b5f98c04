mod common;

use common::{amount, data, id_of, TestApp, PNG_BASE64};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn create_collection_charges_every_student() {
    let app = TestApp::spawn().await;
    app.create_student("Ana", "rep-1").await;
    app.create_student("Luis", "rep-2").await;

    let collection = app.create_collection("Excursión", "100").await;
    assert_eq!(amount(&collection["individual_amount"]), dec!(50));
    assert_eq!(collection["student_quantity"]["kind"], "All");

    let payments = data(
        app.get(
            &format!("/collections/{}/payments", id_of(&collection)),
            &app.admin_token(),
        )
        .await,
    )
    .await;
    let payments = payments.as_array().expect("payments array");
    assert_eq!(payments.len(), 2);
    for payment in payments {
        assert_eq!(payment["payment_status"], "Pending");
        assert_eq!(amount(&payment["pending"]), dec!(50));
    }
}

#[tokio::test]
async fn create_collection_stores_images() {
    let app = TestApp::spawn().await;
    app.create_student("Ana", "rep-1").await;

    let response = app
        .post(
            "/collections",
            &app.admin_token(),
            &json!({
                "name": "Uniformes",
                "total_amount": "30",
                "images": [{ "file_name": "recibo.png", "content_base64": PNG_BASE64 }]
            }),
        )
        .await;
    assert_eq!(response.status(), 201);

    let collection = data(response).await;
    let urls = collection["image_urls"].as_array().expect("image urls");
    assert_eq!(urls.len(), 1);
    assert!(urls[0]
        .as_str()
        .unwrap()
        .starts_with("http://localhost/images/collections/"));
}

#[tokio::test]
async fn representatives_cannot_create_collections() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/collections",
            &app.rep_token("rep-1"),
            &json!({ "name": "Excursión", "total_amount": "100" }),
        )
        .await;
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn non_positive_total_is_rejected() {
    let app = TestApp::spawn().await;
    app.create_student("Ana", "rep-1").await;

    let response = app
        .post(
            "/collections",
            &app.admin_token(),
            &json!({ "name": "Excursión", "total_amount": "0" }),
        )
        .await;
    assert_eq!(response.status(), 422);
}

#[tokio::test]
async fn adjusting_twice_changes_nothing_the_second_time() {
    let app = TestApp::spawn().await;
    app.create_student("Ana", "rep-1").await;
    let collection = app.create_collection("Excursión", "100").await;
    let id = id_of(&collection);

    let body = json!({ "adjusted_amount": "80", "surplus": "0" });
    let first = data(
        app.post(&format!("/collections/{}/adjust", id), &app.admin_token(), &body)
            .await,
    )
    .await;
    let second = data(
        app.post(&format!("/collections/{}/adjust", id), &app.admin_token(), &body)
            .await,
    )
    .await;

    assert_eq!(amount(&first["adjusted_individual_amount"]), dec!(80));
    assert_eq!(first["version"], second["version"]);

    let payments = data(
        app.get(&format!("/collections/{}/payments", id), &app.admin_token())
            .await,
    )
    .await;
    assert_eq!(amount(&payments[0]["amount_collection"]), dec!(100));
    assert_eq!(amount(&payments[0]["pending"]), dec!(80));
}

#[tokio::test]
async fn collection_with_payments_cannot_be_deleted() {
    let app = TestApp::spawn().await;
    let student_id = app.create_student("Ana", "rep-1").await;
    let collection = app.create_collection("Excursión", "100").await;
    let id = id_of(&collection);

    let response = app
        .post(
            "/student-payments",
            &app.admin_token(),
            &json!({ "collection_id": id, "student_id": student_id, "amount_paid": "10" }),
        )
        .await;
    assert_eq!(response.status(), 201);

    let response = app
        .delete(&format!("/collections/{}", id), &app.admin_token())
        .await;
    assert_eq!(response.status(), 400);

    let empty = app.create_collection("Libros", "20").await;
    let response = app
        .delete(&format!("/collections/{}", id_of(&empty)), &app.admin_token())
        .await;
    assert_eq!(response.status(), 200);
    let response = app
        .get(&format!("/collections/{}", id_of(&empty)), &app.admin_token())
        .await;
    assert_eq!(response.status(), 404);
}
