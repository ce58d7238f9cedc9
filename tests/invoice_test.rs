//! Invoice CRUD integration tests.

mod common;

use common::{sample_invoice_body, TestApp, OTHER_OWNER_ID, TEST_OWNER_ID};
use serde_json::json;

#[tokio::test]
async fn create_invoice_derives_totals() {
    let app = TestApp::spawn().await;

    let invoice = app.create_invoice(sample_invoice_body()).await;

    assert_eq!(invoice["subtotal"], "125.00");
    assert_eq!(invoice["tax_amount"], "22.50");
    assert_eq!(invoice["total_amount"], "147.50");
    assert_eq!(invoice["status"], "pending");
    assert_eq!(invoice["invoice_number"], "INV-0007-0001");
    assert_eq!(invoice["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn invoice_numbers_are_sequential_per_owner() {
    let app = TestApp::spawn().await;

    let first = app.create_invoice(sample_invoice_body()).await;
    let second = app.create_invoice(sample_invoice_body()).await;
    assert_eq!(first["invoice_number"], "INV-0007-0001");
    assert_eq!(second["invoice_number"], "INV-0007-0002");

    // A different owner gets an independent sequence.
    let response = app
        .client
        .post(app.url("/invoices"))
        .header("X-Owner-Id", OTHER_OWNER_ID)
        .json(&sample_invoice_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let other: serde_json::Value = response.json().await.unwrap();
    assert_eq!(other["invoice_number"], "INV-0008-0001");
}

#[tokio::test]
async fn due_date_before_issue_date_is_rejected() {
    let app = TestApp::spawn().await;

    let mut body = sample_invoice_body();
    body["due_date"] = json!("2026-07-01");

    let response = app
        .client
        .post(app.url("/invoices"))
        .header("X-Owner-Id", TEST_OWNER_ID)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn invalid_email_is_rejected() {
    let app = TestApp::spawn().await;

    let mut body = sample_invoice_body();
    body["client_email"] = json!("not-an-email");

    let response = app
        .client
        .post(app.url("/invoices"))
        .header("X-Owner-Id", TEST_OWNER_ID)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 422);
}

#[tokio::test]
async fn zero_quantity_item_is_rejected() {
    let app = TestApp::spawn().await;

    let mut body = sample_invoice_body();
    body["items"][0]["quantity"] = json!("0");

    let response = app
        .client
        .post(app.url("/invoices"))
        .header("X-Owner-Id", TEST_OWNER_ID)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn missing_owner_header_is_unauthorized() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url("/invoices"))
        .json(&sample_invoice_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn get_is_scoped_to_the_owner() {
    let app = TestApp::spawn().await;
    let invoice = app.create_invoice(sample_invoice_body()).await;
    let id = invoice["id"].as_str().unwrap();

    let own = app
        .client
        .get(app.url(&format!("/invoices/{}", id)))
        .header("X-Owner-Id", TEST_OWNER_ID)
        .send()
        .await
        .unwrap();
    assert_eq!(own.status().as_u16(), 200);

    // Another owner sees 404, not 403: the invoice does not exist for them.
    let foreign = app
        .client
        .get(app.url(&format!("/invoices/{}", id)))
        .header("X-Owner-Id", OTHER_OWNER_ID)
        .send()
        .await
        .unwrap();
    assert_eq!(foreign.status().as_u16(), 404);
}

#[tokio::test]
async fn update_replaces_items_and_recomputes_totals() {
    let app = TestApp::spawn().await;
    let invoice = app.create_invoice(sample_invoice_body()).await;
    let id = invoice["id"].as_str().unwrap();

    let mut body = sample_invoice_body();
    body["items"] = json!([
        { "description": "Retainer", "quantity": "1", "unit_price": "200" }
    ]);

    let response = app
        .client
        .put(app.url(&format!("/invoices/{}", id)))
        .header("X-Owner-Id", TEST_OWNER_ID)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let updated: serde_json::Value = response.json().await.unwrap();
    assert_eq!(updated["subtotal"], "200.00");
    assert_eq!(updated["tax_amount"], "36.00");
    assert_eq!(updated["total_amount"], "236.00");
    assert_eq!(updated["items"].as_array().unwrap().len(), 1);
    // The number never changes on edit.
    assert_eq!(updated["invoice_number"], invoice["invoice_number"]);
}

#[tokio::test]
async fn delete_removes_the_invoice() {
    let app = TestApp::spawn().await;
    let invoice = app.create_invoice(sample_invoice_body()).await;
    let id = invoice["id"].as_str().unwrap();

    let response = app
        .client
        .delete(app.url(&format!("/invoices/{}", id)))
        .header("X-Owner-Id", TEST_OWNER_ID)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let gone = app
        .client
        .get(app.url(&format!("/invoices/{}", id)))
        .header("X-Owner-Id", TEST_OWNER_ID)
        .send()
        .await
        .unwrap();
    assert_eq!(gone.status().as_u16(), 404);
}

#[tokio::test]
async fn list_returns_only_own_invoices() {
    let app = TestApp::spawn().await;
    app.create_invoice(sample_invoice_body()).await;
    app.create_invoice(sample_invoice_body()).await;

    let response = app
        .client
        .get(app.url("/invoices"))
        .header("X-Owner-Id", TEST_OWNER_ID)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let list: Vec<serde_json::Value> = response.json().await.unwrap();
    assert_eq!(list.len(), 2);

    let other = app
        .client
        .get(app.url("/invoices"))
        .header("X-Owner-Id", OTHER_OWNER_ID)
        .send()
        .await
        .unwrap();
    let other_list: Vec<serde_json::Value> = other.json().await.unwrap();
    assert!(other_list.is_empty());
}

#[tokio::test]
async fn summary_counts_by_status() {
    let app = TestApp::spawn().await;
    let invoice = app.create_invoice(sample_invoice_body()).await;
    app.create_invoice(sample_invoice_body()).await;

    // Mark one paid so the summary splits.
    let id = invoice["id"].as_str().unwrap();
    let response = app
        .client
        .post(app.url(&format!("/invoices/{}/mark-paid", id)))
        .header("X-Owner-Id", TEST_OWNER_ID)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = app
        .client
        .get(app.url("/invoices/summary"))
        .header("X-Owner-Id", TEST_OWNER_ID)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let summary: serde_json::Value = response.json().await.unwrap();
    assert_eq!(summary["total_invoices"], 2);
    assert_eq!(summary["paid_invoices"], 1);
    assert_eq!(summary["pending_invoices"], 1);
}

#[tokio::test]
async fn mark_paid_is_idempotent_and_records_one_payment() {
    let app = TestApp::spawn().await;
    let invoice = app.create_invoice(sample_invoice_body()).await;
    let id = invoice["id"].as_str().unwrap();
    let url = app.url(&format!("/invoices/{}/mark-paid", id));

    let first = app
        .client
        .post(&url)
        .header("X-Owner-Id", TEST_OWNER_ID)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status().as_u16(), 200);

    let second = app
        .client
        .post(&url)
        .header("X-Owner-Id", TEST_OWNER_ID)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status().as_u16(), 200);
    let body: serde_json::Value = second.json().await.unwrap();
    assert_eq!(body["message"], "Invoice is already paid");

    use invoice_service::services::InvoiceRepository;
    let invoice_id = uuid::Uuid::parse_str(id).unwrap();
    let payments = app.repository.list_payments(invoice_id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].gateway, "manual");
}

#[tokio::test]
async fn pdf_download_returns_a_pdf() {
    let app = TestApp::spawn().await;
    let invoice = app.create_invoice(sample_invoice_body()).await;
    let id = invoice["id"].as_str().unwrap();

    let response = app
        .client
        .get(app.url(&format!("/invoices/{}/pdf", id)))
        .header("X-Owner-Id", TEST_OWNER_ID)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/pdf"
    );
    assert!(response.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .contains("invoice_INV-0007-0001.pdf"));

    let bytes = response.bytes().await.unwrap();
    assert!(bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn health_endpoints_respond() {
    let app = TestApp::spawn().await;

    let health = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(health.status().as_u16(), 200);

    let ready = app.client.get(app.url("/ready")).send().await.unwrap();
    assert_eq!(ready.status().as_u16(), 200);
}
