//! Client and report lifecycle tests: CSV upload, generation, download and sharing.
//!
//! Run with: `cargo test -p advisor-api --test reports_test`
//! Requires Docker for testcontainers (Postgres).

mod helpers;

use helpers::{api_path, bearer, setup_test_app, SAMPLE_CSV};
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn client_without_company_name_is_a_field_error() {
    let app = setup_test_app().await;
    let token = app.admin_token().await;

    let response = app
        .client()
        .post(&api_path("/clients"))
        .add_header("Authorization", bearer(&token))
        .json(&json!({ "company_name": "", "industry": "Retail" }))
        .await;

    assert_eq!(response.status_code(), 400);
    let body = response.json::<Value>();
    assert_eq!(body["status"], "error");
    assert!(body["errors"]["company_name"].is_array());
}

#[tokio::test]
async fn unknown_report_is_not_found() {
    let app = setup_test_app().await;
    let token = app.admin_token().await;

    let response = app
        .client()
        .get(&api_path(&format!("/reports/{}", Uuid::new_v4())))
        .add_header("Authorization", bearer(&token))
        .await;

    assert_eq!(response.status_code(), 404);
    assert_eq!(response.json::<Value>()["status"], "error");
}

#[tokio::test]
async fn report_for_missing_client_is_rejected() {
    let app = setup_test_app().await;
    let token = app.admin_token().await;

    let response = app
        .client()
        .post(&api_path("/reports"))
        .add_header("Authorization", bearer(&token))
        .json(&json!({ "client_id": Uuid::new_v4(), "report_type": "executive" }))
        .await;

    assert_eq!(response.status_code(), 400);
    assert!(response.json::<Value>()["errors"]["client_id"].is_array());
}

#[tokio::test]
async fn generate_before_upload_is_refused() {
    let app = setup_test_app().await;
    let token = app.admin_token().await;
    let client = app.create_client(&token, "Contoso").await;
    let report = app
        .create_report(&token, client["id"].as_str().unwrap())
        .await;

    let response = app
        .client()
        .post(&api_path(&format!("/reports/{}/generate", report["id"].as_str().unwrap())))
        .add_header("Authorization", bearer(&token))
        .await;

    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn upload_with_wrong_header_lists_missing_columns() {
    let app = setup_test_app().await;
    let token = app.admin_token().await;
    let client = app.create_client(&token, "Fabrikam").await;
    let report = app
        .create_report(&token, client["id"].as_str().unwrap())
        .await;

    let response = app
        .upload_csv(&token, report["id"].as_str().unwrap(), "Name,Value\nfoo,1\n")
        .await;

    assert_eq!(response.status_code(), 400);
    let body = response.json::<Value>();
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("Category"));
}

#[tokio::test]
async fn upload_generate_download_flow() {
    let app = setup_test_app().await;
    let token = app.admin_token().await;
    let client = app.create_client(&token, "Northwind").await;
    let client_id = client["id"].as_str().unwrap().to_string();
    let report = app.create_report(&token, &client_id).await;
    let report_id = report["id"].as_str().unwrap().to_string();
    assert_eq!(report["status"], "pending");

    let uploaded = app.upload_csv(&token, &report_id, SAMPLE_CSV).await;
    assert_eq!(uploaded.status_code(), 200, "{}", uploaded.text());
    assert_eq!(uploaded.json::<Value>()["status"], "uploaded");

    let generated = app
        .client()
        .post(&api_path(&format!("/reports/{}/generate", report_id)))
        .add_header("Authorization", bearer(&token))
        .json(&json!({ "formats": ["html"] }))
        .await;
    assert_eq!(generated.status_code(), 200, "{}", generated.text());
    let generated = generated.json::<Value>();
    assert_eq!(generated["status"], "completed");
    assert_eq!(generated["available_formats"], json!(["csv", "html"]));

    let download = app
        .client()
        .get(&api_path(&format!("/reports/{}/download/html", report_id)))
        .add_header("Authorization", bearer(&token))
        .await;
    assert_eq!(download.status_code(), 200);
    assert!(download
        .header("content-type")
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    assert!(download.text().contains("Northwind"));

    let not_rendered = app
        .client()
        .get(&api_path(&format!("/reports/{}/download/pdf", report_id)))
        .add_header("Authorization", bearer(&token))
        .await;
    assert_eq!(not_rendered.status_code(), 404);

    let recommendations = app
        .client()
        .get(&api_path(&format!("/reports/{}/recommendations", report_id)))
        .add_header("Authorization", bearer(&token))
        .await;
    assert_eq!(recommendations.status_code(), 200);
    assert_eq!(recommendations.json::<Value>()["count"], 2);

    let stats = app
        .client()
        .get(&api_path(&format!("/clients/{}/statistics", client_id)))
        .add_header("Authorization", bearer(&token))
        .await;
    assert_eq!(stats.status_code(), 200);

    // a fresh export replaces the source of a completed report
    let again = app.upload_csv(&token, &report_id, SAMPLE_CSV).await;
    assert_eq!(again.status_code(), 200);
    assert_eq!(again.json::<Value>()["status"], "uploaded");
}

#[tokio::test]
async fn async_generation_completes_through_the_queue() {
    let app = setup_test_app().await;
    let token = app.admin_token().await;
    let client = app.create_client(&token, "Adventure Works").await;
    let report = app
        .create_report(&token, client["id"].as_str().unwrap())
        .await;
    let report_id = report["id"].as_str().unwrap().to_string();

    let uploaded = app.upload_csv(&token, &report_id, SAMPLE_CSV).await;
    assert_eq!(uploaded.status_code(), 200);

    let accepted = app
        .client()
        .post(&api_path(&format!("/reports/{}/generate", report_id)))
        .add_header("Authorization", bearer(&token))
        .json(&json!({ "async": true, "formats": ["html"] }))
        .await;
    assert_eq!(accepted.status_code(), 202);
    let accepted = accepted.json::<Value>();
    let task_id = accepted["task_id"].as_str().unwrap().to_string();
    assert_eq!(
        accepted["status_url"],
        api_path(&format!("/tasks/{}", task_id)).as_str()
    );

    let mut status = Value::Null;
    for _ in 0..100 {
        status = app
            .client()
            .get(&api_path(&format!("/reports/{}/status", report_id)))
            .add_header("Authorization", bearer(&token))
            .await
            .json::<Value>();
        if status["status"] == "completed" || status["status"] == "failed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    assert_eq!(status["status"], "completed", "{}", status);

    let task = app
        .client()
        .get(&api_path(&format!("/tasks/{}", task_id)))
        .add_header("Authorization", bearer(&token))
        .await;
    assert_eq!(task.status_code(), 200);
}

#[tokio::test]
async fn share_links_serve_rendered_output_without_auth() {
    let app = setup_test_app().await;
    let token = app.admin_token().await;
    let client = app.create_client(&token, "Tailspin").await;
    let report = app
        .create_report(&token, client["id"].as_str().unwrap())
        .await;
    let report_id = report["id"].as_str().unwrap().to_string();

    // only completed reports can be shared
    let early = app
        .client()
        .post(&api_path(&format!("/reports/{}/shares", report_id)))
        .add_header("Authorization", bearer(&token))
        .await;
    assert_eq!(early.status_code(), 409);

    app.upload_csv(&token, &report_id, SAMPLE_CSV).await;
    let generated = app
        .client()
        .post(&api_path(&format!("/reports/{}/generate", report_id)))
        .add_header("Authorization", bearer(&token))
        .json(&json!({ "formats": ["html"] }))
        .await;
    assert_eq!(generated.status_code(), 200, "{}", generated.text());

    let share = app
        .client()
        .post(&api_path(&format!("/reports/{}/shares", report_id)))
        .add_header("Authorization", bearer(&token))
        .json(&json!({ "expires_in_days": 3 }))
        .await;
    assert_eq!(share.status_code(), 201, "{}", share.text());
    let share = share.json::<Value>();
    let share_token = share["token"].as_str().unwrap().to_string();
    assert_eq!(share_token.len(), 64);

    let view = app
        .client()
        .get(&api_path(&format!("/shared/{}", share_token)))
        .await;
    assert_eq!(view.status_code(), 200);

    let html = app
        .client()
        .get(&api_path(&format!("/shared/{}/download/html", share_token)))
        .await;
    assert_eq!(html.status_code(), 200);

    let csv = app
        .client()
        .get(&api_path(&format!("/shared/{}/download/csv", share_token)))
        .await;
    assert_eq!(csv.status_code(), 400);

    let revoked = app
        .client()
        .delete(&api_path(&format!(
            "/reports/{}/shares/{}",
            report_id,
            share["id"].as_str().unwrap()
        )))
        .add_header("Authorization", bearer(&token))
        .await;
    assert_eq!(revoked.status_code(), 204);

    let gone = app
        .client()
        .get(&api_path(&format!("/shared/{}", share_token)))
        .await;
    assert_eq!(gone.status_code(), 404);

    let malformed = app.client().get(&api_path("/shared/not-a-token")).await;
    assert_eq!(malformed.status_code(), 404);
}

#[tokio::test]
async fn deleting_a_client_removes_its_reports() {
    let app = setup_test_app().await;
    let token = app.admin_token().await;
    let client = app.create_client(&token, "Litware").await;
    let client_id = client["id"].as_str().unwrap().to_string();
    let report = app.create_report(&token, &client_id).await;
    let report_id = report["id"].as_str().unwrap().to_string();
    app.upload_csv(&token, &report_id, SAMPLE_CSV).await;

    let deleted = app
        .client()
        .delete(&api_path(&format!("/clients/{}", client_id)))
        .add_header("Authorization", bearer(&token))
        .await;
    assert_eq!(deleted.status_code(), 204);

    let report = app
        .client()
        .get(&api_path(&format!("/reports/{}", report_id)))
        .add_header("Authorization", bearer(&token))
        .await;
    assert_eq!(report.status_code(), 404);
}

const BAD_ROW_CSV: &str = "Category,Business Impact,Recommendation,Subscription ID,Subscription Name,Resource Group,Resource Name,Type,Updated Date,Potential Annual Cost Savings,Currency\n\
Networking,High,Use a private endpoint,3fa85f64-5717-4562-b3fc-2c963f66afa6,Production,rg-net,vnet-01,Microsoft.Network/virtualNetworks,2026-09-30,0,USD\n";

#[tokio::test]
async fn cancelling_a_report_stops_queued_generation() {
    let app = setup_test_app().await;
    let token = app.admin_token().await;
    let client = app.create_client(&token, "Proseware").await;
    let report = app
        .create_report(&token, client["id"].as_str().unwrap())
        .await;
    let report_id = report["id"].as_str().unwrap().to_string();
    let uploaded = app.upload_csv(&token, &report_id, SAMPLE_CSV).await;
    assert_eq!(uploaded.status_code(), 200);

    // queued for later so the worker cannot pick it up first
    let task_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO tasks (task_type, status, payload, scheduled_at, report_id)
        VALUES ('generate_report', 'scheduled',
                jsonb_build_object('report_id', $1::text, 'formats', jsonb_build_array('html')),
                NOW() + INTERVAL '1 hour', $1)
        RETURNING id
        "#,
    )
    .bind(Uuid::parse_str(&report_id).unwrap())
    .fetch_one(&app.pool)
    .await
    .unwrap();

    let cancelled = app
        .client()
        .post(&api_path(&format!("/reports/{}/cancel", report_id)))
        .add_header("Authorization", bearer(&token))
        .await;
    assert_eq!(cancelled.status_code(), 200, "{}", cancelled.text());
    assert_eq!(cancelled.json::<Value>()["status"], "cancelled");

    let task = app
        .client()
        .get(&api_path(&format!("/tasks/{}", task_id)))
        .add_header("Authorization", bearer(&token))
        .await
        .json::<Value>();
    assert_eq!(task["status"], "cancelled", "{}", task);

    let again = app
        .client()
        .post(&api_path(&format!("/reports/{}/cancel", report_id)))
        .add_header("Authorization", bearer(&token))
        .await;
    assert_eq!(again.status_code(), 409);

    let generate = app
        .client()
        .post(&api_path(&format!("/reports/{}/generate", report_id)))
        .add_header("Authorization", bearer(&token))
        .json(&json!({ "formats": ["html"] }))
        .await;
    assert_eq!(generate.status_code(), 409);

    let upload = app.upload_csv(&token, &report_id, SAMPLE_CSV).await;
    assert_eq!(upload.status_code(), 409, "{}", upload.text());
    assert_eq!(upload.json::<Value>()["status"], "error");
}

#[tokio::test]
async fn completed_report_cannot_be_cancelled() {
    let app = setup_test_app().await;
    let token = app.admin_token().await;
    let client = app.create_client(&token, "Coho Winery").await;
    let report = app
        .create_report(&token, client["id"].as_str().unwrap())
        .await;
    let report_id = report["id"].as_str().unwrap().to_string();
    app.upload_csv(&token, &report_id, SAMPLE_CSV).await;

    let generated = app
        .client()
        .post(&api_path(&format!("/reports/{}/generate", report_id)))
        .add_header("Authorization", bearer(&token))
        .json(&json!({ "formats": ["html"] }))
        .await;
    assert_eq!(generated.status_code(), 200, "{}", generated.text());

    let cancelled = app
        .client()
        .post(&api_path(&format!("/reports/{}/cancel", report_id)))
        .add_header("Authorization", bearer(&token))
        .await;
    assert_eq!(cancelled.status_code(), 409);

    let status = app
        .client()
        .get(&api_path(&format!("/reports/{}/status", report_id)))
        .add_header("Authorization", bearer(&token))
        .await
        .json::<Value>();
    assert_eq!(status["status"], "completed");
}

#[tokio::test]
async fn failed_generation_records_row_errors_until_retries_run_out() {
    let app = setup_test_app().await;
    let token = app.admin_token().await;
    let client = app.create_client(&token, "Margie's Travel").await;
    let report = app
        .create_report(&token, client["id"].as_str().unwrap())
        .await;
    let report_id = report["id"].as_str().unwrap().to_string();

    // the header is fine, so the upload is accepted and the rows fail at generation
    let uploaded = app.upload_csv(&token, &report_id, BAD_ROW_CSV).await;
    assert_eq!(uploaded.status_code(), 200, "{}", uploaded.text());

    for attempt in 1..=5 {
        let generated = app
            .client()
            .post(&api_path(&format!("/reports/{}/generate", report_id)))
            .add_header("Authorization", bearer(&token))
            .json(&json!({ "formats": ["html"] }))
            .await;
        assert_eq!(generated.status_code(), 400, "{}", generated.text());
        let body = generated.json::<Value>();
        assert!(body["errors"]["file"][0]
            .as_str()
            .unwrap()
            .contains("unknown category 'Networking'"));

        let status = app
            .client()
            .get(&api_path(&format!("/reports/{}/status", report_id)))
            .add_header("Authorization", bearer(&token))
            .await
            .json::<Value>();
        assert_eq!(status["status"], "failed");
        assert_eq!(status["retry_count"], attempt);
        assert!(status["error_message"]
            .as_str()
            .unwrap()
            .contains("unknown category 'Networking'"));
    }

    let exhausted = app
        .client()
        .post(&api_path(&format!("/reports/{}/generate", report_id)))
        .add_header("Authorization", bearer(&token))
        .json(&json!({ "formats": ["html"] }))
        .await;
    assert_eq!(exhausted.status_code(), 409);
    assert!(exhausted.json::<Value>()["message"]
        .as_str()
        .unwrap()
        .contains("failed 5 times"));

    // a fresh export resets the run
    let reuploaded = app.upload_csv(&token, &report_id, SAMPLE_CSV).await;
    assert_eq!(reuploaded.status_code(), 200, "{}", reuploaded.text());
    let generated = app
        .client()
        .post(&api_path(&format!("/reports/{}/generate", report_id)))
        .add_header("Authorization", bearer(&token))
        .json(&json!({ "formats": ["html"] }))
        .await;
    assert_eq!(generated.status_code(), 200, "{}", generated.text());
}

#[tokio::test]
async fn template_in_use_cannot_be_deleted() {
    let app = setup_test_app().await;
    let token = app.admin_token().await;

    let template = app
        .client()
        .post(&api_path("/templates"))
        .add_header("Authorization", bearer(&token))
        .json(&json!({
            "name": "Quarterly review",
            "report_type": "detailed",
            "html_template": "<h1>{{title}}</h1>{{recommendations}}",
        }))
        .await;
    assert_eq!(template.status_code(), 201, "{}", template.text());
    let template_id = template.json::<Value>()["id"].as_str().unwrap().to_string();

    let client = app.create_client(&token, "Blue Yonder").await;
    let report = app
        .client()
        .post(&api_path("/reports"))
        .add_header("Authorization", bearer(&token))
        .json(&json!({
            "client_id": client["id"],
            "report_type": "detailed",
            "template_id": template_id,
        }))
        .await;
    assert_eq!(report.status_code(), 201, "{}", report.text());
    let report_id = report.json::<Value>()["id"].as_str().unwrap().to_string();

    let refused = app
        .client()
        .delete(&api_path(&format!("/templates/{}", template_id)))
        .add_header("Authorization", bearer(&token))
        .await;
    assert_eq!(refused.status_code(), 409);
    assert!(refused.json::<Value>()["message"]
        .as_str()
        .unwrap()
        .contains("used by 1 report"));

    let removed = app
        .client()
        .delete(&api_path(&format!("/reports/{}", report_id)))
        .add_header("Authorization", bearer(&token))
        .await;
    assert_eq!(removed.status_code(), 204);

    let deleted = app
        .client()
        .delete(&api_path(&format!("/templates/{}", template_id)))
        .add_header("Authorization", bearer(&token))
        .await;
    assert_eq!(deleted.status_code(), 204);
}
