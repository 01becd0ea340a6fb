//! HTTP API tests against a live server on an ephemeral port.

mod common;

use std::sync::Arc;

use base64::Engine;
use common::*;
use prompt_studio::server::{serve, ErrorBody};
use serde_json::{json, Value};
use tempfile::TempDir;

async fn spawn_server() -> (TempDir, String) {
    let (tmp, studio, _) = open_studio().await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        serve(Arc::new(studio), listener).await.ok();
    });
    wait_for_server(port).await;
    (tmp, format!("http://127.0.0.1:{}", port))
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("Server did not become ready within 5 seconds");
}

async fn upload(client: &reqwest::Client, base: &str, filename: &str, content: &str) -> Value {
    let resp = client
        .post(format!("{}/documents", base))
        .json(&json!({
            "filename": filename,
            "content_base64": base64::engine::general_purpose::STANDARD.encode(content),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    resp.json().await.unwrap()
}

#[tokio::test]
async fn health_reports_version() {
    let (_tmp, base) = spawn_server().await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn document_lifecycle_over_http() {
    let (_tmp, base) = spawn_server().await;
    let client = reqwest::Client::new();

    let doc = upload(&client, &base, "acme.txt", ACME).await;
    let id = doc["id"].as_str().unwrap().to_string();
    assert_eq!(doc["document_type"], "txt");
    upload(&client, &base, "garden.md", GARDEN).await;

    let list: Value = client
        .get(format!("{}/documents", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["total"], 2);
    assert_eq!(list["documents"].as_array().unwrap().len(), 2);

    let stats: Value = client
        .get(format!("{}/documents/stats", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["documents"], 2);
    assert_eq!(stats["dimension"], DIMS);

    let fetched: Value = client
        .get(format!("{}/documents/{}", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["filename"], "acme.txt");

    let deleted: Value = client
        .delete(format!("{}/documents/{}", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted["id"], id.as_str());
    assert_eq!(deleted["chunks_removed"], doc["chunk_count"]);

    let cleared: Value = client
        .delete(format!("{}/documents", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cleared["cleared"], 1);
}

#[tokio::test]
async fn errors_use_json_envelope() {
    let (_tmp, base) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/documents/does-not-exist", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: ErrorBody = resp.json().await.unwrap();
    assert_eq!(body.error.code, "not_found");

    let resp = client
        .post(format!("{}/documents", base))
        .json(&json!({ "filename": "a.txt", "content_base64": "***" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: ErrorBody = resp.json().await.unwrap();
    assert_eq!(body.error.code, "validation_error");

    let resp = client
        .post(format!("{}/documents", base))
        .json(&json!({ "filename": "a.exe", "content_base64": "aGk=" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn malformed_bodies_use_json_envelope() {
    let (_tmp, base) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/prompts/analyze", base))
        .header("content-type", "application/json")
        .body("{\"template\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: ErrorBody = resp.json().await.unwrap();
    assert_eq!(body.error.code, "validation_error");
    assert!(body.error.message.starts_with("invalid request body"));

    let resp = client
        .post(format!("{}/config/llm", base))
        .json(&json!({ "max_tokens": "lots" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: ErrorBody = resp.json().await.unwrap();
    assert_eq!(body.error.code, "validation_error");

    let resp = client
        .post(format!("{}/documents", base))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: ErrorBody = resp.json().await.unwrap();
    assert_eq!(body.error.code, "validation_error");

    // Explicit nulls for optional fields are accepted.
    let resp = client
        .post(format!("{}/prompts/analyze", base))
        .json(&json!({ "template": "Name: {name}", "output_format": null, "examples": null }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let analysis: Value = resp.json().await.unwrap();
    assert_eq!(analysis["structure_type"], "text");
}

#[tokio::test]
async fn analyze_and_export_prompts() {
    let (_tmp, base) = spawn_server().await;
    let client = reqwest::Client::new();

    let analysis: Value = client
        .post(format!("{}/prompts/analyze", base))
        .json(&json!({
            "template": "| Name | Year |\n|---|---|\n| {company_name} | {founding_year} |",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(analysis["structure_type"], "table");
    assert_eq!(analysis["placeholders"].as_array().unwrap().len(), 2);

    let export: Value = client
        .post(format!("{}/prompts/export", base))
        .json(&json!({
            "prompt": {
                "messages": [
                    { "role": "system", "content": "Be brief." },
                    { "role": "user", "content": "Who founded Acme?" }
                ],
                "model": "gpt-4",
                "temperature": 0.7,
                "max_tokens": 2000
            }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(export["openai_format"]["messages"][1]["role"], "user");
    assert_eq!(export["openai_format"]["model"], "gpt-4");
    assert!(export["readable"].as_str().unwrap().contains("Who founded Acme?"));

    let tested: Value = client
        .post(format!("{}/prompts/test", base))
        .json(&json!({
            "prompt": { "messages": [{ "role": "user", "content": "hello" }] }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tested["output"], "answer built from 5 prompt bytes");
}

#[tokio::test]
async fn optimize_over_http() {
    let (_tmp, base) = spawn_server().await;
    let client = reqwest::Client::new();
    let doc = upload(&client, &base, "acme.txt", ACME).await;

    let resp = client
        .post(format!("{}/prompts/optimize", base))
        .json(&json!({
            "expected_output": { "template": "Founded: {founding_year}" },
            "document_ids": [doc["id"]],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let result: Value = resp.json().await.unwrap();
    assert_eq!(result["status"], "success");
    assert_eq!(result["total_iterations"], 2);
    assert!(result["final_prompt"]["messages"].as_array().unwrap().len() >= 2);
}

#[tokio::test]
async fn llm_config_round_trip() {
    let (_tmp, base) = spawn_server().await;
    let client = reqwest::Client::new();

    let current: Value = client
        .get(format!("{}/config/llm", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(current.get("api_key").is_none());
    assert_eq!(current["model"], "gpt-4");

    let updated: Value = client
        .post(format!("{}/config/llm", base))
        .json(&json!({ "model": "gpt-4o", "max_tokens": 512 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["model"], "gpt-4o");
    assert_eq!(updated["max_tokens"], 512);

    let resp = client
        .post(format!("{}/config/llm", base))
        .json(&json!({ "max_tokens": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let opt: Value = client
        .get(format!("{}/config/optimization", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(opt["max_iterations"], 4);
    assert_eq!(opt["filter_strategy"], "overfetch");

    // The chat provider is disabled in the test config.
    let resp = client
        .post(format!("{}/config/test-connection", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}
