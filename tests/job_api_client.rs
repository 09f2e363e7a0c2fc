use std::time::Duration;

use serde_json::json;
use thumbnail_studio::{
    api::{JobApi, JobApiClient},
    errors::AppError,
    models::{Gender, GenerationRequest, JobStatus, TrainingUpload},
};
use wiremock::{
    matchers::{body_json, body_string_contains, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

const ORIGIN: &str = "http://localhost:5173";

fn client(server: &MockServer) -> JobApiClient {
    JobApiClient::new(&server.uri(), ORIGIN, Duration::from_secs(5)).expect("client builds")
}

fn zip_upload() -> TrainingUpload {
    TrainingUpload {
        file_name: "faces.zip".to_string(),
        content_type: Some("application/zip".to_string()),
        data: b"PK\x03\x04face-archive".to_vec(),
        trigger_phrase: " mystyle ".to_string(),
    }
}

#[tokio::test]
async fn test_submit_training_sends_multipart_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/train"))
        .and(header("origin", ORIGIN))
        .and(body_string_contains("name=\"trigger_phrase\""))
        .and(body_string_contains("mystyle"))
        .and(body_string_contains("creator@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"request_id": "train-123"})))
        .expect(1)
        .mount(&server)
        .await;

    let request_id = client(&server)
        .submit_training(&zip_upload(), "creator@example.com")
        .await
        .unwrap();
    assert_eq!(request_id, "train-123");
}

#[tokio::test]
async fn test_invalid_archive_is_rejected_before_sending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/train"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut upload = zip_upload();
    upload.data = b"\x89PNG".to_vec();
    upload.content_type = Some("image/png".to_string());

    let err = client(&server)
        .submit_training(&upload, "creator@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_submit_generation_accepts_bare_string_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate_image"))
        .and(body_json(json!({
            "request_id": "train-123",
            "prompt": "shocked face, neon sign",
            "gender": "Female",
            "email": "creator@example.com"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("\"gen-77\""))
        .expect(1)
        .mount(&server)
        .await;

    let request = GenerationRequest {
        source_request_id: "train-123".to_string(),
        prompt: "shocked face, neon sign".to_string(),
        gender: Gender::Female,
    };
    let request_id = client(&server)
        .submit_generation(&request, "creator@example.com")
        .await
        .unwrap();
    assert_eq!(request_id, "gen-77");
}

#[tokio::test]
async fn test_status_variants_are_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status/structured"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "PROCESSING",
            "completion_percentage": "64%",
            "message": "training"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status/plain"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Request queued"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2, 3])))
        .mount(&server)
        .await;

    let client = client(&server);

    let structured = client.get_status("structured").await.unwrap();
    assert_eq!(structured.status, Some(JobStatus::Processing));
    assert_eq!(structured.completion_percentage, Some(64));

    let plain = client.get_status("plain").await.unwrap();
    assert_eq!(plain.status, None);
    assert_eq!(plain.message.as_deref(), Some("Request queued"));
    assert_eq!(plain.effective_status(), JobStatus::Pending);

    assert!(matches!(
        client.get_status("list").await,
        Err(AppError::Remote { .. })
    ));
}

#[tokio::test]
async fn test_error_messages_come_from_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status/detailed"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"details": "Unknown request"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status/bare"))
        .respond_with(ResponseTemplate::new(503).set_body_string("<html>down</html>"))
        .mount(&server)
        .await;

    let client = client(&server);

    match client.get_status("detailed").await {
        Err(AppError::Remote { status, message }) => {
            assert_eq!(status, Some(404));
            assert_eq!(message, "Unknown request");
        }
        other => panic!("unexpected result: {:?}", other.map(|r| r.status)),
    }

    match client.get_status("bare").await {
        Err(AppError::Remote { message, .. }) => assert_eq!(message, "HTTP error! status: 503"),
        other => panic!("unexpected result: {:?}", other.map(|r| r.status)),
    }
}

#[tokio::test]
async fn test_ingestion_tolerates_any_success_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/insert_generated_images/gen-77"))
        .respond_with(ResponseTemplate::new(200).set_body_string("inserted 4 images"))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).ingest_completed_results("gen-77").await.unwrap();
}

#[tokio::test]
async fn test_request_id_cannot_reach_other_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/insert_generated_images/victim"))
        .respond_with(ResponseTemplate::new(200).set_body_string("inserted"))
        .expect(0)
        .mount(&server)
        .await;

    let client = client(&server);
    for request_id in ["x/../../insert_generated_images/victim", "victim?x=1", ".."] {
        assert!(matches!(
            client.get_status(request_id).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            client.ingest_completed_results(request_id).await,
            Err(AppError::Validation(_))
        ));
    }
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_base_url_path_is_kept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/status/gen-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "pending"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = JobApiClient::new(&format!("{}/jobs/", server.uri()), ORIGIN, Duration::from_secs(5)).unwrap();
    let report = client.get_status("gen-1").await.unwrap();
    assert_eq!(report.status, Some(JobStatus::Pending));
}
