use std::time::Duration;

use base64::Engine;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use image_gen_rmcp::{
    ImageError,
    config::ApiKey,
    error::RemoteErrorKind,
    openai::{EditRequest, GenerationRequest, ImageApi, OpenAiImageClient},
    options::{AllowedModelSet, ImageModel, ImageSize, ImageStyle, ModerationLevel, OutputFormat, Quality},
};

fn client_for(server: &MockServer) -> OpenAiImageClient {
    let base_url = Url::parse(&format!("{}/v1", server.uri())).expect("mock url parses");
    OpenAiImageClient::new(
        ApiKey::new("sk-test"),
        base_url,
        AllowedModelSet::discovery(),
        Duration::from_secs(5),
    )
    .expect("client builds")
}

fn generation(model: ImageModel, n: u8) -> GenerationRequest {
    GenerationRequest {
        prompt: "a red cube".to_string(),
        model,
        size: ImageSize::S1024,
        style: Some(ImageStyle::Natural),
        output_format: OutputFormat::Webp,
        output_compression: 80,
        moderation: ModerationLevel::Low,
        quality: Quality::Standard,
        n,
    }
}

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[tokio::test]
async fn generate_sends_gpt_image_parameters() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-image-1",
            "prompt": "a red cube",
            "n": 2,
            "output_format": "webp",
            "output_compression": 80,
            "moderation": "low",
            "quality": "medium",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "created": 1,
            "data": [{ "b64_json": b64(b"one") }, { "b64_json": b64(b"two") }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let images = client_for(&server).generate(&generation(ImageModel::GptImage1, 2)).await?;

    assert_eq!(images.len(), 2);
    assert_eq!(images[1].b64_json, b64(b"two"));
    Ok(())
}

#[tokio::test]
async fn generate_asks_dall_e_for_base64_and_style() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .and(body_partial_json(json!({
            "model": "dall-e-3",
            "response_format": "b64_json",
            "style": "natural",
            "quality": "standard",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "b64_json": b64(b"png") }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let images = client_for(&server).generate(&generation(ImageModel::DallE3, 1)).await?;

    assert_eq!(images.len(), 1);
    Ok(())
}

#[tokio::test]
async fn rate_limit_surfaces_upstream_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "message": "Rate limit reached for images", "type": "requests", "code": "rate_limit_exceeded" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server).generate(&generation(ImageModel::GptImage1, 1)).await;

    match result {
        Err(ImageError::RemoteApi { kind, status, message }) => {
            assert_eq!(kind, RemoteErrorKind::RateLimited);
            assert_eq!(status, Some(429));
            assert_eq!(message, "Rate limit reached for images");
        }
        other => panic!("expected remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn content_policy_rejection_is_distinguishable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "Your request was rejected by the safety system.", "code": "content_policy_violation" }
        })))
        .mount(&server)
        .await;

    let result = client_for(&server).generate(&generation(ImageModel::GptImage1, 1)).await;

    assert!(matches!(
        result,
        Err(ImageError::RemoteApi { kind: RemoteErrorKind::ContentPolicy, .. })
    ));
}

#[tokio::test]
async fn url_payloads_are_downloaded() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/cube.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png-bytes".to_vec()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "url": format!("{}/files/cube.png", server.uri()) }]
        })))
        .mount(&server)
        .await;

    let images = client_for(&server).generate(&generation(ImageModel::DallE2, 1)).await?;

    assert_eq!(images[0].b64_json, b64(b"png-bytes"));
    Ok(())
}

#[tokio::test]
async fn item_without_data_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [{}] })))
        .mount(&server)
        .await;

    let result = client_for(&server).generate(&generation(ImageModel::GptImage1, 1)).await;

    match result {
        Err(err) => assert!(err.to_string().contains("index 0")),
        Ok(images) => panic!("expected an error, got {} image(s)", images.len()),
    }
}

#[tokio::test]
async fn empty_data_is_returned_as_is() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;

    let images = client_for(&server).generate(&generation(ImageModel::GptImage1, 1)).await?;

    assert!(images.is_empty());
    Ok(())
}

#[tokio::test]
async fn edit_uploads_every_source_image() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let first = temp.path().join("first.png");
    let second = temp.path().join("second.jpg");
    std::fs::write(&first, b"first-image")?;
    std::fs::write(&second, b"second-image")?;

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/edits"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_string_contains("name=\"image[]\""))
        .and(body_string_contains("filename=\"first.png\""))
        .and(body_string_contains("filename=\"second.jpg\""))
        .and(body_string_contains("make it blue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "b64_json": b64(b"edited") }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = EditRequest {
        images: vec![first, second],
        prompt: "make it blue".to_string(),
        mask: None,
        model: ImageModel::GptImage1,
        size: ImageSize::S1024,
        output_format: OutputFormat::Png,
        output_compression: 100,
        quality: Quality::Auto,
        n: 1,
    };
    let images = client_for(&server).edit(&request).await?;

    assert_eq!(images.len(), 1);
    Ok(())
}

#[tokio::test]
async fn authentication_failure_is_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&server)
        .await;

    let result = client_for(&server).generate(&generation(ImageModel::GptImage1, 1)).await;

    assert!(matches!(
        result,
        Err(ImageError::RemoteApi { kind: RemoteErrorKind::Authentication, status: Some(401), .. })
    ));
}
