use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;
use url::Url;

use crate::config::ApiKey;
use crate::error::{ImageError, RemoteErrorKind, Result};
use crate::media;
use crate::options::{
    AllowedModelSet, ImageModel, ImageSize, ImageStyle, ModerationLevel, OutputFormat, Quality,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: ImageModel,
    pub size: ImageSize,
    pub style: Option<ImageStyle>,
    pub output_format: OutputFormat,
    pub output_compression: u8,
    pub moderation: ModerationLevel,
    pub quality: Quality,
    pub n: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditRequest {
    pub images: Vec<PathBuf>,
    pub prompt: String,
    pub mask: Option<PathBuf>,
    pub model: ImageModel,
    pub size: ImageSize,
    pub output_format: OutputFormat,
    pub output_compression: u8,
    pub quality: Quality,
    pub n: u8,
}

/// One image returned by the API, still base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub b64_json: String,
}

/// The remote image service. Each call is exactly one outbound request.
#[async_trait]
pub trait ImageApi: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<GeneratedImage>>;

    async fn edit(&self, request: &EditRequest) -> Result<Vec<GeneratedImage>>;
}

#[derive(Debug, Serialize)]
struct GenerationBody<'a> {
    model: &'static str,
    prompt: &'a str,
    n: u8,
    size: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quality: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_format: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_compression: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    moderation: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageItem>,
}

#[derive(Debug, Deserialize)]
struct ImageItem {
    b64_json: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    code: Option<String>,
}

/// HTTP adapter for the OpenAI-compatible images endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiImageClient {
    http: Client,
    api_key: ApiKey,
    base_url: Url,
    models: AllowedModelSet,
}

impl OpenAiImageClient {
    pub fn new(
        api_key: ApiKey,
        base_url: Url,
        models: AllowedModelSet,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ImageError::Configuration(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            http,
            api_key,
            base_url,
            models,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.as_str().trim_end_matches('/'))
    }

    fn ensure_allowed(&self, model: ImageModel) -> Result<()> {
        if self.models.contains(model) {
            Ok(())
        } else {
            Err(ImageError::validation(
                "model",
                format!("{model} is not enabled; allowed: {}", self.models.names().join(", ")),
            ))
        }
    }

    async fn read_images(&self, response: Response) -> Result<Vec<GeneratedImage>> {
        let response = assert_ok_response(response).await?;
        let payload: ImagesResponse = response
            .json()
            .await
            .map_err(|err| ImageError::remote(RemoteErrorKind::Other, None, format!("malformed response: {err}")))?;
        let mut images = Vec::with_capacity(payload.data.len());
        for (index, item) in payload.data.into_iter().enumerate() {
            let b64_json = match (item.b64_json, item.url) {
                (Some(data), _) if !data.is_empty() => data,
                (_, Some(url)) => self.download_as_base64(&url).await?,
                _ => {
                    return Err(ImageError::remote(
                        RemoteErrorKind::Other,
                        None,
                        format!("image data not found in response at index {index}"),
                    ));
                }
            };
            images.push(GeneratedImage { b64_json });
        }
        Ok(images)
    }

    async fn download_as_base64(&self, url: &str) -> Result<String> {
        debug!(url, "downloading image returned by URL");
        let response = self.http.get(url).send().await?;
        let response = assert_ok_response(response).await?;
        let bytes = response.bytes().await?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

#[async_trait]
impl ImageApi for OpenAiImageClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<GeneratedImage>> {
        self.ensure_allowed(request.model)?;
        if request.n > request.model.max_images() {
            return Err(ImageError::UnsupportedOperation(format!(
                "{} can generate at most {} image(s) per request",
                request.model,
                request.model.max_images()
            )));
        }

        let gpt_image = request.model.is_gpt_image();
        let body = GenerationBody {
            model: request.model.as_str(),
            prompt: &request.prompt,
            n: request.n,
            size: request.size.as_str(),
            style: match request.model {
                ImageModel::DallE3 => request.style.map(ImageStyle::as_str),
                _ => None,
            },
            quality: request.quality.for_model(request.model),
            response_format: (!gpt_image).then_some("b64_json"),
            output_format: gpt_image.then(|| request.output_format.as_str()),
            output_compression: (gpt_image && request.output_format != OutputFormat::Png)
                .then_some(request.output_compression),
            moderation: gpt_image.then(|| request.moderation.as_str()),
        };

        let endpoint = self.endpoint("images/generations");
        debug!(%endpoint, model = %request.model, n = request.n, "sending image generation request");
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await?;
        debug!(status = %response.status(), "image generation responded");
        self.read_images(response).await
    }

    async fn edit(&self, request: &EditRequest) -> Result<Vec<GeneratedImage>> {
        if !request.model.supports_edit() {
            return Err(ImageError::UnsupportedOperation(format!(
                "{} does not support image editing",
                request.model
            )));
        }
        self.ensure_allowed(request.model)?;
        if request.images.is_empty() {
            return Err(ImageError::validation("images", "at least one source image is required"));
        }
        if request.model == ImageModel::DallE2 && request.images.len() > 1 {
            return Err(ImageError::UnsupportedOperation(
                "dall-e-2 edits accept a single source image".to_string(),
            ));
        }

        let gpt_image = request.model.is_gpt_image();
        let mut form = Form::new()
            .text("model", request.model.as_str())
            .text("prompt", request.prompt.clone())
            .text("n", request.n.to_string())
            .text("size", request.size.as_str());
        if let Some(quality) = request.quality.for_model(request.model) {
            form = form.text("quality", quality);
        }
        if gpt_image {
            form = form.text("output_format", request.output_format.as_str());
            if request.output_format != OutputFormat::Png {
                form = form.text("output_compression", request.output_compression.to_string());
            }
        } else {
            form = form.text("response_format", "b64_json");
        }

        let image_field = if gpt_image { "image[]" } else { "image" };
        for path in &request.images {
            form = form.part(image_field, file_part(path, "Input image").await?);
        }
        if let Some(mask) = request.mask.as_deref() {
            form = form.part("mask", file_part(mask, "Mask image").await?);
        }

        let endpoint = self.endpoint("images/edits");
        debug!(%endpoint, model = %request.model, images = request.images.len(), "sending image edit request");
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(self.api_key.expose())
            .multipart(form)
            .send()
            .await?;
        debug!(status = %response.status(), "image edit responded");
        self.read_images(response).await
    }
}

async fn file_part(path: &Path, kind: &'static str) -> Result<Part> {
    let bytes = fs::read(path)
        .await
        .map_err(|err| ImageError::file_read(kind, path, &err))?;
    let mime = media::resolve_mime_type(path, &bytes);
    let file_name = path
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or("image.png")
        .to_string();
    Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(mime)
        .map_err(|err| ImageError::validation("images", format!("invalid mime '{mime}': {err}")))
}

async fn assert_ok_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<ErrorEnvelope>(&text)
        .ok()
        .and_then(|envelope| envelope.error);
    let (message, code) = match parsed {
        Some(body) => (body.message.unwrap_or_else(|| text.clone()), body.code),
        None => (text, None),
    };
    let message = if message.trim().is_empty() {
        status.to_string()
    } else {
        message
    };
    Err(ImageError::remote(
        RemoteErrorKind::from_status(status.as_u16(), code.as_deref()),
        Some(status.as_u16()),
        message,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(model: ImageModel) -> GenerationRequest {
        GenerationRequest {
            prompt: "a red cube".to_string(),
            model,
            size: ImageSize::S1024,
            style: Some(ImageStyle::Vivid),
            output_format: OutputFormat::Webp,
            output_compression: 80,
            moderation: ModerationLevel::Low,
            quality: Quality::Standard,
            n: 1,
        }
    }

    fn client() -> OpenAiImageClient {
        let base_url = Url::parse("http://127.0.0.1:9").expect("valid url");
        OpenAiImageClient::new(
            ApiKey::new("sk-test"),
            base_url,
            AllowedModelSet::from_allow_list(&["gpt-image-1", "dall-e-3"]),
            Duration::from_secs(1),
        )
        .expect("client builds")
    }

    #[tokio::test]
    async fn edit_rejects_models_without_edit_support() {
        let req = EditRequest {
            images: vec![PathBuf::from("a.png")],
            prompt: "x".to_string(),
            mask: None,
            model: ImageModel::DallE3,
            size: ImageSize::S1024,
            output_format: OutputFormat::Png,
            output_compression: 100,
            quality: Quality::Auto,
            n: 1,
        };
        assert!(matches!(client().edit(&req).await, Err(ImageError::UnsupportedOperation(_))));
    }

    #[tokio::test]
    async fn generate_rejects_models_outside_allow_list() {
        let result = client().generate(&request(ImageModel::DallE2)).await;
        assert!(matches!(result, Err(ImageError::Validation(_))));
    }

    #[tokio::test]
    async fn dall_e_3_is_limited_to_one_image() {
        let mut req = request(ImageModel::DallE3);
        req.n = 2;
        assert!(matches!(client().generate(&req).await, Err(ImageError::UnsupportedOperation(_))));
    }

    #[tokio::test]
    async fn missing_mask_upload_is_reported_as_mask() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = file_part(&temp.path().join("gone.png"), "Mask image").await;
        assert!(matches!(result, Err(ImageError::FileNotFound { kind: "Mask image", .. })));
    }

    #[tokio::test]
    async fn unreadable_upload_is_a_file_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = file_part(temp.path(), "Input image").await;
        match result {
            Err(ImageError::FileRead { kind, path, .. }) => {
                assert_eq!(kind, "Input image");
                assert_eq!(path, temp.path());
            }
            Err(other) => panic!("expected a file read error, got {other:?}"),
            Ok(_) => panic!("a directory cannot be uploaded"),
        }
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let base_url = Url::parse("https://api.example.com/v1/").expect("valid url");
        let client = OpenAiImageClient::new(
            ApiKey::new("k"),
            base_url,
            AllowedModelSet::discovery(),
            Duration::from_secs(1),
        )
        .expect("client builds");
        assert_eq!(client.endpoint("images/edits"), "https://api.example.com/v1/images/edits");
    }
}
