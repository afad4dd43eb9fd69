pub mod image_to_image;
pub mod registry;
pub mod text_to_image;

use std::sync::Arc;

use rmcp::model::{CallToolResult, Content};
use tracing::error;

use crate::artifacts::{ArtifactWriter, SavedArtifact};
use crate::config::ServerConfig;
use crate::error::{FieldViolation, ImageError, Result};
use crate::openai::{GeneratedImage, ImageApi, OpenAiImageClient};
use crate::options::{AllowedModelSet, ImageModel, ImageSize};
use crate::sanitizer::PromptSanitizer;

pub use image_to_image::ImageToImageRequest;
pub use registry::{IMAGE_TO_IMAGE, TEXT_TO_IMAGE, ToolName, discovery_document, dispatch};
pub use text_to_image::TextToImageRequest;

pub const MISSING_API_KEY: &str =
    "OpenAI API key is required. Please set the OPENAI_API_KEY environment variable.";

/// Whether tool execution is possible. `Unconfigured` only serves discovery
/// and has no client to call.
#[derive(Clone)]
pub enum ImageBackend {
    Unconfigured,
    Configured(Arc<dyn ImageApi>),
}

impl ImageBackend {
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        match config.api_key.clone() {
            Some(api_key) => {
                let client = OpenAiImageClient::new(
                    api_key,
                    config.base_url.clone(),
                    config.allowed_models.clone(),
                    config.request_timeout,
                )?;
                Ok(Self::Configured(Arc::new(client)))
            }
            None => Ok(Self::Unconfigured),
        }
    }

    fn client(&self) -> Result<&dyn ImageApi> {
        match self {
            Self::Configured(client) => Ok(client.as_ref()),
            Self::Unconfigured => Err(ImageError::Configuration(MISSING_API_KEY.to_string())),
        }
    }
}

/// Runs the two image tools: validate, sanitize, call the API, save artifacts.
#[derive(Clone)]
pub struct ImageTools {
    backend: ImageBackend,
    models: AllowedModelSet,
    sanitizer: PromptSanitizer,
    writer: ArtifactWriter,
}

impl ImageTools {
    pub fn new(
        backend: ImageBackend,
        models: AllowedModelSet,
        sanitizer: PromptSanitizer,
        writer: ArtifactWriter,
    ) -> Self {
        Self {
            backend,
            models,
            sanitizer,
            writer,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let writer = match config.output_dir.as_deref() {
            Some(dir) => ArtifactWriter::new(dir),
            None => ArtifactWriter::in_current_dir(),
        }
        .map_err(|err| ImageError::Configuration(format!("cannot resolve output directory: {err}")))?;
        Ok(Self::new(
            ImageBackend::from_config(config)?,
            config.allowed_models.clone(),
            config.sanitizer.clone(),
            writer,
        ))
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.backend, ImageBackend::Configured(_))
    }

    pub fn models(&self) -> &AllowedModelSet {
        &self.models
    }
}

fn success_envelope(saved: &[SavedArtifact]) -> CallToolResult {
    let text = saved
        .iter()
        .map(|artifact| artifact.path.display().to_string())
        .collect::<Vec<_>>()
        .join("\n");
    CallToolResult::success(vec![Content::text(text)])
}

fn failure_envelope(prefix: &str, err: &ImageError) -> CallToolResult {
    error!(error = %err, "{prefix}");
    CallToolResult::error(vec![Content::text(format!("{prefix} {err}"))])
}

fn check_range(
    violations: &mut Vec<FieldViolation>,
    field: &str,
    value: i64,
    min: u8,
    max: u8,
) -> u8 {
    match u8::try_from(value) {
        Ok(valid) if (min..=max).contains(&valid) => valid,
        _ => {
            violations.push(FieldViolation::new(
                field,
                format!("must be between {min} and {max} (got {value})"),
            ));
            min
        }
    }
}

fn resolve_model(
    violations: &mut Vec<FieldViolation>,
    models: &AllowedModelSet,
    requested: Option<ImageModel>,
) -> ImageModel {
    let model = requested.unwrap_or_else(|| models.default_model());
    if !models.contains(model) {
        violations.push(FieldViolation::new(
            "model",
            format!("{model} is not enabled; allowed: {}", models.names().join(", ")),
        ));
    }
    model
}

fn check_size(violations: &mut Vec<FieldViolation>, size: ImageSize, model: ImageModel) {
    if !size.supported_by(model) {
        violations.push(FieldViolation::new(
            "size",
            format!("{} is not supported by {model}", size.as_str()),
        ));
    }
}

fn finish_validation(violations: Vec<FieldViolation>) -> Result<()> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ImageError::Validation(violations))
    }
}

fn ensure_images(images: Vec<GeneratedImage>) -> Result<Vec<GeneratedImage>> {
    if images.is_empty() {
        Err(ImageError::EmptyResult)
    } else {
        Ok(images)
    }
}
