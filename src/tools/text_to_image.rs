use rmcp::{model::CallToolResult, schemars::JsonSchema};
use serde::Deserialize;
use tracing::info;

use crate::{
    artifacts::SavedArtifact,
    error::Result,
    openai::GenerationRequest,
    options::{ImageModel, ImageSize, ImageStyle, ModerationLevel, OutputFormat, Quality},
    tools::{
        ImageTools, check_range, check_size, ensure_images, failure_envelope, finish_validation,
        resolve_model, success_envelope,
    },
};

pub const ERROR_PREFIX: &str = "Error generating image:";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TextToImageRequest {
    #[schemars(description = "The prompt to generate an image from")]
    pub text: String,
    #[serde(rename = "outputPath", default)]
    #[schemars(
        description = "Absolute path or directory where the output file should be saved. Defaults to the current working directory."
    )]
    pub output_path: Option<String>,
    #[serde(default)]
    #[schemars(description = "The model to use. Defaults to the server's default model (gpt-image-1 unless configured).")]
    pub model: Option<ImageModel>,
    #[serde(default = "default_size")]
    #[schemars(description = "Size of the generated image")]
    pub size: ImageSize,
    #[serde(default = "default_style")]
    #[schemars(description = "Style of the image (for dall-e-3)")]
    pub style: ImageStyle,
    #[serde(default = "default_output_format")]
    #[schemars(description = "The format of the generated image")]
    pub output_format: OutputFormat,
    #[serde(default = "default_output_compression")]
    #[schemars(description = "The compression of the generated image", range(min = 0, max = 100))]
    pub output_compression: i64,
    #[serde(default = "default_moderation")]
    #[schemars(description = "The moderation level of the generated image")]
    pub moderation: ModerationLevel,
    #[serde(default = "default_quality")]
    #[schemars(description = "The quality of the generated image")]
    pub quality: Quality,
    #[serde(default = "default_count")]
    #[schemars(description = "The number of images to generate", range(min = 1, max = 10))]
    pub n: i64,
    #[serde(default)]
    #[schemars(description = "Replace an existing file at outputPath instead of failing")]
    pub overwrite: bool,
}

pub(crate) fn default_size() -> ImageSize {
    ImageSize::S1024
}

fn default_style() -> ImageStyle {
    ImageStyle::Vivid
}

fn default_output_format() -> OutputFormat {
    OutputFormat::Webp
}

pub(crate) fn default_output_compression() -> i64 {
    100
}

fn default_moderation() -> ModerationLevel {
    ModerationLevel::Low
}

pub(crate) fn default_quality() -> Quality {
    Quality::Standard
}

pub(crate) fn default_count() -> i64 {
    1
}

impl TextToImageRequest {
    /// A request with every optional field at its default.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            output_path: None,
            model: None,
            size: default_size(),
            style: default_style(),
            output_format: default_output_format(),
            output_compression: default_output_compression(),
            moderation: default_moderation(),
            quality: default_quality(),
            n: default_count(),
            overwrite: false,
        }
    }
}

impl ImageTools {
    pub async fn text_to_image(&self, request: TextToImageRequest) -> CallToolResult {
        match self.run_text_to_image(request).await {
            Ok(saved) => success_envelope(&saved),
            Err(err) => failure_envelope(ERROR_PREFIX, &err),
        }
    }

    async fn run_text_to_image(&self, request: TextToImageRequest) -> Result<Vec<SavedArtifact>> {
        let mut violations = Vec::new();
        let output_compression =
            check_range(&mut violations, "output_compression", request.output_compression, 0, 100);
        let n = check_range(&mut violations, "n", request.n, 1, 10);
        let model = resolve_model(&mut violations, &self.models, request.model);
        check_size(&mut violations, request.size, model);
        finish_validation(violations)?;

        let prompt = self.sanitizer.sanitize(&request.text)?;
        let client = self.backend.client()?;

        let generation = GenerationRequest {
            prompt,
            model,
            size: request.size,
            style: Some(request.style),
            output_format: request.output_format,
            output_compression,
            moderation: request.moderation,
            quality: request.quality,
            n,
        };
        let images = ensure_images(client.generate(&generation).await?)?;
        let format = model.effective_format(request.output_format);
        let saved = self
            .writer
            .save_batch(&images, format, request.output_path.as_deref(), request.overwrite)
            .await?;
        info!(model = %model, count = saved.len(), "generated images");
        Ok(saved)
    }
}
