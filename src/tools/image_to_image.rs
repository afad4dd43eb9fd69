use std::path::{Path, PathBuf};

use rmcp::{model::CallToolResult, schemars::JsonSchema};
use serde::Deserialize;
use tokio::fs;
use tracing::info;

use crate::{
    artifacts::SavedArtifact,
    error::{FieldViolation, ImageError, Result},
    openai::EditRequest,
    options::{ImageModel, ImageSize, OutputFormat, Quality},
    tools::{
        ImageTools, check_range, check_size, ensure_images, failure_envelope, finish_validation,
        resolve_model, success_envelope,
        text_to_image::{default_count, default_output_compression, default_quality, default_size},
    },
};

pub const ERROR_PREFIX: &str = "Error editing image:";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ImageToImageRequest {
    #[schemars(description = "The images to edit. Must be an array of file paths.", length(min = 1))]
    pub images: Vec<String>,
    #[schemars(description = "A text description of the desired image(s)")]
    pub prompt: String,
    #[serde(rename = "outputPath", default)]
    #[schemars(
        description = "Absolute path or directory where the output file should be saved. Defaults to the current working directory."
    )]
    pub output_path: Option<String>,
    #[serde(default)]
    #[schemars(
        description = "Optional mask image whose transparent areas indicate where image should be edited. Must be a file path."
    )]
    pub mask: Option<String>,
    #[serde(default)]
    #[schemars(description = "The model to use. Only models that support editing are accepted.")]
    pub model: Option<ImageModel>,
    #[serde(default = "default_size")]
    #[schemars(description = "Size of the generated image")]
    pub size: ImageSize,
    #[serde(default = "default_output_format")]
    #[schemars(description = "The format of the generated image")]
    pub output_format: OutputFormat,
    #[serde(default = "default_output_compression")]
    #[schemars(description = "The compression of the generated image", range(min = 0, max = 100))]
    pub output_compression: i64,
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

fn default_output_format() -> OutputFormat {
    OutputFormat::Png
}

impl ImageToImageRequest {
    pub fn new(images: Vec<String>, prompt: impl Into<String>) -> Self {
        Self {
            images,
            prompt: prompt.into(),
            output_path: None,
            mask: None,
            model: None,
            size: default_size(),
            output_format: default_output_format(),
            output_compression: default_output_compression(),
            quality: default_quality(),
            n: default_count(),
            overwrite: false,
        }
    }
}

impl ImageTools {
    pub async fn image_to_image(&self, request: ImageToImageRequest) -> CallToolResult {
        match self.run_image_to_image(request).await {
            Ok(saved) => success_envelope(&saved),
            Err(err) => failure_envelope(ERROR_PREFIX, &err),
        }
    }

    async fn run_image_to_image(&self, request: ImageToImageRequest) -> Result<Vec<SavedArtifact>> {
        let mut violations = Vec::new();
        if request.images.is_empty() {
            violations.push(FieldViolation::new("images", "at least one source image is required"));
        }
        if request.images.iter().any(|path| path.trim().is_empty()) {
            violations.push(FieldViolation::new("images", "image paths must not be blank"));
        }
        let output_compression =
            check_range(&mut violations, "output_compression", request.output_compression, 0, 100);
        let n = check_range(&mut violations, "n", request.n, 1, 10);
        let requested = request.model.or_else(|| self.models.default_edit_model());
        let model = resolve_model(&mut violations, &self.models, requested);
        if !model.supports_edit() {
            violations.push(FieldViolation::new(
                "model",
                format!("{model} does not support image editing"),
            ));
        }
        check_size(&mut violations, request.size, model);
        finish_validation(violations)?;

        let prompt = self.sanitizer.sanitize(&request.prompt)?;
        let client = self.backend.client()?;

        let mut images = Vec::with_capacity(request.images.len());
        for raw in &request.images {
            images.push(existing_file(raw, "Input image").await?);
        }
        let mask = match request.mask.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            Some(raw) => Some(existing_file(raw, "Mask image").await?),
            None => None,
        };

        let edit = EditRequest {
            images,
            prompt,
            mask,
            model,
            size: request.size,
            output_format: request.output_format,
            output_compression,
            quality: request.quality,
            n,
        };
        let results = ensure_images(client.edit(&edit).await?)?;
        let format = model.effective_format(request.output_format);
        let saved = self
            .writer
            .save_batch(&results, format, request.output_path.as_deref(), request.overwrite)
            .await?;
        info!(model = %model, count = saved.len(), "edited images");
        Ok(saved)
    }
}

/// Resolves a caller-supplied input path to a regular file this process can open.
async fn existing_file(raw: &str, kind: &'static str) -> Result<PathBuf> {
    let path = Path::new(raw.trim()).to_path_buf();
    match fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Err(ImageError::FileNotFound { kind, path }),
        Err(err) => return Err(ImageError::file_read(kind, path, &err)),
    }
    fs::File::open(&path)
        .await
        .map_err(|err| ImageError::file_read(kind, &path, &err))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn directories_are_not_input_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let raw = temp.path().to_string_lossy().into_owned();
        let result = existing_file(&raw, "Input image").await;
        assert!(matches!(result, Err(ImageError::FileNotFound { kind: "Input image", .. })));
    }

    #[tokio::test]
    async fn readable_file_resolves_to_trimmed_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = temp.path().join("source.png");
        std::fs::write(&source, b"png").expect("write source");
        let raw = format!("  {}  ", source.display());
        let resolved = existing_file(&raw, "Mask image").await.expect("file resolves");
        assert_eq!(resolved, source);
    }
}
