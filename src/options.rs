//! Closed value domains accepted by the image tools.
//!
//! Every enum serializes to the exact wire value the image API expects, and
//! derives `JsonSchema` so tool schemas enumerate the accepted values.

use std::fmt;
use std::str::FromStr;

use rmcp::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ImageModel {
    #[serde(rename = "gpt-image-1")]
    GptImage1,
    #[serde(rename = "dall-e-2")]
    DallE2,
    #[serde(rename = "dall-e-3")]
    DallE3,
}

impl ImageModel {
    pub const ALL: [ImageModel; 3] = [ImageModel::GptImage1, ImageModel::DallE2, ImageModel::DallE3];

    pub fn as_str(self) -> &'static str {
        match self {
            ImageModel::GptImage1 => "gpt-image-1",
            ImageModel::DallE2 => "dall-e-2",
            ImageModel::DallE3 => "dall-e-3",
        }
    }

    pub fn is_gpt_image(self) -> bool {
        matches!(self, ImageModel::GptImage1)
    }

    pub fn supports_edit(self) -> bool {
        match self {
            ImageModel::GptImage1 | ImageModel::DallE2 => true,
            ImageModel::DallE3 => false,
        }
    }

    pub fn max_images(self) -> u8 {
        match self {
            ImageModel::DallE3 => 1,
            ImageModel::GptImage1 | ImageModel::DallE2 => 10,
        }
    }

    /// Only gpt-image models honour `output_format`; DALL·E always returns PNG.
    pub fn effective_format(self, requested: OutputFormat) -> OutputFormat {
        if self.is_gpt_image() {
            requested
        } else {
            OutputFormat::Png
        }
    }
}

impl fmt::Display for ImageModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageModel {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        ImageModel::ALL
            .into_iter()
            .find(|model| model.as_str() == normalized)
            .ok_or_else(|| format!("unknown image model '{}'", raw.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ImageSize {
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "256x256")]
    S256,
    #[serde(rename = "512x512")]
    S512,
    #[serde(rename = "1024x1024")]
    S1024,
    #[serde(rename = "1536x1024")]
    Landscape1536,
    #[serde(rename = "1024x1536")]
    Portrait1536,
    #[serde(rename = "1792x1024")]
    Landscape1792,
    #[serde(rename = "1024x1792")]
    Portrait1792,
}

impl ImageSize {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageSize::Auto => "auto",
            ImageSize::S256 => "256x256",
            ImageSize::S512 => "512x512",
            ImageSize::S1024 => "1024x1024",
            ImageSize::Landscape1536 => "1536x1024",
            ImageSize::Portrait1536 => "1024x1536",
            ImageSize::Landscape1792 => "1792x1024",
            ImageSize::Portrait1792 => "1024x1792",
        }
    }

    pub fn supported_by(self, model: ImageModel) -> bool {
        match model {
            ImageModel::GptImage1 => matches!(
                self,
                ImageSize::Auto | ImageSize::S1024 | ImageSize::Landscape1536 | ImageSize::Portrait1536
            ),
            ImageModel::DallE2 => matches!(self, ImageSize::S256 | ImageSize::S512 | ImageSize::S1024),
            ImageModel::DallE3 => matches!(
                self,
                ImageSize::S1024 | ImageSize::Landscape1792 | ImageSize::Portrait1792
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImageStyle {
    Vivid,
    Natural,
}

impl ImageStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageStyle::Vivid => "vivid",
            ImageStyle::Natural => "natural",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Jpeg,
    Webp,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Webp => "webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Webp => "webp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ModerationLevel {
    Low,
    Auto,
}

impl ModerationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ModerationLevel::Low => "low",
            ModerationLevel::Auto => "auto",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Standard,
    Hd,
    Low,
    Medium,
    High,
    Auto,
}

impl Quality {
    /// Maps the requested quality onto the vocabulary the model understands.
    /// `None` means the parameter is omitted.
    pub fn for_model(self, model: ImageModel) -> Option<&'static str> {
        match model {
            ImageModel::GptImage1 => Some(match self {
                Quality::Low => "low",
                Quality::Medium | Quality::Standard => "medium",
                Quality::High | Quality::Hd => "high",
                Quality::Auto => "auto",
            }),
            ImageModel::DallE3 => Some(match self {
                Quality::Hd | Quality::High => "hd",
                Quality::Standard | Quality::Low | Quality::Medium | Quality::Auto => "standard",
            }),
            ImageModel::DallE2 => None,
        }
    }
}

/// The models this deployment may use, with one designated default.
///
/// Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedModelSet {
    models: Vec<ImageModel>,
    default: ImageModel,
}

impl AllowedModelSet {
    pub const DISCOVERY_DEFAULT: ImageModel = ImageModel::GptImage1;

    /// Fallback used when no credential is configured: every known model.
    pub fn discovery() -> Self {
        Self {
            models: ImageModel::ALL.to_vec(),
            default: Self::DISCOVERY_DEFAULT,
        }
    }

    /// Builds the set from an operator-supplied allow-list. The first
    /// recognised entry becomes the default; unknown entries are skipped.
    pub fn from_allow_list<S: AsRef<str>>(entries: &[S]) -> Self {
        let mut models: Vec<ImageModel> = Vec::new();
        for entry in entries {
            let raw = entry.as_ref();
            if raw.trim().is_empty() {
                continue;
            }
            match raw.parse::<ImageModel>() {
                Ok(model) if !models.contains(&model) => models.push(model),
                Ok(_) => {}
                Err(err) => warn!("ignoring allow-list entry: {err}"),
            }
        }
        match models.first() {
            Some(&default) => Self { models, default },
            None => Self::discovery(),
        }
    }

    pub fn contains(&self, model: ImageModel) -> bool {
        self.models.contains(&model)
    }

    pub fn default_model(&self) -> ImageModel {
        self.default
    }

    pub fn models(&self) -> &[ImageModel] {
        &self.models
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.models.iter().map(|model| model.as_str()).collect()
    }

    /// Allowed models that accept edit requests, in allow-list order.
    pub fn edit_models(&self) -> Vec<ImageModel> {
        self.models
            .iter()
            .copied()
            .filter(|model| model.supports_edit())
            .collect()
    }

    /// The default model for edits: the deployment default when it can edit,
    /// otherwise the first allowed model that can.
    pub fn default_edit_model(&self) -> Option<ImageModel> {
        if self.default.supports_edit() {
            Some(self.default)
        } else {
            self.edit_models().first().copied()
        }
    }
}
