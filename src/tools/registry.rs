//! The fixed set of tools this server exposes, independent of any transport.

use std::fmt;
use std::str::FromStr;

use rmcp::model::CallToolResult;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::{ImageError, Result};
use crate::mcp_server::ImageGenServer;
use crate::options::AllowedModelSet;
use crate::tools::{ImageToImageRequest, ImageTools, TextToImageRequest};

pub const TEXT_TO_IMAGE: &str = "text-to-image";
pub const IMAGE_TO_IMAGE: &str = "image-to-image";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    TextToImage,
    ImageToImage,
}

impl ToolName {
    pub const ALL: [ToolName; 2] = [ToolName::TextToImage, ToolName::ImageToImage];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::TextToImage => TEXT_TO_IMAGE,
            ToolName::ImageToImage => IMAGE_TO_IMAGE,
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ImageError;

    fn from_str(raw: &str) -> Result<Self> {
        ToolName::ALL
            .into_iter()
            .find(|tool| tool.as_str() == raw)
            .ok_or_else(|| ImageError::UnknownTool(raw.to_string()))
    }
}

/// Tool schemas plus the model domain. Needs no credential.
pub fn discovery_document(models: &AllowedModelSet) -> Value {
    json!({
        "tools": ImageGenServer::tool_definitions(models),
        "models": models.names(),
        "default_model": models.default_model().as_str(),
    })
}

/// Validates `arguments` against the named tool's parameters and runs it.
/// Tool failures come back as error envelopes; only an unknown tool or a
/// malformed argument bag is returned as `Err`.
pub async fn dispatch(tools: &ImageTools, name: &str, arguments: Value) -> Result<CallToolResult> {
    match name.parse::<ToolName>()? {
        ToolName::TextToImage => {
            let request: TextToImageRequest = parse_arguments(arguments)?;
            Ok(tools.text_to_image(request).await)
        }
        ToolName::ImageToImage => {
            let request: ImageToImageRequest = parse_arguments(arguments)?;
            Ok(tools.image_to_image(request).await)
        }
    }
}

fn parse_arguments<T: DeserializeOwned>(arguments: Value) -> Result<T> {
    let arguments = match arguments {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    if !arguments.is_object() {
        return Err(ImageError::validation("arguments", "expected a JSON object"));
    }
    serde_path_to_error::deserialize(arguments).map_err(|err| {
        let message = err.inner().to_string();
        let field = match err.path().to_string() {
            path if path != "." => path,
            _ => message
                .split('`')
                .nth(1)
                .filter(|_| message.starts_with("missing field") || message.starts_with("unknown field"))
                .unwrap_or("arguments")
                .to_string(),
        };
        ImageError::validation(field, message)
    })
}
