use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, JsonObject, ServerCapabilities, ServerInfo, Tool},
    tool, tool_handler, tool_router,
};
use serde_json::{Map, Value, json};

use crate::options::{AllowedModelSet, ImageModel};
use crate::tools::{IMAGE_TO_IMAGE, ImageToImageRequest, ImageTools, TextToImageRequest};

#[derive(Clone)]
pub struct ImageGenServer {
    tool_router: ToolRouter<Self>,
    tools: Arc<ImageTools>,
}

impl ImageGenServer {
    pub fn new(tools: Arc<ImageTools>) -> Self {
        Self {
            tool_router: Self::advertised_router(tools.models()),
            tools,
        }
    }

    /// Tool schemas as advertised over MCP for `models`. Available without a
    /// credential.
    pub fn tool_definitions(models: &AllowedModelSet) -> Vec<Tool> {
        Self::advertised_router(models).list_all()
    }

    fn advertised_router(models: &AllowedModelSet) -> ToolRouter<Self> {
        let mut router = Self::tool_router();
        for route in router.map.values_mut() {
            let (choices, default) = if route.attr.name == IMAGE_TO_IMAGE {
                (models.edit_models(), models.default_edit_model())
            } else {
                (models.models().to_vec(), Some(models.default_model()))
            };
            let schema = Arc::make_mut(&mut route.attr.input_schema);
            restrict_model_property(schema, &choices, default);
        }
        router
    }
}

/// Replaces the static `model` property with the deployment's choices and
/// default.
fn restrict_model_property(
    schema: &mut JsonObject,
    choices: &[ImageModel],
    default: Option<ImageModel>,
) {
    let Some(Value::Object(properties)) = schema.get_mut("properties") else {
        return;
    };
    let mut property = Map::new();
    property.insert("type".to_string(), json!("string"));
    let names: Vec<&str> = choices.iter().map(|model| model.as_str()).collect();
    property.insert("enum".to_string(), json!(names));
    if let Some(default) = default {
        property.insert("default".to_string(), json!(default.as_str()));
    }
    if let Some(description) = properties.get("model").and_then(|model| model.get("description")) {
        property.insert("description".to_string(), description.clone());
    }
    properties.insert("model".to_string(), Value::Object(property));

    if let Some(Value::Object(defs)) = schema.get_mut("$defs") {
        defs.remove("ImageModel");
    }
}

#[tool_router]
impl ImageGenServer {
    #[tool(
        name = "text-to-image",
        description = "Generate image(s) from a text prompt and save them to disk. Returns the saved file path, or one path per line when several images are generated."
    )]
    async fn text_to_image(
        &self,
        Parameters(request): Parameters<TextToImageRequest>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.tools.text_to_image(request).await)
    }

    #[tool(
        name = "image-to-image",
        description = "Edit existing image file(s) according to a prompt, optionally restricted by a mask, and save the results to disk. Returns the saved file path(s), one per line."
    )]
    async fn image_to_image(
        &self,
        Parameters(request): Parameters<ImageToImageRequest>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.tools.image_to_image(request).await)
    }
}

#[tool_handler]
impl ServerHandler for ImageGenServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = if self.tools.is_configured() {
            format!(
                "Image generation tools. Models: {}. Default model: {}.",
                self.tools.models().names().join(", "),
                self.tools.models().default_model()
            )
        } else {
            "Image generation tools. OPENAI_API_KEY is not configured: tools can be listed but calls will fail until it is set.".to_string()
        };
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(instructions),
            ..Default::default()
        }
    }
}
