//! Google Gemini provider implementation.
//!
//! Uses the Generative Language REST API directly.
//!
//! Quirks handled here:
//! - `x-goog-api-key` header authentication
//! - Roles are `user` / `model`; the system prompt travels as a
//!   top-level `systemInstruction` field
//! - Tool use via `functionCall` / `functionResponse` parts. The wire
//!   format carries no call ids, so this provider synthesizes one per
//!   `functionCall` and correlates results back by function name.
//! - Embeddings via `batchEmbedContents`

use async_trait::async_trait;
use nebula_core::error::ProviderError;
use nebula_core::message::{Message, ToolCallRequest};
use nebula_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Google Gemini provider (chat completions and embeddings).
pub struct GeminiProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Create a new Gemini provider. An empty key is allowed; requests
    /// will then fail with `NotConfigured` instead of reaching the API.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: "gemini".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create from application config.
    pub fn from_config(config: &nebula_config::AppConfig) -> Self {
        Self::new(config.api_key.clone().unwrap_or_default())
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn ensure_configured(&self) -> std::result::Result<(), ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "GOOGLE_API_KEY is not set".into(),
            ));
        }
        Ok(())
    }

    /// Extract system messages into the `systemInstruction` payload.
    fn extract_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut non_system: Vec<&Message> = Vec::new();

        for msg in messages {
            match msg {
                Message::System { content, .. } => system_parts.push(content),
                _ => non_system.push(msg),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system, non_system)
    }

    /// Convert domain messages to Gemini `contents`.
    fn to_api_contents(messages: &[&Message]) -> Vec<GeminiContent> {
        let mut result = Vec::new();

        for msg in messages {
            match msg {
                Message::User { content, .. } => {
                    result.push(GeminiContent {
                        role: "user".into(),
                        parts: vec![GeminiPart::Text {
                            text: content.clone(),
                        }],
                    });
                }
                Message::Assistant {
                    content,
                    tool_calls,
                    ..
                } => {
                    let mut parts = Vec::new();
                    if !content.is_empty() {
                        parts.push(GeminiPart::Text {
                            text: content.clone(),
                        });
                    }
                    for tc in tool_calls {
                        parts.push(GeminiPart::FunctionCall {
                            function_call: GeminiFunctionCall {
                                name: tc.name.clone(),
                                args: tc.arguments.clone(),
                            },
                        });
                    }
                    if parts.is_empty() {
                        // The API rejects a content with no parts.
                        parts.push(GeminiPart::Text {
                            text: String::new(),
                        });
                    }
                    result.push(GeminiContent {
                        role: "model".into(),
                        parts,
                    });
                }
                Message::ToolResult {
                    tool_name, content, ..
                } => {
                    // Correlation on the wire is by function name; the
                    // internal call_id pairing stays in our history.
                    result.push(GeminiContent {
                        role: "user".into(),
                        parts: vec![GeminiPart::FunctionResponse {
                            function_response: GeminiFunctionResponse {
                                name: tool_name.clone(),
                                response: serde_json::json!({ "content": content }),
                            },
                        }],
                    });
                }
                Message::System { .. } => {} // handled separately
            }
        }

        result
    }

    /// Convert tool definitions to Gemini `functionDeclarations`.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<GeminiToolDeclaration> {
        vec![GeminiToolDeclaration {
            function_declarations: tools
                .iter()
                .map(|t| GeminiFunctionDeclaration {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                })
                .collect(),
        }]
    }

    /// Convert a Gemini API response to our ProviderResponse.
    fn response_to_provider_response(
        resp: GeminiResponse,
        requested_model: &str,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let candidate = resp
            .candidates
            .as_ref()
            .and_then(|c| c.first())
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No candidates in response".into(),
            })?;

        let parts = candidate
            .content
            .as_ref()
            .map(|c| c.parts.as_slice())
            .unwrap_or_default();

        let mut text_content = String::new();
        let mut tool_calls = Vec::new();

        for part in parts {
            match part {
                GeminiPart::Text { text } => {
                    if !text_content.is_empty() {
                        text_content.push('\n');
                    }
                    text_content.push_str(text);
                }
                GeminiPart::FunctionCall { function_call } => {
                    tool_calls.push(ToolCallRequest {
                        id: format!("call_{}", Uuid::new_v4().simple()),
                        name: function_call.name.clone(),
                        arguments: function_call.args.clone(),
                    });
                }
                // A model response never echoes function responses back.
                GeminiPart::FunctionResponse { .. } => {}
            }
        }

        let message = Message::assistant_with_tool_calls(text_content, tool_calls);

        let usage = resp.usage_metadata.map(|u| {
            let prompt = u.prompt_token_count.unwrap_or(0);
            let completion = u.candidates_token_count.unwrap_or(0);
            Usage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: u.total_token_count.unwrap_or(prompt + completion),
            }
        });

        Ok(ProviderResponse {
            message,
            usage,
            model: requested_model.to_string(),
        })
    }

    fn map_send_error(e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(e.to_string())
        } else {
            ProviderError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl nebula_core::Provider for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        self.ensure_configured()?;

        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, request.model
        );
        let (system, messages) = Self::extract_system(&request.messages);
        let contents = Self::to_api_contents(&messages);

        let mut body = GeminiRequest {
            contents,
            system_instruction: system.map(|text| GeminiSystemInstruction {
                parts: vec![GeminiTextPart { text }],
            }),
            generation_config: Some(GeminiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            }),
            tools: None,
        };

        if !request.tools.is_empty() {
            body.tools = Some(Self::to_api_tools(&request.tools));
        }

        debug!(provider = "gemini", model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid Google API key".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Gemini API error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: GeminiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse Gemini response: {e}"),
            })?;

        Self::response_to_provider_response(api_resp, &request.model)
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        self.ensure_configured()?;

        let url = format!(
            "{}/models/{}:batchEmbedContents",
            self.base_url, request.model
        );

        let body = GeminiBatchEmbedRequest {
            requests: request
                .inputs
                .iter()
                .map(|text| GeminiEmbedRequest {
                    model: format!("models/{}", request.model),
                    content: GeminiEmbedContent {
                        parts: vec![GeminiTextPart { text: text.clone() }],
                    },
                })
                .collect(),
        };

        debug!(provider = "gemini", model = %request.model, inputs = request.inputs.len(), "Sending embedding request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid Google API key".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Gemini embedding API error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: GeminiBatchEmbedResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse Gemini embedding response: {e}"),
            })?;

        Ok(EmbeddingResponse {
            embeddings: api_resp.embeddings.into_iter().map(|e| e.values).collect(),
            model: request.model,
        })
    }
}

// --- Gemini API types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiToolDeclaration>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiTextPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiTextPart {
    text: String,
}

/// One part of a content: text, a function call, or a function response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFunctionResponse,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiToolDeclaration {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
    total_token_count: Option<u32>,
}

#[derive(Debug, Serialize)]
struct GeminiBatchEmbedRequest {
    requests: Vec<GeminiEmbedRequest>,
}

#[derive(Debug, Serialize)]
struct GeminiEmbedRequest {
    model: String,
    content: GeminiEmbedContent,
}

#[derive(Debug, Serialize)]
struct GeminiEmbedContent {
    parts: Vec<GeminiTextPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiBatchEmbedResponse {
    embeddings: Vec<GeminiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use nebula_core::Provider;

    #[test]
    fn constructor() {
        let provider = GeminiProvider::new("test-key");
        assert_eq!(provider.name(), "gemini");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn constructor_with_base_url() {
        let provider = GeminiProvider::new("test-key").with_base_url("https://proxy.local/v1beta/");
        assert_eq!(provider.base_url, "https://proxy.local/v1beta");
    }

    #[test]
    fn system_extraction() {
        let messages = vec![
            Message::system("You are Nebula's AI assistant."),
            Message::system("Begin!"),
            Message::user("Hello"),
            Message::assistant("Hi!"),
        ];

        let (system, non_system) = GeminiProvider::extract_system(&messages);
        assert_eq!(
            system.as_deref(),
            Some("You are Nebula's AI assistant.\n\nBegin!")
        );
        assert_eq!(non_system.len(), 2);
    }

    #[test]
    fn content_conversion_user_assistant() {
        let messages = vec![Message::user("Hello"), Message::assistant("Hi!")];
        let refs: Vec<&Message> = messages.iter().collect();
        let contents = GeminiProvider::to_api_contents(&refs);
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].role, "user");
        assert_eq!(contents[1].role, "model");
        match &contents[1].parts[0] {
            GeminiPart::Text { text } => assert_eq!(text, "Hi!"),
            _ => panic!("Expected text part"),
        }
    }

    #[test]
    fn content_conversion_with_tool_calls() {
        let msg = Message::assistant_with_tool_calls(
            "Looking that up",
            vec![ToolCallRequest {
                id: "call_abc".into(),
                name: "fetch_job_description_content".into(),
                arguments: serde_json::json!({"url": "https://example.com/job"}),
            }],
        );

        let refs: Vec<&Message> = vec![&msg];
        let contents = GeminiProvider::to_api_contents(&refs);
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].role, "model");
        assert_eq!(contents[0].parts.len(), 2); // text + functionCall

        match &contents[0].parts[1] {
            GeminiPart::FunctionCall { function_call } => {
                assert_eq!(function_call.name, "fetch_job_description_content");
                assert_eq!(function_call.args["url"], "https://example.com/job");
            }
            _ => panic!("Expected functionCall part"),
        }
    }

    #[test]
    fn content_conversion_tool_result() {
        let msg = Message::tool_result("call_abc", "fetch_job_description_content", "page body");
        let refs: Vec<&Message> = vec![&msg];
        let contents = GeminiProvider::to_api_contents(&refs);
        assert_eq!(contents.len(), 1);
        // Function responses travel in a user-role content.
        assert_eq!(contents[0].role, "user");

        match &contents[0].parts[0] {
            GeminiPart::FunctionResponse { function_response } => {
                assert_eq!(function_response.name, "fetch_job_description_content");
                assert_eq!(function_response.response["content"], "page body");
            }
            _ => panic!("Expected functionResponse part"),
        }
    }

    #[test]
    fn pure_tool_call_assistant_keeps_one_part() {
        let msg = Message::assistant("");
        let refs: Vec<&Message> = vec![&msg];
        let contents = GeminiProvider::to_api_contents(&refs);
        assert_eq!(contents[0].parts.len(), 1);
    }

    #[test]
    fn tool_definition_conversion() {
        let tools = vec![ToolDefinition {
            name: "fetch_job_description_content".into(),
            description: "Fetches plain text content from a given URL".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "url": {"type": "string"} },
                "required": ["url"]
            }),
        }];
        let decls = GeminiProvider::to_api_tools(&tools);
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].function_declarations.len(), 1);
        assert_eq!(
            decls[0].function_declarations[0].name,
            "fetch_job_description_content"
        );

        let json = serde_json::to_value(&decls).unwrap();
        assert!(json[0]["functionDeclarations"].is_array());
    }

    #[test]
    fn parse_text_response() {
        let resp: GeminiResponse = serde_json::from_str(
            r#"{
                "candidates": [
                    {"content": {"role": "model", "parts": [{"text": "Nebula builds data tooling."}]}}
                ],
                "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 7, "totalTokenCount": 19}
            }"#,
        )
        .unwrap();

        let pr = GeminiProvider::response_to_provider_response(resp, "gemini-1.5-flash").unwrap();
        assert_eq!(pr.message.content(), "Nebula builds data tooling.");
        assert!(pr.message.tool_calls().is_empty());
        assert_eq!(pr.usage.unwrap().total_tokens, 19);
        assert_eq!(pr.model, "gemini-1.5-flash");
    }

    #[test]
    fn parse_function_call_response() {
        let resp: GeminiResponse = serde_json::from_str(
            r#"{
                "candidates": [
                    {"content": {"role": "model", "parts": [
                        {"functionCall": {"name": "fetch_job_description_content", "args": {"url": "https://example.com/job"}}}
                    ]}}
                ]
            }"#,
        )
        .unwrap();

        let pr = GeminiProvider::response_to_provider_response(resp, "gemini-1.5-flash").unwrap();
        let calls = pr.message.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "fetch_job_description_content");
        assert_eq!(calls[0].arguments["url"], "https://example.com/job");
        assert!(calls[0].id.starts_with("call_"));
        assert_eq!(pr.message.content(), "");
    }

    #[test]
    fn parse_mixed_response_synthesizes_distinct_ids() {
        let resp: GeminiResponse = serde_json::from_str(
            r#"{
                "candidates": [
                    {"content": {"role": "model", "parts": [
                        {"text": "Let me fetch both."},
                        {"functionCall": {"name": "fetch_job_description_content", "args": {"url": "https://a.example"}}},
                        {"functionCall": {"name": "fetch_job_description_content", "args": {"url": "https://b.example"}}}
                    ]}}
                ]
            }"#,
        )
        .unwrap();

        let pr = GeminiProvider::response_to_provider_response(resp, "gemini-1.5-flash").unwrap();
        assert_eq!(pr.message.content(), "Let me fetch both.");
        let calls = pr.message.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0].id, calls[1].id);
    }

    #[test]
    fn parse_empty_candidates_is_api_error() {
        let resp: GeminiResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        let err = GeminiProvider::response_to_provider_response(resp, "gemini-1.5-flash")
            .unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { .. }));
    }

    #[test]
    fn embed_request_body_shape() {
        let body = GeminiBatchEmbedRequest {
            requests: vec![GeminiEmbedRequest {
                model: "models/text-embedding-004".into(),
                content: GeminiEmbedContent {
                    parts: vec![GeminiTextPart {
                        text: "chunk one".into(),
                    }],
                },
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["requests"][0]["model"], "models/text-embedding-004");
        assert_eq!(json["requests"][0]["content"]["parts"][0]["text"], "chunk one");
    }

    #[test]
    fn parse_batch_embed_response() {
        let resp: GeminiBatchEmbedResponse = serde_json::from_str(
            r#"{"embeddings": [{"values": [0.1, 0.2]}, {"values": [0.3, 0.4]}]}"#,
        )
        .unwrap();
        assert_eq!(resp.embeddings.len(), 2);
        assert_eq!(resp.embeddings[1].values, vec![0.3, 0.4]);
    }

    #[tokio::test]
    async fn unconfigured_key_short_circuits() {
        let provider = GeminiProvider::new("");
        let err = provider
            .complete(ProviderRequest {
                model: "gemini-1.5-flash".into(),
                messages: vec![Message::user("hi")],
                temperature: 0.7,
                max_tokens: None,
                tools: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));

        let err = provider
            .embed(EmbeddingRequest {
                model: "text-embedding-004".into(),
                inputs: vec!["hello".into()],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
