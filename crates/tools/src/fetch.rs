//! Job posting fetch tool.
//!
//! Fetches the raw text of a URL the user pasted into the chat, so the
//! model can read a job description before answering. No HTML parsing;
//! the raw body is handed to the model as-is.
//!
//! Every fetch failure becomes a result string the model can read and
//! explain to the user. The only hard error this tool raises is a
//! missing `url` argument.

use async_trait::async_trait;
use nebula_config::AppConfig;
use nebula_core::error::ToolError;
use nebula_core::tool::{Tool, ToolResult};
use tracing::{debug, warn};

pub struct FetchJobDescriptionTool {
    client: reqwest::Client,
}

impl FetchJobDescriptionTool {
    /// Build the tool with its own HTTP client. Some job boards block
    /// default user agents, so a common browser string is sent instead.
    pub fn new(timeout_secs: u64, user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.fetch.timeout_secs, &config.fetch.user_agent)
    }

    /// Short failure category for the user-facing error string.
    fn failure_category(e: &reqwest::Error) -> &'static str {
        if e.is_timeout() {
            "timeout"
        } else if e.is_connect() {
            "connect"
        } else if e.is_redirect() {
            "redirect"
        } else if e.is_builder() {
            "invalid url"
        } else {
            "request"
        }
    }

    fn failed(call_id: &str, output: String) -> ToolResult {
        ToolResult {
            call_id: call_id.into(),
            success: false,
            output,
        }
    }
}

#[async_trait]
impl Tool for FetchJobDescriptionTool {
    fn name(&self) -> &str {
        "fetch_job_description_content"
    }

    fn description(&self) -> &str {
        "Fetches plain text content from a given URL, intended for job descriptions. \
         Returns the text content of the page or an error message."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL of the website to fetch content from, specifically for a job description."
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(
        &self,
        call_id: &str,
        arguments: &serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError> {
        let Some(url) = arguments["url"].as_str().filter(|u| !u.is_empty()) else {
            return Err(ToolError::InvalidArguments(
                "Error: URL not provided for fetching job description.".into(),
            ));
        };

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Ok(Self::failed(
                call_id,
                format!("Error: Could not fetch content from URL {url}. Request failed: unsupported protocol"),
            ));
        }

        debug!(url, "Fetching job description content");

        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                let category = Self::failure_category(&e);
                warn!(url, error = %e, category, "Fetch request failed");
                return Ok(Self::failed(
                    call_id,
                    format!(
                        "Error: Could not fetch content from URL {url}. Request failed: {category}"
                    ),
                ));
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "Fetch returned error status");
            return Ok(Self::failed(
                call_id,
                format!(
                    "Error: Could not fetch content due to HTTP status {}.",
                    status.as_u16()
                ),
            ));
        }

        match response.text().await {
            Ok(body) => {
                debug!(url, bytes = body.len(), "Fetched content");
                Ok(ToolResult {
                    call_id: call_id.into(),
                    success: true,
                    output: body,
                })
            }
            Err(e) => {
                warn!(url, error = %e, "Failed to read fetched body");
                Ok(Self::failed(
                    call_id,
                    format!("Error: An unexpected error occurred while fetching content from {url}."),
                ))
            }
        }
    }
}
