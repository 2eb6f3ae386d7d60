use crate::error::Error;
use serde_json::{json, Value};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Immutable Gemini client configuration, resolved once at startup.
///
/// A missing key does not fail startup; it fails each generation attempt
/// with a descriptive error instead, so the server can run (and answer
/// validation errors) without credentials.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub api_base: String,
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("GEMINI_API_KEY")
                .ok()
                .filter(|key| !key.is_empty()),
            api_base: std::env::var("GEMINI_API_BASE")
                .unwrap_or_else(|_| GEMINI_API_BASE.to_string()),
        }
    }
}

/// Thin client for the Gemini `generateContent` REST endpoint.
pub struct GeminiClient {
    config: GeminiConfig,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, model: &str, api_key: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.api_base, model, api_key
        )
    }

    /// One generation call with the given sampling settings.
    ///
    /// The reply is kept as loose JSON: the response schema has changed
    /// shape across API versions, and extraction handles the variants.
    pub async fn generate(
        &self,
        prompt: &str,
        model: &str,
        temperature: f32,
        max_output_tokens: u32,
    ) -> Result<Value, Error> {
        let api_key = self.config.api_key.as_deref().ok_or(Error::Configuration)?;

        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": prompt}]
            }],
            "generationConfig": {
                "temperature": temperature,
                "maxOutputTokens": max_output_tokens
            }
        });

        let response = self
            .http
            .post(self.endpoint(model, api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("{status} - {text}")));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| Error::Api(format!("invalid response JSON: {e}")))
    }
}
