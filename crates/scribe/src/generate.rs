use crate::gemini::{GeminiClient, GeminiConfig, DEFAULT_MODEL};
use crate::prelude::{eprintln, println, *};
use scribe_core::extract::{extract_response, next_token_budget, Extraction};
use scribe_core::template::{fill_template, frame_prompt, parse_system_instructions, PromptVars};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_TEMPLATE: &str = "templates/blog_outline.txt";
pub const DEFAULT_BRAND_TYPE: &str = "Generic Brand";
pub const DEFAULT_AUDIENCE: &str = "general audience";
pub const DEFAULT_TONE: &str = "professional";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 800;

/// Truncation-triggered regenerations allowed per request.
pub const MAX_RETRIES: u32 = 1;

/// A content-generation request, as received on the HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub assistant: String,
    pub template: Option<String>,
    pub brand_type: Option<String>,
    #[serde(default)]
    pub topic: String,
    pub audience: Option<String>,
    pub tone: Option<String>,
    pub system_json: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerateRequest {
    /// Check the required fields. Runs before any file or network I/O.
    pub fn validate(&self) -> Result<(), Error> {
        if self.assistant.trim().is_empty() || self.topic.trim().is_empty() {
            return Err(Error::Validation);
        }
        Ok(())
    }
}

/// The normalized outcome of a generation: the produced text plus the path
/// of the persisted raw-response artifact, when the write succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionResult {
    pub text: String,
    pub raw_path: Option<String>,
}

/// Orchestrates one generation request end to end: template loading, prompt
/// assembly, the Gemini call with its bounded truncation retry, and raw
/// response persistence.
pub struct Generator {
    client: GeminiClient,
    output_dir: PathBuf,
}

impl Generator {
    pub fn new(config: GeminiConfig, output_dir: PathBuf) -> Self {
        Self {
            client: GeminiClient::new(config),
            output_dir,
        }
    }

    pub async fn generate(&self, request: &GenerateRequest) -> Result<CompletionResult, Error> {
        let template_path = request.template.as_deref().unwrap_or(DEFAULT_TEMPLATE);
        let template = load_template(template_path).await?;

        let vars = PromptVars {
            assistant_name: request.assistant.clone(),
            brand_type: request
                .brand_type
                .clone()
                .unwrap_or_else(|| DEFAULT_BRAND_TYPE.to_string()),
            topic: request.topic.clone(),
            target_audience: request
                .audience
                .clone()
                .unwrap_or_else(|| DEFAULT_AUDIENCE.to_string()),
            tone: request
                .tone
                .clone()
                .unwrap_or_else(|| DEFAULT_TONE.to_string()),
        };
        let user_prompt = fill_template(&template, &vars.as_map())?;

        let system_instructions = match request.system_json.as_deref() {
            Some(path) => read_system_instructions(path).await,
            None => None,
        };
        let prompt = frame_prompt(&user_prompt, system_instructions.as_deref());

        self.complete(
            &prompt,
            request.model.as_deref().unwrap_or(DEFAULT_MODEL),
            request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            MAX_RETRIES,
        )
        .await
    }

    /// Call the API, normalizing the response shape and retrying once with a
    /// doubled token budget when the result looks truncated.
    ///
    /// When nothing extractable comes back the raw JSON string is returned
    /// as a last resort rather than failing the request.
    async fn complete(
        &self,
        prompt: &str,
        model: &str,
        temperature: f32,
        max_tokens: u32,
        max_retries: u32,
    ) -> Result<CompletionResult, Error> {
        let mut budget = max_tokens;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let response = self
                .client
                .generate(prompt, model, temperature, budget)
                .await?;
            let raw_path = self.persist_raw(&response, attempt).await;

            match extract_response(&response) {
                Extraction::Text { text, truncated } => {
                    if truncated && attempt <= max_retries {
                        budget = next_token_budget(budget);
                        continue;
                    }
                    return Ok(CompletionResult { text, raw_path });
                }
                Extraction::Empty => {
                    return Ok(CompletionResult {
                        text: response.to_string(),
                        raw_path,
                    })
                }
            }
        }
    }

    /// Write the raw response to a timestamped diagnostic file.
    ///
    /// Best-effort: any failure leaves `raw_path` empty instead of aborting
    /// the request.
    async fn persist_raw(&self, response: &serde_json::Value, attempt: u32) -> Option<String> {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = self
            .output_dir
            .join(f!("raw_response_{timestamp}_attempt{attempt}.json"));
        let pretty =
            serde_json::to_string_pretty(response).unwrap_or_else(|_| response.to_string());

        if tokio::fs::create_dir_all(&self.output_dir).await.is_err() {
            return None;
        }
        match tokio::fs::write(&path, pretty).await {
            Ok(()) => Some(path.to_string_lossy().into_owned()),
            Err(_) => None,
        }
    }
}

async fn load_template(path: &str) -> Result<String, Error> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::TemplateNotFound(path.to_string()))
        }
        Err(e) => Err(Error::Io(e.to_string())),
    }
}

/// Read the optional system-instructions side file.
///
/// Every failure mode collapses to None: a missing or malformed file must
/// degrade to "no system instructions", never fail the request.
async fn read_system_instructions(path: &str) -> Option<String> {
    let raw = tokio::fs::read_to_string(Path::new(path)).await.ok()?;
    parse_system_instructions(&raw)
}

#[derive(Debug, clap::Args)]
pub struct GenerateOptions {
    /// Topic to write about
    #[arg(long)]
    pub topic: String,

    /// Assistant persona name
    #[arg(long, default_value = "Zeus")]
    pub assistant: String,

    /// Template file path
    #[arg(long)]
    pub template: Option<String>,

    /// Brand descriptor substituted into the template
    #[arg(long)]
    pub brand_type: Option<String>,

    /// Target audience
    #[arg(long)]
    pub audience: Option<String>,

    /// Writing tone
    #[arg(long)]
    pub tone: Option<String>,

    /// Path to a system-instructions JSON file
    #[arg(long)]
    pub system_json: Option<String>,

    /// Gemini model name
    #[arg(long, env = "GEMINI_MODEL")]
    pub model: Option<String>,

    /// Sampling temperature
    #[arg(long, default_value = "0.7")]
    pub temperature: f32,

    /// Output-token budget for the first attempt
    #[arg(long, default_value = "800")]
    pub max_tokens: u32,

    /// Directory for raw response artifacts
    #[arg(long, env = "SCRIBE_OUTPUT_DIR", default_value = "generated_content")]
    pub output_dir: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(options: GenerateOptions, global: crate::Global) -> Result<()> {
    let request = GenerateRequest {
        assistant: options.assistant,
        template: options.template,
        brand_type: options.brand_type,
        topic: options.topic,
        audience: options.audience,
        tone: options.tone,
        system_json: options.system_json,
        model: options.model,
        temperature: Some(options.temperature),
        max_tokens: Some(options.max_tokens),
    };
    request.validate().map_err(|e| eyre!("{e}"))?;

    let config = GeminiConfig::from_env();
    if global.verbose {
        eprintln!("API base: {}", config.api_base);
        eprintln!(
            "Model: {}",
            request.model.as_deref().unwrap_or(DEFAULT_MODEL)
        );
        eprintln!(
            "Template: {}",
            request.template.as_deref().unwrap_or(DEFAULT_TEMPLATE)
        );
    }

    let generator = Generator::new(config, options.output_dir);
    let result = generator.generate(&request).await.map_err(|e| eyre!("{e}"))?;

    if options.json {
        let output = serde_json::json!({"output": result.text, "raw": result.raw_path});
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", result.text);
        if global.verbose {
            if let Some(raw_path) = &result.raw_path {
                eprintln!("Raw response: {raw_path}");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GENERATE_PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";

    fn generator(server: &MockServer, dir: &tempfile::TempDir) -> Generator {
        let config = GeminiConfig {
            api_key: Some("test-key".to_string()),
            api_base: server.uri(),
        };
        Generator::new(config, dir.path().to_path_buf())
    }

    fn request_for(template: &Path) -> GenerateRequest {
        GenerateRequest {
            assistant: "Zeus".to_string(),
            template: Some(template.to_string_lossy().into_owned()),
            brand_type: None,
            topic: "cats".to_string(),
            audience: None,
            tone: None,
            system_json: None,
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }

    fn write_template(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("template.txt");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_direct_text_makes_one_attempt() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "done"})))
            .expect(1)
            .mount(&server)
            .await;

        let result = generator(&server, &dir)
            .complete("prompt", DEFAULT_MODEL, 0.7, 800, MAX_RETRIES)
            .await
            .unwrap();

        assert_eq!(result.text, "done");
    }

    #[tokio::test]
    async fn test_truncated_response_retries_with_doubled_budget() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(body_partial_json(
                json!({"generationConfig": {"maxOutputTokens": 800}}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "partial"}]},
                    "finishReason": "MAX_TOKENS"
                }]
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(body_partial_json(
                json!({"generationConfig": {"maxOutputTokens": 1600}}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "the full answer"}]},
                    "finishReason": "STOP"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = generator(&server, &dir)
            .complete("prompt", DEFAULT_MODEL, 0.7, 800, MAX_RETRIES)
            .await
            .unwrap();

        assert_eq!(result.text, "the full answer");
    }

    #[tokio::test]
    async fn test_retry_exhaustion_returns_truncated_text() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        // Every attempt comes back truncated; after the retry limit the
        // text is returned as-is.
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "partial"}]},
                    "finishReason": "MAX_TOKENS"
                }]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let result = generator(&server, &dir)
            .complete("prompt", DEFAULT_MODEL, 0.7, 800, MAX_RETRIES)
            .await
            .unwrap();

        assert_eq!(result.text, "partial");
    }

    #[tokio::test]
    async fn test_unextractable_response_falls_back_to_raw_string() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"promptFeedback": {"blockReason": "SAFETY"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = generator(&server, &dir)
            .complete("prompt", DEFAULT_MODEL, 0.7, 800, MAX_RETRIES)
            .await
            .unwrap();

        assert!(result.text.contains("promptFeedback"));
    }

    #[tokio::test]
    async fn test_raw_response_persisted_per_attempt() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "done"})))
            .mount(&server)
            .await;

        let result = generator(&server, &dir)
            .complete("prompt", DEFAULT_MODEL, 0.7, 800, MAX_RETRIES)
            .await
            .unwrap();

        let raw_path = result.raw_path.expect("raw path");
        assert!(raw_path.contains("raw_response_"));
        assert!(raw_path.ends_with("_attempt1.json"));
        let contents = std::fs::read_to_string(&raw_path).unwrap();
        assert!(contents.contains("done"));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_any_call() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "done"})))
            .expect(0)
            .mount(&server)
            .await;

        let config = GeminiConfig {
            api_key: None,
            api_base: server.uri(),
        };
        let generator = Generator::new(config, dir.path().to_path_buf());
        let err = generator
            .complete("prompt", DEFAULT_MODEL, 0.7, 800, MAX_RETRIES)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Configuration));
    }

    #[tokio::test]
    async fn test_api_error_status_propagates() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .expect(1)
            .mount(&server)
            .await;

        let err = generator(&server, &dir)
            .complete("prompt", DEFAULT_MODEL, 0.7, 800, MAX_RETRIES)
            .await
            .unwrap_err();

        match err {
            Error::Api(message) => assert!(message.contains("quota exceeded")),
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_template_fails_without_external_call() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "done"})))
            .expect(0)
            .mount(&server)
            .await;

        let request = request_for(Path::new("does/not/exist.txt"));
        let err = generator(&server, &dir).generate(&request).await.unwrap_err();

        assert!(matches!(err, Error::TemplateNotFound(_)));
    }

    #[tokio::test]
    async fn test_template_variables_reach_the_prompt() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(&dir, "Hello {topic}");

        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(body_partial_json(json!({
                "contents": [{"role": "user", "parts": [{"text": "Hello cats"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "done"})))
            .expect(1)
            .mount(&server)
            .await;

        let result = generator(&server, &dir)
            .generate(&request_for(&template))
            .await
            .unwrap();

        assert_eq!(result.text, "done");
    }

    #[tokio::test]
    async fn test_system_instructions_frame_the_prompt() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(&dir, "Hello {topic}");
        let system_json = dir.path().join("system.json");
        std::fs::write(&system_json, r#"{"instructions": "Stay on brand"}"#).unwrap();

        let framed = "[SYSTEM INSTRUCTIONS]\nStay on brand\n\n[USER TASK]\nHello cats";
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(body_partial_json(json!({
                "contents": [{"role": "user", "parts": [{"text": framed}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "done"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut request = request_for(&template);
        request.system_json = Some(system_json.to_string_lossy().into_owned());
        let result = generator(&server, &dir).generate(&request).await.unwrap();

        assert_eq!(result.text, "done");
    }

    #[tokio::test]
    async fn test_broken_system_instructions_degrade_silently() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(&dir, "Hello {topic}");
        let system_json = dir.path().join("system.json");
        std::fs::write(&system_json, "not json at all").unwrap();

        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(body_partial_json(json!({
                "contents": [{"role": "user", "parts": [{"text": "Hello cats"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "done"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut request = request_for(&template);
        request.system_json = Some(system_json.to_string_lossy().into_owned());
        let result = generator(&server, &dir).generate(&request).await.unwrap();

        assert_eq!(result.text, "done");
    }

    #[tokio::test]
    async fn test_absent_system_instructions_file_degrades_silently() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(&dir, "Hello {topic}");

        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(body_partial_json(json!({
                "contents": [{"role": "user", "parts": [{"text": "Hello cats"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "done"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut request = request_for(&template);
        request.system_json = Some("no/such/file.json".to_string());
        let result = generator(&server, &dir).generate(&request).await.unwrap();

        assert_eq!(result.text, "done");
    }

    #[test]
    fn test_validation_rejects_missing_fields() {
        let mut request = request_for(Path::new("x"));
        request.assistant = String::new();
        assert!(matches!(request.validate(), Err(Error::Validation)));

        let mut request = request_for(Path::new("x"));
        request.topic = "   ".to_string();
        assert!(matches!(request.validate(), Err(Error::Validation)));

        assert!(request_for(Path::new("x")).validate().is_ok());
    }
}
