use crate::gemini::GeminiConfig;
use crate::generate::{GenerateRequest, Generator};
use crate::prelude::{eprintln, *};
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

/// Local development frontends allowed to call the API.
const ALLOWED_ORIGINS: [&str; 2] = ["http://localhost:5173", "http://localhost:3000"];

#[derive(Debug, clap::Args)]
pub struct ServeOptions {
    /// Port to listen on
    #[arg(short, long, env = "SCRIBE_PORT", default_value = "8000")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, env = "SCRIBE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Directory for raw response artifacts
    #[arg(long, env = "SCRIBE_OUTPUT_DIR", default_value = "generated_content")]
    pub output_dir: PathBuf,
}

struct AppState {
    generator: Generator,
}

pub async fn run(options: ServeOptions, global: crate::Global) -> Result<()> {
    let config = GeminiConfig::from_env();

    if global.verbose {
        eprintln!(
            "Starting scribe API on {}:{}...",
            options.host, options.port
        );
        if config.api_key.is_none() {
            eprintln!("GEMINI_API_KEY is not set; generation requests will fail");
        }
    }

    let addr = format!("{}:{}", options.host, options.port);
    let generator = Generator::new(config, options.output_dir);
    let app_router = router(generator)?;

    if global.verbose {
        eprintln!("Generate endpoint: http://{}/api/generate", addr);
    }

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| eyre!("Failed to bind to {}: {}", addr, e))?;

    axum::serve(listener, app_router)
        .await
        .map_err(|e| eyre!("Server error: {e}"))?;

    Ok(())
}

fn router(generator: Generator) -> Result<Router> {
    let state = Arc::new(AppState { generator });

    Ok(Router::new()
        .route("/api/generate", post(generate_handler))
        .layer(cors()?)
        .with_state(state))
}

/// CORS for the fixed local-frontend allow-list.
///
/// Credentials are allowed, so tower-http forbids wildcard methods and
/// headers; mirroring the preflight request grants them all instead.
fn cors() -> Result<CorsLayer> {
    let origins = ALLOWED_ORIGINS
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| eyre!("Invalid CORS origin: {e}"))?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

async fn generate_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    request.validate()?;

    let result = state.generator.generate(&request).await?;
    Ok(Json(json!({"output": result.text, "raw": result.raw_path})))
}

/// Pipeline error carried to the HTTP boundary.
///
/// Validation failures are the caller's fault (400); every other pipeline
/// error surfaces as a 500 with the underlying message, matching the
/// `{"detail": ...}` body shape the frontend expects.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            Error::Validation => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({"detail": self.0.to_string()}))).into_response()
    }
}
