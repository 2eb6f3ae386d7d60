/// Errors surfaced by the generation pipeline.
///
/// `Validation` maps to a client error at the HTTP boundary; everything else
/// is a server error carrying the underlying message.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("assistant and topic are required")]
    Validation,

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("{0}")]
    Template(#[from] scribe_core::template::TemplateError),

    #[error("GEMINI_API_KEY missing. Set it to call the Gemini API.")]
    Configuration,

    #[error("Gemini API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(String),
}
