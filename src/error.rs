use thiserror::Error;

/// Main error type for codetutor operations
#[derive(Error, Debug)]
pub enum TutorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parser error: {0}")]
    Parser(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("LLM provider error: {0}")]
    Llm(String),

    #[error("Nothing to teach: no abstractions survived extraction and filtering")]
    NothingToTeach,

    #[error("Invariant violated in {stage}: {reason}")]
    Invariant { stage: &'static str, reason: String },
}

impl TutorError {
    /// Fatal stage-boundary error identifying the violated invariant
    pub fn invariant(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::Invariant {
            stage,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TutorError>;
