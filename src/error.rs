use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Authentication could not be established for the named module.
    #[error("Login required: {0}")]
    AuthRequired(String),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl AppError {
    pub fn is_auth_required(&self) -> bool {
        matches!(self, AppError::AuthRequired(_))
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
