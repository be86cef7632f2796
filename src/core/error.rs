use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Remote command failed: {0}")]
    RemoteExecution(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Error::Precondition(message.into())
    }

    /// Remote failure attributed to a named step; the step description is
    /// the primary debugging signal on abort.
    pub fn remote(step: impl Into<String>, message: impl Into<String>) -> Self {
        Error::RemoteExecution(format!("'{}': {}", step.into(), message.into()))
    }

    pub fn template(message: impl Into<String>) -> Self {
        Error::Template(message.into())
    }

    pub fn git(message: impl Into<String>) -> Self {
        Error::Git(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Precondition(_) => "precondition",
            Error::RemoteExecution(_) => "remote.command_failed",
            Error::TemplateNotFound(_) => "template.not_found",
            Error::Template(_) => "template.invalid",
            Error::Git(_) => "git.command_failed",
            Error::Io(_) => "internal.io_error",
            Error::Yaml(_) => "config.invalid_yaml",
        }
    }
}
