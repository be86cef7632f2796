// Public modules
pub mod deploy;
pub mod envfile;
pub mod error;
pub mod git;
pub mod host;
pub mod project;
pub mod provision;
pub mod ssh;
pub mod template;

// Re-export common types for convenience
pub use error::{Error, Result};
pub use host::Host;
pub use ssh::{ExecutionResult, RemoteSession, SshOptions};
pub use template::{TemplateStore, VariableContext};
