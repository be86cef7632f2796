mod client;

pub use client::{ExecutionResult, RemoteSession, SshOptions};
