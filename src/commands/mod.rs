pub mod init;
pub mod provision;
