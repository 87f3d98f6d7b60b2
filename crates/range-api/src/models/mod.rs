pub mod admin;
pub mod challenge;
pub mod host;
pub mod image;
pub mod instance;
pub mod request_log;
pub mod submission;
