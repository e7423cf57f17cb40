//! Service layer
//!
//! Stateless facades composing the clients, walker, classifier and
//! dispatcher for the HTTP and scheduler surfaces.

pub mod download_service;
pub mod file_service;

pub use download_service::DownloadService;
pub use file_service::FileService;
