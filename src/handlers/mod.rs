pub mod health_handlers;
pub mod request_log;
pub mod upload_handlers;
