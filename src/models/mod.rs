//! Core data models for the file storage service.
//!
//! Upload requests and derived keys, multipart session parts, and the hash
//! records persisted once an upload succeeds.

pub mod hash_record;
pub mod multipart;
pub mod upload;
