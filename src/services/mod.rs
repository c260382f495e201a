pub mod fs_store;
pub mod hasher;
pub mod metadata_store;
pub mod multipart;
pub mod object_store;
pub mod s3_store;
pub mod single_put;
pub mod upload_error;
pub mod upload_service;

#[cfg(test)]
pub mod testing;
