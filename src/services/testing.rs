//! In-memory doubles of the external stores, recording every call.

use crate::{
    models::{hash_record::HashRecord, multipart::PartDescriptor},
    services::{
        metadata_store::{MetadataError, MetadataResult, MetadataStore},
        object_store::{ObjectStore, StoreError, StoreResult},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::{
    collections::{BTreeMap, HashMap},
    io,
    sync::Mutex,
};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

fn injected(operation: &'static str) -> StoreError {
    StoreError::backend(operation, io::Error::new(io::ErrorKind::Other, "injected failure"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    InitiateMultipart { key: String },
    UploadPart { key: String, part_number: i32, size: u64 },
    CompleteMultipart { key: String, part_numbers: Vec<i32> },
    AbortMultipart { key: String },
    PutObject { key: String, content_length: u64 },
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    next_upload: u32,
    sessions: HashMap<String, BTreeMap<i32, Bytes>>,
    objects: HashMap<String, Vec<u8>>,
}

#[derive(Default)]
pub struct RecordingObjectStore {
    state: Mutex<State>,
    fail_initiate: bool,
    fail_part: Option<i32>,
    fail_complete: bool,
    fail_abort: bool,
    fail_put: bool,
    discard_payloads: bool,
}

impl RecordingObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_initiate(mut self) -> Self {
        self.fail_initiate = true;
        self
    }

    pub fn fail_part(mut self, part_number: i32) -> Self {
        self.fail_part = Some(part_number);
        self
    }

    pub fn fail_complete(mut self) -> Self {
        self.fail_complete = true;
        self
    }

    pub fn fail_abort(mut self) -> Self {
        self.fail_abort = true;
        self
    }

    pub fn fail_put(mut self) -> Self {
        self.fail_put = true;
        self
    }

    /// Keep call records only; part and object bytes are dropped.
    pub fn discard_payloads(mut self) -> Self {
        self.discard_payloads = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| matches(call))
            .count()
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    pub fn open_sessions(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }
}

#[async_trait]
impl ObjectStore for RecordingObjectStore {
    async fn initiate_multipart(&self, key: &str) -> StoreResult<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::InitiateMultipart {
            key: key.to_string(),
        });
        if self.fail_initiate {
            return Err(injected("initiate"));
        }
        state.next_upload += 1;
        let upload_id = format!("upload-{}", state.next_upload);
        state.sessions.insert(upload_id.clone(), BTreeMap::new());
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StoreResult<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::UploadPart {
            key: key.to_string(),
            part_number,
            size: body.len() as u64,
        });
        if self.fail_part == Some(part_number) {
            return Err(injected("upload part"));
        }
        let etag = format!("etag-{}", part_number);
        let discard = self.discard_payloads;
        let parts = state
            .sessions
            .get_mut(upload_id)
            .ok_or_else(|| StoreError::UploadNotFound(upload_id.to_string()))?;
        parts.insert(part_number, if discard { Bytes::new() } else { body });
        Ok(etag)
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartDescriptor],
    ) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::CompleteMultipart {
            key: key.to_string(),
            part_numbers: parts.iter().map(|part| part.part_number).collect(),
        });
        if self.fail_complete {
            return Err(injected("complete"));
        }
        let staged = state
            .sessions
            .remove(upload_id)
            .ok_or_else(|| StoreError::UploadNotFound(upload_id.to_string()))?;
        let mut object = Vec::new();
        for part in parts {
            let bytes = staged.get(&part.part_number).ok_or_else(|| StoreError::InvalidParts {
                upload_id: upload_id.to_string(),
                reason: format!("part {} missing", part.part_number),
            })?;
            object.extend_from_slice(bytes);
        }
        state.objects.insert(key.to_string(), object);
        Ok(())
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::AbortMultipart {
            key: key.to_string(),
        });
        if self.fail_abort {
            return Err(injected("abort"));
        }
        state
            .sessions
            .remove(upload_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::UploadNotFound(upload_id.to_string()))
    }

    async fn put_object(&self, key: &str, content_length: u64, body: Bytes) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::PutObject {
            key: key.to_string(),
            content_length,
        });
        if self.fail_put {
            return Err(injected("put"));
        }
        let payload = if self.discard_payloads {
            Vec::new()
        } else {
            body.to_vec()
        };
        state.objects.insert(key.to_string(), payload);
        Ok(())
    }

    async fn check_ready(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingMetadataStore {
    records: Mutex<Vec<HashRecord>>,
    fail: bool,
}

impl RecordingMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<HashRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataStore for RecordingMetadataStore {
    async fn put_record(&self, record: &HashRecord) -> MetadataResult<()> {
        if self.fail {
            return Err(MetadataError::Sqlx(sqlx::Error::PoolClosed));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn check_ready(&self) -> MetadataResult<()> {
        Ok(())
    }
}
