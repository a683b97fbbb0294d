//! Client for the block-storage API.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::json;

use super::RestClient;
use crate::error::ClientError;
use crate::model::{
    Snapshot, SnapshotCreateOpts, SnapshotUpdateOpts, Volume, VolumeCreateOpts, VolumeRetypeOpts,
    VolumeUpdateOpts,
};

/// Operations on volumes and snapshots.
pub trait BlockStorageApi {
    fn get_volume(&self, id: &str) -> Result<Volume, ClientError>;
    fn create_volume(&self, opts: &VolumeCreateOpts) -> Result<Volume, ClientError>;
    fn update_volume(&self, id: &str, opts: &VolumeUpdateOpts) -> Result<(), ClientError>;
    fn extend_volume(&self, id: &str, new_size: u32) -> Result<(), ClientError>;
    fn retype_volume(&self, id: &str, opts: &VolumeRetypeOpts) -> Result<(), ClientError>;
    fn delete_volume(&self, id: &str) -> Result<(), ClientError>;

    fn get_snapshot(&self, id: &str) -> Result<Snapshot, ClientError>;
    fn create_snapshot(&self, opts: &SnapshotCreateOpts) -> Result<Snapshot, ClientError>;
    fn update_snapshot(&self, id: &str, opts: &SnapshotUpdateOpts) -> Result<(), ClientError>;
    fn update_snapshot_metadata(
        &self,
        id: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), ClientError>;
    fn delete_snapshot(&self, id: &str) -> Result<(), ClientError>;
}

#[derive(Deserialize)]
struct VolumeEnvelope {
    volume: Volume,
}

#[derive(Deserialize)]
struct SnapshotEnvelope {
    snapshot: Snapshot,
}

/// HTTP implementation of [`BlockStorageApi`].
#[derive(Debug, Clone)]
pub struct BlockStorageClient {
    rest: RestClient,
}

impl BlockStorageClient {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }
}

impl BlockStorageApi for BlockStorageClient {
    fn get_volume(&self, id: &str) -> Result<Volume, ClientError> {
        let env: VolumeEnvelope = self.rest.get(&format!("volumes/{id}"))?;
        Ok(env.volume)
    }

    fn create_volume(&self, opts: &VolumeCreateOpts) -> Result<Volume, ClientError> {
        let env: VolumeEnvelope = self.rest.post("volumes", &json!({ "volume": opts }))?;
        Ok(env.volume)
    }

    fn update_volume(&self, id: &str, opts: &VolumeUpdateOpts) -> Result<(), ClientError> {
        self.rest
            .put(&format!("volumes/{id}"), &json!({ "volume": opts }))
    }

    fn extend_volume(&self, id: &str, new_size: u32) -> Result<(), ClientError> {
        self.rest.post_empty(
            &format!("volumes/{id}/action"),
            &json!({ "os-extend": { "new_size": new_size } }),
        )
    }

    fn retype_volume(&self, id: &str, opts: &VolumeRetypeOpts) -> Result<(), ClientError> {
        self.rest.post_empty(
            &format!("volumes/{id}/action"),
            &json!({ "os-retype": opts }),
        )
    }

    fn delete_volume(&self, id: &str) -> Result<(), ClientError> {
        self.rest.delete(&format!("volumes/{id}"))
    }

    fn get_snapshot(&self, id: &str) -> Result<Snapshot, ClientError> {
        let env: SnapshotEnvelope = self.rest.get(&format!("snapshots/{id}"))?;
        Ok(env.snapshot)
    }

    fn create_snapshot(&self, opts: &SnapshotCreateOpts) -> Result<Snapshot, ClientError> {
        let env: SnapshotEnvelope = self
            .rest
            .post("snapshots", &json!({ "snapshot": opts }))?;
        Ok(env.snapshot)
    }

    fn update_snapshot(&self, id: &str, opts: &SnapshotUpdateOpts) -> Result<(), ClientError> {
        self.rest
            .put(&format!("snapshots/{id}"), &json!({ "snapshot": opts }))
    }

    fn update_snapshot_metadata(
        &self,
        id: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), ClientError> {
        self.rest.put(
            &format!("snapshots/{id}/metadata"),
            &json!({ "metadata": metadata }),
        )
    }

    fn delete_snapshot(&self, id: &str) -> Result<(), ClientError> {
        self.rest.delete(&format!("snapshots/{id}"))
    }
}
