//! mcs-reconcile: reconciliation engine for MCS cloud resources.
//!
//! Every mutation against the MCS control plane is accepted immediately and
//! carried out in the background. This crate turns those asynchronous
//! backends into blocking, fail-closed operations:
//! - `status` normalizes backend payloads into a `CanonicalStatus`
//! - `resolver` works out which kind an opaque identifier names
//! - `poller` blocks until a resource reaches a target status
//! - `sequencer` runs dependent mutate-then-wait steps in order
//! - `delta` plans collection changes (scaling, grants, patches)
//! - `reconciler` exposes create/read/update/delete per resource kind

pub mod clients;
pub mod config;
pub mod delta;
pub mod error;
pub mod kind;
pub mod model;
pub mod poller;
pub mod reconciler;
pub mod resolver;
pub mod sequencer;
pub mod status;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

pub use clients::{BlockStorageApi, ClientFactory, ContainerInfraApi, DatabaseApi, RestClient};
pub use config::{ProviderConfig, ServiceCategory, Timeouts, WaitTiming};
pub use delta::{DeltaSet, NaturalKey, PatchOp, compute_delta, scale_delta};
pub use error::{ClientError, ReconcileError, Result};
pub use kind::{ManagedResource, RawState, ResourceKind};
pub use poller::{Observation, PollSpec, wait_for};
pub use resolver::{Dbms, KindTable, Resolution, Resolver, SubResourceId};
pub use sequencer::{SequenceReport, Step, StepPlan, run_steps};
pub use status::{CanonicalStatus, Direction, derive_status};
