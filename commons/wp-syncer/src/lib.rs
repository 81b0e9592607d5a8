//! Declarative sync of managed Kubernetes objects.
//!
//! A [`DesiredSpec`] names one child object, its controlling owner and a
//! mutate function; [`SyncEngine::sync`] fetches or initializes the object,
//! stamps the controller reference, applies the mutation, skips the write
//! when nothing changed and otherwise creates or updates it, retrying
//! optimistic-concurrency conflicts a bounded number of times.

pub mod client;
pub mod context;
pub mod desired;
pub mod diff;
pub mod engine;
pub mod error;
pub mod object;
pub mod owner;
pub mod result;
pub mod retry;

#[cfg(feature = "memory")]
pub mod memory;

pub use client::{KubeObjectClient, ObjectClient};
pub use context::SyncContext;
pub use desired::{DesiredSpec, MutateFn};
pub use engine::SyncEngine;
pub use error::{ClientError, ErrorKind, MutateError, SyncError};
pub use object::{ObjectKey, SyncObject};
pub use owner::OwnerDescriptor;
pub use result::{EventKind, Operation, SyncEvent, SyncResult, SyncSummary};
pub use retry::RetryPolicy;

#[cfg(feature = "memory")]
pub use memory::MemoryObjectClient;
