//! Sync reconciliation engine for CRM integrations
//!
//! - `normalizer` - converts field values between CRM and host representations
//! - `mapping_store` - Identity Mapper (`MappingStore`) and an in-memory store
//! - `local_directory` - host-side contact lookup used to detect reclassified records
//! - `reclassify` - Lead -> Contact reclassification resolver
//! - `report_builder` - accumulates object changes into a `SyncReport`
//! - `exchange` - `ObjectSyncDataExchange`, the per-object interface exposed to the host
//! - `telemetry` - tracing subscriber bootstrap

pub mod exchange;
pub mod local_directory;
pub mod mapping_store;
pub mod normalizer;
pub mod reclassify;
pub mod report_builder;
pub mod telemetry;

pub use exchange::{ObjectSyncDataExchange, ObjectSyncRequest};
pub use local_directory::{LocalContactFinder, MemoryContactDirectory};
pub use mapping_store::{MappingStore, MemoryMappingStore, RewriteOutcome, UpsertOutcome};
pub use normalizer::ValueNormalizer;
pub use reclassify::{ReclassificationCandidate, ReclassificationResolver, Resolution};
pub use report_builder::{attach_do_not_contact, SyncReportBuilder};

pub use crm_sync_api as api;
