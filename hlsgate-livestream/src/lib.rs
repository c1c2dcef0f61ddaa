// hlsgate-livestream - Stream lifecycle orchestration
//
// Architecture:
// - livestream/  - Registry, worker supervisor, liveness monitor, StreamManager facade
// - record/      - System-of-record client, status notifier, startup recovery
//
// Every stream is keyed by its externally assigned stream_id.

pub mod error;
pub mod livestream;
pub mod record;

// Re-exports for convenience
pub use error::{StreamError, StreamResult};
pub use livestream::{
    HealthSummary, ManagerConfig, PlaylistDebug, StartSummary, StopSummary, StreamDetail,
    StreamManager, StreamRegistry, StreamSnapshot,
};
pub use record::{HttpSystemOfRecord, Notifier, Recovery, RecoveryReport, SystemOfRecord};
