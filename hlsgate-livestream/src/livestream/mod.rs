// Stream orchestration
//
// StreamManager is the single entry point: it owns the registry, launches
// workers through the supervisor and spawns one liveness monitor per stream.

pub mod instance;
pub mod liveness;
pub mod manager;
pub mod registry;
pub mod supervisor;

pub use instance::{StreamInstance, StreamPaths, StreamSnapshot, Transition};
pub use liveness::{
    decide, newest_artifact, Activity, ActivityTracker, LivenessMonitor, LivenessSettings,
};
pub use manager::{
    HealthSummary, ManagerConfig, PlaylistDebug, StartSummary, StopSummary, StreamDetail,
    StreamManager,
};
pub use registry::{PortAllocator, Reservation, StopTicket, StreamRegistry};
pub use supervisor::{ChildHandle, ProcessLauncher, WorkerHandle, WorkerLauncher, WorkerSpec};
