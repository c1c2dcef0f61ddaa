// System of record integration
//
// The system of record owns the canonical stream status. We push status
// changes to it (Notifier) and read presumed-active streams back from it on
// startup (Recovery). Both sides go through the SystemOfRecord trait.

pub mod client;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod notifier;
pub mod recovery;

pub use client::{HttpSystemOfRecord, RecordError, RecordedStream, StatusUpdate, SystemOfRecord};
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockSystemOfRecord;
pub use notifier::Notifier;
pub use recovery::{Recovery, RecoveryReport, RecoverySettings};
