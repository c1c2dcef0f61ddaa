pub mod status;

pub use status::{StreamStatus, UnknownStatus};
