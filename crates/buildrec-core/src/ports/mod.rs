//! Ports: the seams between the record model and its surroundings.

pub mod clock;
pub mod record_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::record_store::{PhaseCounts, RecordStore, StoreError};
