#![forbid(unsafe_code)]

pub mod aof;
mod clock;
mod entry;
mod store;

pub use aof::{Aof, FsyncPolicy, replay_aof, replay_into, start_flusher};
pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{Store, Ttl, start_sweeper};
