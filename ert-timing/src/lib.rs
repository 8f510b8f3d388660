pub mod clock;
pub mod scheduler;
pub mod sleep;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use scheduler::{FlipScheduler, Poll, WaitOutcome};
pub use sleep::precise_sleep;
