pub mod port;

pub use port::{EventPort, NullPort, ParallelPort, RecordingPort};
