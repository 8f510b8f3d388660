pub mod keys;
pub mod record;
pub mod screen;
pub mod stimulus;

pub use keys::{KeyMap, KeyRole};
pub use record::{RatingRecord, RatingSample, SessionRecord};
pub use screen::{AdvanceKey, Background, Content, FixationKind, HoldPolicy, Screen};
pub use stimulus::{FaceStimulus, StimulusSet};
