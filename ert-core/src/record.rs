use serde::{Deserialize, Serialize};

/// One sample of the rating marker's position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingSample {
    pub value: f32,
    /// Seconds from session start.
    pub t_s: f64,
}

/// Outcome of one rating-scale interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    /// Which scale this was, e.g. "ImageRating" or "MoodVas".
    pub name: String,
    pub question: String,
    /// Final marker position, 0..=100.
    pub rating: f32,
    /// Latency from scale onset to the last marker movement or the
    /// select press; `None` if the subject never touched the scale.
    pub decision_ms: Option<f64>,
    pub history: Vec<RatingSample>,
    /// Scale onset, seconds from session start.
    pub t_onset_s: f64,
}

/// Everything saved at the end of a session, completed or aborted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub subject: String,
    pub session: u32,
    pub completed: bool,
    pub ratings: Vec<RatingRecord>,
}

impl SessionRecord {
    pub fn new(subject: impl Into<String>, session: u32) -> Self {
        Self {
            subject: subject.into(),
            session,
            completed: false,
            ratings: Vec::new(),
        }
    }
}
