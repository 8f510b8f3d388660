use std::path::PathBuf;
use std::time::Duration;

/// What is drawn while a screen is held.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// Two-line instruction page (top message, bottom message).
    Instruction { top: String, bottom: String },
    /// "Experimenter, is the scanner prepared?" page.
    ScannerPrep,
    /// "Waiting for scanner to start..." page.
    ScannerWait,
    Fixation { kind: FixationKind },
    Face { path: PathBuf, name: String },
    /// Prompt shown before a block, naming the question for that block.
    BlockPrompt { question: String },
    Rating {
        name: String,
        question: String,
        anchors: Vec<String>,
    },
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixationKind {
    /// Pre-run baseline fixation.
    PreRun,
    /// Mid-stimulus interval, between image offset and rating onset.
    Msi,
    /// Inter-stimulus interval, between trials within a block.
    Isi,
}

/// How a screen ends and what that does to the flip deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldPolicy {
    /// Deadline advances by this duration when the screen is committed.
    For(Duration),
    /// Held until a key of the given class arrives; deadline is then
    /// reset to now, so waiting latency is not carried forward.
    UntilKey(AdvanceKey),
    /// Rating screen ended by the select key; deadline reset to now.
    UntilSelect,
}

/// Key class that releases a key-held screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceKey {
    /// Any non-cancel key ("press any button to continue").
    Any,
    ExperimenterReady,
    ScannerTrigger,
    /// End page: the session-closing keys.
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Background {
    #[default]
    Task,
    Mood,
}

/// One display state of the session, with everything the engine needs
/// to commit it: log label, port code, hold policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Screen {
    pub content: Content,
    pub hold: HoldPolicy,
    /// Event code written to the parallel port on commit, if any.
    pub port_code: Option<u8>,
    pub background: Background,
    /// Log line for this transition, e.g. "Display Fixation".
    pub label: String,
    /// Boundary markers logged immediately before the transition line
    /// (run/group/block start and end).
    pub markers: Vec<String>,
}

impl Screen {
    pub fn new(content: Content, hold: HoldPolicy, label: impl Into<String>) -> Self {
        Self {
            content,
            hold,
            port_code: None,
            background: Background::Task,
            label: label.into(),
            markers: Vec::new(),
        }
    }

    pub fn with_port(mut self, code: u8) -> Self {
        self.port_code = Some(code);
        self
    }

    pub fn on_mood_background(mut self) -> Self {
        self.background = Background::Mood;
        self
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.markers.push(marker.into());
        self
    }

    pub fn is_rating(&self) -> bool {
        matches!(self.content, Content::Rating { .. })
    }
}
