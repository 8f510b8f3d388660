use serde::{Deserialize, Serialize};

/// What a pressed key means to the task, independent of the windowing
/// backend's key codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    /// Global escape: unconditionally ends the session.
    Cancel,
    ExperimenterReady,
    ScannerTrigger,
    RatingUp,
    RatingDown,
    RatingSelect,
    /// Any other key; still advances "press any button" pages.
    Other,
}

/// Configurable mapping from characters to task roles. Defaults match
/// the scanner button box: 2/4 move the rating marker, 3 selects, 5 is
/// the scanner trigger, y is the experimenter's ready key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMap {
    pub prepped_key: char,
    pub trigger_key: char,
    pub question_up_key: char,
    pub question_down_key: char,
    pub question_select_key: char,
}

impl Default for KeyMap {
    fn default() -> Self {
        Self {
            prepped_key: 'y',
            trigger_key: '5',
            question_up_key: '2',
            question_down_key: '4',
            question_select_key: '3',
        }
    }
}

impl KeyMap {
    /// Classifies a typed character. 'q' is always the cancel key; the
    /// windowing layer additionally maps Escape to `Cancel`.
    pub fn classify(&self, ch: char) -> KeyRole {
        if ch == 'q' {
            KeyRole::Cancel
        } else if ch == self.prepped_key {
            KeyRole::ExperimenterReady
        } else if ch == self.trigger_key {
            KeyRole::ScannerTrigger
        } else if ch == self.question_up_key {
            KeyRole::RatingUp
        } else if ch == self.question_down_key {
            KeyRole::RatingDown
        } else if ch == self.question_select_key {
            KeyRole::RatingSelect
        } else {
            KeyRole::Other
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_map_matches_button_box() {
        let map = KeyMap::default();
        assert_eq!(map.classify('y'), KeyRole::ExperimenterReady);
        assert_eq!(map.classify('5'), KeyRole::ScannerTrigger);
        assert_eq!(map.classify('2'), KeyRole::RatingUp);
        assert_eq!(map.classify('4'), KeyRole::RatingDown);
        assert_eq!(map.classify('3'), KeyRole::RatingSelect);
        assert_eq!(map.classify('q'), KeyRole::Cancel);
        assert_eq!(map.classify('x'), KeyRole::Other);
    }

    #[test]
    fn cancel_wins_over_reassignment() {
        // Even if someone maps a task key onto q, cancel takes priority.
        let map = KeyMap {
            trigger_key: 'q',
            ..KeyMap::default()
        };
        assert_eq!(map.classify('q'), KeyRole::Cancel);
    }
}
