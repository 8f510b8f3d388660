use ert_core::KeyMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read parameter file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed parameter file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("image list is empty")]
    NoImages,
    #[error("{name}: min {min} exceeds max {max}")]
    InvertedRange { name: &'static str, min: f64, max: f64 },
    #[error("{name} must be positive, got {value}")]
    NonPositiveDuration { name: &'static str, value: f64 },
    #[error("{name} must be at least 1")]
    ZeroCount { name: &'static str },
    #[error("{name} ({code}) collides with image event codes (these reach up to {max_image_code})")]
    CodeCollision {
        name: &'static str,
        code: u8,
        max_image_code: u8,
    },
    #[error("need at least {needed} face questions (one per block), got {got}")]
    FaceQuestionCount { needed: usize, got: usize },
    #[error("n_trials_per_block ({trials}) exceeds the number of images ({images})")]
    NotEnoughImages { trials: usize, images: usize },
}

/// The complete parameter table of the task. Serialized as JSON; every
/// field has a default so a partial file only overrides what it names.
/// The whole table is dumped into the event log at startup so a run log
/// is self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskParams {
    // Experiment flow.
    pub n_trials_per_block: usize,
    /// Should match the number of face rating questions.
    pub n_blocks_per_group: usize,
    pub n_groups_per_run: usize,
    pub n_runs: usize,

    // Timing, in seconds.
    /// Pause between pre-run fixation onset and the first block prompt,
    /// added on top of `fix_cross_dur`.
    pub t_baseline: f64,
    pub t_pre_block_prompt: f64,
    pub t_stim_min: f64,
    pub t_stim_max: f64,
    /// Duration of one face rating scale.
    pub question_dur: f64,
    pub t_msi_min: f64,
    pub t_msi_max: f64,
    pub t_isi_min: f64,
    pub t_isi_max: f64,
    /// Fixation cross shown before each run.
    pub fix_cross_dur: f64,

    // Stimuli.
    pub image_dir: PathBuf,
    /// Selected without replacement per block, in randomized order.
    pub image_names: Vec<String>,

    // Prompt and question files.
    pub skip_prompts: bool,
    pub prompt_file_1: PathBuf,
    pub prompt_file_2: PathBuf,
    pub prompt_file_3: PathBuf,
    pub face_question_file: PathBuf,
    pub mood_question_file: PathBuf,
    /// Shown before the mood VAS (text, not a file).
    pub pre_vas_msg: String,

    // Response keys.
    pub keys: KeyMap,
    /// When true the face rating ends on the select key instead of
    /// running for `question_dur`.
    pub question_select_advances: bool,

    // Parallel port.
    pub send_port_events: bool,
    pub port_address: u16,
    pub code_baseline: u8,
    pub code_vas: u8,

    // Display.
    pub full_screen: bool,
    /// Fixation cross extent in pixels.
    pub fix_cross_size: f32,
    /// Face height as a fraction of screen height.
    pub face_height: f32,
    pub screen_color: [u8; 3],
    pub text_color: [u8; 3],
    /// Background behind the mood VAS and its prompt; ideally
    /// luminance-matched to `screen_color`.
    pub mood_vas_screen_color: [u8; 3],
    /// Marker movement per up/down keypress, in scale units (0..=100).
    pub vas_marker_step: f32,
    pub font_file: PathBuf,
}

impl Default for TaskParams {
    fn default() -> Self {
        Self {
            n_trials_per_block: 2,
            n_blocks_per_group: 2,
            n_groups_per_run: 1,
            n_runs: 2,
            t_baseline: 6.0,
            t_pre_block_prompt: 5.0,
            t_stim_min: 2.0,
            t_stim_max: 4.0,
            question_dur: 2.5,
            t_msi_min: 0.5,
            t_msi_max: 3.5,
            t_isi_min: 0.5,
            t_isi_max: 7.0,
            fix_cross_dur: 6.0,
            image_dir: PathBuf::from("assets/faces"),
            image_names: vec![
                "trainingface1.png".to_string(),
                "trainingface2.png".to_string(),
            ],
            skip_prompts: false,
            prompt_file_1: PathBuf::from("assets/prompts/training1.txt"),
            prompt_file_2: PathBuf::from("assets/prompts/training2.txt"),
            prompt_file_3: PathBuf::from("assets/prompts/training3.txt"),
            face_question_file: PathBuf::from("assets/questions/face_rating_scales.txt"),
            mood_question_file: PathBuf::from("assets/questions/mood_rating_scales.txt"),
            pre_vas_msg: "Let's do some rating scales.".to_string(),
            keys: KeyMap::default(),
            question_select_advances: false,
            send_port_events: true,
            port_address: 0xD050,
            code_baseline: 31,
            code_vas: 32,
            full_screen: true,
            fix_cross_size: 50.0,
            face_height: 0.9,
            screen_color: [120, 120, 120],
            text_color: [0, 0, 0],
            mood_vas_screen_color: [110, 110, 200],
            vas_marker_step: 2.0,
            font_file: PathBuf::from("assets/DejaVuSans.ttf"),
        }
    }
}

fn dur(secs: f64) -> Duration {
    Duration::from_secs_f64(secs)
}

impl TaskParams {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let params: TaskParams =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image_names.is_empty() {
            return Err(ConfigError::NoImages);
        }
        for (name, count) in [
            ("n_trials_per_block", self.n_trials_per_block),
            ("n_blocks_per_group", self.n_blocks_per_group),
            ("n_groups_per_run", self.n_groups_per_run),
            ("n_runs", self.n_runs),
        ] {
            if count == 0 {
                return Err(ConfigError::ZeroCount { name });
            }
        }
        for (name, min, max) in [
            ("stimulus duration", self.t_stim_min, self.t_stim_max),
            ("MSI", self.t_msi_min, self.t_msi_max),
            ("ISI", self.t_isi_min, self.t_isi_max),
        ] {
            if min > max {
                return Err(ConfigError::InvertedRange { name, min, max });
            }
            if min < 0.0 {
                return Err(ConfigError::NonPositiveDuration { name, value: min });
            }
        }
        for (name, value) in [
            ("question_dur", self.question_dur),
            ("t_pre_block_prompt", self.t_pre_block_prompt),
            ("fix_cross_dur", self.fix_cross_dur),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::NonPositiveDuration { name, value });
            }
        }
        // Image event codes occupy n_images * (block_type + 2) + code;
        // the fixed codes must sit above all of them.
        let max_image_code = self.max_image_code();
        for (name, code) in [
            ("code_baseline", self.code_baseline),
            ("code_vas", self.code_vas),
        ] {
            if code <= max_image_code {
                return Err(ConfigError::CodeCollision {
                    name,
                    code,
                    max_image_code,
                });
            }
        }
        Ok(())
    }

    /// Largest event code a face image or face rating can produce.
    pub fn max_image_code(&self) -> u8 {
        let n = self.image_names.len() as u32;
        let top_block = (self.n_blocks_per_group as u32).saturating_sub(1);
        (n * (top_block + 2) + n).min(u8::MAX as u32) as u8
    }

    pub fn image_paths(&self) -> Vec<PathBuf> {
        self.image_names
            .iter()
            .map(|name| self.image_dir.join(name))
            .collect()
    }

    pub fn stim_range(&self) -> (f64, f64) {
        (self.t_stim_min, self.t_stim_max)
    }

    pub fn msi_range(&self) -> (f64, f64) {
        (self.t_msi_min, self.t_msi_max)
    }

    pub fn isi_range(&self) -> (f64, f64) {
        (self.t_isi_min, self.t_isi_max)
    }

    pub fn pre_run_hold(&self) -> Duration {
        dur(self.fix_cross_dur) + dur(self.t_baseline)
    }

    pub fn pre_block_prompt_dur(&self) -> Duration {
        dur(self.t_pre_block_prompt)
    }

    pub fn question_duration(&self) -> Duration {
        dur(self.question_dur)
    }

    /// One `key: value` line per parameter, key-sorted, for the event
    /// log's startup dump.
    pub fn dump_lines(&self) -> Vec<String> {
        let value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        match value {
            // serde_json maps iterate key-sorted by default.
            serde_json::Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate() {
        TaskParams::default().validate().unwrap();
    }

    #[test]
    fn empty_image_list_is_fatal() {
        let params = TaskParams {
            image_names: Vec::new(),
            ..TaskParams::default()
        };
        assert!(matches!(params.validate(), Err(ConfigError::NoImages)));
    }

    #[test]
    fn inverted_stimulus_range_is_fatal() {
        let params = TaskParams {
            t_stim_min: 4.0,
            t_stim_max: 2.0,
            ..TaskParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::InvertedRange { .. })
        ));
    }

    #[test]
    fn fixed_codes_must_clear_image_codes() {
        // 2 images, 2 blocks: image codes reach 2*3+2 = 8; a baseline
        // code of 8 would be ambiguous.
        let params = TaskParams {
            code_baseline: 8,
            ..TaskParams::default()
        };
        assert_eq!(params.max_image_code(), 8);
        assert!(matches!(
            params.validate(),
            Err(ConfigError::CodeCollision { .. })
        ));
    }

    #[test]
    fn partial_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"n_trials_per_block": 3, "t_isi_max": 5.0}}"#).unwrap();
        let params = TaskParams::from_file(file.path()).unwrap();
        assert_eq!(params.n_trials_per_block, 3);
        assert_eq!(params.t_isi_max, 5.0);
        // Untouched fields keep their defaults.
        assert_eq!(params.n_blocks_per_group, 2);
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = TaskParams::from_file(Path::new("no/such/params.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn dump_lines_cover_every_parameter() {
        let lines = TaskParams::default().dump_lines();
        assert!(lines.iter().any(|l| l.starts_with("n_trials_per_block: ")));
        assert!(lines.iter().any(|l| l.starts_with("port_address: ")));
        // Key-sorted.
        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(lines, sorted);
    }
}
