pub mod engine;
pub mod log;
pub mod params;
pub mod plan;
pub mod prompts;

pub use engine::{EndReason, EngineState, TaskEngine};
pub use log::EventLog;
pub use params::{ConfigError, TaskParams};
pub use plan::build_session;
pub use prompts::{load_prompt_file, load_question_file, PromptError, PromptPage, Question};
