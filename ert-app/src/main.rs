mod app;
mod render;

use anyhow::{Context, Result};
use app::App;
use clap::Parser;
use ert_core::{SessionRecord, StimulusSet};
use ert_port::{EventPort, NullPort, ParallelPort};
use ert_task::plan::SessionAssets;
use ert_task::prompts::{load_prompt_file, load_question_file};
use ert_task::{build_session, EventLog, TaskEngine, TaskParams};
use ert_timing::MonotonicClock;
use rand::rngs::StdRng;
use rand::SeedableRng;
use render::RenderStyle;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Extinction-recall face rating task for the scanner.
#[derive(Parser, Debug)]
#[command(name = "ert", version)]
struct Cli {
    /// Subject identifier, used in output file names.
    #[arg(long)]
    subject: String,

    /// Session number.
    #[arg(long, default_value_t = 1)]
    session: u32,

    /// Parameter file (JSON); missing fields take their defaults.
    #[arg(long)]
    params: Option<PathBuf>,

    /// Directory for the event log and session record.
    #[arg(long, default_value = "data")]
    out_dir: PathBuf,

    /// Skip instruction pages (piloting only).
    #[arg(long)]
    skip_prompts: bool,

    /// Do not open the parallel port; event codes go to the log only.
    #[arg(long)]
    no_port: bool,

    /// Run in a window instead of fullscreen (piloting only).
    #[arg(long)]
    windowed: bool,

    /// Fixed randomization seed, for reproducing a session plan.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut params = match &cli.params {
        Some(path) => TaskParams::from_file(path)?,
        None => TaskParams::default(),
    };
    params.skip_prompts |= cli.skip_prompts;
    if cli.no_port {
        params.send_port_events = false;
    }
    if cli.windowed {
        params.full_screen = false;
    }
    params.validate()?;

    // Asset problems must surface before the window opens.
    for path in params.image_paths().iter().chain([&params.font_file]) {
        std::fs::metadata(path)
            .with_context(|| format!("missing asset {}", path.display()))?;
    }

    let stimuli = StimulusSet::from_paths(params.image_paths());
    let face_questions = load_question_file(&params.face_question_file)?;
    let mood_questions = load_question_file(&params.mood_question_file)?;
    let prompts_1 = load_prompt_file(&params.prompt_file_1)?;
    let prompts_2 = load_prompt_file(&params.prompt_file_2)?;
    let prompts_3 = load_prompt_file(&params.prompt_file_3)?;

    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let screens = build_session(
        &params,
        &SessionAssets {
            stimuli: &stimuli,
            face_questions: &face_questions,
            mood_questions: &mood_questions,
            prompts_1: &prompts_1,
            prompts_2: &prompts_2,
            prompts_3: &prompts_3,
        },
        &mut rng,
    )?;
    info!(screens = screens.len(), "session plan built");

    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let base = format!("ExtinctionRecall-{}-{}-{}", cli.subject, cli.session, stamp);
    let log_path = cli.out_dir.join(format!("{base}.log"));
    let record_path = cli.out_dir.join(format!("{base}.json"));

    let mut log = EventLog::to_file(&log_path)
        .with_context(|| format!("cannot create event log {}", log_path.display()))?;
    log.param_dump(Duration::ZERO, &params.dump_lines());
    info!(path = %log_path.display(), "event log open");

    let port: Box<dyn EventPort> = if params.send_port_events {
        Box::new(
            ParallelPort::open(params.port_address).with_context(|| {
                format!("cannot open parallel port at {:#06x}", params.port_address)
            })?,
        )
    } else {
        Box::new(NullPort)
    };

    let engine = TaskEngine::new(
        screens,
        MonotonicClock::new(),
        port,
        log,
        SessionRecord::new(cli.subject.clone(), cli.session),
        params.vas_marker_step,
    );

    let style = RenderStyle {
        font_file: params.font_file.clone(),
        face_paths: params.image_paths(),
        task_bg: params.screen_color,
        mood_bg: params.mood_vas_screen_color,
        text_color: params.text_color,
        fix_cross_size: params.fix_cross_size,
        face_height: params.face_height,
        prepped_key: params.keys.prepped_key,
    };

    App::new(
        engine,
        params.keys.clone(),
        style,
        record_path,
        params.full_screen,
    )
    .run()
}
