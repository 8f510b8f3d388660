use crate::params::{ConfigError, TaskParams};
use crate::prompts::{PromptPage, Question};
use ert_core::{
    AdvanceKey, Content, FaceStimulus, FixationKind, HoldPolicy, Screen, StimulusSet,
};
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;

/// Everything loaded from disk that the plan needs besides the
/// parameter table.
pub struct SessionAssets<'a> {
    pub stimuli: &'a StimulusSet,
    pub face_questions: &'a [Question],
    pub mood_questions: &'a [Question],
    pub prompts_1: &'a [PromptPage],
    pub prompts_2: &'a [PromptPage],
    pub prompts_3: &'a [PromptPage],
}

/// Accumulates screens; boundary markers attach to whichever screen is
/// pushed next, so "END BLOCK" lines land just before the following
/// transition — the order the run log expects.
struct PlanBuilder {
    screens: Vec<Screen>,
    pending_markers: Vec<String>,
}

impl PlanBuilder {
    fn new() -> Self {
        Self {
            screens: Vec::new(),
            pending_markers: Vec::new(),
        }
    }

    fn mark(&mut self, marker: String) {
        self.pending_markers.push(marker);
    }

    fn push(&mut self, mut screen: Screen) {
        screen.markers.extend(self.pending_markers.drain(..));
        self.screens.push(screen);
    }
}

fn sample(rng: &mut impl Rng, (min, max): (f64, f64)) -> Duration {
    Duration::from_secs_f64(rng.random_range(min..=max))
}

/// Image/code/name triples permuted as units: whatever position a face
/// lands in, its code and name travel with it.
pub fn shuffled_faces(stimuli: &StimulusSet, rng: &mut impl Rng) -> Vec<FaceStimulus> {
    let mut faces = stimuli.faces().to_vec();
    faces.shuffle(rng);
    faces
}

/// Expands parameters and loaded assets into the complete screen
/// sequence of one session. All randomization happens here, with
/// independent draws per run: block order reshuffled per run, triples
/// reshuffled per block, every stimulus/MSI/ISI duration sampled fresh.
pub fn build_session(
    params: &TaskParams,
    assets: &SessionAssets<'_>,
    rng: &mut impl Rng,
) -> Result<Vec<Screen>, ConfigError> {
    if assets.face_questions.len() < params.n_blocks_per_group {
        return Err(ConfigError::FaceQuestionCount {
            needed: params.n_blocks_per_group,
            got: assets.face_questions.len(),
        });
    }
    if params.n_trials_per_block > assets.stimuli.len() {
        return Err(ConfigError::NotEnoughImages {
            trials: params.n_trials_per_block,
            images: assets.stimuli.len(),
        });
    }

    let mut b = PlanBuilder::new();
    b.mark("---START EXPERIMENT---".to_string());

    if !params.skip_prompts {
        push_instructions(&mut b, assets.prompts_1, "Instruction1");
    }
    push_mood_vas(&mut b, params, assets.mood_questions);
    if !params.skip_prompts {
        push_instructions(&mut b, assets.prompts_2, "Instruction2");
    }

    for run in 0..params.n_runs {
        build_run(&mut b, params, assets, run, rng);
        // Comprehension-check prompts between the two runs.
        if run + 1 < params.n_runs && !params.skip_prompts {
            push_instructions(&mut b, assets.prompts_3, "Instruction3");
        }
    }

    b.mark("---END EXPERIMENT---".to_string());
    b.push(Screen::new(
        Content::End,
        HoldPolicy::UntilKey(AdvanceKey::Exit),
        "Display TheEnd",
    ));

    Ok(b.screens)
}

fn push_instructions(b: &mut PlanBuilder, pages: &[PromptPage], label_base: &str) {
    for (i, page) in pages.iter().enumerate() {
        b.push(Screen::new(
            Content::Instruction {
                top: page.top.clone(),
                bottom: page.bottom.clone(),
            },
            HoldPolicy::UntilKey(AdvanceKey::Any),
            format!("Display {}-{}", label_base, i + 1),
        ));
    }
}

fn push_mood_vas(b: &mut PlanBuilder, params: &TaskParams, questions: &[Question]) {
    if !params.skip_prompts {
        b.push(
            Screen::new(
                Content::Instruction {
                    top: params.pre_vas_msg.clone(),
                    bottom: "Press any button to continue.".to_string(),
                },
                HoldPolicy::UntilKey(AdvanceKey::Any),
                "Display PreVasPrompt",
            )
            .on_mood_background(),
        );
    }
    for (i, q) in questions.iter().enumerate() {
        let mut screen = Screen::new(
            Content::Rating {
                name: "MoodVas".to_string(),
                question: q.text.clone(),
                anchors: q.anchors.clone(),
            },
            HoldPolicy::UntilSelect,
            format!("Display MoodVas-{}", i + 1),
        )
        .on_mood_background();
        // One marker code for the whole mood VAS, latched at its onset.
        if i == 0 {
            screen = screen.with_port(params.code_vas);
        }
        b.push(screen);
    }
}

fn build_run(
    b: &mut PlanBuilder,
    params: &TaskParams,
    assets: &SessionAssets<'_>,
    run: usize,
    rng: &mut impl Rng,
) {
    let n_images = assets.stimuli.len() as u8;
    let n_blocks = params.n_blocks_per_group;

    b.push(Screen::new(
        Content::ScannerPrep,
        HoldPolicy::UntilKey(AdvanceKey::ExperimenterReady),
        "Display WaitingForPrep",
    ));
    b.push(Screen::new(
        Content::ScannerWait,
        HoldPolicy::UntilKey(AdvanceKey::ScannerTrigger),
        "Display WaitingForScanner",
    ));

    b.mark(format!("===== START RUN {}/{} =====", run + 1, params.n_runs));
    b.push(
        Screen::new(
            Content::Fixation {
                kind: FixationKind::PreRun,
            },
            HoldPolicy::For(params.pre_run_hold()),
            "Display Fixation",
        )
        .with_port(params.code_baseline),
    );

    let mut block_order: Vec<usize> = (0..n_blocks).collect();
    block_order.shuffle(rng);

    for group in 0..params.n_groups_per_run {
        b.mark(format!(
            "==== START GROUP {}/{} ====",
            group + 1,
            params.n_groups_per_run
        ));

        for (i_block, &block_type) in block_order.iter().enumerate() {
            b.mark(format!(
                "=== START BLOCK {}/{} TYPE {} ===",
                i_block + 1,
                n_blocks,
                block_type
            ));

            let faces = shuffled_faces(assets.stimuli, rng);
            let question = &assets.face_questions[block_type];

            b.push(Screen::new(
                Content::BlockPrompt {
                    question: question.text.to_uppercase(),
                },
                HoldPolicy::For(params.pre_block_prompt_dur()),
                format!("Display PreBlockPrompt{block_type}"),
            ));

            for trial in 0..params.n_trials_per_block {
                let face = &faces[trial];

                let stim_dur = sample(rng, params.stim_range());
                b.push(
                    Screen::new(
                        Content::Face {
                            path: face.path.clone(),
                            name: face.name.clone(),
                        },
                        HoldPolicy::For(stim_dur),
                        format!("Display {} {}", face.path.display(), face.name),
                    )
                    .with_port(n_images * block_type as u8 + face.code),
                );

                b.push(
                    Screen::new(
                        Content::Fixation {
                            kind: FixationKind::Msi,
                        },
                        HoldPolicy::For(sample(rng, params.msi_range())),
                        "Display Fixation",
                    )
                    .with_port(0),
                );

                let rating_hold = if params.question_select_advances {
                    HoldPolicy::UntilSelect
                } else {
                    HoldPolicy::For(params.question_duration())
                };
                b.push(
                    Screen::new(
                        Content::Rating {
                            name: "ImageRating".to_string(),
                            question: question.text.clone(),
                            anchors: question.anchors.clone(),
                        },
                        rating_hold,
                        "Display ImageRating",
                    )
                    .with_port(n_images * (block_type as u8 + 2) + face.code),
                );

                if trial + 1 < params.n_trials_per_block {
                    b.push(
                        Screen::new(
                            Content::Fixation {
                                kind: FixationKind::Isi,
                            },
                            HoldPolicy::For(sample(rng, params.isi_range())),
                            "Display Fixation",
                        )
                        .with_port(0),
                    );
                }
            }

            b.mark(format!(
                "=== END BLOCK {}/{} TYPE {} ===",
                i_block + 1,
                n_blocks,
                block_type
            ));
        }

        b.mark(format!(
            "==== END GROUP {}/{} ====",
            group + 1,
            params.n_groups_per_run
        ));
    }

    b.mark(format!("===== END RUN {}/{} =====", run + 1, params.n_runs));
}
