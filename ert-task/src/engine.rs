use crate::log::EventLog;
use ert_core::{
    AdvanceKey, Content, HoldPolicy, KeyRole, RatingRecord, RatingSample, Screen, SessionRecord,
};
use ert_port::EventPort;
use ert_timing::{Clock, FlipScheduler};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Completed,
    /// User pressed the cancel key mid-session. Always fatal to the
    /// run; an aborted scan session is simply abandoned.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Running,
    Finished(EndReason),
}

/// Marker state of the rating scale currently on screen.
#[derive(Debug, Clone)]
struct RatingState {
    value: f32,
    onset: Duration,
    last_action: Option<Duration>,
    history: Vec<RatingSample>,
}

impl RatingState {
    fn new(onset: Duration) -> Self {
        Self {
            value: 50.0,
            onset,
            last_action: None,
            history: vec![RatingSample {
                value: 50.0,
                t_s: onset.as_secs_f64(),
            }],
        }
    }

    fn nudge(&mut self, delta: f32, now: Duration) {
        self.value = (self.value + delta).clamp(0.0, 100.0);
        self.last_action = Some(now);
        self.history.push(RatingSample {
            value: self.value,
            t_s: now.as_secs_f64(),
        });
    }

    fn touch(&mut self, now: Duration) {
        self.last_action = Some(now);
    }
}

/// Drives the session's screen sequence against the flip deadline.
///
/// The engine is passive: the frame loop calls `tick` once per redraw
/// and routes key presses to `handle_key`. A screen transition is a
/// single commit — boundary markers logged, port code written,
/// transition logged, deadline advanced by the new screen's hold — so
/// the hardware code is coupled to the same instant that reschedules
/// the display. Commits only happen once the previous deadline has
/// passed; key-released screens reset the deadline to now instead, so
/// dialog and response latency never becomes timing debt.
pub struct TaskEngine<C: Clock, P: EventPort> {
    clock: C,
    port: P,
    scheduler: FlipScheduler,
    screens: Vec<Screen>,
    current: Option<usize>,
    rating: Option<RatingState>,
    log: EventLog,
    record: SessionRecord,
    marker_step: f32,
    state: EngineState,
}

impl<C: Clock, P: EventPort> TaskEngine<C, P> {
    pub fn new(
        screens: Vec<Screen>,
        clock: C,
        port: P,
        log: EventLog,
        record: SessionRecord,
        marker_step: f32,
    ) -> Self {
        Self {
            clock,
            port,
            scheduler: FlipScheduler::new(),
            screens,
            current: None,
            rating: None,
            log,
            record,
            marker_step,
            state: EngineState::Running,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, EngineState::Finished(_))
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        match self.state {
            EngineState::Finished(reason) => Some(reason),
            EngineState::Running => None,
        }
    }

    pub fn current_screen(&self) -> Option<&Screen> {
        self.current.map(|i| &self.screens[i])
    }

    /// Marker position of the rating scale on screen, if one is up.
    pub fn rating_value(&self) -> Option<f32> {
        self.rating.as_ref().map(|r| r.value)
    }

    pub fn session_record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn deadline(&self) -> Duration {
        self.scheduler.deadline()
    }

    /// Advances the session if the current screen's hold has elapsed.
    /// At most one commit per call; called once per redraw, which makes
    /// the frame interval the effective polling resolution.
    pub fn tick(&mut self) {
        if self.is_finished() {
            return;
        }
        let now = self.clock.now();
        match self.current {
            None => {
                if self.scheduler.is_due(now) {
                    self.commit(0);
                }
            }
            Some(i) => {
                if matches!(self.screens[i].hold, HoldPolicy::For(_))
                    && self.scheduler.is_due(now)
                {
                    self.advance_screen();
                }
            }
        }
    }

    pub fn handle_key(&mut self, role: KeyRole) {
        if self.is_finished() {
            return;
        }
        let Some(i) = self.current else {
            if role == KeyRole::Cancel {
                self.cancel();
            }
            return;
        };

        if role == KeyRole::Cancel {
            // The end page is closed with the same keys; that is the
            // normal way out, not an abort.
            if matches!(self.screens[i].content, Content::End) {
                self.finish_completed();
            } else {
                self.cancel();
            }
            return;
        }

        match self.screens[i].hold {
            HoldPolicy::UntilKey(req) => {
                let released = match req {
                    AdvanceKey::Any => true,
                    AdvanceKey::ExperimenterReady => role == KeyRole::ExperimenterReady,
                    AdvanceKey::ScannerTrigger => role == KeyRole::ScannerTrigger,
                    // Only the cancel-class keys close the end page.
                    AdvanceKey::Exit => false,
                };
                if released {
                    self.scheduler.reset_to_now(&self.clock);
                    self.advance_screen();
                }
            }
            HoldPolicy::UntilSelect => match role {
                KeyRole::RatingUp => self.nudge_rating(self.marker_step),
                KeyRole::RatingDown => self.nudge_rating(-self.marker_step),
                KeyRole::RatingSelect => {
                    let now = self.clock.now();
                    if let Some(r) = self.rating.as_mut() {
                        r.touch(now);
                    }
                    // No duration was scheduled, so no timing debt to
                    // carry: restart the deadline from here.
                    self.scheduler.reset_to_now(&self.clock);
                    self.advance_screen();
                }
                _ => {}
            },
            HoldPolicy::For(_) => {
                if self.screens[i].is_rating() {
                    match role {
                        KeyRole::RatingUp => self.nudge_rating(self.marker_step),
                        KeyRole::RatingDown => self.nudge_rating(-self.marker_step),
                        KeyRole::RatingSelect => {
                            let now = self.clock.now();
                            if let Some(r) = self.rating.as_mut() {
                                r.touch(now);
                            }
                        }
                        _ => {}
                    }
                }
                // Time-held non-rating screens ignore task keys.
            }
        }
    }

    fn nudge_rating(&mut self, delta: f32) {
        let now = self.clock.now();
        if let Some(r) = self.rating.as_mut() {
            r.nudge(delta, now);
        }
    }

    fn advance_screen(&mut self) {
        if let Some(r) = self.rating.take() {
            self.store_rating(r);
        }
        let next = self.current.map_or(0, |i| i + 1);
        if next >= self.screens.len() {
            self.finish_completed();
            return;
        }
        self.commit(next);
    }

    fn commit(&mut self, i: usize) {
        let now = self.clock.now();
        self.current = Some(i);
        let screen = self.screens[i].clone();

        for marker in &screen.markers {
            self.log.log(now, marker);
        }
        if let Some(code) = screen.port_code {
            self.port.set(code);
            self.log.log(now, &format!("set port to {code}"));
        }
        self.log.log(now, &screen.label);
        debug!(t = now.as_secs_f64(), label = %screen.label, "commit");

        if let HoldPolicy::For(d) = screen.hold {
            self.scheduler.advance(d);
        }
        if screen.is_rating() {
            self.rating = Some(RatingState::new(now));
        }
    }

    fn store_rating(&mut self, r: RatingState) {
        let Some(i) = self.current else { return };
        if let Content::Rating { name, question, .. } = &self.screens[i].content {
            self.record.ratings.push(RatingRecord {
                name: name.clone(),
                question: question.clone(),
                rating: r.value,
                decision_ms: r
                    .last_action
                    .map(|t| t.saturating_sub(r.onset).as_secs_f64() * 1000.0),
                history: r.history,
                t_onset_s: r.onset.as_secs_f64(),
            });
        }
    }

    fn cancel(&mut self) {
        if let Some(r) = self.rating.take() {
            self.store_rating(r);
        }
        let now = self.clock.now();
        self.log.log(now, "---SESSION TERMINATED BY USER---");
        warn!(t = now.as_secs_f64(), "session terminated by user");
        self.record.completed = false;
        self.state = EngineState::Finished(EndReason::Cancelled);
    }

    fn finish_completed(&mut self) {
        let now = self.clock.now();
        self.log.log(now, "---SESSION COMPLETE---");
        info!(t = now.as_secs_f64(), "session complete");
        self.record.completed = true;
        self.state = EngineState::Finished(EndReason::Completed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemoryLogHandle;
    use ert_core::{Background, FixationKind};
    use ert_port::RecordingPort;
    use ert_timing::ManualClock;

    fn fixation(kind: FixationKind, secs: f64, code: u8) -> Screen {
        Screen::new(
            Content::Fixation { kind },
            HoldPolicy::For(Duration::from_secs_f64(secs)),
            "Display Fixation",
        )
        .with_port(code)
    }

    fn face(secs: f64, code: u8) -> Screen {
        Screen::new(
            Content::Face {
                path: "faces/f1.jpg".into(),
                name: "CSplus-1".into(),
            },
            HoldPolicy::For(Duration::from_secs_f64(secs)),
            "Display faces/f1.jpg CSplus-1",
        )
        .with_port(code)
    }

    fn rating(hold: HoldPolicy) -> Screen {
        Screen::new(
            Content::Rating {
                name: "ImageRating".into(),
                question: "How anxious?".into(),
                anchors: vec!["Not at all".into(), "Extremely".into()],
            },
            hold,
            "Display ImageRating",
        )
    }

    fn engine(
        screens: Vec<Screen>,
    ) -> (
        TaskEngine<ManualClock, RecordingPort>,
        ManualClock,
        RecordingPort,
        MemoryLogHandle,
    ) {
        let clock = ManualClock::new();
        let port = RecordingPort::new();
        let (log, handle) = EventLog::memory();
        let engine = TaskEngine::new(
            screens,
            clock.clone(),
            port.clone(),
            log,
            SessionRecord::new("1", 1),
            2.0,
        );
        (engine, clock, port, handle)
    }

    #[test]
    fn commits_never_precede_the_deadline() {
        let screens = vec![fixation(FixationKind::PreRun, 2.0, 31), face(1.0, 1)];
        let (mut eng, clock, port, _log) = engine(screens);

        eng.tick();
        assert!(matches!(
            eng.current_screen().unwrap().content,
            Content::Fixation { .. }
        ));
        assert_eq!(port.codes(), vec![31]);

        // 1.999 s in, the fixation's 2 s hold has not elapsed.
        clock.advance(Duration::from_millis(1999));
        eng.tick();
        assert_eq!(port.codes(), vec![31]);

        clock.advance(Duration::from_millis(1));
        eng.tick();
        assert!(matches!(
            eng.current_screen().unwrap().content,
            Content::Face { .. }
        ));
        assert_eq!(port.codes(), vec![31, 1]);
    }

    #[test]
    fn key_released_screens_reset_the_deadline() {
        let screens = vec![
            Screen::new(
                Content::ScannerWait,
                HoldPolicy::UntilKey(AdvanceKey::ScannerTrigger),
                "Display WaitingForScanner",
            ),
            fixation(FixationKind::PreRun, 6.0, 31),
        ];
        let (mut eng, clock, _port, _log) = engine(screens);
        eng.tick();

        // The trigger arrives 100 s in; the fixation's hold must count
        // from the trigger, not from the stale deadline.
        clock.advance(Duration::from_secs(100));
        eng.handle_key(KeyRole::Other); // wrong key, still waiting
        assert!(matches!(
            eng.current_screen().unwrap().content,
            Content::ScannerWait
        ));
        eng.handle_key(KeyRole::ScannerTrigger);
        assert!(matches!(
            eng.current_screen().unwrap().content,
            Content::Fixation { .. }
        ));
        assert_eq!(eng.deadline(), Duration::from_secs(106));
    }

    #[test]
    fn consecutive_holds_accumulate_without_drift() {
        let screens = vec![
            fixation(FixationKind::PreRun, 2.0, 31),
            face(1.5, 1),
            fixation(FixationKind::Msi, 0.5, 0),
        ];
        let (mut eng, clock, _port, _log) = engine(screens);
        eng.tick();

        // Tick late: the frame loop is 7 ms behind the deadline. The
        // next deadline still advances from the previous deadline, so
        // lateness does not compound.
        clock.advance(Duration::from_millis(2007));
        eng.tick();
        assert_eq!(eng.deadline(), Duration::from_millis(3500));
        clock.advance(Duration::from_millis(1500));
        eng.tick();
        assert_eq!(eng.deadline(), Duration::from_millis(4000));
    }

    #[test]
    fn cancellation_logs_exactly_one_termination_entry() {
        let screens = vec![fixation(FixationKind::PreRun, 5.0, 31), face(1.0, 1)];
        let (mut eng, clock, _port, log) = engine(screens);
        eng.tick();
        clock.advance(Duration::from_secs(1));

        eng.handle_key(KeyRole::Cancel);
        assert_eq!(eng.end_reason(), Some(EndReason::Cancelled));

        // Further input and ticks are inert.
        eng.handle_key(KeyRole::Cancel);
        clock.advance(Duration::from_secs(60));
        eng.tick();
        eng.handle_key(KeyRole::ScannerTrigger);

        assert_eq!(log.lines_matching("TERMINATED BY USER"), 1);
        assert!(!eng.session_record().completed);
    }

    #[test]
    fn timed_rating_records_marker_history() {
        let screens = vec![
            rating(HoldPolicy::For(Duration::from_secs_f64(2.5))),
            fixation(FixationKind::Isi, 1.0, 0),
        ];
        let (mut eng, clock, _port, _log) = engine(screens);
        eng.tick();
        assert_eq!(eng.rating_value(), Some(50.0));

        clock.advance(Duration::from_millis(400));
        eng.handle_key(KeyRole::RatingUp);
        eng.handle_key(KeyRole::RatingUp);
        clock.advance(Duration::from_millis(300));
        eng.handle_key(KeyRole::RatingDown);
        assert_eq!(eng.rating_value(), Some(52.0));

        // Scale runs its full duration regardless of input.
        clock.advance(Duration::from_millis(1300));
        eng.tick();
        assert!(eng.rating_value().is_some());

        clock.advance(Duration::from_millis(501));
        eng.tick();
        assert!(eng.rating_value().is_none());

        let rec = &eng.session_record().ratings[0];
        assert_eq!(rec.rating, 52.0);
        let latency = rec.decision_ms.unwrap();
        assert!((latency - 700.0).abs() < 1e-6, "latency {latency}");
        // Onset sample plus three movements.
        assert_eq!(rec.history.len(), 4);
        assert_eq!(rec.t_onset_s, 0.0);
    }

    #[test]
    fn select_ended_rating_resets_deadline() {
        let screens = vec![
            rating(HoldPolicy::UntilSelect),
            fixation(FixationKind::Isi, 1.0, 0),
        ];
        let (mut eng, clock, _port, _log) = engine(screens);
        eng.tick();

        clock.advance(Duration::from_secs(30));
        eng.handle_key(KeyRole::RatingDown);
        eng.handle_key(KeyRole::RatingSelect);

        let rec = &eng.session_record().ratings[0];
        assert_eq!(rec.rating, 48.0);
        assert_eq!(rec.decision_ms, Some(30_000.0));
        // Deadline restarted at the select, then advanced by the ISI.
        assert_eq!(eng.deadline(), Duration::from_secs(31));
    }

    #[test]
    fn untouched_rating_has_no_decision_latency() {
        let screens = vec![
            rating(HoldPolicy::For(Duration::from_secs(1))),
            fixation(FixationKind::Isi, 1.0, 0),
        ];
        let (mut eng, clock, _port, _log) = engine(screens);
        eng.tick();
        clock.advance(Duration::from_millis(1001));
        eng.tick();

        let rec = &eng.session_record().ratings[0];
        assert_eq!(rec.rating, 50.0);
        assert_eq!(rec.decision_ms, None);
    }

    #[test]
    fn end_page_closes_as_completion_not_abort() {
        let screens = vec![Screen::new(
            Content::End,
            HoldPolicy::UntilKey(AdvanceKey::Exit),
            "Display TheEnd",
        )];
        let (mut eng, _clock, _port, log) = engine(screens);
        eng.tick();

        eng.handle_key(KeyRole::Other); // ignored on the end page
        assert!(!eng.is_finished());
        eng.handle_key(KeyRole::Cancel);
        assert_eq!(eng.end_reason(), Some(EndReason::Completed));
        assert_eq!(log.lines_matching("TERMINATED"), 0);
        assert!(eng.session_record().completed);
    }

    #[test]
    fn markers_are_logged_before_the_transition() {
        let screens = vec![fixation(FixationKind::PreRun, 1.0, 31)
            .with_marker("===== START RUN 1/2 =====")];
        let (mut eng, _clock, _port, log) = engine(screens);
        eng.tick();

        let text = log.contents();
        let run_pos = text.find("START RUN").unwrap();
        let fix_pos = text.find("Display Fixation").unwrap();
        assert!(run_pos < fix_pos);
    }

    #[test]
    fn mood_screens_expose_their_background() {
        let screens = vec![rating(HoldPolicy::UntilSelect).on_mood_background()];
        let (mut eng, _clock, _port, _log) = engine(screens);
        eng.tick();
        assert_eq!(eng.current_screen().unwrap().background, Background::Mood);
    }
}
