use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use rbfe_atm::engine::progress::{Progress, ProgressCallback};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::warn;

#[derive(Debug)]
pub enum UiEvent {
    Progress(Progress),
    Log(String),
}

/// Renders workflow progress on stderr and interleaves log lines above it.
pub struct UiManager {
    mp: Arc<MultiProgress>,
    phase: PhaseDisplay,
    events: mpsc::Receiver<UiEvent>,
    shutdown: watch::Receiver<bool>,
    _anchor: ProgressBar,
}

/// Display state of the phase currently running.
#[derive(Default)]
struct PhaseDisplay {
    bar: Option<ProgressBar>,
    title: String,
    exchanges: ExchangeTally,
    missing_samples: usize,
}

#[derive(Default, Clone, Copy, Debug, PartialEq)]
struct ExchangeTally {
    accepted: usize,
    attempted: usize,
}

impl ExchangeTally {
    fn ratio(&self) -> Option<f64> {
        (self.attempted > 0).then(|| self.accepted as f64 / self.attempted as f64)
    }
}

impl PhaseDisplay {
    fn start(mp: &MultiProgress, title: &str) -> Self {
        let bar = mp.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(80));
        bar.set_style(spinner_style());
        bar.set_message(title.to_string());
        Self {
            bar: Some(bar),
            title: title.to_string(),
            ..Self::default()
        }
    }

    fn summary(&self) -> String {
        let mut line = format!("✓ {}", self.title);
        let mut notes = Vec::new();
        if let Some(ratio) = self.exchanges.ratio() {
            notes.push(format!("exchange acceptance {:.1}%", 100.0 * ratio));
        }
        if self.missing_samples > 0 {
            notes.push(format!("{} missing sample(s)", self.missing_samples));
        }
        if !notes.is_empty() {
            let _ = write!(line, " ({})", notes.join(", "));
        }
        line
    }

    fn clear(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl UiManager {
    pub fn new() -> (Self, mpsc::Sender<UiEvent>, watch::Sender<bool>) {
        let (event_sender, events) = mpsc::channel(1024);
        let (shutdown_sender, shutdown) = watch::channel(false);
        let mp = Arc::new(MultiProgress::new());
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
        let _anchor = mp.add(ProgressBar::hidden());
        let manager = Self {
            mp,
            phase: PhaseDisplay::default(),
            events,
            shutdown,
            _anchor,
        };

        (manager, event_sender, shutdown_sender)
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(event) = self.events.recv() => {
                    self.handle_event(event);
                }
                result = self.shutdown.changed() => {
                    if result.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        // Events sent right before shutdown still belong on screen.
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
        self.phase.clear();
        self._anchor.finish_and_clear();
    }

    fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Log(msg) => {
                self.mp.println(msg).ok();
            }
            UiEvent::Progress(progress) => self.handle_progress(progress),
        }
    }

    fn handle_progress(&mut self, progress: Progress) {
        match progress {
            Progress::PhaseStart { name } => {
                self.phase.clear();
                self.phase = PhaseDisplay::start(&self.mp, name);
            }
            Progress::PhaseFinish => {
                self.phase.clear();
                self.mp.println(self.phase.summary()).ok();
                self.phase = PhaseDisplay::default();
            }
            Progress::TaskStart { total_steps } => {
                if let Some(bar) = &self.phase.bar {
                    bar.disable_steady_tick();
                    bar.set_style(cycle_style());
                    bar.set_length(total_steps);
                    bar.set_position(0);
                }
            }
            Progress::TaskIncrement => {
                if let Some(bar) = &self.phase.bar {
                    bar.inc(1);
                }
            }
            Progress::TaskFinish => {
                if let Some(bar) = &self.phase.bar {
                    bar.finish();
                }
            }
            Progress::CycleComplete {
                cycle,
                failed_replicas,
                accepted_exchanges,
                attempted_exchanges,
            } => {
                self.phase.exchanges.accepted += accepted_exchanges;
                self.phase.exchanges.attempted += attempted_exchanges;
                self.phase.missing_samples += failed_replicas;
                if failed_replicas > 0 {
                    self.mp
                        .println(format!(
                            "  Cycle {}: {} replica(s) produced no sample",
                            cycle, failed_replicas
                        ))
                        .ok();
                }
                if let (Some(bar), Some(ratio)) = (&self.phase.bar, self.phase.exchanges.ratio()) {
                    bar.set_prefix(format!("acc {:>5.1}%", 100.0 * ratio));
                }
            }
            Progress::StatusUpdate { text } => {
                if let Some(bar) = &self.phase.bar {
                    bar.set_message(format!("{} ({})", self.phase.title, text));
                }
            }
            Progress::Message(msg) => {
                self.mp.println(format!("  {}", msg)).ok();
            }
        }
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg}")
        .expect("Invalid template")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}

/// Cycle bar of a production phase; the prefix carries the running
/// exchange acceptance.
fn cycle_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{msg:<40} [{bar:36.cyan/blue}] cycle {pos}/{len} {prefix} ({remaining})",
    )
    .expect("Invalid template")
    .with_key(
        "remaining",
        |state: &ProgressState, w: &mut dyn std::fmt::Write| {
            let secs = state.eta().as_secs();
            let _ = write!(w, "{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60);
        },
    )
    .progress_chars("━╸ ")
}

/// Bridges the library's progress callback onto the UI channel.
#[derive(Clone)]
pub struct CliProgressHandler {
    sender: mpsc::Sender<UiEvent>,
}

impl CliProgressHandler {
    pub fn new(sender: mpsc::Sender<UiEvent>) -> Self {
        Self { sender }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let sender = self.sender.clone();
        Box::new(move |progress: Progress| {
            if let Err(e) = sender.try_send(UiEvent::Progress(progress)) {
                warn!("Dropped progress update, UI channel unavailable: {}", e);
            }
        })
    }
}
