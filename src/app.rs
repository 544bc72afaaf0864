use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use fastspeed::settings::{Settings, SettingsField};
use fastspeed::speedtest::discovery::{UrlProvider, MAX_URLS};
use fastspeed::speedtest::sampler::ThroughputSample;
use fastspeed::speedtest::{SpeedTest, TestPhase, TestUpdate, TestUrl};
use fastspeed::BandwidthEstimate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppView {
    Main,
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Throughput,
    Streams,
}

impl Panel {
    pub fn next(self) -> Self {
        match self {
            Panel::Throughput => Panel::Streams,
            Panel::Streams => Panel::Throughput,
        }
    }

    pub fn prev(self) -> Self {
        // Two panels: same as next.
        self.next()
    }
}

pub struct App {
    pub phase: TestPhase,
    pub estimate: Option<BandwidthEstimate>,
    pub failure: Option<String>,
    pub should_quit: bool,

    // UI state
    pub view: AppView,
    pub selected_panel: Panel,
    pub expanded: bool,

    // Settings
    pub settings: Settings,
    pub selected_setting: SettingsField,

    // Run state
    pub urls: Vec<TestUrl>,
    pub progress: f64,
    pub samples: Vec<f64>,
    pub peak_mbps: f64,
    pub per_stream: Vec<u64>,

    cancel_tx: Option<mpsc::Sender<()>>,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        Self {
            phase: TestPhase::Idle,
            estimate: None,
            failure: None,
            should_quit: false,
            view: AppView::Main,
            selected_panel: Panel::Throughput,
            expanded: false,
            settings,
            selected_setting: SettingsField::MaxTime,
            urls: Vec::new(),
            progress: 0.0,
            samples: Vec::new(),
            peak_mbps: 0.0,
            per_stream: Vec::new(),
            cancel_tx: None,
        }
    }

    fn is_running(&self) -> bool {
        matches!(self.phase, TestPhase::Discovering | TestPhase::Measuring)
    }

    pub fn handle_key_event(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        if key.kind != KeyEventKind::Press {
            return None;
        }

        match self.view {
            AppView::Main => self.handle_main_key(key),
            AppView::Settings => self.handle_settings_key(key),
        }
    }

    fn handle_main_key(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                Some(AppAction::Quit)
            }
            KeyCode::Char('s') => {
                if !self.is_running() {
                    self.view = AppView::Settings;
                }
                None
            }
            KeyCode::Enter => {
                if self.expanded {
                    self.expanded = false;
                    None
                } else if !self.is_running() {
                    Some(AppAction::StartTest)
                } else {
                    self.expanded = true;
                    None
                }
            }
            KeyCode::Esc => {
                if self.expanded {
                    self.expanded = false;
                    None
                } else if self.is_running() {
                    Some(AppAction::CancelTest)
                } else {
                    None
                }
            }
            KeyCode::Tab | KeyCode::Right | KeyCode::Char('j') => {
                if !self.expanded {
                    self.selected_panel = self.selected_panel.next();
                }
                None
            }
            KeyCode::BackTab | KeyCode::Left | KeyCode::Char('k') => {
                if !self.expanded {
                    self.selected_panel = self.selected_panel.prev();
                }
                None
            }
            KeyCode::Char(' ') => {
                self.expanded = !self.expanded;
                None
            }
            _ => None,
        }
    }

    fn handle_settings_key(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc | KeyCode::Enter => {
                self.view = AppView::Main;
                None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected_setting = self.selected_setting.prev();
                None
            }
            KeyCode::Down | KeyCode::Char('j') | KeyCode::Tab => {
                self.selected_setting = self.selected_setting.next();
                None
            }
            KeyCode::Left | KeyCode::Char('h') => {
                self.decrease_setting();
                None
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.increase_setting();
                None
            }
            _ => None,
        }
    }

    fn increase_setting(&mut self) {
        let step = self.settings.sample_interval_secs.max(1);
        match self.selected_setting {
            SettingsField::MaxTime => {
                self.settings.max_time_secs = (self.settings.max_time_secs + step).min(120);
            }
            SettingsField::AddressFamily => {
                self.settings.address_family = self.settings.address_family.next();
            }
            SettingsField::StreamCount => {
                self.settings.url_count = (self.settings.url_count + 1).min(MAX_URLS);
            }
        }
    }

    fn decrease_setting(&mut self) {
        let step = self.settings.sample_interval_secs.max(1);
        match self.selected_setting {
            SettingsField::MaxTime => {
                self.settings.max_time_secs =
                    self.settings.max_time_secs.saturating_sub(step).max(step);
            }
            SettingsField::AddressFamily => {
                self.settings.address_family = self.settings.address_family.prev();
            }
            SettingsField::StreamCount => {
                self.settings.url_count = self.settings.url_count.saturating_sub(1).max(1);
            }
        }
    }

    pub fn reset_for_new_test(&mut self) {
        self.phase = TestPhase::Idle;
        self.estimate = None;
        self.failure = None;
        self.urls.clear();
        self.progress = 0.0;
        self.samples.clear();
        self.peak_mbps = 0.0;
        self.per_stream.clear();
        self.expanded = false;
    }

    pub fn handle_update(&mut self, update: TestUpdate) {
        match update {
            TestUpdate::Discovered { urls } => {
                self.per_stream = vec![0; urls.len()];
                self.urls = urls;
                self.phase = TestPhase::Measuring;
            }
            TestUpdate::Sample(sample) => self.record_sample(sample),
            TestUpdate::Complete { estimate } => {
                self.estimate = Some(estimate);
                self.progress = 1.0;
                self.complete_test();
            }
            TestUpdate::Failed { reason } => {
                self.failure = Some(reason);
                self.estimate = Some(BandwidthEstimate::ZERO);
                self.complete_test();
            }
        }
    }

    fn record_sample(&mut self, sample: ThroughputSample) {
        let mbps = sample.mbps();
        self.samples.push(mbps);
        self.peak_mbps = self.peak_mbps.max(mbps);
        self.per_stream = sample.per_stream;
        if sample.iterations > 0 {
            self.progress = f64::from(sample.index + 1) / f64::from(sample.iterations);
        }
    }

    pub fn complete_test(&mut self) {
        self.phase = TestPhase::Complete;
    }

    pub fn set_cancel_tx(&mut self, tx: mpsc::Sender<()>) {
        self.cancel_tx = Some(tx);
    }

    pub fn cancel_test(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.try_send(());
        }
        self.phase = TestPhase::Idle;
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AppAction {
    Quit,
    StartTest,
    CancelTest,
}

pub async fn run_speed_test(
    update_tx: mpsc::Sender<TestUpdate>,
    mut cancel_rx: mpsc::Receiver<()>,
    settings: Settings,
    provider: Arc<dyn UrlProvider>,
) -> Result<()> {
    let (progress_tx, mut progress_rx) = mpsc::channel::<TestUpdate>(32);
    let test = SpeedTest::new(settings.measure_options(), settings.sampler_config())
        .with_progress(progress_tx);
    let test_handle = tokio::spawn(async move { test.run(provider.as_ref()).await });

    loop {
        tokio::select! {
            _ = cancel_rx.recv() => {
                test_handle.abort();
                return Ok(());
            }
            progress = progress_rx.recv() => match progress {
                Some(update) => {
                    let _ = update_tx.send(update).await;
                }
                None => break,
            },
        }
    }

    let final_update = match test_handle.await? {
        Ok(estimate) => TestUpdate::Complete { estimate },
        Err(e) => TestUpdate::Failed {
            reason: e.to_string(),
        },
    };
    let _ = update_tx.send(final_update).await;

    Ok(())
}

pub fn poll_event(timeout: Duration) -> Result<Option<Event>> {
    if event::poll(timeout)? {
        Ok(Some(event::read()?))
    } else {
        Ok(None)
    }
}
