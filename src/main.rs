mod app;
mod ui;

use anyhow::Result;
use app::{poll_event, run_speed_test, App, AppAction};
use clap::Parser;
use crossterm::event::Event;
use fastspeed::settings::{self, FamilyPreference, Settings};
use fastspeed::speedtest::discovery::{FastComProvider, StaticProvider, UrlProvider};
use fastspeed::speedtest::{build_client, TestPhase, TestUpdate};
use fastspeed::{logging, measure_with};
use ratatui::DefaultTerminal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use ui::draw_ui;

#[derive(Parser, Debug)]
#[command(
    name = "fastspeed",
    about = "Estimate download bandwidth with parallel streams from fast.com",
    version
)]
struct Cli {
    /// Print the result in Mbps and exit instead of starting the UI
    #[arg(long)]
    plain: bool,

    /// Log per-sample diagnostics
    #[arg(short, long)]
    verbose: bool,

    /// Measurement window in seconds
    #[arg(long, value_name = "SECS")]
    max_time: Option<u64>,

    /// Reach the provider API over IPv4
    #[arg(short = '4', long = "ipv4", conflicts_with = "ipv6")]
    ipv4: bool,

    /// Reach the provider API over IPv6
    #[arg(short = '6', long = "ipv6")]
    ipv6: bool,

    /// Download from these URLs instead of asking fast.com (repeatable)
    #[arg(long = "url", value_name = "URL")]
    urls: Vec<String>,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) {
        settings.verbose |= self.verbose;
        if let Some(max_time) = self.max_time {
            settings.max_time_secs = max_time;
        }
        if self.ipv4 {
            settings.address_family = FamilyPreference::Ipv4;
        } else if self.ipv6 {
            settings.address_family = FamilyPreference::Ipv6;
        }
    }

    fn provider(&self) -> Result<Arc<dyn UrlProvider>> {
        if self.urls.is_empty() {
            Ok(Arc::new(FastComProvider::new(build_client()?)))
        } else {
            Ok(Arc::new(StaticProvider::new(self.urls.iter().map(String::as_str))))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.plain {
        logging::init_stderr_logging(cli.verbose);
    } else if let Err(e) = logging::init_file_logging(cli.verbose) {
        // No stderr fallback: the UI owns the terminal.
        eprintln!("logging disabled: {:#}", e);
    }

    let mut settings = settings::load_or_default();
    cli.apply(&mut settings);
    let provider = cli.provider()?;

    if cli.plain {
        let mbps = measure_with(
            provider.as_ref(),
            settings.measure_options(),
            settings.sampler_config(),
        )
        .await;
        println!("{:.1}", mbps);
        return Ok(());
    }

    let mut terminal = ratatui::init();
    terminal.clear()?;

    let result = run_app(&mut terminal, settings, provider).await;

    ratatui::restore();
    result
}

async fn run_app(
    terminal: &mut DefaultTerminal,
    settings: Settings,
    provider: Arc<dyn UrlProvider>,
) -> Result<()> {
    let mut app = App::new(settings);
    let mut test_rx: Option<mpsc::Receiver<TestUpdate>> = None;

    loop {
        terminal.draw(|frame| draw_ui(frame, &app))?;

        // Handle test updates
        if let Some(rx) = test_rx.as_mut() {
            loop {
                match rx.try_recv() {
                    Ok(update) => app.handle_update(update),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        if app.phase != TestPhase::Idle {
                            app.complete_test();
                        }
                        test_rx = None;
                        break;
                    }
                }
            }
        }

        // Handle input
        if let Some(Event::Key(key)) = poll_event(Duration::from_millis(30))? {
            if let Some(action) = app.handle_key_event(key) {
                match action {
                    AppAction::Quit => break,
                    AppAction::StartTest => {
                        app.reset_for_new_test();
                        app.phase = TestPhase::Discovering;

                        let (tx, rx) = mpsc::channel(32);
                        let (cancel_tx, cancel_rx) = mpsc::channel(1);

                        app.set_cancel_tx(cancel_tx);
                        test_rx = Some(rx);

                        let settings = app.settings.clone();
                        let provider = Arc::clone(&provider);
                        tokio::spawn(async move {
                            if let Err(e) = run_speed_test(tx, cancel_rx, settings, provider).await {
                                tracing::warn!("speed test task failed: {:#}", e);
                            }
                        });
                    }
                    AppAction::CancelTest => {
                        app.cancel_test();
                        test_rx = None;
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
