use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Layout},
    Terminal,
};
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use monit_doctor::app::export_report;
use monit_doctor::config::DEFAULT_CONFIG_FILE;
use monit_doctor::data::duration::format_duration;
use monit_doctor::poll::spawn_poll_loop;
use monit_doctor::{
    events, ui, App, ChannelSource, CycleReport, FileSource, HttpFetcher, InstanceConfig,
    PanelSource, Poller, Settings, VisibilityPolicy,
};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "MONIT_DOCTOR_LOG";

/// How often a status file is checked for changes.
const FILE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// How often the poll channel is checked for a new cycle.
const CHANNEL_CHECK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "monit-doctor")]
#[command(about = "Terminal status panel for one or more Monit daemons")]
struct Args {
    /// Configuration file (defaults to ./monit-doctor.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Show a saved status document instead of polling
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Interval between polling cycles (e.g., "30s", "5m"), overriding the config
    #[arg(short, long)]
    refresh: Option<String>,

    /// Run a single cycle, print it as JSON and exit
    #[arg(long)]
    once: bool,

    /// Run a single cycle, write it to a JSON file and exit
    #[arg(short, long)]
    export: Option<PathBuf>,

    /// Write logs to this file while the panel is open
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let interactive = !args.once && args.export.is_none();
    init_logging(interactive, args.log_file.as_deref())?;

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(refresh) = args.refresh.clone() {
        settings.refresh = refresh;
        settings.validate()?;
    }

    if !interactive {
        let report = match args.file {
            Some(ref path) => read_file_once(path, &settings)?,
            None => poll_once(&settings)?,
        };
        return output_report(&report, args.export.as_deref());
    }

    match args.file {
        Some(ref path) => run_with_file(path, &settings),
        None => run_with_poller(&settings),
    }
}

/// Route logs to stderr for one-shot runs. While the panel owns the
/// terminal, logs go to `log_file` or are discarded.
fn init_logging(interactive: bool, log_file: Option<&Path>) -> Result<()> {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("monit_doctor=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match (interactive, log_file) {
        (_, Some(path)) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        (true, None) => builder.with_writer(io::sink).try_init(),
        (false, None) => builder.with_writer(io::stderr).try_init(),
    };
    result.map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

fn ensure_instances(settings: &Settings) -> Result<()> {
    if settings.groups().is_empty() {
        bail!(
            "No enabled instances configured. Add [[instances]] to {} or use --file",
            DEFAULT_CONFIG_FILE
        );
    }
    Ok(())
}

fn build_poller(settings: &Settings, groups: Vec<Vec<InstanceConfig>>) -> Result<Poller> {
    let fetcher = HttpFetcher::new(settings.request_timeout()?)?;
    Ok(Poller::new(
        Arc::new(fetcher),
        groups,
        settings.aggregate_options(),
        settings.stagger_delay()?,
    ))
}

/// Run one cycle over every enabled instance, ignoring grouping.
fn poll_once(settings: &Settings) -> Result<CycleReport> {
    ensure_instances(settings)?;
    let all = settings.groups().into_iter().flatten().collect();
    let mut poller = build_poller(settings, vec![all])?;

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(poller.run_cycle())?;
    Ok(report)
}

fn read_file_once(path: &Path, settings: &Settings) -> Result<CycleReport> {
    let mut source = FileSource::new(path).with_options(settings.aggregate_options());
    match source.poll() {
        Some(outcome) => Ok(outcome?),
        None => bail!(
            "{}",
            source.error().unwrap_or("Status file could not be read")
        ),
    }
}

fn output_report(report: &CycleReport, export: Option<&Path>) -> Result<()> {
    for failure in report.failures() {
        warn!(instance = failure.id(), "Instance failed");
    }

    match export {
        Some(path) => {
            export_report(report, path)?;
            println!("Exported cycle to: {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}

/// Run the panel on a status file
fn run_with_file(path: &Path, settings: &Settings) -> Result<()> {
    let source = FileSource::new(path).with_options(settings.aggregate_options());
    run_tui(Box::new(source), settings.visibility(), FILE_CHECK_INTERVAL)
}

/// Run the panel on the background poll loop
fn run_with_poller(settings: &Settings) -> Result<()> {
    ensure_instances(settings)?;
    let groups = settings.groups();
    let instance_count: usize = groups.iter().map(Vec::len).sum();
    let poller = build_poller(settings, groups)?;
    let interval = settings.refresh_interval()?;

    // The runtime keeps polling on its worker threads while the TUI owns
    // the main thread.
    let rt = tokio::runtime::Runtime::new()?;
    let _guard = rt.enter();

    let refresh = Arc::new(Notify::new());
    let description = format!(
        "{} instances, every {}",
        instance_count,
        format_duration(interval)
    );
    let (tx, source) = ChannelSource::create(&description);
    let source = source.with_refresh(Arc::clone(&refresh));
    let handle = spawn_poll_loop(poller, interval, tx, refresh);
    info!(
        instances = instance_count,
        interval = %format_duration(interval),
        "Poll loop started"
    );

    let result = run_tui(Box::new(source), settings.visibility(), CHANNEL_CHECK_INTERVAL);

    // Signal shutdown
    handle.abort();

    result
}

/// Run the TUI with the given panel source
fn run_tui(
    source: Box<dyn PanelSource>,
    visibility: VisibilityPolicy,
    check_interval: Duration,
) -> Result<()> {
    // Detect the theme before raw mode takes over the terminal
    let mut app = App::new(source, visibility);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Setup panic hook to restore terminal
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        original_hook(panic);
    }));

    app.reload_data();

    // Run the main loop
    let result = run_app(&mut terminal, &mut app, check_interval);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    check_interval: Duration,
) -> Result<()> {
    let mut last_check = Instant::now();

    // Minimum terminal size for usable display
    const MIN_WIDTH: u16 = 60;
    const MIN_HEIGHT: u16 = 16;

    while app.running {
        terminal.draw(|frame| {
            let area = frame.area();

            if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
                let msg = format!(
                    "Terminal too small: {}x{}\nMinimum: {}x{}\n\nResize to continue",
                    area.width, area.height, MIN_WIDTH, MIN_HEIGHT
                );
                let paragraph = ratatui::widgets::Paragraph::new(msg)
                    .alignment(ratatui::layout::Alignment::Center)
                    .style(ratatui::style::Style::default().fg(app.theme.unmonitored));
                let top = (area.height / 2).saturating_sub(2);
                let centered =
                    ratatui::layout::Rect::new(0, top, area.width, 5u16.min(area.height - top));
                frame.render_widget(paragraph, centered);
                return;
            }

            let chunks = Layout::vertical([
                Constraint::Length(1), // Header bar
                Constraint::Length(1), // Instance tabs
                Constraint::Min(12),   // Instance panel
                Constraint::Length(1), // Status bar
            ])
            .split(area);

            ui::common::render_header(frame, app, chunks[0]);
            ui::common::render_tabs(frame, app, chunks[1]);
            ui::panel::render(frame, app, chunks[2]);
            ui::common::render_status_bar(frame, app, chunks[3]);

            if app.show_help {
                ui::common::render_help(frame, app, area);
            }
        })?;

        if let Some(event) = events::poll_event(Duration::from_millis(100))? {
            match event {
                Event::Key(key) => events::handle_key_event(app, key),
                Event::Mouse(mouse) => events::handle_mouse_event(app, mouse),
                Event::Resize(_, _) => {
                    // Terminal will redraw on next iteration
                }
                _ => {}
            }
        }

        if last_check.elapsed() >= check_interval {
            app.reload_data();
            last_check = Instant::now();
        }
    }

    Ok(())
}
