//! aegis - security operations dashboard
//!
//! Runs audits, scans, hardening and maintenance tasks against the local
//! host through one safe execution layer:
//! - Environment detection (OS, distro, package manager, privileges)
//! - Simulation on anything that is not Linux, or on request
//! - Timeouts, privilege escalation, backups before edits
//!
//! Usage: aegis [--help] [--version] [--detect] [--run <id>] [--list]

mod app;
mod config;
mod logging;
mod modules;
mod security;
mod system;
mod tasks;
mod types;
mod ui;

use anyhow::{bail, Context, Result};
use app::App;
use config::Config;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use security::Operation;
use std::io::stdout;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use system::{CommandExecutor, CommandRunner, EnvironmentDetector, EnvironmentProfile, SimulationMode};
use tasks::TaskRunner;
use tracing::{info, warn};

/// Environment variable that forces simulation when set to `1`
const SIMULATE_ENV: &str = "AEGIS_SIMULATE";

/// What the command line asked for
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Help,
    Version,
    List,
    Detect,
    Run(String),
    Dashboard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Args {
    command: Command,
    json: bool,
    simulate: bool,
    force_real: bool,
    debug: bool,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args {
        command: Command::Dashboard,
        json: false,
        simulate: false,
        force_real: false,
        debug: false,
    };

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => parsed.command = Command::Help,
            "-v" | "--version" => parsed.command = Command::Version,
            "--list" => parsed.command = Command::List,
            "--detect" => parsed.command = Command::Detect,
            "--run" => {
                let id = iter.next().context("--run needs an operation id (see --list)")?;
                parsed.command = Command::Run(id.clone());
            }
            "--json" => parsed.json = true,
            "--simulate" => parsed.simulate = true,
            "--force-real" => parsed.force_real = true,
            "--debug" => parsed.debug = true,
            other => bail!("Unknown argument: {} (see --help)", other),
        }
        if matches!(parsed.command, Command::Help | Command::Version) {
            break;
        }
    }

    if parsed.simulate && parsed.force_real {
        bail!("--simulate and --force-real cannot be combined");
    }
    Ok(parsed)
}

/// Environment beats flags, flags beat the config file
fn resolve_mode(configured: SimulationMode, args: &Args, env: Option<&str>) -> SimulationMode {
    if env.map(str::trim) == Some("1") {
        SimulationMode::Simulate
    } else if args.simulate {
        SimulationMode::Simulate
    } else if args.force_real {
        SimulationMode::ForceReal
    } else {
        configured
    }
}

fn main() {
    let argv: Vec<String> = std::env::args().collect();

    let code = match parse_args(&argv).and_then(run) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

fn run(args: Args) -> Result<i32> {
    match &args.command {
        Command::Help => {
            print_help();
            return Ok(0);
        }
        Command::Version => {
            println!("aegis {}", env!("CARGO_PKG_VERSION"));
            return Ok(0);
        }
        Command::List => {
            print_operations();
            return Ok(0);
        }
        _ => {}
    }

    let config_path = Config::path().ok();
    let config = match &config_path {
        Some(path) => Config::load_from(path).context("Failed to load configuration")?,
        None => Config::default(),
    };

    let headless = args.command != Command::Dashboard;
    let directive = logging::filter_directive(
        std::env::var(logging::LOG_ENV).ok().as_deref(),
        args.debug,
        &config.log_level,
    );
    let target = if headless {
        logging::LogTarget::Stderr
    } else {
        logging::LogTarget::File
    };
    if let Err(e) = logging::init(&directive, target) {
        // Logging is not worth refusing to start over
        eprintln!("Warning: {:#}", e);
    }

    let mode = resolve_mode(
        config.simulation,
        &args,
        std::env::var(SIMULATE_ENV).ok().as_deref(),
    );
    let profile = Arc::new(EnvironmentDetector::new().detect(mode));
    info!("Environment: {} (requested mode: {})", profile.summary(), mode.as_str());

    match args.command {
        Command::Detect => {
            print_profile(&profile, args.json)?;
            Ok(0)
        }
        Command::Run(id) => run_headless(&id, args.json, config, profile),
        _ => {
            run_dashboard(config, profile, config_path)?;
            Ok(0)
        }
    }
}

fn build_tasks(config: &Config, profile: Arc<EnvironmentProfile>) -> TaskRunner {
    let runner: Arc<dyn CommandRunner> = Arc::new(CommandExecutor::new(config.simulated_delay()));
    TaskRunner::new(runner, profile, Arc::new(config.clone()))
}

fn print_profile(profile: &EnvironmentProfile, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(profile)?);
        return Ok(());
    }
    println!("OS:                  {}", profile.os_kind().as_str());
    println!(
        "Distribution:        {}",
        if profile.distro_id().is_empty() { "-" } else { profile.distro_id() }
    );
    println!(
        "Package manager:     {}",
        profile.package_manager().map_or("none", |pm| pm.as_str())
    );
    println!("Privileged:          {}", profile.is_privileged());
    println!("Elevation available: {}", profile.elevation_available());
    println!("Simulated:           {}", profile.is_simulated());
    Ok(())
}

fn print_operations() {
    for category in security::Category::ALL {
        println!("{}:", category.as_str());
        for op in category.operations() {
            let marker = if op.is_destructive() { " (changes the system)" } else { "" };
            println!("  {:<12} {}{}", op.id(), op.label(), marker);
        }
    }
}

fn run_headless(id: &str, json: bool, config: Config, profile: Arc<EnvironmentProfile>) -> Result<i32> {
    let Some(operation) = Operation::from_id(id) else {
        bail!("Unknown operation '{}' (see --list)", id);
    };

    let mut tasks = build_tasks(&config, profile);
    let rx = tasks.start(operation)?;
    let report = rx
        .recv()
        .context("Operation worker exited without a report")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(if report.succeeded() { 0 } else { 1 })
}

fn print_help() {
    println!(
        r#"aegis - security operations dashboard

USAGE:
    aegis [OPTIONS]
    aegis --run <OPERATION> [--json]

OPTIONS:
    -h, --help         Print help information
    -v, --version      Print version information
    --list             List operation ids
    --detect           Print the detected environment and exit
    --run <id>         Run one operation without the dashboard
    --json             JSON output for --detect and --run
    --simulate         Never touch the system, only describe commands
    --force-real       Execute for real even if the config says simulate
    --debug            Debug logging

KEYBINDINGS:
    j/k, arrows        Navigate
    Enter              Run (destructive operations ask first, y to confirm)
    c                  Cancel after the current command
    K                  Also request termination (recorded in the report)
    PgUp/PgDn          Scroll output
    t                  Cycle theme
    q                  Quit

ENVIRONMENT:
    AEGIS_SIMULATE=1   Force simulation
    AEGIS_LOG          Log filter, e.g. "debug" or "aegis=trace"

Anything other than Linux always runs in simulation.

CONFIG:
    ~/.config/aegis/config.toml
"#
    );
}

fn run_dashboard(config: Config, profile: Arc<EnvironmentProfile>, config_path: Option<PathBuf>) -> Result<()> {
    let tasks = build_tasks(&config, profile);
    let mut app = App::new(config, tasks, config_path);

    // Setup terminal
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture).context("Failed to setup terminal")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("Failed to create terminal")?;

    // Install panic handler so terminal is restored on panic
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(std::io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        let _ = execute!(std::io::stdout(), crossterm::cursor::Show);
        original_hook(info);
    }));

    let result = main_loop(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)
        .context("Failed to restore terminal")?;
    terminal.show_cursor().context("Failed to show cursor")?;

    if app.operations.is_running() {
        warn!("Exited while an operation was still running");
    }
    result
}

fn main_loop<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|frame| {
            ui::render(frame, app);
        })?;

        // Pick up finished operations, expire flash messages
        app.update_timers()?;

        // Poll with a timeout so the spinner keeps moving
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key)?;
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("aegis")
            .chain(args.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_help_does_not_panic() {
        print_help();
        print_operations();
    }

    #[test]
    fn test_no_args_opens_dashboard() {
        let args = parse_args(&argv(&[])).unwrap();
        assert_eq!(args.command, Command::Dashboard);
        assert!(!args.json && !args.simulate && !args.debug);
    }

    #[test]
    fn test_run_with_flags() {
        let args = parse_args(&argv(&["--run", "lynis", "--json", "--simulate"])).unwrap();
        assert_eq!(args.command, Command::Run("lynis".to_string()));
        assert!(args.json);
        assert!(args.simulate);
    }

    #[test]
    fn test_bad_args_are_rejected() {
        assert!(parse_args(&argv(&["--run"])).is_err());
        assert!(parse_args(&argv(&["--frobnicate"])).is_err());
        assert!(parse_args(&argv(&["--simulate", "--force-real"])).is_err());
    }

    #[test]
    fn test_mode_precedence() {
        let mut args = parse_args(&argv(&["--force-real"])).unwrap();
        assert_eq!(resolve_mode(SimulationMode::Auto, &args, None), SimulationMode::ForceReal);
        // The environment switch wins over everything
        assert_eq!(resolve_mode(SimulationMode::Auto, &args, Some("1")), SimulationMode::Simulate);

        args.force_real = false;
        assert_eq!(resolve_mode(SimulationMode::Simulate, &args, Some("0")), SimulationMode::Simulate);
        args.simulate = true;
        assert_eq!(resolve_mode(SimulationMode::ForceReal, &args, None), SimulationMode::Simulate);
    }
}
