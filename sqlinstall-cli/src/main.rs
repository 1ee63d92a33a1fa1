//! Command-line front end for sqlinstall.
//!
//! Reads a JSON configuration (by default `sqlinstall.json` in the current directory), applies
//! command-line overrides, and installs or upgrades the configured database while printing
//! progress.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use sqlinstall::{Installer, MigrationConfig, PreparedInstall, ProgressEvent, ProgressKind};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "sqlinstall.json";
const DEFAULT_CONNECTION_STRING_ENV: &str = "SQLINSTALL_CONNECTION_STRING";

#[derive(Parser, Debug)]
#[command(name = "sqlinstall", version)]
#[command(about = "Install or upgrade a SQL database from folders of scripts")]
struct CliArgs {
    /// JSON configuration file [default: sqlinstall.json]
    config: Option<PathBuf>,

    /// Name of the database to install or upgrade
    #[arg(long)]
    database: Option<String>,

    /// Connection string for the dialect's driver
    #[arg(long)]
    connection_string: Option<String>,

    /// Environment variable to read the connection string from
    #[arg(long, default_value = DEFAULT_CONNECTION_STRING_ENV)]
    connection_string_env: String,

    /// Dialect name, e.g. sqlite, postgres, mysql
    #[arg(long)]
    dialect: Option<String>,

    /// Directory holding the Install and Upgrade folders [default: the config file's directory]
    #[arg(long)]
    script_root: Option<PathBuf>,

    /// Create the database if it does not exist
    #[arg(long)]
    create: bool,

    /// Never create the database, even if the config file asks for it
    #[arg(long, conflicts_with = "create")]
    no_create: bool,

    /// Drop the database first and install from scratch
    #[arg(long)]
    drop: bool,

    /// Re-apply the scripts of the currently recorded version
    #[arg(long)]
    retry: bool,

    /// Report every script and log at info level
    #[arg(long)]
    verbose: bool,

    /// Report sections only, even if the config file asks for verbose output
    #[arg(long, conflicts_with = "verbose")]
    quiet: bool,

    /// Exit non-zero when any script fails
    #[arg(long)]
    exit_code: bool,

    /// Upgrade without asking for confirmation
    #[arg(long)]
    no_prompt: bool,
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_tracing(args.verbose);

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(args: CliArgs) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let env_connection_string = std::env::var(&args.connection_string_env).ok();
    let config = load_config(&args, env_connection_string)?;
    let options = config.options;

    let prepared = Installer::new(config).prepare()?;
    if !confirm_install(&prepared, &mut io::stdin().lock())? {
        return Ok(ExitCode::SUCCESS);
    }

    let handle = prepared.spawn();
    let mut printer = ProgressPrinter::default();
    loop {
        let event = handle.poll();
        printer.print(&event);
        if event.kind == ProgressKind::Exit {
            break;
        }
    }
    let result = handle.join()?;

    if result.errors > 0 {
        println!("{} script(s) failed.", result.errors);
    }
    if let Some(record) = &result.recorded {
        println!("Database is at version {}.", record.version);
    }

    if options.exit_code_on_error && result.errors > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Read the configuration file and apply command-line overrides.
///
/// A missing default file means "configure everything from flags"; a missing file named on the
/// command line is an error.
fn load_config(
    args: &CliArgs,
    env_connection_string: Option<String>,
) -> Result<MigrationConfig, Box<dyn std::error::Error>> {
    let path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut config = if path.is_file() {
        tracing::debug!(path = %path.display(), "Loading configuration");
        let text = std::fs::read_to_string(&path)?;
        serde_json::from_str::<MigrationConfig>(&text)
            .map_err(|e| format!("Invalid configuration in {}: {}", path.display(), e))?
    } else if args.config.is_some() {
        return Err(format!("Configuration file {} not found", path.display()).into());
    } else {
        MigrationConfig::default()
    };

    let config_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if let Some(root) = &args.script_root {
        config.script_root = root.clone();
    } else if config.script_root.as_os_str().is_empty() {
        config.script_root = config_dir.to_path_buf();
    } else if config.script_root.is_relative() {
        config.script_root = config_dir.join(&config.script_root);
    }

    if let Some(database) = &args.database {
        config.database = database.clone();
    }
    if let Some(dialect) = &args.dialect {
        config.dialect.name = dialect.clone();
    }
    if let Some(connection_string) = args.connection_string.clone().or(env_connection_string) {
        config.connection_string = connection_string;
    }

    let options = &mut config.options;
    options.create |= args.create;
    options.drop |= args.drop;
    options.retry |= args.retry;
    options.verbose |= args.verbose;
    options.exit_code_on_error |= args.exit_code;
    options.no_prompt |= args.no_prompt;
    if args.no_create {
        options.create = false;
    }
    if args.quiet {
        options.verbose = false;
    }

    Ok(config)
}

/// Report what is about to happen and, for an upgrade of an existing database, ask first.
/// Returns whether to go ahead.
fn confirm_install(
    prepared: &PreparedInstall,
    input: &mut impl BufRead,
) -> Result<bool, Box<dyn std::error::Error>> {
    let options = prepared.options();
    if !prepared.exists() || options.drop {
        return Ok(true);
    }

    let upgraded_by = prepared.upgraded_by().unwrap_or("unknown");
    if prepared.is_current() && !options.retry {
        println!(
            "Database {} is already at version {} (upgraded by {}).",
            prepared.database(),
            prepared.current_version(),
            upgraded_by
        );
        return Ok(false);
    }
    if options.no_prompt || prepared.clean_install() {
        return Ok(true);
    }

    print!(
        "Upgrade database {} from version {} to {} ({} scripts)? [y/N] ",
        prepared.database(),
        prepared.current_version(),
        prepared.target_version(),
        prepared.scripts_total()
    );
    io::stdout().flush()?;
    Ok(read_yes(input)?)
}

fn read_yes(input: &mut impl BufRead) -> io::Result<bool> {
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Prints progress events as they arrive, keeping percentages on one updating line.
#[derive(Default)]
struct ProgressPrinter {
    on_progress_line: bool,
}

impl ProgressPrinter {
    fn print(&mut self, event: &ProgressEvent) {
        if let Some(line) = render(event) {
            if self.on_progress_line {
                println!();
                self.on_progress_line = false;
            }
            println!("{}", line);
        } else if event.kind == ProgressKind::Progress {
            print!("\r  {:>3}%", event.percent);
            let _ = io::stdout().flush();
            self.on_progress_line = true;
        }
    }
}

/// The line printed for an event, or `None` for events without one.
fn render(event: &ProgressEvent) -> Option<String> {
    match event.kind {
        ProgressKind::Start => Some(format!("{}...", event.message)),
        ProgressKind::Detail => Some(format!("  {}", event.message)),
        ProgressKind::Complete if !event.message.is_empty() => Some(event.message.clone()),
        ProgressKind::Exit if !event.message.is_empty() => Some(event.message.clone()),
        ProgressKind::Complete | ProgressKind::Exit => None,
        ProgressKind::Progress | ProgressKind::Running => None,
    }
}
