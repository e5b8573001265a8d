//! gtt-sidebar - desktop sidebar widget host
//!
//! CLI entry point for running the host and managing its documents.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use settingsstore::{NOTES_DOC, SETTINGS_DOC, SHORTCUTS_DOC, SettingsStore};
use sidebar::Host;
use sidebar::cli::{Cli, Command, OutputFormat, SettingsCommand, ShortcutsCommand, get_log_path};
use sidebar::config::Config;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Run { ticks }) => cmd_run(&config, ticks).await,
        Some(Command::Widgets) => cmd_widgets(&config),
        Some(Command::Settings { command }) => match command {
            SettingsCommand::Show { format } => cmd_settings_show(&config, format),
            SettingsCommand::Path => cmd_settings_path(&config),
            SettingsCommand::Reset => cmd_settings_reset(&config),
            SettingsCommand::Backup => cmd_settings_backup(&config),
        },
        Some(Command::Shortcuts { command }) => match command {
            ShortcutsCommand::List => cmd_shortcuts_list(&config),
            ShortcutsCommand::Add { label, path, icon } => cmd_shortcuts_add(&config, &label, &path, &icon),
            ShortcutsCommand::Remove { id } => cmd_shortcuts_remove(&config, &id),
        },
        None => {
            debug!("main: no command specified, running host");
            cmd_run(&config, None).await
        }
    }
}

fn store_for(config: &Config) -> SettingsStore {
    match &config.data_dir {
        Some(dir) => SettingsStore::new(dir),
        None => SettingsStore::default_location(),
    }
}

async fn cmd_run(config: &Config, ticks: Option<u64>) -> Result<()> {
    debug!(?ticks, "cmd_run: called");
    let host = Host::new(config);
    host.run(ticks).await
}

fn cmd_widgets(config: &Config) -> Result<()> {
    debug!("cmd_widgets: called");
    let host = Host::new(config);
    for entry in host.layout() {
        let rank = if entry.rank == sidebar::lifecycle::UNRANKED {
            "-".to_string()
        } else {
            entry.rank.to_string()
        };
        println!(
            "{:>3}  {:<16} {:<7} {}",
            rank,
            entry.name.bold(),
            entry.phase.to_string().dimmed(),
            entry.metadata.description
        );
        if !entry.metadata.dependencies.is_empty() {
            let needs = format!("needs: {}", entry.metadata.dependencies.join(", "));
            println!("     {}", needs.dimmed());
        }
    }
    Ok(())
}

fn cmd_settings_show(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_settings_show: called");
    let settings = store_for(config).load_settings().context("Failed to load settings")?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&settings)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&settings)?),
        OutputFormat::Text => {
            let window = &settings.window;
            let monitor = &settings.system_monitor;
            println!("{}", "Window".bold());
            println!("  position: {}", window.position);
            println!("  width: {}", window.width);
            println!(
                "  margins: top {} / bottom {} / side {}",
                window.margin_top, window.margin_bottom, window.margin_side
            );
            println!("{}", "System Monitor".bold());
            println!("  cpu-threshold: {}%", monitor.cpu_threshold);
            println!("  ram-threshold: {}%", monitor.ram_threshold);
            println!("  ping-threshold: {}ms", monitor.ping_threshold);
            println!("  update-frequency: {}s", monitor.update_frequency_seconds);
            println!("{}", "Weather".bold());
            println!("  location: {}", settings.weather.location);
            let key = if settings.weather.api_key.is_empty() {
                "(not set)".red().to_string()
            } else {
                "(set)".green().to_string()
            };
            println!("  api-key: {}", key);
            println!("  refresh: {}m", settings.weather.refresh_minutes);
            println!("{}", "Stocks".bold());
            println!("  symbols: {}", settings.stocks.symbols.join(", "));
            println!("  refresh: {}m", settings.stocks.refresh_minutes);
        }
    }
    Ok(())
}

fn cmd_settings_path(config: &Config) -> Result<()> {
    debug!("cmd_settings_path: called");
    let store = store_for(config);
    println!("{}", store.dir().display());
    for name in [SETTINGS_DOC, SHORTCUTS_DOC, NOTES_DOC] {
        println!("  {}", store.document_path(name).display());
    }
    let log: PathBuf = get_log_path();
    println!("Logs are written to: {}", log.display());
    Ok(())
}

fn cmd_settings_reset(config: &Config) -> Result<()> {
    debug!("cmd_settings_reset: called");
    store_for(config).reset_settings().context("Failed to reset settings")?;
    println!("{}", "Settings restored to defaults".green());
    Ok(())
}

fn cmd_settings_backup(config: &Config) -> Result<()> {
    debug!("cmd_settings_backup: called");
    match store_for(config)
        .backup_document(SETTINGS_DOC)
        .context("Failed to back up settings")?
    {
        Some(path) => println!("Backed up to {}", path.display()),
        None => println!("No settings document to back up"),
    }
    Ok(())
}

fn cmd_shortcuts_list(config: &Config) -> Result<()> {
    debug!("cmd_shortcuts_list: called");
    let data = store_for(config).load_shortcuts().context("Failed to load shortcuts")?;
    if data.shortcuts.is_empty() {
        println!("No shortcuts");
        return Ok(());
    }
    for item in &data.shortcuts {
        println!(
            "{:>2}  {:<20} {:<40} {}",
            item.order,
            item.label.bold(),
            item.path,
            item.id.dimmed()
        );
    }
    Ok(())
}

fn cmd_shortcuts_add(config: &Config, label: &str, path: &str, icon: &str) -> Result<()> {
    debug!(%label, %path, "cmd_shortcuts_add: called");
    let store = store_for(config);
    let mut data = store.load_shortcuts().context("Failed to load shortcuts")?;
    let item = data.add_shortcut(label, path, "builtin", icon);
    if !item.is_valid() {
        eyre::bail!("'{}' is not a launchable target", path);
    }
    store.save_shortcuts(&data).context("Failed to save shortcuts")?;
    println!("Added {} ({})", item.label.green(), item.id);
    Ok(())
}

fn cmd_shortcuts_remove(config: &Config, id: &str) -> Result<()> {
    debug!(%id, "cmd_shortcuts_remove: called");
    let store = store_for(config);
    let mut data = store.load_shortcuts().context("Failed to load shortcuts")?;
    if !data.remove_shortcut(id) {
        eyre::bail!("No shortcut with id {}", id);
    }
    store.save_shortcuts(&data).context("Failed to save shortcuts")?;
    println!("Removed {}", id);
    Ok(())
}
