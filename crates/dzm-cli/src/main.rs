//! DayZ mod XML merger CLI
//!
//! Command-line tool for discovering mod XML files and merging them into
//! mission `types.xml`, `cfgeventspawns.xml` and `spawnabletypes.xml`.

use clap::{Parser, Subcommand, ValueEnum};
use dzm_core::config::DEFAULT_CONFIG_FILE;
use dzm_core::history::restore_last;
use dzm_core::pipeline::{discover_sources, GroupOutcome};
use dzm_core::template::{defaults_for, events_document, types_document, FALLBACK_CATEGORY};
use dzm_core::{
    classify_path, extract, run_batch, run_discovered, Classification, DestinationGroup,
    DestinationRegistry, Error, GroupStatus, HistoryFile, MergeConfig, MissionPaths,
    PipelineOptions, RunReport, SchemaKind, SourceSet,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "dzm")]
#[command(about = "DayZ mod XML merger", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Replace an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Discover mods and list the XML files found in them
    Scan {
        /// Mod directories to scan instead of the configured search paths
        #[arg(long = "mod")]
        mods: Vec<PathBuf>,
    },

    /// Classify and extract a single XML file
    Classify {
        /// Path to the XML file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Merge mod XML files into a mission
    Merge {
        /// Mission to merge into (defaults to the active mission)
        #[arg(long, conflicts_with = "all")]
        mission: Option<String>,

        /// Merge into every configured mission
        #[arg(long)]
        all: bool,

        /// Mod directories to merge instead of the configured search paths
        #[arg(long = "mod")]
        mods: Vec<PathBuf>,

        /// Replace existing entries with the mod's version
        #[arg(long)]
        overwrite: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Manage configured missions
    Missions {
        #[command(subcommand)]
        action: MissionAction,
    },

    /// Generate default entries for class names and merge them
    Add {
        /// Item category whose defaults to use (weapons, vehicles, items)
        #[arg(long, default_value = FALLBACK_CATEGORY)]
        category: String,

        /// Class names to add
        #[arg(required = true)]
        classnames: Vec<String>,

        /// Also add a spawn event for each class
        #[arg(long)]
        vehicle_events: bool,

        /// Mission to add to (defaults to the active mission)
        #[arg(long)]
        mission: Option<String>,

        /// Replace existing entries
        #[arg(long)]
        overwrite: bool,
    },

    /// Show committed merges
    History {
        /// Only show this mission
        #[arg(long)]
        mission: Option<String>,
    },

    /// Roll back the latest merge into one mission file
    Restore {
        /// Mission to restore (defaults to the active mission)
        #[arg(long)]
        mission: Option<String>,

        /// File kind: types, events or spawnabletypes
        #[arg(long)]
        kind: SchemaKind,
    },
}

#[derive(Subcommand)]
enum MissionAction {
    /// List configured missions
    List,

    /// Make a mission the active one
    Use { id: String },

    /// Add a mission; without paths the standard mpmissions layout is used
    Add {
        id: String,

        #[arg(long)]
        types: Option<PathBuf>,

        #[arg(long)]
        events: Option<PathBuf>,

        #[arg(long)]
        spawnabletypes: Option<PathBuf>,
    },

    /// Remove a mission
    Remove { id: String },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dzm_core=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dzm_core=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

fn run(cli: Cli) -> dzm_core::Result<ExitCode> {
    let config_path = cli.config;

    match cli.command {
        Commands::Init { force } => cmd_init(&config_path, force).map(|_| ExitCode::SUCCESS),
        Commands::Scan { mods } => cmd_scan(&config_path, &mods).map(|_| ExitCode::SUCCESS),
        Commands::Classify { file } => cmd_classify(&file).map(|_| ExitCode::SUCCESS),
        Commands::Merge {
            mission,
            all,
            mods,
            overwrite,
            format,
        } => cmd_merge(&config_path, mission, all, &mods, overwrite, format),
        Commands::Missions { action } => cmd_missions(&config_path, action).map(|_| ExitCode::SUCCESS),
        Commands::Add {
            category,
            classnames,
            vehicle_events,
            mission,
            overwrite,
        } => cmd_add(&config_path, &category, &classnames, vehicle_events, mission, overwrite),
        Commands::History { mission } => cmd_history(&config_path, mission).map(|_| ExitCode::SUCCESS),
        Commands::Restore { mission, kind } => {
            cmd_restore(&config_path, mission, kind).map(|_| ExitCode::SUCCESS)
        }
    }
}

fn cmd_init(config_path: &Path, force: bool) -> dzm_core::Result<()> {
    if config_path.exists() && !force {
        println!(
            "Config already exists at {} (use --force to replace it)",
            config_path.display()
        );
        return Ok(());
    }

    let config = MergeConfig::default();
    config.save(config_path)?;
    println!("Wrote default config to {}", config_path.display());
    println!("  Active mission: {}", config.active_mission);
    println!("  Mod search paths: {}", config.mod_search_paths.join(", "));
    Ok(())
}

fn cmd_scan(config_path: &Path, mods: &[PathBuf]) -> dzm_core::Result<()> {
    let config = MergeConfig::load_or_default(config_path)?;
    let groups = config.list_all();
    let report = discover_sources(&config, &groups, mods)?;

    println!("Mods ({}):", report.candidates.len());
    println!();
    for candidate in &report.candidates {
        println!("{} ({} files)", candidate.name(), candidate.files.len());
        for file in &candidate.files {
            println!("  [{}] {}", file.kind, file.path.display());
        }
        println!();
    }

    if !report.unclassified.is_empty() {
        println!("Unclassified ({}):", report.unclassified.len());
        for file in &report.unclassified {
            println!("  {}: {}", file.path.display(), file.reason);
        }
        println!();
    }

    if !report.warnings.is_empty() {
        println!("Warnings ({}):", report.warnings.len());
        for warning in &report.warnings {
            println!("  {}", warning);
        }
        println!();
    }

    println!(
        "Found {} XML files in {} mods",
        report.classified_count(),
        report.candidates.len()
    );
    Ok(())
}

fn cmd_classify(file: &Path) -> dzm_core::Result<()> {
    let bytes = fs::read(file).map_err(|e| Error::FileRead {
        path: file.to_path_buf(),
        source: e,
    })?;

    println!("File: {}", file.display());
    match classify_path(file, &bytes) {
        Classification::Classified { kind } => {
            let doc = extract(&bytes, kind)?;
            println!("Kind: {}", kind);
            println!("Root: <{}>", doc.root_name);
            println!("Records: {}", doc.len());
            if !doc.duplicate_keys.is_empty() {
                println!("Duplicate keys: {}", doc.duplicate_keys.join(", "));
            }
        }
        Classification::Unclassified { reason } => {
            println!("Unclassified: {}", reason);
        }
    }
    Ok(())
}

fn resolve_groups(
    config: &MergeConfig,
    mission: Option<String>,
    all: bool,
) -> dzm_core::Result<Vec<DestinationGroup>> {
    if all {
        return Ok(config.list_all());
    }
    let group = match mission {
        Some(id) => config.resolve(&id)?,
        None => config.active()?,
    };
    Ok(vec![group])
}

fn cmd_merge(
    config_path: &Path,
    mission: Option<String>,
    all: bool,
    mods: &[PathBuf],
    overwrite: bool,
    format: Format,
) -> dzm_core::Result<ExitCode> {
    let config = MergeConfig::load_or_default(config_path)?;
    let groups = resolve_groups(&config, mission, all)?;

    let mut options = PipelineOptions::from_config(&config);
    options.overwrite_existing |= overwrite;
    tracing::debug!(
        missions = groups.len(),
        overwrite = options.overwrite_existing,
        "starting merge"
    );

    let discovery = discover_sources(&config, &groups, mods)?;
    if discovery.classified_count() == 0 && format == Format::Text {
        println!("No mod XML files found. Check mod_search_paths in {}", config_path.display());
    }
    let report = run_discovered(discovery, &groups, &options)?;

    match format {
        Format::Text => print_report(&report),
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(exit_code(&report))
}

fn cmd_add(
    config_path: &Path,
    category: &str,
    classnames: &[String],
    vehicle_events: bool,
    mission: Option<String>,
    overwrite: bool,
) -> dzm_core::Result<ExitCode> {
    let config = MergeConfig::load_or_default(config_path)?;
    let group = resolve_groups(&config, mission, false)?;

    if !config.default_values.contains_key(category) {
        println!("Unknown category '{}', using '{}' defaults", category, FALLBACK_CATEGORY);
    }
    let defaults = defaults_for(&config.default_values, category).ok_or_else(|| {
        Error::InvalidConfig(format!("no defaults for category '{}'", FALLBACK_CATEGORY))
    })?;

    let entries: Vec<(&str, _)> = classnames.iter().map(|c| (c.as_str(), defaults)).collect();
    let mut sources = SourceSet::from_documents([types_document(&entries)?]);
    if vehicle_events {
        if config.vehicle_events.enabled {
            let names: Vec<&str> = classnames.iter().map(String::as_str).collect();
            sources.push(events_document(&names, &config.vehicle_events.default_event)?);
        } else {
            println!("Vehicle events are disabled in the config, skipping events");
        }
    }

    let mut options = PipelineOptions::from_config(&config);
    options.overwrite_existing |= overwrite;
    let report = run_batch(&group, &sources, &options)?;

    print_report(&report);
    Ok(exit_code(&report))
}

fn cmd_missions(config_path: &Path, action: MissionAction) -> dzm_core::Result<()> {
    let mut config = MergeConfig::load_or_default(config_path)?;

    match action {
        MissionAction::List => {
            println!("Missions ({}):", config.missions.len());
            for group in config.list_all() {
                let marker = if group.id == config.active_mission { " (active)" } else { "" };
                println!("  {}{}", group.id, marker);
                for kind in SchemaKind::ALL {
                    match group.path_for(kind) {
                        Some(path) => println!("    {}: {}", kind, path.display()),
                        None => println!("    {}: not configured", kind),
                    }
                }
            }
            return Ok(());
        }
        MissionAction::Use { id } => {
            config.set_active_mission(&id)?;
            println!("Active mission: {}", id);
        }
        MissionAction::Add {
            id,
            types,
            events,
            spawnabletypes,
        } => {
            let paths = if types.is_none() && events.is_none() && spawnabletypes.is_none() {
                MissionPaths::standard("./mpmissions", &id)
            } else {
                MissionPaths {
                    types,
                    events,
                    spawnabletypes,
                }
            };
            config.add_mission(id.clone(), paths);
            println!("Added mission: {}", id);
        }
        MissionAction::Remove { id } => {
            config.remove_mission(&id)?;
            println!("Removed mission: {}", id);
            println!("Active mission: {}", config.active_mission);
        }
    }

    config.save(config_path)?;
    println!("Saved {}", config_path.display());
    Ok(())
}

fn cmd_history(config_path: &Path, mission: Option<String>) -> dzm_core::Result<()> {
    let config = MergeConfig::load_or_default(config_path)?;
    let history = HistoryFile::load(config.history_path())?;

    let missions: Vec<String> = match mission {
        Some(id) => vec![id],
        None => history.missions().into_iter().map(String::from).collect(),
    };
    if history.total_entries() == 0 {
        println!("No merges recorded");
        return Ok(());
    }

    for id in missions {
        let entries = history.entries_for(&id);
        println!("{} ({} merges)", id, entries.len());
        for entry in entries {
            println!(
                "  {} [{}] {}: +{} ~{}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.kind,
                entry.destination.display(),
                entry.added.len(),
                entry.updated.len()
            );
            match &entry.backup {
                Some(backup) => println!("    backup: {}", backup.display()),
                None => println!("    backup: none (file was created)"),
            }
        }
    }
    Ok(())
}

fn cmd_restore(config_path: &Path, mission: Option<String>, kind: SchemaKind) -> dzm_core::Result<()> {
    let config = MergeConfig::load_or_default(config_path)?;
    let mission = mission.unwrap_or_else(|| config.active_mission.clone());
    let history_path = config.history_path();
    let mut history = HistoryFile::load(&history_path)?;

    let entry = restore_last(&mut history, &mission, kind)?;
    history.save(&history_path)?;

    match &entry.backup {
        Some(backup) => println!(
            "Restored {} from {}",
            entry.destination.display(),
            backup.display()
        ),
        None => println!("Removed {} (it was created by the merge)", entry.destination.display()),
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    for group in &report.groups {
        print_group(group);
    }

    if !report.malformed.is_empty() {
        println!("Malformed ({}):", report.malformed.len());
        for file in &report.malformed {
            println!("  {}: {}", file.path.display(), file.message);
        }
        println!();
    }
    if !report.unclassified.is_empty() {
        println!("Unclassified ({}):", report.unclassified.len());
        for file in &report.unclassified {
            println!("  {}: {}", file.path.display(), file.reason);
        }
        println!();
    }
    if !report.warnings.is_empty() {
        println!("Warnings ({}):", report.warnings.len());
        for warning in &report.warnings {
            println!("  {}", warning);
        }
        println!();
    }
    if let Some(e) = &report.history_error {
        println!("History not saved: {}", e);
        println!();
    }

    println!(
        "Done: {} succeeded, {} unchanged, {} failed",
        report.succeeded(),
        report.unchanged(),
        report.failed()
    );
}

fn print_group(group: &GroupOutcome) {
    let status = match group.status {
        GroupStatus::Succeeded => "merged",
        GroupStatus::Unchanged => "unchanged",
        GroupStatus::Failed => "FAILED",
    };
    println!("Mission: {} [{}]", group.mission, status);

    for outcome in &group.kinds {
        let destination = outcome
            .destination
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<not configured>".to_string());
        println!("  {} -> {} ({} sources)", outcome.kind, destination, outcome.sources.len());

        let added = outcome.report.added();
        let updated = outcome.report.updated();
        let skipped = outcome.report.skipped();
        println!(
            "    added {}, updated {}, skipped {}",
            added.len(),
            updated.len(),
            skipped.len()
        );
        for (label, keys) in [("added", &added), ("updated", &updated), ("skipped", &skipped)] {
            if !keys.is_empty() {
                println!("    {}: {}", label, keys.join(", "));
            }
        }
        if let Some(backup) = outcome.backup.as_ref().and_then(|h| h.backup.as_ref()) {
            println!("    backup: {}", backup.display());
        }
        if let Some(e) = &outcome.error {
            println!("    error: {}", e);
        }
    }
    println!();
}

fn exit_code(report: &RunReport) -> ExitCode {
    if report.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
