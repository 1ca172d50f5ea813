use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use cleanshift_core::{
    CleanShift, CleanShiftConfig, CleanSummary, CleanupSuggestion, DirectoryReport,
    EnvironmentEntry, Housekeeper, JunkCategory, RelocationError, RelocationRecord,
    VolumeInfo,
    drives::volume_containing, environment::suggest_cleanup, format_bytes, parse_size_string,
    system_root, volume_root,
};

#[derive(Parser)]
#[command(name = "cleanshift")]
#[command(
    about = "Find large folders and development caches, clean them or shift them to another drive"
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Configuration file (defaults to <config dir>/cleanshift/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze disk usage and list large folders
    Analyze {
        /// Directory to analyze (defaults to the system drive)
        path: Option<PathBuf>,

        /// Minimum folder size to report, e.g. 500MB or 1GiB
        #[arg(short, long)]
        min_size: Option<String>,
    },
    /// Show disk space status for all fixed drives
    Status,
    /// Clean temporary files and caches
    Clean {
        /// Clean temporary files
        #[arg(long)]
        temp_files: bool,

        /// Clean browser caches
        #[arg(long)]
        browser_cache: bool,

        /// Clean system caches
        #[arg(long)]
        system_cache: bool,

        /// Dry run - show what would be cleaned without actually cleaning
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
    /// Find development environment caches and optionally clean them
    Env {
        /// Clean the environments that were found
        #[arg(long)]
        clean: bool,

        /// Dry run - show what would be cleaned without actually cleaning
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Move a folder to another drive and leave a directory link behind
    Move {
        /// Folder to move
        #[arg(short, long)]
        source: PathBuf,

        /// Target drive (e.g. D: or /mnt/data)
        #[arg(short, long)]
        target_drive: String,

        /// Dry run - show what would be moved without moving anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Move a relocated folder back and remove its link
    Restore {
        /// Link left behind by `move`
        link: PathBuf,

        /// Dry run - show what would be restored without moving anything
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // 设置日志级别
    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!("cleanshift={log_level}"))
        .init();

    let config = load_config(cli.config.as_deref())?;
    let service = CleanShift::from_config(&config);

    execute(cli.command, &service, &config)
}

fn load_config(path: Option<&Path>) -> Result<CleanShiftConfig> {
    CleanShiftConfig::load(path).with_context(|| match path {
        Some(path) => format!("Failed to load configuration from {}", path.display()),
        None => "Failed to load the default configuration file".to_string(),
    })
}

/// 执行子命令，只通过 [`Housekeeper`] 访问核心功能
pub fn execute(
    command: Commands,
    service: &dyn Housekeeper,
    config: &CleanShiftConfig,
) -> Result<()> {
    match command {
        Commands::Analyze { path, min_size } => {
            handle_analyze_command(service, config, path, min_size)
        }
        Commands::Status => {
            display_volumes(&service.volumes());
            Ok(())
        }
        Commands::Clean {
            temp_files,
            browser_cache,
            system_cache,
            dry_run,
        } => handle_clean_command(
            service,
            &selected_categories(temp_files, browser_cache, system_cache),
            dry_run,
        ),
        Commands::Env {
            clean,
            dry_run,
            yes,
        } => handle_env_command(service, clean, dry_run, yes),
        Commands::Move {
            source,
            target_drive,
            dry_run,
            yes,
        } => handle_move_command(service, &source, &target_drive, dry_run, yes),
        Commands::Restore { link, dry_run } => handle_restore_command(service, &link, dry_run),
    }
}

fn handle_analyze_command(
    service: &dyn Housekeeper,
    config: &CleanShiftConfig,
    path: Option<PathBuf>,
    min_size: Option<String>,
) -> Result<()> {
    let root = path.unwrap_or_else(system_root);
    let min_size = match min_size {
        Some(size) => parse_size_string(&size)
            .with_context(|| format!("Invalid --min-size value: {size}"))?,
        None => config.scan.min_size_bytes(),
    };

    println!(
        "Analyzing disk usage for {} (folders of at least {})...",
        root.display(),
        format_bytes(min_size)
    );

    let reports = service.scan(&root, min_size)?;
    display_reports(&reports);
    Ok(())
}

fn selected_categories(temp_files: bool, browser_cache: bool, system_cache: bool) -> Vec<JunkCategory> {
    [
        (temp_files, JunkCategory::Temp),
        (browser_cache, JunkCategory::BrowserCache),
        (system_cache, JunkCategory::SystemCache),
    ]
    .into_iter()
    .filter_map(|(selected, category)| selected.then_some(category))
    .collect()
}

fn handle_clean_command(
    service: &dyn Housekeeper,
    categories: &[JunkCategory],
    dry_run: bool,
) -> Result<()> {
    if categories.is_empty() {
        println!("Nothing selected. Use --temp-files, --browser-cache or --system-cache.");
        return Ok(());
    }

    if dry_run {
        println!("DRY RUN MODE - No files will be deleted");
    }

    let mut total_freed = 0;
    for category in categories {
        let summary = service.clean(std::slice::from_ref(category), dry_run);
        total_freed += summary.total_size_freed;
        println!("{}: {} {}", category, summary.format_size(), freed_label(dry_run));
    }

    println!("Total space {}: {}", freed_label(dry_run), format_bytes(total_freed));
    Ok(())
}

fn handle_env_command(service: &dyn Housekeeper, clean: bool, dry_run: bool, yes: bool) -> Result<()> {
    let entries = service.find_environments();
    display_environments(&entries);

    if entries.is_empty() {
        return Ok(());
    }

    display_suggestions(&suggest_cleanup(&entries));

    if !clean {
        return Ok(());
    }

    let total_size: u64 = entries.iter().map(|e| e.size).sum();
    let prompt = format!(
        "This will clean {} environments and free up {}. Continue?",
        entries.len(),
        format_bytes(total_size)
    );
    if !yes && !dry_run && !confirm(&prompt)? {
        println!("Cleaning cancelled.");
        return Ok(());
    }

    let summary = service.clean_environments(&entries, dry_run);
    display_clean_summary(&summary, dry_run);
    Ok(())
}

fn handle_move_command(
    service: &dyn Housekeeper,
    source: &Path,
    target_drive: &str,
    dry_run: bool,
    yes: bool,
) -> Result<()> {
    let target = volume_root(target_drive);
    if !target.is_dir() {
        bail!("Target drive {} is not available", target.display());
    }

    let preview = service
        .relocate(source, &target, true)
        .with_context(|| format!("Cannot move {}", source.display()))?;

    if let Some(volume) = volume_containing(service.volumes(), &target) {
        if volume.free < preview.bytes {
            bail!(
                "Not enough free space on {}: {} needed, {} available",
                volume.mount_point.display(),
                preview.formatted_size(),
                format_bytes(volume.free)
            );
        }
    }

    if dry_run {
        println!("DRY RUN MODE - No files will be moved");
        display_record("Would move", &preview);
        return Ok(());
    }

    let prompt = format!(
        "About to move {} ({}) to {}. Continue?",
        preview.original.display(),
        preview.formatted_size(),
        preview.relocated.display()
    );
    if !yes && !confirm(&prompt)? {
        println!("Operation cancelled.");
        return Ok(());
    }

    match service.relocate(source, &target, false) {
        Ok(record) => {
            display_record("Moved", &record);
            Ok(())
        }
        Err(err) => {
            if let Some(record) = err.partial_record() {
                eprintln!(
                    "The data is now at {} but no link was created at {}.",
                    record.relocated.display(),
                    record.original.display()
                );
                if matches!(err, RelocationError::SourceNotRemoved { .. }) {
                    eprintln!("Remove what is left of the original folder, then create the link manually.");
                } else {
                    eprintln!("Create the link manually or move the folder back to recover.");
                }
            }
            Err(err).with_context(|| format!("Failed to move {}", source.display()))
        }
    }
}

fn handle_restore_command(service: &dyn Housekeeper, link: &Path, dry_run: bool) -> Result<()> {
    let record = service
        .restore(link, dry_run)
        .with_context(|| format!("Failed to restore {}", link.display()))?;

    if dry_run {
        println!("DRY RUN MODE - No files will be moved");
        display_record("Would restore", &record);
    } else {
        display_record("Restored", &record);
    }
    Ok(())
}

fn freed_label(dry_run: bool) -> &'static str {
    if dry_run { "to be freed" } else { "freed" }
}

fn display_reports(reports: &[DirectoryReport]) {
    if reports.is_empty() {
        println!("No large folders found.");
        return;
    }

    println!("\nFound {} large folders:", reports.len());
    println!("{:<60} {:<12} {:<20}", "Path", "Size", "Type");
    println!("{}", "-".repeat(94));

    for report in reports {
        println!(
            "{:<60} {:<12} {:<20}",
            report.path.display(),
            report.formatted_size(),
            report.folder_type
        );
    }
}

fn display_volumes(volumes: &[VolumeInfo]) {
    if volumes.is_empty() {
        println!("No fixed drives found.");
        return;
    }

    println!("{:<24} {:<12} {:<12} {:<12} {:<8}", "Drive", "Total", "Used", "Free", "Usage %");
    println!("{}", "-".repeat(72));

    for volume in volumes {
        println!(
            "{:<24} {:<12} {:<12} {:<12} {:<8}",
            volume.mount_point.display(),
            format_bytes(volume.total),
            format_bytes(volume.used),
            format_bytes(volume.free),
            format!("{:.1}%", volume.usage_percent())
        );
    }
}

fn display_environments(entries: &[EnvironmentEntry]) {
    if entries.is_empty() {
        println!("No development environments found.");
        return;
    }

    let total_size: u64 = entries.iter().map(|e| e.size).sum();

    println!("\nFound {} development environments:", entries.len());
    println!("{:<20} {:<10} {:<12} {:<50}", "Name", "Category", "Size", "Path");
    println!("{}", "-".repeat(94));

    for entry in entries {
        println!(
            "{:<20} {:<10} {:<12} {:<50}",
            entry.name,
            entry.category,
            entry.formatted_size(),
            entry.path.display()
        );
    }

    println!("{}", "-".repeat(94));
    println!("Total size: {}", format_bytes(total_size));
}

fn display_suggestions(suggestions: &[CleanupSuggestion]) {
    if suggestions.is_empty() {
        return;
    }

    println!("\nSuggestions:");
    for suggestion in suggestions {
        println!("  [{}] {}", suggestion.priority, suggestion.suggestion);
    }
}

fn display_record(action: &str, record: &RelocationRecord) {
    println!(
        "{action} {} -> {} ({})",
        record.original.display(),
        record.relocated.display(),
        record.formatted_size()
    );
}

fn display_clean_summary(summary: &CleanSummary, dry_run: bool) {
    println!("\nCleaning completed!");
    println!("Environments cleaned: {}", summary.cleaned_items);
    println!("Size {}: {}", freed_label(dry_run), summary.format_size());

    if !summary.failed_items.is_empty() {
        println!(
            "\nCould not fully clean {} environments:",
            summary.failed_items.len()
        );
        for item in &summary.failed_items {
            println!("  - {item}");
        }
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("\n{prompt} [y/N]: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let answer = input.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}
