use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use locscope::analyzer::{AnalysisOptions, AnalysisResults, Analyzer};
use locscope::config::{parse_date, Config};
use locscope::discovery::{discover_projects, DiscoveryFilters, ProjectInfo};
use locscope::report;

const CONFIG_FILE: &str = "locscope.toml";
const DEFAULT_OUTPUT_DIR: &str = "./output";

/// Exit code when a working tree could not be restored
const EXIT_RESTORE_FAILED: i32 = 2;

#[derive(Parser)]
#[command(name = "locscope")]
#[command(about = "Lines of code and change activity across many git repositories")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (default: locscope.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure every discovered project and write reports
    Analyze {
        /// Output directory for reports
        #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
        output: PathBuf,

        /// Start of the change window (YYYY-MM-DD), overrides the config
        #[arg(long)]
        start: Option<String>,

        /// End of the change window and checkout date (YYYY-MM-DD), overrides the config
        #[arg(long)]
        end: Option<String>,

        /// Count lines on the current working tree instead of rewinding
        #[arg(long)]
        no_checkout: bool,
    },

    /// List the projects that would be analyzed
    Discover,
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let config = Config::load(&config_path)
        .with_context(|| format!("Could not load {}", config_path.display()))?;

    match cli.command {
        Commands::Analyze {
            output,
            start,
            end,
            no_checkout,
        } => cmd_analyze(config, &output, start, end, no_checkout),
        Commands::Discover => cmd_discover(&config).map(|_| 0),
    }
}

fn discover(config: &Config) -> Result<Vec<ProjectInfo>> {
    let filters = DiscoveryFilters::new(
        &config.filters.exclude_directories,
        &config.filters.exclude_files,
    );
    Ok(discover_projects(&config.root_paths()?, &filters))
}

fn cmd_analyze(
    mut config: Config,
    output: &Path,
    start: Option<String>,
    end: Option<String>,
    no_checkout: bool,
) -> Result<i32> {
    if let Some(start) = start {
        parse_date("--start", Some(&start))?;
        config.time_analysis.start_date = Some(start);
    }
    if let Some(end) = end {
        parse_date("--end", Some(&end))?;
        config.time_analysis.end_date = Some(end);
    }
    if no_checkout {
        config.git.checkout_target_date = false;
    }
    config.validate()?;

    let projects = discover(&config)?;
    if projects.is_empty() {
        println!("{}", "No projects found to analyze".yellow());
        return Ok(0);
    }

    let analyzer = Analyzer::new(AnalysisOptions::from_config(&config)?);
    let results = analyzer.run(&projects);

    let written = report::save_results(&results, &config, output)?;
    print_summary(&results, output, written.len());

    if results.restore_failures().next().is_some() {
        return Ok(EXIT_RESTORE_FAILED);
    }
    Ok(0)
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

fn print_summary(results: &AnalysisResults, output: &Path, reports: usize) {
    let totals = &results.totals;

    println!("\n{} {}", "✓".green().bold(), "Analysis completed".bold());
    println!("Projects analyzed: {}", totals.projects_analyzed.to_string().cyan());
    println!();
    println!("{}", "Lines of Code Breakdown:".bold());
    println!("  Total LOC:     {}", totals.total_loc);
    println!(
        "  Source Code:   {} ({:.1}%)",
        totals.source_loc,
        percent(totals.source_loc, totals.total_loc)
    );
    println!(
        "  Comments:      {} ({:.1}%)",
        totals.comment_loc,
        percent(totals.comment_loc, totals.total_loc)
    );
    println!(
        "  Blank Lines:   {} ({:.1}%)",
        totals.blank_loc,
        percent(totals.blank_loc, totals.total_loc)
    );
    println!();
    println!(
        "Git Changes: {} net lines ({} commits)",
        results.changes.net_change, results.changes.total_commits
    );

    let fallbacks: Vec<_> = results.live_state_fallbacks().collect();
    if !fallbacks.is_empty() {
        println!("\n{}", "Measured at current state, not target date:".yellow());
        for p in fallbacks {
            println!("  {} {}", "•".yellow(), p.info.name);
        }
    }

    let failures: Vec<_> = results.restore_failures().collect();
    if !failures.is_empty() {
        println!(
            "\n{}",
            "Working tree restore FAILED - manual intervention may be required:".red().bold()
        );
        for p in failures {
            println!(
                "  {} {} ({})",
                "✗".red(),
                p.info.name,
                p.restore_error.as_deref().unwrap_or_default()
            );
        }
    }

    println!(
        "\n{} report(s) saved to: {}",
        reports,
        output.display().to_string().green()
    );
}

fn cmd_discover(config: &Config) -> Result<()> {
    let projects = discover(config)?;

    if projects.is_empty() {
        println!("  {}", "No projects found".dimmed());
        return Ok(());
    }

    println!("\n{}", "Projects:".bold());
    for project in &projects {
        println!("  {} {}", "•".green(), project.name.cyan());
        println!("    {} {}", "type:".dimmed(), project.kind.magenta());
        println!("    {} {}", "path:".dimmed(), project.path.display());
        if project.is_git_repo {
            println!("    {} {}", "git:".dimmed(), "yes".green());
        }
        println!();
    }

    Ok(())
}
