use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use mediasort_core::{
    app_paths, apply_plan, exiftool_available, generate_plan, load_config, save_config, summarize,
    ActionKind, AppConfig, ExifToolReader, MetadataBackend, OrganizePlan, PlanOptions, RunSummary,
    TimeZoneSetting, DEFAULT_EXIFTOOL,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "mediasort")]
#[command(about = "撮影機器のメタデータから写真・動画を日付別フォルダへ整理します")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Organize(OrganizeArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
    /// Writes a config file with default values.
    Init {
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Debug, Args)]
struct OrganizeArgs {
    #[arg(short, long)]
    input: PathBuf,
    #[arg(short, long)]
    output: PathBuf,
    /// `local` or an IANA name such as `Asia/Tokyo`.
    #[arg(short, long)]
    timezone: Option<String>,
    #[arg(short, long, default_value_t = false)]
    recursive: bool,
    #[arg(long, default_value_t = false)]
    include_hidden: bool,
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    #[arg(long, default_value_t = false)]
    remove_processed: bool,
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    plan: &'a OrganizePlan,
    summary: &'a RunSummary,
}

fn main() -> Result<ExitCode> {
    // stderr keeps stdout clean for --format json
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Organize(args) => cmd_organize(args),
        Commands::Config(config) => match config.action {
            ConfigAction::Show => cmd_config_show().map(|_| ExitCode::SUCCESS),
            ConfigAction::Init { force } => cmd_config_init(force).map(|_| ExitCode::SUCCESS),
        },
    }
}

fn cmd_organize(args: OrganizeArgs) -> Result<ExitCode> {
    let config = load_config()?;
    let options = build_options(&args, &config)?;

    if config.metadata_backend == MetadataBackend::Exiftool {
        let available = if config.exiftool_path.as_path() == Path::new(DEFAULT_EXIFTOOL) {
            exiftool_available()
        } else {
            ExifToolReader::new(&config.exiftool_path).is_available()
        };
        if !available {
            bail!(
                "exiftool を実行できません: {} (インストールして PATH に追加するか exiftool_path を設定してください)",
                config.exiftool_path.display()
            );
        }
    }
    let reader = config.metadata_reader();

    info!(
        input = %options.input.display(),
        output = %options.output.display(),
        timezone = %options.timezone,
        dry_run = args.dry_run,
        "organize started"
    );
    let plan = generate_plan(&options, reader.as_ref())?;

    let summary = if args.dry_run {
        summarize(&plan, None)
    } else {
        let report = apply_plan(&plan, &options.output);
        summarize(&plan, Some(&report))
    };

    match args.format {
        OutputFormat::Json => {
            let report = JsonReport {
                plan: &plan,
                summary: &summary,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => print_table(&plan, &summary),
    }

    if args.dry_run {
        eprintln!("dry-runモード: 実ファイルは変更していません。");
    }

    Ok(if summary.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// CLI flags over config values.
fn build_options(args: &OrganizeArgs, config: &AppConfig) -> Result<PlanOptions> {
    let timezone = match args.timezone.as_deref() {
        Some(name) => name
            .parse::<TimeZoneSetting>()
            .context("--timezone の値が不正です")?,
        None => config.timezone_setting()?,
    };

    Ok(PlanOptions {
        input: args.input.clone(),
        output: args.output.clone(),
        recursive: args.recursive || config.recursive_default,
        include_hidden: args.include_hidden || config.include_hidden_default,
        timezone,
        remove_processed: args.remove_processed,
        unknown_sources: config.unknown_sources,
        filesystem_fallback: config.filesystem_fallback,
        naming: config.naming_templates()?,
        workers: args.workers.unwrap_or(config.workers),
    })
}

fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    config.validate()?;
    let paths = app_paths()?;
    println!("設定ファイル: {}", paths.config_path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_config_init(force: bool) -> Result<()> {
    let paths = app_paths()?;
    if paths.config_path.exists() && !force {
        bail!(
            "設定ファイルは既に存在します: {} (上書きするには --force)",
            paths.config_path.display()
        );
    }
    let path = save_config(&AppConfig::default())?;
    println!("設定ファイルを作成しました: {}", path.display());
    Ok(())
}

fn print_table(plan: &OrganizePlan, summary: &RunSummary) {
    println!("元ファイル -> 出力先 (profile / action)");
    for action in &plan.actions {
        let target = match (&action.destination, action.kind) {
            (_, ActionKind::SkipAlreadyProcessed) => action
                .existing
                .as_ref()
                .map(|p| format!("(既存) {}", p.display()))
                .unwrap_or_else(|| "(既存)".to_string()),
            (Some(dest), _) => plan.output.join(dest.relative_path()).display().to_string(),
            (None, _) => "-".to_string(),
        };
        println!(
            "{} -> {} ({:?} / {:?})",
            action.source.path.display(),
            target,
            action.profile,
            action.kind
        );
    }

    if !summary.failures.is_empty() {
        println!("\n失敗:");
        for failed in &summary.failures {
            println!("{} [{:?}] {}", failed.path.display(), failed.kind, failed.message);
        }
    }

    println!(
        "\n集計: scanned={} media={} hidden_skip={} unsupported_skip={}",
        plan.stats.scanned_files,
        plan.stats.media_files,
        plan.stats.skipped_hidden,
        plan.stats.skipped_unsupported,
    );
    println!(
        "{}: executed={} skipped={} failed={}",
        if summary.dry_run { "予定" } else { "結果" },
        summary.executed,
        summary.skipped,
        summary.failed
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn organize_accepts_short_flags() {
        let cli = Cli::try_parse_from([
            "mediasort", "organize", "-i", "/card", "-o", "/library", "-r", "-t", "Asia/Tokyo",
        ])
        .expect("parse");
        let Commands::Organize(args) = cli.command else {
            panic!("organize expected");
        };
        assert!(args.recursive);
        assert_eq!(args.timezone.as_deref(), Some("Asia/Tokyo"));
        assert_eq!(args.input, PathBuf::from("/card"));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
