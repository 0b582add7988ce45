mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{AnalyzeArgs, Cli, Commands, PreferArg, SegmentArgs, SuggestArgs, ValidateRulesArgs};
use manuscript_segmenter::{
    analyze_text_for_rule, map_pages_to_excerpts, validate_rules, IndexedExcerpt, PageSource,
    PatternAnalyzer, Prefer, Result, SegmentationOptions, SegmenterError, Severity,
};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let result = match &cli.command {
        Commands::Segment(args) => handle_segment_command(args, &cli.output).await,
        Commands::ValidateRules(args) => handle_validate_rules_command(args).await,
        Commands::Analyze(args) => handle_analyze_command(args).await,
        Commands::Suggest(args) => handle_suggest_command(args),
    };

    if let Err(e) = result {
        error!("Operation failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn handle_segment_command(args: &SegmentArgs, output_dir: &Path) -> Result<()> {
    PageSource::validate_sources(&[args.pages.clone(), args.preset.clone()]).await?;
    ensure_output_directory(output_dir, args.force).await?;

    let (pages, source) = PageSource::load_pages(&args.pages).await?;
    let mut options: SegmentationOptions = PageSource::load_json(&args.preset).await?;
    if let Some(max_pages) = args.max_pages {
        options.max_pages = max_pages;
    }
    if let Some(prefer) = args.prefer {
        options.prefer = Some(match prefer {
            PreferArg::Longer => Prefer::Longer,
            PreferArg::Shorter => Prefer::Shorter,
        });
    }

    let existing: Vec<IndexedExcerpt> = match &args.existing {
        Some(existing) => PageSource::load_json(existing).await?,
        None => Vec::new(),
    };

    info!(
        "Segmenting {} pages from '{}' with {} rules",
        pages.len(),
        source.source,
        options.rules.len()
    );
    let mapping = map_pages_to_excerpts(&pages, &existing, &options)?;

    let excerpts_path = output_dir.join("excerpts.json");
    let excerpts_json = serde_json::to_string_pretty(&mapping.excerpts)
        .context("Failed to serialize excerpts")?;
    tokio::fs::write(&excerpts_path, excerpts_json)
        .await
        .context("Failed to write excerpts file")?;

    let report_path = output_dir.join("report.json");
    let report_json = serde_json::to_string_pretty(&serde_json::json!({
        "generatedAt": chrono::Utc::now().to_rfc3339(),
        "source": source,
        "options": options,
        "report": mapping.report,
    }))
    .context("Failed to serialize validation report")?;
    tokio::fs::write(&report_path, report_json)
        .await
        .context("Failed to write report file")?;

    let summary = &mapping.report.summary;
    println!("\n=== Segmentation of '{}' ===", source.source);
    println!("Pages: {}", summary.page_count);
    println!("Excerpts: {}", summary.segment_count);
    println!("Errors: {}", summary.errors);
    println!("Warnings: {}", summary.warnings);

    for issue in &mapping.report.issues {
        let label = match issue.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        println!(
            "  [{}] #{} {:?}: {}",
            label,
            issue.segment_index,
            issue.issue_type,
            issue.evidence.as_deref().unwrap_or("")
        );
    }

    info!("  - {}", excerpts_path.display());
    info!("  - {} (validation report)", report_path.display());

    if !mapping.report.ok {
        if args.strict {
            return Err(SegmenterError::InvalidInput {
                reason: format!("validation reported {} errors", summary.errors),
            });
        }
        warn!("Validation reported errors; review the report before using these excerpts");
    }

    Ok(())
}

async fn handle_validate_rules_command(args: &ValidateRulesArgs) -> Result<()> {
    let options: SegmentationOptions = PageSource::load_json(&args.preset).await?;
    let issues = validate_rules(&options.rules);

    println!("\n=== Rule check for '{}' ===", args.preset);
    println!("Rules: {}", options.rules.len());

    if issues.is_empty() {
        println!("All rules are valid!");
        return Ok(());
    }

    for issue in &issues {
        println!(
            "  - rule {} [{:?}] {:?}: {}",
            issue.rule_index, issue.severity, issue.kind, issue.message
        );
    }

    let errors = issues.iter().filter(|i| i.severity == Severity::Error).count();
    if errors > 0 {
        return Err(SegmenterError::InvalidInput {
            reason: format!("{} rules failed validation", errors),
        });
    }
    Ok(())
}

async fn handle_analyze_command(args: &AnalyzeArgs) -> Result<()> {
    info!("Starting analysis of {} sources", args.sources.len());

    let validated_sources = PageSource::validate_sources(&args.sources).await?;
    let analyzer = PatternAnalyzer::builtin();
    let mut all_analyses = BTreeMap::new();

    for source in validated_sources {
        let (pages, metadata) = PageSource::load_pages(&source).await?;
        let patterns = analyzer.line_starts(&pages, args.min_count, args.top);

        println!("\n=== Line-start patterns for '{}' ===", source);
        println!("Pages: {}", metadata.page_count);
        for pattern in &patterns {
            println!("  {:>6}  {}", pattern.count, pattern.template);
            if args.detailed {
                for example in &pattern.examples {
                    println!("          {}", example);
                }
            }
        }

        all_analyses.insert(
            source.clone(),
            serde_json::json!({
                "source": metadata,
                "patterns": patterns,
            }),
        );
    }

    if let Some(json_path) = &args.json_output {
        let json_content = serde_json::to_string_pretty(&all_analyses)
            .context("Failed to serialize analysis results")?;

        tokio::fs::write(json_path, json_content)
            .await
            .context("Failed to write JSON analysis file")?;

        info!("Analysis results written to: {}", json_path.display());
    }

    Ok(())
}

fn handle_suggest_command(args: &SuggestArgs) -> Result<()> {
    match analyze_text_for_rule(&args.text) {
        Some(suggestion) => {
            println!("{}", serde_json::to_string_pretty(&suggestion.into_rule())?);
            Ok(())
        }
        None => Err(SegmenterError::InvalidInput {
            reason: "no known tokens at the start of the text".to_string(),
        }),
    }
}

async fn ensure_output_directory(output_dir: &Path, force: bool) -> Result<()> {
    if output_dir.exists() && !force {
        let entries = std::fs::read_dir(output_dir).map_err(|e| SegmenterError::OutputDirectory {
            reason: format!("Cannot read output directory: {}", e),
        })?;

        if entries.count() > 0 {
            return Err(SegmenterError::OutputDirectory {
                reason: "Output directory is not empty. Use --force to overwrite.".to_string(),
            });
        }
    }

    if !output_dir.exists() {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| SegmenterError::OutputDirectory {
                reason: format!("Failed to create output directory: {}", e),
            })?;
        info!("Created output directory: {}", output_dir.display());
    }
    Ok(())
}
