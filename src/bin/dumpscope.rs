use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use dumpscope::archive;
use dumpscope::config::Config;
use dumpscope::dump;
use dumpscope::kb::KnowledgeBase;
use dumpscope::report;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "dumpscope", version, about = "Chat-server support dump analysis")]
struct Cli {
    /// Path to a support dump: an extracted directory or a .zip bundle
    dump_path: PathBuf,

    /// Minimum severity to keep (10=debug, 20=info, 30=warning, 40=error, 50=critical)
    #[arg(long = "min-level", default_value_t = 40)]
    min_level: i64,

    /// Directory for generated reports
    #[arg(long = "output-dir")]
    output_dir: Option<PathBuf>,

    /// Knowledge base file (JSON array of {pattern, title, recommendation})
    #[arg(long = "kb")]
    kb: Option<PathBuf>,

    /// Print the analysis payload as JSON to stdout instead of writing HTML
    #[arg(long = "json", default_value_t = false)]
    json: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;

    let kb = match cli.kb.as_deref().or(config.kb_path.as_deref()) {
        Some(path) => KnowledgeBase::load(path),
        None => KnowledgeBase::builtin(),
    };
    if kb.is_empty() {
        warn!("knowledge base is empty, no recommendations will be produced");
    }

    let (dump_dir, scratch) = resolve_dump_dir(&cli.dump_path, &config)?;
    let data = report::build_report(&dump_dir, cli.min_level, &kb);

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&data).context("failed to serialize report")?
        );
    } else {
        let output_dir = cli
            .output_dir
            .unwrap_or_else(|| config.reports_dir.clone());
        fs::create_dir_all(&output_dir).with_context(|| {
            format!("failed to create output directory {}", output_dir.display())
        })?;
        let filename = format!(
            "SupportDump-Analysis-Report_{}.html",
            Utc::now().format("%Y-%m-%d_%H-%M-%S")
        );
        let output_path = output_dir.join(filename);
        fs::write(&output_path, report::render_html(&data))
            .with_context(|| format!("failed to write report to {}", output_path.display()))?;
        info!("HTML report saved to {}", output_path.display());
    }

    if let Some(dir) = scratch {
        if let Err(err) = fs::remove_dir_all(&dir) {
            warn!(dir = %dir.display(), %err, "failed to remove scratch directory");
        }
    }
    Ok(())
}

/// Resolve the input into a directory of artifacts. A `.zip` bundle is
/// validated and extracted into a scratch directory, returned so the caller
/// can clean it up.
fn resolve_dump_dir(input: &Path, config: &Config) -> Result<(PathBuf, Option<PathBuf>)> {
    if input.is_dir() {
        let dir = dump::find_dump_root(input).unwrap_or_else(|| input.to_path_buf());
        return Ok((dir, None));
    }

    let is_zip = input
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false);
    if !is_zip {
        anyhow::bail!(
            "'{}' is neither a directory nor a .zip bundle",
            input.display()
        );
    }

    archive::validate_archive(input, config.max_upload_size, config.max_extracted_size)
        .context("bundle failed validation")?;

    let scratch = std::env::temp_dir().join(format!(
        "dumpscope-{}-{}",
        Utc::now().timestamp_micros(),
        std::process::id()
    ));
    archive::extract_archive(input, &scratch, config.max_single_file_size)
        .context("bundle extraction failed")?;

    let root = dump::find_dump_root(&scratch)
        .ok_or_else(|| anyhow::anyhow!("could not find a support dump layout in the bundle"))?;
    Ok((root, Some(scratch)))
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
