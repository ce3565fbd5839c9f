//! buildrec: inspect, check and rewrite container build records.

mod config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use buildrec_core::codec::{Layout, decode_record, encode_record};
use buildrec_core::domain::{BuildRecord, check};
use buildrec_core::impls::InMemoryRecordStore;
use buildrec_core::params::UserParams;
use buildrec_core::plugins::render_plugins;
use buildrec_core::ports::RecordStore;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;

use crate::config::{CliConfig, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "buildrec", version, about = "Container build record toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summary of one record
    Inspect {
        file: PathBuf,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Report consistency anomalies
    Check {
        file: PathBuf,
        /// Exit with an error when anomalies are found
        #[arg(long)]
        strict: bool,
    },
    /// Decode and re-encode a record
    Roundtrip {
        file: PathBuf,
        #[arg(long)]
        pretty: bool,
    },
    /// Print the typed USER_PARAMS payload
    UserParams { file: PathBuf },
    /// Render the plugin configuration for the record's user params
    RenderPlugins {
        file: PathBuf,
        /// Directory holding plugin templates
        #[arg(long)]
        build_json_dir: Option<PathBuf>,
    },
    /// Load several records and count them by phase
    Summary {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Debug, Serialize)]
struct Inspection<'a> {
    name: Option<&'a str>,
    namespace: Option<&'a str>,
    phase: String,
    reason: Option<&'a str>,
    repo: Option<&'a str>,
    branch: Option<&'a str>,
    pod: Option<&'a str>,
    source_image: Option<String>,
    output_image: Option<&'a str>,
    image_tag: Option<String>,
    elapsed_secs: Option<u64>,
}

impl<'a> Inspection<'a> {
    fn of(record: &'a BuildRecord) -> Result<Self> {
        Ok(Self {
            name: record.name(),
            namespace: record.metadata.namespace.as_deref(),
            phase: record.phase().to_string(),
            reason: record.status.reason.as_deref(),
            repo: record.repo_name(),
            branch: record.branch(),
            pod: record.metadata.pod_name(),
            source_image: record.metadata.source_image()?.map(|source| source.name),
            output_image: record.spec.output_image(),
            image_tag: record.image_tag()?,
            elapsed_secs: record.status.elapsed().map(|d| d.as_secs()),
        })
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn load(path: &Path) -> Result<BuildRecord> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    decode_record(&text).with_context(|| format!("decoding {}", path.display()))
}

fn show(label: &str, value: Option<impl std::fmt::Display>) {
    if let Some(value) = value {
        println!("{label:<12} {value}");
    }
}

fn inspect(path: &Path, json: bool) -> Result<()> {
    let record = load(path)?;
    let inspection = Inspection::of(&record)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
        return Ok(());
    }
    show("name", inspection.name);
    show("namespace", inspection.namespace);
    show("phase", Some(&inspection.phase));
    show("reason", inspection.reason);
    show("repo", inspection.repo);
    show("branch", inspection.branch);
    show("pod", inspection.pod);
    show("from", inspection.source_image.as_deref());
    show("output", inspection.output_image);
    show("image tag", inspection.image_tag.as_deref());
    show("elapsed", inspection.elapsed_secs.map(|s| format!("{s}s")));
    Ok(())
}

fn check_record(path: &Path, strict: bool) -> Result<()> {
    let record = load(path)?;
    let anomalies = check(&record);
    for anomaly in &anomalies {
        println!("{anomaly}");
    }
    if anomalies.is_empty() {
        println!("no anomalies");
    } else {
        tracing::warn!(count = anomalies.len(), file = %path.display(), "record has anomalies");
        if strict {
            bail!("{} anomalies in {}", anomalies.len(), path.display());
        }
    }
    Ok(())
}

fn roundtrip(path: &Path, pretty: bool) -> Result<()> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let record = decode_record(&text).with_context(|| format!("decoding {}", path.display()))?;
    let layout = if pretty { Layout::Pretty } else { Layout::Compact };
    let encoded = encode_record(&record, layout)?;

    let before: Value = serde_json::from_str(&text)?;
    let after: Value = serde_json::from_str(&encoded)?;
    if before != after {
        bail!("re-encoded {} differs from the input", path.display());
    }
    println!("{encoded}");
    Ok(())
}

fn user_params(path: &Path) -> Result<()> {
    let record = load(path)?;
    let params = record
        .user_params()?
        .with_context(|| format!("{} carries no USER_PARAMS", path.display()))?;
    if let Err(err) = params.validate() {
        tracing::warn!(%err, "user params are incomplete");
    }
    let value: Value = serde_json::from_str(&params.to_json()?)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Template dir: the flag, then the user params, then the environment.
fn resolve_build_json_dir(
    flag: Option<PathBuf>,
    params: &UserParams,
    fallback: Option<&Path>,
) -> Option<PathBuf> {
    flag.or_else(|| params.common().build_json_dir.as_deref().map(PathBuf::from))
        .or_else(|| fallback.map(Path::to_path_buf))
}

fn plugins(path: &Path, flag: Option<PathBuf>, fallback: Option<&Path>) -> Result<()> {
    let record = load(path)?;
    let params = record
        .user_params()?
        .with_context(|| format!("{} carries no USER_PARAMS", path.display()))?;
    let dir = resolve_build_json_dir(flag, &params, fallback);
    let rendered = render_plugins(&params, dir.as_deref()).context("rendering plugin configuration")?;
    println!("{rendered}");
    Ok(())
}

async fn summary(files: &[PathBuf]) -> Result<()> {
    let store = InMemoryRecordStore::new();
    for path in files {
        let record = load(path)?;
        let key = store
            .create(record)
            .await
            .with_context(|| format!("storing {}", path.display()))?;
        tracing::debug!(%key, "loaded");
    }
    for (phase, count) in store.counts_by_phase().await? {
        println!("{phase:<12} {count}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = CliConfig::from_env();
    init_tracing(config.log_format);

    let cli = Cli::parse();
    match cli.command {
        Command::Inspect { file, json } => inspect(&file, json),
        Command::Check { file, strict } => check_record(&file, strict),
        Command::Roundtrip { file, pretty } => roundtrip(&file, pretty),
        Command::UserParams { file } => user_params(&file),
        Command::RenderPlugins { file, build_json_dir } => {
            plugins(&file, build_json_dir, config.build_json_dir.as_deref())
        }
        Command::Summary { files } => summary(&files).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    const FIXTURE: &str = include_str!("../../buildrec-core/tests/fixtures/scratch_build.json");

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["buildrec", "check", "--strict", "b.json"]).unwrap();
        assert!(matches!(cli.command, Command::Check { strict: true, .. }));
        assert!(Cli::try_parse_from(["buildrec", "summary"]).is_err());
    }

    #[test]
    fn build_json_dir_precedence() {
        let record = decode_record(FIXTURE).unwrap();
        let params = record.user_params().unwrap().unwrap();
        let from_params = PathBuf::from(params.common().build_json_dir.clone().unwrap());
        let env = Path::new("/from/env");

        assert_eq!(
            resolve_build_json_dir(Some("/from/flag".into()), &params, Some(env)),
            Some(PathBuf::from("/from/flag"))
        );
        assert_eq!(resolve_build_json_dir(None, &params, Some(env)), Some(from_params));

        let mut bare = params.clone();
        bare.common_mut().build_json_dir = None;
        assert_eq!(resolve_build_json_dir(None, &bare, Some(env)), Some(env.to_path_buf()));
        assert_eq!(resolve_build_json_dir(None, &bare, None), None);
    }

    #[test]
    fn inspection_of_fixture() {
        let record = decode_record(FIXTURE).unwrap();
        let inspection = Inspection::of(&record).unwrap();
        assert_eq!(inspection.phase, "Complete");
        assert_eq!(inspection.source_image.as_deref(), Some("buildroot:latest"));
        assert_eq!(inspection.elapsed_secs, Some(982));
        assert_eq!(
            inspection.image_tag.as_deref(),
            Some("mlangsdo/chromium:none-38385-20191011152344-x86_64")
        );
    }
}
