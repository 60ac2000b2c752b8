use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing_subscriber::EnvFilter;

use ocrpack::config::PackagerKind;
use ocrpack::{DownloadOutcome, Downloader, Identity, PackError, Settings, TaskRequest, UserType};

const EXIT_NO_FILES_REQUESTED: u8 = 2;
const EXIT_NOTHING_TO_PACKAGE: u8 = 3;
const EXIT_SHARE_CONFIG: u8 = 4;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum UserTypeArg {
    Local,
    Domain,
}

impl From<UserTypeArg> for UserType {
    fn from(arg: UserTypeArg) -> Self {
        match arg {
            UserTypeArg::Local => UserType::Local,
            UserTypeArg::Domain => UserType::Domain,
        }
    }
}

/// Download the files of finished OCR tasks as one archive
#[derive(Debug, Parser)]
#[command(name = "ocrpack", version, about)]
struct Cli {
    /// Settings file (default: <config dir>/ocrpack/config.toml)
    #[arg(long, env = "OCRPACK_CONFIG")]
    config: Option<PathBuf>,

    /// Task list as JSON, or @path to read it from a file
    #[arg(long)]
    tasks: String,

    /// User the download is performed for
    #[arg(long, env = "OCRPACK_USER")]
    user: String,

    #[arg(long, default_value_t = 0)]
    uid: u32,

    #[arg(long, value_enum, default_value = "local")]
    user_type: UserTypeArg,

    /// Group membership, repeatable
    #[arg(long = "group")]
    groups: Vec<String>,

    /// Leave source files out of the archive
    #[arg(long)]
    no_source: bool,

    /// Output file, `-` for stdout
    #[arg(short, long, default_value = "-")]
    output: PathBuf,

    #[arg(long)]
    scratch_root: Option<PathBuf>,

    #[arg(long, value_enum)]
    packager: Option<PackagerKind>,

    #[arg(long)]
    share_config: Option<PathBuf>,

    #[arg(long)]
    task_store: Option<PathBuf>,
}

impl Cli {
    fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::load(self.config.as_deref())?;
        if let Some(root) = &self.scratch_root {
            settings.scratch_root = root.clone();
        }
        if let Some(kind) = self.packager {
            settings.packager.kind = kind;
        }
        if let Some(path) = &self.share_config {
            settings.share_config = path.clone();
        }
        if let Some(path) = &self.task_store {
            settings.task_store = path.clone();
        }
        Ok(settings)
    }

    fn requests(&self) -> Result<Vec<TaskRequest>> {
        let json = match self.tasks.strip_prefix('@') {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read task list {}", path))?,
            None => self.tasks.clone(),
        };
        serde_json::from_str(&json).context("Task list is not valid JSON")
    }

    fn identity(&self) -> Identity {
        Identity::new(self.uid, &self.user, self.user_type.into())
            .with_groups(self.groups.clone())
    }
}

async fn copy_stream<W>(stream: &mut ocrpack::streaming::ArchiveStream, out: &mut W) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    out.flush().await?;
    Ok(written)
}

/// Remove a truncated archive. A file that is already gone is fine.
async fn discard_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove partial archive {}: {}", path.display(), e),
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = cli.settings()?;
    let requests = cli.requests()?;
    let identity = cli.identity();

    let downloader = Downloader::from_settings(&settings)?;
    let outcome = downloader
        .download(requests, identity, !cli.no_source)
        .await;

    let mut stream = match outcome {
        Ok(DownloadOutcome::Ready(stream)) => stream,
        Ok(DownloadOutcome::NoFilesRequested) => {
            eprintln!("No files requested");
            return Ok(ExitCode::from(EXIT_NO_FILES_REQUESTED));
        }
        Ok(DownloadOutcome::NothingToPackage) => {
            eprintln!("Nothing to package");
            return Ok(ExitCode::from(EXIT_NOTHING_TO_PACKAGE));
        }
        Err(e @ PackError::ShareConfig(_)) => {
            eprintln!("Error: {}", e);
            return Ok(ExitCode::from(EXIT_SHARE_CONFIG));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(files = stream.link_count(), "Streaming archive");

    let written = if cli.output.as_os_str() == "-" {
        let mut stdout = tokio::io::stdout();
        copy_stream(&mut stream, &mut stdout).await?
    } else {
        let mut file = tokio::fs::File::create(&cli.output)
            .await
            .with_context(|| format!("Failed to create {}", cli.output.display()))?;
        match copy_stream(&mut stream, &mut file).await {
            Ok(written) => written,
            Err(e) => {
                drop(file);
                discard_partial(&cli.output).await;
                return Err(e);
            }
        }
    };

    tracing::info!(bytes = written, "Archive written");
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ocrpack=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
