//! CLI binary for edgequake-docforge.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ForgeConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_docforge::input::load_input;
use edgequake_docforge::{
    AssemblyRequest, DocForge, ForgeConfig, Operation, PageGeometry, RasterKind,
};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Merge two PDFs and print the artifact id
  docforge assemble merge a.pdf b.pdf

  # Typeset a text file and download the result right away
  docforge assemble layout notes.txt -o notes.pdf

  # Convert a PNG from a URL to WebP
  docforge assemble transcode:webp https://example.com/chart.png

  # Download an artifact later (arms deletion 5 min after completion)
  docforge fetch 1760000000000-3f2a9c41d0be.pdf -o merged.pdf

  # Inspect and reclaim the store
  docforge list --json
  docforge sweep --watch

OPERATIONS:
  merge                        Concatenate 2+ PDFs in argument order
  layout                       Paginate one UTF-8 text file (or - for stdin) into a PDF
  transcode:<png|jpeg|webp>    Convert one PNG / JPEG / WebP image

LIFECYCLE:
  Artifacts older than the TTL (30 min) are removed by the sweeper, which runs
  every 5 min while `docforge sweep --watch` is running. A completed download
  schedules deletion after a grace period (5 min); that timer lives in the
  process that served the download, so a short-lived `fetch` leaves the
  artifact to the sweeper.

ENVIRONMENT VARIABLES:
  DOCFORGE_STORE          Artifact directory (default: $TMPDIR/docforge-artifacts)
  DOCFORGE_PDFIUM_PATH    Directory containing libpdfium
  RUST_LOG                Override log filter (e.g. edgequake_docforge=debug)
"#;

/// Assemble documents into short-lived artifacts and serve them once.
#[derive(Parser, Debug)]
#[command(
    name = "docforge",
    version,
    about = "Assemble documents into short-lived artifacts and serve them once",
    long_about = "Merge PDFs, typeset plain text into PDF pages and convert raster images. \
Every result is stored as an ephemeral artifact that is reclaimed after 30 minutes, or 5 \
minutes after it has been downloaded, whichever comes first.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Directory holding artifacts.
    #[arg(long, global = true, env = "DOCFORGE_STORE")]
    store: Option<PathBuf>,

    /// Directory containing the pdfium shared library.
    #[arg(long, global = true, env = "DOCFORGE_PDFIUM_PATH")]
    pdfium_path: Option<PathBuf>,

    /// Artifact time-to-live in seconds.
    #[arg(long, global = true, env = "DOCFORGE_TTL_SECS", default_value_t = 1800)]
    ttl_secs: u64,

    /// Seconds between sweep passes.
    #[arg(long, global = true, env = "DOCFORGE_SWEEP_INTERVAL_SECS", default_value_t = 300)]
    sweep_interval_secs: u64,

    /// Seconds between a completed download and deletion.
    #[arg(long, global = true, env = "DOCFORGE_GRACE_SECS", default_value_t = 300)]
    grace_secs: u64,

    /// Per-transfer timeout in seconds (downloads in and out).
    #[arg(long, global = true, env = "DOCFORGE_TRANSFER_TIMEOUT", default_value_t = 120)]
    transfer_timeout: u64,

    /// JPEG quality (1–100) for transcode:jpeg.
    #[arg(long, global = true, env = "DOCFORGE_JPEG_QUALITY", default_value_t = 90,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Font size in points for layout.
    #[arg(long, global = true, env = "DOCFORGE_FONT_SIZE", default_value_t = 12.0)]
    font_size: f32,

    /// Page margin in points for layout.
    #[arg(long, global = true, env = "DOCFORGE_MARGIN", default_value_t = 50.0)]
    margin: f32,

    /// Maximum size of one input in bytes.
    #[arg(long, global = true, env = "DOCFORGE_MAX_INPUT_BYTES",
          default_value_t = edgequake_docforge::config::MAX_INPUT_BYTES)]
    max_input_bytes: usize,

    /// Output structured JSON instead of text.
    #[arg(long, global = true, env = "DOCFORGE_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCFORGE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCFORGE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an operation on local files or URLs and store the result.
    Assemble {
        /// merge, layout, or transcode:<png|jpeg|webp>.
        operation: Operation,

        /// Input paths or HTTP/HTTPS URLs; `-` reads stdin.
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Declared kind of a transcode input; rejected if the bytes disagree.
        #[arg(long)]
        from: Option<RasterKind>,

        /// Download the new artifact to this file immediately.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Download an artifact to a file or stdout.
    Fetch {
        id: String,

        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List stored artifacts, oldest first.
    List,

    /// Delete expired artifacts.
    Sweep {
        /// Keep sweeping on the configured interval until Ctrl-C.
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let g = &cli.global;

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if g.verbose {
        "debug"
    } else if g.quiet || g.json {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(g)?;
    let forge = DocForge::open(config)
        .await
        .context("Failed to open artifact store")?;

    match cli.command {
        Command::Assemble {
            operation,
            inputs,
            from,
            output,
        } => {
            let mut loaded = Vec::with_capacity(inputs.len());
            for input in &inputs {
                loaded.push(read_input(input, g).await?);
            }

            let mut request = AssemblyRequest::new(operation, loaded);
            if let Some(kind) = from {
                request = request.with_source_kind(kind);
            }

            let receipt = forge
                .assemble(request)
                .await
                .with_context(|| format!("{} failed", operation))?;

            if g.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&receipt).context("Failed to serialise receipt")?
                );
            } else if g.quiet {
                println!("{}", receipt.artifact.id);
            } else {
                let pages = receipt
                    .page_count
                    .map(|n| format!("  {n} pages"))
                    .unwrap_or_default();
                eprintln!(
                    "{} {}  {}{}  {}",
                    green("✔"),
                    operation,
                    dim(&format!("{} bytes", receipt.artifact.size_bytes)),
                    pages,
                    dim(&format!("{}ms", receipt.duration_ms)),
                );
                println!("{}", receipt.artifact.id);
            }

            if let Some(path) = output {
                fetch_to(&forge, receipt.artifact.id.as_str(), Some(&path), g).await?;
            }
        }

        Command::Fetch { id, output } => {
            fetch_to(&forge, &id, output.as_ref(), g).await?;
        }

        Command::List => {
            let listed = forge.list().await.context("Failed to list artifacts")?;
            if g.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&listed).context("Failed to serialise listing")?
                );
            } else {
                for entry in &listed {
                    println!(
                        "{}  {:<5} {:>10}  {}",
                        entry.artifact.id,
                        entry.artifact.content_kind.extension(),
                        entry.artifact.size_bytes,
                        dim(&format!("{}s old", entry.age.as_secs())),
                    );
                }
                if !g.quiet {
                    eprintln!("{} artifacts", bold(&listed.len().to_string()));
                }
            }
        }

        Command::Sweep { watch } => {
            if watch {
                let handle = forge.start_sweeper();
                if !g.quiet {
                    eprintln!(
                        "{} sweeping every {}s (ttl {}s), Ctrl-C to stop",
                        cyan("◆"),
                        g.sweep_interval_secs,
                        g.ttl_secs
                    );
                }
                tokio::signal::ctrl_c()
                    .await
                    .context("Failed to listen for Ctrl-C")?;
                handle.abort();
            } else {
                let report = forge.sweep_now().await;
                if g.json {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&report)
                            .context("Failed to serialise sweep report")?
                    );
                } else if !g.quiet {
                    eprintln!(
                        "{} {} scanned, {} deleted, {} failed",
                        green("✔"),
                        report.scanned,
                        report.deleted,
                        report.failed
                    );
                }
            }
        }
    }

    Ok(())
}

/// Map CLI args to `ForgeConfig`.
fn build_config(g: &GlobalArgs) -> Result<ForgeConfig> {
    let page = PageGeometry {
        font_size: g.font_size,
        margin: g.margin,
        ..PageGeometry::default()
    };

    let mut builder = ForgeConfig::builder()
        .artifact_ttl(Duration::from_secs(g.ttl_secs))
        .sweep_interval(Duration::from_secs(g.sweep_interval_secs))
        .download_grace(Duration::from_secs(g.grace_secs))
        .transfer_timeout(Duration::from_secs(g.transfer_timeout))
        .jpeg_quality(g.jpeg_quality)
        .page(page)
        .max_input_bytes(g.max_input_bytes);

    if let Some(ref root) = g.store {
        builder = builder.store_root(root);
    }
    if let Some(ref dir) = g.pdfium_path {
        builder = builder.pdfium_library_path(dir);
    }

    builder.build().context("Invalid configuration")
}

/// Load one input argument, honouring the size cap.
async fn read_input(input: &str, g: &GlobalArgs) -> Result<Vec<u8>> {
    if input == "-" {
        let mut bytes = Vec::new();
        tokio::io::stdin()
            .take(g.max_input_bytes as u64 + 1)
            .read_to_end(&mut bytes)
            .await
            .context("Failed to read stdin")?;
        if bytes.len() > g.max_input_bytes {
            anyhow::bail!("stdin is larger than the {} byte limit", g.max_input_bytes);
        }
        return Ok(bytes);
    }
    load_input(input, g.max_input_bytes, Duration::from_secs(g.transfer_timeout))
        .await
        .with_context(|| format!("Failed to load {}", input))
}

/// Download `id` into `path`, or stdout when `path` is `None`.
async fn fetch_to(
    forge: &DocForge,
    id: &str,
    path: Option<&PathBuf>,
    g: &GlobalArgs,
) -> Result<()> {
    let download = forge
        .retrieve(id)
        .await
        .with_context(|| format!("Cannot fetch {}", id))?;

    let written = match path {
        Some(path) => {
            let mut file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?;
            download.send_to(&mut file).await?
        }
        None => {
            let mut stdout = tokio::io::stdout();
            download.send_to(&mut stdout).await?
        }
    };

    if !g.quiet && !g.json {
        if let Some(path) = path {
            eprintln!(
                "{} {} bytes  →  {}",
                green("✔"),
                written,
                bold(&path.display().to_string())
            );
        }
    }
    Ok(())
}
