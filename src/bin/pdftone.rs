//! CLI binary for pdftone.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, submits one batch and renders its progress.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdftone::{
    inspect, BackendRegistry, BatchJob, BatchOutcome, BatchReport, BatchRunner, ConversionConfig,
    MergeOrder, PageFormat, SuffixStyle, Tone,
};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
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
  # Grayscale a folder of scans
  pdftone convert scans/*.pdf -o out/

  # Sepia photos with title-case suffixes (photo_Sepia.jpg)
  pdftone convert --tone sepia --title-suffix photo.jpg -o out/

  # Merge three PDFs in a custom order
  pdftone merge a.pdf b.pdf c.pdf --order 3,1,2 -o out/

  # Convert images and PDFs, then merge the results into one PDF
  pdftone combine cover.png report.pdf -o out/ --name report_bw.pdf

  # Which backends are installed?
  pdftone backends

PIPELINE TIERS (best available is used for every PDF in a batch):
  high fidelity    pdfium            source page size, colors converted
  rasterize        pdftoppm + lopdf  fixed page format, colors converted
  structural copy  lopdf             pages copied, colors NOT converted

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH   Path to an existing libpdfium
  PDFIUM_CACHE_DIR  Directory searched for a cached libpdfium
  RUST_LOG          Override the log filter (e.g. pdftone=debug)
"#;

/// Convert images and PDFs to grayscale or sepia, and merge PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "pdftone",
    version,
    about = "Convert images and PDFs to grayscale or sepia, and merge PDFs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print results as JSON instead of text.
    #[arg(long, global = true, env = "PDFTONE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "PDFTONE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFTONE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDFTONE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert each file to grayscale or sepia.
    Convert {
        /// Images (.jpg .jpeg .png .bmp .tiff .tif .gif) and PDFs.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        out: OutputArgs,

        #[command(flatten)]
        tone: ToneArgs,

        /// Delete each source file after it was converted.
        #[arg(long, env = "PDFTONE_DELETE_ORIGINALS")]
        delete_originals: bool,
    },

    /// Merge PDFs into one document.
    Merge {
        /// PDF files, at least two.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        out: OutputArgs,

        /// selection, alphabetical, or a 1-indexed permutation such as 3,1,2.
        #[arg(long, env = "PDFTONE_ORDER", default_value = "selection")]
        order: String,
    },

    /// Convert each file, then merge the results into one PDF.
    Combine {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        out: OutputArgs,

        #[command(flatten)]
        tone: ToneArgs,

        /// Keep the temporary directory holding the converted files.
        #[arg(long, env = "PDFTONE_KEEP_INTERMEDIATES")]
        keep_intermediates: bool,

        /// Delete each source file once it was merged.
        #[arg(long, env = "PDFTONE_DELETE_ORIGINALS")]
        delete_originals: bool,
    },

    /// Print size, type, page count or dimensions of each file.
    Inspect {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show which rendering backends are available.
    Backends {
        /// Explicit pdftoppm executable to probe.
        #[arg(long, env = "PDFTONE_PDFTOPPM")]
        pdftoppm: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Output directory.
    #[arg(short, long, env = "PDFTONE_OUTPUT_DIR")]
    output: PathBuf,

    /// File name of the merged PDF.
    #[arg(long, env = "PDFTONE_MERGE_NAME")]
    name: Option<String>,
}

#[derive(Args, Debug)]
struct ToneArgs {
    /// Target tone.
    #[arg(long, env = "PDFTONE_TONE", value_enum, default_value = "grayscale")]
    tone: ToneArg,

    /// Use _BW / _Sepia instead of _bw / _sepia in output names.
    #[arg(long, env = "PDFTONE_TITLE_SUFFIX")]
    title_suffix: bool,

    /// pdfium render magnification (1.0–4.0).
    #[arg(long, env = "PDFTONE_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// pdftoppm rasterisation DPI (72–600).
    #[arg(long, env = "PDFTONE_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Page format for rasterised pages.
    #[arg(long, env = "PDFTONE_PAGE_FORMAT", value_enum, default_value = "letter")]
    page_format: PageFormatArg,

    /// Margin around rasterised pages, in points.
    #[arg(long, env = "PDFTONE_MARGIN", default_value_t = 20.0)]
    margin: f32,

    /// Explicit pdftoppm executable.
    #[arg(long, env = "PDFTONE_PDFTOPPM")]
    pdftoppm: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ToneArg {
    Grayscale,
    Sepia,
}

impl From<ToneArg> for Tone {
    fn from(v: ToneArg) -> Self {
        match v {
            ToneArg::Grayscale => Tone::Grayscale,
            ToneArg::Sepia => Tone::Sepia,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PageFormatArg {
    Letter,
    A4,
}

impl From<PageFormatArg> for PageFormat {
    fn from(v: PageFormatArg) -> Self {
        match v {
            PageFormatArg::Letter => PageFormat::Letter,
            PageFormatArg::A4 => PageFormat::A4,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless verbose output was asked for.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
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

    let presentation = Presentation {
        json: cli.json,
        quiet: cli.quiet,
        progress: show_progress,
    };

    match cli.command {
        Command::Inspect { ref files } => run_inspect(files, cli.json),
        Command::Backends { ref pdftoppm } => run_backends(pdftoppm.clone(), cli.json),
        Command::Convert {
            files,
            out,
            tone,
            delete_originals,
        } => {
            let config = tone_config(&out, &tone)
                .delete_originals(delete_originals)
                .build()
                .context("Invalid configuration")?;
            run_batch(BatchJob::Convert { files }, config, &presentation).await
        }
        Command::Merge { files, out, order } => {
            let order = parse_order(&order)?;
            let mut builder = ConversionConfig::builder().output_dir(&out.output);
            if let Some(ref name) = out.name {
                builder = builder.merge_output_name(name);
            }
            let config = builder.build().context("Invalid configuration")?;
            run_batch(
                BatchJob::Merge { files, order },
                config,
                &presentation,
            )
            .await
        }
        Command::Combine {
            files,
            out,
            tone,
            keep_intermediates,
            delete_originals,
        } => {
            let config = tone_config(&out, &tone)
                .keep_intermediates(keep_intermediates)
                .delete_originals(delete_originals)
                .build()
                .context("Invalid configuration")?;
            run_batch(
                BatchJob::ConvertAndMerge { files },
                config,
                &presentation,
            )
            .await
        }
    }
}

/// How batch results are shown.
struct Presentation {
    json: bool,
    quiet: bool,
    progress: bool,
}

/// Map shared tone flags onto a config builder.
fn tone_config(out: &OutputArgs, args: &ToneArgs) -> pdftone::ConversionConfigBuilder {
    let mut builder = ConversionConfig::builder()
        .tone(args.tone.into())
        .output_dir(&out.output)
        .render_scale(args.scale)
        .raster_dpi(args.dpi)
        .page_format(args.page_format.into())
        .margin_pt(args.margin)
        .suffix_style(if args.title_suffix {
            SuffixStyle::Title
        } else {
            SuffixStyle::Lower
        });
    if let Some(ref name) = out.name {
        builder = builder.merge_output_name(name);
    }
    if let Some(ref path) = args.pdftoppm {
        builder = builder.pdftoppm_path(path);
    }
    builder
}

/// Parse `--order` into a [`MergeOrder`].
fn parse_order(s: &str) -> Result<MergeOrder> {
    let s = s.trim().to_lowercase();
    match s.as_str() {
        "selection" => return Ok(MergeOrder::Selection),
        "alphabetical" | "alpha" => return Ok(MergeOrder::Alphabetical),
        _ => {}
    }

    let positions = s
        .split(',')
        .map(|p| {
            p.trim()
                .parse::<usize>()
                .with_context(|| format!("Invalid position in merge order: '{}'", p.trim()))
        })
        .collect::<Result<Vec<_>>>()?;
    if positions.contains(&0) {
        bail!("Merge order positions are 1-indexed (got 0)");
    }
    Ok(MergeOrder::Custom(positions))
}

// ── Batch commands ───────────────────────────────────────────────────────

async fn run_batch(job: BatchJob, config: ConversionConfig, display: &Presentation) -> Result<()> {
    let registry = BackendRegistry::probe(&config).context("Backend check failed")?;
    if !display.quiet && !display.json {
        for kind in registry.missing_optional() {
            eprintln!(
                "{} {} not found: {}",
                cyan("⚠"),
                bold(&kind.to_string()),
                dim(kind.install_hint())
            );
        }
        eprintln!("{} Using {} pipeline", cyan("◆"), bold(&registry.tier().to_string()));
    }

    let runner = BatchRunner::new(Arc::new(registry));
    let mut handle = runner.submit(job, config).context("Could not start batch")?;
    let started = Instant::now();

    let bar = if display.progress {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Working");
        bar.enable_steady_tick(Duration::from_millis(80));
        Some(bar)
    } else {
        None
    };

    // Ctrl-C while files are being written asks first instead of killing the worker.
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(ev) => {
                    if let Some(ref bar) = bar {
                        bar.set_position(ev.percent.round() as u64);
                        bar.set_message(ev.message.clone());
                    }
                }
                None => break,
            },
            _ = &mut interrupt => {
                if confirm_stop(bar.as_ref()).await {
                    if let Some(ref bar) = bar {
                        bar.abandon_with_message("stopped");
                    }
                    eprintln!("{} Batch interrupted; files in progress were not written", red("✘"));
                    std::process::exit(130);
                }
                interrupt.set(tokio::signal::ctrl_c());
            }
        }
    }
    let report = handle.wait().await;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    if display.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !display.quiet {
        print_report(&report, started.elapsed());
    }

    if report.outcome() == BatchOutcome::Failed {
        bail!("No file was processed successfully");
    }
    Ok(())
}

/// Ask whether a running batch should be abandoned.
///
/// Without a terminal to answer on, a second Ctrl-C counts as confirmation.
/// The worker stalls on its next progress event while the question is open.
async fn confirm_stop(bar: Option<&ProgressBar>) -> bool {
    let say = |line: String| match bar {
        Some(bar) => bar.println(line),
        None => eprintln!("{line}"),
    };

    if !io::stdin().is_terminal() {
        say(format!(
            "{} A batch is still running. Press Ctrl-C again to stop it.",
            cyan("⚠")
        ));
        return tokio::signal::ctrl_c().await.is_ok();
    }

    say(format!(
        "{} A batch is still running. Stop it and exit? [y/N]",
        cyan("⚠")
    ));
    let answer = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        io::stdin().read_line(&mut line).map(|_| line)
    })
    .await;
    match answer {
        Ok(Ok(line)) => is_yes(&line),
        _ => false,
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn print_report(report: &BatchReport, elapsed: Duration) {
    let mark = match report.outcome() {
        BatchOutcome::Success => green("✔"),
        BatchOutcome::PartialSuccess => cyan("⚠"),
        BatchOutcome::Failed => red("✘"),
    };
    eprintln!(
        "{}  {}/{} files  {}",
        mark,
        bold(&report.successful.to_string()),
        report.total,
        dim(&format!("{:.1}s", elapsed.as_secs_f64())),
    );
    for failure in &report.failed_files {
        eprintln!("  {} {}", red("✗"), failure);
    }
    for out in &report.outputs {
        eprintln!("  {} {}", green("✓"), out.display());
    }
    if let Some(ref merged) = report.merged_output {
        eprintln!("  {} merged  →  {}", green("✓"), bold(&merged.display().to_string()));
    }
    if let Some(ref dir) = report.intermediates_dir {
        eprintln!("  {} intermediates kept in {}", dim("·"), dir.display());
    }
    if report.deleted_originals > 0 {
        eprintln!("  {} {} originals deleted", dim("·"), report.deleted_originals);
    }
}

// ── Informational commands ───────────────────────────────────────────────

fn run_inspect(files: &[PathBuf], json: bool) -> Result<()> {
    let infos = files
        .iter()
        .map(|f| inspect(f).with_context(|| format!("Failed to inspect {}", f.display())))
        .collect::<Result<Vec<_>>>()?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&infos).context("Failed to serialise file info")?
        );
        return Ok(());
    }

    for info in &infos {
        println!("File:         {}", info.path.display());
        println!("Type:         {} ({})", info.kind, info.extension);
        println!("Size:         {}", info.size_str);
        if let Some(pages) = info.pages {
            println!("Pages:        {}", pages);
        }
        if let Some((w, h)) = info.dimensions {
            println!("Dimensions:   {}x{}", w, h);
        }
        if let Some(ref mode) = info.color_mode {
            println!("Color:        {}", mode);
        }
        println!();
    }
    Ok(())
}

fn run_backends(pdftoppm: Option<PathBuf>, json: bool) -> Result<()> {
    let mut builder = ConversionConfig::builder();
    if let Some(path) = pdftoppm {
        builder = builder.pdftoppm_path(path);
    }
    let config = builder.build().context("Invalid configuration")?;
    let registry = BackendRegistry::probe(&config).context("Backend check failed")?;
    let statuses = registry.report();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&statuses).context("Failed to serialise backends")?
        );
        return Ok(());
    }

    for status in &statuses {
        let mark = if status.available { green("✓") } else { red("✗") };
        let kind = if status.required { "required" } else { "optional" };
        println!(
            "{} {:<10} {}  {}",
            mark,
            status.backend.to_string(),
            dim(kind),
            status.description
        );
        if let Some(ref location) = status.location {
            println!("    {}", dim(location));
        }
        if let Some(ref hint) = status.hint {
            println!("    {}", cyan(hint));
        }
    }
    println!();
    println!("Pipeline tier: {}", bold(&registry.tier().to_string()));
    Ok(())
}
