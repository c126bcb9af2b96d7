use clap::Parser;
use std::{path::PathBuf, process};
use stem_splitter::{
    set_download_progress_callback, set_split_progress_callback, split_file, RateMismatchPolicy,
    SplitOptions, SplitProgress, Stage, DEFAULT_MODEL,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stem-splitter")]
#[command(about = "Split a song into drums, bass, other and vocals", long_about = None)]
#[command(version)]
struct Cli {
    /// Audio file to separate
    #[arg(short, long)]
    input: PathBuf,

    /// Directory the four stem files are written to (created if missing)
    #[arg(short, long)]
    output: PathBuf,

    /// Model name from the bundled registry
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Fetch the model manifest from this URL instead of the registry
    #[arg(long)]
    manifest_url: Option<String>,

    /// What to do with input that is not at 44.1 kHz
    #[arg(long, value_enum, default_value_t = RateMismatchPolicy::Resample)]
    on_rate_mismatch: RateMismatchPolicy,

    /// Print only the written stem paths
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if !cli.quiet {
        setup_progress_callbacks();
    }

    let opts = SplitOptions::default()
        .output_dir(&cli.output)
        .model(&cli.model)
        .manifest_url(cli.manifest_url.clone())
        .on_rate_mismatch(cli.on_rate_mismatch);

    if !cli.quiet {
        eprintln!("🎵 Stem Splitter");
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        eprintln!("Input:  {}", cli.input.display());
        eprintln!("Output: {}", cli.output.display());
        eprintln!("Model:  {}", cli.model);
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let report = match split_file(&cli.input, &opts) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("❌ {e}");
            process::exit(1);
        }
    };

    if cli.quiet {
        for outcome in report.stems.iter().filter(|s| s.is_written()) {
            println!("{}", outcome.path.display());
        }
    } else if report.failed() == 0 {
        eprintln!("🎉 All stems written to {}", report.output_dir.display());
    } else {
        eprintln!(
            "⚠️ Finished with {} of {} stems written to {} ({} failed)",
            report.written(),
            report.stems.len(),
            report.output_dir.display(),
            report.failed()
        );
    }
}

fn setup_progress_callbacks() {
    set_download_progress_callback(|downloaded, total| {
        if total > 0 {
            let percent = (downloaded as f64 / total as f64 * 100.0).round() as u64;
            let downloaded_mb = downloaded as f64 / 1_000_000.0;
            let total_mb = total as f64 / 1_000_000.0;
            eprint!(
                "\r📥 Downloading model: {:>3}% ({:.2} MB / {:.2} MB)",
                percent, downloaded_mb, total_mb
            );
            if downloaded >= total {
                eprintln!();
            }
        } else {
            eprint!("\r📥 Downloading model: {:.2} MB", downloaded as f64 / 1_000_000.0);
        }
    });

    set_split_progress_callback(|progress| match progress {
        SplitProgress::Stage(stage) => {
            let line = match stage {
                Stage::ResolveOutput => "📂 Preparing output directory",
                Stage::LoadAudio => "🔍 Loading audio",
                Stage::NormalizeRate => "📏 Checking sample rate",
                Stage::LoadModel => "📦 Loading model",
                Stage::Separate => "🧠 Running model inference",
                Stage::WriteStem => "💾 Writing stems",
            };
            eprintln!("{line}");
        }
        SplitProgress::AudioLoaded {
            sample_rate,
            channels,
            frames,
        } => {
            eprintln!(
                "🎧 Loaded audio: {} Hz, {} channels, {} frames",
                sample_rate, channels, frames
            );
        }
        SplitProgress::Resampling { from, to } => {
            eprintln!("🔁 Resampling {} Hz → {} Hz", from, to);
        }
        SplitProgress::Chunks { done, total } => {
            let percent = if *total > 0 {
                *done as f64 / *total as f64 * 100.0
            } else {
                100.0
            };
            eprint!("\r🔄 Processing: {}/{} windows ({:.0}%)", done, total, percent);
            if done >= total {
                eprintln!();
            }
        }
        SplitProgress::StemWritten { stem, path } => {
            eprintln!("✅ Saved {} to {}", stem, path.display());
        }
        SplitProgress::StemFailed { stem, path, error } => {
            eprintln!("❌ Failed to save {} to {}: {}", stem, path.display(), error);
        }
        SplitProgress::Finished { written, failed } => {
            eprintln!("📊 {} written, {} failed", written, failed);
        }
    });
}
