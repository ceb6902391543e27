use clap::{Parser, Subcommand};
use shrinkix::batch::{self, Placement};
use shrinkix::config::{self, ProcessingConfig};
use shrinkix::imaging::{Container, ExifCodec, RustBackend};
use shrinkix::output;
use shrinkix::pipeline::ShrinkPipeline;
use std::path::PathBuf;

const DEFAULT_OUTPUT_DIR: &str = "shrunk";

#[derive(Parser)]
#[command(name = "shrinkix")]
#[command(about = "Shrink images for the web")]
#[command(long_about = "\
Shrink images for the web

Each image is resized to fit the configured bounds, optionally reduced to a
palette, re-encoded in the most suitable web container and written with only
the metadata you choose to keep.

Format selection (first match wins):
  --format given     → that container
  --prefer-webp      → lossless WebP
  GIF / BMP / TIFF   → same container as the input
  palette or alpha   → PNG
  otherwise          → JPEG

Settings come from stock defaults, then --config FILE, then flags.
Run 'shrinkix gen-config' to generate a documented shrinkix.toml.")]
#[command(version)]
struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Shrink images and directories of images
    Shrink(ShrinkArgs),
    /// Print a stock shrinkix.toml with all options documented
    GenConfig,
}

#[derive(clap::Args)]
struct ShrinkArgs {
    /// Images or directories (walked recursively)
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Directory for shrunk images [default: shrunk]
    #[arg(short, long, conflicts_with = "in_place")]
    output_dir: Option<PathBuf>,

    /// Replace the source images
    #[arg(long)]
    in_place: bool,

    /// Config file layered over the stock defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum output width in pixels
    #[arg(long)]
    max_width: Option<u32>,

    /// Maximum output height in pixels
    #[arg(long)]
    max_height: Option<u32>,

    /// Keep the source metadata
    #[arg(short, long)]
    keep_metadata: bool,

    /// Reduce to at most this many colors (1-256)
    #[arg(short, long)]
    colors: Option<u16>,

    /// Estimate a color count per image when --colors is not given
    #[arg(long)]
    estimate_colors: bool,

    /// Dither when reducing colors
    #[arg(short, long)]
    dither: bool,

    /// Output container: jpeg, png, webp or unchanged
    #[arg(short, long)]
    format: Option<Container>,

    /// JPEG quality (1-100)
    #[arg(short, long)]
    quality: Option<u32>,

    /// Pick JPEG quality from the image size
    #[arg(long)]
    adaptive_quality: bool,

    /// Encode everything as lossless WebP unless --format is given
    #[arg(long)]
    prefer_webp: bool,

    /// Flatten transparency onto this color (#rrggbb)
    #[arg(short, long)]
    background: Option<String>,

    /// Artist written into the output metadata
    #[arg(long)]
    artist: Option<String>,

    /// Copyright written into the output metadata
    #[arg(long)]
    copyright: Option<String>,

    /// Maximum parallel workers
    #[arg(long)]
    max_processes: Option<usize>,

    /// Write a JSON summary to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

impl ShrinkArgs {
    /// Flags as a TOML overlay; only flags that were given appear.
    fn overrides(&self) -> toml::Value {
        let mut root = toml::Table::new();
        let mut section = |name: &str, entries: Vec<(&str, Option<toml::Value>)>| {
            let table: toml::Table = entries
                .into_iter()
                .filter_map(|(key, value)| value.map(|v| (key.to_string(), v)))
                .collect();
            if !table.is_empty() {
                root.insert(name.to_string(), toml::Value::Table(table));
            }
        };
        let int = |v: u64| toml::Value::Integer(v as i64);
        let flag = |set: bool| set.then_some(toml::Value::Boolean(true));
        let text = |s: &Option<String>| s.clone().map(toml::Value::String);

        section(
            "resize",
            vec![
                ("max_width", self.max_width.map(|v| int(v.into()))),
                ("max_height", self.max_height.map(|v| int(v.into()))),
            ],
        );
        section(
            "palette",
            vec![
                ("target_color_count", self.colors.map(|v| int(v.into()))),
                ("estimate_colors", flag(self.estimate_colors)),
                ("dithering", flag(self.dither)),
            ],
        );
        section(
            "metadata",
            vec![
                ("keep_metadata", flag(self.keep_metadata)),
                ("artist", text(&self.artist)),
                ("copyright", text(&self.copyright)),
            ],
        );
        section(
            "output",
            vec![
                (
                    "format",
                    self.format
                        .map(|f| toml::Value::String(f.to_string().to_ascii_lowercase())),
                ),
                ("quality", self.quality.map(|v| int(v.into()))),
                ("adaptive_quality", flag(self.adaptive_quality)),
                ("prefer_webp", flag(self.prefer_webp)),
                ("background", text(&self.background)),
            ],
        );
        section(
            "processing",
            vec![("max_processes", self.max_processes.map(|v| int(v as u64)))],
        );
        toml::Value::Table(root)
    }

    fn placement(&self) -> Placement {
        if self.in_place {
            Placement::InPlace
        } else {
            Placement::Directory(
                self.output_dir
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            )
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Shrink(args) => {
            let config = config::load_config(args.config.as_deref(), args.overrides())?;
            init_thread_pool(&config.processing);

            let backend = RustBackend::new();
            let codec = ExifCodec;
            let pipeline = ShrinkPipeline::new(config, &backend, &codec)?;
            let sources = batch::discover(&args.paths)?;

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_batch_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let report = batch::run_batch(&pipeline, &sources, &args.placement(), Some(tx));
            printer.join().map_err(|_| "progress printer panicked")?;

            println!();
            output::print_batch_summary(&report);
            if let Some(path) = &args.report {
                report.write_json(path)?;
            }
            if report.has_failures() {
                return Err(format!("{} of {} images failed", report.failed.len(), sources.len()).into());
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// `-v` turns on debug output for this crate; `RUST_LOG` wins when set.
fn init_logging(verbose: bool) {
    let default = if verbose { "shrinkix=debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores: users can constrain down, not up.
fn init_thread_pool(processing: &ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
