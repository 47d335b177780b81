use clap::{ArgAction, Parser, Subcommand};
use simple_frame::assets::{AssetDirs, AssetResolver};
use simple_frame::compose::{Compositor, PreviewSession};
use simple_frame::config::{self, RenderConfig};
use simple_frame::export::{self, ExportRequest, JobState};
use simple_frame::imaging::{ImageBackend, RustBackend, supported_input_extensions};
use simple_frame::types::Size;
use simple_frame::watermark::FontBook;
use simple_frame::{naming, output};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "simple-frame")]
#[command(about = "Frame and watermark photos, then batch-export them")]
#[command(long_about = "\
Frame and watermark photos, then batch-export them

Each photo is placed on a frame (solid color or a blurred extension of the
photo itself) with optional rounded corners and shadows. A watermark made of
a camera logo and an EXIF line (model, focal length, aperture, shutter, ISO)
is anchored in the frame margin or on the photo.

  simple-frame preview DSC_0042.jpg --out preview.png
  simple-frame export ~/Pictures/trip --output framed/

Exports keep the source format and camera metadata and are written as
<name>_framed.<ext>. Directories are searched recursively for images.

Run 'simple-frame gen-config' to generate a documented simple-frame.toml.")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults apply when it does not exist)
    #[arg(long, default_value = config::CONFIG_FILENAME, global = true)]
    config: PathBuf,

    /// More log output (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render one image at preview size and write it as PNG
    Preview {
        image: PathBuf,
        /// Output file
        #[arg(long, default_value = "preview.png")]
        out: PathBuf,
        /// Container width (default from config)
        #[arg(long)]
        width: Option<u32>,
        /// Container height (default from config)
        #[arg(long)]
        height: Option<u32>,
        /// Print the layout rectangles as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export framed images at full resolution
    Export {
        /// Image files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Output directory
        #[arg(short, long, default_value = "framed")]
        output: PathBuf,
        /// Worker threads (capped at cores - 2)
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Print a stock simple-frame.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Preview {
            image,
            out,
            width,
            height,
            json,
        } => {
            let config = RenderConfig::load(&cli.config)?;
            let container = Size::new(
                width.unwrap_or(config.export.preview_width),
                height.unwrap_or(config.export.preview_height),
            );
            let backend = RustBackend::new();
            let source = backend.load(&image)?;
            let metadata = backend.read_metadata(&image);
            debug!("{} metadata entries for {}", metadata.len(), image.display());

            let mut session = PreviewSession::new(build_compositor(&config), container);
            let rendered = session
                .render(&source, &metadata, &config.frame, &config.watermark)
                .ok_or("container too small to render this image")?;
            backend.save(&rendered.image, &out, None)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&rendered.layout)?);
            } else {
                output::print_preview_output(&rendered.layout, &out);
            }
        }
        Command::Export {
            paths,
            output,
            workers,
        } => {
            let config = RenderConfig::load(&cli.config)?;
            let images = collect_images(&paths);
            if images.is_empty() {
                return Err("no supported images found".into());
            }
            output::print_collisions(&naming::find_collisions(&images, &output));

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    output::print_export_event(&event);
                }
            });
            let job = export::start_export(
                Arc::new(RustBackend::new()),
                build_compositor(&config),
                ExportRequest {
                    paths: images,
                    output_dir: output,
                    frame: config.frame.clone(),
                    watermark: config.watermark.clone(),
                    preview_container: config.export.preview_container(),
                    workers: config::effective_workers(workers.or(config.export.max_workers)),
                },
                Some(tx),
            )?;
            let state = job.join();
            if printer.join().is_err() {
                warn!("progress printer panicked");
            }
            if state != JobState::Completed {
                return Err(format!("export {state}").into());
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Install the log subscriber. `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Shared renderer: asset directories from config, system plus user fonts.
fn build_compositor(config: &RenderConfig) -> Arc<Compositor> {
    let assets = AssetDirs::from_config(&config.assets);
    let fonts = FontBook::system().with_user_fonts(&assets.user_font_files());
    Arc::new(Compositor::new(Arc::new(assets), Arc::new(fonts)))
}

/// Expand directories (recursively) into supported image files. Files given
/// explicitly are kept even with an unknown extension; decoding sniffs the
/// format.
fn collect_images(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut images = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| is_supported(p))
                .collect();
            found.sort();
            images.extend(found);
        } else {
            images.push(path.clone());
        }
    }
    images
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            supported_input_extensions()
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
}
