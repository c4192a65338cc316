use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use pinpress::batch::pipeline::{BatchOptions, BatchPipeline, BatchRunStatus, PauseSignal};
use pinpress::render::headless::{PinRenderer, RendererConfig};
use pinpress::store::kv::MemoryStore;
use pinpress::store::sink::DirPinSink;
use pinpress::{Campaign, DataRow, FieldMapping, Template};

#[derive(Parser, Debug)]
#[command(name = "pinpress", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one template+row pair as a PNG.
    Preview(PreviewArgs),
    /// Run a campaign's batch pipeline into an output directory.
    Batch(BatchArgs),
}

#[derive(Parser, Debug)]
struct PreviewArgs {
    /// Template JSON.
    #[arg(long)]
    template: PathBuf,

    /// Rows JSON (array of string-keyed objects). Optional for static
    /// templates.
    #[arg(long)]
    rows: Option<PathBuf>,

    /// Row index into the rows file.
    #[arg(long, default_value_t = 0)]
    index: usize,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Bundled font directory.
    #[arg(long)]
    font_dir: Option<PathBuf>,

    /// Remote font repository base URL.
    #[arg(long)]
    font_repo: Option<String>,

    /// Allow http(s) image sources.
    #[arg(long)]
    remote_images: bool,
}

#[derive(Parser, Debug)]
struct BatchArgs {
    /// Campaign JSON (templates + rows + mapping inline).
    #[arg(long)]
    campaign: PathBuf,

    /// Output directory for PNGs and progress.
    #[arg(long)]
    out: PathBuf,

    /// Rows per batch (also the intra-batch parallelism).
    #[arg(long, default_value_t = 10)]
    batch_size: usize,

    /// Bundled font directory.
    #[arg(long)]
    font_dir: Option<PathBuf>,

    /// Remote font repository base URL.
    #[arg(long)]
    font_repo: Option<String>,

    /// Allow http(s) image sources.
    #[arg(long)]
    remote_images: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Preview(args) => cmd_preview(args),
        Command::Batch(args) => cmd_batch(args),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> anyhow::Result<T> {
    let f = File::open(path).with_context(|| format!("open {what} '{}'", path.display()))?;
    let r = BufReader::new(f);
    serde_json::from_reader(r).with_context(|| format!("parse {what} JSON"))
}

fn renderer_config(
    font_dir: Option<PathBuf>,
    font_repo: Option<String>,
    remote_images: bool,
    asset_root: Option<&Path>,
) -> RendererConfig {
    RendererConfig {
        font_dir,
        font_repo_url: font_repo,
        image_root: asset_root.map(Path::to_path_buf),
        remote_images,
    }
}

fn cmd_preview(args: PreviewArgs) -> anyhow::Result<()> {
    let template: Template = read_json(&args.template, "template")?;
    template.validate()?;

    let rows: Vec<DataRow> = match &args.rows {
        Some(path) => read_json(path, "rows")?,
        None => vec![DataRow::new()],
    };
    let row = rows
        .get(args.index)
        .with_context(|| format!("row index {} out of range ({} rows)", args.index, rows.len()))?;

    let asset_root = args.template.parent().unwrap_or_else(|| Path::new("."));
    let config = renderer_config(
        args.font_dir,
        args.font_repo,
        args.remote_images,
        Some(asset_root),
    );

    let mut renderer = PinRenderer::new(&config);
    let pin = renderer.render(&template, row, &FieldMapping::new())?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        &args.out,
        &pin.data,
        pin.width,
        pin.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_batch(args: BatchArgs) -> anyhow::Result<()> {
    let campaign: Campaign = read_json(&args.campaign, "campaign")?;

    let asset_root = args.campaign.parent().unwrap_or_else(|| Path::new("."));
    let config = renderer_config(
        args.font_dir,
        args.font_repo,
        args.remote_images,
        Some(asset_root),
    );

    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(DirPinSink::new(&args.out)?);
    let opts = BatchOptions {
        batch_size: args.batch_size,
        ..BatchOptions::default()
    };

    let pipeline = BatchPipeline::new(store, sink, config, opts);
    let report = pipeline.run(&campaign, &PauseSignal::new())?;

    match report.status {
        BatchRunStatus::Skipped => eprintln!("campaign '{}' already running", campaign.id),
        status => {
            eprintln!(
                "campaign '{}': {:?} ({} completed, {} failed)",
                campaign.id, status, report.completed, report.failed
            );
            for err in &report.errors {
                eprintln!("  row {}: {}", err.row_index, err.message);
            }
        }
    }
    Ok(())
}
