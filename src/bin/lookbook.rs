//! CLI for Lookbook - fashion photo studio with API key failover.

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use lookbook::{
    AspectRatio, FashionBrief, GeminiGateway, GeminiModel, GeneratedImage, InputImage, Studio,
    StudioConfig,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lookbook")]
#[command(about = "Fashion photo studio on generative image APIs, with multi-key failover")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Directory holding the key pool and gallery
    #[arg(long, global = true, env = "LOOKBOOK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Timeout for each remote call, in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Variations generated at the same time (1-5)
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Ignore the API_KEY environment variable and always use the key pool
    #[arg(long, global = true)]
    no_override: bool,

    /// Image model
    #[arg(long, global = true, default_value = "gemini-2.5-flash-image")]
    image_model: String,

    /// Text model used for suggestions
    #[arg(long, global = true, default_value = lookbook::image::providers::DEFAULT_TEXT_MODEL)]
    text_model: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the API key pool
    #[command(subcommand)]
    Keys(KeysCommand),

    /// Manage saved results
    #[command(subcommand)]
    Gallery(GalleryCommand),

    /// Restyle clothing and background
    Generate(GenerateArgs),

    /// Replace the background behind the subject
    Background(BackgroundArgs),

    /// Put the subject in new poses
    Pose(PoseArgs),

    /// Change the subject's facial expression
    Expression(ExpressionArgs),

    /// Re-render an image at higher resolution
    Upscale(UpscaleArgs),

    /// Ask for background or pose ideas
    #[command(subcommand)]
    Suggest(SuggestCommand),
}

#[derive(Subcommand)]
enum KeysCommand {
    /// Show the pool (keys are masked)
    Show,
    /// Replace the pool with one key per line, read from a file or stdin
    Set {
        /// File to read; stdin when omitted
        file: Option<PathBuf>,
    },
    /// Check every key against the service
    Check,
}

#[derive(Subcommand)]
enum GalleryCommand {
    /// List saved results, newest first
    List,
    /// Remove the result at a position
    Remove {
        /// Position as shown by `gallery list`
        position: usize,
    },
    /// Write a saved result to a file
    Export {
        /// Position as shown by `gallery list`
        position: usize,
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Args)]
struct OutputArgs {
    /// Output directory
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Also save the results to the gallery
    #[arg(long)]
    keep: bool,
}

#[derive(Args)]
struct GenerateArgs {
    /// Source photo
    input: PathBuf,

    /// Clothing style
    #[arg(long, default_value = "High Fashion")]
    fashion_type: String,

    /// Background description
    #[arg(long, default_value = "Pastel pink studio")]
    background: String,

    /// Number of variations (1-6)
    #[arg(short = 'n', long, default_value_t = 2)]
    variations: usize,

    /// Aspect ratio
    #[arg(long, value_enum, default_value = "4:5")]
    aspect_ratio: AspectRatioArg,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct BackgroundArgs {
    /// Source photo
    input: PathBuf,

    /// New background description
    #[arg(short, long)]
    prompt: String,

    /// Aspect ratio
    #[arg(long, value_enum, default_value = "4:5")]
    aspect_ratio: AspectRatioArg,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct PoseArgs {
    /// Source photo
    input: PathBuf,

    /// Pose idea; the model invents poses when omitted
    #[arg(long, default_value = "")]
    hint: String,

    /// Number of variations (1-6)
    #[arg(short = 'n', long, default_value_t = 2)]
    variations: usize,

    /// Aspect ratio
    #[arg(long, value_enum, default_value = "4:5")]
    aspect_ratio: AspectRatioArg,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct ExpressionArgs {
    /// Source photo
    input: PathBuf,

    /// Target expression, e.g. "gentle smile"
    #[arg(short, long)]
    expression: String,

    /// Aspect ratio
    #[arg(long, value_enum, default_value = "4:5")]
    aspect_ratio: AspectRatioArg,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct UpscaleArgs {
    /// Source photo; use --from-gallery to upscale a saved result instead
    #[arg(required_unless_present = "from_gallery")]
    input: Option<PathBuf>,

    /// Gallery position to upscale
    #[arg(long, conflicts_with = "input")]
    from_gallery: Option<usize>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Subcommand)]
enum SuggestCommand {
    /// Background ideas for a clothing style or a photo
    Backgrounds {
        /// Clothing style
        #[arg(long, required_unless_present = "image")]
        fashion_type: Option<String>,
        /// Photo to analyse
        #[arg(long, conflicts_with = "fashion_type")]
        image: Option<PathBuf>,
    },
    /// Pose ideas
    Poses,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AspectRatioArg {
    #[value(name = "4:5")]
    Portrait,
    #[value(name = "3:4")]
    StandardPortrait,
    #[value(name = "9:16")]
    Story,
    #[value(name = "1:1")]
    Square,
    #[value(name = "16:9")]
    Landscape,
}

impl From<AspectRatioArg> for AspectRatio {
    fn from(arg: AspectRatioArg) -> Self {
        match arg {
            AspectRatioArg::Portrait => AspectRatio::Portrait,
            AspectRatioArg::StandardPortrait => AspectRatio::StandardPortrait,
            AspectRatioArg::Story => AspectRatio::Story,
            AspectRatioArg::Square => AspectRatio::Square,
            AspectRatioArg::Landscape => AspectRatio::Landscape,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let result = run(cli).await;
    if let Err(ref e) = result {
        if let Some(hint) = e.downcast_ref::<lookbook::Error>().and_then(guidance) {
            eprintln!("hint: {hint}");
        }
    }
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let studio = open_studio(&cli).await?;
    let json = cli.json;

    match cli.command {
        Commands::Keys(cmd) => run_keys(&studio, cmd, json).await,
        Commands::Gallery(cmd) => run_gallery(&studio, cmd, json).await,
        Commands::Generate(args) => {
            let photo = InputImage::from_path(&args.input)?;
            let brief = FashionBrief::new(args.fashion_type, args.background)
                .with_variations(args.variations)
                .with_aspect_ratio(args.aspect_ratio.into());
            let images = studio.generate_fashion(&photo, &brief).await?;
            deliver(&studio, &images, "fashion", &args.output, json).await
        }
        Commands::Background(args) => {
            let photo = InputImage::from_path(&args.input)?;
            let image = studio
                .change_background(&photo, &args.prompt, args.aspect_ratio.into())
                .await?;
            deliver(&studio, &[image], "background", &args.output, json).await
        }
        Commands::Pose(args) => {
            let photo = InputImage::from_path(&args.input)?;
            let images = studio
                .transfer_pose(&photo, &args.hint, args.variations, args.aspect_ratio.into())
                .await?;
            deliver(&studio, &images, "pose", &args.output, json).await
        }
        Commands::Expression(args) => {
            let photo = InputImage::from_path(&args.input)?;
            let image = studio
                .change_expression(&photo, &args.expression, args.aspect_ratio.into())
                .await?;
            deliver(&studio, &[image], "expression", &args.output, json).await
        }
        Commands::Upscale(args) => {
            let photo = match (args.input, args.from_gallery) {
                (Some(path), _) => InputImage::from_path(path)?,
                (None, Some(position)) => {
                    InputImage::from_data_url(&gallery_entry(&studio, position).await?)?
                }
                (None, None) => anyhow::bail!("pass an input file or --from-gallery"),
            };
            let image = studio.upscale(&photo).await?;
            deliver(&studio, &[image], "upscaled", &args.output, json).await
        }
        Commands::Suggest(cmd) => run_suggest(&studio, cmd, json).await,
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lookbook=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn open_studio(cli: &Cli) -> anyhow::Result<Studio> {
    let mut builder = StudioConfig::builder();
    if let Some(ref dir) = cli.data_dir {
        builder = builder.data_dir(dir);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    if let Some(n) = cli.concurrency {
        builder = builder.concurrency(n);
    }
    if cli.no_override {
        builder = builder.no_override();
    }
    let config = builder.build()?;

    let image_model: GeminiModel = cli.image_model.parse()?;
    let gateway = GeminiGateway::builder()
        .image_model(image_model)
        .text_model(&cli.text_model)
        .build();

    Ok(Studio::open(&config, Arc::new(gateway)).await)
}

/// Turns a credential error into advice for the user.
fn guidance(error: &lookbook::Error) -> Option<&'static str> {
    match error {
        lookbook::Error::NoCredentials => Some("add keys with `lookbook keys set <file>`"),
        lookbook::Error::AllCredentialsExhausted { .. } => {
            Some("run `lookbook keys check` to see which keys still work")
        }
        lookbook::Error::OverrideCredential(_) => {
            Some("fix or unset API_KEY, or pass --no-override to use the key pool")
        }
        lookbook::Error::Persistence(_) => Some("check that --data-dir is writable"),
        _ => None,
    }
}

async fn run_keys(studio: &Studio, cmd: KeysCommand, json: bool) -> anyhow::Result<()> {
    let pool = studio.credentials();
    match cmd {
        KeysCommand::Show => {
            let keys: Vec<String> = pool.credentials().iter().map(|k| k.masked()).collect();
            if json {
                let out = serde_json::json!({
                    "keys": keys,
                    "next": pool.current_index(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else if keys.is_empty() {
                println!("No API keys configured.");
            } else {
                for (i, key) in keys.iter().enumerate() {
                    let marker = if i == pool.current_index() { "→" } else { " " };
                    println!("{marker} {:>2}. {key}", i + 1);
                }
            }
        }
        KeysCommand::Set { file } => {
            let raw = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            pool.persist(&raw).await?;
            if json {
                println!("{}", serde_json::json!({ "saved": pool.len() }));
            } else {
                println!("Saved {} API key(s).", pool.len());
            }
        }
        KeysCommand::Check => {
            let keys = pool.credentials();
            let report = studio.check_keys().await;
            if json {
                let rows: Vec<_> = report
                    .iter()
                    .map(|(i, r)| {
                        serde_json::json!({
                            "position": i + 1,
                            "key": keys[*i].masked(),
                            "ok": r.is_ok(),
                            "error": r.as_ref().err().map(|e| e.to_string()),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for (i, r) in &report {
                    match r {
                        Ok(()) => println!("✓ {:>2}. {}", i + 1, keys[*i].masked()),
                        Err(e) => println!("✗ {:>2}. {}: {e}", i + 1, keys[*i].masked()),
                    }
                }
            }
        }
    }
    Ok(())
}

async fn gallery_entry(studio: &Studio, position: usize) -> anyhow::Result<String> {
    let artifacts = studio.gallery().artifacts().await;
    position
        .checked_sub(1)
        .and_then(|i| artifacts.get(i).cloned())
        .with_context(|| {
            format!(
                "no gallery entry at position {position} (gallery has {})",
                artifacts.len()
            )
        })
}

async fn run_gallery(studio: &Studio, cmd: GalleryCommand, json: bool) -> anyhow::Result<()> {
    let gallery = studio.gallery();
    match cmd {
        GalleryCommand::List => {
            let artifacts = gallery.artifacts().await;
            let rows: Vec<(usize, String, usize)> = artifacts
                .iter()
                .enumerate()
                .map(|(i, a)| {
                    let mime = a
                        .strip_prefix("data:")
                        .and_then(|r| r.split(';').next())
                        .unwrap_or("unknown")
                        .to_string();
                    (i + 1, mime, a.len())
                })
                .collect();
            if json {
                let out: Vec<_> = rows
                    .iter()
                    .map(|(p, mime, len)| {
                        serde_json::json!({ "position": p, "type": mime, "encoded_bytes": len })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else if rows.is_empty() {
                println!("Gallery is empty.");
            } else {
                for (p, mime, len) in rows {
                    println!("{p:>3}. {mime} ({len} encoded bytes)");
                }
            }
        }
        GalleryCommand::Remove { position } => {
            // Positions are 1-based on the command line.
            let remaining = gallery
                .remove_at(position.checked_sub(1).unwrap_or(usize::MAX))
                .await?;
            if json {
                println!("{}", serde_json::json!({ "remaining": remaining.len() }));
            } else {
                println!("Gallery now holds {} result(s).", remaining.len());
            }
        }
        GalleryCommand::Export { position, output } => {
            let image = InputImage::from_data_url(&gallery_entry(studio, position).await?)?;
            std::fs::write(&output, &image.data)?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "output": output.display().to_string() })
                );
            } else {
                println!("Exported to {}", output.display());
            }
        }
    }
    Ok(())
}

async fn run_suggest(studio: &Studio, cmd: SuggestCommand, json: bool) -> anyhow::Result<()> {
    let ideas = match cmd {
        SuggestCommand::Backgrounds {
            fashion_type: Some(fashion_type),
            ..
        } => studio.background_suggestions(&fashion_type).await?,
        SuggestCommand::Backgrounds {
            image: Some(path), ..
        } => {
            let photo = InputImage::from_path(path)?;
            studio.background_suggestions_for_image(&photo).await?
        }
        SuggestCommand::Backgrounds { .. } => {
            anyhow::bail!("pass --fashion-type or --image")
        }
        SuggestCommand::Poses => studio.pose_suggestions().await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&ideas)?);
    } else {
        for idea in ideas {
            println!("- {idea}");
        }
    }
    Ok(())
}

async fn deliver(
    studio: &Studio,
    images: &[GeneratedImage],
    stem: &str,
    output: &OutputArgs,
    json: bool,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(&output.output_dir)
        .with_context(|| format!("failed to create {}", output.output_dir.display()))?;

    let mut saved = Vec::with_capacity(images.len());
    for (i, image) in images.iter().enumerate() {
        let path = output_path(&output.output_dir, stem, i, images.len(), image);
        image.save(&path)?;
        if output.keep {
            studio.keep(image).await?;
        }
        saved.push((path, image));
    }

    if json {
        let rows: Vec<_> = saved
            .iter()
            .map(|(path, image)| {
                serde_json::json!({
                    "output": path.display().to_string(),
                    "size_bytes": image.size(),
                    "format": image.format.extension(),
                    "model": image.metadata.model,
                    "duration_ms": image.metadata.duration_ms,
                })
            })
            .collect();
        let result = serde_json::json!({
            "success": true,
            "images": rows,
            "kept": output.keep,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for (path, image) in &saved {
            println!("Saved {} ({} bytes)", path.display(), image.size());
        }
        if output.keep {
            println!("Added {} result(s) to the gallery.", saved.len());
        }
    }
    Ok(())
}

fn output_path(dir: &Path, stem: &str, index: usize, total: usize, image: &GeneratedImage) -> PathBuf {
    let ext = image.format.extension();
    if total == 1 {
        dir.join(format!("{stem}.{ext}"))
    } else {
        dir.join(format!("{stem}-{}.{ext}", index + 1))
    }
}
