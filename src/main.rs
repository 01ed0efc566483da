use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tweenvis::driver::render_scene_to_dir;
use tweenvis::manifest::load_and_validate_scene;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("TWEENVIS_GIT_HASH"),
    ")"
);

#[derive(Debug, Parser)]
#[command(name = "tweenvis")]
#[command(about = "Animate tens of thousands of points between layouts on the GPU")]
#[command(version, long_version = LONG_VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate a scene file and print its summary.
    Check { scene: PathBuf },
    /// Render every frame of a scene to PNG files.
    Render {
        scene: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    /// Open an interactive preview window (needs the `play` feature).
    Play { scene: PathBuf },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { scene } => run_check(&scene),
        Commands::Render { scene, output } => run_render(&scene, &output),
        Commands::Play { scene } => run_play(&scene),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TWEENVIS_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_check(scene_path: &Path) -> Result<()> {
    let scene = load_and_validate_scene(scene_path)?;

    let points = match &scene.points.file {
        Some(file) => format!("{} (from file)", file.display()),
        None => scene.points.count.to_string(),
    };
    println!(
        "OK: {} ({}x{}, {} fps, {} points)",
        scene_path.display(),
        scene.stage.width,
        scene.stage.height,
        scene.stage.fps,
        points
    );
    println!("Steps: {}", scene.steps.len());
    Ok(())
}

fn run_render(scene_path: &Path, output: &Path) -> Result<()> {
    let scene = load_and_validate_scene(scene_path)?;
    let summary = render_scene_to_dir(scene, output)?;

    println!(
        "Wrote {} frame(s) of {} point(s) to {}",
        summary.frames,
        summary.points,
        summary.output_dir.display()
    );
    Ok(())
}

#[cfg(feature = "play")]
fn run_play(scene_path: &Path) -> Result<()> {
    tweenvis::play::run_play(scene_path)
}

#[cfg(not(feature = "play"))]
fn run_play(_scene_path: &Path) -> Result<()> {
    anyhow::bail!("`play` requires building with `--features play`")
}
