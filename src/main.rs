// ABOUTME: Main entry point for the course-deck program.
// ABOUTME: Provides CLI interface and executes commands from the library.

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use course_deck::{
    read_slides, validate_slides, verify_markup, write_html_to_file, write_pptx_to_file, Config,
    DeckPipeline, HeightEstimator, OverflowSplitter, SlideCounter, SlideDiagnostics, VerifyOptions,
};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render slides (JSON or Markdown outline) to HTML and/or PPTX
    Render(RenderArgs),

    /// Print the split slide list as JSON
    Split(SplitArgs),

    /// Measure rendered HTML in a headless browser
    Verify(VerifyArgs),
}

#[derive(Args)]
struct RenderArgs {
    /// Path to the slides JSON or Markdown outline
    #[arg(short, long)]
    input: PathBuf,

    /// Path to output HTML file
    #[arg(long)]
    html: Option<PathBuf>,

    /// Path to output PPTX file
    #[arg(long)]
    pptx: Option<PathBuf>,

    /// Mode for images: 'embed' to inline data URIs or 'link' to reference
    #[arg(long, default_value = "embed")]
    mode: String,

    /// Directory relative image references resolve against (defaults to the input's directory)
    #[arg(long)]
    image_dir: Option<PathBuf>,

    /// Number given to the first output slide
    #[arg(long, default_value_t = 1)]
    first_slide: u32,
}

#[derive(Args)]
struct SplitArgs {
    /// Path to the slides JSON or Markdown outline
    #[arg(short, long)]
    input: PathBuf,

    /// Write JSON here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number given to the first output slide
    #[arg(long, default_value_t = 1)]
    first_slide: u32,
}

#[derive(Args)]
struct VerifyArgs {
    /// Path to a rendered HTML file
    #[arg(short, long)]
    input: PathBuf,

    /// Directory for per-slide screenshots
    #[arg(long)]
    screenshots: Option<PathBuf>,

    /// Timeout in milliseconds for the page's layout report
    #[arg(long, default_value_t = 30000)]
    timeout_ms: u64,

    /// Exit with an error when any slide overflows
    #[arg(long)]
    strict: bool,
}

fn print_diagnostics(label: &str, diagnostics: &[SlideDiagnostics]) {
    for diagnostic in diagnostics.iter().filter(|d| !d.is_clean()) {
        let flags: Vec<&str> = diagnostic.degradations.iter().map(|d| d.as_str()).collect();
        println!(
            "{}: slide {} '{}': {}",
            label,
            diagnostic.number,
            diagnostic.title,
            flags.join(", ")
        );
    }
}

fn render(args: &RenderArgs) -> anyhow::Result<()> {
    if args.html.is_none() && args.pptx.is_none() {
        return Err(anyhow!("Nothing to write: pass --html and/or --pptx"));
    }

    let mut config = Config::from_env()?;
    config.embed_images = match args.mode.as_str() {
        "embed" => true,
        "link" => false,
        other => return Err(anyhow!("Unknown image mode '{}', expected embed or link", other)),
    };
    config.image_base_dir = args
        .image_dir
        .clone()
        .or_else(|| config.image_base_dir.clone())
        .or_else(|| args.input.parent().map(|p| p.to_path_buf()));

    let slides = read_slides(&args.input)?;
    let pipeline = DeckPipeline::from_config(&config)?;
    let mut counter = SlideCounter::starting_at(args.first_slide);
    let outputs = pipeline.render(slides, &mut counter)?;

    if let Some(html_path) = &args.html {
        write_html_to_file(&outputs.html, html_path)?;
        println!("HTML generated successfully: {:?}", html_path);
    }
    if let Some(pptx_path) = &args.pptx {
        write_pptx_to_file(&outputs.deck, pptx_path)?;
        println!("PPTX generated successfully: {:?}", pptx_path);
    }

    print_diagnostics("markup", &outputs.markup_diagnostics);
    print_diagnostics("deck", &outputs.deck_diagnostics);
    println!("Rendered {} slides", outputs.slides.len());
    Ok(())
}

fn split(args: &SplitArgs) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let slides = read_slides(&args.input)?;
    validate_slides(&slides)?;

    let splitter = OverflowSplitter::new(HeightEstimator::new(&config.layout));
    let mut counter = SlideCounter::starting_at(args.first_slide);
    let expanded = splitter.split_all(slides, &mut counter);
    let json = serde_json::to_string_pretty(&expanded)?;

    match &args.output {
        Some(path) => {
            course_deck::utils::ensure_parent_directory_exists(path)?;
            fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
            println!("Wrote {} slides to {:?}", expanded.len(), path);
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn verify(args: &VerifyArgs) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let options = VerifyOptions {
        width: config.layout.canvas.width,
        height: config.layout.canvas.height,
        timeout_ms: args.timeout_ms,
        browser_path: config.browser_path.clone(),
        screenshot_dir: args.screenshots.clone(),
    };

    let report = verify_markup(&args.input, &options)?;
    for entry in &report {
        println!(
            "slide {:>3}: estimated {:>5.0}px measured {:>5.0}px budget {:>5.0}px{}",
            entry.slide,
            entry.estimated,
            entry.measured,
            entry.budget,
            if entry.overflow { "  OVERFLOW" } else { "" }
        );
    }

    let overflowing = report.iter().filter(|e| e.overflow).count();
    if args.strict && overflowing > 0 {
        return Err(anyhow!("{} slides overflow in the browser", overflowing));
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match &cli.command {
        Some(Commands::Render(args)) => render(args),
        Some(Commands::Split(args)) => split(args),
        Some(Commands::Verify(args)) => verify(args),
        None => {
            println!("No command specified. Use --help for usage information.");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
