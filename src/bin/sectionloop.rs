use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use sectionloop::{LayoutHost as _, PageSpec};

#[derive(Parser, Debug)]
#[command(name = "sectionloop", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drive the loop through a synthetic forward scroll and print a summary.
    Simulate(SimulateArgs),
    /// Validate a page JSON file.
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
struct SimulateArgs {
    /// Input page JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Number of scroll steps.
    #[arg(long, default_value_t = 200)]
    steps: u32,

    /// Pixels scrolled per step.
    #[arg(long, default_value_t = 120.0)]
    step_px: f64,

    /// Milliseconds of animation clock per step.
    #[arg(long, default_value_t = 16)]
    step_ms: u64,

    /// Print the summary as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Input page JSON.
    #[arg(long = "in")]
    in_path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Simulate(args) => cmd_simulate(args),
        Command::Check(args) => cmd_check(args),
    }
}

fn read_page_json(path: &Path) -> anyhow::Result<PageSpec> {
    let f = File::open(path).with_context(|| format!("open page '{}'", path.display()))?;
    let r = BufReader::new(f);
    let page: PageSpec = serde_json::from_reader(r).with_context(|| "parse page JSON")?;
    Ok(page)
}

fn cmd_check(args: CheckArgs) -> anyhow::Result<()> {
    let page = read_page_json(&args.in_path)?;
    page.validate()?;
    println!(
        "ok: {} template blocks, duplicate limit {}",
        page.template.len(),
        page.config.duplicate_limit
    );
    Ok(())
}

fn cmd_simulate(args: SimulateArgs) -> anyhow::Result<()> {
    anyhow::ensure!(
        args.step_px.is_finite() && args.step_px > 0.0,
        "--step-px must be finite and > 0"
    );
    let page = read_page_json(&args.in_path)?;
    let mut engine = sectionloop::Engine::with_stack_layout(page)?;

    let mut now_ms = 0u64;
    for _ in 0..args.steps {
        let y = engine.host().scroll_top() + args.step_px;
        engine.on_scroll(y)?;
        now_ms += args.step_ms;
        engine.tick(now_ms)?;
    }
    let summary = engine.summary();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    println!(
        "live blocks {}..{} ({} rendered, {} copies beyond the original)",
        summary.live.start.0, summary.live.end.0, summary.blocks, summary.duplicate_count
    );
    println!(
        "duplications {}, evictions {}, deferred {}, ignored {}",
        summary.duplications, summary.evictions, summary.deferrals, summary.ignored
    );
    println!(
        "scroll top {:.1}, listeners {}/{}, leak signals {}, scenes {}, events {}",
        summary.scroll_top,
        summary.listeners,
        summary.max_listeners,
        summary.leak_signals,
        summary.scenes,
        summary.events
    );
    Ok(())
}
