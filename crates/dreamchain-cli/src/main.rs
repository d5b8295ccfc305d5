use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dreamchain_contracts::events::{RunEvent, RunEventKind};
use dreamchain_contracts::models::ModelRegistry;
use dreamchain_contracts::prompts::{library_prompt, loop_steps, PROMPT_LIBRARY};
use dreamchain_contracts::run::{DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL};
use dreamchain_contracts::runs::{RunSummary, TemplateStore};
use dreamchain_contracts::{BlockStatus, LoopBound, RunConfig};
use dreamchain_engine::IterationEngine;
use serde_json::{Map, Value};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_STORE_PATH: &str = ".dreamchain/settings.json";

#[derive(Debug, Parser)]
#[command(
    name = "dreamchain",
    version,
    about = "Generate an image, describe it, and generate the next frame from the description"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a run and stream its progress until it stops.
    Run(RunArgs),
    /// Show or change the persisted description template.
    Template(TemplateArgs),
    /// List the preset starting prompts.
    Prompts,
    /// Print the three prompt templates one cycle uses.
    Templates(StoreArgs),
    /// List known models and their capabilities.
    Models,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long, conflicts_with = "preset")]
    prompt: Option<String>,
    /// 1-based index into the preset prompt library.
    #[arg(long)]
    preset: Option<usize>,
    #[arg(long, default_value = "")]
    style: String,
    /// `infinite` or a positive number of cycles.
    #[arg(long, default_value = "1")]
    loops: LoopBound,
    #[arg(long, default_value = DEFAULT_TEXT_MODEL)]
    text_model: String,
    #[arg(long, default_value = DEFAULT_IMAGE_MODEL)]
    image_model: String,
    /// Description template for this run only; the stored one is untouched.
    #[arg(long)]
    template: Option<String>,
    #[arg(long, default_value = DEFAULT_STORE_PATH)]
    store: PathBuf,
    /// Record each image prompt as its own block before the image.
    #[arg(long)]
    record_prompts: bool,
    /// Emit events and the summary as JSON lines.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
struct StoreArgs {
    #[arg(long, default_value = DEFAULT_STORE_PATH)]
    store: PathBuf,
}

#[derive(Debug, Parser)]
struct TemplateArgs {
    #[command(flatten)]
    store: StoreArgs,
    #[command(subcommand)]
    action: TemplateAction,
}

#[derive(Debug, Subcommand)]
enum TemplateAction {
    Show,
    Set { text: String },
    Reset,
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("dreamchain error: {err:#}");
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run_loop(args).await,
        Command::Template(args) => {
            run_template(args)?;
            Ok(0)
        }
        Command::Prompts => {
            for (idx, prompt) in PROMPT_LIBRARY.iter().enumerate() {
                println!("{}. {prompt}", idx + 1);
            }
            Ok(0)
        }
        Command::Templates(args) => {
            let store = TemplateStore::new(args.store);
            for (label, template) in loop_steps(&store.load()) {
                println!("{label}:\n  {template}");
            }
            Ok(0)
        }
        Command::Models => {
            for line in model_lines(&ModelRegistry::default()) {
                println!("{line}");
            }
            Ok(0)
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dreamchain=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

async fn run_loop(args: RunArgs) -> Result<i32> {
    dotenvy::dotenv().ok();
    init_tracing();

    let store = TemplateStore::new(args.store.clone());
    let config = build_config(&args, &store)?;
    let engine = IterationEngine::with_defaults();
    let events = engine.subscribe();
    let handle = engine.start(config).context("failed to start run")?;
    tracing::info!(run_id = handle.run_id(), "streaming run events");

    let printer = tokio::spawn(print_events(events, args.json));
    let stopper = engine.clone();
    let interrupt = tokio::spawn(watch_interrupts(stopper));

    let summary = handle.wait().await?;
    interrupt.abort();
    printer.await.context("event printer panicked")??;

    println!("{}", render_summary(&summary, args.json)?);
    Ok(if summary.succeeded() { 0 } else { 1 })
}

/// First Ctrl-C asks the run to stop once the in-flight call settles; a
/// second one exits immediately.
async fn watch_interrupts(engine: IterationEngine) {
    let mut presses = 0u32;
    while tokio::signal::ctrl_c().await.is_ok() {
        presses += 1;
        if interrupt_action(presses) == InterruptAction::Exit {
            eprintln!("dreamchain: interrupted again, exiting without waiting");
            std::process::exit(130);
        }
        engine.stop();
        eprintln!("dreamchain: stopping after the current step (Ctrl-C again to exit now)");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InterruptAction {
    Stop,
    Exit,
}

fn interrupt_action(presses: u32) -> InterruptAction {
    if presses > 1 {
        InterruptAction::Exit
    } else {
        InterruptAction::Stop
    }
}

fn build_config(args: &RunArgs, store: &TemplateStore) -> Result<RunConfig> {
    let prompt = match (&args.prompt, args.preset) {
        (Some(prompt), _) => prompt.clone(),
        (None, Some(number)) => library_prompt(number)
            .with_context(|| {
                format!(
                    "no preset prompt #{number} (choose 1-{})",
                    PROMPT_LIBRARY.len()
                )
            })?
            .to_string(),
        (None, None) => bail!("either --prompt or --preset is required"),
    };
    let template = match &args.template {
        Some(template) => template.clone(),
        None => store.load(),
    };
    Ok(RunConfig::new(prompt, args.style.clone())
        .with_loops(args.loops)
        .with_models(args.text_model.clone(), args.image_model.clone())
        .with_description_template(template)
        .with_recorded_prompts(args.record_prompts))
}

fn run_template(args: TemplateArgs) -> Result<()> {
    let store = TemplateStore::new(args.store.store);
    match args.action {
        TemplateAction::Show => {
            let source = if store.stored().is_some() {
                store.path().display().to_string()
            } else {
                "default".to_string()
            };
            println!("{} ({source})", store.load());
        }
        TemplateAction::Set { text } => {
            store.save(&text)?;
            println!("Template saved to {}", store.path().display());
        }
        TemplateAction::Reset => {
            store.reset()?;
            println!("Template reset to default");
        }
    }
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<RunEvent>, json: bool) -> Result<()> {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(line) = render_event(&event, json)? {
                    println!("{line}");
                }
                if matches!(event.kind, RunEventKind::RunFinished { .. }) {
                    return Ok(());
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event printer fell behind");
            }
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}

/// Human mode prints log lines and finished blocks; JSON mode prints every
/// event.
fn render_event(event: &RunEvent, json: bool) -> Result<Option<String>> {
    if json {
        return Ok(Some(event.to_json_line()?));
    }
    Ok(match &event.kind {
        RunEventKind::LogLine { line } => Some(line.clone()),
        RunEventKind::BlockAppended { block, .. } | RunEventKind::BlockResolved { block, .. }
            if block.status == BlockStatus::Done =>
        {
            Some(format!("[{}] {}", block.kind, block.content))
        }
        _ => None,
    })
}

fn render_summary(summary: &RunSummary, json: bool) -> Result<String> {
    if json {
        let mut extra = Map::new();
        extra.insert("type".to_string(), Value::String("run_summary".to_string()));
        return Ok(serde_json::to_string(&Value::Object(
            summary.to_payload(Some(&extra)),
        ))?);
    }
    let mut text = format!(
        "Run {} finished: {} cycle(s), {} block(s), {} failed",
        summary.run_id, summary.cycles, summary.total_blocks, summary.failed_blocks
    );
    if let Some(err) = &summary.last_error {
        text.push_str(&format!("\nLast error: {err}"));
    }
    Ok(text)
}

fn model_lines(registry: &ModelRegistry) -> Vec<String> {
    registry
        .list()
        .map(|model| {
            format!(
                "{:<22} {:<8} {}",
                model.name,
                model.provider,
                model.capabilities.join(",")
            )
        })
        .collect()
}
