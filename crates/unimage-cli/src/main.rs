mod logging;
mod progress;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::Notify;

use unimage::config::load_config_or_default;
use unimage::storage::PromptVersion;
use unimage::{AgentRole, KvStore, RunOutcome, StubClient, Studio, StudioMode};

use crate::progress::ProgressRenderer;

#[derive(Parser)]
#[command(
    name = "unimage",
    version,
    about = "Reverse-engineer images into generation prompts and clone them"
)]
struct Cli {
    /// Config file (default: <config_dir>/unimage/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the task cache, history and prompt library
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use an offline client with canned replies instead of the API
    #[arg(long, global = true)]
    dry_run: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze an image or video and print the resulting prompt
    Analyze {
        file: PathBuf,

        /// Product image to fuse into the scene (implies fusion mode)
        #[arg(long)]
        product: Option<PathBuf>,

        /// replicate, fusion or video (default: derived from the inputs)
        #[arg(short, long)]
        mode: Option<StudioMode>,

        /// Video duration in seconds
        #[arg(long)]
        duration: Option<f64>,
    },
    /// Generate images from the current prompt
    Generate {
        /// Prompt to use instead of the current one
        #[arg(short, long)]
        prompt: Option<String>,

        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,

        /// Send the source image along as a reference
        #[arg(long)]
        reference: bool,
    },
    /// Show the saved task
    Resume,
    /// Discard the saved task (history is kept)
    Reset,
    /// Switch the prompt between Chinese and English
    Translate,
    /// Rewrite the prompt according to feedback
    Refine { feedback: String },
    /// Detect layout elements of the source image
    Layout,
    /// Compare the latest generated image against the source
    Check,
    /// Ask the assistant; check, reverse and refine requests run the matching skill
    Chat {
        message: String,

        /// Apply the first suggested prompt
        #[arg(long)]
        apply: bool,
    },
    /// Quick prompt for the source image, without the full analysis
    Reverse,
    /// Suggest the next step from the source, the latest image and the prompt
    Next,
    /// Manage generated-image history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Manage per-role instruction versions
    Prompts {
        #[command(subcommand)]
        action: PromptsAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    List,
    Delete { index: usize },
    Export { index: usize, path: PathBuf },
    Clear,
}

#[derive(Subcommand)]
enum PromptsAction {
    List {
        #[arg(value_parser = parse_role)]
        role: Option<AgentRole>,
    },
    Add {
        #[arg(value_parser = parse_role)]
        role: AgentRole,
        name: String,

        /// File holding the instruction text
        #[arg(long, conflicts_with = "content", required_unless_present = "content")]
        file: Option<PathBuf>,

        #[arg(long)]
        content: Option<String>,

        /// Make the new version active right away
        #[arg(long)]
        activate: bool,
    },
    Activate {
        #[arg(value_parser = parse_role)]
        role: AgentRole,
        id: String,
    },
    Remove {
        #[arg(value_parser = parse_role)]
        role: AgentRole,
        id: String,
    },
}

fn parse_role(s: &str) -> Result<AgentRole, String> {
    AgentRole::parse(s).ok_or_else(|| {
        let known: Vec<&str> = AgentRole::ALL.iter().map(|r| r.as_str()).collect();
        format!("unknown role '{}' (expected one of {})", s, known.join(", "))
    })
}

fn build_studio(cli: &Cli) -> Result<Studio> {
    let mut config =
        load_config_or_default(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = Some(dir.clone());
    }
    // Nothing lingers on screen after the process exits
    config.pipeline.completion_delay_ms = 0;
    config.pipeline.video_completion_delay_ms = 0;

    if cli.dry_run {
        let kv = KvStore::open(config.storage.resolved_data_dir(), config.storage.quota_bytes)
            .context("Failed to open data directory")?;
        return Ok(Studio::new(
            Arc::new(config),
            Arc::new(StubClient::new()),
            Arc::new(kv),
        ));
    }
    Studio::from_config(config).context("Failed to initialize studio")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_json)?;

    let studio = build_studio(&cli)?;
    studio.restore().context("Failed to restore saved task")?;

    match cli.command {
        Command::Analyze {
            file,
            product,
            mode,
            duration,
        } => analyze(&studio, &file, product.as_deref(), mode, duration).await,
        Command::Generate {
            prompt,
            count,
            reference,
        } => generate(&studio, prompt.as_deref(), count, reference).await,
        Command::Resume => {
            resume(&studio);
            Ok(())
        }
        Command::Reset => {
            studio.reset()?;
            eprintln!("Task cleared");
            Ok(())
        }
        Command::Translate => {
            require_source(&studio)?;
            let renderer = ProgressRenderer::spawn(studio.subscribe(), false);
            let result = studio.toggle_language().await;
            renderer.finish().await;
            let language = result?;
            eprintln!("Prompt language: {}", language);
            println!("{}", studio.state().editable_prompt);
            Ok(())
        }
        Command::Refine { feedback } => {
            require_source(&studio)?;
            let renderer = ProgressRenderer::spawn(studio.subscribe(), false);
            let result = studio.refine_prompt(&feedback).await;
            renderer.finish().await;
            match result? {
                Some(prompt) => println!("{}", prompt),
                None => bail!("Prompt was not refined"),
            }
            Ok(())
        }
        Command::Layout => {
            require_source(&studio)?;
            let renderer = ProgressRenderer::spawn(studio.subscribe(), false);
            let result = studio.detect_layout().await;
            renderer.finish().await;
            for element in result? {
                let [ymin, xmin, ymax, xmax] = element.box_2d;
                println!(
                    "{:<10} {:<24} y {:>4}-{:<4} x {:>4}-{:<4}",
                    element.hierarchy, element.label, ymin, ymax, xmin, xmax
                );
            }
            Ok(())
        }
        Command::Check => check(&studio).await,
        Command::Chat { message, apply } => chat(&studio, &message, apply).await,
        Command::Reverse => {
            require_source(&studio)?;
            let renderer = ProgressRenderer::spawn(studio.subscribe(), false);
            let result = studio.reverse_prompt().await;
            renderer.finish().await;
            match result? {
                Some(prompt) => println!("{}", prompt),
                None => bail!("Reverse analysis did not run"),
            }
            Ok(())
        }
        Command::Next => {
            require_source(&studio)?;
            if studio.state().generated_image.is_none() {
                bail!("No generated image yet; run `unimage generate` first");
            }
            let renderer = ProgressRenderer::spawn(studio.subscribe(), false);
            let result = studio.smart_analysis().await;
            renderer.finish().await;
            match result? {
                Some(advice) => println!("{}", advice),
                None => bail!("Smart analysis did not run"),
            }
            Ok(())
        }
        Command::History { action } => history(&studio, action),
        Command::Prompts { action } => prompts(&studio, action),
    }
}

fn require_source(studio: &Studio) -> Result<()> {
    if !studio.state().has_source() {
        bail!("No asset loaded; run `unimage analyze <file>` first");
    }
    Ok(())
}

async fn analyze(
    studio: &Studio,
    file: &Path,
    product: Option<&Path>,
    mode: Option<StudioMode>,
    duration: Option<f64>,
) -> Result<()> {
    studio
        .load_asset(file, duration)
        .with_context(|| format!("Failed to load {}", file.display()))?;
    if let Some(product) = product {
        studio
            .load_product(product)
            .with_context(|| format!("Failed to load product {}", product.display()))?;
    }
    let is_video = studio
        .state()
        .source
        .as_ref()
        .is_some_and(|source| source.is_video());
    let mode = mode.unwrap_or(if product.is_some() {
        StudioMode::Fusion
    } else if is_video {
        StudioMode::Video
    } else {
        StudioMode::Replicate
    });
    studio.set_mode(mode);
    log::info!("Analyzing {} in {} mode", file.display(), mode);

    let cancelled = Arc::new(Notify::new());
    {
        let studio = studio.clone();
        let cancelled = Arc::clone(&cancelled);
        ctrlc::set_handler(move || {
            studio.cancel_pipeline();
            cancelled.notify_one();
        })
        .context("Failed to install Ctrl-C handler")?;
    }

    let renderer = ProgressRenderer::spawn(studio.subscribe(), true);
    let outcome = tokio::select! {
        outcome = studio.run_analysis() => Some(outcome),
        _ = cancelled.notified() => None,
    };
    renderer.finish().await;

    match outcome {
        Some(RunOutcome::Completed) => {
            println!("{}", studio.state().editable_prompt);
            Ok(())
        }
        Some(RunOutcome::Failed { role, message }) => {
            bail!("{} stage failed: {}", role.profile().name, message)
        }
        Some(RunOutcome::Skipped(reason)) => bail!("Analysis skipped: {}", reason),
        None => {
            eprintln!("Analysis cancelled");
            Ok(())
        }
    }
}

async fn generate(
    studio: &Studio,
    prompt: Option<&str>,
    count: usize,
    reference: bool,
) -> Result<()> {
    require_source(studio)?;
    if prompt.is_none() && studio.state().editable_prompt.trim().is_empty() {
        bail!("No prompt yet; run an analysis or pass --prompt");
    }
    if reference {
        studio.set_use_reference_image(true);
    }

    let renderer = ProgressRenderer::spawn(studio.subscribe(), false);
    let result = studio.generate_images(prompt, count).await;
    renderer.finish().await;

    for item in result? {
        println!("{}  {}", item.id, item.timestamp.format("%Y-%m-%d %H:%M:%S"));
    }
    Ok(())
}

fn resume(studio: &Studio) {
    let state = studio.state();
    let Some(source) = &state.source else {
        eprintln!("No saved task");
        return;
    };
    println!("Source:   {} ({})", source.mime_type, state.aspect_ratio);
    println!("Mode:     {}", state.mode);
    for (role, result) in &state.results {
        let status = if result.is_complete() {
            "done"
        } else {
            "incomplete"
        };
        println!("  {:<18} {}", role.profile().name, status);
    }
    println!("Language: {}", state.language);
    println!("Images:   {}", state.generated_images.len());
    if !state.editable_prompt.is_empty() {
        println!("\n{}", state.editable_prompt);
    }
}

async fn check(studio: &Studio) -> Result<()> {
    require_source(studio)?;
    if studio.state().generated_image.is_none() {
        bail!("No generated image to check; run `unimage generate` first");
    }
    let renderer = ProgressRenderer::spawn(studio.subscribe(), false);
    let result = studio.quality_check().await;
    renderer.finish().await;

    let Some(report) = result? else {
        bail!("Quality check did not run");
    };
    println!("{}", report);
    let suggestions = studio.state().suggestions;
    if !suggestions.is_empty() {
        println!("\nSuggestions:");
        for (i, suggestion) in suggestions.iter().enumerate() {
            println!("  {}. {}", i + 1, suggestion);
        }
    }
    Ok(())
}

async fn chat(studio: &Studio, message: &str, apply: bool) -> Result<()> {
    let renderer = ProgressRenderer::spawn(studio.subscribe(), false);
    let result = studio.send_chat_message(message).await;
    renderer.finish().await;

    let Some(reply) = result? else {
        bail!("Message was not sent");
    };
    if let Some(skill) = reply.skill {
        eprintln!("[{}]", skill);
    }
    println!("{}", reply.content);
    if !reply.suggestions.is_empty() && reply.suggestions != [reply.content.clone()] {
        println!("\nSuggestions:");
        for (i, suggestion) in reply.suggestions.iter().enumerate() {
            println!("  {}. {}", i + 1, suggestion);
        }
    }
    if apply {
        let index = studio.state().chat.len().saturating_sub(1);
        if !studio.apply_chat_suggestion(index, 0) {
            bail!("The reply has no prompt to apply");
        }
        eprintln!("Prompt updated");
    }
    Ok(())
}

fn history(studio: &Studio, action: HistoryAction) -> Result<()> {
    match action {
        HistoryAction::List => {
            for (index, item) in studio.state().history.iter().enumerate() {
                let prompt = item.prompt.lines().next().unwrap_or_default();
                let prompt: String = prompt.chars().take(60).collect();
                let fusion = if item.is_fusion_mode { " [fusion]" } else { "" };
                println!(
                    "{:>3}  {}  {}{}",
                    index,
                    item.timestamp.format("%Y-%m-%d %H:%M"),
                    prompt,
                    fusion
                );
            }
        }
        HistoryAction::Delete { index } => {
            if !studio.delete_history_item(index)? {
                bail!("No history entry at index {}", index);
            }
        }
        HistoryAction::Export { index, path } => match studio.export_image(index, &path)? {
            Some(path) => eprintln!("Saved {}", path.display()),
            None => bail!("No generated image at index {}", index),
        },
        HistoryAction::Clear => {
            let removed = studio.clear_history()?;
            eprintln!("Removed {} history entries", removed);
        }
    }
    Ok(())
}

fn prompts(studio: &Studio, action: PromptsAction) -> Result<()> {
    let library = studio.prompt_library();
    match action {
        PromptsAction::List { role } => {
            let roles = match role {
                Some(role) => vec![role],
                None => AgentRole::ALL.to_vec(),
            };
            for role in roles {
                let active = library.active_version_id(role)?;
                let versions = library.versions(role)?;
                println!("{} ({} versions)", role.profile().name, versions.len());
                for version in versions {
                    let marker = if active.as_deref() == Some(version.id.as_str()) {
                        '*'
                    } else {
                        ' '
                    };
                    println!(
                        "  {} {}  {}  {}",
                        marker,
                        version.id,
                        version.updated_at.format("%Y-%m-%d %H:%M"),
                        version.name
                    );
                }
            }
        }
        PromptsAction::Add {
            role,
            name,
            file,
            content,
            activate,
        } => {
            let content = match (file, content) {
                (Some(path), _) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, Some(content)) => content,
                (None, None) => bail!("Pass --file or --content"),
            };
            let version = PromptVersion::new(name, content);
            let id = version.id.clone();
            library.save_version(role, version)?;
            if activate {
                library.set_active_version(role, &id)?;
            }
            println!("{}", id);
        }
        PromptsAction::Activate { role, id } => {
            if !library.set_active_version(role, &id)? {
                bail!("No {} version with id {}", role, id);
            }
        }
        PromptsAction::Remove { role, id } => {
            library.delete_version(role, &id)?;
        }
    }
    Ok(())
}
