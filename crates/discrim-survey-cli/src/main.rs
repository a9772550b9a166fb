//! CLI for building discrimination-turn surveys.
//!
//! Subcommands:
//!  - `urls`   : discover experiment directories and write their audio URLs.
//!  - `assign` : draw a balanced condition assignment and save it.
//!  - `build`  : generate one qsf survey per participant (or one covering
//!                every condition with `--all-conditions`).
//!  - `render` : print the context window markup for one utterance.
//!  - `turns`  : print the speaker turns of a conversation.
//!
//! Usage examples:
//!  cargo run -p discrim-survey -- urls --base-path /data/exp --base-url https://host/exp/ -o urls.json
//!  cargo run -p discrim-survey -- build --config survey.toml --seed 42

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use log::LevelFilter;
use rand::rngs::StdRng;
use rand::SeedableRng;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

use discrim_survey::experiment::{collect_audio_urls, AudioUrls};
use discrim_survey::qsf::{
    write_qsf, FsConversations, QuestionAssets, SurveyBuilder, ALL_CONDITIONS_SURVEY,
};
use discrim_survey::{
    assign_surveys, load_assignments_json, load_conversation_json, load_qsf_json,
    load_urls_json, make_speaker_turns, render_context_window, save_assignments_json,
    save_urls_json, AssignmentTable, SurveyConfig,
};

/// CLI entrypoint.
#[derive(Parser)]
#[command(
    name = "discrim-survey",
    about = "Discrimination-turn survey builder — turn rendering & balanced condition assignment",
    version
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write the log to this file.
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    /// Subcommands
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover experiments and write their audio URLs as JSON.
    Urls(UrlsArgs),

    /// Assign context conditions to participants and save the table.
    Assign(AssignArgs),

    /// Build one qsf survey per participant.
    Build(BuildArgs),

    /// Render the context window around one utterance.
    Render(RenderArgs),

    /// Print the speaker turns of a conversation.
    Turns(TurnsArgs),
}

/// Arguments for the `urls` subcommand.
#[derive(Args, Debug)]
struct UrlsArgs {
    /// Directory holding one sub-directory per experiment.
    #[arg(long, value_name = "PATH")]
    base_path: PathBuf,

    /// Public URL corresponding to `--base-path`.
    #[arg(long, value_name = "URL")]
    base_url: String,

    /// Restrict to these experiment ids (default: every directory). Repeatable.
    #[arg(long = "experiment", value_name = "ID")]
    experiments: Vec<String>,

    /// Path to write the URL map to (default: print to stdout).
    #[arg(long, short = 'o', value_name = "PATH")]
    out: Option<PathBuf>,
}

/// Arguments for the `assign` subcommand.
#[derive(Args, Debug)]
struct AssignArgs {
    /// Survey config (TOML).
    #[arg(short, long, value_name = "PATH")]
    config: PathBuf,

    /// URL map whose keys are the experiment ids (default: `urls` from the config).
    #[arg(long, value_name = "PATH")]
    urls: Option<PathBuf>,

    /// Seed for reproducible assignments.
    #[arg(long)]
    seed: Option<u64>,

    /// Path to write the table to (default: `{output_prefix}_assignments.json`).
    #[arg(long, short = 'o', value_name = "PATH")]
    out: Option<PathBuf>,
}

/// Arguments for the `build` subcommand.
#[derive(Args, Debug)]
struct BuildArgs {
    /// Survey config (TOML).
    #[arg(short, long, value_name = "PATH")]
    config: PathBuf,

    /// Reuse a saved assignment table instead of drawing a new one.
    #[arg(long, value_name = "PATH")]
    assignments: Option<PathBuf>,

    /// URL map (default: `urls` from the config, else discovered under `base_path`).
    #[arg(long, value_name = "PATH")]
    urls: Option<PathBuf>,

    /// Seed for reproducible assignments.
    #[arg(long)]
    seed: Option<u64>,

    /// Write a single survey asking every experiment under every condition
    /// instead of per-participant surveys.
    #[arg(long, conflicts_with_all = ["assignments", "seed"])]
    all_conditions: bool,
}

/// Arguments for the `render` subcommand.
#[derive(Args, Debug)]
struct RenderArgs {
    /// Conversation record (JSON array of utterances).
    #[arg(long, value_name = "PATH")]
    conversation: PathBuf,

    /// Target utterance id.
    #[arg(long)]
    utter_id: u64,

    /// Speaker turns of lookback.
    #[arg(long, default_value_t = 0)]
    before: usize,

    /// Speaker turns of lookahead.
    #[arg(long, default_value_t = 0)]
    after: usize,

    /// Render in individual mode (no emphasis on the preceding turn).
    #[arg(long)]
    individual: bool,
}

/// Arguments for the `turns` subcommand.
#[derive(Args, Debug)]
struct TurnsArgs {
    /// Conversation record (JSON array of utterances).
    #[arg(long, value_name = "PATH")]
    conversation: PathBuf,

    /// Output turns as JSON.
    #[arg(long)]
    json: bool,
}

/// Application entry point.
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Urls(args) => run_urls(args),
        Commands::Assign(args) => run_assign(args),
        Commands::Build(args) => run_build(args),
        Commands::Render(args) => run_render(args),
        Commands::Turns(args) => run_turns(args),
    }
}

fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<()> {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    let config = ConfigBuilder::new().build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    if let Some(path) = log_file {
        let file =
            File::create(path).with_context(|| format!("creating log file {}", path.display()))?;
        loggers.push(WriteLogger::new(LevelFilter::Debug, config, file));
    }
    CombinedLogger::init(loggers).context("initializing logger")?;
    Ok(())
}

/// Run the `urls` subcommand.
fn run_urls(args: UrlsArgs) -> Result<()> {
    let urls = collect_audio_urls(&args.base_path, &args.base_url, &args.experiments)
        .with_context(|| format!("collecting audio urls under {}", args.base_path.display()))?;

    match args.out {
        Some(out) => {
            save_urls_json(&urls, &out)
                .with_context(|| format!("saving urls to {}", out.display()))?;
            println!(
                "Saved audio urls for {} experiments to {}",
                urls.len(),
                out.display()
            );
        }
        None => println!("{}", serde_json::to_string_pretty(&urls)?),
    }
    Ok(())
}

/// Resolve the URL map: explicit flag, then config, then filesystem discovery.
fn resolve_urls(cfg: &SurveyConfig, flag: Option<&Path>) -> Result<AudioUrls> {
    match flag.or(cfg.urls.as_deref()) {
        Some(path) => {
            load_urls_json(path).with_context(|| format!("loading urls from {}", path.display()))
        }
        None => {
            log::info!(
                "no url map given, discovering experiments under {}",
                cfg.base_path.display()
            );
            Ok(collect_audio_urls(&cfg.base_path, &cfg.base_url, &[])?)
        }
    }
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

fn draw_assignments(
    cfg: &SurveyConfig,
    urls: &AudioUrls,
    seed: Option<u64>,
) -> Result<AssignmentTable> {
    let experiment_ids: Vec<String> = urls.keys().cloned().collect();
    let mut rng = seeded_rng(seed);
    let table = assign_surveys(&experiment_ids, &cfg.conditions, cfg.repeats, &mut rng)
        .context("assigning conditions to participants")?;
    Ok(table)
}

/// Run the `assign` subcommand.
fn run_assign(args: AssignArgs) -> Result<()> {
    let cfg = SurveyConfig::from_toml_file(&args.config)?;
    let urls = resolve_urls(&cfg, args.urls.as_deref())?;
    let table = draw_assignments(&cfg, &urls, args.seed)?;

    let out = args.out.unwrap_or_else(|| cfg.assignments_output_path());
    save_assignments_json(&table, &out)
        .with_context(|| format!("saving assignments to {}", out.display()))?;
    println!(
        "Assigned {} experiments to {} participants; saved to {}",
        table.experiment_ids.len(),
        table.participants.len(),
        out.display()
    );
    Ok(())
}

/// Run the `build` subcommand.
///
/// This function:
/// 1. Loads the config, template, HTML snippets and URL map.
/// 2. With `--all-conditions`, writes one survey covering every pairing and
///    stops.
/// 3. Otherwise loads or draws the assignment table.
/// 4. Builds and writes one survey per participant.
/// 5. Saves the assignment table next to the surveys.
fn run_build(args: BuildArgs) -> Result<()> {
    let cfg = SurveyConfig::from_toml_file(&args.config)?;
    let template = load_qsf_json(&cfg.template)
        .with_context(|| format!("loading template {}", cfg.template.display()))?;
    let assets = QuestionAssets::from_config(&cfg)?;
    let urls = resolve_urls(&cfg, args.urls.as_deref())?;

    let builder = SurveyBuilder::new(
        &cfg,
        &template,
        &assets,
        &urls,
        FsConversations { config: &cfg },
    );

    if args.all_conditions {
        let built = builder
            .build_all_conditions()
            .context("building the all-conditions survey")?;
        let out = cfg.survey_output_path(ALL_CONDITIONS_SURVEY);
        write_qsf(&built.document, &out)
            .with_context(|| format!("writing survey to {}", out.display()))?;
        println!(
            "Generated survey with {} questions; saved to {}",
            built.survey_length,
            out.display()
        );
        return Ok(());
    }

    let table = match &args.assignments {
        Some(path) => load_assignments_json(path)
            .with_context(|| format!("loading assignments from {}", path.display()))?,
        None => draw_assignments(&cfg, &urls, args.seed)?,
    };

    println!(
        "Building {} surveys ({} layout, {} experiments each)",
        table.participants.len(),
        cfg.layout.as_str(),
        table.experiment_ids.len()
    );

    #[cfg(feature = "progress")]
    let bar = {
        let bar = indicatif::ProgressBar::new(table.participants.len() as u64);
        bar.set_style(
            indicatif::ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .context("progress bar template")?
                .progress_chars("##-"),
        );
        bar
    };

    for participant in table.participant_keys() {
        let built = builder
            .build_participant(participant, &table)
            .with_context(|| format!("building survey for participant {}", participant))?;
        let out = cfg.survey_output_path(participant);
        write_qsf(&built.document, &out)
            .with_context(|| format!("writing survey to {}", out.display()))?;

        #[cfg(feature = "progress")]
        {
            bar.set_message(format!("participant {}", participant));
            bar.inc(1);
        }
        #[cfg(not(feature = "progress"))]
        println!(
            "Generated survey {} with {} questions",
            participant, built.survey_length
        );
    }

    #[cfg(feature = "progress")]
    bar.finish_with_message("surveys written");

    let assignments_out = cfg.assignments_output_path();
    save_assignments_json(&table, &assignments_out)
        .with_context(|| format!("saving assignments to {}", assignments_out.display()))?;
    println!("Saved participant assignments to {}", assignments_out.display());
    Ok(())
}

/// Run the `render` subcommand.
fn run_render(args: RenderArgs) -> Result<()> {
    let utterances = load_conversation_json(&args.conversation)?;
    let turns = make_speaker_turns(&utterances)?;
    let html = render_context_window(
        &turns,
        args.utter_id,
        args.before,
        args.after,
        args.individual,
    )
    .with_context(|| format!("rendering context for utterance {}", args.utter_id))?;
    println!("{}", html);
    Ok(())
}

/// Run the `turns` subcommand.
fn run_turns(args: TurnsArgs) -> Result<()> {
    let utterances = load_conversation_json(&args.conversation)?;
    let turns = make_speaker_turns(&utterances)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&turns)?);
        return Ok(());
    }
    for turn in &turns {
        println!(
            "turn {:>3} [{:?}] utterances {:?}",
            turn.turn_id,
            turn.speaker(),
            turn.utter_id
        );
    }
    println!("{} utterances in {} turns", utterances.len(), turns.len());
    Ok(())
}
