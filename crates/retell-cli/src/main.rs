use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use retell_contracts::challenge::ChallengeLink;
use retell_contracts::events::SessionLog;
use retell_contracts::feedback::Feedback;
use retell_contracts::history::ScoreHistoryStore;
use retell_contracts::modes::CoachMode;
use retell_engine::{default_model, CoachPipeline};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "retell", version, about = "Communication coaching pipeline CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one coaching session: describe an image, get graded feedback.
    Describe(DescribeArgs),
    /// Print the persisted score trend.
    History(HistoryArgs),
    /// Decode a "beat this score" share link.
    Challenge(ChallengeArgs),
}

#[derive(Debug, Parser)]
struct DescribeArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long, conflicts_with = "explanation_file")]
    explanation: Option<String>,
    #[arg(long)]
    explanation_file: Option<PathBuf>,
    #[arg(long, default_value = "teacher")]
    mode: String,
    /// Request a strategy hint before submitting; adherence is graded.
    #[arg(long)]
    with_strategy: bool,
    #[arg(long, default_value = ".retell")]
    out: PathBuf,
    /// Base URL for a shareable challenge link printed after the run.
    #[arg(long)]
    share_base: Option<String>,
}

#[derive(Debug, Parser)]
struct HistoryArgs {
    #[arg(long, default_value = ".retell")]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct ChallengeArgs {
    #[arg(long)]
    link: String,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("retell error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Describe(args) => run_describe(args),
        Command::History(args) => run_history(args),
        Command::Challenge(args) => run_challenge(args),
    }
}

fn run_describe(args: DescribeArgs) -> Result<i32> {
    let mode: CoachMode = args
        .mode
        .parse()
        .map_err(|err: String| anyhow::anyhow!(err))?;
    let explanation = match (&args.explanation, &args.explanation_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("failed reading {}", path.display()))?,
        (None, None) => bail!("pass --explanation or --explanation-file"),
    };
    let displayed = image::open(&args.image)
        .with_context(|| format!("failed loading image {}", args.image.display()))?;

    let history = ScoreHistoryStore::load(args.out.join("score_history.json"));
    let log = SessionLog::new(args.out.join("events.jsonl"), Uuid::new_v4().to_string());
    let mut pipeline = CoachPipeline::new(default_model(), history).with_log(log);
    if pipeline.model_name() == "offline" {
        eprintln!("note: no GEMINI_API_KEY configured; producing an offline placeholder result");
    }

    if args.with_strategy {
        match pipeline.request_strategy(Some(&displayed)) {
            Ok(hint) => println!("Strategy: {hint}\n"),
            // a run can still proceed without a hint
            Err(err) => eprintln!("strategy unavailable: {err}"),
        }
    }

    let feedback = pipeline
        .submit(Some(&displayed), &explanation, mode)?
        .clone();
    print_feedback(&feedback, mode);
    println!(
        "\nSessions recorded: {} (history at {})",
        pipeline.history().len(),
        pipeline.history().path().display()
    );

    if let Some(share_base) = &args.share_base {
        let link = ChallengeLink::new(args.image.display().to_string(), feedback.score);
        println!("Challenge link: {}", link.encode(share_base)?);
    }
    Ok(0)
}

fn run_history(args: HistoryArgs) -> Result<i32> {
    let history = ScoreHistoryStore::load(args.out.join("score_history.json"));
    if history.is_empty() {
        println!("No sessions recorded yet.");
        return Ok(0);
    }
    for entry in history.entries() {
        println!("{}  {:>3}  {}", entry.date, entry.score, entry.mode);
    }
    Ok(0)
}

fn run_challenge(args: ChallengeArgs) -> Result<i32> {
    let Some(link) = ChallengeLink::parse(&args.link) else {
        bail!("not a challenge link: {}", args.link);
    };
    println!("Image:         {}", link.image_url);
    println!("Score to beat: {}", link.score_to_beat);
    Ok(0)
}

fn print_feedback(feedback: &Feedback, mode: CoachMode) {
    println!("== Feedback ({mode} mode) ==");
    println!("Score: {}/100", feedback.score);
    println!("\nWhat you did well:\n  {}", feedback.what_you_did_well);
    println!(
        "\nAreas for improvement:\n  {}",
        feedback.areas_for_improvement
    );
    println!("\nPersonalized tip:\n  {}", feedback.personalized_tip);
    println!("\nCoach says:\n  {}", feedback.spoken_response);

    let behavior = &feedback.communication_behavior;
    println!("\n== Communication profile ==");
    println!("Profile:     {}", behavior.profile);
    println!("Strength:    {}", behavior.strength);
    println!("Growth area: {}", behavior.growth_area);

    let rewrite = &feedback.example_rewrite;
    println!("\n== Impact rewrite ==");
    println!("Original:  {}", rewrite.original);
    println!("Improved:  {}", rewrite.improved);
    println!("Why:       {}", rewrite.reasoning);
}
