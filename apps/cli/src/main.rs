use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use kairos_core::{
    Collaborators, DirSessionStore, Pipeline, PipelineOptions, Privacy, Progress, Provider,
    RunAborted, RunReport, SessionId, SessionStore, TranscriptRecord, VideoIdCollector,
    backends::{
        LlmPlanner, PlaylistPlatform, WhisperRecognizer, YouTubePlaylists, YtDlpAudio,
        YtDlpCaptions, YtDlpCatalog, whisper::ensure_model,
    },
    get_root_cache_dir,
    pipeline::DEFAULT_PLAYLIST_DESCRIPTION,
    search::DEFAULT_MAX_RESULTS,
    store::TRANSCRIPT_LOG_KEY,
};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use crate::render::{create_spinner, format_duration, render_events, render_transcript};

mod render;

/// CLI wrapper for Provider enum (needed for clap ValueEnum)
#[derive(Clone, Default, ValueEnum)]
enum CliProvider {
    #[default]
    Grok,
    Openai,
    Gemini,
}

impl From<CliProvider> for Provider {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Grok => Provider::Grok,
            CliProvider::Openai => Provider::Openai,
            CliProvider::Gemini => Provider::Gemini,
        }
    }
}

#[derive(Clone, Default, ValueEnum)]
enum CliPrivacy {
    #[default]
    Private,
    Public,
    Unlisted,
}

impl From<CliPrivacy> for Privacy {
    fn from(cli: CliPrivacy) -> Self {
        match cli {
            CliPrivacy::Private => Privacy::Private,
            CliPrivacy::Public => Privacy::Public,
            CliPrivacy::Unlisted => Privacy::Unlisted,
        }
    }
}

#[derive(Parser)]
#[command(name = "kairos")]
#[command(
    about = "Turn a learning goal into a YouTube playlist with a transcript for every video"
)]
struct Cli {
    /// Directory holding one sub-directory per session
    #[arg(long, global = true, env = "KAIROS_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// AI provider for syllabus planning
    #[arg(short, long, global = true, default_value = "grok")]
    provider: CliProvider,

    /// Model asked for a syllabus instead of the provider's default
    #[arg(short, long, global = true, env = "KAIROS_MODEL")]
    model: Option<String>,

    /// Search results kept per query
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_RESULTS)]
    max_results: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan, search, build the playlist and transcribe every video
    Run {
        /// Learning goal. Asked for interactively when omitted.
        goal: Vec<String>,

        #[command(flatten)]
        args: RunArgs,
    },
    /// Continue an aborted run from its stored syllabus
    Resume {
        session: String,

        /// Learning goal, used as the playlist title
        #[arg(required = true)]
        goal: Vec<String>,

        /// Keep filling this playlist instead of the one stored with the session
        #[arg(long)]
        playlist: Option<String>,

        #[command(flatten)]
        args: RunArgs,
    },
    /// Print the video ids collected from stored search results
    Ids {
        /// Only this session. Every session when omitted.
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Print the logged transcripts of a session with timestamps
    Transcripts {
        session: String,

        /// Only this video
        #[arg(short, long)]
        video: Option<String>,
    },
    /// List the playlists of the authorized account
    Playlists,
}

#[derive(Args)]
struct RunArgs {
    /// Visit each video id only once
    #[arg(long)]
    dedup: bool,

    #[arg(long, default_value = "private")]
    privacy: CliPrivacy,

    #[arg(long, default_value = DEFAULT_PLAYLIST_DESCRIPTION)]
    description: String,

    /// Print transcript text while it is produced
    #[arg(long)]
    show_transcripts: bool,
}

enum Start {
    Fresh,
    Resume {
        session: SessionId,
        playlist: Option<String>,
    },
}

struct PlannerChoice {
    provider: Provider,
    model: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    /// Finish the current video, then stop.
    Stop,
    Exit,
}

/// First Ctrl-C asks the pipeline to stop between videos, the next one exits.
struct Interrupts {
    shutdown: broadcast::Sender<()>,
    pressed: bool,
}

impl Interrupts {
    fn new(shutdown: broadcast::Sender<()>) -> Self {
        Self {
            shutdown,
            pressed: false,
        }
    }

    fn press(&mut self) -> Interrupt {
        if self.pressed {
            return Interrupt::Exit;
        }
        self.pressed = true;
        let _ = self.shutdown.send(());
        Interrupt::Stop
    }
}

extern "C" fn whisper_log_callback(
    _level: u32,
    _message: *const std::ffi::c_char,
    _user_data: *mut std::ffi::c_void,
) {
    // silent
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn error_line(e: impl std::fmt::Display) {
    eprintln!("{} {}", style("Error:").red().bold(), e);
}

fn read_goal() -> Result<String> {
    print!("{} ", style("What do you want to learn?").cyan().bold());
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read goal from stdin")?;
    Ok(line.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    unsafe {
        whisper_rs::set_log_callback(Some(whisper_log_callback), std::ptr::null_mut());
    }

    let planner = PlannerChoice {
        provider: cli.provider.into(),
        model: cli.model,
    };
    let store = Arc::new(DirSessionStore::new(&cli.data_dir));

    match cli.command {
        Command::Run { goal, args } => {
            let goal = if goal.is_empty() {
                read_goal()?
            } else {
                goal.join(" ")
            };
            run(store, planner, cli.max_results, args, Start::Fresh, goal).await
        }
        Command::Resume {
            session,
            goal,
            playlist,
            args,
        } => {
            let session = SessionId::new(session)?;
            let goal = goal.join(" ");
            run(
                store,
                planner,
                cli.max_results,
                args,
                Start::Resume { session, playlist },
                goal,
            )
            .await
        }
        Command::Ids { session } => {
            let session = session.map(SessionId::new).transpose()?;
            let ids = VideoIdCollector::new(store)
                .collect(session.as_ref())
                .await?;
            for id in ids {
                println!("{id}");
            }
            Ok(())
        }
        Command::Transcripts { session, video } => {
            let session = SessionId::new(session)?;
            let records = store.read_log(&session, TRANSCRIPT_LOG_KEY).await?;
            if records.is_empty() {
                tracing::warn!(session = %session, "no transcripts logged");
            }
            for record in records {
                let record: TranscriptRecord = serde_json::from_value(record)
                    .context("transcript log holds a malformed record")?;
                if video.as_ref().is_some_and(|id| *id != record.video_id) {
                    continue;
                }
                println!("{}", render_transcript(&record));
            }
            Ok(())
        }
        Command::Playlists => {
            let playlists = YouTubePlaylists::from_env()?
                .list_playlists(cli.max_results)
                .await?;
            for playlist in playlists {
                println!(
                    "{}  {} {}",
                    style(&playlist.title).bold(),
                    style(playlist.url()).cyan(),
                    style(format!("({} videos)", playlist.item_count)).dim()
                );
            }
            Ok(())
        }
    }
}

async fn load_recognizer(cache_dir: &Path) -> Result<WhisperRecognizer> {
    let spinner = create_spinner("Checking model...");
    let model_path = ensure_model(cache_dir).await?;
    spinner.set_message("Loading model...");
    let recognizer = WhisperRecognizer::load(&model_path)?;
    spinner.finish_with_message(format!(
        "{} Model {}",
        style("✓").green().bold(),
        style(model_path.display()).dim()
    ));
    Ok(recognizer)
}

async fn run(
    store: Arc<DirSessionStore>,
    choice: PlannerChoice,
    max_results: usize,
    args: RunArgs,
    start: Start,
    goal: String,
) -> Result<()> {
    // fail before any network call when credentials are missing
    let mut planner = LlmPlanner::new(choice.provider)?;
    if let Some(model) = choice.model {
        planner = planner.with_model(model);
    }
    let playlists = YouTubePlaylists::from_env()?;

    println!(
        "\n{}  {}\n",
        style("kairos").cyan().bold(),
        style("Learning Playlist Builder").dim()
    );

    let cache_dir = get_root_cache_dir();
    let recognizer = load_recognizer(&cache_dir).await?;
    println!("{}", style("─".repeat(60)).dim());

    let collaborators = Collaborators {
        planner: Arc::new(planner),
        catalog: Arc::new(YtDlpCatalog::new()),
        playlists: Arc::new(playlists),
        transcripts: Arc::new(YtDlpCaptions::new(&cache_dir)),
        audio: Arc::new(YtDlpAudio::new(&cache_dir)),
        recognizer: Arc::new(recognizer),
    };
    let options = PipelineOptions {
        max_results,
        dedup_video_ids: args.dedup,
        privacy: args.privacy.into(),
        description: args.description,
    };

    let (progress, events) = Progress::channel();
    let renderer = tokio::spawn(render_events(events, args.show_transcripts));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        let mut interrupts = Interrupts::new(shutdown_tx);
        while tokio::signal::ctrl_c().await.is_ok() {
            if interrupts.press() == Interrupt::Exit {
                tracing::warn!("interrupted twice, exiting without finishing the current video");
                std::process::exit(130);
            }
            tracing::info!("stopping after the current video, press Ctrl-C again to exit now");
        }
    });

    let mut pipeline = Pipeline::new(store, collaborators, options)
        .with_progress(progress)
        .with_shutdown(shutdown_rx);

    let total_start = Instant::now();
    let result = match start {
        Start::Fresh => pipeline.run(&goal).await,
        Start::Resume { session, playlist } => pipeline.resume(session, &goal, playlist).await,
    };

    // closes the progress channel so the renderer drains and exits
    drop(pipeline);
    let _ = renderer.await;

    match result {
        Ok(report) => {
            print_report(&report, &goal, total_start);
            Ok(())
        }
        Err(aborted) => {
            tracing::warn!(
                session = ?aborted.session.as_ref().map(|s| s.to_string()),
                error = %aborted.error,
                "run aborted"
            );
            print_abort(&aborted, &goal);
            std::process::exit(1);
        }
    }
}

fn print_report(report: &RunReport, goal: &str, total_start: Instant) {
    println!("{}", style("─".repeat(60)).dim());
    println!(
        "{} {} videos, {} added, {} not added",
        style("Playlist:").dim(),
        report.videos,
        report.attached,
        report.attach_failures
    );
    println!(
        "{} {} captions, {} whisper, {} missing",
        style("Transcripts:").dim(),
        report.transcripts_primary,
        report.transcripts_fallback,
        report.transcripts_missing
    );
    if report.skipped > 0 {
        println!(
            "{} {} videos already transcribed",
            style("Resumed:").dim(),
            report.skipped
        );
    }
    if report.failed_queries > 0 {
        println!(
            "{} {} queries failed",
            style("Search:").dim(),
            report.failed_queries
        );
    }
    if report.cancelled {
        if let Some(session) = &report.session {
            println!(
                "{} cancelled, session {}",
                style("Run:").dim(),
                style(session).yellow()
            );
            println!(
                "{} {}",
                style("Resume with:").dim(),
                resume_hint(session, goal)
            );
        }
    }
    println!(
        "\n{} {}",
        style("Total time:").dim(),
        style(format_duration(total_start.elapsed())).cyan().bold()
    );
    println!(
        "{} {}\n",
        style("Saved:").dim(),
        style(&report.location).cyan()
    );
}

fn print_abort(aborted: &RunAborted, goal: &str) {
    error_line(&aborted.error);
    if let Some(session) = &aborted.session {
        eprintln!(
            "{} {}",
            style("Resume with:").dim(),
            resume_hint(session, goal)
        );
    }
}

fn resume_hint(session: &SessionId, goal: &str) -> String {
    format!("kairos resume {session} {goal:?}")
}
