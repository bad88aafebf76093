use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::sync::broadcast::error::RecvError;

use levelcheck::config::{Config, ErrorPolicy};
use levelcheck::db::job_repo;
use levelcheck::pipeline::BroadcastProgress;
use levelcheck::queue::{publish_job, Consumer, ConsumerSettings, RedisConnector};
use levelcheck::{
    load_config, submit, Database, JobId, JobPipeline, JobProgressBroadcaster, JobStore,
    Submission,
};

#[derive(Parser)]
#[command(name = "levelcheck", version, about = "Transcribe and score spoken answers")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, env = "LEVELCHECK_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Consume job ids from the queue until interrupted
    Consume {
        /// Overrides queue.worker_count
        #[arg(short, long)]
        workers: Option<usize>,

        /// Overrides pipeline.error_policy
        #[arg(long, value_parser = parse_policy)]
        policy: Option<ErrorPolicy>,

        /// Print progress events as JSON lines on stdout
        #[arg(long)]
        progress: bool,
    },
    /// Stage an audio answer, record it and publish its id
    Submit {
        #[arg(short, long)]
        language: String,

        #[arg(short, long)]
        question: i64,

        audio: PathBuf,
    },
    /// Publish existing job ids again
    Publish {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Print one job record as JSON
    Show { id: i64 },
    /// List job records
    List {
        /// Only print per-status counts
        #[arg(long)]
        summary: bool,
    },
}

fn parse_policy(value: &str) -> Result<ErrorPolicy, String> {
    match value {
        "propagate" => Ok(ErrorPolicy::Propagate),
        "swallow" => Ok(ErrorPolicy::Swallow),
        other => Err(format!(
            "unknown policy '{}' (expected propagate or swallow)",
            other
        )),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    levelcheck::logging::init(&config.logging)?;

    match cli.command {
        Command::Consume {
            workers,
            policy,
            progress,
        } => {
            if let Some(workers) = workers {
                if workers == 0 {
                    bail!("--workers must be greater than 0");
                }
                config.queue.worker_count = workers;
            }
            if let Some(policy) = policy {
                config.pipeline.error_policy = policy;
            }
            consume(&config, progress)
        }
        Command::Submit {
            language,
            question,
            audio,
        } => {
            let db = open_database(&config)?;
            let connector = RedisConnector::from_config(&config.queue)?;
            let receipt = submit(
                &db,
                &connector,
                &config.queue.name,
                &config.upload_directory,
                &Submission {
                    language,
                    question_id: question,
                    audio,
                },
            )?;

            println!("{}", receipt.job_id);
            if !receipt.published {
                bail!(
                    "job {} was saved but not published; retry with `levelcheck publish {}`",
                    receipt.job_id,
                    receipt.job_id
                );
            }
            Ok(())
        }
        Command::Publish { ids } => {
            let db = open_database(&config)?;
            let connector = RedisConnector::from_config(&config.queue)?;
            for id in ids.into_iter().map(JobId::new) {
                let Some(record) = db.read_by_id(id)? else {
                    warn!("Job {} does not exist, not publishing", id);
                    continue;
                };
                if !levelcheck::pipeline::is_pending(&record.status) {
                    info!("Job {} is {}, publishing anyway", id, record.status);
                }
                publish_job(&connector, &config.queue.name, id)?;
            }
            Ok(())
        }
        Command::Show { id } => {
            let db = open_database(&config)?;
            match db.read_by_id(JobId::new(id))? {
                Some(record) => {
                    println!("{}", serde_json::to_string_pretty(&record)?);
                    Ok(())
                }
                None => bail!("job {} not found", id),
            }
        }
        Command::List { summary } => {
            let db = open_database(&config)?;
            if summary {
                for (status, count) in job_repo::count_by_status(&db)? {
                    println!("{:<12} {}", status, count);
                }
                return Ok(());
            }

            for record in db.read_all()? {
                let level = record
                    .assessment
                    .as_ref()
                    .map(|a| a.level.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:>6}  {:<5} q{:<4} {:<24} {:<4} {}",
                    record.id.get(),
                    record.language,
                    record.question_id,
                    record.status.to_string(),
                    level,
                    record.file_name
                );
            }
            Ok(())
        }
    }
}

fn open_database(config: &Config) -> Result<Database> {
    let path = config.resolve_database_path()?;
    Database::open(&path).with_context(|| format!("opening database {}", path.display()))
}

fn consume(config: &Config, print_progress: bool) -> Result<()> {
    let store: Arc<dyn JobStore> = Arc::new(open_database(config)?);
    let broadcaster = JobProgressBroadcaster::default();

    let watcher = if print_progress {
        let mut events = broadcaster.subscribe();
        Some(thread::spawn(move || loop {
            match events.blocking_recv() {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("Unprintable progress event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Progress output skipped {} event(s)", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }))
    } else {
        None
    };

    let pipeline = JobPipeline::from_config(config, store)?
        .with_progress(Arc::new(BroadcastProgress::new(broadcaster.clone())));
    info!("Error policy: {:?}", pipeline.error_policy());

    let connector = Arc::new(RedisConnector::from_config(&config.queue)?);
    let consumer = Consumer::new(connector, ConsumerSettings::from_config(&config.queue));

    let shutdown = consumer.shutdown_handle();
    ctrlc::set_handler(move || {
        info!("Interrupt received, finishing in-flight jobs");
        shutdown.store(true, Ordering::SeqCst);
    })
    .context("installing Ctrl-C handler")?;

    let stats = consumer.run(Arc::new(pipeline))?;
    info!("{:?}", stats);

    // The pipeline and its broadcast sender are gone once run returns.
    drop(broadcaster);
    if let Some(watcher) = watcher {
        join_progress_printer(watcher);
    }
    Ok(())
}

/// Returns false, after logging, when the printer thread panicked.
fn join_progress_printer(watcher: thread::JoinHandle<()>) -> bool {
    match watcher.join() {
        Ok(()) => true,
        Err(e) => {
            warn!("Progress printer panicked: {:?}", e);
            false
        }
    }
}
