//! Isolated environment for pipeline and consumer tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use levelcheck::config::ErrorPolicy;
use levelcheck::job::{JobId, JobRecord, NewJobRecord};
use levelcheck::pipeline::{JobHandler, JobPipeline, PipelineConfig};
use levelcheck::queue::{BrokerStats, Consumer, ConsumerSettings, ConsumerStats, MemoryBroker};
use levelcheck::scoring::ScoringEngine;
use levelcheck::transcription::TranscriptionEngine;
use levelcheck::{Database, JobStore, JsonQuestionCatalog};

pub const QUEUE: &str = "audio_processing";
pub const DEAD_LETTER_QUEUE: &str = "audio_processing.dead";

const ENGLISH_QUESTIONS: &str = r#"[
  { "question_id": 1, "question_content": "Tell me about your hometown." },
  { "question_id": 2, "question_content": "Describe a book you enjoyed." }
]"#;

const FRENCH_QUESTIONS: &str = r#"[
  { "question_id": 1, "question_content": "Parlez-moi de votre ville natale." }
]"#;

pub struct TestHarness {
    temp_dir: TempDir,
    pub db: Database,
    pub broker: MemoryBroker,
    pub questions_dir: PathBuf,
    pub upload_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();

        let questions_dir = base.join("questions");
        let upload_dir = base.join("uploads");
        std::fs::create_dir_all(&questions_dir).expect("Failed to create questions dir");
        std::fs::create_dir_all(&upload_dir).expect("Failed to create upload dir");

        std::fs::write(questions_dir.join("questions.en.json"), ENGLISH_QUESTIONS)
            .expect("Failed to write English questions");
        std::fs::write(questions_dir.join("questions.fr.json"), FRENCH_QUESTIONS)
            .expect("Failed to write French questions");

        let db = Database::open(&base.join("levelcheck.db")).expect("Failed to open database");

        Self {
            temp_dir,
            db,
            broker: MemoryBroker::new(),
            questions_dir,
            upload_dir,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes a small fake audio file into the upload directory.
    pub fn write_audio(&self, name: &str) -> PathBuf {
        let path = self.upload_dir.join(name);
        std::fs::write(&path, b"OggS\0fake-audio").expect("Failed to write audio");
        path
    }

    /// Creates a `Saved` record pointing at a fresh audio file.
    pub fn saved_job(&self, language: &str, question_id: i64) -> JobId {
        let file_name = format!("{}-{}.ogg", language, uuid_like(question_id));
        let file_path = self.write_audio(&file_name);
        self.db
            .create(&NewJobRecord {
                language: language.to_string(),
                question_id,
                file_name,
                file_path,
            })
            .expect("Failed to create job record")
    }

    pub fn record(&self, id: JobId) -> JobRecord {
        self.db
            .read_by_id(id)
            .expect("Failed to read job record")
            .expect("Job record missing")
    }

    pub fn pipeline(
        &self,
        transcriber: Arc<dyn TranscriptionEngine>,
        scorer: Arc<dyn ScoringEngine>,
        policy: ErrorPolicy,
    ) -> JobPipeline {
        JobPipeline::new(
            Arc::new(self.db.clone()),
            transcriber,
            scorer,
            Arc::new(JsonQuestionCatalog::new(&self.questions_dir)),
            PipelineConfig {
                error_policy: policy,
            },
        )
    }

    pub fn consumer(&self, workers: usize) -> Consumer {
        let settings = ConsumerSettings {
            worker_count: workers,
            reconnect_backoff: Duration::from_millis(20),
            receive_timeout: Duration::from_millis(20),
            ..ConsumerSettings::new(QUEUE)
        };
        Consumer::new(Arc::new(self.broker.clone()), settings)
    }

    pub fn enqueue(&self, id: JobId) {
        self.broker.push(QUEUE, &id.to_string());
    }

    /// Runs `consumer` on a background thread until the broker stats satisfy
    /// `done`, then shuts it down and returns its stats.
    pub fn run_until<F>(
        &self,
        consumer: Consumer,
        handler: Arc<dyn JobHandler>,
        done: F,
    ) -> ConsumerStats
    where
        F: Fn(&BrokerStats) -> bool,
    {
        let shutdown = consumer.shutdown_handle();
        let handle = thread::spawn(move || consumer.run(handler));

        let reached = self.broker.wait_for(Duration::from_secs(10), done);
        shutdown.store(true, Ordering::SeqCst);

        let stats = handle
            .join()
            .expect("consumer thread panicked")
            .expect("consumer failed");
        assert!(reached, "broker never reached the expected state: {:?}", self.broker.stats());
        stats
    }
}

fn uuid_like(seed: i64) -> String {
    format!("{:08x}-{}", seed, uuid::Uuid::new_v4().simple())
}
