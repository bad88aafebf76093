pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod intake;
pub mod job;
pub mod logging;
pub mod pipeline;
pub mod questions;
pub mod queue;
pub mod sanitize;
pub mod scoring;
pub mod secrets;
pub mod transcription;
pub mod worker;

pub use broadcast::{JobPhase, JobProgressBroadcaster, JobProgressEvent};
pub use config::{load_config, Config, ErrorPolicy};
pub use db::{Database, DatabaseError, JobStore};
pub use error::{ConfigError, LevelcheckError, Result, WorkerError};
pub use intake::{submit, IntakeError, Receipt, Submission};
pub use job::{Assessment, Dimension, JobId, JobRecord, JobStatus, ProficiencyLevel, Stage};
pub use pipeline::{JobHandler, JobOutcome, JobPipeline, PipelineConfig, PipelineError};
pub use questions::{CatalogError, JsonQuestionCatalog, QuestionCatalog};
pub use queue::{
    BrokerError, Consumer, ConsumerSettings, MemoryBroker, QueueConnector, RedisConnector,
};
pub use scoring::{ScoringEngine, ScoringError};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use transcription::{SharedTranscriber, TranscriptionEngine, TranscriptionError};
pub use worker::WorkerPool;
