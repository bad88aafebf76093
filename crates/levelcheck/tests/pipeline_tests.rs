//! End-to-end behavior of the job pipeline against a real SQLite store.

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use common::{FixedScorer, ScriptedTranscriber, TestHarness};
use levelcheck::config::ErrorPolicy;
use levelcheck::db::DatabaseError;
use levelcheck::job::{Dimension, JobId, JobStatus, ProficiencyLevel, Stage};
use levelcheck::pipeline::{JobOutcome, PipelineError};
use levelcheck::scoring::ScoringError;
use levelcheck::transcription::TranscriptionError;
use levelcheck::JobStore;

fn unreadable() -> TranscriptionError {
    TranscriptionError::UnreadableFile {
        path: PathBuf::from("/gone.ogg"),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
    }
}

#[test]
fn transcription_stage_stores_transcript_without_scores() {
    let harness = TestHarness::new();
    let id = harness.saved_job("en", 1);

    // Scoring times out, so the record stays where the first stage left it.
    let pipeline = harness.pipeline(
        Arc::new(ScriptedTranscriber::returning("hello world")),
        Arc::new(FixedScorer::failing(|| ScoringError::Timeout)),
        ErrorPolicy::Propagate,
    );
    let err = pipeline.process_job(id).unwrap_err();
    assert!(err.is_transient());

    let record = harness.record(id);
    assert_eq!(record.status, JobStatus::Transcribed);
    assert_eq!(record.transcript.as_deref(), Some("hello world"));
    assert!(record.assessment.is_none());
    assert!(record.updated_at >= record.created_at);
}

#[test]
fn both_stages_reach_checked() {
    let harness = TestHarness::new();
    let id = harness.saved_job("en", 1);

    let outcome = harness
        .pipeline(
            Arc::new(ScriptedTranscriber::returning("hello world")),
            Arc::new(FixedScorer::new(ProficiencyLevel::B2, 72.5)),
            ErrorPolicy::Propagate,
        )
        .process_job(id)
        .unwrap();
    assert_eq!(outcome, JobOutcome::Checked);

    let record = harness.record(id);
    assert_eq!(record.status, JobStatus::Checked);
    assert_eq!(record.transcript.as_deref(), Some("hello world"));

    let assessment = record.assessment.expect("assessment stored");
    assert_eq!(assessment.level, ProficiencyLevel::B2);
    assert_eq!(assessment.overall_score, 72.5);
    assert_eq!(assessment.dimensions.len(), 9);
    for dimension in Dimension::ALL {
        let entry = assessment.dimension(dimension).expect("dimension stored");
        assert_eq!(entry.score, 72.5);
        assert!(!entry.explanation.is_empty());
    }
}

#[test]
fn scorer_receives_question_text_for_language() {
    let harness = TestHarness::new();
    let id = harness.saved_job("fr", 1);
    let scorer = Arc::new(FixedScorer::new(ProficiencyLevel::C1, 88.0));

    harness
        .pipeline(
            Arc::new(ScriptedTranscriber::returning("J'habite à Lyon.")),
            scorer.clone(),
            ErrorPolicy::Propagate,
        )
        .process_job(id)
        .unwrap();

    let requests = scorer.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].language, "fr");
    assert_eq!(requests[0].transcript, "J'habite à Lyon.");
    assert_eq!(requests[0].question, "Parlez-moi de votre ville natale.");
}

#[test]
fn swallowed_transcription_error_leaves_record_saved() {
    let harness = TestHarness::new();
    let id = harness.saved_job("en", 1);

    let outcome = harness
        .pipeline(
            Arc::new(ScriptedTranscriber::failing(|| {
                TranscriptionError::Unavailable("engine down".to_string())
            })),
            Arc::new(FixedScorer::new(ProficiencyLevel::B2, 72.5)),
            ErrorPolicy::Swallow,
        )
        .process_job(id)
        .unwrap();
    assert_eq!(outcome, JobOutcome::Abandoned);

    let record = harness.record(id);
    assert_eq!(record.status, JobStatus::Saved);
    assert!(record.transcript.is_none());
    assert_eq!(record.version, 1);
}

#[test]
fn swallowed_permanent_error_does_not_mark_failed() {
    let harness = TestHarness::new();
    let id = harness.saved_job("en", 1);

    let outcome = harness
        .pipeline(
            Arc::new(ScriptedTranscriber::failing(unreadable)),
            Arc::new(FixedScorer::new(ProficiencyLevel::B2, 72.5)),
            ErrorPolicy::Swallow,
        )
        .process_job(id)
        .unwrap();

    assert_eq!(outcome, JobOutcome::Abandoned);
    assert_eq!(harness.record(id).status, JobStatus::Saved);
}

#[test]
fn permanent_transcription_error_marks_failed() {
    let harness = TestHarness::new();
    let id = harness.saved_job("en", 1);

    let err = harness
        .pipeline(
            Arc::new(ScriptedTranscriber::failing(unreadable)),
            Arc::new(FixedScorer::new(ProficiencyLevel::B2, 72.5)),
            ErrorPolicy::Propagate,
        )
        .process_job(id)
        .unwrap_err();
    assert!(!err.is_transient());

    let record = harness.record(id);
    match &record.status {
        JobStatus::Failed { stage, reason } => {
            assert_eq!(*stage, Stage::Transcription);
            assert!(reason.contains("gone"), "reason: {}", reason);
        }
        other => panic!("expected failed status, got {}", other),
    }
    assert!(record.transcript.is_none());
}

#[test]
fn missing_question_is_permanent_scoring_failure() {
    let harness = TestHarness::new();
    let id = harness.saved_job("en", 42);

    let err = harness
        .pipeline(
            Arc::new(ScriptedTranscriber::returning("hello")),
            Arc::new(FixedScorer::new(ProficiencyLevel::B2, 72.5)),
            ErrorPolicy::Propagate,
        )
        .process_job(id)
        .unwrap_err();
    assert!(matches!(err, PipelineError::QuestionNotFound { question_id: 42, .. }));

    let record = harness.record(id);
    assert!(matches!(
        record.status,
        JobStatus::Failed {
            stage: Stage::Scoring,
            ..
        }
    ));
    assert_eq!(record.transcript.as_deref(), Some("hello"));
    assert!(record.assessment.is_none());
}

#[test]
fn unknown_language_has_no_questions() {
    let harness = TestHarness::new();
    let id = harness.saved_job("de", 1);

    let err = harness
        .pipeline(
            Arc::new(ScriptedTranscriber::returning("Hallo")),
            Arc::new(FixedScorer::new(ProficiencyLevel::A2, 40.0)),
            ErrorPolicy::Propagate,
        )
        .process_job(id)
        .unwrap_err();
    assert!(matches!(err, PipelineError::QuestionNotFound { .. }));
}

#[test]
fn missing_record_is_skipped_without_writes() {
    let harness = TestHarness::new();
    let transcriber = Arc::new(ScriptedTranscriber::returning("hello"));

    let outcome = harness
        .pipeline(
            transcriber.clone(),
            Arc::new(FixedScorer::new(ProficiencyLevel::B2, 72.5)),
            ErrorPolicy::Propagate,
        )
        .process_job(JobId::new(9999))
        .unwrap();

    assert_eq!(outcome, JobOutcome::Skipped);
    assert_eq!(transcriber.calls(), 0);
    assert!(harness.db.read_all().unwrap().is_empty());
}

#[test]
fn failed_record_is_skipped() {
    let harness = TestHarness::new();
    let id = harness.saved_job("en", 1);

    harness
        .pipeline(
            Arc::new(ScriptedTranscriber::failing(unreadable)),
            Arc::new(FixedScorer::new(ProficiencyLevel::B2, 72.5)),
            ErrorPolicy::Propagate,
        )
        .process_job(id)
        .unwrap_err();
    let failed = harness.record(id);

    let transcriber = Arc::new(ScriptedTranscriber::returning("hello"));
    let outcome = harness
        .pipeline(
            transcriber.clone(),
            Arc::new(FixedScorer::new(ProficiencyLevel::B2, 72.5)),
            ErrorPolicy::Propagate,
        )
        .process_job(id)
        .unwrap();

    assert_eq!(outcome, JobOutcome::Skipped);
    assert_eq!(transcriber.calls(), 0);
    assert_eq!(harness.record(id), failed);
}

#[test]
fn reprocessing_checked_record_converges() {
    let harness = TestHarness::new();
    let id = harness.saved_job("en", 2);
    let pipeline = harness.pipeline(
        Arc::new(ScriptedTranscriber::returning("I liked Dune.")),
        Arc::new(FixedScorer::new(ProficiencyLevel::B1, 61.0)),
        ErrorPolicy::Propagate,
    );

    pipeline.process_job(id).unwrap();
    let first = harness.record(id);

    assert_eq!(pipeline.process_job(id).unwrap(), JobOutcome::Checked);
    let second = harness.record(id);

    assert_eq!(second.status, JobStatus::Checked);
    assert_eq!(second.transcript, first.transcript);
    assert_eq!(second.assessment, first.assessment);
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at >= first.updated_at);
    assert_eq!(second.version, first.version + 2);
}

#[test]
fn checked_record_never_becomes_failed() {
    let harness = TestHarness::new();
    let id = harness.saved_job("en", 1);

    harness
        .pipeline(
            Arc::new(ScriptedTranscriber::returning("hello")),
            Arc::new(FixedScorer::new(ProficiencyLevel::B2, 72.5)),
            ErrorPolicy::Propagate,
        )
        .process_job(id)
        .unwrap();

    let err = harness
        .pipeline(
            Arc::new(ScriptedTranscriber::returning("hello again")),
            Arc::new(FixedScorer::failing(|| {
                ScoringError::MalformedResponse("no JSON object".to_string())
            })),
            ErrorPolicy::Propagate,
        )
        .process_job(id)
        .unwrap_err();
    assert!(!err.is_transient());

    let record = harness.record(id);
    assert_eq!(record.status, JobStatus::Checked);
    assert!(record.assessment.is_some());
}

#[test]
fn status_never_moves_backward() {
    let harness = TestHarness::new();
    let id = harness.saved_job("en", 1);
    let mut seen = vec![harness.record(id).status];

    // Transient scoring failure, then success, then a full reprocess.
    harness
        .pipeline(
            Arc::new(ScriptedTranscriber::returning("hello")),
            Arc::new(FixedScorer::failing(|| ScoringError::Timeout)),
            ErrorPolicy::Propagate,
        )
        .process_job(id)
        .unwrap_err();
    seen.push(harness.record(id).status);

    let pipeline = harness.pipeline(
        Arc::new(ScriptedTranscriber::returning("hello")),
        Arc::new(FixedScorer::new(ProficiencyLevel::B2, 72.5)),
        ErrorPolicy::Propagate,
    );
    pipeline.process_job(id).unwrap();
    seen.push(harness.record(id).status);
    pipeline.process_job(id).unwrap();
    seen.push(harness.record(id).status);

    for pair in seen.windows(2) {
        assert!(
            pair[0].can_advance_to(&pair[1]),
            "{} -> {} regressed",
            pair[0],
            pair[1]
        );
    }
    assert_eq!(
        seen,
        vec![
            JobStatus::Saved,
            JobStatus::Transcribed,
            JobStatus::Checked,
            JobStatus::Checked
        ]
    );
}

#[test]
fn store_rejects_status_regression() {
    let harness = TestHarness::new();
    let id = harness.saved_job("en", 1);

    harness
        .pipeline(
            Arc::new(ScriptedTranscriber::returning("hello")),
            Arc::new(FixedScorer::new(ProficiencyLevel::B2, 72.5)),
            ErrorPolicy::Propagate,
        )
        .process_job(id)
        .unwrap();

    let checked = harness.record(id);
    let mut regressed = checked.clone();
    regressed.status = JobStatus::Transcribed;
    regressed.assessment = None;

    let err = harness.db.update_by_id(id, &regressed).unwrap_err();
    assert!(matches!(err, DatabaseError::StatusRegression { .. }));
    assert!(!err.is_transient());
    assert_eq!(harness.record(id), checked);
}

#[test]
fn stale_write_is_a_transient_version_conflict() {
    let harness = TestHarness::new();
    let id = harness.saved_job("en", 1);

    let snapshot = harness.record(id);
    harness
        .db
        .update_by_id(
            id,
            &snapshot.transcribed("first writer".to_string(), chrono::Utc::now()),
        )
        .unwrap();

    let err = harness
        .db
        .update_by_id(
            id,
            &snapshot.transcribed("second writer".to_string(), chrono::Utc::now()),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        DatabaseError::VersionConflict {
            expected: 1,
            actual: 2,
            ..
        }
    ));
    assert!(err.is_transient());
    assert_eq!(harness.record(id).transcript.as_deref(), Some("first writer"));
}
