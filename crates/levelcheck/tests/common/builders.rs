//! Scripted collaborators for driving the pipeline deterministically.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use levelcheck::job::{Assessment, Dimension, DimensionScore, ProficiencyLevel};
use levelcheck::scoring::{ScoringEngine, ScoringError, ScoringRequest};
use levelcheck::transcription::{TranscriptionEngine, TranscriptionError};

/// Builds an assessment where every dimension carries `score`.
pub fn uniform_assessment(level: ProficiencyLevel, score: f64) -> Assessment {
    let dimensions: BTreeMap<Dimension, DimensionScore> = Dimension::ALL
        .iter()
        .map(|d| {
            (
                *d,
                DimensionScore {
                    explanation: format!("{} looks fine", d.key()),
                    score,
                },
            )
        })
        .collect();
    Assessment::new(level, dimensions, Some(score)).expect("valid assessment")
}

type TranscriptionStep = Result<String, fn() -> TranscriptionError>;

/// Returns queued results in order, then `fallback` forever.
pub struct ScriptedTranscriber {
    steps: Mutex<VecDeque<TranscriptionStep>>,
    fallback: TranscriptionStep,
    calls: AtomicUsize,
}

impl ScriptedTranscriber {
    pub fn returning(text: &str) -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            fallback: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(make: fn() -> TranscriptionError) -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            fallback: Err(make),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails the first `times` calls before falling back.
    pub fn then_after_failures(self, times: usize, make: fn() -> TranscriptionError) -> Self {
        {
            let mut steps = self.steps.lock().unwrap();
            for _ in 0..times {
                steps.push_back(Err(make));
            }
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TranscriptionEngine for ScriptedTranscriber {
    fn transcribe(&self, _audio: &Path, _language: &str) -> Result<String, TranscriptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        step.map_err(|make| make())
    }
}

/// Scores every transcript the same way and remembers the requests.
pub struct FixedScorer {
    result: Result<Assessment, fn() -> ScoringError>,
    requests: Mutex<Vec<ScoringRequest>>,
}

impl FixedScorer {
    pub fn new(level: ProficiencyLevel, overall: f64) -> Self {
        Self {
            result: Ok(uniform_assessment(level, overall)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(make: fn() -> ScoringError) -> Self {
        Self {
            result: Err(make),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ScoringRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ScoringEngine for FixedScorer {
    fn assess(&self, request: &ScoringRequest) -> Result<Assessment, ScoringError> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.result {
            Ok(assessment) => Ok(assessment.clone()),
            Err(make) => Err(make()),
        }
    }
}
