//! Training and evaluation seams.
//!
//! The classifier and the experiment tracker are external collaborators; this
//! module only defines the interface the pipeline needs from them, plus two
//! small implementations used for smoke runs: a majority-class baseline and a
//! tracker that writes to the log.

use anyhow::{bail, Result};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

use crate::config::{RunConfig, TrackerConfig, TrainingArgs};
use crate::pipeline::PreparedSplits;
use crate::preprocess::{Dataset, TrainingExample};

/// Result of evaluating a classifier on a labelled dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub metrics: BTreeMap<String, f64>,
    pub predictions: Vec<i64>,
    pub misclassified: Vec<TrainingExample>,
}

pub trait Classifier {
    /// Fit on `train`, optionally scoring `eval` as training progresses.
    fn train(
        &mut self,
        train: &Dataset,
        eval: Option<&Dataset>,
        args: &TrainingArgs,
        tracker: &mut dyn ExperimentTracker,
    ) -> Result<()>;

    fn predict(&self, texts: &[&str]) -> Result<Vec<i64>>;

    fn evaluate(&self, dataset: &Dataset) -> Result<Evaluation> {
        let texts: Vec<&str> = dataset.iter().map(|e| e.text.as_str()).collect();
        let predictions = self.predict(&texts)?;
        if predictions.len() != dataset.len() {
            bail!(
                "classifier returned {} predictions for {} examples",
                predictions.len(),
                dataset.len()
            );
        }
        let truth: Vec<i64> = dataset.iter().map(|e| e.label).collect();

        let misclassified = dataset
            .iter()
            .zip(&predictions)
            .filter(|(ex, pred)| ex.label != **pred)
            .map(|(ex, _)| ex.clone())
            .collect();

        let mut metrics = BTreeMap::new();
        metrics.insert("accuracy".to_string(), accuracy(&truth, &predictions));
        metrics.insert("mcc".to_string(), matthews_corrcoef(&truth, &predictions));

        Ok(Evaluation {
            metrics,
            predictions,
            misclassified,
        })
    }
}

/// Receives run configuration and metrics. `init` opens the session and
/// must be called before anything is logged.
pub trait ExperimentTracker {
    /// Whether `init` needs an API key. Remote trackers return `true`.
    fn requires_auth(&self) -> bool {
        false
    }

    /// `credentials` is `Some` exactly when `requires_auth` is `true`.
    fn init(&mut self, config: &TrackerConfig, credentials: Option<&str>) -> Result<()>;
    fn log_metrics(&mut self, step: u64, metrics: &BTreeMap<String, f64>) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

pub fn accuracy(truth: &[i64], predicted: &[i64]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let correct = truth.iter().zip(predicted).filter(|(t, p)| t == p).count();
    correct as f64 / truth.len() as f64
}

/// Multiclass Matthews correlation coefficient. 0.0 when undefined.
pub fn matthews_corrcoef(truth: &[i64], predicted: &[i64]) -> f64 {
    let s = truth.len() as f64;
    let mut true_counts: HashMap<i64, f64> = HashMap::new();
    let mut pred_counts: HashMap<i64, f64> = HashMap::new();
    let mut correct = 0.0;
    for (&t, &p) in truth.iter().zip(predicted) {
        *true_counts.entry(t).or_insert(0.0) += 1.0;
        *pred_counts.entry(p).or_insert(0.0) += 1.0;
        if t == p {
            correct += 1.0;
        }
    }

    let cov_tp: f64 = true_counts
        .iter()
        .map(|(k, t)| t * pred_counts.get(k).copied().unwrap_or(0.0))
        .sum();
    let sum_p2: f64 = pred_counts.values().map(|p| p * p).sum();
    let sum_t2: f64 = true_counts.values().map(|t| t * t).sum();

    let denom = ((s * s - sum_p2) * (s * s - sum_t2)).sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    (correct * s - cov_tp) / denom
}

/// Writes the run configuration and every metric to the `tracing` log.
#[derive(Debug, Default)]
pub struct TracingTracker {
    project: Option<String>,
    history: Vec<(u64, BTreeMap<String, f64>)>,
}

impl TracingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[(u64, BTreeMap<String, f64>)] {
        &self.history
    }
}

impl ExperimentTracker for TracingTracker {
    fn init(&mut self, config: &TrackerConfig, _credentials: Option<&str>) -> Result<()> {
        let json = serde_json::to_string(config)?;
        info!(project = %config.project, config = %json, "tracker session started");
        self.project = Some(config.project.clone());
        Ok(())
    }

    fn log_metrics(&mut self, step: u64, metrics: &BTreeMap<String, f64>) -> Result<()> {
        let Some(project) = &self.project else {
            bail!("tracker session not initialised");
        };
        for (name, value) in metrics {
            info!(project = %project, step, metric = %name, value, "metric");
        }
        self.history.push((step, metrics.clone()));
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(project) = self.project.take() {
            info!(project = %project, steps = self.history.len(), "tracker session finished");
        }
        Ok(())
    }
}

/// Predicts the most frequent training label for every input.
#[derive(Debug, Default)]
pub struct MajorityBaseline {
    label: Option<i64>,
}

impl MajorityBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(&self) -> Option<i64> {
        self.label
    }
}

impl Classifier for MajorityBaseline {
    fn train(
        &mut self,
        train: &Dataset,
        eval: Option<&Dataset>,
        args: &TrainingArgs,
        tracker: &mut dyn ExperimentTracker,
    ) -> Result<()> {
        // ties go to the smallest label
        let majority = train
            .label_counts()
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .map(|(label, _)| label);
        let Some(label) = majority else {
            bail!("cannot train on an empty dataset");
        };
        self.label = Some(label);

        let mut metrics = BTreeMap::new();
        metrics.insert("train_examples".to_string(), train.len() as f64);
        if args.evaluate_during_training {
            if let Some(eval) = eval {
                for (name, value) in self.evaluate(eval)?.metrics {
                    metrics.insert(format!("eval_{}", name), value);
                }
            }
        }
        tracker.log_metrics(1, &metrics)?;
        Ok(())
    }

    fn predict(&self, texts: &[&str]) -> Result<Vec<i64>> {
        let Some(label) = self.label else {
            bail!("baseline used before training");
        };
        Ok(vec![label; texts.len()])
    }
}

/// Open the tracker session, train, evaluate on the test split and log the
/// final metrics. Errors from either collaborator propagate unchanged.
///
/// The API key is read from the environment only for trackers that ask for
/// one, and before any training starts.
pub fn run_experiment(
    classifier: &mut dyn Classifier,
    tracker: &mut dyn ExperimentTracker,
    splits: &PreparedSplits,
    cfg: &RunConfig,
) -> Result<Evaluation> {
    let train = splits.require("train")?;
    let test = splits.require("test")?;
    let eval = splits.get("eval");

    let credentials = if tracker.requires_auth() {
        Some(cfg.tracker.credentials()?)
    } else {
        None
    };
    tracker.init(&cfg.tracker_config(), credentials.as_deref())?;
    classifier.train(train, eval, &cfg.training, tracker)?;

    let evaluation = classifier.evaluate(test)?;
    let final_metrics: BTreeMap<String, f64> = evaluation
        .metrics
        .iter()
        .map(|(k, v)| (format!("test_{}", k), *v))
        .collect();
    tracker.log_metrics(u64::from(cfg.training.num_train_epochs) + 1, &final_metrics)?;
    tracker.finish()?;

    info!(
        misclassified = evaluation.misclassified.len(),
        total = test.len(),
        "evaluation finished"
    );
    Ok(evaluation)
}
