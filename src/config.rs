// src/config.rs

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Component, Path, PathBuf},
};

use crate::subsample::SplitSpec;

pub const AG_NEWS_URL: &str = "https://s3.amazonaws.com/fast-ai-nlp/ag_news_csv.tgz";

/// Everything a run needs, loaded from YAML. Missing sections fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub dataset: DatasetSettings,
    pub splits: BTreeMap<String, SplitSpec>,
    pub model: ModelSettings,
    pub training: TrainingArgs,
    pub tracker: TrackerSettings,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSettings {
    pub url: String,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub model_type: String,
    pub model_name: String,
    pub num_labels: usize,
    pub device: Device,
}

/// Hyperparameters handed to the classifier and logged to the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingArgs {
    pub evaluate_during_training: bool,
    pub num_train_epochs: u32,
    pub save_eval_checkpoints: bool,
    pub train_batch_size: u32,
    pub eval_batch_size: u32,
    pub overwrite_output_dir: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    pub project: String,
    /// Name of the environment variable holding the tracker API key.
    pub api_key_env: String,
}

/// Mapping passed to [`ExperimentTracker::init`](crate::experiment::ExperimentTracker::init).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerConfig {
    pub project: String,
    pub model_type: String,
    pub model_name: String,
    pub num_labels: usize,
    pub device: Device,
    pub training: TrainingArgs,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            url: AG_NEWS_URL.to_string(),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_type: "distilbert".to_string(),
            model_name: "distilbert-base-uncased".to_string(),
            num_labels: 4,
            device: Device::Cuda(0),
        }
    }
}

impl Default for TrainingArgs {
    fn default() -> Self {
        Self {
            evaluate_during_training: true,
            num_train_epochs: 5,
            save_eval_checkpoints: false,
            train_batch_size: 32,
            eval_batch_size: 32,
            overwrite_output_dir: true,
        }
    }
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            project: "distilbert_training".to_string(),
            api_key_env: "WANDB_API_KEY".to_string(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        let mut splits = BTreeMap::new();
        splits.insert("train".to_string(), SplitSpec::head("train.csv", 15_000));
        splits.insert("test".to_string(), SplitSpec::tail("train.csv", 1_500));
        splits.insert("eval".to_string(), SplitSpec::head("test.csv", 1_500));
        Self {
            dataset: DatasetSettings::default(),
            splits,
            model: ModelSettings::default(),
            training: TrainingArgs::default(),
            tracker: TrackerSettings::default(),
            output_dir: PathBuf::from("prepared"),
        }
    }
}

impl RunConfig {
    /// Load and validate a YAML config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg: RunConfig = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `path` if given, otherwise use the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.num_labels < 2 {
            bail!("model.num_labels must be at least 2, got {}", self.model.num_labels);
        }
        if self.training.num_train_epochs == 0 {
            bail!("training.num_train_epochs must be at least 1");
        }
        if self.training.train_batch_size == 0 || self.training.eval_batch_size == 0 {
            bail!("batch sizes must be at least 1");
        }
        if self.splits.is_empty() {
            bail!("no splits configured");
        }
        for (name, spec) in &self.splits {
            if !is_plain_name(name) {
                bail!("split name {:?} must be a single file name component", name);
            }
            if spec.rows == 0 {
                bail!("split {:?} must take at least one row", name);
            }
        }
        Ok(())
    }

    /// Distinct source files the configured splits read from.
    pub fn source_files(&self) -> HashSet<PathBuf> {
        self.splits.values().map(|s| s.source.clone()).collect()
    }

    pub fn split_csv_path(&self, split: &str) -> PathBuf {
        self.dataset.data_dir.join(format!("small_{}.csv", split))
    }

    pub fn split_parquet_path(&self, split: &str) -> PathBuf {
        self.output_dir.join(format!("{}.parquet", split))
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            project: self.tracker.project.clone(),
            model_type: self.model.model_type.clone(),
            model_name: self.model.model_name.clone(),
            num_labels: self.model.num_labels,
            device: self.model.device,
            training: self.training.clone(),
        }
    }
}

/// Split names end up in file names, so they must not carry separators or `..`.
fn is_plain_name(name: &str) -> bool {
    let mut comps = Path::new(name).components();
    match (comps.next(), comps.next()) {
        (Some(Component::Normal(c)), None) => c == name && !name.contains(['/', '\\']),
        _ => false,
    }
}

impl TrackerSettings {
    /// Read the API key from the configured environment variable.
    pub fn credentials(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .with_context(|| format!("tracker API key not set in ${}", self.api_key_env))
    }
}
