// src/pipeline.rs
use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::config::RunConfig;
use crate::export::write_parquet;
use crate::history::{History, PREPARED};
use crate::preprocess::{Dataset, Preprocessor};
use crate::subsample::take_rows;

/// Preprocessed datasets keyed by split name (`train`, `eval`, `test`, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedSplits {
    splits: BTreeMap<String, Dataset>,
}

impl PreparedSplits {
    pub fn insert(&mut self, name: impl Into<String>, dataset: Dataset) {
        self.splits.insert(name.into(), dataset);
    }

    pub fn get(&self, name: &str) -> Option<&Dataset> {
        self.splits.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&Dataset> {
        self.get(name)
            .ok_or_else(|| anyhow!("split {:?} was not prepared", name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.splits.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.splits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }
}

/// Subsample, preprocess and export every configured split.
///
/// Splits run in parallel; each file is read start to finish by one thread.
/// The source CSVs must already be in `cfg.dataset.data_dir`.
#[instrument(level = "info", skip(cfg, history), fields(splits = cfg.splits.len()))]
pub fn prepare(cfg: &RunConfig, history: &History) -> Result<PreparedSplits> {
    cfg.validate()?;
    let start = Instant::now();
    let preprocessor = Preprocessor::new().with_num_classes(cfg.model.num_labels);

    let prepared = cfg
        .splits
        .par_iter()
        .map(|(name, spec)| -> Result<(String, Dataset)> {
            let source = cfg.dataset.data_dir.join(&spec.source);
            let small = cfg.split_csv_path(name);
            let rows = take_rows(&source, &small, spec.take, spec.rows)
                .with_context(|| format!("subsampling split {}", name))?;
            if rows < spec.rows {
                warn!(split = %name, rows, wanted = spec.rows, "source has fewer rows than requested");
            }

            let dataset = preprocessor
                .preprocess(&small)
                .with_context(|| format!("preprocessing {}", small.display()))?;
            write_parquet(&dataset, cfg.split_parquet_path(name))?;
            history.record_event(name, PREPARED)?;

            info!(split = %name, rows = dataset.len(), "split ready");
            Ok((name.clone(), dataset))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut splits = PreparedSplits::default();
    for (name, dataset) in prepared {
        splits.insert(name, dataset);
    }
    info!("prepared {} splits in {:?}", splits.len(), start.elapsed());
    Ok(splits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::read_parquet;
    use crate::subsample::SplitSpec;
    use crate::PreprocessError;
    use std::fs;
    use tempfile::tempdir;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,newsprep=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    fn config_in(dir: &std::path::Path) -> RunConfig {
        let mut cfg = RunConfig::default();
        cfg.dataset.data_dir = dir.join("data");
        cfg.output_dir = dir.join("prepared");
        cfg.splits.clear();
        cfg.splits.insert("train".into(), SplitSpec::head("train.csv", 3));
        cfg.splits.insert("test".into(), SplitSpec::tail("train.csv", 2));
        cfg.splits.insert("eval".into(), SplitSpec::head("test.csv", 1));
        cfg
    }

    #[test]
    fn test_prepare_all_splits() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let cfg = config_in(dir.path());
        fs::create_dir_all(&cfg.dataset.data_dir)?;
        fs::write(
            cfg.dataset.data_dir.join("train.csv"),
            "\"3\",\"Oil prices\",\"Crude \\ up\"\n\"2\",\"Cup final\",\"Win\"\n\"1\",\"Summit\",\"Talks\"\n\"4\",\"Chips\",\"Faster\"\n",
        )?;
        fs::write(
            cfg.dataset.data_dir.join("test.csv"),
            "\"1\",\"Election\",\"Results\"\n\"2\",\"Match\",\"Draw\"\n",
        )?;
        let history = History::new(dir.path().join("history"))?;

        let splits = prepare(&cfg, &history)?;
        assert_eq!(splits.names().collect::<Vec<_>>(), vec!["eval", "test", "train"]);

        let train = splits.require("train")?;
        assert_eq!(train.len(), 3);
        assert_eq!(train.examples()[0].text, "Oil prices Crude   up");
        assert_eq!(train.examples()[0].label, 2);

        let test = splits.require("test")?;
        assert_eq!(test.iter().map(|e| e.label).collect::<Vec<_>>(), vec![0, 3]);
        assert_eq!(splits.require("eval")?.len(), 1);

        assert!(cfg.split_csv_path("train").exists());
        assert_eq!(&read_parquet(cfg.split_parquet_path("test"))?, test);
        assert_eq!(history.load_event_names(PREPARED)?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_prepare_surfaces_label_errors() -> Result<()> {
        let dir = tempdir()?;
        let mut cfg = config_in(dir.path());
        cfg.splits.retain(|name, _| name == "eval");
        fs::create_dir_all(&cfg.dataset.data_dir)?;
        fs::write(cfg.dataset.data_dir.join("test.csv"), "0,bad,label\n")?;
        let history = History::new(dir.path().join("history"))?;

        let err = prepare(&cfg, &history).unwrap_err();
        let typed = err
            .downcast_ref::<PreprocessError>()
            .expect("typed preprocessing error");
        assert!(matches!(typed, PreprocessError::LabelRange { line: 1, label: -1 }));
        Ok(())
    }

    #[test]
    fn test_prepare_rejects_escaping_split_name() -> Result<()> {
        let dir = tempdir()?;
        let mut cfg = config_in(dir.path());
        cfg.splits.clear();
        cfg.splits.insert("../evil".into(), SplitSpec::head("train.csv", 1));
        fs::create_dir_all(&cfg.dataset.data_dir)?;
        fs::write(cfg.dataset.data_dir.join("train.csv"), "1,a,b\n")?;
        let history = History::new(dir.path().join("history"))?;

        assert!(prepare(&cfg, &history).is_err());
        assert!(!dir.path().join("evil.parquet").exists());
        assert!(!dir.path().join("small_../evil.csv").exists());
        Ok(())
    }
}
