// src/fetch/mod.rs

use anyhow::{bail, Context, Result};
use reqwest::Client;
use std::path::PathBuf;
use tracing::info;
use url::Url;

use crate::config::RunConfig;
use crate::history::{History, DOWNLOADED};

pub mod download;
pub mod extract;

pub use download::{archive_file_name, download_archive};
pub use extract::extract_archive;

/// Make sure every source CSV the configured splits read from is present
/// in the data directory.
///
/// An archive already recorded as downloaded is unpacked again from disk;
/// otherwise it is fetched first. The archive is kept next to the CSVs.
pub async fn ensure_dataset(client: &Client, cfg: &RunConfig, history: &History) -> Result<()> {
    let data_dir = cfg.dataset.data_dir.clone();
    if missing_sources(cfg).is_empty() {
        info!(data_dir = %data_dir.display(), "dataset already present");
        return Ok(());
    }

    let url = Url::parse(&cfg.dataset.url)
        .with_context(|| format!("parsing dataset URL {}", cfg.dataset.url))?;
    let archive_name = archive_file_name(&url);
    let cached = data_dir.join(&archive_name);

    let archive = if cached.is_file() && history.has_event(&archive_name, DOWNLOADED)? {
        info!(archive = %cached.display(), "re-extracting previously downloaded archive");
        cached
    } else {
        info!(url = %cfg.dataset.url, "downloading dataset");
        let path = download_archive(client, &cfg.dataset.url, &data_dir).await?;
        history.record_event(&archive_name, DOWNLOADED)?;
        path
    };

    let extracted = tokio::task::spawn_blocking({
        let archive = archive.clone();
        let data_dir = data_dir.clone();
        move || extract_archive(&archive, &data_dir)
    })
    .await
    .context("extract task panicked")??;
    info!(files = extracted.len(), "unpacked dataset");

    let missing = missing_sources(cfg);
    if !missing.is_empty() {
        bail!(
            "archive {} did not contain {:?}",
            archive_name,
            missing
        );
    }
    Ok(())
}

fn missing_sources(cfg: &RunConfig) -> Vec<PathBuf> {
    let mut missing: Vec<PathBuf> = cfg
        .source_files()
        .into_iter()
        .map(|s| cfg.dataset.data_dir.join(s))
        .filter(|p| !p.exists())
        .collect();
    missing.sort();
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_missing_sources() -> Result<()> {
        let dir = tempdir()?;
        let mut cfg = RunConfig::default();
        cfg.dataset.data_dir = dir.path().to_path_buf();

        assert_eq!(
            missing_sources(&cfg),
            vec![dir.path().join("test.csv"), dir.path().join("train.csv")]
        );

        fs::write(dir.path().join("train.csv"), "1,a,b\n")?;
        fs::write(dir.path().join("test.csv"), "1,a,b\n")?;
        assert!(missing_sources(&cfg).is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_ensure_dataset_skips_when_present() -> Result<()> {
        let dir = tempdir()?;
        let mut cfg = RunConfig::default();
        cfg.dataset.data_dir = dir.path().to_path_buf();
        // unreachable URL: must not be contacted
        cfg.dataset.url = "http://127.0.0.1:9/ag_news_csv.tgz".to_string();
        fs::write(dir.path().join("train.csv"), "1,a,b\n")?;
        fs::write(dir.path().join("test.csv"), "1,a,b\n")?;

        let history = History::new(dir.path().join("history"))?;
        ensure_dataset(&Client::new(), &cfg, &history).await?;
        assert!(history.load_event_names(DOWNLOADED)?.is_empty());
        Ok(())
    }

    fn write_tgz(path: &std::path::Path, files: &[(&str, &str)]) -> Result<()> {
        let gz = GzEncoder::new(fs::File::create(path)?, Compression::default());
        let mut builder = tar::Builder::new(gz);
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, content.as_bytes())?;
        }
        builder.into_inner()?.finish()?;
        Ok(())
    }

    #[tokio::test]
    async fn test_ensure_dataset_reextracts_recorded_archive() -> Result<()> {
        let dir = tempdir()?;
        let mut cfg = RunConfig::default();
        cfg.dataset.data_dir = dir.path().join("data");
        cfg.dataset.url = "http://127.0.0.1:9/ag_news_csv.tgz".to_string();
        fs::create_dir_all(&cfg.dataset.data_dir)?;
        write_tgz(
            &cfg.dataset.data_dir.join("ag_news_csv.tgz"),
            &[
                ("ag_news_csv/train.csv", "\"3\",\"a\",\"b\"\n"),
                ("ag_news_csv/test.csv", "\"1\",\"c\",\"d\"\n"),
            ],
        )?;

        let history = History::new(dir.path().join("history"))?;
        history.record_event("ag_news_csv.tgz", DOWNLOADED)?;

        ensure_dataset(&Client::new(), &cfg, &history).await?;
        assert_eq!(
            fs::read_to_string(cfg.dataset.data_dir.join("train.csv"))?,
            "\"3\",\"a\",\"b\"\n"
        );
        assert!(cfg.dataset.data_dir.join("test.csv").exists());
        // no new download was recorded
        assert_eq!(history.load_event_names(DOWNLOADED)?.len(), 1);
        assert_eq!(fs::read_dir(history.dir())?.count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_ensure_dataset_downloads_without_history() -> Result<()> {
        let dir = tempdir()?;
        let mut cfg = RunConfig::default();
        cfg.dataset.data_dir = dir.path().join("data");
        cfg.dataset.url = "http://127.0.0.1:9/ag_news_csv.tgz".to_string();
        fs::create_dir_all(&cfg.dataset.data_dir)?;
        // archive on disk but never recorded: fetch is attempted and fails
        write_tgz(&cfg.dataset.data_dir.join("ag_news_csv.tgz"), &[("x/train.csv", "1,a,b\n")])?;

        let history = History::new(dir.path().join("history"))?;
        assert!(ensure_dataset(&Client::new(), &cfg, &history).await.is_err());
        assert!(!cfg.dataset.data_dir.join("train.csv").exists());
        assert!(history.load_event_names(DOWNLOADED)?.is_empty());
        Ok(())
    }
}
