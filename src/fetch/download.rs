use anyhow::{Context, Result};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;
use url::Url;

/// Download `url_str` and save it under `dest_dir` using the original filename.
/// Returns the full path of the saved file.
pub async fn download_archive(
    client: &Client,
    url_str: &str,
    dest_dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let dest_dir = dest_dir.as_ref();
    let url = Url::parse(url_str).with_context(|| format!("parsing dataset URL {}", url_str))?;
    let dest_path = dest_dir.join(archive_file_name(&url));

    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let resp = client
        .get(url.as_str())
        .send()
        .await
        .with_context(|| format!("GET {}", url))?
        .error_for_status()?;
    let bytes = resp
        .bytes()
        .await
        .with_context(|| format!("reading body from {}", url))?;
    fs::write(&dest_path, &bytes)
        .await
        .with_context(|| format!("writing {}", dest_path.display()))?;

    info!(bytes = bytes.len(), path = %dest_path.display(), "downloaded archive");
    Ok(dest_path)
}

/// Last non-empty path segment of the URL, or `dataset.tgz`.
pub fn archive_file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.last())
        .filter(|name| !name.is_empty())
        .unwrap_or("dataset.tgz")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_file_name() {
        let url = Url::parse("https://s3.amazonaws.com/fast-ai-nlp/ag_news_csv.tgz").unwrap();
        assert_eq!(archive_file_name(&url), "ag_news_csv.tgz");

        let url = Url::parse("https://example.com/datasets/").unwrap();
        assert_eq!(archive_file_name(&url), "dataset.tgz");
    }
}
