// src/history.rs

use anyhow::{Context, Result};
use arrow::array::{Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use glob::glob;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::{
    collections::HashSet,
    fs,
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::debug;

pub const DOWNLOADED: &str = "downloaded";
pub const PREPARED: &str = "prepared";

/// Append-only event log backed by single-row Parquet files.
pub struct History {
    history_dir: PathBuf,
}

impl History {
    /// Open the log at `history_dir`, creating the directory if needed.
    pub fn new(history_dir: impl Into<PathBuf>) -> Result<Self> {
        let history_dir = history_dir.into();
        fs::create_dir_all(&history_dir)
            .with_context(|| format!("creating history directory {:?}", &history_dir))?;
        Ok(Self { history_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.history_dir
    }

    /// Record `event` for `name` (an archive or split name).
    /// Writes `<name>_<event>_<ts>.parquet`.
    pub fn record_event(&self, name: &str, event: &str) -> Result<PathBuf> {
        let ts = Utc::now().timestamp_micros();
        let path = self
            .history_dir
            .join(format!("{}_{}_{}.parquet", name, event, ts));

        let schema = Arc::new(Schema::new(vec![
            Field::new("name", DataType::Utf8, false),
            Field::new("event", DataType::Utf8, false),
            Field::new(
                "event_time",
                DataType::Timestamp(TimeUnit::Microsecond, None),
                false,
            ),
        ]));

        let arr_name = Arc::new(StringArray::from(vec![name.to_string()])) as Arc<dyn Array>;
        let arr_event = Arc::new(StringArray::from(vec![event.to_string()])) as Arc<dyn Array>;
        let arr_time =
            Arc::new(TimestampMicrosecondArray::from_iter_values(vec![ts])) as Arc<dyn Array>;

        let batch = RecordBatch::try_new(schema.clone(), vec![arr_name, arr_event, arr_time])
            .context("building history record batch")?;
        let file =
            File::create(&path).with_context(|| format!("creating history file {:?}", &path))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(file, schema, Some(props))
            .context("creating Arrow writer for history")?;
        writer.write(&batch).context("writing history batch")?;
        writer.close().context("closing history writer")?;

        debug!(name, event, "recorded history event");
        Ok(path)
    }

    /// All distinct names recorded for `event`, from the file names alone.
    pub fn load_event_names(&self, event: &str) -> Result<HashSet<String>> {
        let mut set = HashSet::new();
        let pattern = format!("{}/*_{}_*.parquet", self.history_dir.display(), event);
        let marker = format!("_{}_", event);
        for path in glob(&pattern)?.flatten() {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if let Some(idx) = stem.rfind(&marker) {
                    set.insert(stem[..idx].to_string());
                }
            }
        }
        Ok(set)
    }

    pub fn has_event(&self, name: &str, event: &str) -> Result<bool> {
        Ok(self.load_event_names(event)?.contains(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parquet::file::reader::{FileReader, SerializedFileReader};
    use tempfile::tempdir;

    #[test]
    fn test_record_and_load() -> Result<()> {
        let dir = tempdir()?;
        let history = History::new(dir.path().join("history"))?;

        let path = history.record_event("ag_news_csv.tgz", DOWNLOADED)?;
        history.record_event("train", PREPARED)?;
        history.record_event("eval", PREPARED)?;

        let reader = SerializedFileReader::new(File::open(path)?)?;
        assert_eq!(reader.metadata().file_metadata().num_rows(), 1);

        let downloaded = history.load_event_names(DOWNLOADED)?;
        assert_eq!(downloaded.len(), 1);
        assert!(downloaded.contains("ag_news_csv.tgz"));

        let prepared = history.load_event_names(PREPARED)?;
        assert_eq!(prepared.len(), 2);
        assert!(history.has_event("eval", PREPARED)?);
        assert!(!history.has_event("test", PREPARED)?);
        Ok(())
    }
}
