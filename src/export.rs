// src/export.rs

use anyhow::{anyhow, bail, Context, Result};
use arrow::array::{Array, ArrayRef, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::{
    fs::{self, File},
    path::Path,
    sync::Arc,
};
use tracing::info;

use crate::preprocess::{Dataset, TrainingExample};

/// `text: Utf8, labels: Int64`, the two columns the classifier reads.
pub fn dataset_schema() -> Arc<ArrowSchema> {
    Arc::new(ArrowSchema::new(vec![
        Field::new("text", DataType::Utf8, false),
        Field::new("labels", DataType::Int64, false),
    ]))
}

pub fn to_record_batch(dataset: &Dataset) -> Result<RecordBatch> {
    let text: StringArray = dataset.iter().map(|e| Some(e.text.as_str())).collect();
    let labels: Int64Array = dataset.iter().map(|e| Some(e.label)).collect();
    RecordBatch::try_new(
        dataset_schema(),
        vec![Arc::new(text) as ArrayRef, Arc::new(labels) as ArrayRef],
    )
    .context("building dataset record batch")
}

/// Write `dataset` as Snappy Parquet. The file is written to a `.tmp`
/// sibling first and renamed into place.
#[tracing::instrument(level = "info", skip(dataset, path), fields(path = %path.as_ref().display(), rows = dataset.len()))]
pub fn write_parquet<P: AsRef<Path>>(dataset: &Dataset, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    let temp_path = path.with_extension("tmp");

    let batch = to_record_batch(dataset)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_dictionary_enabled(true)
        .build();
    let file = File::create(&temp_path)
        .with_context(|| format!("creating {}", temp_path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .context("creating Parquet writer")?;
    writer.write(&batch).context("writing dataset batch")?;
    writer.close().context("closing Parquet writer")?;

    fs::rename(&temp_path, path).with_context(|| {
        format!("renaming {} -> {}", temp_path.display(), path.display())
    })?;
    info!("wrote parquet");
    Ok(())
}

/// Load a split previously written by [`write_parquet`].
pub fn read_parquet<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("reading Parquet metadata from {}", path.display()))?
        .build()?;

    let mut examples = Vec::new();
    for batch in reader {
        let batch = batch?;
        let text = column::<StringArray>(&batch, "text")?;
        let labels = column::<Int64Array>(&batch, "labels")?;
        if text.null_count() > 0 || labels.null_count() > 0 {
            bail!("{} contains null values", path.display());
        }
        for i in 0..batch.num_rows() {
            examples.push(TrainingExample {
                text: text.value(i).to_string(),
                label: labels.value(i),
            });
        }
    }
    Ok(Dataset::new(examples))
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| anyhow!("missing column {:?}", name))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| anyhow!("column {:?} has unexpected type", name))
}
