// src/preprocess/mod.rs
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, Read},
    path::Path,
};
use tracing::{debug, info};

use crate::error::{PreprocessError, Result};

/// One row of a raw AG News split: `label,title,description`, no header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// 1-indexed class label as it appears in the source file.
    pub label: i64,
    pub title: String,
    pub description: String,
}

/// The `(text, labels)` unit the classifier consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub text: String,
    #[serde(rename = "labels")]
    pub label: i64,
}

impl RawRecord {
    /// Pull the first three fields out of a CSV record. Extra fields are ignored.
    pub fn from_csv(record: &StringRecord, line: u64) -> Result<Self> {
        if record.len() < 3 {
            return Err(PreprocessError::MalformedInput {
                line,
                reason: format!("expected at least 3 fields, found {}", record.len()),
            });
        }
        let raw_label = record[0].trim();
        let label = raw_label
            .parse::<i64>()
            .map_err(|_| PreprocessError::MalformedInput {
                line,
                reason: format!("label {:?} is not an integer", raw_label),
            })?;

        Ok(RawRecord {
            label,
            title: record[1].to_string(),
            description: record[2].to_string(),
        })
    }

    /// Shift the label to 0-based and build the joined text.
    ///
    /// `\` is replaced by a space one for one, so `a \ b` becomes `a   b`.
    pub fn into_example(self, line: u64) -> Result<TrainingExample> {
        let label = self
            .label
            .checked_sub(1)
            .ok_or(PreprocessError::LabelRange {
                line,
                label: self.label,
            })?;
        if label < 0 {
            return Err(PreprocessError::LabelRange { line, label });
        }

        let mut text = String::with_capacity(self.title.len() + self.description.len() + 1);
        text.push_str(&self.title);
        text.push(' ');
        text.push_str(&self.description);

        Ok(TrainingExample {
            text: text.replace('\\', " "),
            label,
        })
    }
}

/// Ordered, immutable collection of [`TrainingExample`]s, one per input row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    examples: Vec<TrainingExample>,
}

impl Dataset {
    pub fn new(examples: Vec<TrainingExample>) -> Self {
        Self { examples }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TrainingExample> {
        self.examples.get(index)
    }

    pub fn examples(&self) -> &[TrainingExample] {
        &self.examples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrainingExample> {
        self.examples.iter()
    }

    /// Number of examples per label, ordered by label.
    pub fn label_counts(&self) -> BTreeMap<i64, usize> {
        let mut counts = BTreeMap::new();
        for ex in &self.examples {
            *counts.entry(ex.label).or_insert(0) += 1;
        }
        counts
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a TrainingExample;
    type IntoIter = std::slice::Iter<'a, TrainingExample>;

    fn into_iter(self) -> Self::IntoIter {
        self.examples.iter()
    }
}

/// Configurable preprocessor. The default only enforces `label >= 0`;
/// `with_num_classes` adds the upper bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct Preprocessor {
    num_classes: Option<usize>,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = Some(num_classes);
        self
    }

    /// Read and normalize the headerless CSV at `path`.
    #[tracing::instrument(level = "info", skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn preprocess<P: AsRef<Path>>(&self, path: P) -> Result<Dataset> {
        let file = File::open(path.as_ref())?;
        let dataset = self.preprocess_reader(BufReader::new(file))?;
        info!(rows = dataset.len(), "preprocessed split");
        Ok(dataset)
    }

    /// Same transform over any reader. Stops at the first bad record.
    pub fn preprocess_reader<R: Read>(&self, reader: R) -> Result<Dataset> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut examples = Vec::new();
        let mut record = StringRecord::new();
        let mut line: u64 = 0;

        loop {
            line += 1;
            match rdr.read_record(&mut record) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => return Err(PreprocessError::from_csv(e, line)),
            }

            let example = RawRecord::from_csv(&record, line)?.into_example(line)?;
            if let Some(limit) = self.num_classes.and_then(|n| i64::try_from(n).ok()) {
                if example.label >= limit {
                    return Err(PreprocessError::LabelRange {
                        line,
                        label: example.label,
                    });
                }
            }
            examples.push(example);
        }

        debug!(rows = examples.len(), "parsed records");
        Ok(Dataset::new(examples))
    }
}

/// Preprocess the file at `path` with default settings.
pub fn preprocess<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    Preprocessor::default().preprocess(path)
}

/// Preprocess from an in-memory or streaming source with default settings.
pub fn preprocess_reader<R: Read>(reader: R) -> Result<Dataset> {
    Preprocessor::default().preprocess_reader(reader)
}
