// src/subsample.rs
use anyhow::{Context, Result};
use csv::{ByteRecord, ReaderBuilder};
use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    fs::{self, File},
    io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// Which end of the source file a split is cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Take {
    Head,
    Tail,
}

/// `rows` records from the head or tail of `source` (relative to the data dir).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSpec {
    pub source: PathBuf,
    pub take: Take,
    pub rows: usize,
}

impl SplitSpec {
    pub fn head(source: impl Into<PathBuf>, rows: usize) -> Self {
        Self {
            source: source.into(),
            take: Take::Head,
            rows,
        }
    }

    pub fn tail(source: impl Into<PathBuf>, rows: usize) -> Self {
        Self {
            source: source.into(),
            take: Take::Tail,
            rows,
        }
    }
}

/// Copy the first or last `n` CSV records of `src` into `dst`, byte for byte.
///
/// Record boundaries come from the CSV reader, so a quoted field spanning
/// several lines counts as one record. Returns the number of records written.
#[tracing::instrument(level = "info", skip(src, dst), fields(src = %src.as_ref().display()))]
pub fn take_rows<P: AsRef<Path>, Q: AsRef<Path>>(
    src: P,
    dst: Q,
    take: Take,
    n: usize,
) -> Result<usize> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    let (start, end, count) = match take {
        Take::Head => head_range(src, n)?,
        Take::Tail => tail_range(src, n)?,
    };
    debug!(start, end, count, "record byte range");

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }

    let mut input =
        File::open(src).with_context(|| format!("opening {}", src.display()))?;
    input.seek(SeekFrom::Start(start))?;
    let mut output = BufWriter::new(
        File::create(dst).with_context(|| format!("creating {}", dst.display()))?,
    );
    io::copy(&mut input.take(end - start), &mut output)
        .with_context(|| format!("copying {} -> {}", src.display(), dst.display()))?;
    output.flush()?;

    info!(rows = count, dst = %dst.display(), "wrote subsample");
    Ok(count)
}

fn open_reader(src: &Path) -> Result<csv::Reader<BufReader<File>>> {
    let file = File::open(src).with_context(|| format!("opening {}", src.display()))?;
    Ok(ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(BufReader::new(file)))
}

/// Byte range `[0, end)` covering the first `n` records.
fn head_range(src: &Path, n: usize) -> Result<(u64, u64, usize)> {
    let mut rdr = open_reader(src)?;
    let mut record = ByteRecord::new();
    let mut count = 0;
    while count < n {
        let more = rdr
            .read_byte_record(&mut record)
            .with_context(|| format!("CSV parse error in {} at record {}", src.display(), count))?;
        if !more {
            break;
        }
        count += 1;
    }
    Ok((0, rdr.position().byte(), count))
}

/// Byte range from the start of the n-th last record to end of file.
fn tail_range(src: &Path, n: usize) -> Result<(u64, u64, usize)> {
    let mut rdr = open_reader(src)?;
    let mut record = ByteRecord::new();
    let mut starts: VecDeque<u64> = VecDeque::with_capacity(n + 1);
    let mut idx = 0usize;

    loop {
        let start = rdr.position().byte();
        let more = rdr
            .read_byte_record(&mut record)
            .with_context(|| format!("CSV parse error in {} at record {}", src.display(), idx))?;
        if !more {
            break;
        }
        idx += 1;
        if n == 0 {
            continue;
        }
        starts.push_back(start);
        if starts.len() > n {
            starts.pop_front();
        }
    }

    let end = rdr.position().byte();
    let start = starts.front().copied().unwrap_or(end);
    Ok((start, end, starts.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = "\"3\",\"a\",\"one\"\n\"1\",\"b\",\"two\nlines\"\n\"2\",\"c\",\"three\"\n\"4\",\"d\",\"four\"\n";

    #[test]
    fn test_head_keeps_first_records_verbatim() -> Result<()> {
        let dir = tempdir()?;
        let src = dir.path().join("train.csv");
        fs::write(&src, SAMPLE)?;
        let dst = dir.path().join("out/small_train.csv");

        let n = take_rows(&src, &dst, Take::Head, 2)?;
        assert_eq!(n, 2);
        assert_eq!(
            fs::read_to_string(&dst)?,
            "\"3\",\"a\",\"one\"\n\"1\",\"b\",\"two\nlines\"\n"
        );
        Ok(())
    }

    #[test]
    fn test_tail_keeps_last_records_verbatim() -> Result<()> {
        let dir = tempdir()?;
        let src = dir.path().join("train.csv");
        fs::write(&src, SAMPLE)?;
        let dst = dir.path().join("small_test.csv");

        let n = take_rows(&src, &dst, Take::Tail, 3)?;
        assert_eq!(n, 3);
        assert_eq!(
            fs::read_to_string(&dst)?,
            "\"1\",\"b\",\"two\nlines\"\n\"2\",\"c\",\"three\"\n\"4\",\"d\",\"four\"\n"
        );
        Ok(())
    }

    #[test]
    fn test_more_rows_than_file() -> Result<()> {
        let dir = tempdir()?;
        let src = dir.path().join("train.csv");
        fs::write(&src, SAMPLE)?;

        let head = dir.path().join("head.csv");
        let tail = dir.path().join("tail.csv");
        assert_eq!(take_rows(&src, &head, Take::Head, 100)?, 4);
        assert_eq!(take_rows(&src, &tail, Take::Tail, 100)?, 4);
        assert_eq!(fs::read_to_string(&head)?, SAMPLE);
        assert_eq!(fs::read_to_string(&tail)?, SAMPLE);
        Ok(())
    }

    #[test]
    fn test_subsample_then_preprocess() -> Result<()> {
        let dir = tempdir()?;
        let src = dir.path().join("train.csv");
        fs::write(&src, SAMPLE)?;
        let dst = dir.path().join("small.csv");
        take_rows(&src, &dst, Take::Tail, 2)?;

        let ds = crate::preprocess(&dst)?;
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.examples()[0].label, 1);
        assert_eq!(ds.examples()[1].text, "d four");
        Ok(())
    }

    #[test]
    fn test_missing_source() {
        let dir = tempdir().unwrap();
        let res = take_rows(dir.path().join("nope.csv"), dir.path().join("x.csv"), Take::Head, 1);
        assert!(res.is_err());
    }
}
