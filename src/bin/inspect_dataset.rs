use anyhow::{Context, Result};
use glob::glob;
use newsprep::{analysis::LabelDistribution, export::read_parquet};
use parquet::file::reader::{FileReader, SerializedFileReader};
use std::{env, fs::File, path::Path, process::exit};

fn main() {
    // Expect one argument: a directory of prepared splits.
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <PREPARED_DIR>", args[0]);
        exit(1);
    }
    if let Err(e) = inspect_dir(Path::new(&args[1])) {
        eprintln!("Error: {:#}", e);
        exit(1);
    }
}

fn inspect_dir(dir: &Path) -> Result<()> {
    let pattern = format!("{}/*.parquet", dir.display());
    let mut paths: Vec<_> = glob(&pattern)
        .with_context(|| format!("Failed to read glob pattern '{}'", pattern))?
        .filter_map(|entry| entry.ok())
        .collect();
    paths.sort();
    if paths.is_empty() {
        anyhow::bail!("No Parquet files found under '{}'", pattern);
    }

    let mut total = 0;
    for path in &paths {
        total += inspect_split(path)?;
    }
    println!("{:-<55}", "");
    println!("{} splits, {} rows", paths.len(), total);
    Ok(())
}

/// Print file metadata and the label distribution of one split.
fn inspect_split(path: &Path) -> Result<usize> {
    let reader = SerializedFileReader::new(
        File::open(path).with_context(|| format!("Failed to open '{}'", path.display()))?,
    )
    .with_context(|| format!("Failed to read Parquet '{}'", path.display()))?;
    let meta = reader.metadata();
    let file_meta = meta.file_metadata();

    println!("=== {} ===", path.display());
    println!("Total rows:           {}", file_meta.num_rows());
    println!("Number of row groups: {}", meta.num_row_groups());
    for col in file_meta.schema_descr().columns() {
        println!(
            "- {:<10} | Physical: {:?}",
            col.name(),
            col.physical_type()
        );
    }

    let dataset = read_parquet(path)?;
    println!("{}", LabelDistribution::from_dataset(&dataset));
    println!();
    Ok(dataset.len())
}
