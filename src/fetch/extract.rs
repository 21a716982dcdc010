use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use std::{
    fs::{self, File},
    io::{self, Read},
    path::{Component, Path, PathBuf},
};
use tracing::{debug, info};
use zip::ZipArchive;

/// Unpack a `.tgz`/`.tar.gz` or `.zip` archive into `dest_dir`.
///
/// Entries nested under a top-level directory are written with that first
/// component stripped (`ag_news_csv/train.csv` lands at `dest_dir/train.csv`).
/// Returns the extracted `.csv` paths in archive order.
#[tracing::instrument(level = "info", skip(archive, dest_dir), fields(archive = %archive.as_ref().display()))]
pub fn extract_archive<P: AsRef<Path>, Q: AsRef<Path>>(
    archive: P,
    dest_dir: Q,
) -> Result<Vec<PathBuf>> {
    let archive = archive.as_ref();
    let dest_dir = dest_dir.as_ref();
    fs::create_dir_all(dest_dir)
        .with_context(|| format!("creating {}", dest_dir.display()))?;

    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let file =
        File::open(archive).with_context(|| format!("opening archive {}", archive.display()))?;

    let extracted = if name.ends_with(".tgz") || name.ends_with(".tar.gz") {
        extract_tar_gz(file, dest_dir)?
    } else if name.ends_with(".zip") {
        extract_zip(file, dest_dir)?
    } else {
        bail!("unsupported archive format: {}", archive.display());
    };

    let csvs: Vec<PathBuf> = extracted
        .into_iter()
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("csv"))
                .unwrap_or(false)
        })
        .collect();
    info!(csv_files = csvs.len(), "extracted archive");
    Ok(csvs)
}

fn extract_tar_gz(file: File, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    let mut out = Vec::new();
    for entry in tar.entries().context("reading tar entries")? {
        let mut entry = entry.context("reading tar entry")?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let entry_path = entry.path()?.into_owned();
        let target = dest_dir.join(flatten_entry_path(&entry_path)?);
        write_entry(&mut entry, &target)?;
        out.push(target);
    }
    Ok(out)
}

fn extract_zip(file: File, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut archive = ZipArchive::new(file).context("reading ZIP archive")?;
    let mut out = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("accessing ZIP entry #{}", i))?;
        if !entry.is_file() {
            continue;
        }
        let entry_path = PathBuf::from(entry.name());
        let target = dest_dir.join(flatten_entry_path(&entry_path)?);
        write_entry(&mut entry, &target)?;
        out.push(target);
    }
    Ok(out)
}

fn write_entry<R: Read>(reader: &mut R, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file =
        File::create(target).with_context(|| format!("creating {}", target.display()))?;
    let bytes = io::copy(reader, &mut file)
        .with_context(|| format!("writing {}", target.display()))?;
    debug!(path = %target.display(), bytes, "extracted entry");
    Ok(())
}

/// Reject paths escaping the destination and drop the top-level directory.
fn flatten_entry_path(path: &Path) -> Result<PathBuf> {
    let mut parts = Vec::new();
    for comp in path.components() {
        match comp {
            Component::Normal(p) => parts.push(p),
            Component::CurDir => {}
            _ => bail!("refusing unsafe archive entry {}", path.display()),
        }
    }
    let parts = if parts.len() > 1 { &parts[1..] } else { &parts[..] };
    if parts.is_empty() {
        bail!("empty archive entry path");
    }
    Ok(parts.iter().collect())
}
