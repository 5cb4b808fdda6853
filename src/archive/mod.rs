// src/archive/mod.rs

pub mod naming;

use chrono::NaiveDate;
use glob::{glob, Pattern};
use std::{
    collections::HashSet,
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::ArchiveError;
use crate::record::{validate_batch, Record};

pub use naming::{date_from_file_name, dated_file_name};

/// Result of writing one file into the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(PathBuf),
    /// The file already held exactly these bytes.
    Unchanged(PathBuf),
}

impl WriteOutcome {
    pub fn path(&self) -> &Path {
        match self {
            WriteOutcome::Written(p) | WriteOutcome::Unchanged(p) => p,
        }
    }

    pub fn changed(&self) -> bool {
        matches!(self, WriteOutcome::Written(_))
    }
}

/// Append-only store of per-bulletin CSV files plus the aggregate dataset.
///
/// Layout under `data_dir`:
/// - `by-date/iccas_<yyyy-mm-dd>.csv`, one per bulletin, never rewritten
/// - `iccas_full.csv`, all of the above concatenated in date order
pub struct Archive {
    data_dir: PathBuf,
    by_date_dir: PathBuf,
}

impl Archive {
    /// Opens the archive at `data_dir`, creating the directories if needed.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, ArchiveError> {
        let data_dir = data_dir.into();
        let by_date_dir = data_dir.join(naming::BY_DATE_DIR);
        fs::create_dir_all(&by_date_dir).map_err(|e| ArchiveError::io(&by_date_dir, e))?;
        Ok(Self {
            data_dir,
            by_date_dir,
        })
    }

    pub fn by_date_dir(&self) -> &Path {
        &self.by_date_dir
    }

    pub fn full_path(&self) -> PathBuf {
        self.data_dir.join(naming::FULL_FILE_NAME)
    }

    pub fn dated_path(&self, date: NaiveDate) -> PathBuf {
        self.by_date_dir.join(dated_file_name(date))
    }

    /// DatedFile paths in lexicographic (and therefore chronological) order.
    pub fn dated_files(&self) -> Result<Vec<PathBuf>, ArchiveError> {
        list_dated_files(&self.by_date_dir)
    }

    pub fn dates(&self) -> Result<Vec<NaiveDate>, ArchiveError> {
        Ok(self
            .dated_files()?
            .iter()
            .filter_map(|p| naming::date_from_path(p))
            .collect())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.dated_path(date).is_file()
    }

    pub fn latest_date(&self) -> Result<Option<NaiveDate>, ArchiveError> {
        Ok(self.dates()?.pop())
    }

    /// Writes the DatedFile for `date`. The file appears atomically or not at
    /// all. Writing the same content again is a no-op; different content for
    /// an existing date is refused.
    pub fn write_dated(
        &self,
        date: NaiveDate,
        records: &[Record],
    ) -> Result<WriteOutcome, ArchiveError> {
        validate_batch(date, records).map_err(|source| ArchiveError::Invalid { date, source })?;
        let path = self.dated_path(date);
        let bytes = to_csv_bytes(&path, records)?;

        if path.exists() {
            let existing = fs::read(&path).map_err(|e| ArchiveError::io(&path, e))?;
            if existing == bytes {
                debug!(path = %path.display(), "dated file already up to date");
                return Ok(WriteOutcome::Unchanged(path));
            }
            return Err(ArchiveError::Immutable(path));
        }

        persist_atomically(&path, &bytes)?;
        info!(path = %path.display(), rows = records.len(), "wrote dated file");
        Ok(WriteOutcome::Written(path))
    }

    pub fn read_dated(&self, date: NaiveDate) -> Result<Vec<Record>, ArchiveError> {
        read_records(&self.dated_path(date))
    }

    /// Rewrites the aggregate dataset from every DatedFile. Returns the outcome
    /// and the number of rows written.
    pub fn rebuild_full(&self) -> Result<(WriteOutcome, usize), ArchiveError> {
        let mut all = Vec::new();
        let mut keys = HashSet::new();
        for path in self.dated_files()? {
            for rec in read_records(&path)? {
                if !keys.insert((rec.date, rec.age_group)) {
                    return Err(ArchiveError::DuplicateKey {
                        date: rec.date.format("%Y-%m-%dT%H:%M").to_string(),
                        age_group: rec.age_group,
                    });
                }
                all.push(rec);
            }
        }

        let path = self.full_path();
        let bytes = to_csv_bytes(&path, &all)?;
        if fs::read(&path).ok().as_deref() == Some(bytes.as_slice()) {
            return Ok((WriteOutcome::Unchanged(path), all.len()));
        }
        persist_atomically(&path, &bytes)?;
        info!(path = %path.display(), rows = all.len(), "rebuilt full dataset");
        Ok((WriteOutcome::Written(path), all.len()))
    }
}

/// Lists `iccas_<yyyy-mm-dd>.csv` files in `dir`, sorted by name.
pub fn list_dated_files(dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let pattern = format!(
        "{}/{}*{}",
        Pattern::escape(&dir.display().to_string()),
        naming::DATED_PREFIX,
        naming::DATED_EXT
    );
    let entries = glob(&pattern).map_err(|e| {
        ArchiveError::io(
            dir,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
        )
    })?;

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if naming::date_from_path(&path).is_some() => files.push(path),
            Ok(path) => debug!(path = %path.display(), "skipping non-dated file"),
            Err(e) => warn!(error = %e, "cannot read archive entry"),
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

pub fn read_records(path: &Path) -> Result<Vec<Record>, ArchiveError> {
    let mut rdr = csv::Reader::from_path(path).map_err(|e| ArchiveError::csv(path, e))?;
    rdr.deserialize()
        .collect::<Result<Vec<Record>, _>>()
        .map_err(|e| ArchiveError::csv(path, e))
}

fn to_csv_bytes(path: &Path, records: &[Record]) -> Result<Vec<u8>, ArchiveError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for rec in records {
        wtr.serialize(rec).map_err(|e| ArchiveError::csv(path, e))?;
    }
    wtr.into_inner()
        .map_err(|e| ArchiveError::io(path, e.into_error()))
}

// Temp file lives next to the target so the final rename stays on one
// filesystem.
fn persist_atomically(path: &Path, bytes: &[u8]) -> Result<(), ArchiveError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ArchiveError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| ArchiveError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| ArchiveError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| ArchiveError::io(path, e.error))?;
    Ok(())
}
