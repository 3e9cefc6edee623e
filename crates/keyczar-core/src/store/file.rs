//! Directory-backed key sets.
//!
//! ```text
//! <dir>/meta    metadata JSON
//! <dir>/1       key data for version 1
//! <dir>/2       ...
//! ```
//!
//! Saves stage every file as a temporary in the target directory and rename
//! them into place in `finish()`. Version files go first and `meta` last, so
//! a concurrent reader sees either the old metadata or the new metadata with
//! all of its versions present. Temporaries are deleted on drop if the save
//! never finishes.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

use super::{KeySetReader, KeySetWriter, StoreError};
use crate::metadata::KeyMetadata;

const METADATA_FILE: &str = "meta";

/// Reads a key set from a directory.
#[derive(Debug, Clone)]
pub struct FileKeySet {
    dir: PathBuf,
}

impl FileKeySet {
    /// Key set stored under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory this reader loads from.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn read(&self, name: &str) -> Result<String, StoreError> {
        let path = self.dir.join(name);
        fs::read_to_string(&path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(path.display().to_string()),
            _ => StoreError::from(err),
        })
    }
}

impl KeySetReader for FileKeySet {
    fn metadata(&self) -> Result<KeyMetadata, StoreError> {
        KeyMetadata::from_json(&self.read(METADATA_FILE)?)
    }

    fn key_data(&self, version: u32) -> Result<String, StoreError> {
        self.read(&version.to_string())
    }
}

/// Writes a key set into a directory, atomically on `finish()`.
#[derive(Debug)]
pub struct FileKeySetWriter {
    dir: PathBuf,
    overwrite: bool,
    metadata: Option<NamedTempFile>,
    versions: Vec<(u32, NamedTempFile)>,
    finished: bool,
}

impl FileKeySetWriter {
    /// Writer targeting `dir`, which is created if missing.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            overwrite: false,
            metadata: None,
            versions: Vec::new(),
            finished: false,
        }
    }

    /// Allow replacing a key set already present in the directory.
    #[must_use]
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::Finished);
        }
        Ok(())
    }

    fn stage(&self, contents: &str) -> Result<NamedTempFile, StoreError> {
        fs::create_dir_all(&self.dir)?;
        let mut file = NamedTempFile::new_in(&self.dir)?;
        file.write_all(contents.as_bytes())?;
        file.as_file().sync_all()?;
        Ok(file)
    }

    /// Version files present in the directory that this save does not carry.
    fn stale_versions(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut stale = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(version) = name.to_str().and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            if !self.versions.iter().any(|(v, _)| *v == version) {
                stale.push(entry.path());
            }
        }
        Ok(stale)
    }
}

impl KeySetWriter for FileKeySetWriter {
    fn write_metadata(&mut self, metadata: &KeyMetadata) -> Result<(), StoreError> {
        self.check_open()?;
        self.metadata = Some(self.stage(&metadata.to_json()?)?);
        Ok(())
    }

    fn write_key_data(&mut self, version: u32, data: &str) -> Result<(), StoreError> {
        self.check_open()?;
        let staged = self.stage(data)?;
        self.versions.retain(|(v, _)| *v != version);
        self.versions.push((version, staged));
        Ok(())
    }

    fn finish(&mut self) -> Result<(), StoreError> {
        self.check_open()?;
        let metadata_path = self.dir.join(METADATA_FILE);
        if !self.overwrite && metadata_path.exists() {
            return Err(StoreError::AlreadyExists(self.dir.display().to_string()));
        }
        let Some(metadata) = self.metadata.take() else {
            return Err(StoreError::NotFound("metadata was never written".into()));
        };

        let stale = self.stale_versions()?;
        self.finished = true;

        for (version, staged) in self.versions.drain(..) {
            staged.persist(self.dir.join(version.to_string())).map_err(|err| {
                tracing::warn!(version, error = %err.error, "key set commit failed");
                StoreError::from(err.error)
            })?;
        }
        metadata.persist(&metadata_path).map_err(|err| StoreError::from(err.error))?;

        for path in stale {
            if let Err(err) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %err, "stale version not removed");
            }
        }

        tracing::debug!(dir = %self.dir.display(), "key set committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use keyczar_crypto::{KeyPurpose, KeyType};

    use super::*;
    use crate::metadata::{KeyStatus, KeyVersion};

    fn metadata(versions: &[u32]) -> KeyMetadata {
        let mut metadata =
            KeyMetadata::new("file", KeyPurpose::SignAndVerify, KeyType::HmacSha1).unwrap();
        for v in versions {
            metadata.push_version(KeyVersion::new(*v, KeyStatus::Active));
        }
        metadata
    }

    #[test]
    fn nothing_visible_before_finish() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FileKeySetWriter::new(dir.path());
        writer.write_metadata(&metadata(&[1])).unwrap();
        writer.write_key_data(1, "{}").unwrap();

        let reader = FileKeySet::new(dir.path());
        assert!(matches!(reader.metadata(), Err(StoreError::NotFound(_))));

        writer.finish().unwrap();
        assert_eq!(reader.metadata().unwrap(), metadata(&[1]));
        assert_eq!(reader.key_data(1).unwrap(), "{}");
    }

    #[test]
    fn dropped_writer_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut writer = FileKeySetWriter::new(dir.path());
            writer.write_metadata(&metadata(&[1])).unwrap();
            writer.write_key_data(1, "{}").unwrap();
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn refuses_overwrite_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FileKeySetWriter::new(dir.path());
        writer.write_metadata(&metadata(&[1])).unwrap();
        writer.write_key_data(1, "first").unwrap();
        writer.finish().unwrap();

        let mut writer = FileKeySetWriter::new(dir.path());
        writer.write_metadata(&metadata(&[1])).unwrap();
        writer.write_key_data(1, "second").unwrap();
        assert!(matches!(writer.finish(), Err(StoreError::AlreadyExists(_))));
        assert_eq!(FileKeySet::new(dir.path()).key_data(1).unwrap(), "first");
    }

    #[test]
    fn overwrite_removes_stale_versions() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FileKeySetWriter::new(dir.path());
        writer.write_metadata(&metadata(&[1, 2])).unwrap();
        writer.write_key_data(1, "one").unwrap();
        writer.write_key_data(2, "two").unwrap();
        writer.finish().unwrap();

        let mut writer = FileKeySetWriter::new(dir.path()).overwrite(true);
        writer.write_metadata(&metadata(&[2])).unwrap();
        writer.write_key_data(2, "two").unwrap();
        writer.finish().unwrap();

        let reader = FileKeySet::new(dir.path());
        assert!(matches!(reader.key_data(1), Err(StoreError::NotFound(_))));
        assert_eq!(reader.key_data(2).unwrap(), "two");
    }

    #[test]
    fn finished_writer_rejects_further_use() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FileKeySetWriter::new(dir.path());
        writer.write_metadata(&metadata(&[])).unwrap();
        writer.finish().unwrap();

        assert_eq!(writer.write_key_data(1, "x"), Err(StoreError::Finished));
        assert_eq!(writer.finish(), Err(StoreError::Finished));
    }

    #[test]
    fn finish_requires_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FileKeySetWriter::new(dir.path());
        writer.write_key_data(1, "x").unwrap();
        assert!(matches!(writer.finish(), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("keys");
        let mut writer = FileKeySetWriter::new(&target);
        writer.write_metadata(&metadata(&[])).unwrap();
        writer.finish().unwrap();
        assert!(target.join(METADATA_FILE).exists());
    }
}
