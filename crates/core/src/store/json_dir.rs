//! One JSON file per document under a sharded directory tree.
//!
//! A document with id `abcd1234` lives at `<collection dir>/ab/cd/abcd1234.json`. The two
//! shard levels come from the first four characters of the id and keep any single directory
//! small.
//!
//! Writes go to a hidden temporary file in the target directory which is then renamed over the
//! document, so readers see either the old or the new version and never a partial one.

use super::{Document, DocumentCursor, DocumentStore, Query};
use crate::{PatientError, PatientResult};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const EXTENSION: &str = "json";
const MIN_ID_LEN: usize = 4;
const MAX_ID_LEN: usize = 128;

#[derive(Clone, Debug)]
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    /// Opens (and creates if needed) the store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::StoreIo`] if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> PatientResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns `root/<id[0..2]>/<id[2..4]>/<id>.json`.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::InvalidInput`] if `id` is not a valid document id.
    fn document_path(&self, id: &str) -> PatientResult<PathBuf> {
        validate_id(id)?;
        Ok(self
            .root
            .join(&id[0..2])
            .join(&id[2..4])
            .join(format!("{id}.{EXTENSION}")))
    }

    fn read_document(id: &str, path: &Path) -> PatientResult<Document> {
        let contents = fs::read_to_string(path)?;
        match serde_json::from_str::<Value>(&contents).map_err(PatientError::Deserialization)? {
            Value::Object(map) => Ok(map),
            _ => Err(PatientError::MalformedDocument {
                id: id.to_owned(),
                reason: "stored value is not a JSON object".into(),
            }),
        }
    }

    /// Every `(id, path)` under the shard directories, in path order.
    fn document_paths(&self) -> PatientResult<Vec<(String, PathBuf)>> {
        let mut found = Vec::new();

        for s1 in sorted_dirs(&self.root)? {
            for s2 in sorted_dirs(&s1)? {
                let mut files: Vec<PathBuf> = fs::read_dir(&s2)?
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|p| p.is_file())
                    .collect();
                files.sort();

                for path in files {
                    let Some(id) = document_id(&path) else {
                        continue;
                    };
                    found.push((id, path));
                }
            }
        }
        Ok(found)
    }
}

impl DocumentStore for JsonDirStore {
    fn get(&self, id: &str) -> PatientResult<Option<Document>> {
        let path = self.document_path(id)?;
        match Self::read_document(id, &path) {
            Ok(doc) => Ok(Some(doc)),
            Err(PatientError::StoreIo(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn exists(&self, id: &str) -> PatientResult<bool> {
        Ok(self.document_path(id)?.is_file())
    }

    fn upsert(&self, id: &str, document: Document) -> PatientResult<()> {
        let path = self.document_path(id)?;
        let parent = path
            .parent()
            .ok_or_else(|| PatientError::InvalidInput(format!("no parent directory for {id}")))?;
        fs::create_dir_all(parent)?;

        let json = serde_json::to_string_pretty(&Value::Object(document))
            .map_err(PatientError::Serialization)?;

        let temp = parent.join(format!(".{id}.{}.tmp", Uuid::new_v4().simple()));
        if let Err(e) = fs::write(&temp, json).and_then(|()| fs::rename(&temp, &path)) {
            let _ = fs::remove_file(&temp);
            return Err(PatientError::StoreIo(e));
        }

        tracing::debug!("wrote {}", path.display());
        Ok(())
    }

    fn stream(&self, query: &Query) -> PatientResult<DocumentCursor<'_>> {
        let mut documents = Vec::new();
        let mut failures = Vec::new();

        for (id, path) in self.document_paths()? {
            match Self::read_document(&id, &path) {
                Ok(doc) => documents.push((id, doc)),
                Err(e) => {
                    tracing::warn!("failed to read {}: {e}", path.display());
                    failures.push(Err(e));
                }
            }
        }

        let selected = query.evaluate(documents).into_iter().map(Ok);
        Ok(Box::new(failures.into_iter().chain(selected)))
    }

    /// Unreadable documents are skipped with a warning, as in [`JsonDirStore::stream`].
    fn count(&self, query: &Query) -> PatientResult<u64> {
        let mut n = 0u64;
        for (id, path) in self.document_paths()? {
            match Self::read_document(&id, &path) {
                Ok(doc) if query.matches(&doc) => n += 1,
                Ok(_) => {}
                Err(e) => tracing::warn!("not counting {}: {e}", path.display()),
            }
        }
        Ok(n)
    }
}

/// Document ids: 4 to 128 characters of `[A-Za-z0-9._-]`, not starting with a dot.
fn validate_id(id: &str) -> PatientResult<()> {
    let valid = (MIN_ID_LEN..=MAX_ID_LEN).contains(&id.len())
        && !id.starts_with('.')
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
    if valid {
        Ok(())
    } else {
        Err(PatientError::InvalidInput(format!(
            "document id must be {MIN_ID_LEN}-{MAX_ID_LEN} characters of [A-Za-z0-9._-] not starting with '.', got '{id}'"
        )))
    }
}

/// The id of a stored document file; `None` for temporary and foreign files.
fn document_id(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    validate_id(stem).ok()?;
    Some(stem.to_owned())
}

fn sorted_dirs(parent: &Path) -> PatientResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(parent) {
        Ok(it) => it,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(PatientError::StoreIo(e)),
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}
