//! Reading and writing pact files.

pub mod upgrade;

use crate::{
    error::{Error, Result},
    model::Pact,
};
use lazy_static::lazy_static;
use serde_json::Value;
use std::{
    collections::HashMap,
    fmt::{self, Debug, Display},
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, Mutex},
};
use tracing::{debug, info, warn};

lazy_static! {
    static ref FILE_LOCKS: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>> = Mutex::new(HashMap::new());
}

/// How a pact is written when a file for it already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Replace the file.
    Overwrite,
    /// Add to the interactions in the file, replacing those with the same
    /// description and provider states.
    #[default]
    Merge,
    /// Refuse to write a pact that differs from the file.
    FailIfChanged,
}

impl Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriteMode::Overwrite => "overwrite",
            WriteMode::Merge => "merge",
            WriteMode::FailIfChanged => "fail-if-changed",
        })
    }
}

impl FromStr for WriteMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "overwrite" => Ok(WriteMode::Overwrite),
            "merge" => Ok(WriteMode::Merge),
            "fail-if-changed" => Ok(WriteMode::FailIfChanged),
            other => Err(Error::InvalidConfig(format!("unknown write mode '{}'", other))),
        }
    }
}

/// Where pacts are kept.
pub trait PactStore: Debug + Send + Sync {
    fn load_pact(&self) -> Result<Pact>;

    fn save_pact(&self, pact: &Pact) -> Result<()>;

    /// Fail with [`Error::PactChanged`] if the stored pact differs.
    fn check_pact_unchanged(&self, pact: &Pact) -> Result<()>;
}

/// A pact file on disk.
#[derive(Debug, Clone)]
pub struct FilePactStore {
    path: PathBuf,
    mode: WriteMode,
}

impl FilePactStore {
    pub fn new<P: Into<PathBuf>>(path: P, mode: WriteMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }

    /// The conventional `<consumer>-<provider>.json` file in `dir`.
    pub fn for_pact<P: AsRef<Path>>(dir: P, pact: &Pact, mode: WriteMode) -> Self {
        Self::new(dir.as_ref().join(pact.file_name()), mode)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PactStore for FilePactStore {
    fn load_pact(&self) -> Result<Pact> {
        load(&self.path)
    }

    fn save_pact(&self, pact: &Pact) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let lock = file_lock(&self.path)?;
        let _guard = lock.lock()?;

        let exists = self.path.is_file();
        match self.mode {
            WriteMode::FailIfChanged if exists => {
                self.check_pact_unchanged(pact)?;
                debug!(path = %self.path.display(), "Pact file is unchanged");
                Ok(())
            }
            WriteMode::Merge if exists => {
                let mut merged = load(&self.path)?;
                if merged.spec_version != pact.spec_version {
                    warn!(
                        path = %self.path.display(),
                        existing = %merged.spec_version,
                        "Overwriting a pact file of another specification version"
                    );
                    return write_atomically(&self.path, pact);
                }
                merged.merge(pact)?;
                write_atomically(&self.path, &merged)
            }
            _ => write_atomically(&self.path, pact),
        }
    }

    fn check_pact_unchanged(&self, pact: &Pact) -> Result<()> {
        let existing: Value = serde_json::from_slice(&fs::read(&self.path)?)?;
        if without_metadata(existing) == without_metadata(pact.to_json()) {
            Ok(())
        } else {
            Err(Error::PactChanged(self.path.clone()))
        }
    }
}

fn without_metadata(mut document: Value) -> Value {
    if let Value::Object(map) = &mut document {
        map.remove("metadata");
    }
    document
}

fn file_lock(path: &Path) -> Result<Arc<Mutex<()>>> {
    let key = path
        .parent()
        .and_then(|dir| fs::canonicalize(dir).ok())
        .and_then(|dir| path.file_name().map(|name| dir.join(name)))
        .unwrap_or_else(|| path.to_path_buf());
    let mut locks = FILE_LOCKS.lock()?;
    Ok(locks.entry(key).or_default().clone())
}

fn write_atomically(path: &Path, pact: &Pact) -> Result<()> {
    let contents = serde_json::to_string_pretty(&pact.to_json())?;
    let temporary = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4()));
    fs::write(&temporary, contents)?;
    if let Err(error) = fs::rename(&temporary, path) {
        let _ = fs::remove_file(&temporary);
        return Err(error.into());
    }
    info!(path = %path.display(), interactions = pact.interactions.len(), "Wrote pact file");
    Ok(())
}

/// Parse a pact document of any specification version.
pub fn from_json(document: &Value) -> Result<Pact> {
    if upgrade::is_v4(document) {
        Pact::from_v4_json(document)
    } else {
        let version = upgrade::declared_version(document);
        debug!(?version, "Upgrading a legacy pact document");
        Pact::from_v4_json(&upgrade::upgrade(document)?)
    }
}

pub fn load<P: AsRef<Path>>(path: P) -> Result<Pact> {
    let path = path.as_ref();
    let contents = fs::read(path)?;
    let document: Value = serde_json::from_slice(&contents)
        .map_err(|e| Error::persistence(None, format!("{}: {}", path.display(), e)))?;
    from_json(&document)
}

/// Replace the file at `path` with `pact`.
pub fn save<P: AsRef<Path>>(pact: &Pact, path: P) -> Result<()> {
    FilePactStore::new(path.as_ref(), WriteMode::Overwrite).save_pact(pact)
}

/// Write `pact` to its conventional file in `dir`, returning the path.
pub fn write_pact<P: AsRef<Path>>(pact: &Pact, dir: P, mode: WriteMode) -> Result<PathBuf> {
    let store = FilePactStore::for_pact(dir, pact, mode);
    store.save_pact(pact)?;
    Ok(store.path().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HttpRequest, HttpResponse, Interaction};

    fn pact_with(descriptions: &[&str]) -> Pact {
        let mut pact = Pact::new("ShapeClient", "ShapeService");
        for description in descriptions {
            pact.add_interaction(Interaction::http(
                *description,
                HttpRequest::default(),
                HttpResponse::default(),
            ));
        }
        pact
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let pact = pact_with(&["a", "b"]);
        let path = dir.path().join("nested").join("pact.json");
        save(&pact, &path).unwrap();
        assert_eq!(load(&path).unwrap(), pact);
    }

    #[test]
    fn merge_keeps_existing_interactions() {
        let dir = tempfile::tempdir().unwrap();
        write_pact(&pact_with(&["a"]), dir.path(), WriteMode::Merge).unwrap();
        let path = write_pact(&pact_with(&["b"]), dir.path(), WriteMode::Merge).unwrap();

        let written = load(&path).unwrap();
        let descriptions: Vec<&str> = written.interactions.iter().map(|i| i.description.as_str()).collect();
        assert_eq!(descriptions, vec!["a", "b"]);
    }

    #[test]
    fn overwrite_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pact = pact_with(&["a"]);
        let path = write_pact(&pact, dir.path(), WriteMode::Overwrite).unwrap();
        let first = fs::read_to_string(&path).unwrap();
        write_pact(&pact, dir.path(), WriteMode::Overwrite).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn fail_if_changed_refuses_new_interactions() {
        let dir = tempfile::tempdir().unwrap();
        write_pact(&pact_with(&["a"]), dir.path(), WriteMode::Overwrite).unwrap();
        assert!(write_pact(&pact_with(&["a"]), dir.path(), WriteMode::FailIfChanged).is_ok());

        let error = write_pact(&pact_with(&["a", "b"]), dir.path(), WriteMode::FailIfChanged).unwrap_err();
        assert!(matches!(error, Error::PactChanged(_)));
    }

    #[test]
    fn parallel_merges_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let dir = dir.path().to_path_buf();
                std::thread::spawn(move || {
                    let description = format!("interaction {}", n);
                    write_pact(&pact_with(&[description.as_str()]), dir, WriteMode::Merge).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let pact = load(dir.path().join("ShapeClient-ShapeService.json")).unwrap();
        assert_eq!(pact.interactions.len(), 8);
    }

    #[test]
    fn write_modes_parse() {
        assert_eq!("fail_if_changed".parse::<WriteMode>().unwrap(), WriteMode::FailIfChanged);
        assert_eq!("Overwrite".parse::<WriteMode>().unwrap(), WriteMode::Overwrite);
        assert!("append".parse::<WriteMode>().is_err());
    }
}
