use std::{
    collections::HashMap,
    fmt::Write as _,
    fs,
    io::Write as _,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tempfile::NamedTempFile;

use crate::{
    context::FlowContext,
    error::{FlowError, FlowErrorLocation, Result},
};

pub const DEFAULT_KEY_PREFIX: &str = "flow_context_";

/// Key-value backend the context store writes through on every change.
pub trait ContextPersistence: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<FlowContext>>;
    fn save(&self, key: &str, context: &FlowContext) -> Result<()>;
}

pub fn storage_key(prefix: &str, flow_id: &str) -> String {
    format!("{prefix}{flow_id}")
}

/// Process-local storage. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, FlowContext>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, key: &str) -> Result<Option<FlowContext>> {
        let entries = self.entries.lock().map_err(|_| poisoned(key))?;
        Ok(entries.get(key).cloned())
    }
}

impl ContextPersistence for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<FlowContext>> {
        let entries = self.entries.lock().map_err(|_| poisoned(key))?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, context: &FlowContext) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| poisoned(key))?;
        entries.insert(key.to_string(), context.clone());
        Ok(())
    }
}

fn poisoned(key: &str) -> FlowError {
    FlowError::Persistence {
        message: "memory storage lock poisoned".to_string(),
        location: FlowErrorLocation::at_path(key.to_string()),
    }
}

/// One JSON file per key under a directory.
///
/// Writes go to a temporary file in the same directory that is then renamed over the target.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

impl ContextPersistence for FileStorage {
    fn load(&self, key: &str) -> Result<Option<FlowContext>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|err| FlowError::Persistence {
            message: format!("read context: {err}"),
            location: FlowErrorLocation::at_path(key.to_string()).with_source_path(Some(&path)),
        })?;
        let context = serde_json::from_str(&text).map_err(|err| FlowError::Persistence {
            message: format!("decode context: {err}"),
            location: FlowErrorLocation::at_path(key.to_string()).with_source_path(Some(&path)),
        })?;
        Ok(Some(context))
    }

    fn save(&self, key: &str, context: &FlowContext) -> Result<()> {
        let path = self.path_for(key);
        fs::create_dir_all(&self.dir).map_err(|err| FlowError::Persistence {
            message: format!("create context directory: {err}"),
            location: FlowErrorLocation::at_path(key.to_string())
                .with_source_path(Some(&self.dir)),
        })?;
        let text = serde_json::to_string(context).map_err(|err| FlowError::Persistence {
            message: format!("encode context: {err}"),
            location: FlowErrorLocation::at_path(key.to_string()).with_source_path(Some(&path)),
        })?;
        let write_err = |err: std::io::Error| FlowError::Persistence {
            message: format!("write context: {err}"),
            location: FlowErrorLocation::at_path(key.to_string()).with_source_path(Some(&path)),
        };
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(write_err)?;
        tmp.write_all(text.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&path).map_err(|err| write_err(err.error))?;
        Ok(())
    }
}

/// File name for `key`: ASCII letters, digits, `-` and `_` are kept, every other byte
/// becomes `%XX`. `%` is itself escaped, so distinct keys never share a file.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(char::from(byte));
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    encoded
}
