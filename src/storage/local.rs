use std::fs;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::{Builder, NamedTempFile};
use tracing::warn;

use crate::error::QtlError;
use crate::storage::{Storage, WriteSink};

#[derive(Debug, Clone, Default)]
pub struct LocalStorage;

impl LocalStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Storage for LocalStorage {
    // sorted, read_dir order is platform dependent
    fn list(&self, path: &str) -> Result<Vec<String>, QtlError> {
        let root = Utf8Path::new(path);
        let entries = fs::read_dir(root.as_std_path())
            .map_err(|err| QtlError::Filesystem(format!("list {path}: {err}")))?;
        let mut children = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| QtlError::Filesystem(err.to_string()))?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(name) => {
                    warn!(path, entry = ?name, "skipping entry with non UTF-8 name");
                    continue;
                }
            };
            children.push(root.join(name).into_string());
        }
        children.sort();
        Ok(children)
    }

    fn exists(&self, path: &str) -> Result<bool, QtlError> {
        Utf8Path::new(path)
            .as_std_path()
            .try_exists()
            .map_err(|err| QtlError::Filesystem(format!("stat {path}: {err}")))
    }

    fn open_for_write(&self, path: &str) -> Result<Box<dyn WriteSink>, QtlError> {
        let destination = Utf8PathBuf::from(path);
        let parent = match destination.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
            _ => Utf8PathBuf::from("."),
        };
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| QtlError::Filesystem(err.to_string()))?;
        let temp = Builder::new()
            .prefix("qtlformer-out")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| QtlError::Filesystem(err.to_string()))?;
        Ok(Box::new(LocalSink { temp, destination }))
    }
}

struct LocalSink {
    temp: NamedTempFile,
    destination: Utf8PathBuf,
}

impl Write for LocalSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

impl WriteSink for LocalSink {
    fn finish(mut self: Box<Self>) -> Result<(), QtlError> {
        self.temp
            .flush()
            .map_err(|err| QtlError::Filesystem(err.to_string()))?;
        let LocalSink { temp, destination } = *self;
        temp.persist(destination.as_std_path())
            .map_err(|err| QtlError::Filesystem(format!("persist {destination}: {err}")))?;
        Ok(())
    }
}
