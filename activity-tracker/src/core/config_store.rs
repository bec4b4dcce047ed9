/*!
Mutable access to the platform configuration file.

The platform config is a TOML document whose `[plugins]` table carries the
`activated` plugin list. Update steps edit the document through this store;
the read-modify-write cycle holds an advisory file lock so a concurrent
platform process never sees a half-written file.
*/

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use toml::Table;
use tracing::debug;

pub struct ConfigStore {
    path: Option<PathBuf>,
    document: Table,
}

impl ConfigStore {
    /// Load the platform config file, holding a shared lock while reading.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let mut file = File::open(&path)?;
        file.lock_shared()?;

        let mut contents = String::new();
        let read_result = file.read_to_string(&mut contents);
        file.unlock()?;
        read_result?;

        let document: Table = contents.parse()?;

        Ok(Self {
            path: Some(path.as_ref().to_path_buf()),
            document,
        })
    }

    /// Build a store around an in-memory document. Nothing is persisted
    /// until the store is given a path via `save_to`.
    pub fn from_table(document: Table) -> Self {
        Self {
            path: None,
            document,
        }
    }

    /// Names in the `[plugins] activated` array.
    pub fn activated_plugins(&self) -> Vec<String> {
        self.document
            .get("plugins")
            .and_then(|p| p.get("activated"))
            .and_then(|a| a.as_array())
            .map(|array| {
                array
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.activated_plugins().iter().any(|p| p == name)
    }

    /// Remove a plugin from the activated list. Removing an absent plugin is
    /// a no-op, so update steps stay idempotent.
    pub fn delete_plugin(&mut self, name: &str) {
        let Some(array) = self
            .document
            .get_mut("plugins")
            .and_then(|p| p.get_mut("activated"))
            .and_then(|a| a.as_array_mut())
        else {
            return;
        };

        let before = array.len();
        array.retain(|v| v.as_str() != Some(name));

        if array.len() != before {
            debug!("Removed plugin {} from config", name);
        }
    }

    /// Write the document back to its file under an exclusive lock.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let path = self
            .path
            .as_ref()
            .ok_or("config store has no backing file")?;
        self.write_locked(path)
    }

    pub fn save_to<P: AsRef<Path>>(&mut self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        self.path = Some(path.as_ref().to_path_buf());
        self.save()
    }

    fn write_locked(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let serialized = toml::to_string(&self.document)?;

        let mut file = OpenOptions::new().write(true).create(true).open(path)?;
        file.lock_exclusive()?;

        // Truncate only once the lock is held.
        let write_result = file
            .set_len(0)
            .and_then(|_| file.write_all(serialized.as_bytes()))
            .and_then(|_| file.flush());
        file.unlock()?;
        write_result?;

        Ok(())
    }
}
