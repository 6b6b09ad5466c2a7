//! Persistence of exported binding records between runs.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::Result;

/// Stores the settings records of a panel instance.
pub trait ProfileStore: Send + Sync {
    /// Replaces the saved records for `instance`.
    fn save(&self, instance: &str, records: &[String]) -> Result<()>;

    /// Returns the saved records, or `None` when nothing has been saved.
    fn load(&self, instance: &str) -> Result<Option<Vec<String>>>;
}

/// One `<instance>.bindings` text file per panel in a state directory.
#[derive(Debug, Clone)]
pub struct FileProfileStore {
    dir: PathBuf,
}

impl FileProfileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Path of the profile file for an instance.
    pub fn path(&self, instance: &str) -> PathBuf {
        let name: String = instance
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.bindings", name))
    }
}

impl ProfileStore for FileProfileStore {
    fn save(&self, instance: &str, records: &[String]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(instance);
        let tmp = path.with_extension("bindings.tmp");

        let mut content = String::from("# Panel bindings\n");
        for record in records {
            content.push_str(record);
            content.push('\n');
        }
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;

        info!("Saved {} record(s) to {}", records.len(), path.display());
        Ok(())
    }

    fn load(&self, instance: &str) -> Result<Option<Vec<String>>> {
        let path = self.path(instance);
        match fs::read_to_string(&path) {
            Ok(content) => {
                debug!("Loaded profile {}", path.display());
                Ok(Some(content.lines().map(str::to_string).collect()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::new(dir.path().join("state"));
        let records = vec![
            "KeyBinding{1SOFTBUTTON_1};;;;A:Press@0ms,A:Release@50ms".to_string(),
            "ProtocolBinding{0PAGE_UP};;;;GEAR 1".to_string(),
        ];

        store.save("fip0", &records).unwrap();
        let loaded = store.load("fip0").unwrap().unwrap();

        assert_eq!(loaded[0], "# Panel bindings");
        assert_eq!(&loaded[1..], &records[..]);
        assert!(store.path("fip0").ends_with("fip0.bindings"));
    }

    #[test]
    fn test_missing_profile_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::new(dir.path());
        assert!(store.load("nothing").unwrap().is_none());
    }

    #[test]
    fn test_instance_name_is_sanitized() {
        let store = FileProfileStore::new("/var/lib/fip");
        assert_eq!(
            store.path("../left panel"),
            PathBuf::from("/var/lib/fip/___left_panel.bindings")
        );
    }
}
