//! Persistent machine records under `<root>/machines/<name>.json`.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

use crate::machine::Machine;

const MACHINES_DIR: &str = "machines";

/// Errors raised while reading or writing machine records.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Raised when a machine name cannot be used as a file name.
    #[error("invalid machine name '{0}': use letters, digits, '-', '_' or '.'")]
    InvalidName(String),
    /// Raised when no record exists for the machine.
    #[error("no machine named '{0}' is stored")]
    NotFound(String),
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when a stored record cannot be parsed or rendered.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path of the offending record.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// Reads and writes [`Machine`] records as JSON files.
#[derive(Clone, Debug)]
pub struct MachineStore {
    root: Utf8PathBuf,
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_owned()))
    }
}

fn io_error(path: &Utf8Path, err: &io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

impl MachineStore {
    /// Creates a store rooted at `root`. Nothing is created until a record is
    /// saved.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the machine records.
    #[must_use]
    pub fn machines_dir(&self) -> Utf8PathBuf {
        self.root.join(MACHINES_DIR)
    }

    /// Path of the record for `name`.
    #[must_use]
    pub fn record_path(&self, name: &str) -> Utf8PathBuf {
        self.machines_dir().join(format!("{name}.json"))
    }

    fn open_dir(&self) -> Result<Option<Dir>, StoreError> {
        let path = self.machines_dir();
        match Dir::open_ambient_dir(&path, ambient_authority()) {
            Ok(dir) => Ok(Some(dir)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(&path, &err)),
        }
    }

    /// Returns `true` when a record for `name` exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the name is invalid or the directory cannot
    /// be read.
    pub fn exists(&self, name: &str) -> Result<bool, StoreError> {
        validate_name(name)?;
        let Some(dir) = self.open_dir()? else {
            return Ok(false);
        };
        let file = format!("{name}.json");
        dir.try_exists(&file)
            .map_err(|err| io_error(&self.record_path(name), &err))
    }

    /// Loads the record for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no record exists and
    /// [`StoreError::Parse`] when the record is malformed or carries unknown
    /// keys.
    pub fn load(&self, name: &str) -> Result<Machine, StoreError> {
        validate_name(name)?;
        let path = self.record_path(name);
        let Some(dir) = self.open_dir()? else {
            return Err(StoreError::NotFound(name.to_owned()));
        };
        let contents = match dir.read_to_string(format!("{name}.json")) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_owned()));
            }
            Err(err) => return Err(io_error(&path, &err)),
        };
        serde_json::from_str(&contents).map_err(|err| StoreError::Parse {
            path,
            message: err.to_string(),
        })
    }

    /// Writes `machine`, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the directory or file cannot be written.
    pub fn save(&self, machine: &Machine) -> Result<Utf8PathBuf, StoreError> {
        validate_name(&machine.name)?;
        let dir_path = self.machines_dir();
        Dir::create_ambient_dir_all(&dir_path, ambient_authority())
            .map_err(|err| io_error(&dir_path, &err))?;
        let dir = Dir::open_ambient_dir(&dir_path, ambient_authority())
            .map_err(|err| io_error(&dir_path, &err))?;

        let path = self.record_path(&machine.name);
        let rendered =
            serde_json::to_string_pretty(machine).map_err(|err| StoreError::Parse {
                path: path.clone(),
                message: err.to_string(),
            })?;
        dir.write(format!("{}.json", machine.name), rendered)
            .map_err(|err| io_error(&path, &err))?;
        Ok(path)
    }

    /// Deletes the record for `name`. Deleting a missing record succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the name is invalid or removal fails.
    pub fn delete(&self, name: &str) -> Result<(), StoreError> {
        validate_name(name)?;
        let Some(dir) = self.open_dir()? else {
            return Ok(());
        };
        match dir.remove_file(format!("{name}.json")) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(&self.record_path(name), &err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DatacenterId, LanId, ServerId};
    use crate::machine::{DatacenterOrigin, ProvisionedResources};
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct TempStore {
        _tmp: TempDir,
        store: MachineStore,
    }

    #[fixture]
    fn temp_store() -> TempStore {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
            .unwrap_or_else(|path| panic!("temp path should be utf8: {}", path.display()));
        TempStore {
            _tmp: tmp,
            store: MachineStore::new(root),
        }
    }

    #[rstest]
    fn save_then_load_returns_same_record(temp_store: TempStore) {
        let mut machine = Machine::new("box-1");
        machine.commit(ProvisionedResources {
            datacenter_id: DatacenterId::from("dc-1"),
            datacenter_origin: DatacenterOrigin::CreatedByRun,
            server_id: ServerId::from("srv-1"),
            lan_id: LanId::from("1"),
            ip_address: String::from("203.0.113.7"),
        });

        let path = temp_store
            .store
            .save(&machine)
            .unwrap_or_else(|err| panic!("save: {err}"));
        let loaded = temp_store
            .store
            .load("box-1")
            .unwrap_or_else(|err| panic!("load: {err}"));

        assert!(path.as_str().ends_with("machines/box-1.json"));
        assert_eq!(loaded, machine);
    }

    #[rstest]
    fn load_missing_record_is_not_found(temp_store: TempStore) {
        let err = temp_store
            .store
            .load("ghost")
            .err()
            .unwrap_or_else(|| panic!("missing record should error"));
        assert!(matches!(err, StoreError::NotFound(name) if name == "ghost"));
    }

    #[rstest]
    fn unknown_keys_are_rejected(temp_store: TempStore) {
        let dir = temp_store.store.machines_dir();
        std::fs::create_dir_all(&dir).unwrap_or_else(|err| panic!("mkdir: {err}"));
        std::fs::write(
            dir.join("box.json"),
            r#"{"name":"box","datacenter_origin":"preexisting","extra":1}"#,
        )
        .unwrap_or_else(|err| panic!("seed record: {err}"));

        let err = temp_store
            .store
            .load("box")
            .err()
            .unwrap_or_else(|| panic!("unknown key should be rejected"));
        assert!(matches!(err, StoreError::Parse { .. }));
    }

    #[rstest]
    #[case("../escape")]
    #[case(".hidden")]
    #[case("")]
    fn invalid_names_are_rejected(temp_store: TempStore, #[case] name: &str) {
        assert!(matches!(
            temp_store.store.exists(name),
            Err(StoreError::InvalidName(_))
        ));
    }

    #[rstest]
    fn delete_removes_record_and_tolerates_absence(temp_store: TempStore) {
        temp_store
            .store
            .save(&Machine::new("box"))
            .unwrap_or_else(|err| panic!("save: {err}"));

        temp_store
            .store
            .delete("box")
            .unwrap_or_else(|err| panic!("delete: {err}"));
        temp_store
            .store
            .delete("box")
            .unwrap_or_else(|err| panic!("second delete: {err}"));

        assert!(
            !temp_store
                .store
                .exists("box")
                .unwrap_or_else(|err| panic!("exists: {err}"))
        );
    }
}
