//! SSH key material for new machines.

use std::ffi::OsString;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use tracing::info;

use crate::command::CommandRunner;
use crate::error::DriverError;

const PRIVATE_KEY_FILE: &str = "id_rsa";
const PUBLIC_KEY_FILE: &str = "id_rsa.pub";

/// Supplies the public key injected into a machine's boot volume.
pub trait KeyProvider {
    /// Returns the OpenSSH public key for `machine_name`, creating a key pair
    /// when none exists yet.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Credential`] when the key cannot be produced.
    fn public_key(&self, machine_name: &str) -> Result<String, DriverError>;
}

/// Key provider that runs `ssh-keygen` and keeps one key pair per machine
/// under `<root>/<machine>/id_rsa`.
#[derive(Clone, Debug)]
pub struct SshKeygen<R> {
    root: Utf8PathBuf,
    runner: R,
}

impl<R: CommandRunner> SshKeygen<R> {
    /// Creates a provider storing key pairs below `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>, runner: R) -> Self {
        Self {
            root: root.into(),
            runner,
        }
    }

    /// Path of the private key for `machine_name`.
    #[must_use]
    pub fn private_key_path(&self, machine_name: &str) -> Utf8PathBuf {
        self.root.join(machine_name).join(PRIVATE_KEY_FILE)
    }

    fn key_dir(&self, machine_name: &str) -> Result<Dir, DriverError> {
        let path = self.root.join(machine_name);
        Dir::create_ambient_dir_all(&path, ambient_authority())
            .and_then(|()| Dir::open_ambient_dir(&path, ambient_authority()))
            .map_err(|err| io_failure(&path, &err))
    }

    fn generate(&self, machine_name: &str) -> Result<(), DriverError> {
        let key_path = self.private_key_path(machine_name);
        info!(path = key_path.as_str(), "generating SSH key pair");
        let args: Vec<OsString> = [
            "-t",
            "rsa",
            "-b",
            "2048",
            "-N",
            "",
            "-q",
            "-f",
            key_path.as_str(),
            "-C",
            machine_name,
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        let output = self
            .runner
            .run("ssh-keygen", &args)
            .map_err(|err| DriverError::Credential(err.to_string()))?;
        if output.is_success() {
            return Ok(());
        }
        Err(DriverError::Credential(format!(
            "ssh-keygen exited with {}: {}",
            output
                .code
                .map_or_else(|| String::from("no exit code"), |code| code.to_string()),
            output.stderr.trim()
        )))
    }
}

fn io_failure(path: &Utf8Path, err: &io::Error) -> DriverError {
    DriverError::Credential(format!("failed to access {path}: {err}"))
}

impl<R: CommandRunner> KeyProvider for SshKeygen<R> {
    fn public_key(&self, machine_name: &str) -> Result<String, DriverError> {
        let dir = self.key_dir(machine_name)?;
        let public_path = self.root.join(machine_name).join(PUBLIC_KEY_FILE);
        let exists = dir
            .try_exists(PUBLIC_KEY_FILE)
            .map_err(|err| io_failure(&public_path, &err))?;
        if !exists {
            self.generate(machine_name)?;
        }

        let key = dir
            .read_to_string(PUBLIC_KEY_FILE)
            .map_err(|err| io_failure(&public_path, &err))?;
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(DriverError::Credential(format!("{public_path} is empty")));
        }
        Ok(trimmed.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandError, CommandOutput};
    use crate::test_support::ScriptedRunner;
    use tempfile::TempDir;

    fn utf8_root(tmp: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
            .unwrap_or_else(|path| panic!("temp path should be utf8: {}", path.display()))
    }

    /// Stands in for `ssh-keygen` by writing the public half next to `-f`.
    struct WritingRunner;

    impl CommandRunner for WritingRunner {
        fn run(&self, _program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
            let key_path = args
                .iter()
                .skip_while(|arg| *arg != "-f")
                .nth(1)
                .and_then(|arg| arg.to_str())
                .unwrap_or_else(|| panic!("missing -f argument"));
            std::fs::write(format!("{key_path}.pub"), "ssh-rsa AAAAgenerated box\n")
                .unwrap_or_else(|err| panic!("write key: {err}"));
            Ok(CommandOutput {
                code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    #[test]
    fn existing_public_key_is_reused() {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let root = utf8_root(&tmp);
        std::fs::create_dir_all(root.join("box")).unwrap_or_else(|err| panic!("mkdir: {err}"));
        std::fs::write(root.join("box").join(PUBLIC_KEY_FILE), "ssh-rsa AAAAexisting\n")
            .unwrap_or_else(|err| panic!("seed key: {err}"));
        let runner = ScriptedRunner::new();

        let key = SshKeygen::new(root, runner.clone())
            .public_key("box")
            .unwrap_or_else(|err| panic!("public key: {err}"));

        assert_eq!(key, "ssh-rsa AAAAexisting");
        assert!(runner.invocations().is_empty());
    }

    #[test]
    fn missing_key_is_generated() {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let keygen = SshKeygen::new(utf8_root(&tmp), WritingRunner);

        let key = keygen
            .public_key("box")
            .unwrap_or_else(|err| panic!("public key: {err}"));

        assert_eq!(key, "ssh-rsa AAAAgenerated box");
    }

    #[test]
    fn keygen_failure_is_a_credential_error() {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let runner = ScriptedRunner::new();
        runner.push_output(Some(1), "", "permission denied");

        let err = SshKeygen::new(utf8_root(&tmp), runner.clone())
            .public_key("box")
            .err()
            .unwrap_or_else(|| panic!("keygen failure should error"));

        let DriverError::Credential(message) = err else {
            panic!("expected Credential, got {err:?}");
        };
        assert!(message.contains("permission denied"));
        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 1);
        assert!(
            invocations
                .first()
                .is_some_and(|call| call.command_string().starts_with("ssh-keygen -t rsa -b 2048"))
        );
    }
}
