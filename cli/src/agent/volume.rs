// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Per-volume credential storage.
//!
//! Each volume owns `<volume_root>/<name>/` holding two files:
//!
//! - `token`: the decrypted secret
//! - `accessor`: the handle needed to revoke it on detach
//!
//! The directory is `0700` and both files are `0600`. Mounting the
//! directory into containers is left to the volume driver.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use super::client::{RevokeOutcome, TokenServerClient};
use super::AgentError;

pub const DEFAULT_VOLUME_ROOT: &str = "/var/lib/rancher/volumes/vault-volume-driver";
pub const TOKEN_FILE: &str = "token";
pub const ACCESSOR_FILE: &str = "accessor";

/// What `detach` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachOutcome {
    Revoked,
    AlreadyGone,
    /// No handle was stored, so there was nothing to revoke.
    NothingToRevoke,
}

/// A volume with a live credential on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedVolume {
    pub path: PathBuf,
    pub accessor: String,
}

pub struct VolumeAgent {
    client: TokenServerClient,
    volume_root: PathBuf,
    host_uuid: String,
}

impl VolumeAgent {
    pub fn new(client: TokenServerClient, volume_root: impl Into<PathBuf>, host_uuid: impl Into<String>) -> Self {
        Self {
            client,
            volume_root: volume_root.into(),
            host_uuid: host_uuid.into(),
        }
    }

    pub fn volume_path(&self, name: &str) -> Result<PathBuf, AgentError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains('/')
            && !name.contains('\\');
        if !valid {
            return Err(AgentError::InvalidVolumeName(name.to_string()));
        }
        Ok(self.volume_root.join(name))
    }

    /// Obtain a credential for `name` and store it in the volume directory.
    pub async fn attach(&self, name: &str, policies: &str) -> Result<AttachedVolume, AgentError> {
        let path = self.volume_path(name)?;

        let issued = self
            .client
            .request_token(policies, &self.host_uuid, Some(name))
            .await?;

        if let Err(e) = store_credential(&path, &issued.secret, &issued.accessor) {
            error!(volume = %name, error = %e, "Could not persist credential; revoking it");
            if let Err(revoke_err) = self.client.revoke_token(&issued.accessor, &self.host_uuid).await {
                error!(volume = %name, error = %revoke_err, "Revoking unpersisted credential failed");
            }
            return Err(e);
        }

        info!(volume = %name, "Attached volume credential");
        debug!(volume = %name, accessor = %issued.accessor, "Stored credential handle");
        Ok(AttachedVolume {
            path,
            accessor: issued.accessor,
        })
    }

    /// Revoke the stored credential and remove the volume directory.
    ///
    /// The directory is kept when revocation fails for any reason other
    /// than the credential already being gone.
    pub async fn detach(&self, name: &str) -> Result<DetachOutcome, AgentError> {
        let path = self.volume_path(name)?;
        let accessor_path = path.join(ACCESSOR_FILE);

        let accessor = match fs::read_to_string(&accessor_path) {
            Ok(contents) => Some(contents.trim().to_string()).filter(|a| !a.is_empty()),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(source) => {
                return Err(AgentError::Storage {
                    path: accessor_path,
                    source,
                })
            }
        };

        let outcome = match accessor {
            Some(accessor) => match self.client.revoke_token(&accessor, &self.host_uuid).await? {
                RevokeOutcome::Revoked => DetachOutcome::Revoked,
                RevokeOutcome::AlreadyGone => DetachOutcome::AlreadyGone,
            },
            None => {
                warn!(volume = %name, "No stored accessor; nothing to revoke");
                DetachOutcome::NothingToRevoke
            }
        };

        remove_volume_dir(&path)?;
        info!(volume = %name, outcome = ?outcome, "Detached volume");
        Ok(outcome)
    }
}

fn store_credential(dir: &Path, secret: &str, accessor: &str) -> Result<(), AgentError> {
    create_private_dir(dir)?;
    write_private_file(&dir.join(TOKEN_FILE), secret.as_bytes())?;
    write_private_file(&dir.join(ACCESSOR_FILE), accessor.as_bytes())
}

fn create_private_dir(dir: &Path) -> Result<(), AgentError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir).map_err(|source| AgentError::Storage {
        path: dir.to_path_buf(),
        source,
    })
}

fn write_private_file(path: &Path, contents: &[u8]) -> Result<(), AgentError> {
    let storage_err = |source| AgentError::Storage {
        path: path.to_path_buf(),
        source,
    };

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(storage_err)?;
    file.write_all(contents).map_err(storage_err)?;
    file.sync_all().map_err(storage_err)
}

fn remove_volume_dir(dir: &Path) -> Result<(), AgentError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(AgentError::Storage {
            path: dir.to_path_buf(),
            source,
        }),
    }
}
