//! # Build workspace provisioning.
//!
//! Every build runs in a freshly created, uniquely named directory under the
//! configured `buildLocation` (system temp dir when unset). The directory is
//! removed when the owning build's reference count drops to zero.

use std::io;
use std::path::{Path, PathBuf};

use crate::token;

/// Prefix of every workspace directory name.
const WORKSPACE_PREFIX: &str = "ngbuild-workspace-";

/// Creates an empty unique directory to work in.
pub(crate) fn provision(base: Option<&Path>) -> io::Result<PathBuf> {
    let base = match base {
        Some(base) => base.to_path_buf(),
        None => std::env::temp_dir(),
    };
    std::fs::create_dir_all(&base)?;
    set_mode(&base)?;

    loop {
        let candidate = base.join(format!("{WORKSPACE_PREFIX}{}", token::generate(&[])));
        match std::fs::create_dir(&candidate) {
            Ok(()) => {
                set_mode(&candidate)?;
                return Ok(candidate);
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
}

/// Removes a workspace and everything in it.
pub(crate) fn cleanup(directory: &Path) -> io::Result<()> {
    std::fs::remove_dir_all(directory)
}

#[cfg(unix)]
fn set_mode(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o766))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path) -> io::Result<()> {
    Ok(())
}
