//! Workspace-wide constants.
//!
//! Single source of truth for permission defaults and paths. The values that
//! mirror kernel defaults (owner-only permissions, the `ftok` project id) are
//! passed straight through to `shmget(2)` / `ftok(3)`.

use static_assertions::const_assert;

/// Permission bits applied to new segments when none are given (owner rw).
pub const DEFAULT_PERMISSIONS: u32 = 0o600;

/// Mask of the permission bits `shmget(2)` accepts in its flag word.
pub const PERMISSION_MASK: u32 = 0o777;

/// Project id passed to `ftok(3)` when deriving a key from a path.
pub const IPC_KEY_PROJID: i32 = 0x42;

/// Default location of the optional TOML configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/shmtool/shmtool.toml";

/// Environment variable that overrides the configuration file path.
pub const CONFIG_PATH_ENV: &str = "SHMTOOL_CONFIG";

/// Environment variable holding the log level.
pub const LOG_LEVEL_ENV: &str = "LOGLEVEL";

const_assert!(DEFAULT_PERMISSIONS & !PERMISSION_MASK == 0);
// ftok only uses the low 8 bits of the project id.
const_assert!(IPC_KEY_PROJID > 0 && IPC_KEY_PROJID <= 0xff);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_permissions_are_owner_read_write() {
        assert_eq!(DEFAULT_PERMISSIONS, 0o600);
        assert_eq!(DEFAULT_PERMISSIONS & 0o077, 0);
    }

    #[test]
    fn project_id_fits_ftok() {
        assert_eq!(IPC_KEY_PROJID & 0xff, IPC_KEY_PROJID);
    }
}
