//! Resolves the `[permissions]` TOML block into the raw uid/gid/mode values
//! `custodian_core::transfer::TransferOptions` wants. Name-or-numeric-id lookups use `nix`, the
//! same crate the core crate already uses for the actual `chown(2)` call.

use nix::unistd::{Group, User};

use crate::{ConfigError, PermissionsConfig};

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolvedPermissions {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub file_mode: Option<u32>,
    pub dir_mode: Option<u32>,
}

pub(crate) fn resolve(config: &PermissionsConfig) -> Result<ResolvedPermissions, ConfigError> {
    resolve_with(config, nix::unistd::Uid::effective().is_root())
}

/// `is_root` is injected so the startup refusal can be exercised without actually running as
/// root (or non-root) in tests.
fn resolve_with(config: &PermissionsConfig, is_root: bool) -> Result<ResolvedPermissions, ConfigError> {
    let resolved = ResolvedPermissions {
        uid: config.user.as_deref().map(resolve_uid).transpose()?,
        gid: config.group.as_deref().map(resolve_gid).transpose()?,
        file_mode: config.file_mode.as_deref().map(parse_octal_mode).transpose()?,
        dir_mode: config.dir_mode.as_deref().map(parse_octal_mode).transpose()?,
    };

    if (resolved.uid.is_some() || resolved.gid.is_some()) && !is_root {
        return Err(ConfigError::Invalid(
            "permissions.user/group is configured but the daemon is not running as root; chown \
             would fail on every transfer"
                .into(),
        ));
    }

    Ok(resolved)
}

fn resolve_uid(value: &str) -> Result<u32, ConfigError> {
    if let Ok(uid) = value.parse::<u32>() {
        return Ok(uid);
    }
    User::from_name(value)
        .map_err(|errno| ConfigError::Invalid(format!("looking up user {value:?}: {errno}")))?
        .map(|user| user.uid.as_raw())
        .ok_or_else(|| ConfigError::Invalid(format!("unknown user {value:?}")))
}

fn resolve_gid(value: &str) -> Result<u32, ConfigError> {
    if let Ok(gid) = value.parse::<u32>() {
        return Ok(gid);
    }
    Group::from_name(value)
        .map_err(|errno| ConfigError::Invalid(format!("looking up group {value:?}: {errno}")))?
        .map(|group| group.gid.as_raw())
        .ok_or_else(|| ConfigError::Invalid(format!("unknown group {value:?}")))
}

fn parse_octal_mode(value: &str) -> Result<u32, ConfigError> {
    let trimmed = value.trim_start_matches("0o");
    u32::from_str_radix(trimmed, 8)
        .map_err(|_| ConfigError::Invalid(format!("invalid octal mode {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_pass_through_without_lookup_when_root() {
        let config = PermissionsConfig {
            user: Some("1000".into()),
            group: Some("1000".into()),
            file_mode: Some("0644".into()),
            dir_mode: Some("755".into()),
        };
        let resolved = resolve_with(&config, true).unwrap();
        assert_eq!(resolved.uid, Some(1000));
        assert_eq!(resolved.gid, Some(1000));
        assert_eq!(resolved.file_mode, Some(0o644));
        assert_eq!(resolved.dir_mode, Some(0o755));
    }

    #[test]
    fn ownership_without_root_is_rejected() {
        let config = PermissionsConfig { user: Some("1000".into()), ..Default::default() };
        assert!(resolve_with(&config, false).is_err());
    }

    #[test]
    fn modes_without_ownership_do_not_require_root() {
        let config = PermissionsConfig {
            file_mode: Some("0644".into()),
            dir_mode: Some("0755".into()),
            ..Default::default()
        };
        let resolved = resolve_with(&config, false).unwrap();
        assert_eq!(resolved.file_mode, Some(0o644));
        assert_eq!(resolved.dir_mode, Some(0o755));
    }

    #[test]
    fn empty_config_resolves_to_all_none() {
        let resolved = resolve_with(&PermissionsConfig::default(), false).unwrap();
        assert_eq!(resolved.uid, None);
        assert_eq!(resolved.gid, None);
        assert_eq!(resolved.file_mode, None);
        assert_eq!(resolved.dir_mode, None);
    }

    #[test]
    fn invalid_octal_mode_is_rejected() {
        let config = PermissionsConfig {
            file_mode: Some("not-octal".into()),
            ..Default::default()
        };
        assert!(resolve_with(&config, false).is_err());
    }
}
