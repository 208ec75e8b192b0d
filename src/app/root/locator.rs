use std::path::Path;

/// Well-known superuser locations across Magisk, KernelSU and APatch installs.
pub const KNOWN_SU_PATHS: &[&str] = &[
    "/sbin/su",
    "/system/bin/su",
    "/system/xbin/su",
    "/debug_ramdisk/su",
    "/data/adb/ksu/bin/su",
    "/data/adb/ap/bin/su",
];

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|candidate| candidate.strip_suffix('"'))
    {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|candidate| candidate.strip_suffix('\''))
    {
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

pub fn resolve_su_program(config_command_path: &str) -> String {
    let normalized = normalize_command_path(config_command_path);
    if normalized.is_empty() {
        "su".to_string()
    } else {
        normalized
    }
}

/// Checks a configured superuser path. A bare `su` is left to `PATH` lookup.
pub fn validate_su_program(program: &str) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err("Superuser command is empty".to_string());
    }
    if program == "su" {
        return Ok(());
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err("Superuser path must point to an executable file".to_string());
    }
    if !path.exists() {
        return Err("Superuser binary not found at the configured path".to_string());
    }
    Ok(())
}

/// First existing entry of `candidates`, used for diagnostics when `su` is not on `PATH`.
pub fn find_installed_su(candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .find(|candidate| Path::new(candidate).is_file())
        .map(|candidate| candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_wrapping_quotes() {
        assert_eq!(normalize_command_path("  \"/sbin/su\"  "), "/sbin/su");
        assert_eq!(normalize_command_path("  '/system/xbin/su'  "), "/system/xbin/su");
    }

    #[test]
    fn resolves_empty_to_default_su() {
        assert_eq!(resolve_su_program(""), "su");
        assert_eq!(resolve_su_program("   "), "su");
    }

    #[test]
    fn validates_nonexistent_path() {
        let err = validate_su_program("/this/path/should/not/exist/su").unwrap_err();
        assert!(err.to_lowercase().contains("not found"));
        assert!(validate_su_program("su").is_ok());
    }

    #[test]
    fn finds_first_existing_candidate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let present = dir.path().join("su");
        std::fs::write(&present, "").expect("write");
        let present = present.to_string_lossy().to_string();
        let found = find_installed_su(&["/this/path/should/not/exist/su", present.as_str()]);
        assert_eq!(found.as_deref(), Some(present.as_str()));
        assert_eq!(find_installed_su(&["/this/path/should/not/exist/su"]), None);
    }
}
