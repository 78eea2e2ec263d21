use std::path::{Path, PathBuf};

/// Normalize a user-provided path string from the command line or a prompt.
///
/// - Trims surrounding whitespace
/// - Strips one pair of matching surrounding quotes
/// - Expands a leading `~` to the home directory when it is known
pub fn normalize_user_input_path(input: &str) -> PathBuf {
    let trimmed = input.trim();

    let unquoted = if trimmed.len() >= 2
        && ((trimmed.starts_with('"') && trimmed.ends_with('"'))
            || (trimmed.starts_with('\'') && trimmed.ends_with('\'')))
    {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };

    if let Some(rest) = unquoted.strip_prefix('~') {
        if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') {
            if let Some(home) = dirs::home_dir() {
                let rest = rest.trim_start_matches(['/', '\\']);
                return if rest.is_empty() { home } else { home.join(rest) };
            }
        }
    }

    PathBuf::from(unquoted)
}

/// Normalizes `input` and anchors it at `base` when it is relative
pub fn resolve_against(input: &str, base: &Path) -> PathBuf {
    let path = normalize_user_input_path(input);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_and_unquotes() {
        assert_eq!(normalize_user_input_path("  './my project'  "), PathBuf::from("./my project"));
        assert_eq!(normalize_user_input_path("\"/srv/app\""), PathBuf::from("/srv/app"));
        assert_eq!(normalize_user_input_path("\""), PathBuf::from("\""));
    }

    #[test]
    fn test_expands_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(normalize_user_input_path("~"), home);
            assert_eq!(normalize_user_input_path("~/code/app"), home.join("code/app"));
        }
        assert_eq!(normalize_user_input_path("~other/app"), PathBuf::from("~other/app"));
    }

    #[test]
    fn test_resolve_against_base() {
        assert_eq!(resolve_against("src", Path::new("/srv/app")), PathBuf::from("/srv/app/src"));
        assert_eq!(resolve_against("/etc/app", Path::new("/srv/app")), PathBuf::from("/etc/app"));
    }
}
