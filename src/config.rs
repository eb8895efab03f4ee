use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "cristae";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Output layout under the output root
pub const RAW_DIR: &str = "raw";
pub const PROBABILITY_DIR: &str = "probability";
pub const METADATA_DIR: &str = "metadata";
pub const CATALOG_BACKUP_FILE: &str = "regions_backup.json";
pub const RESULTS_AUTOSAVE_FILE: &str = "results_autosave.csv";

/// Settings file name inside the settings directory
pub const SETTINGS_FILE: &str = "settings.json";

/// Filter used when `RUST_LOG` is not set
pub fn default_log_filter() -> &'static str {
    "cristae_lib=info,cristae=info"
}

/// Get the per-user settings directory (`<config dir>/cristae/`)
pub fn settings_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME))
}

/// Get the default settings file path, if the platform has a config dir
pub fn default_settings_path() -> Option<PathBuf> {
    settings_dir().map(|dir| dir.join(SETTINGS_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_path_under_settings_dir() {
        if let (Some(dir), Some(path)) = (settings_dir(), default_settings_path()) {
            assert!(path.starts_with(&dir));
            assert!(path.ends_with(SETTINGS_FILE));
            assert!(dir.ends_with(APP_NAME));
        }
    }

    #[test]
    fn layout_names_are_distinct() {
        let names = [
            RAW_DIR,
            PROBABILITY_DIR,
            METADATA_DIR,
            CATALOG_BACKUP_FILE,
            RESULTS_AUTOSAVE_FILE,
        ];
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn default_filter_names_both_targets() {
        assert!(default_log_filter().contains("cristae_lib"));
        assert!(default_log_filter().contains("cristae="));
    }
}
