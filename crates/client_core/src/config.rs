use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "updates.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Queued, unhandled events per subscriber at which a warning is logged.
    pub backlog_warning: usize,
    pub log_entries_max_age: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            backlog_warning: 1024,
            log_entries_max_age: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    backlog_warning: Option<usize>,
    log_entries_max_age_ms: Option<u64>,
}

pub fn load_settings() -> ClientSettings {
    let settings = load_settings_from(Path::new(DEFAULT_SETTINGS_FILE));
    apply_env_overrides(settings, |key| std::env::var(key).ok())
}

/// Defaults overlaid with whatever the file sets. A missing file is fine; an
/// unreadable one is logged and ignored.
pub fn load_settings_from(path: &Path) -> ClientSettings {
    let mut settings = ClientSettings::default();

    let Ok(raw) = fs::read_to_string(path) else {
        return settings;
    };
    match toml::from_str::<FileSettings>(&raw) {
        Ok(file_cfg) => {
            if let Some(v) = file_cfg.backlog_warning.filter(|v| *v > 0) {
                settings.backlog_warning = v;
            }
            if let Some(v) = file_cfg.log_entries_max_age_ms {
                settings.log_entries_max_age = Duration::from_millis(v);
            }
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "config: ignoring unparseable settings file");
        }
    }

    settings
}

pub fn apply_env_overrides(
    mut settings: ClientSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> ClientSettings {
    for key in ["UPDATES_BACKLOG_WARNING", "APP__BACKLOG_WARNING"] {
        if let Some(v) = lookup(key).and_then(|v| v.parse::<usize>().ok()) {
            if v > 0 {
                settings.backlog_warning = v;
            }
        }
    }

    for key in ["UPDATES_LOG_MAX_AGE_MS", "APP__LOG_MAX_AGE_MS"] {
        if let Some(v) = lookup(key).and_then(|v| v.parse::<u64>().ok()) {
            settings.log_entries_max_age = Duration::from_millis(v);
        }
    }

    settings
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn temp_settings_file(contents: &str) -> std::path::PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("updates_client_settings_{suffix}.toml"));
        fs::write(&path, contents).expect("write settings");
        path
    }

    #[test]
    fn missing_file_yields_defaults() {
        let settings = load_settings_from(Path::new("/definitely/not/here/updates.toml"));
        assert_eq!(settings, ClientSettings::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let path = temp_settings_file("backlog_warning = 16\nlog_entries_max_age_ms = 5000\n");
        let settings = load_settings_from(&path);
        fs::remove_file(&path).expect("cleanup");

        assert_eq!(settings.backlog_warning, 16);
        assert_eq!(settings.log_entries_max_age, Duration::from_secs(5));
    }

    #[test]
    fn unparseable_file_is_ignored() {
        let path = temp_settings_file("backlog_warning = \"lots\"");
        let settings = load_settings_from(&path);
        fs::remove_file(&path).expect("cleanup");

        assert_eq!(settings, ClientSettings::default());
    }

    #[test]
    fn env_overrides_win_and_bad_values_are_skipped() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("UPDATES_BACKLOG_WARNING", "0"),
            ("APP__BACKLOG_WARNING", "32"),
            ("UPDATES_LOG_MAX_AGE_MS", "not-a-number"),
        ]);
        let settings = apply_env_overrides(ClientSettings::default(), |key| {
            env.get(key).map(|v| v.to_string())
        });

        assert_eq!(settings.backlog_warning, 32);
        assert_eq!(
            settings.log_entries_max_age,
            ClientSettings::default().log_entries_max_age
        );
    }
}
