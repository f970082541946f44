use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use vigil_core::config::Settings;

pub fn get_configuration_with_paths(
    current_dir_path: Option<PathBuf>,
    system_config_dir_path: Option<PathBuf>,
) -> Result<Settings, config::ConfigError> {
    let config_directory = current_dir_path.unwrap_or_else(|| {
        std::env::current_dir()
            .map(|p| p.join("config"))
            .unwrap_or_else(|_| PathBuf::from("config"))
    });

    let system_config_dir = if let Some(path) = system_config_dir_path {
        path
    } else {
        ProjectDirs::from("com", "vigil", "vigil")
            .map(|d| d.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("config"))
    };

    let settings = Config::builder()
        .set_default("log_level", "info")?
        .set_default("network.timeout_secs", 30)?
        .set_default("network.connect_timeout_secs", 10)?
        .set_default("clock.max_offset_age_secs", 300)?
        .add_source(File::from(system_config_dir.join("config.toml")).required(false))
        .add_source(File::from(config_directory.join("config.toml")).required(false))
        .add_source(Environment::with_prefix("VIGIL").separator("__"))
        .build()?;

    settings.try_deserialize::<Settings>()
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    get_configuration_with_paths(None, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::tempdir;

    fn clear_env() {
        for (key, _) in std::env::vars() {
            if key.starts_with("VIGIL__") {
                std::env::remove_var(&key);
            }
        }
    }

    #[serial]
    #[test]
    fn test_get_configuration_defaults() {
        clear_env();
        let settings = get_configuration_with_paths(
            Some(PathBuf::from("/nonexistent")),
            Some(PathBuf::from("/nonexistent")),
        )
        .unwrap();

        assert_eq!(settings.log_level, "info");
        assert!(settings.mafiles_dir.is_none());
        assert_eq!(settings.network.timeout_secs, 30);
        assert_eq!(settings.network.connect_timeout_secs, 10);
        assert_eq!(settings.clock.max_offset_age_secs, 300);
    }

    #[serial]
    #[test]
    fn test_get_configuration_file_override() {
        clear_env();

        let dir = tempdir().unwrap();
        let config_file_path = dir.path().join("config.toml");

        let config_content = r#"
        log_level = "debug"
        mafiles_dir = "/tmp/maFiles"
        network.timeout_secs = 5
        "#;

        let mut file = std::fs::File::create(&config_file_path).unwrap();
        file.write_all(config_content.as_bytes()).unwrap();

        let settings = get_configuration_with_paths(
            Some(dir.path().to_path_buf()),
            Some(PathBuf::from("/nonexistent")),
        )
        .unwrap();

        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.mafiles_dir, Some(PathBuf::from("/tmp/maFiles")));
        assert_eq!(settings.network.timeout_secs, 5);
        // Untouched values keep their defaults.
        assert_eq!(settings.clock.max_offset_age_secs, 300);
    }

    #[serial]
    #[test]
    fn test_get_configuration_env_override() {
        clear_env();

        std::env::set_var("VIGIL__LOG_LEVEL", "trace");
        std::env::set_var("VIGIL__CLOCK__MAX_OFFSET_AGE_SECS", "60");

        let settings = get_configuration_with_paths(
            Some(PathBuf::from("/nonexistent")),
            Some(PathBuf::from("/nonexistent")),
        )
        .unwrap();

        assert_eq!(settings.log_level, "trace");
        assert_eq!(settings.clock.max_offset_age_secs, 60);

        std::env::remove_var("VIGIL__LOG_LEVEL");
        std::env::remove_var("VIGIL__CLOCK__MAX_OFFSET_AGE_SECS");
    }

    #[serial]
    #[test]
    fn test_get_configuration_precedence_env_over_file() {
        clear_env();

        let dir = tempdir().unwrap();
        let config_file_path = dir.path().join("config.toml");

        let config_content = r#"
        log_level = "debug"
        "#;

        let mut file = std::fs::File::create(&config_file_path).unwrap();
        file.write_all(config_content.as_bytes()).unwrap();

        std::env::set_var("VIGIL__LOG_LEVEL", "trace");

        let settings = get_configuration_with_paths(
            Some(dir.path().to_path_buf()),
            Some(PathBuf::from("/nonexistent")),
        )
        .unwrap();

        // Environment variables take precedence over file settings.
        assert_eq!(settings.log_level, "trace");

        std::env::remove_var("VIGIL__LOG_LEVEL");
    }
}
