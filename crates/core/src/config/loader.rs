use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides.
///
/// Environment variables use the `GLACIER_RESTORE_` prefix and `__` as the
/// section separator, e.g. `GLACIER_RESTORE_RESTORE__WORKER_POOL_SIZE=8`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("GLACIER_RESTORE_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailBackend;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[restore]
worker_pool_size = 8

[mail]
backend = "log"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.restore.worker_pool_size, 8);
        assert_eq!(config.mail.backend, MailBackend::Log);
    }

    #[test]
    fn test_load_config_from_str_bad_type() {
        let toml = r#"
[restore]
worker_pool_size = "many"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/glacier-restore.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[store]
region = "eu-west-1"

[batch]
path = "/data/restore_list.csv"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.store.region.as_deref(), Some("eu-west-1"));
        assert_eq!(
            config.batch.path.to_str().unwrap(),
            "/data/restore_list.csv"
        );
    }
}
