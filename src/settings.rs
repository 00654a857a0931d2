use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;

const SETTINGS_FILENAME: &str = "settings.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_address: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub upload_dir: PathBuf,
    pub jwt_secret: String,
    pub jwt_expiry_minutes: i64,
    pub max_file_uploads: usize,
    /// Upper bound on a whole task-creation request body, attachments included.
    pub max_upload_bytes: usize,
    pub allowed_extensions: Vec<String>,
    pub task_page_size: u64,
    pub default_admin_email: String,
    pub default_admin_password: String,
    pub revocation_sweep_seconds: u64,
    /// Frontend origin allowed by CORS. Any origin when unset.
    pub cors_origin: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            bind_address: "0.0.0.0".into(),
            port: 5000,
            database_path: "taskdesk.redb".into(),
            upload_dir: "uploads".into(),
            jwt_secret: "change-me".into(),
            jwt_expiry_minutes: 60,
            max_file_uploads: 3,
            max_upload_bytes: 32 * 1024 * 1024,
            allowed_extensions: vec!["pdf".into()],
            task_page_size: 5,
            default_admin_email: "admin@example.com".into(),
            default_admin_password: "admin".into(),
            revocation_sweep_seconds: 300,
            cors_origin: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read settings file {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("cannot parse settings file {path}: {source}")]
    Parse { path: String, source: serde_json::Error },

    #[error("invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },
}

impl Settings {
    /// Load from `TASKDESK_SETTINGS` (or `settings.json`), then apply
    /// environment overrides. A missing file means all defaults.
    pub fn load() -> Result<Settings, SettingsError> {
        let path = env::var("TASKDESK_SETTINGS").unwrap_or_else(|_| SETTINGS_FILENAME.to_string());

        let mut settings = match fs::read_to_string(&path) {
            Ok(content) => Self::from_json(&content)
                .map_err(|source| SettingsError::Parse { path: path.clone(), source })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(%path, "settings file not found, using defaults");
                Settings::default()
            }
            Err(source) => return Err(SettingsError::Read { path, source }),
        };

        settings.apply_overrides(|var| env::var(var).ok())?;
        Ok(settings)
    }

    pub fn from_json(content: &str) -> Result<Settings, serde_json::Error> {
        serde_json::from_str(content)
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<(), SettingsError> {
        if let Some(secret) = lookup("TASKDESK_JWT_SECRET") {
            self.jwt_secret = secret;
        }
        if let Some(bind) = lookup("TASKDESK_BIND") {
            self.bind_address = bind;
        }
        if let Some(port) = lookup("TASKDESK_PORT") {
            self.port = port
                .parse()
                .map_err(|_| SettingsError::Env { var: "TASKDESK_PORT", value: port })?;
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_file_keeps_defaults() {
        let s = Settings::from_json(r#"{"port": 8080, "task_page_size": 20}"#).unwrap();
        assert_eq!(s.port, 8080);
        assert_eq!(s.task_page_size, 20);
        assert_eq!(s.max_file_uploads, 3);
        assert_eq!(s.max_upload_bytes, 32 * 1024 * 1024);
        assert_eq!(s.allowed_extensions, vec!["pdf".to_string()]);
        assert_eq!(s.jwt_expiry_minutes, 60);
        assert!(s.cors_origin.is_none());
    }

    #[test]
    fn environment_wins_over_file() {
        let env: HashMap<&str, &str> =
            [("TASKDESK_JWT_SECRET", "s3cret"), ("TASKDESK_PORT", "9000")].into();
        let mut s = Settings::default();
        s.apply_overrides(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(s.jwt_secret, "s3cret");
        assert_eq!(s.port, 9000);
        assert_eq!(s.socket_addr(), "0.0.0.0:9000");
    }

    #[test]
    fn bad_port_override_is_an_error() {
        let mut s = Settings::default();
        let err = s
            .apply_overrides(|k| (k == "TASKDESK_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(matches!(err, SettingsError::Env { var: "TASKDESK_PORT", .. }));
    }
}
