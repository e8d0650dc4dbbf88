use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::access::AdminBypass;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub store: Store,
    #[serde(default)]
    pub access: Access,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// One JSON file per policy key under `store.path`
    File,
    /// Process-local, lost on restart
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    pub backend: Backend,
    /// Directory of the file backend. Default: data/policies
    pub path: PathBuf,
    /// Optional KDL file merged into the store at startup
    pub seed_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Access {
    /// Administrators always pass the dashboard check
    #[serde(default = "default_admin_bypass_dashboard")]
    pub admin_bypass_dashboard: bool,
    /// Administrators also pass level/jlpt rules (a disabled module still denies)
    #[serde(default)]
    pub admin_bypass_content: bool,
}

fn default_admin_bypass_dashboard() -> bool {
    true
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self {
            backend: Backend::File,
            path: PathBuf::from("data/policies"),
            seed_file: None,
        }
    }
}

impl Default for Access {
    fn default() -> Self {
        Self {
            admin_bypass_dashboard: true,
            admin_bypass_content: false,
        }
    }
}

impl Access {
    pub fn bypass(&self) -> AdminBypass {
        AdminBypass {
            dashboard: self.admin_bypass_dashboard,
            content: self.admin_bypass_content,
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("server.host", Server::default().host)
            .into_diagnostic()?
            .set_default("server.port", Server::default().port)
            .into_diagnostic()?
            .set_default("store.backend", "file")
            .into_diagnostic()?
            .set_default(
                "store.path",
                Store::default().path.to_string_lossy().to_string(),
            )
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: LEVELGATE__SERVER__PORT=9090, etc.
        builder =
            builder.add_source(config::Environment::with_prefix("LEVELGATE").separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        let mut s: Settings = cfg.try_deserialize().into_diagnostic()?;

        // Normalize store paths to be relative to current dir
        if s.store.path.is_relative() {
            s.store.path = std::env::current_dir()
                .into_diagnostic()?
                .join(&s.store.path);
        }
        if let Some(seed) = s.store.seed_file.as_mut() {
            if seed.is_relative() {
                *seed = std::env::current_dir().into_diagnostic()?.join(&*seed);
            }
        }

        Ok(s)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_settings_load_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("nonexistent.toml");

        let settings = Settings::load(config_path.to_str().unwrap())
            .expect("Failed to load settings");

        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.store.backend, Backend::File);
        assert!(settings.store.path.ends_with("data/policies"));
        assert!(settings.store.seed_file.is_none());
        assert_eq!(settings.access.bypass(), AdminBypass::default());
    }

    #[test]
    fn test_settings_load_from_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("test_config.toml");

        let config_content = r#"
[server]
host = "127.0.0.1"
port = 9090

[store]
backend = "memory"
path = "/var/lib/levelgate"
seed_file = "/etc/levelgate/policies.kdl"

[access]
admin_bypass_content = true
"#;
        fs::write(&config_path, config_content).expect("Failed to write config");

        let settings = Settings::load(config_path.to_str().unwrap())
            .expect("Failed to load settings");

        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.store.backend, Backend::Memory);
        assert_eq!(settings.store.path, PathBuf::from("/var/lib/levelgate"));
        assert_eq!(
            settings.store.seed_file,
            Some(PathBuf::from("/etc/levelgate/policies.kdl"))
        );
        let bypass = settings.access.bypass();
        assert!(bypass.content);
        assert!(bypass.dashboard);
    }

    #[test]
    fn test_settings_env_override() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("test_config.toml");

        let config_content = r#"
[server]
host = "127.0.0.1"
port = 8080
"#;
        fs::write(&config_path, config_content).expect("Failed to write config");

        env::set_var("LEVELGATE__SERVER__PORT", "9999");

        // env should override file
        let settings = Settings::load(config_path.to_str().unwrap())
            .expect("Failed to load settings");

        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9999);

        env::remove_var("LEVELGATE__SERVER__PORT");
    }

    #[test]
    fn test_settings_path_normalization() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("test_config.toml");

        let config_content = r#"
[store]
path = "relative/policies"
seed_file = "relative/seed.kdl"
"#;
        fs::write(&config_path, config_content).expect("Failed to write config");

        let settings = Settings::load(config_path.to_str().unwrap())
            .expect("Failed to load settings");

        assert!(settings.store.path.is_absolute());
        assert!(settings.store.path.ends_with("relative/policies"));
        let seed = settings.store.seed_file.unwrap();
        assert!(seed.is_absolute());
        assert!(seed.ends_with("relative/seed.kdl"));
    }

    #[test]
    fn test_listen_addr() {
        let mut settings = Settings::default();
        settings.server.host = "localhost".to_string();
        settings.server.port = 3000;
        assert_eq!(settings.listen_addr(), "localhost:3000");
    }
}
