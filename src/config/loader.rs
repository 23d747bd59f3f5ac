use crate::config::schema::ConsoleConfig;
use crate::error::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use validator::Validate;

pub const ENV_PREFIX: &str = "EXAM_CONSOLE";

/// Values that may be supplied through `EXAM_CONSOLE_*` environment variables.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct EnvOverrides {
    pub api_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub token: Option<String>,
    pub token_path: Option<PathBuf>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ConsoleConfig> {
        let path = path.as_ref();
        let mut visited = HashSet::new();
        let merged = Self::load_with_inheritance(path, &mut visited)?;

        let mut config: ConsoleConfig = serde_json::from_value(merged)?;
        config.extends = None;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise defaults, then layers the environment on top.
    pub fn resolve(path: Option<&Path>) -> Result<ConsoleConfig> {
        let config = match path {
            Some(path) => Self::load(path)?,
            None => ConsoleConfig::default(),
        };
        let config = Self::apply_overrides(config, Self::env_overrides()?);
        config.validate()?;
        Ok(config)
    }

    pub fn env_overrides() -> Result<EnvOverrides> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize::<EnvOverrides>())
            .map_err(|e| Error::Config(format!("environment: {}", e)))
    }

    pub fn apply_overrides(mut config: ConsoleConfig, overrides: EnvOverrides) -> ConsoleConfig {
        if let Some(url) = overrides.api_url {
            config.api.base_url = url;
        }
        if let Some(secs) = overrides.timeout_secs {
            config.api.timeout_secs = secs;
        }
        if let Some(token) = overrides.token {
            config.auth.token = Some(token);
        }
        if let Some(path) = overrides.token_path {
            config.auth.token_path = Some(path);
        }
        config
    }

    fn load_with_inheritance(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<Value> {
        let path = fs::canonicalize(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        if visited.contains(&path) {
            return Err(Error::Config(format!(
                "Circular inheritance detected involving {}",
                path.display()
            )));
        }
        visited.insert(path.clone());

        let config = Self::load_file(&path)?;
        let extends = config
            .get("extends")
            .and_then(Value::as_str)
            .map(str::to_owned);

        match extends {
            Some(parent_path_str) => {
                let parent_path = path
                    .parent()
                    .ok_or_else(|| {
                        Error::Config(format!(
                            "Cannot determine parent directory for {}",
                            path.display()
                        ))
                    })?
                    .join(parent_path_str);

                let mut parent = Self::load_with_inheritance(&parent_path, visited)?;
                merge_values(&mut parent, config);
                Ok(parent)
            }
            None => Ok(config),
        }
    }

    fn load_file(path: &Path) -> Result<Value> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        let value: Value = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            _ => {
                return Err(Error::Config(format!(
                    "Unsupported file extension: {}",
                    path.display()
                )));
            }
        };

        if !value.is_object() {
            return Err(Error::Config(format!(
                "{}: top level must be a table",
                path.display()
            )));
        }
        Ok(value)
    }
}

/// Child keys win; tables are merged recursively.
fn merge_values(parent: &mut Value, child: Value) {
    match (parent, child) {
        (Value::Object(parent_map), Value::Object(child_map)) => {
            for (key, child_value) in child_map {
                let nested = child_value.is_object()
                    && parent_map.get(&key).is_some_and(Value::is_object);
                if nested {
                    if let Some(existing) = parent_map.get_mut(&key) {
                        merge_values(existing, child_value);
                    }
                } else {
                    parent_map.insert(key, child_value);
                }
            }
        }
        (parent, child) => *parent = child,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_toml_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "console.toml", "[api]\nbase_url = \"http://exams.local:9000\"\n");

        let config = ConfigLoader::load(&path).unwrap();
        assert_eq!(config.api.base_url, "http://exams.local:9000");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.poller.metrics_interval_ms, 5_000);
        assert_eq!(config.poller.resources_interval_ms, 30_000);
        assert!(config.auth.required);
    }

    #[test]
    fn child_overrides_parent_section_keys() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "base.yaml",
            "application_name: Base\napi:\n  base_url: http://base:8000\n  timeout_secs: 10\n",
        );
        let child = write(
            &dir,
            "child.json",
            r#"{"extends": "base.yaml", "api": {"timeout_secs": 45}}"#,
        );

        let config = ConfigLoader::load(&child).unwrap();
        assert_eq!(config.application_name, "Base");
        assert_eq!(config.api.base_url, "http://base:8000");
        assert_eq!(config.api.timeout_secs, 45);
        assert!(config.extends.is_none());
    }

    #[test]
    fn detects_circular_inheritance() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.json", r#"{"extends": "b.json"}"#);
        write(&dir, "b.json", r#"{"extends": "a.json"}"#);

        let err = ConfigLoader::load(dir.path().join("a.json")).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("Circular")));
    }

    #[test]
    fn rejects_invalid_values() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "bad.json", r#"{"api": {"base_url": "not a url"}}"#);
        assert!(matches!(ConfigLoader::load(&path), Err(Error::Validation(_))));

        let path = write(&dir, "zero.json", r#"{"poller": {"worker_count": 0}}"#);
        assert!(matches!(ConfigLoader::load(&path), Err(Error::Validation(_))));
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "console.ini", "api=1");
        assert!(matches!(ConfigLoader::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn environment_overrides_replace_file_values() {
        let overrides = EnvOverrides {
            api_url: Some("http://override:1234".into()),
            timeout_secs: Some(5),
            token: Some("secret".into()),
            token_path: None,
        };
        let config = ConfigLoader::apply_overrides(ConsoleConfig::default(), overrides);
        assert_eq!(config.api.base_url, "http://override:1234");
        assert_eq!(config.api.timeout_secs, 5);
        assert_eq!(config.auth.token.as_deref(), Some("secret"));
    }
}
