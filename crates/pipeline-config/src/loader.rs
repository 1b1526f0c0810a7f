//! Loader for configurations split across several files.
//!
//! A root file may name other files in an `include` key (a string or an array
//! of strings, resolved relative to the root file's directory). Included files
//! are merged at the top level; a section defined in two files is an error.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub struct ConfigLoader {
	base_path: PathBuf,
	/// Canonical paths already read, to reject include cycles.
	loaded_files: HashSet<PathBuf>,
	/// Top-level section name -> file that defined it.
	section_sources: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			loaded_files: HashSet::new(),
			section_sources: HashMap::new(),
		}
	}

	/// Loads the root file and its includes, then parses and validates.
	pub async fn load_config(&mut self, config_path: impl AsRef<Path>) -> Result<Config, ConfigError> {
		let root_path = self.resolve_path(config_path)?;
		let root_content = self.read_file(&root_path).await?;
		let mut merged: toml::Table = toml::from_str(&root_content)?;

		let includes = match merged.remove("include") {
			Some(value) => parse_includes(value)?,
			None => Vec::new(),
		};

		if includes.is_empty() {
			return Config::from_resolved(&root_content);
		}

		for key in merged.keys() {
			self.section_sources.insert(key.clone(), root_path.clone());
		}

		for include in includes {
			let include_path = self.resolve_path(&include)?;
			let content = self.read_file(&include_path).await?;
			let table: toml::Table = toml::from_str(&content)?;

			for (key, value) in table {
				if let Some(existing) = self.section_sources.get(&key) {
					return Err(ConfigError::Validation(format!(
						"Duplicate section '{}' found in {} and {}",
						key,
						existing.display(),
						include_path.display()
					)));
				}
				self.section_sources.insert(key.clone(), include_path.clone());
				merged.insert(key, value);
			}
		}

		let combined = toml::to_string(&merged)
			.map_err(|e| ConfigError::Parse(format!("Failed to serialize combined config: {}", e)))?;
		Config::from_resolved(&combined)
	}

	/// Reads a file once, with environment variables resolved.
	async fn read_file(&mut self, path: &Path) -> Result<String, ConfigError> {
		let canonical = tokio::fs::canonicalize(path).await?;
		if !self.loaded_files.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical.display()
			)));
		}

		let content = tokio::fs::read_to_string(path).await?;
		resolve_env_vars(&content)
	}

	fn resolve_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
		let path = path.as_ref();
		let resolved = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};

		if !resolved.exists() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)));
		}

		Ok(resolved)
	}
}

fn parse_includes(value: toml::Value) -> Result<Vec<PathBuf>, ConfigError> {
	match value {
		toml::Value::String(path) => Ok(vec![PathBuf::from(path)]),
		toml::Value::Array(items) => items
			.into_iter()
			.map(|item| match item {
				toml::Value::String(path) => Ok(PathBuf::from(path)),
				_ => Err(ConfigError::Validation(
					"Include array must contain only strings".into(),
				)),
			})
			.collect(),
		_ => Err(ConfigError::Validation(
			"Include must be a string or array of strings".into(),
		)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	const BROKER: &str = r#"
[broker]
primary = "memory"
[broker.implementations.memory]
"#;

	const STATE: &str = r#"
[state]
primary = "memory"
[state.implementations.memory]
"#;

	#[tokio::test]
	async fn test_single_file_config() {
		let temp_dir = TempDir::new().unwrap();
		let config_path = temp_dir.path().join("config.toml");
		fs::write(
			&config_path,
			format!("[service]\nid = \"worker-a\"\n{}{}", BROKER, STATE),
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config("config.toml").await.unwrap();
		assert_eq!(config.service.id, "worker-a");
	}

	#[tokio::test]
	async fn test_config_with_includes() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			"include = [\"broker.toml\", \"state.toml\"]\n[service]\nid = \"split\"\n",
		)
		.unwrap();
		fs::write(temp_dir.path().join("broker.toml"), BROKER).unwrap();
		fs::write(temp_dir.path().join("state.toml"), STATE).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config("main.toml").await.unwrap();
		assert_eq!(config.service.id, "split");
		assert_eq!(config.broker.primary, "memory");
		assert_eq!(config.state.primary, "memory");
	}

	#[tokio::test]
	async fn test_duplicate_section_rejected() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			format!("include = \"extra.toml\"\n{}{}", BROKER, STATE),
		)
		.unwrap();
		fs::write(temp_dir.path().join("extra.toml"), BROKER).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let err = loader.load_config("main.toml").await.unwrap_err();
		assert!(err.to_string().contains("Duplicate section 'broker'"));
	}

	#[tokio::test]
	async fn test_circular_include_rejected() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			format!("include = [\"main.toml\"]\n{}{}", BROKER, STATE),
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let err = loader.load_config("main.toml").await.unwrap_err();
		assert!(err.to_string().contains("Circular include"));
	}

	#[tokio::test]
	async fn test_env_values_are_resolved_once() {
		std::env::set_var("PIPELINE_TEST_LITERAL_SERVICE_ID", "${PIPELINE_TEST_NEVER_SET}");

		let temp_dir = TempDir::new().unwrap();
		let service = "[service]\nid = \"${PIPELINE_TEST_LITERAL_SERVICE_ID}\"\n";
		fs::write(
			temp_dir.path().join("single.toml"),
			format!("{}{}{}", service, BROKER, STATE),
		)
		.unwrap();
		fs::write(
			temp_dir.path().join("split.toml"),
			format!("include = \"parts.toml\"\n{}", service),
		)
		.unwrap();
		fs::write(temp_dir.path().join("parts.toml"), format!("{}{}", BROKER, STATE)).unwrap();

		let single = ConfigLoader::new(temp_dir.path())
			.load_config("single.toml")
			.await
			.unwrap();
		let split = ConfigLoader::new(temp_dir.path())
			.load_config("split.toml")
			.await
			.unwrap();

		std::env::remove_var("PIPELINE_TEST_LITERAL_SERVICE_ID");
		assert_eq!(single.service.id, "${PIPELINE_TEST_NEVER_SET}");
		assert_eq!(split.service.id, "${PIPELINE_TEST_NEVER_SET}");
	}

	#[tokio::test]
	async fn test_missing_file() {
		let temp_dir = TempDir::new().unwrap();
		let mut loader = ConfigLoader::new(temp_dir.path());
		assert!(matches!(
			loader.load_config("absent.toml").await,
			Err(ConfigError::Io(_))
		));
	}

	#[tokio::test]
	async fn test_from_file_entry_point() {
		let temp_dir = TempDir::new().unwrap();
		let config_path = temp_dir.path().join("pipeline.toml");
		fs::write(&config_path, format!("{}{}", BROKER, STATE)).unwrap();

		let config = Config::from_file(config_path.to_str().unwrap()).await.unwrap();
		assert_eq!(config.broker.topic, "orders");
	}
}
