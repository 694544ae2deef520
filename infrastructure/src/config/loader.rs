//! Configuration file loader with multi-source merging

use super::file_config::FileConfig;
use super::validation::ConfigIssue;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable prefix; nested keys are separated by `__`
/// (`TOOLGATE_GUARD__MAX_TOTAL_TOOL_CALLS=20`).
pub const ENV_PREFIX: &str = "TOOLGATE_";

const PROJECT_CONFIG_FILES: [&str; 2] = ["toolgate.toml", ".toolgate.toml"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Configuration is invalid:\n{}", format_issues(.0))]
    Invalid(Vec<ConfigIssue>),
}

fn format_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("  {}", issue))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Configuration loader that handles file discovery and merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources with proper priority
    ///
    /// Priority (highest to lowest):
    /// 1. `TOOLGATE_*` environment variables
    /// 2. Explicit config path (if provided)
    /// 3. Project root: `./toolgate.toml` or `./.toolgate.toml`
    /// 4. Global: `$XDG_CONFIG_HOME/toolgate/config.toml`
    /// 5. Default values
    pub fn load(config_path: Option<&PathBuf>) -> Result<FileConfig, ConfigError> {
        if let Some(path) = config_path
            && !path.exists()
        {
            return Err(ConfigError::NotFound(path.clone()));
        }

        Self::figment(
            Self::global_config_path().as_deref(),
            Path::new("."),
            config_path.map(PathBuf::as_path),
        )
        .extract()
        .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// [`load`](Self::load), then reject configurations with error-level issues.
    ///
    /// Warnings are returned alongside the config for the caller to report.
    pub fn load_validated(
        config_path: Option<&PathBuf>,
    ) -> Result<(FileConfig, Vec<ConfigIssue>), ConfigError> {
        let config = Self::load(config_path)?;
        let issues = config.validate();
        if issues.iter().any(ConfigIssue::is_error) {
            return Err(ConfigError::Invalid(issues));
        }
        Ok((config, issues))
    }

    fn figment(global: Option<&Path>, project_dir: &Path, explicit: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));

        if let Some(global_path) = global
            && global_path.exists()
        {
            figment = figment.merge(Toml::file(global_path));
        }

        if let Some(path) = Self::find_project_config(project_dir) {
            figment = figment.merge(Toml::file(path));
        }

        if let Some(path) = explicit {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn find_project_config(dir: &Path) -> Option<PathBuf> {
        PROJECT_CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
    }

    /// Load only default configuration (for --no-config)
    pub fn load_defaults() -> FileConfig {
        FileConfig::default()
    }

    /// Get the global config file path
    ///
    /// `$XDG_CONFIG_HOME/toolgate/config.toml`, falling back to the
    /// platform config directory.
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("toolgate").join("config.toml"))
    }

    /// Get the project-level config file path (if it exists)
    pub fn project_config_path() -> Option<PathBuf> {
        Self::find_project_config(Path::new("."))
    }

    /// Print the config file locations being used (for debugging)
    pub fn print_config_sources(config_path: Option<&PathBuf>) {
        println!("Configuration sources (in priority order):");

        let env_vars: Vec<String> = std::env::vars()
            .map(|(key, _)| key)
            .filter(|key| key.starts_with(ENV_PREFIX))
            .collect();
        if env_vars.is_empty() {
            println!("  [     ] Env:      {}*", ENV_PREFIX);
        } else {
            println!("  [FOUND] Env:      {}", env_vars.join(", "));
        }

        if let Some(path) = config_path {
            let mark = if path.exists() { "FOUND" } else { "MISSING" };
            println!("  [{:5}] Explicit: {}", mark, path.display());
        }

        match Self::project_config_path() {
            Some(path) => println!("  [FOUND] Project:  {}", path.display()),
            None => println!("  [     ] Project:  ./toolgate.toml or ./.toolgate.toml"),
        }

        if let Some(path) = Self::global_config_path() {
            if path.exists() {
                println!("  [FOUND] Global:   {}", path.display());
            } else {
                println!("  [     ] Global:   {}", path.display());
            }
        }

        println!("  [     ] Default:  built-in defaults");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn extract(global: Option<&Path>, dir: &Path, explicit: Option<&Path>) -> FileConfig {
        ConfigLoader::figment(global, dir, explicit).extract().unwrap()
    }

    #[test]
    fn test_load_defaults() {
        let config = ConfigLoader::load_defaults();
        assert_eq!(config.guard.max_identical_tool_calls, 3);
        assert_eq!(config.guard.max_total_tool_calls, 10);
        assert!(config.projects.is_empty());
    }

    #[test]
    fn test_global_config_path_returns_some() {
        let path = ConfigLoader::global_config_path();
        assert!(path.is_some());
        assert!(path.unwrap().to_string_lossy().contains("toolgate"));
    }

    #[test]
    fn test_sources_merge_in_priority_order() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.toml");
        fs::write(
            &global,
            "[guard]\nmax_identical_tool_calls = 5\nmax_total_tool_calls = 50\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("toolgate.toml"),
            "[guard]\nmax_total_tool_calls = 20\n",
        )
        .unwrap();
        let explicit = dir.path().join("explicit.toml");
        fs::write(&explicit, "[aggregation]\nprovider_timeout_secs = 7\n").unwrap();

        let config = extract(Some(&global), dir.path(), Some(&explicit));
        assert_eq!(config.guard.max_identical_tool_calls, 5);
        assert_eq!(config.guard.max_total_tool_calls, 20);
        assert_eq!(config.aggregation.provider_timeout_secs, 7);
        assert_eq!(config.aggregation.request_timeout_secs, 60);
    }

    #[test]
    fn test_hidden_project_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(".toolgate.toml"),
            "[[projects]]\nid = \"p\"\nmarketplace_apps = [\"slack\"]\n",
        )
        .unwrap();

        let config = extract(None, dir.path(), None);
        assert_eq!(config.projects.len(), 1);
        assert_eq!(config.projects[0].marketplace_apps, vec!["slack"]);
    }

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = extract(Some(&dir.path().join("nope.toml")), dir.path(), None);
        assert_eq!(config, FileConfig::default());
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let err = ConfigLoader::load(Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(path) if path == missing));
    }

    #[test]
    fn test_invalid_error_lists_issues() {
        let config: FileConfig = toml::from_str("[guard]\nmax_total_tool_calls = 0\n").unwrap();
        let err = ConfigError::Invalid(config.validate());
        assert!(err.to_string().contains("guard.max_total_tool_calls"));
    }
}
