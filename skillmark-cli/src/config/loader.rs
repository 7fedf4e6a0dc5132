use super::types::{
    RawAutoGradeConfig, RawGradingConfig, RawPreviewConfig, RawScorerConfig, RawShareCodeConfig,
};
use anyhow::{Context, Result};
use skillmark_grading::{
    AutoGradeConfig, GradingConfig, PreviewConfig, ScorerConfig, ShareCodeConfig, UserId,
};
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<GradingConfig> {
        Self::load_from_paths(Some(&Self::user_config_path()), &Self::project_config_path())
    }

    /// Load and merge the given layers; missing files are skipped
    pub fn load_from_paths(user: Option<&Path>, project: &Path) -> Result<GradingConfig> {
        let mut raw = RawGradingConfig::default();

        // Layer 1: User config
        if let Some(user_path) = user
            && user_path.exists()
        {
            raw = Self::merge_raw(raw, Self::read_raw(user_path)?);
        }

        // Layer 2: Project config
        if project.exists() {
            raw = Self::merge_raw(raw, Self::read_raw(project)?);
        }

        Ok(Self::finalize(raw))
    }

    fn read_raw(path: &Path) -> Result<RawGradingConfig> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Get user config path (`$XDG_CONFIG_HOME/skillmark/config.toml`)
    pub fn user_config_path() -> PathBuf {
        skillmark_paths::config_dir().join("config.toml")
    }

    /// Get project config path
    /// Can be overridden with SKILLMARK_PROJECT_CONFIG_DIR env var (useful for isolated tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("SKILLMARK_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".skillmark/config.toml")
        }
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawGradingConfig, overlay: RawGradingConfig) -> RawGradingConfig {
        RawGradingConfig {
            share_codes: RawShareCodeConfig {
                ttl_days: overlay.share_codes.ttl_days.or(base.share_codes.ttl_days),
                max_attempts: overlay
                    .share_codes
                    .max_attempts
                    .or(base.share_codes.max_attempts),
            },
            preview: RawPreviewConfig {
                enabled: overlay.preview.enabled.or(base.preview.enabled),
                max_requests: overlay.preview.max_requests.or(base.preview.max_requests),
            },
            scorer: RawScorerConfig {
                timeout_seconds: overlay
                    .scorer
                    .timeout_seconds
                    .or(base.scorer.timeout_seconds),
                fallback_feedback: overlay
                    .scorer
                    .fallback_feedback
                    .or(base.scorer.fallback_feedback),
            },
            auto_grade: RawAutoGradeConfig {
                enabled: overlay.auto_grade.enabled.or(base.auto_grade.enabled),
                system_grader_id: overlay
                    .auto_grade
                    .system_grader_id
                    .or(base.auto_grade.system_grader_id),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawGradingConfig) -> GradingConfig {
        let share_codes = ShareCodeConfig::default();
        let preview = PreviewConfig::default();
        let scorer = ScorerConfig::default();
        let auto_grade = AutoGradeConfig::default();

        GradingConfig {
            share_codes: ShareCodeConfig {
                ttl_days: raw.share_codes.ttl_days.unwrap_or(share_codes.ttl_days),
                max_attempts: raw
                    .share_codes
                    .max_attempts
                    .unwrap_or(share_codes.max_attempts),
            },
            preview: PreviewConfig {
                enabled: raw.preview.enabled.unwrap_or(preview.enabled),
                max_requests: raw.preview.max_requests.unwrap_or(preview.max_requests),
            },
            scorer: ScorerConfig {
                timeout_seconds: raw.scorer.timeout_seconds.unwrap_or(scorer.timeout_seconds),
                fallback_feedback: raw
                    .scorer
                    .fallback_feedback
                    .unwrap_or(scorer.fallback_feedback),
            },
            auto_grade: AutoGradeConfig {
                enabled: raw.auto_grade.enabled.unwrap_or(auto_grade.enabled),
                system_grader_id: raw
                    .auto_grade
                    .system_grader_id
                    .map(UserId)
                    .unwrap_or(auto_grade.system_grader_id),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_no_files_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigLoader::load_from_paths(
            Some(&temp_dir.path().join("missing-user.toml")),
            &temp_dir.path().join("missing-project.toml"),
        )
        .unwrap();
        assert_eq!(config, GradingConfig::default());
    }

    #[test]
    fn test_project_overrides_user_per_field() {
        let temp_dir = TempDir::new().unwrap();
        let user = write(
            &temp_dir,
            "user.toml",
            "[share_codes]\nttl_days = 14\nmax_attempts = 20\n\n[auto_grade]\nsystem_grader_id = 7\n",
        );
        let project = write(&temp_dir, "project.toml", "[share_codes]\nttl_days = 3\n");

        let config = ConfigLoader::load_from_paths(Some(&user), &project).unwrap();
        assert_eq!(config.share_codes.ttl_days, 3);
        // Unset in the project layer, so the user value survives.
        assert_eq!(config.share_codes.max_attempts, 20);
        assert_eq!(config.auto_grade.system_grader_id, UserId(7));
        assert_eq!(config.preview.max_requests, 3);
    }

    #[test]
    fn test_explicit_false_overrides_true() {
        let temp_dir = TempDir::new().unwrap();
        let user = write(&temp_dir, "user.toml", "[preview]\nenabled = true\n");
        let project = write(&temp_dir, "project.toml", "[preview]\nenabled = false\n");

        let config = ConfigLoader::load_from_paths(Some(&user), &project).unwrap();
        assert!(!config.preview.enabled);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let project = write(&temp_dir, "project.toml", "[preview\nenabled = ");
        assert!(ConfigLoader::load_from_paths(None, &project).is_err());
    }

    #[test]
    #[serial]
    fn test_project_path_env_override() {
        let temp_dir = TempDir::new().unwrap();
        // SAFETY: serialized with every other env-mutating test.
        unsafe { std::env::set_var("SKILLMARK_PROJECT_CONFIG_DIR", temp_dir.path()) };
        let path = ConfigLoader::project_config_path();
        unsafe { std::env::remove_var("SKILLMARK_PROJECT_CONFIG_DIR") };

        assert_eq!(path, temp_dir.path().join("config.toml"));
        assert_eq!(
            ConfigLoader::project_config_path(),
            PathBuf::from(".skillmark/config.toml")
        );
    }
}
