use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub provider_timeout_ms: u64,
    pub default_provider_confidence: f32,
    pub disambiguation: bool,
    pub llm_model: Option<String>,
    pub ocr_language: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider_timeout_ms: 8_000,
            default_provider_confidence: 70.0,
            disambiguation: true,
            llm_model: None,
            ocr_language: "eng".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    recognition: Option<RecognitionSettings>,
    disambiguation: Option<DisambiguationSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct RecognitionSettings {
    timeout_ms: Option<u64>,
    default_confidence: Option<f32>,
    language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DisambiguationSettings {
    enabled: Option<bool>,
    model: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(recognition) = incoming.recognition {
            if let Some(timeout) = recognition.timeout_ms {
                if timeout > 0 {
                    self.provider_timeout_ms = timeout;
                }
            }
            if let Some(confidence) = recognition.default_confidence {
                if (0.0..=100.0).contains(&confidence) {
                    self.default_provider_confidence = confidence;
                }
            }
            if let Some(language) = recognition.language {
                if !language.trim().is_empty() {
                    self.ocr_language = language;
                }
            }
        }
        if let Some(disambiguation) = incoming.disambiguation {
            if let Some(enabled) = disambiguation.enabled {
                self.disambiguation = enabled;
            }
            if let Some(model) = disambiguation.model {
                if !model.trim().is_empty() {
                    self.llm_model = Some(model);
                }
            }
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".mathsnap"))
        }
    })
}
