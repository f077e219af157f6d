use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Model presets offered in the settings form. Any other model id typed into
/// the config file is accepted as-is.
pub const MODEL_PRESETS: &[&str] = &[
    "Qwen/Qwen2.5-7B-Instruct",
    "Qwen/Qwen2.5-14B-Instruct",
    "Qwen/Qwen2.5-32B-Instruct",
    "deepseek-ai/DeepSeek-V2.5",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetLang {
    Chinese,
    English,
    Japanese,
}

impl TargetLang {
    pub const ALL: [TargetLang; 3] = [TargetLang::Chinese, TargetLang::English, TargetLang::Japanese];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetLang::Chinese => "Chinese",
            TargetLang::English => "English",
            TargetLang::Japanese => "Japanese",
        }
    }

    pub fn parse(s: &str) -> Option<TargetLang> {
        Self::ALL.iter().copied().find(|l| l.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for TargetLang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub auto_translate: bool,
    pub target_lang: TargetLang,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: "https://api.siliconflow.cn".to_string(),
            model: MODEL_PRESETS[0].to_string(),
            auto_translate: true,
            target_lang: TargetLang::Chinese,
        }
    }
}

impl Config {
    pub fn path() -> PathBuf {
        let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("."));
        let dir = exe.parent().unwrap_or(Path::new("."));
        dir.join("config.json")
    }

    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => serde_json::from_str::<Config>(&s).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let s = serde_json::to_string_pretty(self)?;
        fs::write(path, s)?;
        Ok(())
    }

    /// Environment variables win over the persisted file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SCHOLARTRANS_API_KEY") {
            if !v.is_empty() {
                self.api_key = v;
            }
        }
        if let Some(v) = lookup("SCHOLARTRANS_API_URL") {
            if !v.is_empty() {
                self.api_url = v;
            }
        }
        if let Some(v) = lookup("SCHOLARTRANS_MODEL") {
            if !v.is_empty() {
                self.model = v;
            }
        }
        if let Some(v) = lookup("SCHOLARTRANS_TARGET_LANG") {
            if let Some(lang) = TargetLang::parse(&v) {
                self.target_lang = lang;
            }
        }
    }
}
