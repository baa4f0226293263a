//! Pipeline configuration
//!
//! Everything the distiller would otherwise hard-code: expansion merge order,
//! target languages, module-group display tokens and the protected wares
//! root. Loaded from TOML; every field has a default matching the stock game.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::{Error, Result};

/// A target language, keyed by the game's numeric language id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Numeric id as it appears in `0001-l<id>.xml` (e.g. `"044"`)
    pub id: String,
    /// Code used for the output locale file name
    pub iso: String,
    /// Display name for the language picker
    pub name: String,
}

impl LanguageConfig {
    fn new(id: &str, iso: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            iso: iso.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Expansion directories under `extensions/`, in merge order
    pub dlc_order: Vec<String>,
    /// Numeric id of the display language used to backfill record names
    pub canonical_language: String,
    /// Absolute path of the wares library root that macro patches may not touch
    pub protected_root: String,
    /// Ware id whose recipes describe workforce upkeep
    pub workforce_ware: String,
    /// Factions whose modules cannot be player-built
    pub unbuildable_factions: Vec<String>,
    /// Maximum nesting of `{page,id}` references followed during resolution
    pub max_token_depth: usize,
    /// Guess a module's faction from race infixes in its macro name when the
    /// macro declares no maker race
    pub infer_faction_from_name: bool,
    /// Languages to resolve, in output order
    pub languages: Vec<LanguageConfig>,
    /// Module type tag → display token for the synthetic module groups
    pub module_types: BTreeMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dlc_order: [
                "ego_dlc_split",
                "ego_dlc_terran",
                "ego_dlc_pirate",
                "ego_dlc_boron",
                "ego_dlc_timelines",
                "ego_dlc_mini_01",
                "ego_dlc_mini_02",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            languages: vec![
                LanguageConfig::new("044", "en", "English"),
                LanguageConfig::new("049", "de", "Deutsch"),
                LanguageConfig::new("033", "fr", "Français"),
                LanguageConfig::new("039", "it", "Italiano"),
                LanguageConfig::new("034", "es", "Español"),
                LanguageConfig::new("007", "ru", "Русский"),
                LanguageConfig::new("081", "ja", "日本語"),
                LanguageConfig::new("082", "ko", "한국어"),
                LanguageConfig::new("086", "zh-CN", "简体中文"),
                LanguageConfig::new("088", "zh-TW", "繁體中文"),
                LanguageConfig::new("055", "pt-BR", "Português (Brasil)"),
                LanguageConfig::new("048", "pl", "Polski"),
            ],
            canonical_language: "044".to_string(),
            module_types: [
                ("production", "Production"),
                ("storage", "Storage"),
                ("habitation", "Habitation"),
                ("defense", "Defence"),
                ("dock", "Docking"),
                ("other", "Other"),
            ]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
            protected_root: "/wares".to_string(),
            workforce_ware: "workunit_busy".to_string(),
            unbuildable_factions: ["xenon", "khaak", "unknown"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_token_depth: 5,
            infer_faction_from_name: false,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file; absent keys take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Check cross-field consistency
    pub fn validate(&self) -> Result<()> {
        if self.max_token_depth == 0 {
            return Err(Error::Config("max_token_depth must be at least 1".to_string()));
        }
        if self.protected_root.trim_matches('/').trim().is_empty() {
            return Err(Error::Config("protected_root must name an element".to_string()));
        }
        if let Some(dup) = first_duplicate(self.languages.iter().map(|l| l.id.as_str())) {
            return Err(Error::Config(format!("language id {} listed twice", dup)));
        }
        if let Some(dup) = first_duplicate(self.dlc_order.iter().map(|s| s.as_str())) {
            return Err(Error::Config(format!("expansion {} listed twice in dlc_order", dup)));
        }
        Ok(())
    }

    /// The configured canonical display language, if it is in `languages`
    pub fn canonical(&self) -> Option<&LanguageConfig> {
        self.languages
            .iter()
            .find(|l| l.id == self.canonical_language)
    }

    pub fn is_buildable(&self, faction: &str) -> bool {
        !self.unbuildable_factions.iter().any(|f| f == faction)
    }
}

fn first_duplicate<'a>(items: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut seen = std::collections::HashSet::new();
    items.into_iter().find(|item| !seen.insert(*item))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.canonical().unwrap().iso, "en");
        assert_eq!(config.languages.len(), 12);
        assert_eq!(config.dlc_order.first().map(String::as_str), Some("ego_dlc_split"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
dlc_order = ["ego_dlc_boron", "ego_dlc_split"]

[module_types]
production = "{20104,10001}"
"#,
        )
        .unwrap();

        assert_eq!(config.dlc_order, ["ego_dlc_boron", "ego_dlc_split"]);
        assert_eq!(config.module_types.len(), 1);
        assert_eq!(config.max_token_depth, 5);
        assert_eq!(config.protected_root, "/wares");
        assert!(!config.infer_faction_from_name);
    }

    #[test]
    fn test_languages_from_toml() {
        let config = PipelineConfig::from_toml(
            r#"
canonical_language = "049"

[[languages]]
id = "049"
iso = "de"
name = "Deutsch"
"#,
        )
        .unwrap();
        assert_eq!(config.canonical().unwrap().iso, "de");
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(PipelineConfig::from_toml("max_token_depth = 0").is_err());
        assert!(PipelineConfig::from_toml("protected_root = \"/\"").is_err());
        assert!(PipelineConfig::from_toml("dlc_order = [\"a\", \"a\"]").is_err());
        assert!(PipelineConfig::from_toml("dlc_order = 3").is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = PipelineConfig::default();
        let text = config.to_toml().unwrap();
        assert_eq!(PipelineConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_buildable_factions() {
        let config = PipelineConfig::default();
        assert!(config.is_buildable("argon"));
        assert!(config.is_buildable("default"));
        assert!(!config.is_buildable("xenon"));
        assert!(!config.is_buildable("khaak"));
    }
}
