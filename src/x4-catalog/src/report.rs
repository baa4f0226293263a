//! Run diagnostics
//!
//! Classification coverage and type-mapping problems collected during a run.
//! Printed at the end; never written into the catalog output.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::catalog::ModuleBlueprint;

/// Placeholder key for macros that carry no `class` attribute
pub const MISSING_CLASS: &str = "<missing>";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    /// Unrecognized macro class → module ids
    pub unknown_types: BTreeMap<String, Vec<String>>,
    /// Module type with no configured group token → module ids
    pub unconfigured_types: BTreeMap<String, Vec<String>>,
    /// Module stubs with no usable macro document
    pub missing_documents: Vec<String>,
    /// `module: ware/method` queue items that matched no recipe
    pub missing_recipes: Vec<String>,
    pub class_counts: BTreeMap<String, usize>,
    pub race_counts: BTreeMap<String, usize>,
    /// Languages that had no translation table
    pub missing_languages: Vec<String>,
    /// Tokens the canonical language left unresolved
    pub unresolved_names: Vec<String>,
}

impl Diagnostics {
    pub fn record_module(&mut self, module: &ModuleBlueprint) {
        *self
            .class_counts
            .entry(module.class.as_str().to_string())
            .or_insert(0) += 1;
        *self.race_counts.entry(module.race.clone()).or_insert(0) += 1;
    }

    pub fn record_unknown_type(&mut self, tag: &str, module_id: &str) {
        let key = if tag.is_empty() { MISSING_CLASS } else { tag };
        self.unknown_types
            .entry(key.to_string())
            .or_default()
            .push(module_id.to_string());
    }

    pub fn record_unconfigured_type(&mut self, tag: &str, module_id: &str) {
        self.unconfigured_types
            .entry(tag.to_string())
            .or_default()
            .push(module_id.to_string());
    }

    /// True when nothing beyond the coverage counters was recorded
    pub fn is_clean(&self) -> bool {
        self.unknown_types.is_empty()
            && self.unconfigured_types.is_empty()
            && self.missing_documents.is_empty()
            && self.missing_recipes.is_empty()
            && self.missing_languages.is_empty()
            && self.unresolved_names.is_empty()
    }

    pub fn module_count(&self) -> usize {
        self.class_counts.values().sum()
    }
}

fn write_buckets(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    buckets: &BTreeMap<String, Vec<String>>,
) -> fmt::Result {
    if buckets.is_empty() {
        return Ok(());
    }
    writeln!(f, "{}:", title)?;
    for (key, ids) in buckets {
        writeln!(f, "  {} ({}): {}", key, ids.len(), ids.join(", "))?;
    }
    Ok(())
}

fn write_list(f: &mut fmt::Formatter<'_>, title: &str, items: &[String]) -> fmt::Result {
    if items.is_empty() {
        return Ok(());
    }
    writeln!(f, "{} ({}):", title, items.len())?;
    for item in items {
        writeln!(f, "  {}", item)?;
    }
    Ok(())
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Modules: {}", self.module_count())?;
        for (class, count) in &self.class_counts {
            writeln!(f, "  {:<12} {}", class, count)?;
        }

        writeln!(f, "Factions:")?;
        for (race, count) in &self.race_counts {
            writeln!(f, "  {:<12} {}", race, count)?;
        }

        write_buckets(f, "Unknown module classes", &self.unknown_types)?;
        write_buckets(f, "Module types without a configured group", &self.unconfigured_types)?;
        write_list(f, "Modules without macro document", &self.missing_documents)?;
        write_list(f, "Queue items without recipe", &self.missing_recipes)?;
        write_list(f, "Languages without translation table", &self.missing_languages)?;
        write_list(f, "Unresolved names", &self.unresolved_names)?;

        if self.is_clean() {
            writeln!(f, "No problems found")?;
        }
        Ok(())
    }
}
