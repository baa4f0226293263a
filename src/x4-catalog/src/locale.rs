//! Localization
//!
//! Translation tables map `{page,id}` references to raw text. Texts may
//! themselves contain references, so resolution expands recursively with a
//! depth bound; references past the bound or missing from the table stay in
//! the output verbatim.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{LanguageConfig, PipelineConfig};
use crate::document::{self, Element};
use crate::Result;

/// `{page,id}` with decimal page and id
static MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(\d+),(\d+)\}").unwrap());

/// Innermost parenthesised segment
static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^()]*\)").unwrap());

/// Canonical-language table name used by older game builds
pub const FALLBACK_TABLE: &str = "0001.xml";

/// Resolved texts: language code → token → text
pub type ResolvedTexts = BTreeMap<String, BTreeMap<String, String>>;

/// One language's text pages: page id → text id → raw text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslationTable {
    pages: HashMap<String, HashMap<String, String>>,
}

impl TranslationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a parsed `<language>` document
    pub fn from_document(root: &Element) -> Self {
        let mut table = Self::new();
        for page in root.children_named("page") {
            let Some(page_id) = page.attr("id") else {
                continue;
            };
            for text in page.children_named("t") {
                if let Some(id) = text.attr("id") {
                    table.insert(page_id, id, text.text());
                }
            }
        }
        table
    }

    pub fn parse(xml: &str) -> Result<Self> {
        Ok(Self::from_document(&Element::parse_mixed(xml)?))
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::from_document(&document::load_mixed(path)?))
    }

    pub fn insert(&mut self, page: &str, id: &str, text: impl Into<String>) {
        self.pages
            .entry(page.trim().to_string())
            .or_default()
            .insert(id.trim().to_string(), text.into());
    }

    pub fn get(&self, page: &str, id: &str) -> Option<&str> {
        self.pages.get(page)?.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pages.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.values().all(HashMap::is_empty)
    }
}

/// Whether `text` still contains a `{page,id}` reference
pub fn has_marker(text: &str) -> bool {
    MARKER.is_match(text)
}

/// Expands tokens against one language's table
pub struct Resolver<'a> {
    table: &'a TranslationTable,
    max_depth: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(table: &'a TranslationTable, max_depth: usize) -> Self {
        Self { table, max_depth }
    }

    /// Fully resolve a token into display text
    pub fn resolve(&self, token: &str) -> String {
        let expanded = self.expand(token, 0);
        expanded.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn expand(&self, text: &str, depth: usize) -> String {
        let stripped = strip_parentheticals(text);
        MARKER
            .replace_all(&stripped, |caps: &Captures<'_>| {
                if depth >= self.max_depth {
                    return caps[0].to_string();
                }
                match self.table.get(&caps[1], &caps[2]) {
                    Some(found) => self.expand(found, depth + 1),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

/// Remove `(...)` segments, innermost first, until none are left
fn strip_parentheticals(text: &str) -> String {
    let mut current = text.to_string();
    while PARENTHETICAL.is_match(&current) {
        current = PARENTHETICAL.replace_all(&current, "").into_owned();
    }
    current
}

/// Locate the table file for a language id below the `t` directory
///
/// The canonical language may also live in the unsuffixed fallback file.
pub fn locate_table(t_dir: &Path, language_id: &str, canonical: bool) -> Option<PathBuf> {
    let candidates = [
        format!("0001-l{}.xml", language_id),
        format!("0001-L{}.xml", language_id),
    ];
    candidates
        .iter()
        .map(|name| t_dir.join(name))
        .find(|path| path.is_file())
        .or_else(|| {
            let fallback = t_dir.join(FALLBACK_TABLE);
            (canonical && fallback.is_file()).then_some(fallback)
        })
}

/// Load every configured language's table; unreadable or missing tables
/// come back as `None`
pub fn load_tables(
    t_dir: &Path,
    config: &PipelineConfig,
) -> Vec<(LanguageConfig, Option<TranslationTable>)> {
    config
        .languages
        .iter()
        .map(|language| {
            let canonical = language.id == config.canonical_language;
            let table = match locate_table(t_dir, &language.id, canonical) {
                Some(path) => match TranslationTable::load(&path) {
                    Ok(table) => {
                        debug!(language = %language.iso, path = %path.display(), texts = table.len(), "loaded translation table");
                        Some(table)
                    }
                    Err(e) => {
                        warn!(language = %language.iso, "skipping unreadable translation table: {}", e);
                        None
                    }
                },
                None => {
                    warn!(language = %language.iso, id = %language.id, "no translation table");
                    None
                }
            };
            (language.clone(), table)
        })
        .collect()
}

/// Resolve every required token in every language
///
/// A language without a table yields an empty map.
pub fn resolve_all<'a, I>(required: &BTreeSet<String>, tables: I, max_depth: usize) -> ResolvedTexts
where
    I: IntoIterator<Item = (&'a str, Option<&'a TranslationTable>)>,
{
    let mut resolved = ResolvedTexts::new();

    for (code, table) in tables {
        let texts: BTreeMap<String, String> = match table {
            Some(table) if !table.is_empty() => {
                let resolver = Resolver::new(table, max_depth);
                required
                    .iter()
                    .map(|token| (token.clone(), resolver.resolve(token)))
                    .collect()
            }
            _ => BTreeMap::new(),
        };
        info!(language = code, tokens = texts.len(), "resolved texts");
        resolved.insert(code.to_string(), texts);
    }

    resolved
}

/// Number of tokens a language actually translated
pub fn translated_count(texts: &BTreeMap<String, String>) -> usize {
    texts.iter().filter(|(token, text)| token != text).count()
}
