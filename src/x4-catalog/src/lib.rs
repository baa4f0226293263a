//! # x4-catalog
//!
//! Distills the X4 game data tree (base game plus ordered expansion overlays)
//! into a flat, localized catalog of wares and station modules.
//!
//! The pipeline runs in one linear pass:
//!
//! 1. [`overlay`] merges expansion patches onto the base `wares.xml` and
//!    `waregroups.xml`, and onto every per-module macro document, with a
//!    safety fuse that rejects macro patches reaching into the wares library.
//! 2. [`index`] walks the merged wares document once and builds the goods,
//!    module, recipe and workforce-consumption tables.
//! 3. [`catalog`] joins module stubs with their merged macros and the recipe
//!    book into [`ModuleBlueprint`] records with hourly flow rates.
//! 4. [`locale`] resolves `{page,id}` text references for every configured
//!    language and backfills display names.
//! 5. [`report`] collects classification and type-mapping diagnostics.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use x4_catalog::{distill, DiffPatcher, PipelineConfig};
//!
//! # fn main() -> x4_catalog::Result<()> {
//! let config = PipelineConfig::default();
//! let catalog = distill(Path::new("x4data"), &config, &DiffPatcher)?;
//! catalog.write(Path::new("out"))?;
//! println!("{}", catalog.diagnostics);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod document;
mod files;
pub mod index;
pub mod layout;
pub mod locale;
pub mod overlay;
pub mod pipeline;
pub mod report;
pub mod selector;

use std::path::PathBuf;

#[doc(inline)]
pub use catalog::{build_groups, build_modules, GroupEntry, ModuleBlueprint, StructuralClass, Workforce};
#[doc(inline)]
pub use config::{LanguageConfig, PipelineConfig};
#[doc(inline)]
pub use document::{Element, Node};
#[doc(inline)]
pub use index::{build_index, EntityIndex, GoodsRecord, ModuleStub, ProductionRecipe, RecipeBook, Transport};
#[doc(inline)]
pub use layout::GameLayout;
#[doc(inline)]
pub use locale::{resolve_all, Resolver, TranslationTable};
#[doc(inline)]
pub use overlay::{
    index_structures, merge_entity_overlays, merge_overlays, DiffPatcher, EntitySources,
    OverlayApplier, SafetyFuse, StructureIndex,
};
#[doc(inline)]
pub use pipeline::{distill, merge_goods, Catalog, LanguageEntry};
#[doc(inline)]
pub use report::Diagnostics;

/// Errors that abort a distillation run
///
/// Recoverable, entity-local problems (a broken macro file, a missing
/// translation table) are logged where they happen and never surface here.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Base document not found: {0}")]
    MissingBase(PathBuf),

    #[error("Safety fuse: overlay {overlay} edits protected path '{selector}' (protected root '{root}')")]
    FuseViolation {
        overlay: String,
        selector: String,
        root: String,
    },

    #[error("Malformed XML: {0}")]
    Xml(String),

    #[error("Failed to parse {path}: {message}")]
    Document { path: PathBuf, message: String },

    #[error("Invalid selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },

    #[error("Invalid overlay operation: {0}")]
    Overlay(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Xml(err.to_string())
    }
}

impl Error {
    /// Whether this error must end the run even inside per-entity processing
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::FuseViolation { .. } | Error::MissingBase(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let fuse = Error::FuseViolation {
            overlay: "ego_dlc_split".to_string(),
            selector: "/wares/ware".to_string(),
            root: "/wares".to_string(),
        };
        assert!(fuse.is_fatal());
        assert!(Error::MissingBase(PathBuf::from("libraries/wares.xml")).is_fatal());
        assert!(!Error::Xml("unexpected end".to_string()).is_fatal());
    }

    #[test]
    fn test_fuse_message_names_selector() {
        let err = Error::FuseViolation {
            overlay: "ego_dlc_boron".to_string(),
            selector: "/wares/ware[@id='energycells']".to_string(),
            root: "/wares".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ego_dlc_boron"));
        assert!(msg.contains("/wares/ware[@id='energycells']"));
    }
}
