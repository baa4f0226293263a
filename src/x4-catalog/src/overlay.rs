//! Overlay merge engine
//!
//! Expansions ship their changes to base documents as `<diff>` patches (or,
//! for macros, occasionally as complete replacement documents). This module
//! owns the ordering, existence checks and the safety fuse around patch
//! application; the patch algorithm itself sits behind [`OverlayApplier`].
//!
//! Two entry points:
//!
//! - [`merge_overlays`] for the monolithic libraries (`wares.xml`,
//!   `waregroups.xml`): base plus every existing overlay, in caller order.
//! - [`merge_entity_overlays`] for per-module macro documents, where each
//!   expansion either patches or replaces the accumulated document, and
//!   every patch passes through the [`SafetyFuse`] first.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::document::{self, Element, Node};
use crate::files;
use crate::selector::{element_at_mut, strip_predicates, Selector};
use crate::{Error, Result};

/// Applies one patch document onto a base document in place
pub trait OverlayApplier {
    fn apply(&self, base: &mut Element, patch: &Element) -> Result<()>;
}

/// Root element name of a patch document
pub const DIFF_ROOT: &str = "diff";

/// Whether a document is a patch rather than a full replacement
pub fn is_diff(document: &Element) -> bool {
    document.name == DIFF_ROOT
}

// ============================================================================
// Monolithic documents
// ============================================================================

/// Load `base_path` and apply every existing overlay in the given order
///
/// A missing base is fatal; missing overlays are skipped (expansions are
/// optional). The order is never changed.
pub fn merge_overlays(
    base_path: &Path,
    overlays: &[PathBuf],
    applier: &dyn OverlayApplier,
) -> Result<Element> {
    if !base_path.is_file() {
        return Err(Error::MissingBase(base_path.to_path_buf()));
    }

    let mut merged = document::load(base_path)?;
    debug!(base = %base_path.display(), "loaded base document");

    for overlay in overlays {
        if !overlay.is_file() {
            debug!(overlay = %overlay.display(), "overlay not present, skipping");
            continue;
        }

        info!(overlay = %overlay.display(), "applying overlay");
        let patch = document::load(overlay)?;
        applier.apply(&mut merged, &patch)?;
    }

    Ok(merged)
}

// ============================================================================
// Safety fuse
// ============================================================================

/// Rejects entity-scoped patches whose selectors reach into the protected
/// wares library
#[derive(Debug, Clone)]
pub struct SafetyFuse {
    root_path: String,
    root_name: String,
}

impl SafetyFuse {
    /// `protected_root` is an absolute path such as `/wares`
    pub fn new(protected_root: &str) -> Self {
        let root_path = format!("/{}", protected_root.trim().trim_matches('/'));
        let root_name = root_path
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            root_path,
            root_name,
        }
    }

    pub fn protected_root(&self) -> &str {
        &self.root_path
    }

    /// Scan every selector-bearing node of `patch`; `origin` names the
    /// overlay in the violation
    pub fn check(&self, patch: &Element, origin: &str) -> Result<()> {
        let selectors = patch
            .descendants()
            .into_iter()
            .filter_map(|op| op.attr("sel"));

        for sel in selectors {
            if self.violates(sel) {
                return Err(Error::FuseViolation {
                    overlay: origin.to_string(),
                    selector: sel.to_string(),
                    root: self.root_path.clone(),
                });
            }
        }

        Ok(())
    }

    /// True if the selector starts at, or passes through, the protected root
    pub fn violates(&self, selector: &str) -> bool {
        let sel = selector.trim();
        if let Some(rest) = sel.strip_prefix(&self.root_path) {
            if rest.is_empty() || rest.starts_with('/') || rest.starts_with('[') {
                return true;
            }
        }

        strip_predicates(sel)
            .split('/')
            .map(str::trim)
            .any(|segment| segment == self.root_name)
    }
}

// ============================================================================
// Entity-scoped documents
// ============================================================================

/// Where one entity's macro documents live: the base game and any expansions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitySources {
    pub base: Option<PathBuf>,
    pub extensions: HashMap<String, PathBuf>,
}

/// Entity id (macro file stem) → sources
#[derive(Debug, Clone, Default)]
pub struct StructureIndex {
    entries: BTreeMap<String, EntitySources>,
}

impl StructureIndex {
    pub fn get(&self, entity_id: &str) -> Option<&EntitySources> {
        self.entries.get(entity_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a document for an entity; the first path seen for a given
    /// provenance wins
    pub fn insert(&mut self, entity_id: &str, provenance: Option<&str>, path: PathBuf) {
        let sources = self.entries.entry(entity_id.to_string()).or_default();
        let existing = match provenance {
            None => sources.base.as_ref(),
            Some(dlc) => sources.extensions.get(dlc),
        };

        if let Some(existing) = existing {
            warn!(
                entity = entity_id,
                provenance = provenance.unwrap_or("base"),
                kept = %existing.display(),
                ignored = %path.display(),
                "duplicate macro document for one provenance"
            );
            return;
        }

        match provenance {
            None => sources.base = Some(path),
            Some(dlc) => {
                sources.extensions.insert(dlc.to_string(), path);
            }
        }
    }
}

/// Index every macro document of the base game and the listed expansions
/// by the entity id in its file name
pub fn index_structures(base_dir: &Path, extension_dirs: &[(String, PathBuf)]) -> StructureIndex {
    let mut index = StructureIndex::default();

    for path in files::collect_macro_files(base_dir) {
        if let Some(id) = files::entity_id(&path) {
            index.insert(&id, None, path);
        }
    }

    for (dlc, dir) in extension_dirs {
        for path in files::collect_macro_files(dir) {
            if let Some(id) = files::entity_id(&path) {
                index.insert(&id, Some(dlc), path);
            }
        }
    }

    info!(entities = index.len(), "indexed macro documents");
    index
}

/// Merge one entity's macro documents across the base game and expansions
///
/// Returns `Ok(None)` when the entity ends up without a document, including
/// when one of its files fails to parse. Only a safety-fuse violation is an
/// error.
pub fn merge_entity_overlays(
    entity_id: &str,
    sources: &EntitySources,
    order: &[String],
    applier: &dyn OverlayApplier,
    fuse: &SafetyFuse,
) -> Result<Option<Element>> {
    let mut merged = match &sources.base {
        Some(path) => match document::load(path) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!(entity = entity_id, error = %e, "skipping entity with unreadable base macro");
                return Ok(None);
            }
        },
        None => None,
    };

    for dlc in order {
        let Some(path) = sources.extensions.get(dlc) else {
            continue;
        };

        let patch = match document::load(path) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(entity = entity_id, dlc = %dlc, error = %e, "skipping entity with unreadable macro");
                return Ok(None);
            }
        };

        if !is_diff(&patch) {
            debug!(entity = entity_id, dlc = %dlc, "macro replaced by expansion");
            merged = Some(patch);
            continue;
        }

        fuse.check(&patch, dlc)?;

        let Some(current) = merged.as_mut() else {
            debug!(entity = entity_id, dlc = %dlc, "diff without a base document, skipping");
            continue;
        };

        if let Err(e) = applier.apply(current, &patch) {
            if e.is_fatal() {
                return Err(e);
            }
            warn!(entity = entity_id, dlc = %dlc, error = %e, "failed to apply macro patch");
            return Ok(None);
        }
    }

    Ok(merged)
}

// ============================================================================
// Default applier
// ============================================================================

/// Applies X4-style `<diff>` patches: `<add>`, `<replace>` and `<remove>`
/// operations addressed by `sel`
///
/// A selector that matches nothing is logged and skipped, as the game does.
/// When a selector matches several nodes only the first is edited.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffPatcher;

impl OverlayApplier for DiffPatcher {
    fn apply(&self, base: &mut Element, patch: &Element) -> Result<()> {
        if !is_diff(patch) {
            return Err(Error::Overlay(format!(
                "expected <{}> root, got <{}>",
                DIFF_ROOT, patch.name
            )));
        }

        for op in patch.elements() {
            let sel = op
                .attr("sel")
                .ok_or_else(|| Error::Overlay(format!("<{}> without sel", op.name)))?;
            let selector = Selector::parse(sel)?;
            let targets = selector.select(base);

            let Some(target) = targets.first() else {
                if op.attr("silent") != Some("true") {
                    warn!(selector = sel, op = %op.name, "patch selector matched nothing");
                }
                continue;
            };
            if targets.len() > 1 {
                debug!(selector = sel, matches = targets.len(), "patch selector is ambiguous, editing first match");
            }

            match op.name.as_str() {
                "add" => apply_add(base, &selector, target, op)?,
                "replace" => apply_replace(base, &selector, target, op)?,
                "remove" => apply_remove(base, &selector, target)?,
                other => return Err(Error::Overlay(format!("unknown operation <{}>", other))),
            }
        }

        Ok(())
    }
}

fn apply_add(base: &mut Element, selector: &Selector, target: &[usize], op: &Element) -> Result<()> {
    if selector.attribute().is_some() {
        return Err(Error::Overlay("<add> cannot target an attribute".to_string()));
    }

    if let Some(attr) = op.attr("type").and_then(|t| t.strip_prefix('@')) {
        let element = resolve_mut(base, target)?;
        element.set_attr(attr, op.text());
        return Ok(());
    }

    let payload: Vec<Node> = op.children.clone();

    match op.attr("pos") {
        Some("before") | Some("after") => {
            let (parent_path, idx) = split_parent(target)?;
            let at = if op.attr("pos") == Some("after") { idx + 1 } else { idx };
            let parent = resolve_mut(base, parent_path)?;
            insert_nodes(&mut parent.children, at, payload);
        }
        Some("prepend") => {
            let element = resolve_mut(base, target)?;
            insert_nodes(&mut element.children, 0, payload);
        }
        _ => {
            let element = resolve_mut(base, target)?;
            element.children.extend(payload);
        }
    }

    Ok(())
}

fn apply_replace(base: &mut Element, selector: &Selector, target: &[usize], op: &Element) -> Result<()> {
    if let Some(attr) = selector.attribute() {
        let element = resolve_mut(base, target)?;
        element.set_attr(attr, op.text());
        return Ok(());
    }

    let replacement = op
        .elements()
        .next()
        .cloned()
        .ok_or_else(|| Error::Overlay("<replace> without a replacement element".to_string()))?;

    if target.is_empty() {
        *base = replacement;
        return Ok(());
    }

    let (parent_path, idx) = split_parent(target)?;
    let parent = resolve_mut(base, parent_path)?;
    parent.children[idx] = Node::Element(replacement);
    Ok(())
}

fn apply_remove(base: &mut Element, selector: &Selector, target: &[usize]) -> Result<()> {
    if let Some(attr) = selector.attribute() {
        let element = resolve_mut(base, target)?;
        element.remove_attr(attr);
        return Ok(());
    }

    let (parent_path, idx) = split_parent(target)?;
    let parent = resolve_mut(base, parent_path)?;
    parent.children.remove(idx);
    Ok(())
}

fn insert_nodes(children: &mut Vec<Node>, at: usize, nodes: Vec<Node>) {
    for (offset, node) in nodes.into_iter().enumerate() {
        children.insert(at + offset, node);
    }
}

fn split_parent(target: &[usize]) -> Result<(&[usize], usize)> {
    target
        .split_last()
        .map(|(idx, parent)| (parent, *idx))
        .ok_or_else(|| Error::Overlay("operation cannot address the document root".to_string()))
}

fn resolve_mut<'a>(base: &'a mut Element, path: &[usize]) -> Result<&'a mut Element> {
    element_at_mut(base, path)
        .ok_or_else(|| Error::Overlay("patch target vanished during merge".to_string()))
}
