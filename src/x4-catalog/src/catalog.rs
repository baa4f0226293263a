//! Catalog builder
//!
//! Joins module stubs with their merged macro documents and the recipe book
//! into flat [`ModuleBlueprint`] records, and unions the ware-group taxonomy
//! with the configured module groups.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::document::Element;
use crate::index::{attr_u64, GoodsRecord, ModuleStub, RecipeBook, DEFAULT_METHOD};
use crate::report::Diagnostics;

/// Faction assigned when the macro declares no maker race
pub const DEFAULT_RACE: &str = "default";

/// Module kind, normalized from the macro `class`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StructuralClass {
    Production,
    Storage,
    Habitation,
    Defense,
    Dock,
    Other,
}

impl StructuralClass {
    /// Map a raw macro class; `None` for classes the catalog does not know
    pub fn from_tag(tag: &str) -> Option<Self> {
        let class = match tag {
            "production" | "processingmodule" => StructuralClass::Production,
            "storage" => StructuralClass::Storage,
            "habitation" => StructuralClass::Habitation,
            "defencemodule" => StructuralClass::Defense,
            "dockarea" | "pier" => StructuralClass::Dock,
            "connectionmodule" | "buildmodule" | "welfaremodule" | "radar" => StructuralClass::Other,
            _ => return None,
        };
        Some(class)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StructuralClass::Production => "production",
            StructuralClass::Storage => "storage",
            StructuralClass::Habitation => "habitation",
            StructuralClass::Defense => "defense",
            StructuralClass::Dock => "dock",
            StructuralClass::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Workforce {
    /// Residents a habitation module houses
    pub capacity: u64,
    /// Workers a module needs for full efficiency
    pub needed: u64,
    /// Output bonus at full staffing (0.43 = +43%)
    pub max_bonus: f64,
}

/// A buildable station module with hourly production flows
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleBlueprint {
    pub id: String,
    pub ware_id: String,
    pub name_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub class: StructuralClass,
    pub method: String,
    pub group: String,
    pub race: String,
    pub buildable: bool,
    pub build_time: f64,
    pub build_cost: BTreeMap<String, u64>,
    pub cycle_time: f64,
    pub workforce: Workforce,
    pub outputs: BTreeMap<String, f64>,
    pub inputs: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_tags: Option<String>,
}

/// A ware group or a configured module group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name_id: String,
    pub name: String,
}

pub const GROUP_KIND_WARE: &str = "ware";
pub const GROUP_KIND_MODULE: &str = "module";

/// Build blueprints for every stub that has a merged macro document
///
/// Stubs without a document are recorded in the diagnostics and skipped.
/// Output follows stub order.
pub fn build_modules(
    stubs: &[ModuleStub],
    documents: &HashMap<String, Element>,
    recipes: &RecipeBook,
    goods: &[GoodsRecord],
    config: &PipelineConfig,
    diagnostics: &mut Diagnostics,
) -> Vec<ModuleBlueprint> {
    let groups: HashMap<&str, &str> = goods
        .iter()
        .map(|g| (g.id.as_str(), g.group.as_str()))
        .collect();

    let mut modules = Vec::with_capacity(stubs.len());

    for stub in stubs {
        let Some(document) = documents.get(&stub.id) else {
            diagnostics.missing_documents.push(stub.id.clone());
            continue;
        };

        let Some(macro_el) = find_macro(document, &stub.id) else {
            warn!(module = %stub.id, "macro document does not define the module macro");
            diagnostics.missing_documents.push(stub.id.clone());
            continue;
        };

        let module = build_module(stub, macro_el, recipes, &groups, config, diagnostics);
        diagnostics.record_module(&module);
        if !config.module_types.contains_key(module.class.as_str()) {
            diagnostics.record_unconfigured_type(module.class.as_str(), &module.id);
        }
        modules.push(module);
    }

    info!(modules = modules.len(), "built module blueprints");
    modules
}

fn build_module(
    stub: &ModuleStub,
    macro_el: &Element,
    recipes: &RecipeBook,
    groups: &HashMap<&str, &str>,
    config: &PipelineConfig,
    diagnostics: &mut Diagnostics,
) -> ModuleBlueprint {
    let tag = macro_el.attr("class").unwrap_or_default();
    let class = StructuralClass::from_tag(tag).unwrap_or_else(|| {
        diagnostics.record_unknown_type(tag, &stub.id);
        StructuralClass::Other
    });

    let properties = macro_el.child("properties");
    let race = properties
        .and_then(|p| p.child("identification"))
        .and_then(|i| i.attr("makerrace"))
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .or_else(|| {
            guess_race(&stub.id)
                .filter(|_| config.infer_faction_from_name)
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_RACE.to_string());

    let workforce_el = properties.and_then(|p| p.child("workforce"));
    let mut module = ModuleBlueprint {
        id: stub.id.clone(),
        ware_id: stub.ware_id.clone(),
        name_id: stub.name_id.clone(),
        name: stub.name_id.clone(),
        class,
        method: "none".to_string(),
        group: class.as_str().to_string(),
        buildable: config.is_buildable(&race),
        race,
        build_time: stub.build_time,
        build_cost: stub.build_cost.clone(),
        cycle_time: 0.0,
        workforce: Workforce {
            capacity: workforce_el.and_then(|w| attr_u64(w, "capacity")).unwrap_or(0),
            needed: workforce_el
                .and_then(|w| attr_u64(w, "max").or_else(|| attr_u64(w, "amount")))
                .unwrap_or(0),
            max_bonus: 0.0,
        },
        outputs: BTreeMap::new(),
        inputs: BTreeMap::new(),
        capacity: None,
        storage_tags: None,
    };

    match class {
        StructuralClass::Production => {
            if let Some(properties) = properties {
                apply_production(&mut module, properties, recipes, groups, diagnostics);
            }
        }
        StructuralClass::Storage => {
            if let Some(cargo) = properties.and_then(|p| p.child("cargo")) {
                module.capacity = Some(attr_u64(cargo, "max").unwrap_or(0));
                module.storage_tags = cargo.attr("tags").map(str::to_string);
            }
        }
        _ => {}
    }

    module
}

/// Sum the hourly flows of every queue item's recipe into the module
fn apply_production(
    module: &mut ModuleBlueprint,
    properties: &Element,
    recipes: &RecipeBook,
    groups: &HashMap<&str, &str>,
    diagnostics: &mut Diagnostics,
) {
    let mut group_assigned = false;
    let mut method_assigned = false;

    for production in properties.children_named("production") {
        let items = production
            .children_named("queue")
            .flat_map(|queue| queue.children_named("item"));

        for item in items {
            let Some(ware) = item.attr("ware").or_else(|| production.attr("wares")) else {
                continue;
            };
            let method = item.attr("method").unwrap_or(DEFAULT_METHOD);

            if !method_assigned {
                module.method = method.to_string();
                method_assigned = true;
            }

            if !group_assigned {
                if let Some(group) = groups.get(ware).filter(|g| !g.is_empty()) {
                    module.group = group.to_string();
                    group_assigned = true;
                }
            }

            let Some(recipe) = recipes.select(ware, method) else {
                debug!(module = %module.id, ware, method, "no recipe for queue item");
                diagnostics
                    .missing_recipes
                    .push(format!("{}: {}/{}", module.id, ware, method));
                continue;
            };

            let factor = recipe.hourly_factor();
            *module.outputs.entry(recipe.ware.clone()).or_insert(0.0) += recipe.amount as f64 * factor;
            for (input, amount) in &recipe.inputs {
                *module.inputs.entry(input.clone()).or_insert(0.0) += *amount as f64 * factor;
            }

            module.cycle_time = recipe.time;
            if let Some(bonus) = recipe.efficiency {
                module.workforce.max_bonus = module.workforce.max_bonus.max(bonus);
            }
        }
    }
}

/// The `<macro>` element named `id`, either the root itself or nested in a
/// `<macros>` container
pub fn find_macro<'a>(document: &'a Element, id: &str) -> Option<&'a Element> {
    if document.name == "macro" && document.attr("name") == Some(id) {
        return Some(document);
    }
    document
        .descendants()
        .into_iter()
        .find(|e| e.name == "macro" && e.attr("name") == Some(id))
}

/// Guess a faction from race infixes in a macro id
pub fn guess_race(macro_id: &str) -> Option<&'static str> {
    const INFIXES: [(&str, &str); 9] = [
        ("_ter_", "terran"),
        ("_bor_", "boron"),
        ("_tel_", "teladi"),
        ("_par_", "paranid"),
        ("_spl_", "split"),
        ("_arg_", "argon"),
        ("_xen_", "xenon"),
        ("_kha_", "khaak"),
        ("_pir_", "pirate"),
    ];

    INFIXES
        .iter()
        .find(|(infix, _)| macro_id.contains(infix))
        .map(|(_, race)| *race)
}

/// Union the ware groups of the merged `waregroups.xml` with the configured
/// module groups; duplicates are kept
pub fn build_groups(groups_doc: &Element, module_types: &BTreeMap<String, String>) -> Vec<GroupEntry> {
    let mut groups: Vec<GroupEntry> = groups_doc
        .children_named("group")
        .filter_map(|group| {
            let id = group.attr("id")?;
            let name_id = group.attr("name").unwrap_or_default();
            Some(GroupEntry {
                id: id.to_string(),
                kind: GROUP_KIND_WARE.to_string(),
                name_id: name_id.to_string(),
                name: name_id.to_string(),
            })
        })
        .collect();

    groups.extend(module_types.iter().map(|(tag, token)| GroupEntry {
        id: tag.clone(),
        kind: GROUP_KIND_MODULE.to_string(),
        name_id: token.clone(),
        name: token.clone(),
    }));

    groups
}
