//! Distillation pipeline
//!
//! Runs every stage in order over one game data tree and collects the
//! results into a [`Catalog`] that can be written as JSON.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::catalog::{build_groups, build_modules, GroupEntry, ModuleBlueprint};
use crate::config::PipelineConfig;
use crate::document::Element;
use crate::index::{build_index, ConsumptionRates, GoodsRecord};
use crate::layout::{GameLayout, WAREGROUPS_FILE, WARES_FILE};
use crate::locale::{has_marker, load_tables, resolve_all, translated_count, ResolvedTexts};
use crate::overlay::{index_structures, merge_entity_overlays, merge_overlays, OverlayApplier, SafetyFuse};
use crate::report::Diagnostics;
use crate::Result;

/// An entry of the language picker manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageEntry {
    pub code: String,
    pub name: String,
    pub x4_id: String,
}

/// Everything one run produces
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub wares: Vec<GoodsRecord>,
    pub modules: Vec<ModuleBlueprint>,
    pub groups: Vec<GroupEntry>,
    pub workforce: ConsumptionRates,
    /// Languages that translated at least one token, in configured order
    pub languages: Vec<LanguageEntry>,
    /// Language code → token → text, for the listed languages only
    pub translations: ResolvedTexts,
    pub diagnostics: Diagnostics,
}

/// Merge the base goods library with every expansion overlay in order
pub fn merge_goods(
    layout: &GameLayout,
    config: &PipelineConfig,
    applier: &dyn OverlayApplier,
) -> Result<Element> {
    merge_overlays(
        &layout.wares(),
        &layout.library_overlays(WARES_FILE, &config.dlc_order),
        applier,
    )
}

/// Run the whole pipeline on the data tree at `root`
///
/// Fails on a missing base library, an unreadable goods or group overlay and
/// on a safety-fuse violation. Everything else is logged, defaulted and
/// reported through [`Catalog::diagnostics`].
pub fn distill(root: &Path, config: &PipelineConfig, applier: &dyn OverlayApplier) -> Result<Catalog> {
    config.validate()?;
    let layout = GameLayout::new(root);
    let mut diagnostics = Diagnostics::default();

    info!(root = %root.display(), expansions = config.dlc_order.len(), "merging libraries");
    let wares = merge_goods(&layout, config, applier)?;
    let waregroups = merge_overlays(
        &layout.waregroups(),
        &layout.library_overlays(WAREGROUPS_FILE, &config.dlc_order),
        applier,
    )?;

    let index = build_index(&wares, &config.workforce_ware);

    let structures = index_structures(
        &layout.structures(),
        &layout.extension_structures(&config.dlc_order),
    );
    let fuse = SafetyFuse::new(&config.protected_root);

    let mut documents = HashMap::new();
    for stub in &index.modules {
        let Some(sources) = structures.get(&stub.id) else {
            continue;
        };
        if let Some(document) =
            merge_entity_overlays(&stub.id, sources, &config.dlc_order, applier, &fuse)?
        {
            documents.insert(stub.id.clone(), document);
        }
    }
    info!(documents = documents.len(), "merged macro documents");

    let mut modules = build_modules(
        &index.modules,
        &documents,
        &index.recipes,
        &index.goods,
        config,
        &mut diagnostics,
    );
    let mut groups = build_groups(&waregroups, &config.module_types);
    let mut goods = index.goods;

    let mut required = index.required_tokens;
    required.extend(groups.iter().map(|g| g.name_id.clone()).filter(|t| !t.is_empty()));

    let tables = load_tables(&layout.translations(), config);
    let resolved = resolve_all(
        &required,
        tables
            .iter()
            .map(|(language, table)| (language.iso.as_str(), table.as_ref())),
        config.max_token_depth,
    );

    let mut languages = Vec::new();
    let mut translations = ResolvedTexts::new();
    for (language, table) in &tables {
        if table.is_none() {
            diagnostics.missing_languages.push(language.id.clone());
        }
        let Some(texts) = resolved.get(&language.iso) else {
            continue;
        };
        if translated_count(texts) == 0 {
            continue;
        }
        languages.push(LanguageEntry {
            code: language.iso.clone(),
            name: language.name.clone(),
            x4_id: language.id.clone(),
        });
        translations.insert(language.iso.clone(), texts.clone());
    }

    match config.canonical().and_then(|c| translations.get(&c.iso)) {
        Some(names) => {
            backfill(&mut goods, &mut modules, &mut groups, names);
            diagnostics.unresolved_names = names
                .values()
                .filter(|text| has_marker(text))
                .cloned()
                .collect();
        }
        None => warn!(
            language = %config.canonical_language,
            "canonical language has no texts, keeping raw name tokens"
        ),
    }

    info!(
        wares = goods.len(),
        modules = modules.len(),
        groups = groups.len(),
        languages = languages.len(),
        "distillation complete"
    );

    Ok(Catalog {
        wares: goods,
        modules,
        groups,
        workforce: index.consumption,
        languages,
        translations,
        diagnostics,
    })
}

/// Overwrite display names with canonical-language texts; records whose
/// token is absent keep the raw token
fn backfill(
    goods: &mut [GoodsRecord],
    modules: &mut [ModuleBlueprint],
    groups: &mut [GroupEntry],
    names: &BTreeMap<String, String>,
) {
    let lookup = |token: &str| names.get(token).filter(|text| !text.is_empty()).cloned();

    for ware in goods.iter_mut() {
        if let Some(name) = lookup(&ware.name_id) {
            ware.name = name;
        }
    }
    for module in modules.iter_mut() {
        if let Some(name) = lookup(&module.name_id) {
            module.name = name;
        }
    }
    for group in groups.iter_mut() {
        if let Some(name) = lookup(&group.name_id) {
            group.name = name;
        }
    }
}

impl Catalog {
    /// Write the catalog below `output` as `data/*.json` and
    /// `locales/<code>.json`
    pub fn write(&self, output: &Path) -> Result<()> {
        let data = output.join("data");
        let locales = output.join("locales");
        fs::create_dir_all(&data)?;
        fs::create_dir_all(&locales)?;

        write_json(&data.join("wares.json"), &self.wares)?;
        write_json(&data.join("modules.json"), &self.modules)?;
        write_json(&data.join("module_groups.json"), &self.groups)?;
        write_json(&data.join("workforce_consumption.json"), &self.workforce)?;
        write_json(&data.join("languages.json"), &self.languages)?;

        for (code, texts) in &self.translations {
            write_json(&locales.join(format!("{}.json", code)), texts)?;
        }

        info!(output = %output.display(), locales = self.translations.len(), "wrote catalog");
        Ok(())
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::DiffPatcher;
    use crate::Error;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const WARES: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<wares>
  <ware id="energycells" name="{20201,701}" transport="container" volume="6" group="energy">
    <price min="10" average="16" max="22"/>
    <production time="60" amount="175" method="default">
      <effects><effect type="work" product="0.43"/></effects>
    </production>
  </ware>
  <ware id="hydrogen" name="{20201,2001}" transport="liquid" group="gases">
    <price min="50" average="60" max="70"/>
  </ware>
  <ware id="superfluid" name="{20201,7001}" transport="liquid" group="fluids">
    <price min="100" average="120" max="140"/>
    <production time="1800" amount="2" method="default">
      <primary><ware ware="hydrogen" amount="4"/></primary>
    </production>
  </ware>
  <ware id="module_superfluid" name="{20104,500}" transport="container" tags="module">
    <production time="3600" amount="1" method="default">
      <primary><ware ware="energycells" amount="100"/></primary>
    </production>
    <component ref="prod_gen_superfluid_macro"/>
  </ware>
  <ware id="workunit_busy" transport="workunit">
    <production time="600" amount="500" method="default">
      <primary><ware ware="foodrations" amount="10"/></primary>
    </production>
  </ware>
</wares>"#;

    const WARES_DLC: &str = r#"<diff>
  <add sel="/wares/ware[@id='superfluid']">
    <production time="900" amount="3" method="sunlight">
      <primary><ware ware="energycells" amount="6"/></primary>
    </production>
  </add>
</diff>"#;

    const GROUPS: &str = r#"<groups>
  <group id="energy" name="{20215,101}"/>
  <group id="fluids" name="{20215,601}"/>
</groups>"#;

    const MACRO: &str = r#"<macros>
  <macro name="prod_gen_superfluid_macro" class="production">
    <properties>
      <identification name="{20104,500}" makerrace="argon"/>
      <production wares="superfluid"><queue><item ware="superfluid" method="default"/></queue></production>
      <workforce max="90"/>
    </properties>
  </macro>
</macros>"#;

    const MACRO_DLC: &str = r#"<diff>
  <replace sel="//queue/item/@method">sunlight</replace>
</diff>"#;

    const ENGLISH: &str = r#"<language id="44">
  <page id="20201">
    <t id="701">Energy Cells</t>
    <t id="2001">Hydrogen</t>
    <t id="7001">Superfluid (Liquid) Coolant</t>
  </page>
  <page id="20104"><t id="500">{20201,7001} Facility</t></page>
  <page id="20215"><t id="101">Energy</t></page>
</language>"#;

    fn write(root: &Path, rel: &str, xml: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, xml).unwrap();
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "libraries/wares.xml", WARES);
        write(root, "libraries/waregroups.xml", GROUPS);
        write(root, "extensions/ego_dlc_boron/libraries/wares.xml", WARES_DLC);
        write(
            root,
            "assets/structures/production/macros/prod_gen_superfluid_macro.xml",
            MACRO,
        );
        write(
            root,
            "extensions/ego_dlc_boron/assets/structures/production/macros/prod_gen_superfluid_macro.xml",
            MACRO_DLC,
        );
        write(root, "t/0001-l044.xml", ENGLISH);
        dir
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            dlc_order: vec!["ego_dlc_boron".to_string()],
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_end_to_end_superfluid() {
        let dir = fixture();
        let catalog = distill(dir.path(), &config(), &DiffPatcher).unwrap();

        assert_eq!(catalog.wares.len(), 3);
        let module = &catalog.modules[0];
        assert_eq!(module.id, "prod_gen_superfluid_macro");
        assert_eq!(module.method, "sunlight");
        assert_eq!(module.cycle_time, 900.0);
        assert_eq!(module.outputs, BTreeMap::from([("superfluid".to_string(), 12.0)]));
        assert_eq!(module.inputs, BTreeMap::from([("energycells".to_string(), 24.0)]));
        assert_eq!(module.build_cost, BTreeMap::from([("energycells".to_string(), 100)]));
        assert_eq!(module.build_time, 3600.0);
        assert_eq!(module.group, "fluids");
        assert_eq!(module.race, "argon");
        assert_eq!(module.name, "Superfluid Coolant Facility");

        assert_eq!(catalog.workforce["default"]["foodrations"], 10.0 / (500.0 * 600.0));
    }

    #[test]
    fn test_backfill_and_languages() {
        let dir = fixture();
        let catalog = distill(dir.path(), &config(), &DiffPatcher).unwrap();

        let hydrogen = catalog.wares.iter().find(|w| w.id == "hydrogen").unwrap();
        assert_eq!(hydrogen.name, "Hydrogen");
        assert_eq!(hydrogen.name_id, "{20201,2001}");

        let energy = catalog.groups.iter().find(|g| g.id == "energy").unwrap();
        assert_eq!(energy.name, "Energy");
        // untranslated group keeps its token
        let fluids = catalog.groups.iter().find(|g| g.id == "fluids").unwrap();
        assert_eq!(fluids.name, "{20215,601}");

        assert_eq!(
            catalog.languages,
            [LanguageEntry {
                code: "en".to_string(),
                name: "English".to_string(),
                x4_id: "044".to_string(),
            }]
        );
        assert_eq!(catalog.diagnostics.missing_languages.len(), 11);
        assert_eq!(catalog.diagnostics.unresolved_names, ["{20215,601}"]);
    }

    #[test]
    fn test_output_is_deterministic() {
        let dir = fixture();
        let out_a = TempDir::new().unwrap();
        let out_b = TempDir::new().unwrap();

        distill(dir.path(), &config(), &DiffPatcher)
            .unwrap()
            .write(out_a.path())
            .unwrap();
        distill(dir.path(), &config(), &DiffPatcher)
            .unwrap()
            .write(out_b.path())
            .unwrap();

        let files: Vec<PathBuf> = [
            "data/wares.json",
            "data/modules.json",
            "data/module_groups.json",
            "data/workforce_consumption.json",
            "data/languages.json",
            "locales/en.json",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();

        for file in &files {
            let a = fs::read(out_a.path().join(file)).unwrap();
            let b = fs::read(out_b.path().join(file)).unwrap();
            assert_eq!(a, b, "{} differs between runs", file.display());
        }
        assert!(!out_a.path().join("locales/de.json").exists());
    }

    #[test]
    fn test_written_json_shape() {
        let dir = fixture();
        let out = TempDir::new().unwrap();
        distill(dir.path(), &config(), &DiffPatcher)
            .unwrap()
            .write(out.path())
            .unwrap();

        let wares: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.path().join("data/wares.json")).unwrap())
                .unwrap();
        assert_eq!(wares[0]["id"], "energycells");
        assert_eq!(wares[0]["nameId"], "{20201,701}");
        assert_eq!(wares[0]["minPrice"], 10);
        assert_eq!(wares[0]["volume"], 6);

        let modules: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.path().join("data/modules.json")).unwrap())
                .unwrap();
        assert_eq!(modules[0]["type"], "production");
        assert_eq!(modules[0]["workforce"]["needed"], 90);
        assert!(modules[0].get("capacity").is_none());

        let languages = fs::read_to_string(out.path().join("data/languages.json")).unwrap();
        assert!(languages.contains("\"x4Id\": \"044\""));
    }

    #[test]
    fn test_dlc_not_in_order_is_ignored() {
        let dir = fixture();
        let config = PipelineConfig {
            dlc_order: Vec::new(),
            ..PipelineConfig::default()
        };
        let catalog = distill(dir.path(), &config, &DiffPatcher).unwrap();
        let module = &catalog.modules[0];
        assert_eq!(module.method, "default");
        assert_eq!(module.cycle_time, 1800.0);
        assert_eq!(module.outputs["superfluid"], 4.0);
    }

    #[test]
    fn test_fuse_aborts_run() {
        let dir = fixture();
        write(
            dir.path(),
            "extensions/ego_dlc_boron/assets/structures/production/macros/prod_gen_superfluid_macro.xml",
            r#"<diff><remove sel="/wares/ware[@id='energycells']"/></diff>"#,
        );
        let err = distill(dir.path(), &config(), &DiffPatcher).unwrap_err();
        assert!(matches!(err, Error::FuseViolation { .. }));
    }

    #[test]
    fn test_missing_base_is_fatal() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "libraries/waregroups.xml", GROUPS);
        let err = distill(dir.path(), &config(), &DiffPatcher).unwrap_err();
        assert!(matches!(err, Error::MissingBase(_)));
    }

    #[test]
    fn test_merge_goods_applies_overlays() {
        let dir = fixture();
        let merged = merge_goods(&GameLayout::new(dir.path()), &config(), &DiffPatcher).unwrap();
        let superfluid = merged
            .children_named("ware")
            .find(|w| w.attr("id") == Some("superfluid"))
            .unwrap();
        assert_eq!(superfluid.children_named("production").count(), 2);
    }
}
