//! Entity index over the merged wares library
//!
//! One pass over every `<ware>` produces the lookup tables the rest of the
//! pipeline joins against. The classification rules are independent, so a
//! single ware can be a tradable good, a module and a recipe source at once.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

use crate::document::Element;

/// Method every ware is expected to define; modules fall back to it
pub const DEFAULT_METHOD: &str = "default";

/// Cargo transport class of a ware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Container,
    Solid,
    Liquid,
    Other,
}

impl Transport {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "container" => Transport::Container,
            "solid" => Transport::Solid,
            "liquid" => Transport::Liquid,
            _ => Transport::Other,
        }
    }

    /// Only cargo that fits a station's storage modules is tradable
    pub fn is_tradable(self) -> bool {
        !matches!(self, Transport::Other)
    }
}

/// A tradable ware
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoodsRecord {
    pub id: String,
    pub name_id: String,
    /// Display text; holds the raw token until localization backfills it
    pub name: String,
    pub transport: Transport,
    pub volume: u64,
    pub min_price: u64,
    pub price: u64,
    pub max_price: u64,
    pub group: String,
}

/// One production method of one ware
#[derive(Debug, Clone, PartialEq)]
pub struct ProductionRecipe {
    pub ware: String,
    pub method: String,
    /// Cycle time in seconds
    pub time: f64,
    /// Units produced per cycle
    pub amount: u64,
    /// Ware id → units consumed per cycle
    pub inputs: BTreeMap<String, u64>,
    /// Workforce efficiency bonus (`work` effect product)
    pub efficiency: Option<f64>,
}

impl ProductionRecipe {
    /// Factor turning per-cycle quantities into per-hour rates
    pub fn hourly_factor(&self) -> f64 {
        3600.0 / self.time
    }
}

/// A module ware, keyed by the macro it builds
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleStub {
    /// Macro id from `<component ref>`
    pub id: String,
    pub ware_id: String,
    pub name_id: String,
    pub build_cost: BTreeMap<String, u64>,
    pub build_time: f64,
}

/// Recipes by ware, then method
#[derive(Debug, Clone, Default)]
pub struct RecipeBook {
    recipes: BTreeMap<String, BTreeMap<String, ProductionRecipe>>,
}

impl RecipeBook {
    pub fn insert(&mut self, recipe: ProductionRecipe) {
        self.recipes
            .entry(recipe.ware.clone())
            .or_default()
            .insert(recipe.method.clone(), recipe);
    }

    /// Exact (ware, method) lookup
    pub fn get(&self, ware: &str, method: &str) -> Option<&ProductionRecipe> {
        self.recipes.get(ware)?.get(method)
    }

    /// Recipe for `method`, falling back to the ware's default method
    pub fn select(&self, ware: &str, method: &str) -> Option<&ProductionRecipe> {
        self.get(ware, method)
            .or_else(|| self.get(ware, DEFAULT_METHOD))
    }

    pub fn methods(&self, ware: &str) -> impl Iterator<Item = &ProductionRecipe> {
        self.recipes.get(ware).into_iter().flat_map(|m| m.values())
    }

    pub fn len(&self) -> usize {
        self.recipes.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

/// Method → ware → units consumed per workforce unit per second
pub type ConsumptionRates = BTreeMap<String, BTreeMap<String, f64>>;

/// Everything derived from the merged wares library
#[derive(Debug, Clone, Default)]
pub struct EntityIndex {
    pub goods: Vec<GoodsRecord>,
    pub modules: Vec<ModuleStub>,
    pub recipes: RecipeBook,
    pub consumption: ConsumptionRates,
    /// Display tokens the localization stage must resolve
    pub required_tokens: BTreeSet<String>,
}

/// Build the entity index from a merged `<wares>` document
///
/// `workforce_ware` is the sentinel ware whose recipes describe the upkeep
/// of one workforce unit.
pub fn build_index(wares: &Element, workforce_ware: &str) -> EntityIndex {
    let mut index = EntityIndex::default();
    // macro ref -> position in `index.modules`
    let mut claimed: HashMap<String, usize> = HashMap::new();

    for ware in wares.children_named("ware") {
        let Some(id) = ware.attr("id") else {
            warn!("ware without id, skipping");
            continue;
        };

        let name_id = ware.attr("name").unwrap_or_default();
        let transport_raw = ware.attr("transport").unwrap_or_default();
        let transport = Transport::parse(transport_raw);
        let is_module = has_tag(ware, "module");

        for production in ware.children_named("production") {
            if let Some(recipe) = parse_recipe(id, production) {
                index.recipes.insert(recipe);
            }
        }

        if transport.is_tradable() && !is_module {
            index.goods.push(goods_record(id, name_id, transport, ware));
            index.required_tokens.insert(name_id.to_string());
        }

        if is_module {
            if let Some(component) = ware.child("component").and_then(|c| c.attr("ref")) {
                let stub = module_stub(id, name_id, component, ware);
                index.required_tokens.insert(name_id.to_string());
                match claimed.get(component) {
                    Some(&slot) => {
                        warn!(
                            ware = id,
                            replaced = %index.modules[slot].ware_id,
                            component,
                            "macro claimed again, later module ware wins"
                        );
                        index.modules[slot] = stub;
                    }
                    None => {
                        claimed.insert(component.to_string(), index.modules.len());
                        index.modules.push(stub);
                    }
                }
            } else {
                debug!(ware = id, "module ware without component reference");
            }
        }

        if id == workforce_ware && transport_raw == "workunit" {
            for production in ware.children_named("production") {
                if let Some(recipe) = parse_recipe(id, production) {
                    index
                        .consumption
                        .insert(recipe.method.clone(), consumption_rates(&recipe));
                }
            }
        }
    }

    index.required_tokens.remove("");

    info!(
        goods = index.goods.len(),
        modules = index.modules.len(),
        recipes = index.recipes.len(),
        workforce_methods = index.consumption.len(),
        "indexed wares"
    );

    index
}

fn has_tag(ware: &Element, tag: &str) -> bool {
    ware.attr("tags")
        .map(|tags| tags.split_whitespace().any(|t| t == tag))
        .unwrap_or(false)
}

fn goods_record(id: &str, name_id: &str, transport: Transport, ware: &Element) -> GoodsRecord {
    let price = ware.child("price");
    let price_of = |attr: &str| price.and_then(|p| attr_u64(p, attr)).unwrap_or(0);

    GoodsRecord {
        id: id.to_string(),
        name_id: name_id.to_string(),
        name: name_id.to_string(),
        transport,
        volume: attr_u64(ware, "volume").unwrap_or(1),
        min_price: price_of("min"),
        price: price_of("average"),
        max_price: price_of("max"),
        group: ware.attr("group").unwrap_or_default().to_string(),
    }
}

fn module_stub(id: &str, name_id: &str, component: &str, ware: &Element) -> ModuleStub {
    let default = ware
        .children_named("production")
        .find(|p| p.attr("method").unwrap_or(DEFAULT_METHOD) == DEFAULT_METHOD);

    ModuleStub {
        id: component.to_string(),
        ware_id: id.to_string(),
        name_id: name_id.to_string(),
        build_cost: default.map(primary_wares).unwrap_or_default(),
        build_time: default.and_then(|p| attr_f64(p, "time")).unwrap_or(0.0),
    }
}

/// Parse one `<production>` entry; recipes without a positive time and
/// amount cannot be turned into rates and are dropped
fn parse_recipe(ware: &str, production: &Element) -> Option<ProductionRecipe> {
    let method = production.attr("method").unwrap_or(DEFAULT_METHOD);
    let time = attr_f64(production, "time").unwrap_or(0.0);
    let amount = attr_u64(production, "amount").unwrap_or(0);

    if time <= 0.0 || amount == 0 {
        debug!(ware, method, time, amount, "ignoring recipe without positive time and amount");
        return None;
    }

    let efficiency = production
        .child("effects")
        .into_iter()
        .flat_map(|effects| effects.children_named("effect"))
        .find(|effect| effect.attr("type") == Some("work"))
        .and_then(|effect| attr_f64(effect, "product"));

    Some(ProductionRecipe {
        ware: ware.to_string(),
        method: method.to_string(),
        time,
        amount,
        inputs: primary_wares(production),
        efficiency,
    })
}

fn primary_wares(production: &Element) -> BTreeMap<String, u64> {
    let mut wares = BTreeMap::new();
    if let Some(primary) = production.child("primary") {
        for input in primary.children_named("ware") {
            if let (Some(id), Some(amount)) = (input.attr("ware"), attr_u64(input, "amount")) {
                *wares.entry(id.to_string()).or_insert(0) += amount;
            }
        }
    }
    wares
}

/// Per-second upkeep of one workforce unit under a recipe
fn consumption_rates(recipe: &ProductionRecipe) -> BTreeMap<String, f64> {
    let divisor = recipe.amount as f64 * recipe.time;
    recipe
        .inputs
        .iter()
        .map(|(ware, amount)| (ware.clone(), *amount as f64 / divisor))
        .collect()
}

pub(crate) fn attr_f64(element: &Element, name: &str) -> Option<f64> {
    element.attr(name)?.trim().parse().ok()
}

pub(crate) fn attr_u64(element: &Element, name: &str) -> Option<u64> {
    let raw = element.attr(name)?.trim();
    raw.parse::<u64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WARES: &str = r#"<wares>
  <ware id="energycells" name="{20201,601}" transport="container" volume="6" group="energy" tags="container economy">
    <price min="10" average="16" max="22"/>
    <production time="60" amount="175" method="default">
      <effects><effect type="work" product="0.43"/></effects>
    </production>
  </ware>
  <ware id="water" name="{20201,2101}" transport="liquid" group="water">
    <production time="120" amount="100" method="default">
      <primary><ware ware="ice" amount="80"/><ware ware="energycells" amount="20"/></primary>
    </production>
    <production time="90" amount="100" method="terran">
      <primary><ware ware="ice" amount="60"/></primary>
    </production>
  </ware>
  <ware id="module_arg_prod_water_01" name="{20104,11101}" transport="container" tags="module">
    <production time="3600" amount="1" method="default">
      <primary><ware ware="claytronics" amount="25"/><ware ware="energycells" amount="400"/></primary>
    </production>
    <component ref="prod_arg_water_macro"/>
  </ware>
  <ware id="module_decor" name="{20104,99}" transport="container" tags="module">
    <component ref="struct_decor_macro"/>
  </ware>
  <ware id="workunit_busy" name="{20201,9901}" transport="workunit">
    <production time="600" amount="500" method="default">
      <primary><ware ware="foodrations" amount="10"/><ware ware="medicalsupplies" amount="5"/></primary>
    </production>
    <production time="600" amount="500" method="teladi">
      <primary><ware ware="nostropoil" amount="15"/></primary>
    </production>
  </ware>
  <ware id="ship_ware" name="{20101,1}" transport="ship"/>
</wares>"#;

    fn index() -> EntityIndex {
        build_index(&Element::parse(WARES).unwrap(), "workunit_busy")
    }

    #[test]
    fn test_tradable_goods() {
        let index = index();
        let ids: Vec<&str> = index.goods.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, ["energycells", "water"]);

        let ec = &index.goods[0];
        assert_eq!(ec.transport, Transport::Container);
        assert_eq!((ec.min_price, ec.price, ec.max_price), (10, 16, 22));
        assert_eq!(ec.volume, 6);
        assert_eq!(ec.group, "energy");
        assert_eq!(ec.name, "{20201,601}");

        let water = &index.goods[1];
        assert_eq!(water.volume, 1);
        assert_eq!(water.price, 0);
    }

    #[test]
    fn test_module_stubs_take_default_recipe_unscaled() {
        let index = index();
        assert_eq!(index.modules.len(), 2);

        let stub = &index.modules[0];
        assert_eq!(stub.id, "prod_arg_water_macro");
        assert_eq!(stub.ware_id, "module_arg_prod_water_01");
        assert_eq!(stub.build_time, 3600.0);
        assert_eq!(stub.build_cost.get("claytronics"), Some(&25));
        assert_eq!(stub.build_cost.get("energycells"), Some(&400));

        let decor = &index.modules[1];
        assert!(decor.build_cost.is_empty());
        assert_eq!(decor.build_time, 0.0);
    }

    #[test]
    fn test_recipes_indexed_for_every_ware() {
        let index = index();
        let water = index.recipes.get("water", "terran").unwrap();
        assert_eq!(water.time, 90.0);
        assert_eq!(water.inputs.get("ice"), Some(&60));

        assert!(index.recipes.get("module_arg_prod_water_01", "default").is_some());
        assert_eq!(index.recipes.get("energycells", "default").unwrap().efficiency, Some(0.43));
    }

    #[test]
    fn test_select_falls_back_to_default() {
        let index = index();
        let recipe = index.recipes.select("water", "boron").unwrap();
        assert_eq!(recipe.method, "default");
        assert!(index.recipes.select("unknown", "default").is_none());
    }

    #[test]
    fn test_workforce_consumption_rates() {
        let index = index();
        let default = &index.consumption["default"];
        assert_eq!(default["foodrations"], 10.0 / (500.0 * 600.0));
        assert_eq!(default["medicalsupplies"], 5.0 / (500.0 * 600.0));
        assert_eq!(index.consumption["teladi"]["nostropoil"], 15.0 / (500.0 * 600.0));
    }

    #[test]
    fn test_required_tokens() {
        let index = index();
        let tokens: Vec<&str> = index.required_tokens.iter().map(|s| s.as_str()).collect();
        assert_eq!(tokens, ["{20104,11101}", "{20104,99}", "{20201,2101}", "{20201,601}"]);
    }

    #[test]
    fn test_later_module_ware_claims_macro() {
        let wares = Element::parse(
            r#"<wares>
                <ware id="module_old" name="{1,1}" tags="module"><component ref="shared_macro"/></ware>
                <ware id="module_other" name="{1,2}" tags="module"><component ref="other_macro"/></ware>
                <ware id="module_new" name="{1,3}" tags="module">
                  <production time="60" amount="1"><primary><ware ware="ore" amount="5"/></primary></production>
                  <component ref="shared_macro"/>
                </ware>
            </wares>"#,
        )
        .unwrap();
        let index = build_index(&wares, "workunit_busy");

        let ids: Vec<&str> = index.modules.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["shared_macro", "other_macro"]);
        assert_eq!(index.modules[0].ware_id, "module_new");
        assert_eq!(index.modules[0].name_id, "{1,3}");
        assert_eq!(index.modules[0].build_cost.get("ore"), Some(&5));
    }

    #[test]
    fn test_invalid_recipe_dropped() {
        let wares = Element::parse(
            r#"<wares><ware id="x" transport="solid"><production time="0" amount="5"/></ware></wares>"#,
        )
        .unwrap();
        let index = build_index(&wares, "workunit_busy");
        assert!(index.recipes.is_empty());
        assert_eq!(index.goods.len(), 1);
    }
}
