//! Source registry: one embedded TOML dataset definition per category.
//!
//! Each `.toml` file in `packages/source/sources/` is baked into the binary
//! at compile time via [`include_str!`] and parsed once on first use.

use std::sync::LazyLock;

use efficiency_index_appliance_models::Category;

use crate::source_def::{SourceDefinition, parse_source_toml};

/// TOML configs embedded at compile time.
const SOURCE_TOMLS: &[(&str, &str)] = &[
    ("refrigerators", include_str!("../sources/refrigerators.toml")),
    ("dishwashers", include_str!("../sources/dishwashers.toml")),
    (
        "clothes_washers",
        include_str!("../sources/clothes_washers.toml"),
    ),
    ("water_heaters", include_str!("../sources/water_heaters.toml")),
];

static DEFINITIONS: LazyLock<Vec<SourceDefinition>> = LazyLock::new(|| {
    SOURCE_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_source_toml(toml).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
});

/// Returns all configured dataset definitions, in category order.
///
/// # Panics
///
/// Panics if any embedded TOML config is malformed.
#[must_use]
pub fn all_sources() -> &'static [SourceDefinition] {
    &DEFINITIONS
}

/// Returns the dataset definition for `category`.
///
/// # Panics
///
/// Panics if the embedded configs do not cover every category, which the
/// registry tests rule out.
#[must_use]
pub fn definition_for(category: Category) -> &'static SourceDefinition {
    all_sources()
        .iter()
        .find(|def| def.category == category)
        .unwrap_or_else(|| panic!("no source definition for {category}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_one_source_per_category() {
        let sources = all_sources();
        assert_eq!(sources.len(), Category::all().len());
        for category in Category::all() {
            assert_eq!(definition_for(*category).category, *category);
        }
    }

    #[test]
    fn dataset_ids_match_portal() {
        let ids: Vec<(Category, &str)> = all_sources()
            .iter()
            .map(|s| (s.category, s.dataset_id.as_str()))
            .collect();
        assert!(ids.contains(&(Category::Refrigerators, "p5st-her9")));
        assert!(ids.contains(&(Category::Dishwashers, "q8py-6w3f")));
        assert!(ids.contains(&(Category::ClothesWashers, "bghd-e2wd")));
        assert!(ids.contains(&(Category::WaterHeaters, "6sbi-yuk2")));
    }

    #[test]
    fn all_sources_have_required_fields() {
        for source in all_sources() {
            assert!(!source.name.is_empty(), "source name is empty");
            assert!(
                !source.fields.manufacturer.is_empty(),
                "{}: no manufacturer fields",
                source.category
            );
            assert!(
                !source.fields.model_number.is_empty(),
                "{}: no model_number fields",
                source.category
            );
            assert!(
                source.csv_export_url().ends_with("rows.csv?accessType=DOWNLOAD"),
                "{}: bad export url",
                source.category
            );
        }
    }
}
