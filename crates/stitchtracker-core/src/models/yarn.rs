use serde::{Deserialize, Serialize};

use super::deserialize_decimal;

/// A yarn in the stash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Yarn {
    pub id: i64,
    #[serde(default)]
    pub weight: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub colour_name: Option<String>,
    #[serde(default)]
    pub colour: String,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub amount_per_skein: String,
    #[serde(default)]
    pub product_link: String,
    #[serde(default, deserialize_with = "deserialize_decimal")]
    pub quantity_owned_skeins: Option<f64>,
}

impl Yarn {
    /// "Brand - Colour (weight)"
    pub fn display_name(&self) -> String {
        let colour = self
            .colour_name
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.colour);
        format!("{} - {} ({})", self.brand, colour, self.weight)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct YarnInput {
    pub weight: String,
    pub brand: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colour_name: Option<String>,
    pub colour: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    pub amount_per_skein: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub product_link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity_owned_skeins: Option<f64>,
}

/// Link between a project and a stash yarn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectYarnLink {
    #[serde(default, skip_serializing)]
    pub id: i64,
    pub project: i64,
    pub yarn: i64,
    #[serde(default, deserialize_with = "deserialize_decimal")]
    pub quantity_used_skeins: Option<f64>,
}
