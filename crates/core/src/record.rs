//! Record shapes at the two ends of the harvester.
//!
//! `RawRecord` is the boundary type for one entry of the source API's
//! `results` array. Every field is optional and tolerant of the loose JSON
//! typing the API produces; absent keys become `None`, never an error.
//! `NormalizedRecord` is the fixed schema published to the transport, one
//! flat JSON object per message.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

/// One recall notice as returned by the source API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub reference_fiche: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ndeg_de_version: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub nature_juridique_du_rappel: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub categorie_de_produit: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sous_categorie_de_produit: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub nom_de_la_marque_du_produit: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub noms_des_modeles_ou_references: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub risques_encourus_par_le_consommateur: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description_complementaire_du_risque: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub preconisations_sanitaires: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub conduites_a_tenir_par_le_consommateur: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub modalites_de_compensation: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub informations_complementaires_publiques: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date_de_publication: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub distributeurs: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub liens_vers_les_images: Option<String>,
}

/// A page of the source API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcePage {
    #[serde(default)]
    pub results: Vec<RawRecord>,
    #[serde(default)]
    pub total_count: Option<u64>,
}

/// Normalized, translated recall record.
///
/// Text fields are either `None` or whitespace-normalized. Instances are
/// immutable once produced and shared read-only by both aggregators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub reference_sheet: Option<String>,
    pub version: Option<String>,
    pub legal_nature: Option<String>,
    pub product_category: Option<String>,
    pub sub_category: Option<String>,
    pub brand_name: Option<String>,
    pub product_models: Option<String>,
    pub risk_description: Option<String>,
    pub consumer_recommendations: Option<String>,
    pub compensation_methods: Option<String>,
    pub additional_information: Option<String>,
    pub date_of_publication: Option<NaiveDate>,
    pub distributors: Option<String>,
    pub image_url: Option<String>,
}

impl NormalizedRecord {
    /// Identity used for idempotent-consumer deduplication.
    pub fn dedup_key(&self) -> Option<(&str, Option<&str>)> {
        self.reference_sheet
            .as_deref()
            .map(|sheet| (sheet, self.version.as_deref()))
    }
}

/// Parses the source's publication date.
///
/// Accepts RFC 3339 timestamps, naive `YYYY-MM-DDTHH:MM:SS` and plain dates.
pub fn parse_publication_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(ts.date());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    NaiveDate::parse_from_str(raw, "%d/%m/%Y").ok()
}

/// Accepts strings, numbers, booleans and arrays of scalars.
///
/// Arrays are joined with `" | "`, matching how the source renders
/// multi-valued fields such as image links.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(scalar_to_string))
}

fn scalar_to_string(value: serde_json::Value) -> Option<String> {
    use serde_json::Value;

    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.into_iter().filter_map(scalar_to_string).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" | "))
            }
        }
        Value::Object(_) => None,
    }
}
