//! Raw source record to normalized record.

use crate::translate::Enricher;
use pipeline_core::{clean, merge, parse_publication_date, NormalizedRecord, RawRecord};

/// Maps one `RawRecord` onto the normalized schema.
///
/// Never fails: missing keys, unparseable dates and translation failures
/// all become `None`.
#[derive(Debug, Clone)]
pub struct RecordTransformer {
    enricher: Enricher,
}

impl RecordTransformer {
    pub fn new(enricher: Enricher) -> Self {
        Self { enricher }
    }

    async fn translated(&self, text: Option<&String>) -> Option<String> {
        self.enricher.enrich(clean(text.map(String::as_str))).await
    }

    pub async fn transform(&self, raw: &RawRecord) -> NormalizedRecord {
        let (
            legal_nature,
            product_category,
            sub_category,
            risks,
            risk_details,
            health_advice,
            consumer_actions,
            compensation_methods,
            additional_information,
        ) = tokio::join!(
            self.translated(raw.nature_juridique_du_rappel.as_ref()),
            self.translated(raw.categorie_de_produit.as_ref()),
            self.translated(raw.sous_categorie_de_produit.as_ref()),
            self.translated(raw.risques_encourus_par_le_consommateur.as_ref()),
            self.translated(raw.description_complementaire_du_risque.as_ref()),
            self.translated(raw.preconisations_sanitaires.as_ref()),
            self.translated(raw.conduites_a_tenir_par_le_consommateur.as_ref()),
            self.translated(raw.modalites_de_compensation.as_ref()),
            self.translated(raw.informations_complementaires_publiques.as_ref()),
        );

        NormalizedRecord {
            reference_sheet: clean(raw.reference_fiche.as_deref()),
            version: clean(raw.ndeg_de_version.as_deref()),
            legal_nature,
            product_category,
            sub_category,
            brand_name: clean(raw.nom_de_la_marque_du_produit.as_deref()),
            product_models: clean(raw.noms_des_modeles_ou_references.as_deref()),
            risk_description: merge(risks, risk_details),
            consumer_recommendations: merge(health_advice, consumer_actions),
            compensation_methods,
            additional_information,
            date_of_publication: raw
                .date_de_publication
                .as_deref()
                .and_then(parse_publication_date),
            distributors: clean(raw.distributeurs.as_deref()),
            image_url: raw.liens_vers_les_images.clone(),
        }
    }
}
