//! Field extraction from raw external records.
//!
//! The external store addresses fields by opaque identifiers, but webhook
//! payloads and some API responses key them by display label, and labels get
//! renamed by form editors. Extraction therefore tries the exact configured
//! identifier, then the store's internal-prefix spelling, and only then falls
//! back to fuzzy matching against the configured name variants.

use serde_json::Value;
use strsim::normalized_levenshtein;

use crate::store::ExternalFields;

/// Minimum normalized similarity for a fuzzy field-name hit.
const FUZZY_THRESHOLD: f64 = 0.8;

fn fuzzy_matches(a: &str, b: &str) -> bool {
    normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase()) >= FUZZY_THRESHOLD
}

/// Extract a field value by external identifier, with fuzzy fallback.
///
/// Lookup order: exact identifier, `_`-prefixed identifier, then any record
/// key whose name is ≥ 0.8 similar to one of the configured variants. The
/// fuzzy step tolerates the external store renaming a display label at the
/// cost of silently accepting a near-miss.
pub fn extract_field<'a>(
    fields: &'a ExternalFields,
    external_id: &str,
    variants: &[String],
) -> Option<&'a Value> {
    if let Some(value) = extract_key_field(fields, external_id) {
        return Some(value);
    }

    for (key, value) in fields {
        if variants.iter().any(|name| fuzzy_matches(key, name)) {
            return Some(value);
        }
    }

    None
}

/// Extract the natural-key field. Exact and `_`-prefixed lookups only:
/// the upsert conflict target must never come from a fuzzy match.
pub fn extract_key_field<'a>(fields: &'a ExternalFields, external_id: &str) -> Option<&'a Value> {
    if let Some(value) = fields.get(external_id) {
        return Some(value);
    }
    fields.get(&format!("_{external_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(entries: &[(&str, Value)]) -> ExternalFields {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn exact_identifier_wins() {
        let fields = record(&[("1001", json!("exact")), ("_1001", json!("prefixed"))]);
        assert_eq!(
            extract_field(&fields, "1001", &[]).unwrap(),
            &json!("exact")
        );
    }

    #[test]
    fn prefixed_identifier_is_second_choice() {
        let fields = record(&[("_1001", json!("prefixed"))]);
        assert_eq!(
            extract_field(&fields, "1001", &[]).unwrap(),
            &json!("prefixed")
        );
    }

    #[test]
    fn fuzzy_variant_matches_renamed_label() {
        let fields = record(&[("Email Address", json!("a@example.com"))]);
        let variants = vec!["Email Addres".to_string()];
        assert_eq!(
            extract_field(&fields, "1001", &variants).unwrap(),
            &json!("a@example.com")
        );
    }

    #[test]
    fn fuzzy_match_is_case_insensitive() {
        let fields = record(&[("EMPLOYEE NAME", json!("A"))]);
        let variants = vec!["employee name".to_string()];
        assert!(extract_field(&fields, "x", &variants).is_some());
    }

    #[test]
    fn distant_names_do_not_match() {
        let fields = record(&[("Department", json!("Sales"))]);
        let variants = vec!["Email".to_string()];
        assert!(extract_field(&fields, "1001", &variants).is_none());
    }

    #[test]
    fn key_field_never_uses_fuzzy_matching() {
        let fields = record(&[("Employee Id", json!("E-7"))]);
        // A variant that would fuzzy-match must not resolve the key field.
        assert!(extract_key_field(&fields, "1001").is_none());
        assert_eq!(
            extract_key_field(&record(&[("_1001", json!("E-7"))]), "1001").unwrap(),
            &json!("E-7")
        );
    }
}
