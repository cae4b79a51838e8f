//! Canonical proposal schema plus the single normalization boundary for the
//! legacy field-name drift that accumulated in older datasets
//! (`healthcareIssue` vs `name`, `latitude`/`longitude` vs `lat`/`lng`,
//! `timestamp` vs `created_at`, three id schemes).
//!
//! Adapters call [`Proposal::from_value`] on read so the rest of the service
//! only ever sees canonical field names. Nothing outside this module is
//! allowed to chain legacy fallbacks.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// A healthcare policy proposal tied to a city. The sole domain entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Proposal {
    pub id: String,
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub country: String,
    /// URL path segment derived from `city`. Unique within a collection.
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub policy: String,
    #[serde(default)]
    pub stakeholders: String,
    #[serde(default)]
    pub costs: String,
    #[serde(default)]
    pub metrics: String,
    #[serde(default)]
    pub timeline: String,
    #[serde(default)]
    pub full_text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    /// Creation time. Absent in some legacy records; those sort last in
    /// "latest N" listings.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub submitter_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub institution: String,
}

impl Proposal {
    /// Decodes one record from an arbitrary JSON object, resolving every
    /// known legacy synonym. Returns `None` only for non-object values.
    ///
    /// Missing fields degrade to empty strings / `None` rather than erroring;
    /// shape validation is deliberately not performed here.
    pub fn from_value(value: &Value) -> Option<Proposal> {
        let obj = value.as_object()?;

        let text = |keys: &[&str]| -> String {
            keys.iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str))
                .unwrap_or("")
                .to_string()
        };

        let number = |keys: &[&str]| -> Option<f64> {
            keys.iter().find_map(|k| {
                let v = obj.get(*k)?;
                v.as_f64()
                    .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
            })
        };

        let id = match obj.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(|i| i.to_string())
                .unwrap_or_else(|| n.to_string()),
            _ => String::new(),
        };

        let city = text(&["city"]);
        let title = text(&["title", "name", "healthcareIssue"]);
        let slug = match obj.get("slug").and_then(Value::as_str) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => slugify(&city),
        };

        Some(Proposal {
            id,
            city,
            state: text(&["state"]),
            country: text(&["country"]),
            slug,
            title,
            description: text(&["description"]),
            background: text(&["background"]),
            policy: text(&["policy", "overview"]),
            stakeholders: text(&["stakeholders"]),
            costs: text(&["costs"]),
            metrics: text(&["metrics"]),
            timeline: text(&["timeline"]),
            full_text: text(&["full_text", "fullText", "proposal_text"]),
            tags: decode_tags(obj.get("tags")),
            lat: number(&["lat", "latitude"]),
            lng: number(&["lng", "longitude"]),
            created_at: decode_created_at(obj.get("created_at").or_else(|| obj.get("timestamp"))),
            submitter_name: text(&["submitter_name", "full_name", "fullName"]),
            email: text(&["email"]),
            institution: text(&["institution", "university"]),
        })
    }

    /// Coordinates for map placement. `None` (record excluded from the map
    /// layer, nothing else) when either coordinate is missing or non-finite.
    pub fn map_point(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => Some((lat, lng)),
            _ => None,
        }
    }

    /// Millisecond sort key for "latest N" ordering. Records without a
    /// creation time count as epoch 0 and therefore sort last.
    pub fn created_millis(&self) -> i64 {
        self.created_at.map(|t| t.timestamp_millis()).unwrap_or(0)
    }
}

/// Decodes a whole collection from a JSON value, skipping non-object entries.
pub fn normalize_collection(value: &Value) -> Vec<Proposal> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Proposal::from_value).collect())
        .unwrap_or_default()
}

fn decode_tags(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        // Older CSV imports stored tags as one comma-separated string.
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn decode_created_at(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .ok(),
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single(),
        _ => None,
    }
}

/// Derives the URL slug for a city name: lower-cased, whitespace runs become
/// single hyphens, anything that is not alphanumeric/underscore/hyphen is
/// stripped. Deterministic for identical inputs.
pub fn slugify(city: &str) -> String {
    let lowered = city.trim().to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    let mut pending_hyphen = false;
    for ch in lowered.chars() {
        if ch.is_whitespace() {
            pending_hyphen = !slug.is_empty();
        } else if ch.is_alphanumeric() || ch == '_' || ch == '-' {
            if pending_hyphen {
                slug.push('-');
                pending_hyphen = false;
            }
            slug.push(ch);
        }
    }
    slug.trim_matches('-').to_string()
}

/// Allocates a slug that is unique within the collection. The first holder of
/// a city keeps the plain slug; later collisions get `-2`, `-3`, … suffixes.
/// `skip_id` exempts the record being updated from colliding with itself.
pub fn dedupe_slug(base: &str, existing: &[Proposal], skip_id: Option<&str>) -> String {
    let base = if base.is_empty() { "proposal" } else { base };
    let taken = |candidate: &str| {
        existing
            .iter()
            .any(|p| p.slug == candidate && skip_id != Some(p.id.as_str()))
    };
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{base}-{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Assigns the next record id: max+1 while the whole collection still uses
/// plain integer ids, otherwise a `"p" + epoch-millis` id. Legacy collections
/// mix both schemes, so the integer scheme is only continued when it is
/// unanimous.
pub fn next_id(existing: &[Proposal], now: DateTime<Utc>) -> String {
    if existing.is_empty() {
        return "1".to_string();
    }
    let mut max = i64::MIN;
    for p in existing {
        match p.id.parse::<i64>() {
            Ok(n) => max = max.max(n),
            Err(_) => return format!("p{}", now.timestamp_millis()),
        }
    }
    (max + 1).to_string()
}

/// Fields accepted from the admin creation form. `id`, `slug` and
/// `created_at` are assigned by the store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProposalDraft {
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub country: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub policy: String,
    #[serde(default)]
    pub stakeholders: String,
    #[serde(default)]
    pub costs: String,
    #[serde(default)]
    pub metrics: String,
    #[serde(default)]
    pub timeline: String,
    #[serde(default)]
    pub full_text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub submitter_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub institution: String,
}

/// Partial update applied on top of an existing record. The slug is
/// re-derived only when `city` is present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProposalPatch {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub background: Option<String>,
    pub policy: Option<String>,
    pub stakeholders: Option<String>,
    pub costs: Option<String>,
    pub metrics: Option<String>,
    pub timeline: Option<String>,
    pub full_text: Option<String>,
    pub tags: Option<Vec<String>>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub submitter_name: Option<String>,
    pub email: Option<String>,
    pub institution: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_proposal(id: &str, city: &str, slug: &str) -> Proposal {
        Proposal {
            id: id.to_string(),
            city: city.to_string(),
            state: String::new(),
            country: String::new(),
            slug: slug.to_string(),
            title: format!("{city} proposal"),
            description: String::new(),
            background: String::new(),
            policy: String::new(),
            stakeholders: String::new(),
            costs: String::new(),
            metrics: String::new(),
            timeline: String::new(),
            full_text: String::new(),
            tags: vec![],
            lat: None,
            lng: None,
            created_at: None,
            submitter_name: String::new(),
            email: String::new(),
            institution: String::new(),
        }
    }

    #[test]
    fn test_slugify_multi_word_city() {
        assert_eq!(slugify("New Delhi"), "new-delhi");
    }

    #[test]
    fn test_slugify_trims_whitespace() {
        assert_eq!(slugify(" Ithaca "), "ithaca");
    }

    #[test]
    fn test_slugify_strips_non_word_characters() {
        assert_eq!(slugify("St. John's"), "st-johns");
        assert_eq!(slugify("São Paulo"), "são-paulo");
    }

    #[test]
    fn test_slugify_is_deterministic() {
        assert_eq!(slugify("Springfield"), slugify("Springfield"));
    }

    #[test]
    fn test_slugify_collapses_whitespace_runs() {
        assert_eq!(slugify("Rio  de   Janeiro"), "rio-de-janeiro");
    }

    #[test]
    fn test_dedupe_slug_suffixes_on_collision() {
        let existing = vec![
            make_proposal("1", "Springfield", "springfield"),
            make_proposal("2", "Springfield", "springfield-2"),
        ];
        assert_eq!(
            dedupe_slug("springfield", &existing, None),
            "springfield-3"
        );
    }

    #[test]
    fn test_dedupe_slug_skips_own_record_on_update() {
        let existing = vec![make_proposal("1", "Springfield", "springfield")];
        assert_eq!(
            dedupe_slug("springfield", &existing, Some("1")),
            "springfield"
        );
    }

    #[test]
    fn test_dedupe_slug_empty_base_falls_back() {
        assert_eq!(dedupe_slug("", &[], None), "proposal");
    }

    #[test]
    fn test_next_id_continues_integer_scheme() {
        let existing = vec![
            make_proposal("3", "Cairo", "cairo"),
            make_proposal("7", "Giza", "giza"),
        ];
        assert_eq!(next_id(&existing, Utc::now()), "8");
    }

    #[test]
    fn test_next_id_empty_collection_starts_at_one() {
        assert_eq!(next_id(&[], Utc::now()), "1");
    }

    #[test]
    fn test_next_id_falls_back_to_timestamp_on_mixed_ids() {
        let existing = vec![
            make_proposal("3", "Cairo", "cairo"),
            make_proposal("p1700000000000", "Giza", "giza"),
        ];
        let now = Utc.timestamp_millis_opt(1_720_000_000_000).single().unwrap();
        assert_eq!(next_id(&existing, now), "p1720000000000");
    }

    #[test]
    fn test_from_value_resolves_title_synonyms() {
        let newer = Proposal::from_value(&json!({"id": 1, "city": "Pune", "name": "Clean Water"}))
            .unwrap();
        assert_eq!(newer.title, "Clean Water");

        let older = Proposal::from_value(
            &json!({"id": 2, "city": "Pune", "healthcareIssue": "Vaccination Drive"}),
        )
        .unwrap();
        assert_eq!(older.title, "Vaccination Drive");
    }

    #[test]
    fn test_from_value_resolves_coordinate_synonyms() {
        let older = Proposal::from_value(
            &json!({"id": 1, "city": "Lima", "latitude": -12.04, "longitude": -77.03}),
        )
        .unwrap();
        assert_eq!(older.lat, Some(-12.04));
        assert_eq!(older.lng, Some(-77.03));

        let newer =
            Proposal::from_value(&json!({"id": 2, "city": "Lima", "lat": -12.0, "lng": -77.0}))
                .unwrap();
        assert_eq!(newer.map_point(), Some((-12.0, -77.0)));
    }

    #[test]
    fn test_from_value_epoch_millis_timestamp() {
        let p = Proposal::from_value(
            &json!({"id": 1, "city": "Oslo", "title": "T", "timestamp": 1_700_000_000_000i64}),
        )
        .unwrap();
        assert_eq!(p.created_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_from_value_numeric_id_and_derived_slug() {
        let p = Proposal::from_value(&json!({"id": 42, "city": "New Delhi"})).unwrap();
        assert_eq!(p.id, "42");
        assert_eq!(p.slug, "new-delhi");
    }

    #[test]
    fn test_from_value_comma_separated_tags() {
        let p = Proposal::from_value(
            &json!({"id": 1, "city": "Pune", "tags": "rural, insurance , access"}),
        )
        .unwrap();
        assert_eq!(p.tags, vec!["rural", "insurance", "access"]);
    }

    #[test]
    fn test_from_value_legacy_submitter_fields() {
        let p = Proposal::from_value(&json!({
            "id": 1,
            "city": "Accra",
            "fullName": "Ama Mensah",
            "university": "University of Ghana",
            "proposal_text": "Full narrative."
        }))
        .unwrap();
        assert_eq!(p.submitter_name, "Ama Mensah");
        assert_eq!(p.institution, "University of Ghana");
        assert_eq!(p.full_text, "Full narrative.");
    }

    #[test]
    fn test_map_point_excludes_partial_coordinates() {
        let mut p = make_proposal("1", "Cairo", "cairo");
        p.lat = Some(30.0);
        assert_eq!(p.map_point(), None);
        p.lng = Some(f64::NAN);
        assert_eq!(p.map_point(), None);
    }

    #[test]
    fn test_normalize_collection_skips_non_objects() {
        let value = json!([{"id": 1, "city": "Cairo", "title": "A"}, "stray", 7]);
        let records = normalize_collection(&value);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].slug, "cairo");
    }
}
