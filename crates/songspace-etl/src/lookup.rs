//! Metadata lookup policy for ingestion.
//!
//! Upstream track records arrive as nested JSON objects grouped by
//! provider (`metadata`, `musicbrainz`, `analysis`, ...). These helpers
//! pick display fields out of them with explicit, ordered rules. Nothing
//! here feeds the embedding; it only shapes the descriptive side of a
//! catalog entry.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How many terms or tags are kept per vocabulary.
pub const DEFAULT_TOP_K: usize = 5;

/// An ordered list of `(group, field)` keys. The first key holding a
/// present value wins.
///
/// A value is absent when its group or field is missing, when it is
/// `null` or a blank string, and, with [`FieldLookup::zero_is_missing`],
/// when it is numerically zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLookup {
    keys: Vec<(String, String)>,
    #[serde(default)]
    zero_is_missing: bool,
}

impl FieldLookup {
    pub fn new<I, G, F>(keys: I) -> Self
    where
        I: IntoIterator<Item = (G, F)>,
        G: Into<String>,
        F: Into<String>,
    {
        Self {
            keys: keys
                .into_iter()
                .map(|(group, field)| (group.into(), field.into()))
                .collect(),
            zero_is_missing: false,
        }
    }

    /// Treat `0` as absent, for fields where the source uses it as "unknown".
    #[must_use]
    pub fn zero_is_missing(mut self) -> Self {
        self.zero_is_missing = true;
        self
    }

    /// Release year: MusicBrainz first, then the provider metadata.
    #[must_use]
    pub fn year() -> Self {
        Self::new([("musicbrainz", "year"), ("metadata", "year")]).zero_is_missing()
    }

    #[must_use]
    pub fn keys(&self) -> &[(String, String)] {
        &self.keys
    }

    /// The first present value, if any.
    #[must_use]
    pub fn find<'a>(&self, record: &'a Map<String, Value>) -> Option<&'a Value> {
        self.keys.iter().find_map(|(group, field)| {
            let value = record.get(group)?.as_object()?.get(field)?;
            self.is_present(value).then_some(value)
        })
    }

    /// The first present value that reads as text.
    #[must_use]
    pub fn find_str<'a>(&self, record: &'a Map<String, Value>) -> Option<&'a str> {
        self.keys.iter().find_map(|(group, field)| {
            let value = record.get(group)?.as_object()?.get(field)?;
            let text = value.as_str()?.trim();
            (!text.is_empty()).then_some(text)
        })
    }

    /// The first present value that reads as an integer. Fractional
    /// numbers and numeric strings are truncated.
    #[must_use]
    pub fn find_i64(&self, record: &Map<String, Value>) -> Option<i64> {
        self.keys.iter().find_map(|(group, field)| {
            let value = record.get(group)?.as_object()?.get(field)?;
            let n = as_integer(value)?;
            (!(self.zero_is_missing && n == 0)).then_some(n)
        })
    }

    fn is_present(&self, value: &Value) -> bool {
        match value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::Number(_) if self.zero_is_missing => as_integer(value) != Some(0),
            _ => true,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn as_integer(value: &Value) -> Option<i64> {
    let float = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Some(i);
            }
            n.as_f64()?
        }
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (float.is_finite() && float.abs() < 9.0e18).then(|| float.trunc() as i64)
}

/// Pick up to `k` distinct names by descending weight.
///
/// Pairs with a blank name or a non-finite weight are dropped. Names are
/// compared case-insensitively; the first spelling seen at the highest
/// weight is kept. Equal weights keep their input order.
pub fn top_k_weighted<S: AsRef<str>>(items: &[S], weights: &[f64], k: usize) -> Vec<String> {
    let mut pairs: Vec<(&str, f64)> = items
        .iter()
        .zip(weights)
        .map(|(item, weight)| (item.as_ref().trim(), *weight))
        .filter(|(name, weight)| !name.is_empty() && weight.is_finite())
        .collect();
    pairs.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::with_capacity(k.min(pairs.len()));
    for (name, _) in pairs {
        if result.len() >= k {
            break;
        }
        if seen.insert(name.to_lowercase()) {
            result.push(name.to_string());
        }
    }
    result
}

/// A weighted tag list inside a record: names and their weights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub name: String,
    pub group: String,
    pub items_field: String,
    pub weights_field: String,
}

impl Vocabulary {
    pub fn new(
        name: impl Into<String>,
        group: impl Into<String>,
        items_field: impl Into<String>,
        weights_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            items_field: items_field.into(),
            weights_field: weights_field.into(),
        }
    }

    /// Echo Nest artist terms weighted by relevance.
    #[must_use]
    pub fn artist_terms() -> Self {
        Self::new("terms", "metadata", "artist_terms", "artist_terms_weight")
    }

    /// MusicBrainz artist tags weighted by vote count.
    #[must_use]
    pub fn musicbrainz_tags() -> Self {
        Self::new("mbtags", "musicbrainz", "artist_mbtags", "artist_mbtags_count")
    }

    /// The top `k` entries of this vocabulary in `record`.
    #[must_use]
    pub fn top(&self, record: &Map<String, Value>, k: usize) -> Vec<String> {
        let Some(group) = record.get(&self.group).and_then(Value::as_object) else {
            return Vec::new();
        };
        let items: Vec<&str> = group
            .get(&self.items_field)
            .and_then(Value::as_array)
            .map(|values| values.iter().map(|v| v.as_str().unwrap_or("")).collect())
            .unwrap_or_default();
        let weights: Vec<f64> = group
            .get(&self.weights_field)
            .and_then(Value::as_array)
            .map(|values| values.iter().map(|v| v.as_f64().unwrap_or(f64::NAN)).collect())
            .unwrap_or_default();
        top_k_weighted(&items, &weights, k)
    }
}

/// Which vocabularies supply the single "genre" label of a track.
///
/// The label is the first entry of the first vocabulary that has any
/// entries. It is a coarse proxy and plays no part in similarity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenrePolicy {
    vocabularies: Vec<Vocabulary>,
    top_k: usize,
}

impl Default for GenrePolicy {
    fn default() -> Self {
        Self::new(
            vec![Vocabulary::artist_terms(), Vocabulary::musicbrainz_tags()],
            DEFAULT_TOP_K,
        )
    }
}

impl GenrePolicy {
    #[must_use]
    pub fn new(vocabularies: Vec<Vocabulary>, top_k: usize) -> Self {
        Self {
            vocabularies,
            top_k,
        }
    }

    /// A policy that never assigns a genre.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Vec::new(), DEFAULT_TOP_K)
    }

    #[must_use]
    pub fn vocabularies(&self) -> &[Vocabulary] {
        &self.vocabularies
    }

    /// Top entries per vocabulary, in policy order.
    #[must_use]
    pub fn tags(&self, record: &Map<String, Value>) -> Vec<(String, Vec<String>)> {
        self.vocabularies
            .iter()
            .map(|vocab| (vocab.name.clone(), vocab.top(record, self.top_k)))
            .collect()
    }

    /// Pick the genre label from already extracted tag lists.
    #[must_use]
    pub fn pick(tags: &[(String, Vec<String>)]) -> Option<String> {
        tags.iter().find_map(|(_, entries)| entries.first().cloned())
    }

    #[must_use]
    pub fn genre(&self, record: &Map<String, Value>) -> Option<String> {
        Self::pick(&self.tags(record))
    }
}

/// Descriptive fields of one track, extracted with the policies above.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub track_id: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub release: Option<String>,
    pub year: Option<i64>,
    pub genre: Option<String>,
    /// Top entries per vocabulary, keyed by vocabulary name.
    pub tags: Vec<(String, Vec<String>)>,
}

impl TrackSummary {
    /// Summarize `record`. Returns `None` without a track id, since such a
    /// record cannot be joined to its features.
    #[must_use]
    pub fn extract(record: &Map<String, Value>, genres: &GenrePolicy) -> Option<Self> {
        let track_id = FieldLookup::new([("analysis", "track_id"), ("metadata", "track_id")])
            .find_str(record)?
            .to_string();
        let text = |group: &str, field: &str| {
            FieldLookup::new([(group, field)])
                .find_str(record)
                .map(str::to_string)
        };
        let tags = genres.tags(record);
        Some(Self {
            track_id,
            title: text("metadata", "title"),
            artist: text("metadata", "artist_name"),
            release: text("metadata", "release"),
            year: FieldLookup::year().find_i64(record),
            genre: GenrePolicy::pick(&tags),
            tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn test_first_present_key_wins() {
        let lookup = FieldLookup::year();
        let r = record(json!({
            "musicbrainz": {"year": 1994},
            "metadata": {"year": 1990}
        }));
        assert_eq!(lookup.find_i64(&r), Some(1994));
        assert_eq!(lookup.find(&r), Some(&json!(1994)));
    }

    #[test]
    fn test_zero_falls_through_to_next_key() {
        let lookup = FieldLookup::year();
        let r = record(json!({
            "musicbrainz": {"year": 0},
            "metadata": {"year": 1990.0}
        }));
        assert_eq!(lookup.find_i64(&r), Some(1990));

        let r = record(json!({"musicbrainz": {"year": 0}, "metadata": {"year": 0}}));
        assert_eq!(lookup.find_i64(&r), None);
        assert_eq!(lookup.find(&r), None);
    }

    #[test]
    fn test_missing_groups_null_and_blank_values() {
        let lookup = FieldLookup::new([("a", "x"), ("b", "x"), ("c", "x")]);
        let r = record(json!({"a": {"x": null}, "b": {"x": "  "}, "c": {"x": "found"}}));
        assert_eq!(lookup.find_str(&r), Some("found"));
        assert_eq!(lookup.find_str(&record(json!({}))), None);
        assert_eq!(lookup.keys().len(), 3);
    }

    #[test]
    fn test_zero_is_a_value_unless_configured() {
        let lookup = FieldLookup::new([("analysis", "key")]);
        let r = record(json!({"analysis": {"key": 0}}));
        assert_eq!(lookup.find_i64(&r), Some(0));
    }

    #[test]
    fn test_numeric_strings_and_fractions_truncate() {
        let lookup = FieldLookup::new([("m", "year")]);
        assert_eq!(lookup.find_i64(&record(json!({"m": {"year": "2001"}}))), Some(2001));
        assert_eq!(lookup.find_i64(&record(json!({"m": {"year": 1999.9}}))), Some(1999));
        assert_eq!(lookup.find_i64(&record(json!({"m": {"year": "n/a"}}))), None);
    }

    #[test]
    fn test_top_k_weighted() {
        let items = ["rock", "Pop", "ROCK", "jazz", "", "blues", "pop", "funk"];
        let weights = [0.9, 0.8, 0.95, 0.5, 1.0, f64::NAN, 0.7, 0.1];
        let top = top_k_weighted(&items, &weights, 3);
        assert_eq!(top, vec!["ROCK", "Pop", "jazz"]);
        assert!(top_k_weighted(&items, &weights, 0).is_empty());
        assert_eq!(top_k_weighted(&items, &weights, 10).len(), 4);
    }

    #[test]
    fn test_top_k_ties_keep_input_order() {
        let top = top_k_weighted(&["b", "a", "c"], &[1.0, 1.0, 1.0], 2);
        assert_eq!(top, vec!["b", "a"]);
    }

    #[test]
    fn test_genre_policy_falls_back_through_vocabularies() {
        let policy = GenrePolicy::default();
        let r = record(json!({
            "metadata": {"artist_terms": [], "artist_terms_weight": []},
            "musicbrainz": {
                "artist_mbtags": ["british", "rock"],
                "artist_mbtags_count": [2, 5]
            }
        }));
        assert_eq!(policy.genre(&r), Some("rock".to_string()));

        let r = record(json!({
            "metadata": {"artist_terms": ["shoegaze"], "artist_terms_weight": [0.3]},
            "musicbrainz": {"artist_mbtags": ["rock"], "artist_mbtags_count": [5]}
        }));
        assert_eq!(policy.genre(&r), Some("shoegaze".to_string()));
        assert_eq!(GenrePolicy::disabled().genre(&r), None);
        assert_eq!(policy.genre(&record(json!({}))), None);
    }

    #[test]
    fn test_track_summary() {
        let r = record(json!({
            "analysis": {"track_id": "TRAAABD128F429CF47"},
            "metadata": {
                "title": "Soul Deep",
                "artist_name": "The Box Tops",
                "release": "Dimensions",
                "year": 1969,
                "artist_terms": ["blue-eyed soul", "pop rock"],
                "artist_terms_weight": [1.0, 0.9]
            },
            "musicbrainz": {"year": 0}
        }));
        let summary = TrackSummary::extract(&r, &GenrePolicy::default()).unwrap();
        assert_eq!(summary.track_id, "TRAAABD128F429CF47");
        assert_eq!(summary.artist.as_deref(), Some("The Box Tops"));
        assert_eq!(summary.year, Some(1969));
        assert_eq!(summary.genre.as_deref(), Some("blue-eyed soul"));
        assert_eq!(summary.tags[0].1, vec!["blue-eyed soul", "pop rock"]);
        assert!(summary.tags[1].1.is_empty());

        assert!(TrackSummary::extract(&record(json!({"metadata": {}})), &GenrePolicy::default())
            .is_none());
    }
}
