//! Observation - the fundamental unit of the ledger.
//!
//! One durable record of something the agent or a tool saw or decided.
//! Create-only from the agent's perspective; internal enrichment (importance
//! autograde, embedding backfill) is the only mutation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use unicode_normalization::UnicodeNormalization;

/// A stored observation row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: i64,
    pub ts: String,
    pub kind: Option<String>,
    pub summary: Option<String>,
    pub summary_en: Option<String>,
    pub lang: Option<String>,
    pub tool_name: Option<String>,
    pub detail_json: String,
}

impl Observation {
    /// Parse `detail_json`; malformed blobs read as an empty object so the
    /// callers never fail on legacy rows.
    pub fn detail(&self) -> Value {
        serde_json::from_str(&self.detail_json).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    /// Stable reference string: `obs:<id>`.
    pub fn record_ref(&self) -> String {
        format!("obs:{}", self.id)
    }

    /// Preferred packed text: English summary over the original.
    pub fn packed_text(&self) -> Option<&str> {
        self.summary_en
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.summary.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

/// Fields accepted on insert; everything optional, unknown producer keys are
/// folded into `detail` by the ingest layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationInput {
    pub ts: Option<String>,
    pub kind: Option<String>,
    pub summary: Option<String>,
    pub summary_en: Option<String>,
    pub lang: Option<String>,
    pub tool_name: Option<String>,
    pub detail: Option<Value>,
}

/// Coerce any detail payload to a JSON object.
///
/// Strings become `{"_raw_detail": s}`; other non-object values become
/// `{"_detail": v}`; null and absent become `{}`.
pub fn normalize_detail(detail: Option<Value>) -> Map<String, Value> {
    match detail {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(Value::String(s)) => {
            let mut map = Map::new();
            map.insert("_raw_detail".to_string(), Value::String(s));
            map
        }
        Some(other) => {
            let mut map = Map::new();
            map.insert("_detail".to_string(), other);
            map
        }
    }
}

// ============================================================================
// TRUST TIERS
// ============================================================================

/// Provenance trust tier; closed set with an explicit unknown fallthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrustTier {
    Trusted,
    Untrusted,
    Quarantined,
    #[default]
    Unknown,
}

impl TrustTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustTier::Trusted => "trusted",
            TrustTier::Untrusted => "untrusted",
            TrustTier::Quarantined => "quarantined",
            TrustTier::Unknown => "unknown",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        let key: String = s.nfkc().collect::<String>().trim().to_lowercase();
        match key.as_str() {
            "trusted" => TrustTier::Trusted,
            "untrusted" => TrustTier::Untrusted,
            "quarantined" | "quarantine" => TrustTier::Quarantined,
            _ => TrustTier::Unknown,
        }
    }

    /// Read the tier from `detail.trust`, `detail.trust_tier`, or any
    /// string field nested under `detail.provenance`.
    pub fn from_detail(detail: &Value) -> Self {
        for key in ["trust", "trust_tier"] {
            if let Some(s) = detail.get(key).and_then(Value::as_str) {
                let tier = Self::parse_name(s);
                if tier != TrustTier::Unknown {
                    return tier;
                }
            }
        }
        if let Some(Value::Object(prov)) = detail.get("provenance") {
            for v in prov.values() {
                if let Some(s) = v.as_str() {
                    let tier = Self::parse_name(s);
                    if tier != TrustTier::Unknown {
                        return tier;
                    }
                }
            }
        }
        TrustTier::Unknown
    }
}

impl std::fmt::Display for TrustTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_detail_object_passthrough() {
        let map = normalize_detail(Some(json!({"ok": true})));
        assert_eq!(map.get("ok"), Some(&json!(true)));
    }

    #[test]
    fn test_normalize_detail_wraps_scalars() {
        let map = normalize_detail(Some(json!("raw text")));
        assert_eq!(map.get("_raw_detail"), Some(&json!("raw text")));

        let map = normalize_detail(Some(json!(42)));
        assert_eq!(map.get("_detail"), Some(&json!(42)));

        let map = normalize_detail(Some(json!([1, 2])));
        assert_eq!(map.get("_detail"), Some(&json!([1, 2])));
    }

    #[test]
    fn test_normalize_detail_null_is_empty_object() {
        assert!(normalize_detail(None).is_empty());
        assert!(normalize_detail(Some(Value::Null)).is_empty());
    }

    #[test]
    fn test_packed_text_prefers_english() {
        let obs = Observation {
            id: 1,
            ts: "2026-02-04T13:00:00Z".into(),
            kind: None,
            summary: Some("사과".into()),
            summary_en: Some("apple".into()),
            lang: Some("ko".into()),
            tool_name: None,
            detail_json: "{}".into(),
        };
        assert_eq!(obs.packed_text(), Some("apple"));
        assert_eq!(obs.record_ref(), "obs:1");
    }

    #[test]
    fn test_trust_tier_parsing() {
        assert_eq!(TrustTier::parse_name("trusted"), TrustTier::Trusted);
        assert_eq!(TrustTier::parse_name(" Quarantine "), TrustTier::Quarantined);
        assert_eq!(TrustTier::parse_name("whatever"), TrustTier::Unknown);
    }

    #[test]
    fn test_trust_tier_from_detail() {
        assert_eq!(
            TrustTier::from_detail(&json!({"trust_tier": "untrusted"})),
            TrustTier::Untrusted
        );
        assert_eq!(
            TrustTier::from_detail(&json!({"provenance": {"tier": "quarantine"}})),
            TrustTier::Quarantined
        );
        assert_eq!(TrustTier::from_detail(&json!({})), TrustTier::Unknown);
    }
}
