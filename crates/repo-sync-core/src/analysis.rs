//! Typed schema for AI code analyses and the tolerant parser that produces it.
//!
//! Model output is untrusted text. [`parse_analysis`] strips Markdown code
//! fences, falls back to the outermost `{...}` span, drops `null` values so
//! serde defaults apply, and only then deserializes into [`CodeAnalysis`].
//! Every field is optional on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SyncError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CodeAnalysis {
    pub summary: String,
    pub search_metadata: SearchMetadata,
    pub imports: Vec<ImportAnalysis>,
    pub functions: Vec<FunctionAnalysis>,
    pub classes: Vec<ClassAnalysis>,
    pub integration_points: Vec<IntegrationPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchMetadata {
    pub primary_features: Vec<String>,
    pub data_types: Vec<String>,
    pub state_management: Vec<String>,
    pub common_modifications: Vec<String>,
    pub dependencies: Dependencies,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dependencies {
    pub external: Vec<String>,
    pub internal: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportAnalysis {
    pub path: String,
    pub items: Vec<String>,
    pub purpose: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FunctionAnalysis {
    pub name: String,
    pub purpose: String,
    pub params: Vec<String>,
    pub returns: String,
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_interactions: Option<StateInteractions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateInteractions {
    pub reads: Vec<String>,
    pub writes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassAnalysis {
    pub name: String,
    pub purpose: String,
    pub methods: Vec<String>,
    pub properties: Vec<String>,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationPoint {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub purpose: String,
}

/// Searchable fields lifted out of an analysis onto the file record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFields {
    pub summary: String,
    pub primary_features: Vec<String>,
    pub data_types: Vec<String>,
    pub state_management: Vec<String>,
    pub common_modifications: Vec<String>,
    pub external_dependencies: Vec<String>,
    pub internal_dependencies: Vec<String>,
    pub integration_points: Vec<String>,
}

impl SearchFields {
    pub fn from_analysis(analysis: &CodeAnalysis) -> Self {
        let meta = &analysis.search_metadata;
        Self {
            summary: analysis.summary.clone(),
            primary_features: meta.primary_features.clone(),
            data_types: meta.data_types.clone(),
            state_management: meta.state_management.clone(),
            common_modifications: meta.common_modifications.clone(),
            external_dependencies: meta.dependencies.external.clone(),
            internal_dependencies: meta.dependencies.internal.clone(),
            integration_points: analysis
                .integration_points
                .iter()
                .map(|p| p.name.clone())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == SearchFields::default()
    }
}

/// Strip a leading ```` ```json ```` (or bare ```` ``` ````) fence and the
/// matching closing fence.
fn strip_fences(raw: &str) -> &str {
    let text = raw.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // drop the info string ("json", "JSON", ...) up to the first newline
    let rest = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn drop_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(drop_nulls);
        }
        Value::Array(items) => {
            items.retain(|v| !v.is_null());
            items.iter_mut().for_each(drop_nulls);
        }
        _ => {}
    }
}

/// Parse raw model output into a [`CodeAnalysis`].
///
/// Fails with [`SyncError::Summarize`] when no JSON object can be found, the
/// object does not fit the schema, or the summary is empty.
pub fn parse_analysis(raw: &str) -> Result<CodeAnalysis, SyncError> {
    let text = strip_fences(raw);
    let mut value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(first) => {
            let inner = outermost_object(text).ok_or_else(|| {
                SyncError::Summarize(format!("no JSON object in model output: {}", first))
            })?;
            serde_json::from_str(inner)
                .map_err(|e| SyncError::Summarize(format!("invalid JSON in model output: {}", e)))?
        }
    };

    if !value.is_object() {
        return Err(SyncError::Summarize(
            "model output is not a JSON object".to_string(),
        ));
    }
    drop_nulls(&mut value);

    let analysis: CodeAnalysis = serde_json::from_value(value)
        .map_err(|e| SyncError::Summarize(format!("analysis does not match schema: {}", e)))?;

    if analysis.summary.trim().is_empty() {
        return Err(SyncError::Summarize("analysis has no summary".to_string()));
    }
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{
  "summary": "Express router for user accounts",
  "searchMetadata": {
    "primaryFeatures": ["routing", "auth"],
    "dataTypes": ["User"],
    "stateManagement": [],
    "dependencies": {"external": ["express"], "internal": ["./db"]}
  },
  "imports": [{"path": "express", "items": ["Router"], "purpose": "routing"}],
  "functions": [{
    "name": "createUser",
    "purpose": "inserts a user",
    "params": ["req", "res"],
    "returns": "Promise<void>",
    "dependencies": ["db"],
    "stateInteractions": {"reads": [], "writes": ["users"]}
  }],
  "classes": [],
  "integrationPoints": [{"type": "API", "name": "POST /users", "purpose": "signup"}]
}"#;

    #[test]
    fn parses_plain_json() {
        let a = parse_analysis(FULL).unwrap();
        assert_eq!(a.summary, "Express router for user accounts");
        assert_eq!(a.search_metadata.dependencies.external, vec!["express"]);
        assert_eq!(a.functions[0].params, vec!["req", "res"]);
        assert_eq!(
            a.functions[0].state_interactions.as_ref().unwrap().writes,
            vec!["users"]
        );
        assert_eq!(a.integration_points[0].kind, "API");
    }

    #[test]
    fn strips_json_fences() {
        let raw = format!("```json\n{}\n```", FULL);
        assert!(parse_analysis(&raw).is_ok());
        let bare = format!("```\n{}\n```\n", FULL);
        assert!(parse_analysis(&bare).is_ok());
    }

    #[test]
    fn falls_back_to_outermost_object() {
        let raw = format!("Here is the analysis you asked for:\n{}\nHope it helps!", FULL);
        let a = parse_analysis(&raw).unwrap();
        assert_eq!(a.classes.len(), 0);
    }

    #[test]
    fn nulls_and_missing_fields_take_defaults() {
        let a = parse_analysis(
            r#"{"summary": "tiny", "searchMetadata": null, "functions": [{"name": "f", "returns": null}]}"#,
        )
        .unwrap();
        assert!(a.search_metadata.primary_features.is_empty());
        assert_eq!(a.functions[0].returns, "");
        assert!(a.imports.is_empty());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_analysis("I cannot analyze this file."),
            Err(SyncError::Summarize(_))
        ));
        assert!(parse_analysis("[1, 2, 3]").is_err());
        assert!(parse_analysis(r#"{"summary": ""}"#).is_err());
        assert!(parse_analysis(r#"{"summary": "x", "functions": "none"}"#).is_err());
    }

    #[test]
    fn search_fields_lift_metadata() {
        let a = parse_analysis(FULL).unwrap();
        let s = SearchFields::from_analysis(&a);
        assert_eq!(s.summary, a.summary);
        assert_eq!(s.primary_features, vec!["routing", "auth"]);
        assert_eq!(s.internal_dependencies, vec!["./db"]);
        assert_eq!(s.integration_points, vec!["POST /users"]);
        assert!(!s.is_empty());
        assert!(SearchFields::default().is_empty());
    }
}
