// status_rule.rs
use indexmap::IndexMap;
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Efectos compuestos configurados para un label de status dentro de un
/// stage. Todos los campos son opcionales.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusActionRule {
    #[serde(deserialize_with = "blank_uuid_as_none")]
    pub move_to_stage_id: Option<Uuid>,
    #[serde(deserialize_with = "blank_uuid_as_none")]
    pub move_to_group_id: Option<Uuid>,
    pub add_tags: Vec<String>,
    pub remove_tags: Vec<String>,
    pub set_status: Option<String>,
    pub require_comment: bool,
    pub send_email: bool,
    pub email_template_id: Option<String>,
}

// Los editores de configuración guardan "" cuando se limpia un selector.
fn blank_uuid_as_none<'de, D>(deserializer: D) -> Result<Option<Uuid>, D::Error>
    where D: Deserializer<'de>
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => Uuid::parse_str(s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Interpreta la configuración `label -> regla` de un stage.
///
/// Es tolerante: si la raíz no es un objeto, o una regla concreta no se
/// puede interpretar, se registra un `warn!` y ese label queda sin regla
/// (equivale a "no configurado"). Nunca falla.
pub fn parse_status_actions(raw: &Value) -> IndexMap<String, StatusActionRule> {
    let mut out = IndexMap::new();
    let map = match raw {
        Value::Object(map) => map,
        Value::Null => return out,
        other => {
            warn!("status_actions ignorado: se esperaba objeto, llegó {}", json_kind(other));
            return out;
        }
    };
    for (label, value) in map {
        match serde_json::from_value::<StatusActionRule>(value.clone()) {
            Ok(rule) => {
                out.insert(label.clone(), rule);
            }
            Err(e) => warn!("status rule descartada label={label} err={e}"),
        }
    }
    out
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_legacy_config_with_blank_targets() {
        let group = Uuid::new_v4();
        let raw = json!({
            "Interview Scheduled": { "require_comment": true, "add_tags": ["interview"] },
            "Rejected": { "move_to_group_id": group.to_string(), "move_to_stage_id": "" }
        });
        let rules = parse_status_actions(&raw);
        assert_eq!(rules.len(), 2);
        assert!(rules["Interview Scheduled"].require_comment);
        assert_eq!(rules["Rejected"].move_to_group_id, Some(group));
        assert_eq!(rules["Rejected"].move_to_stage_id, None);
        // orden de configuración preservado
        assert_eq!(rules.get_index(0).map(|(k, _)| k.as_str()), Some("Interview Scheduled"));
    }

    #[test]
    fn malformed_rule_is_dropped_not_fatal() {
        let raw = json!({
            "Bad": { "move_to_group_id": "not-a-uuid" },
            "Worse": 42,
            "Good": { "set_status": "approved" }
        });
        let rules = parse_status_actions(&raw);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules["Good"].set_status.as_deref(), Some("approved"));
        assert!(parse_status_actions(&json!([1, 2])).is_empty());
        assert!(parse_status_actions(&Value::Null).is_empty());
    }
}
