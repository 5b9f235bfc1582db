//! Projections over the daemon's configuration document.
//!
//! The document is an opaque JSON tree. Only the top-level `Nodes` and
//! `Repositories` arrays and the `Options` / `GUI` objects are interpreted;
//! everything else is carried through untouched on write-back.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use super::ApiError;
use super::types::{
    Connection, Connections, LOCAL_NODE_CONNECTIONS, Node, Repository, Section, SystemInfo,
    Versioning,
};

/// Parse a `/rest/config` body. The root must be a JSON object.
pub fn parse_document(body: &str) -> Result<Value, ApiError> {
    let doc: Value = serde_json::from_str(body).map_err(|e| ApiError::Parse {
        what: "configuration",
        message: e.to_string(),
    })?;
    if !doc.is_object() {
        return Err(ApiError::WrongType("configuration".to_string(), "object"));
    }
    Ok(doc)
}

pub fn parse_system_info(body: &str) -> Result<SystemInfo, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Parse {
        what: "system info",
        message: e.to_string(),
    })
}

/// Parse a `/rest/connections` body into one [`Connection`] per key.
pub fn parse_connections(body: &str) -> Result<Connections, ApiError> {
    let parse_err = |e: serde_json::Error| ApiError::Parse {
        what: "connections",
        message: e.to_string(),
    };
    let raw: Map<String, Value> = serde_json::from_str(body).map_err(parse_err)?;
    raw.into_iter()
        .map(|(key, value)| {
            let connection = Connection::deserialize(value).map_err(parse_err)?;
            Ok((key, connection))
        })
        .collect()
}

/// Peers from the top-level `Nodes` array, the local node excluded.
pub fn nodes(doc: &Value, local_node_id: &str) -> Result<Vec<Node>, ApiError> {
    let entries = array_field(doc, "Nodes")?;
    parse_nodes(entries, local_node_id)
}

/// Repositories from the top-level `Repositories` array.
pub fn repositories(doc: &Value, local_node_id: &str) -> Result<Vec<Repository>, ApiError> {
    array_field(doc, "Repositories")?
        .iter()
        .map(|entry| parse_repository(entry, local_node_id))
        .collect()
}

/// Read `key` from `section` as text.
///
/// Arrays come back space-joined with every `"` removed; scalars in their
/// plain textual form (`true`, `42`, the string itself).
pub fn get_value(doc: &Value, section: Section, key: &str) -> Result<String, ApiError> {
    let value = section_object(doc, section)?
        .get(key)
        .ok_or_else(|| ApiError::Missing(format!("{section}.{key}")))?;
    Ok(project(value))
}

/// Store `value` at `key` in `section`.
///
/// With `is_array`, `value` must be a string; it is split on whitespace and
/// stored as a JSON array of the tokens.
pub fn set_value(
    doc: &mut Value,
    section: Section,
    key: &str,
    value: Value,
    is_array: bool,
) -> Result<(), ApiError> {
    let stored = if is_array {
        match value {
            Value::String(text) => split_tokens(&text),
            other => return Err(ApiError::ArrayValueNotText(other.to_string())),
        }
    } else {
        value
    };

    section_object_mut(doc, section)?.insert(key.to_string(), stored);
    Ok(())
}

/// Textual projection of a configuration leaf.
pub fn project(value: &Value) -> String {
    match value {
        Value::Array(items) => join_array(items),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn join_array(items: &[Value]) -> String {
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
        .replace('"', "")
}

fn split_tokens(text: &str) -> Value {
    Value::Array(
        text.split_whitespace()
            .map(|token| Value::String(token.to_string()))
            .collect(),
    )
}

fn array_field<'a>(doc: &'a Value, key: &str) -> Result<&'a Vec<Value>, ApiError> {
    doc.get(key)
        .ok_or_else(|| ApiError::Missing(key.to_string()))?
        .as_array()
        .ok_or_else(|| ApiError::WrongType(key.to_string(), "array"))
}

fn section_object(doc: &Value, section: Section) -> Result<&Map<String, Value>, ApiError> {
    doc.get(section.as_str())
        .ok_or_else(|| ApiError::Missing(section.to_string()))?
        .as_object()
        .ok_or_else(|| ApiError::WrongType(section.to_string(), "object"))
}

fn section_object_mut(
    doc: &mut Value,
    section: Section,
) -> Result<&mut Map<String, Value>, ApiError> {
    doc.get_mut(section.as_str())
        .ok_or_else(|| ApiError::Missing(section.to_string()))?
        .as_object_mut()
        .ok_or_else(|| ApiError::WrongType(section.to_string(), "object"))
}

#[derive(Deserialize)]
struct RawNode {
    #[serde(rename = "NodeID")]
    node_id: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Addresses", default)]
    addresses: Option<Vec<Value>>,
}

fn parse_nodes(entries: &[Value], local_node_id: &str) -> Result<Vec<Node>, ApiError> {
    let mut nodes = Vec::with_capacity(entries.len());
    for entry in entries {
        let raw = RawNode::deserialize(entry).map_err(|e| ApiError::Parse {
            what: "node",
            message: e.to_string(),
        })?;
        if raw.node_id == local_node_id {
            continue;
        }
        if raw.node_id == LOCAL_NODE_CONNECTIONS {
            warn!(node_id = %raw.node_id, "Skipping node with reserved identity");
            continue;
        }
        nodes.push(Node {
            node_id: raw.node_id,
            name: raw.name,
            addresses: raw.addresses.as_deref().map(join_array),
        });
    }
    Ok(nodes)
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawRepository {
    directory: String,
    #[serde(rename = "ID")]
    id: String,
    #[serde(default)]
    invalid: String,
    read_only: bool,
    #[serde(default)]
    nodes: Vec<Value>,
    #[serde(default)]
    versioning: Option<RawVersioning>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawVersioning {
    #[serde(rename = "Type", default)]
    kind: String,
    #[serde(default)]
    params: Map<String, Value>,
}

fn parse_repository(entry: &Value, local_node_id: &str) -> Result<Repository, ApiError> {
    let raw = RawRepository::deserialize(entry).map_err(|e| ApiError::Parse {
        what: "repository",
        message: e.to_string(),
    })?;

    let versioning = match raw.versioning {
        Some(v) if v.kind == Versioning::SIMPLE_TYPE => Versioning::Simple {
            keep: parse_keep(v.params.get("keep"))?,
        },
        _ => Versioning::None,
    };

    Ok(Repository {
        nodes: parse_nodes(&raw.nodes, local_node_id)?,
        id: raw.id,
        directory: raw.directory,
        read_only: raw.read_only,
        ignore_perms: true,
        invalid: Some(raw.invalid).filter(|s| !s.is_empty()),
        versioning,
    })
}

/// `keep` arrives either as decimal text or as a number; it must be positive.
fn parse_keep(value: Option<&Value>) -> Result<u32, ApiError> {
    let invalid = |detail: String| ApiError::Parse {
        what: "versioning keep",
        message: detail,
    };
    let keep = match value {
        Some(Value::String(s)) => s
            .trim()
            .parse::<u32>()
            .map_err(|e| invalid(format!("{s:?}: {e}")))?,
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| invalid(n.to_string()))?,
        Some(other) => return Err(invalid(other.to_string())),
        None => return Err(ApiError::Missing("Versioning.Params.keep".to_string())),
    };
    if keep == 0 {
        return Err(invalid("must be positive".to_string()));
    }
    Ok(keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "Version": 3,
            "Nodes": [
                {"NodeID": "X", "Name": "me", "Addresses": ["dynamic"]},
                {"NodeID": "Y", "Name": "laptop", "Addresses": ["tcp://10.0.0.2:22000", "dynamic"]},
                {"NodeID": "Z", "Name": "phone", "Addresses": null}
            ],
            "Repositories": [
                {
                    "Directory": "/sdcard/photos",
                    "ID": "photos",
                    "Invalid": "",
                    "ReadOnly": false,
                    "IgnorePerms": false,
                    "Nodes": [{"NodeID": "X", "Name": "me"}, {"NodeID": "Y", "Name": "laptop"}],
                    "Versioning": {"Type": "simple", "Params": {"keep": "5"}}
                },
                {
                    "Directory": "/sdcard/music",
                    "ID": "music",
                    "Invalid": "directory missing",
                    "ReadOnly": true,
                    "Nodes": [],
                    "Versioning": {"Type": "", "Params": {}}
                }
            ],
            "Options": {
                "ListenAddress": ["0.0.0.0:22000"],
                "GlobalAnnEnabled": true,
                "MaxSendKbps": 0,
                "URAccepted": -1
            },
            "GUI": {"Enabled": true, "Address": "127.0.0.1:8080", "User": "admin"}
        })
    }

    #[test]
    fn test_nodes_exclude_local_node() {
        let nodes = nodes(&doc(), "X").unwrap();
        let ids: Vec<_> = nodes.iter().map(|n| n.node_id.as_str()).collect();
        assert_eq!(ids, vec!["Y", "Z"]);
        assert_eq!(
            nodes[0].addresses.as_deref(),
            Some("tcp://10.0.0.2:22000 dynamic")
        );
        assert_eq!(nodes[1].addresses, None);
    }

    #[test]
    fn test_nodes_skip_reserved_identity() {
        let d = json!({"Nodes": [{"NodeID": "total", "Name": "?"}, {"NodeID": "Y", "Name": "y"}]});
        let nodes = nodes(&d, "X").unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].node_id, "Y");
    }

    #[test]
    fn test_nodes_missing_array_fails() {
        assert!(matches!(nodes(&json!({}), "X"), Err(ApiError::Missing(_))));
        assert!(matches!(
            nodes(&json!({"Nodes": {}}), "X"),
            Err(ApiError::WrongType(..))
        ));
    }

    #[test]
    fn test_node_without_name_fails() {
        let d = json!({"Nodes": [{"NodeID": "Y"}]});
        assert!(matches!(nodes(&d, "X"), Err(ApiError::Parse { .. })));
    }

    #[test]
    fn test_repositories_parse() {
        let repos = repositories(&doc(), "X").unwrap();
        assert_eq!(repos.len(), 2);

        let photos = &repos[0];
        assert_eq!(photos.id, "photos");
        assert_eq!(photos.directory, "/sdcard/photos");
        assert!(photos.ignore_perms, "ignore_perms is forced on");
        assert_eq!(photos.invalid, None);
        assert_eq!(photos.nodes.len(), 1);
        assert_eq!(photos.nodes[0].node_id, "Y");
        assert_eq!(photos.versioning, Versioning::Simple { keep: 5 });
        assert_eq!(photos.versioning.params().get("keep").map(String::as_str), Some("5"));

        let music = &repos[1];
        assert!(music.read_only);
        assert_eq!(music.invalid.as_deref(), Some("directory missing"));
        assert_eq!(music.versioning, Versioning::None);
    }

    #[test]
    fn test_versioning_keep_accepts_numbers() {
        let d = json!({"Repositories": [{
            "Directory": "/d", "ID": "d", "ReadOnly": false, "Nodes": [],
            "Versioning": {"Type": "simple", "Params": {"keep": 3}}
        }]});
        let repos = repositories(&d, "X").unwrap();
        assert_eq!(repos[0].versioning, Versioning::Simple { keep: 3 });
    }

    #[test]
    fn test_versioning_keep_must_be_positive() {
        let d = json!({"Repositories": [{
            "Directory": "/d", "ID": "d", "ReadOnly": false, "Nodes": [],
            "Versioning": {"Type": "simple", "Params": {"keep": "0"}}
        }]});
        assert!(repositories(&d, "X").is_err());
    }

    #[test]
    fn test_missing_versioning_is_none() {
        let d = json!({"Repositories": [{
            "Directory": "/d", "ID": "d", "ReadOnly": false, "Nodes": []
        }]});
        let repos = repositories(&d, "X").unwrap();
        assert_eq!(repos[0].versioning, Versioning::None);
    }

    #[test]
    fn test_get_value_projections() {
        let d = doc();
        assert_eq!(get_value(&d, Section::Options, "ListenAddress").unwrap(), "0.0.0.0:22000");
        assert_eq!(get_value(&d, Section::Options, "GlobalAnnEnabled").unwrap(), "true");
        assert_eq!(get_value(&d, Section::Options, "URAccepted").unwrap(), "-1");
        assert_eq!(get_value(&d, Section::Gui, "Address").unwrap(), "127.0.0.1:8080");
    }

    #[test]
    fn test_get_value_missing_key_fails() {
        assert!(matches!(
            get_value(&doc(), Section::Gui, "Password"),
            Err(ApiError::Missing(_))
        ));
    }

    #[test]
    fn test_set_array_value_stores_tokens() {
        let mut d = doc();
        set_value(
            &mut d,
            Section::Options,
            "ListenAddress",
            json!("0.0.0.0:22000 :22001"),
            true,
        )
        .unwrap();
        assert_eq!(d["Options"]["ListenAddress"], json!(["0.0.0.0:22000", ":22001"]));
        assert_eq!(
            get_value(&d, Section::Options, "ListenAddress").unwrap(),
            "0.0.0.0:22000 :22001"
        );
    }

    #[test]
    fn test_set_scalar_values_round_trip() {
        let mut d = doc();
        set_value(&mut d, Section::Gui, "Enabled", json!(false), false).unwrap();
        set_value(&mut d, Section::Options, "MaxSendKbps", json!(250), false).unwrap();
        set_value(&mut d, Section::Gui, "User", json!("operator"), false).unwrap();

        assert_eq!(get_value(&d, Section::Gui, "Enabled").unwrap(), "false");
        assert_eq!(get_value(&d, Section::Options, "MaxSendKbps").unwrap(), "250");
        assert_eq!(get_value(&d, Section::Gui, "User").unwrap(), "operator");
        assert_eq!(d["GUI"]["Enabled"], json!(false));
    }

    #[test]
    fn test_set_array_requires_text() {
        let mut d = doc();
        let result = set_value(&mut d, Section::Options, "ListenAddress", json!(5), true);
        assert!(matches!(result, Err(ApiError::ArrayValueNotText(_))));
    }

    #[test]
    fn test_set_value_into_missing_section_fails() {
        let mut d = json!({"Options": {}});
        let result = set_value(&mut d, Section::Gui, "Enabled", json!(true), false);
        assert!(matches!(result, Err(ApiError::Missing(_))));
    }

    #[test]
    fn test_set_value_preserves_unrelated_fields() {
        let mut d = doc();
        set_value(&mut d, Section::Options, "MaxSendKbps", json!(1), false).unwrap();
        assert_eq!(d["Version"], json!(3));
        assert_eq!(d["Repositories"], doc()["Repositories"]);
        assert_eq!(d["Options"]["URAccepted"], json!(-1));
    }

    #[test]
    fn test_parse_connections() {
        let body = r#"{
            "total": {"At": "t", "InBytesTotal": 30, "OutBytesTotal": 40},
            "Y": {"At": "t", "InBytesTotal": 10, "OutBytesTotal": 20,
                  "Address": "10.0.0.2:22000", "ClientVersion": "v0.8.9", "Completion": 99.5}
        }"#;
        let conns = parse_connections(body).unwrap();
        assert_eq!(conns.len(), 2);
        assert_eq!(conns[LOCAL_NODE_CONNECTIONS].in_bytes_total, 30);
        assert_eq!(conns["Y"].client_version, "v0.8.9");
        assert_eq!(conns["Y"].completion, 99.5);
    }

    #[test]
    fn test_parse_document_rejects_non_objects() {
        assert!(matches!(parse_document("[1,2]"), Err(ApiError::WrongType(..))));
        assert!(matches!(parse_document("{oops"), Err(ApiError::Parse { .. })));
    }
}
