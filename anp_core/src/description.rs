//! Agent description documents (ad.json)
//!
//! An ANP peer publishes a JSON-LD capability document describing who it is
//! and which interfaces it exposes. This module provides:
//! - [`AgentDescription`]: the document model, serialized with stable field order
//! - [`AgentDescription::build`]: assembly from peer info + registered methods
//! - [`AgentDescription::parse`]: tolerant ingestion of remote documents
//!
//! The `Infomations` key is misspelled on the wire by the protocol; the
//! spelling is preserved here for compatibility.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::method::{InterfaceMode, MethodDefinition};

/// Protocol name stamped into every agent description.
pub const PROTOCOL_TYPE: &str = "ANP";
/// Protocol version stamped into every agent description.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Interface type marking a callable OpenRPC surface.
pub const STRUCTURED_INTERFACE: &str = "StructuredInterface";
/// Canonical interface protocol string; `JSON-RPC 2.0` is accepted as an alias.
pub const OPENRPC_PROTOCOL: &str = "openrpc";

/// Identity and presentation data of the local peer.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PeerInfo {
    /// Human-readable agent name.
    pub name: String,
    /// The peer's did:wba identifier.
    pub did: String,
    /// Short description of the agent's capabilities.
    pub description: String,
    /// URL prefix the agent is mounted under, e.g. `/hotel`.
    pub prefix: String,
    /// Version advertised in the interface documents.
    pub version: String,
}

/// One entry of the `interfaces` array.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InterfaceEntry {
    #[serde(rename = "type")]
    pub interface_type: String,
    pub protocol: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One entry of the `Infomations` array, either embedded (`content`) or
/// linked (`url`). `path` is kept for descriptions that reference local files.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InformationEntry {
    #[serde(rename = "type")]
    pub information_type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl InformationEntry {
    /// A linked information record.
    pub fn linked(
        information_type: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            information_type: information_type.into(),
            description: description.into(),
            url: Some(url.into()),
            content: None,
            path: None,
        }
    }

    /// An embedded information record.
    pub fn embedded(
        information_type: impl Into<String>,
        description: impl Into<String>,
        content: Value,
    ) -> Self {
        Self {
            information_type: information_type.into(),
            description: description.into(),
            url: None,
            content: Some(content),
            path: None,
        }
    }
}

/// The JSON-LD agent description document.
///
/// Field declaration order here is the on-wire order.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AgentDescription {
    #[serde(rename = "protocolType", default)]
    pub protocol_type: String,
    #[serde(rename = "protocolVersion", default)]
    pub protocol_version: String,
    #[serde(rename = "@context", default)]
    pub context: Value,
    #[serde(rename = "@type")]
    pub document_type: String,
    #[serde(rename = "@id", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub did: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "securityDefinitions", default)]
    pub security_definitions: Value,
    #[serde(default)]
    pub security: String,
    #[serde(default)]
    pub interfaces: Vec<InterfaceEntry>,
    // The wire name is misspelled by the protocol; keep it.
    #[serde(rename = "Infomations", default)]
    pub informations: Vec<InformationEntry>,
}

/// Possible errors when ingesting a remote agent description.
#[derive(Debug, thiserror::Error)]
pub enum DescriptionError {
    #[error("agent description is missing @type")]
    MissingType,

    #[error("agent description has unexpected @type {0:?}")]
    WrongType(String),

    #[error("agent description is not a JSON object")]
    NotAnObject,
}

impl AgentDescription {
    /// Assembles the description document for the local peer.
    ///
    /// Content-mode methods share one `interface.json` entry; every link-mode
    /// method gets its own `interface/<name>.json` entry carrying the method's
    /// description.
    pub fn build(
        info: &PeerInfo,
        base_url: &str,
        methods: &[MethodDefinition],
        informations: &[InformationEntry],
    ) -> Self {
        let root = format!("{}{}", base_url.trim_end_matches('/'), info.prefix);
        let mut interfaces = Vec::new();
        let mut shared_emitted = false;
        for method in methods {
            match method.mode {
                InterfaceMode::Content => {
                    if !shared_emitted {
                        interfaces.push(InterfaceEntry {
                            interface_type: STRUCTURED_INTERFACE.to_string(),
                            protocol: OPENRPC_PROTOCOL.to_string(),
                            url: format!("{root}/interface.json"),
                            description: Some(format!(
                                "OpenRPC interface of the {} agent",
                                info.name
                            )),
                        });
                        shared_emitted = true;
                    }
                }
                InterfaceMode::Link => {
                    interfaces.push(InterfaceEntry {
                        interface_type: STRUCTURED_INTERFACE.to_string(),
                        protocol: OPENRPC_PROTOCOL.to_string(),
                        url: format!("{root}/interface/{}.json", method.name),
                        description: Some(method.description.clone()),
                    });
                }
            }
        }

        AgentDescription {
            protocol_type: PROTOCOL_TYPE.to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            context: json!({
                "@vocab": "https://schema.org/",
                "ad": "https://agent-network-protocol.com/ad#",
                "did": "https://w3id.org/did#",
                "schema": "https://schema.org/",
            }),
            document_type: "ad:AgentDescription".to_string(),
            id: format!("{root}/ad.json"),
            name: info.name.clone(),
            did: info.did.clone(),
            description: info.description.clone(),
            security_definitions: json!({
                "didwba_sc": {
                    "scheme": "didwba",
                    "in": "header",
                    "name": "Authorization",
                }
            }),
            security: "didwba_sc".to_string(),
            interfaces,
            informations: informations.to_vec(),
        }
    }

    /// Parses a remote agent description, returning the document and the URLs
    /// of its callable OpenRPC interfaces.
    ///
    /// Tolerates case variants on the interface `type` and accepts both
    /// `openrpc` and `JSON-RPC 2.0` as the protocol string.
    pub fn parse(value: &Value) -> Result<(Self, Vec<InterfaceEntry>), DescriptionError> {
        let obj = value.as_object().ok_or(DescriptionError::NotAnObject)?;
        let doc_type = obj
            .get("@type")
            .and_then(|v| v.as_str())
            .ok_or(DescriptionError::MissingType)?;
        if !doc_type.eq_ignore_ascii_case("ad:AgentDescription")
            && !doc_type.eq_ignore_ascii_case("AgentDescription")
        {
            return Err(DescriptionError::WrongType(doc_type.to_string()));
        }

        let doc: AgentDescription = serde_json::from_value(value.clone())
            .map_err(|_| DescriptionError::WrongType(doc_type.to_string()))?;
        let callable = doc
            .interfaces
            .iter()
            .filter(|i| is_callable_interface(&i.interface_type, &i.protocol))
            .cloned()
            .collect();
        Ok((doc, callable))
    }
}

/// Whether an interface entry designates a callable OpenRPC surface.
pub fn is_callable_interface(interface_type: &str, protocol: &str) -> bool {
    interface_type.eq_ignore_ascii_case(STRUCTURED_INTERFACE)
        && (protocol.eq_ignore_ascii_case(OPENRPC_PROTOCOL)
            || protocol.eq_ignore_ascii_case("JSON-RPC 2.0"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::ParamDef;

    fn peer() -> PeerInfo {
        PeerInfo {
            name: "Hotel Agent".to_string(),
            did: "did:wba:example.com:hotel".to_string(),
            description: "Books rooms.".to_string(),
            prefix: "/hotel".to_string(),
            version: "0.1.0".to_string(),
        }
    }

    fn methods() -> Vec<MethodDefinition> {
        vec![
            MethodDefinition::new("search", "Searches rooms.")
                .with_param(ParamDef::required("query", json!({"type": "string"}))),
            MethodDefinition::new("book", "Books a room.").with_mode(InterfaceMode::Link),
            MethodDefinition::new("cancel", "Cancels a booking."),
        ]
    }

    #[test]
    fn build_emits_shared_and_linked_interfaces() {
        let doc = AgentDescription::build(&peer(), "https://h.example", &methods(), &[]);
        assert_eq!(doc.id, "https://h.example/hotel/ad.json");
        assert_eq!(doc.document_type, "ad:AgentDescription");

        // one shared entry for the two content-mode methods, one for the link-mode one
        assert_eq!(doc.interfaces.len(), 2);
        assert_eq!(doc.interfaces[0].url, "https://h.example/hotel/interface.json");
        assert_eq!(
            doc.interfaces[1].url,
            "https://h.example/hotel/interface/book.json"
        );
        assert_eq!(doc.interfaces[1].description.as_deref(), Some("Books a room."));
    }

    #[test]
    fn wire_format_keeps_field_names() {
        let doc = AgentDescription::build(
            &peer(),
            "https://h.example",
            &methods(),
            &[InformationEntry::linked(
                "Product",
                "Room catalogue",
                "https://h.example/hotel/rooms.json",
            )],
        );
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["protocolType"], "ANP");
        assert_eq!(value["@type"], "ad:AgentDescription");
        assert_eq!(value["security"], "didwba_sc");
        // the misspelled wire key must be preserved
        assert!(value.get("Infomations").is_some());
        assert!(value.get("Informations").is_none());
        assert_eq!(value["Infomations"][0]["url"], "https://h.example/hotel/rooms.json");
    }

    #[test]
    fn parse_tolerates_case_variants() {
        let value = json!({
            "@type": "ad:AgentDescription",
            "protocolType": "ANP",
            "protocolVersion": "1.0.0",
            "@context": {},
            "@id": "https://h.example/hotel/ad.json",
            "name": "Hotel",
            "did": "did:wba:example.com:hotel",
            "description": "Books rooms.",
            "securityDefinitions": {},
            "security": "didwba_sc",
            "interfaces": [
                {"type": "structuredinterface", "protocol": "JSON-RPC 2.0", "url": "https://h.example/hotel/interface.json"},
                {"type": "NaturalLanguageInterface", "protocol": "YAML", "url": "https://h.example/hotel/nl.yaml"},
            ],
        });
        let (_, callable) = AgentDescription::parse(&value).unwrap();
        assert_eq!(callable.len(), 1);
        assert_eq!(callable[0].url, "https://h.example/hotel/interface.json");
    }

    #[test]
    fn parse_requires_type() {
        let err = AgentDescription::parse(&json!({"name": "x"})).unwrap_err();
        assert!(matches!(err, DescriptionError::MissingType));
    }
}
