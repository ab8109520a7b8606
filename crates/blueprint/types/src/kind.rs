//! Component kinds and the fields other entries may reference on them

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kinds of component a template can create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    #[serde(rename = "CA")]
    Ca,
    EnrollmentIdentity,
    #[serde(rename = "MSP")]
    Msp,
    #[serde(rename = "MSPExternal")]
    MspExternal,
    Orderer,
    Peer,
}

const CA_FIELDS: &[&str] = &[
    "id",
    "display_name",
    "api_url",
    "operations_url",
    "api_protocol",
    "api_host",
    "api_port",
    "ca_name",
    "tlsca_name",
    "root_cert",
    "tls_root_cert",
    "tls_cert",
    "enroll_id",
    "enroll_secret",
    "location",
    "version",
    "zone",
    "tags",
    "resources",
    "storage",
    "created",
];

const IDENTITY_FIELDS: &[&str] = &[
    "id",
    "display_name",
    "enroll_id",
    "enroll_secret",
    "cert",
    "private_key",
    "root_certs",
    "ca_url",
    "ca_name",
    "doc_id",
    "identity_type",
];

const MSP_FIELDS: &[&str] = &[
    "id",
    "display_name",
    "msp_id",
    "root_certs",
    "intermediate_certs",
    "admins",
    "tls_root_certs",
    "tls_intermediate_certs",
    "fabric_node_ous",
    "host_url",
    "created",
];

const ORDERER_FIELDS: &[&str] = &[
    "id",
    "display_name",
    "api_url",
    "operations_url",
    "grpcwp_url",
    "api_protocol",
    "api_host",
    "api_port",
    "msp_id",
    "tls_cert",
    "tls_ca_root_certs",
    "cluster_id",
    "cluster_name",
    "system_channel_id",
    "location",
    "version",
    "zone",
    "tags",
    "resources",
    "storage",
    "bulk",
    "created",
];

const PEER_FIELDS: &[&str] = &[
    "id",
    "display_name",
    "api_url",
    "operations_url",
    "grpcwp_url",
    "api_protocol",
    "api_host",
    "api_port",
    "msp_id",
    "tls_cert",
    "tls_ca_root_certs",
    "state_db",
    "location",
    "version",
    "zone",
    "tags",
    "resources",
    "storage",
    "created",
];

impl ComponentKind {
    pub const ALL: [ComponentKind; 6] = [
        ComponentKind::Ca,
        ComponentKind::EnrollmentIdentity,
        ComponentKind::Msp,
        ComponentKind::MspExternal,
        ComponentKind::Orderer,
        ComponentKind::Peer,
    ];

    /// Parse a template `type` value. Matching is case-insensitive.
    pub fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().to_ascii_lowercase() == lowered)
    }

    /// Canonical spelling used in templates.
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Ca => "CA",
            ComponentKind::EnrollmentIdentity => "EnrollmentIdentity",
            ComponentKind::Msp => "MSP",
            ComponentKind::MspExternal => "MSPExternal",
            ComponentKind::Orderer => "Orderer",
            ComponentKind::Peer => "Peer",
        }
    }

    /// Human readable name used in progress messages.
    pub fn label(&self) -> &'static str {
        match self {
            ComponentKind::Ca => "certificate authority",
            ComponentKind::EnrollmentIdentity => "enrollment identity",
            ComponentKind::Msp => "MSP",
            ComponentKind::MspExternal => "external MSP",
            ComponentKind::Orderer => "ordering service",
            ComponentKind::Peer => "peer",
        }
    }

    /// Fields a `$ref.field` reference may name on an entry of this kind.
    pub fn allowed_fields(&self) -> &'static [&'static str] {
        match self {
            ComponentKind::Ca => CA_FIELDS,
            ComponentKind::EnrollmentIdentity => IDENTITY_FIELDS,
            ComponentKind::Msp | ComponentKind::MspExternal => MSP_FIELDS,
            ComponentKind::Orderer => ORDERER_FIELDS,
            ComponentKind::Peer => PEER_FIELDS,
        }
    }

    pub fn allows_field(&self, field: &str) -> bool {
        self.allowed_fields().contains(&field)
    }

    /// Whether the provisioned component exposes an endpoint that can be
    /// polled for health.
    pub fn has_endpoint(&self) -> bool {
        matches!(
            self,
            ComponentKind::Ca | ComponentKind::Orderer | ComponentKind::Peer
        )
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a `type` value names no known component kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown component type \"{0}\"")]
pub struct UnknownKind(pub String);

impl FromStr for ComponentKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnknownKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(ComponentKind::parse("ca"), Some(ComponentKind::Ca));
        assert_eq!(ComponentKind::parse("MSPEXTERNAL"), Some(ComponentKind::MspExternal));
        assert_eq!(
            ComponentKind::parse("enrollmentIdentity"),
            Some(ComponentKind::EnrollmentIdentity)
        );
        assert_eq!(ComponentKind::parse("fabric-peer"), None);
    }

    #[test]
    fn test_from_str_reports_unknown() {
        let err = "gateway".parse::<ComponentKind>().unwrap_err();
        assert_eq!(err.to_string(), "unknown component type \"gateway\"");
    }

    #[test]
    fn test_allow_lists() {
        assert!(ComponentKind::Ca.allows_field("root_cert"));
        assert!(!ComponentKind::Ca.allows_field("bogus"));
        assert!(ComponentKind::Orderer.allows_field("bulk"));
        assert!(!ComponentKind::Peer.allows_field("bulk"));
        assert_eq!(
            ComponentKind::Msp.allowed_fields(),
            ComponentKind::MspExternal.allowed_fields()
        );
    }
}
