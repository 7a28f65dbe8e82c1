//! Bodies of the proxy's administrative API
//!
//! Only the fields the snapshot keeps are typed; everything else inside a
//! router or service definition stays as raw JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `GET {base}/rawdata`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawData {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub routers: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub middlewares: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub services: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tcp_routers: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tcp_middlewares: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tcp_services: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub udp_routers: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub udp_services: BTreeMap<String, serde_json::Value>,
}

/// One element of `GET {base}/entrypoints`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPoint {
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_default: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<serde_json::Value>,
}

/// `GET {base}/overview`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Overview {
    pub http: HttpOverview,
    pub tcp: TcpOverview,
    pub udp: UdpOverview,
    pub features: Features,
    pub providers: Vec<String>,
}

/// Section counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Counts {
    pub total: u64,
    pub warnings: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpOverview {
    pub routers: Counts,
    pub services: Counts,
    pub middlewares: Counts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpOverview {
    pub routers: Counts,
    pub services: Counts,
    pub middlewares: Counts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpOverview {
    pub routers: Counts,
    pub services: Counts,
}

/// Observability features reported by the instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Features {
    pub tracing: String,
    pub metrics: String,
    pub access_log: bool,
}

/// `GET {base}/version`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    #[serde(rename = "Version", default)]
    pub version: String,
    #[serde(rename = "Codename", default)]
    pub codename: String,
    #[serde(rename = "startDate", default)]
    pub start_date: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_overview() {
        let body = serde_json::json!({
            "http": {
                "routers": { "total": 3, "warnings": 0, "errors": 1 },
                "services": { "total": 2, "warnings": 0, "errors": 0 },
                "middlewares": { "total": 1, "warnings": 0, "errors": 0 }
            },
            "tcp": { "routers": { "total": 1, "warnings": 0, "errors": 0 } },
            "features": { "tracing": "", "metrics": "prometheus", "accessLog": true },
            "providers": ["File", "Http"]
        });
        let overview: Overview = serde_json::from_value(body).unwrap();
        assert_eq!(overview.http.routers.total, 3);
        assert_eq!(overview.http.routers.errors, 1);
        assert_eq!(overview.tcp.routers.total, 1);
        assert_eq!(overview.udp, UdpOverview::default());
        assert!(overview.features.access_log);
        assert_eq!(overview.providers, vec!["File", "Http"]);
    }

    #[test]
    fn test_decode_version_and_entrypoints() {
        let version: Version = serde_json::from_str(
            r#"{"Version":"3.1.2","Codename":"comte","startDate":"2024-06-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(version.version, "3.1.2");
        assert_eq!(version.codename, "comte");

        let entrypoints: Vec<EntryPoint> = serde_json::from_str(
            r#"[{"name":"web","address":":80","http":{}},{"name":"websecure","address":":443","asDefault":true}]"#,
        )
        .unwrap();
        assert_eq!(entrypoints.len(), 2);
        assert_eq!(entrypoints[1].as_default, Some(true));
    }

    #[test]
    fn test_decode_rawdata() {
        let raw: RawData = serde_json::from_str(
            r#"{"routers":{"r1@file":{"rule":"Host(`a`)"}},"tcpServices":{"s@file":{}}}"#,
        )
        .unwrap();
        assert!(raw.routers.contains_key("r1@file"));
        assert!(raw.tcp_services.contains_key("s@file"));
        assert!(raw.udp_routers.is_empty());
    }
}
