use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenApiVersion {
    #[serde(rename = "3.0.0")]
    V3_0,
    #[default]
    #[serde(rename = "3.1.0")]
    V3_1,
}

impl OpenApiVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            OpenApiVersion::V3_0 => "3.0.0",
            OpenApiVersion::V3_1 => "3.1.0",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Options for [`DocumentAssembler::generate`](super::DocumentAssembler::generate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentOptions {
    pub title: Option<String>,
    pub description: Option<String>,
    pub version: String,
    #[serde(alias = "termsOfService")]
    pub terms_of_service: Option<String>,
    pub contact: Option<Contact>,
    pub license: Option<License>,
    pub servers: Vec<Server>,
    pub openapi: OpenApiVersion,
    /// Other API documents merged into the generated one.
    #[serde(alias = "additionalJsonUrls")]
    pub additional_json_urls: Vec<String>,
    #[serde(alias = "fetchTimeoutSecs")]
    pub fetch_timeout_secs: u64,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            title: None,
            description: None,
            version: "1.0.0".to_string(),
            terms_of_service: None,
            contact: None,
            license: None,
            servers: Vec::new(),
            openapi: OpenApiVersion::default(),
            additional_json_urls: Vec::new(),
            fetch_timeout_secs: 10,
        }
    }
}
