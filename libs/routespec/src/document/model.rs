use serde::Serialize;
use serde_json::{Map, Value};

use super::options::{Contact, License, Server};

#[derive(Debug, Serialize)]
pub struct OpenApi {
    pub openapi: &'static str,
    pub info: Info,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<Server>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    pub paths: Map<String, Value>,
    pub components: Components,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Info {
    pub title: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_of_service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
}

#[derive(Debug, Serialize)]
pub struct Tag {
    pub name: String,
}

#[derive(Debug, Default, Serialize)]
pub struct Components {
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub schemas: Map<String, Value>,
}
