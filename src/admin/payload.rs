//! Admin API request bodies.
//!
//! Every field has a default so `{}` is a valid body for each action. Key
//! lists accept a JSON array, a JSON-encoded array string, or a whitespace
//! separated string. Option maps accept an object or a JSON-encoded object.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::store::OverrideRecord;

pub type OptionMap = BTreeMap<String, Value>;

fn default_pattern() -> String {
    "*".to_string()
}

fn default_apply() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ListQuery {
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChangeRequest {
    #[serde(default, deserialize_with = "option_map")]
    pub options: OptionMap,
    #[serde(default = "default_apply")]
    pub apply: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CreateRequest {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub prev_value: Option<String>,
    #[serde(default = "default_apply")]
    pub apply: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct KeysRequest {
    #[serde(default, deserialize_with = "key_list")]
    pub keys: Vec<String>,
    #[serde(default = "default_apply")]
    pub apply: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct UpdateRequest {
    #[serde(default, deserialize_with = "option_map")]
    pub change: OptionMap,
    #[serde(default, deserialize_with = "key_list")]
    pub revert: Vec<String>,
    #[serde(default, deserialize_with = "key_list")]
    pub reset: Vec<String>,
    #[serde(default = "default_apply")]
    pub apply: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ApplyRequest {
    #[serde(default, deserialize_with = "key_list")]
    pub removed_keys: Vec<String>,
}

/// One entry of the `list` response.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ListedOption {
    pub value: String,
    pub option: Option<OverrideRecord>,
}

pub type Records = BTreeMap<String, OverrideRecord>;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct UpdateResult {
    pub change: Records,
    pub revert: Records,
    pub reset: Records,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeyListInput {
    List(Vec<String>),
    Text(String),
}

fn key_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match KeyListInput::deserialize(deserializer)? {
        KeyListInput::List(keys) => Ok(keys),
        KeyListInput::Text(text) => {
            let trimmed = text.trim();
            if trimmed.starts_with('[') {
                serde_json::from_str(trimmed).map_err(serde::de::Error::custom)
            } else {
                Ok(trimmed.split_whitespace().map(str::to_string).collect())
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OptionMapInput {
    Map(OptionMap),
    Text(String),
}

fn option_map<'de, D>(deserializer: D) -> Result<OptionMap, D::Error>
where
    D: Deserializer<'de>,
{
    match OptionMapInput::deserialize(deserializer)? {
        OptionMapInput::Map(map) => Ok(map),
        OptionMapInput::Text(text) => serde_json::from_str(&text).map_err(serde::de::Error::custom),
    }
}
