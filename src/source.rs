//! # Node Source Module
//!
//! Fetches the repeater node list from the upstream status API.
//!
//! The API answers with a JSON array of node objects. Only the fields used to
//! build the KML document are extracted; everything else is ignored. Missing
//! fields fall back to the same defaults the upstream dashboard uses:
//! - `keyed` → `"0"`
//! - `time` → `0`
//! - `hidden` → `false`
//!
//! There is no retry here. A failed fetch is retried by the next scheduled
//! refresh.
use crate::error::FetchError;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::time::Duration;

/// One entry of the upstream node list.
#[derive(serde::Deserialize, Clone, Debug, PartialEq)]
pub struct NodeRecord {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub latitude: Option<f64>,

    #[serde(default)]
    pub longitude: Option<f64>,

    /// `"1"` while the repeater is transmitting.
    #[serde(default = "default_keyed", deserialize_with = "keyed_flag")]
    pub keyed: String,

    /// Unix seconds of the last status report.
    #[serde(rename = "time", default, deserialize_with = "epoch_secs")]
    pub last_report: i64,

    #[serde(default, deserialize_with = "truthy")]
    pub hidden: bool,
}

impl NodeRecord {
    pub fn is_keyed(&self) -> bool {
        self.keyed == "1"
    }

    /// `(longitude, latitude)` when both are present.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.longitude, self.latitude) {
            (Some(lon), Some(lat)) => Some((lon, lat)),
            _ => None,
        }
    }
}

fn default_keyed() -> String {
    "0".to_string()
}

// Only the string "1" means keyed. Non-string values never match it, so they
// read as not keyed instead of failing the whole node list.
fn keyed_flag<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        _ => default_keyed(),
    })
}

fn epoch_secs<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| serde::de::Error::custom(format!("invalid time: {}", n))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "invalid time: {}",
            other
        ))),
    }
}

fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    })
}

/// Parses an upstream response body. Anything other than an array of
/// objects is a parse failure.
pub fn parse_nodes(body: &str) -> Result<Vec<NodeRecord>, FetchError> {
    Ok(serde_json::from_str(body)?)
}

/// Anything the refresh scheduler can pull a node list from.
#[async_trait]
pub trait NodeSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<NodeRecord>, FetchError>;
}

/// Polls the status API over HTTP.
pub struct HttpNodeSource {
    client: reqwest::Client,
    url: String,
}

impl HttpNodeSource {
    /// `timeout` bounds the whole request so a hung upstream cannot stall
    /// the refresh loop forever.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpNodeSource {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NodeSource for HttpNodeSource {
    async fn fetch(&self) -> Result<Vec<NodeRecord>, FetchError> {
        let resp = self.client.get(&self.url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = resp.text().await?;
        parse_nodes(&body)
    }
}
