use eyre::{
    Context as _,
    Result,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
};
use std::path::Path;
use strum::{
    Display,
    EnumIter,
    EnumString,
};

/// The backend an account lives on.
#[derive(
    Debug, Clone, Copy, Display, EnumIter, EnumString, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AccountKind {
    /// The persistent official world.
    Mmo,
    /// The official seasonal world, served below the season path of the official host.
    Season,
    /// A self-hosted server.
    Private,
}

impl AccountKind {
    /// Official backends are hosted externally: they are rate limited, served over TLS and do not
    /// expose server-wide statistics.
    pub fn is_official(self) -> bool {
        matches!(self, AccountKind::Mmo | AccountKind::Season)
    }
}

/// One entry of the users file, as written by the operator.
///
/// Every field is optional here; [`AccountDescriptor`]s are validated by the registry before an
/// account is polled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDescriptor {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(
        default,
        deserialize_with = "port_from_number_or_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shards: Option<Vec<String>>,
}

impl AccountDescriptor {
    /// Reads the users file.
    ///
    /// The file itself must be a JSON array. Entries are decoded one by one so a single malformed
    /// entry does not hide the others.
    pub fn load_all(path: impl AsRef<Path>) -> Result<Vec<Result<Self, serde_json::Error>>> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).wrap_err_with(|| format!("Failed to read users file {:?}", path))?;
        Self::parse_all(&content).wrap_err_with(|| format!("Failed to parse users file {:?}", path))
    }

    pub fn parse_all(content: &str) -> Result<Vec<Result<Self, serde_json::Error>>> {
        let entries: Vec<serde_json::Value> = serde_json::from_str(content)?;
        Ok(entries.into_iter().map(serde_json::from_value).collect())
    }
}

fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Option::<Port>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Port::Number(port)) => Ok(Some(port)),
        Some(Port::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Port::Text(text)) => text.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}
