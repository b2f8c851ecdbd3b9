use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::input::{Input, Inputs};

/// How viewers are allowed to reach the bucket's objects.
///
/// - `CdnOnly`: Objects are private; only the CDN's origin-access-identity may read them.
/// - `PublicRead`: Objects are readable anonymously, both directly and through the CDN.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SiteAccess {
    #[default]
    CdnOnly,
    PublicRead,
}

impl SiteAccess {
    /// Canned ACL for the bucket itself.
    pub fn acl(&self) -> &'static str {
        match self {
            Self::CdnOnly => "private",
            Self::PublicRead => "public-read",
        }
    }
}

/// Static website hosting documents served by the bucket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebsiteConfig {
    pub index_document: String,
    pub error_document: String,
}

impl Default for WebsiteConfig {
    fn default() -> Self {
        Self {
            index_document: "index.html".into(),
            error_document: "error.html".into(),
        }
    }
}

/// Arguments of the storage bucket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BucketArgs {
    pub acl: String,
    pub website: WebsiteConfig,
    pub tags: BTreeMap<String, String>,
}

impl BucketArgs {
    pub fn new(access: SiteAccess, tags: BTreeMap<String, String>) -> Self {
        Self {
            acl: access.acl().to_string(),
            website: WebsiteConfig::default(),
            tags,
        }
    }

    pub fn to_inputs(&self) -> Result<Inputs, serde_json::Error> {
        Ok(Inputs::from([
            ("acl".to_string(), Input::literal(self.acl.clone())),
            ("website".to_string(), Input::from_serialize(&self.website)?),
            ("tags".to_string(), Input::from_serialize(&self.tags)?),
        ]))
    }
}
