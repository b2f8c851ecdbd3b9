use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::input::{Input, Inputs, OutputRef};

/// Every HTTP method the CDN accepts from viewers.
pub const ALL_METHODS: [&str; 7] = ["DELETE", "GET", "HEAD", "OPTIONS", "PATCH", "POST", "PUT"];

/// Methods whose responses are cached.
pub const CACHED_METHODS: [&str; 2] = ["GET", "HEAD"];

/// How the CDN treats plain-HTTP viewer requests.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ViewerProtocolPolicy {
    AllowAll,
    HttpsOnly,
    #[default]
    RedirectToHttps,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CookieForwarding {
    pub forward: String,
}

impl Default for CookieForwarding {
    fn default() -> Self {
        Self {
            forward: "none".into(),
        }
    }
}

/// What the CDN forwards to the origin. Defaults forward nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForwardedValues {
    pub query_string: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<String>,
    #[serde(default)]
    pub cookies: CookieForwarding,
}

/// A cache behavior. Used both as the default behavior and, with a path pattern, as an
/// ordered override.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheBehavior {
    pub allowed_methods: Vec<String>,
    pub cached_methods: Vec<String>,
    /// Filled with the site's origin id when left empty.
    #[serde(default)]
    pub target_origin_id: String,
    #[serde(default)]
    pub forwarded_values: ForwardedValues,
    #[serde(default)]
    pub viewer_protocol_policy: ViewerProtocolPolicy,
    pub min_ttl: u64,
    pub default_ttl: u64,
    pub max_ttl: u64,
    #[serde(default)]
    pub compress: bool,
}

impl CacheBehavior {
    /// All methods allowed, nothing forwarded, cached for an hour by default and a day at most.
    pub fn site_default(origin_id: &str, viewer_protocol_policy: ViewerProtocolPolicy) -> Self {
        Self {
            allowed_methods: ALL_METHODS.iter().map(|m| m.to_string()).collect(),
            cached_methods: CACHED_METHODS.iter().map(|m| m.to_string()).collect(),
            target_origin_id: origin_id.to_string(),
            forwarded_values: ForwardedValues::default(),
            viewer_protocol_policy,
            min_ttl: 0,
            default_ttl: 3600,
            max_ttl: 86400,
            compress: false,
        }
    }

    pub fn ttls_are_ordered(&self) -> bool {
        self.min_ttl <= self.default_ttl && self.default_ttl <= self.max_ttl
    }
}

/// A cache behavior that applies to requests matching `path_pattern`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderedCacheBehavior {
    pub path_pattern: String,
    #[serde(flatten)]
    pub behavior: CacheBehavior,
}

/// Access logging destination. Disabled unless configured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub include_cookies: bool,
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeoRestriction {
    pub restriction_type: String,
    pub locations: Vec<String>,
}

impl Default for GeoRestriction {
    fn default() -> Self {
        Self {
            restriction_type: "none".into(),
            locations: Vec::new(),
        }
    }
}

/// TLS certificate presented to viewers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewerCertificate {
    pub cloudfront_default_certificate: bool,
}

impl Default for ViewerCertificate {
    fn default() -> Self {
        Self {
            cloudfront_default_certificate: true,
        }
    }
}

/// Settings of the CDN distribution in front of the bucket.
///
/// The single origin is bound to the bucket at declaration time through
/// [`DistributionArgs::to_inputs`]; everything here is plain configuration data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DistributionArgs {
    pub origin_id: String,
    pub enabled: bool,
    pub is_ipv6_enabled: bool,
    pub comment: Option<String>,
    pub default_root_object: String,
    pub default_cache_behavior: CacheBehavior,
    /// Path-pattern overrides, evaluated in order. Empty by default.
    pub ordered_cache_behaviors: Vec<OrderedCacheBehavior>,
    pub price_class: String,
    pub geo_restriction: GeoRestriction,
    pub viewer_certificate: ViewerCertificate,
    pub logging: Option<LoggingConfig>,
    /// Custom domain names. Empty means the CDN's own domain only.
    pub aliases: Vec<String>,
    pub tags: BTreeMap<String, String>,
}

impl DistributionArgs {
    pub fn new(origin_id: impl Into<String>, viewer_protocol_policy: ViewerProtocolPolicy) -> Self {
        let origin_id = origin_id.into();
        Self {
            default_cache_behavior: CacheBehavior::site_default(&origin_id, viewer_protocol_policy),
            origin_id,
            enabled: true,
            is_ipv6_enabled: true,
            comment: None,
            default_root_object: "index.html".into(),
            ordered_cache_behaviors: Vec::new(),
            price_class: "PriceClass_100".into(),
            geo_restriction: GeoRestriction::default(),
            viewer_certificate: ViewerCertificate::default(),
            logging: None,
            aliases: Vec::new(),
            tags: BTreeMap::new(),
        }
    }

    /// Build node inputs with the single origin wired to the bucket's regional domain
    /// and the origin-access-identity's path.
    pub fn to_inputs(
        &self,
        bucket_domain: OutputRef,
        identity_path: OutputRef,
    ) -> Result<Inputs, serde_json::Error> {
        let origin = Input::map([
            ("domain_name", Input::Output(bucket_domain)),
            ("origin_id", Input::literal(self.origin_id.clone())),
            (
                "s3_origin_config",
                Input::map([("origin_access_identity", Input::Output(identity_path))]),
            ),
        ]);

        let mut ordered = self.ordered_cache_behaviors.clone();
        for o in &mut ordered {
            if o.behavior.target_origin_id.is_empty() {
                o.behavior.target_origin_id = self.origin_id.clone();
            }
        }

        let mut inputs = Inputs::from([
            ("origins".to_string(), Input::List(vec![origin])),
            ("enabled".to_string(), Input::literal(self.enabled)),
            ("is_ipv6_enabled".to_string(), Input::literal(self.is_ipv6_enabled)),
            (
                "default_root_object".to_string(),
                Input::literal(self.default_root_object.clone()),
            ),
            (
                "default_cache_behavior".to_string(),
                Input::from_serialize(&self.default_cache_behavior)?,
            ),
            (
                "ordered_cache_behaviors".to_string(),
                Input::from_serialize(&ordered)?,
            ),
            ("price_class".to_string(), Input::literal(self.price_class.clone())),
            (
                "restrictions".to_string(),
                Input::map([(
                    "geo_restriction",
                    Input::from_serialize(&self.geo_restriction)?,
                )]),
            ),
            (
                "viewer_certificate".to_string(),
                Input::from_serialize(&self.viewer_certificate)?,
            ),
            ("aliases".to_string(), Input::from_serialize(&self.aliases)?),
            ("tags".to_string(), Input::from_serialize(&self.tags)?),
        ]);
        if let Some(comment) = &self.comment {
            inputs.insert("comment".into(), Input::literal(comment.clone()));
        }
        if let Some(logging) = &self.logging {
            inputs.insert("logging_config".into(), Input::from_serialize(logging)?);
        }
        Ok(inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_behavior_matches_site_defaults() {
        let args = DistributionArgs::new("site-origin", ViewerProtocolPolicy::AllowAll);
        let b = &args.default_cache_behavior;
        assert_eq!(b.allowed_methods.len(), 7);
        assert_eq!(b.cached_methods, vec!["GET", "HEAD"]);
        assert_eq!((b.min_ttl, b.default_ttl, b.max_ttl), (0, 3600, 86400));
        assert!(!b.forwarded_values.query_string);
        assert_eq!(b.forwarded_values.cookies.forward, "none");
        assert!(args.ordered_cache_behaviors.is_empty());
        assert!(args.logging.is_none());
        assert!(args.aliases.is_empty());
    }

    #[test]
    fn test_viewer_policy_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_value(ViewerProtocolPolicy::RedirectToHttps).unwrap(),
            json!("redirect-to-https")
        );
        assert_eq!(
            serde_json::to_value(ViewerProtocolPolicy::AllowAll).unwrap(),
            json!("allow-all")
        );
    }

    #[test]
    fn test_inputs_reference_bucket_and_identity() {
        let args = DistributionArgs::new("site-origin", ViewerProtocolPolicy::default());
        let inputs = args
            .to_inputs(
                OutputRef::new("site-bucket", "bucket_regional_domain_name"),
                OutputRef::new("oai", "cloudfront_access_identity_path"),
            )
            .unwrap();
        let nodes: Vec<&str> = inputs
            .values()
            .flat_map(|i| i.references())
            .map(|r| r.node.as_str())
            .collect();
        assert_eq!(nodes, vec!["site-bucket", "oai"]);
        assert!(!inputs.contains_key("logging_config"));
        assert!(!inputs.contains_key("comment"));
    }

    #[test]
    fn test_ordered_behaviors_target_site_origin() {
        let mut args = DistributionArgs::new("site-origin", ViewerProtocolPolicy::default());
        let mut behavior = CacheBehavior::site_default("", ViewerProtocolPolicy::RedirectToHttps);
        behavior.compress = true;
        args.ordered_cache_behaviors.push(OrderedCacheBehavior {
            path_pattern: "/content/*".into(),
            behavior,
        });
        let inputs = args
            .to_inputs(OutputRef::new("b", "d"), OutputRef::new("o", "p"))
            .unwrap();
        let Input::Literal(value) = &inputs["ordered_cache_behaviors"] else {
            panic!("ordered behaviors should be literal");
        };
        assert_eq!(value[0]["path_pattern"], json!("/content/*"));
        assert_eq!(value[0]["target_origin_id"], json!("site-origin"));
    }
}
