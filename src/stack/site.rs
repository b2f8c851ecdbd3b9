use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{StackDeclaration, StackError};
use crate::content;
use crate::models::*;

/// Tunable parts of the static site. Everything else is fixed by [`StaticSite`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SiteSettings {
    pub access: SiteAccess,
    pub viewer_protocol_policy: ViewerProtocolPolicy,
    pub price_class: Option<String>,
    pub comment: Option<String>,
    pub aliases: Vec<String>,
    pub logging: Option<LoggingConfig>,
    pub ordered_cache_behaviors: Vec<OrderedCacheBehavior>,
}

/// The static website component: bucket, bucket policy, one object per content file,
/// origin-access-identity and CDN distribution.
///
/// Declaring the component only records nodes; nothing is created until the engine
/// applies the stack. The fields reference the outputs the component exposes.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticSite {
    pub bucket_name: OutputRef,
    pub s3_url: OutputRef,
    pub url: OutputRef,
}

/// `Environment` tag value for well-known stack names.
pub fn environment_tag(stack: &str) -> Option<&'static str> {
    match stack {
        "dev" => Some("Development"),
        "prod" => Some("Production"),
        _ => None,
    }
}

impl StaticSite {
    pub fn bucket_node(name: &str) -> String {
        format!("{}-bucket", name)
    }

    pub fn policy_node(name: &str) -> String {
        format!("{}-bucket-policy", name)
    }

    pub fn identity_node(name: &str) -> String {
        format!("origin-access-identity-{}", name)
    }

    pub fn distribution_node(name: &str) -> String {
        name.to_string()
    }

    /// Content objects get their own prefix so a file can never share a node name with
    /// the other site resources or the swag request. The object key stays the file name.
    pub fn object_node(name: &str, file_name: &str) -> String {
        format!("{}-object-{}", name, file_name)
    }

    pub fn declare(
        stack: &mut StackDeclaration,
        name: &str,
        content_dir: &Path,
        settings: &SiteSettings,
    ) -> Result<Self, StackError> {
        let env_tag = environment_tag(&stack.name);

        let mut bucket_tags = BTreeMap::new();
        if let Some(env) = env_tag {
            bucket_tags.insert("Environment".to_string(), env.to_string());
        }
        bucket_tags.insert("Name".to_string(), "S3 static content for a website".to_string());

        let bucket = ResourceNode::new(Self::bucket_node(name), ResourceKind::Bucket)
            .with_inputs(BucketArgs::new(settings.access, bucket_tags).to_inputs()?);
        let bucket_id = bucket.output("id");

        let identity = ResourceNode::new(Self::identity_node(name), ResourceKind::OriginAccessIdentity)
            .with_input("comment", Input::literal(format!("Access identity for {}", name)));

        let policy = match settings.access {
            SiteAccess::PublicRead => Derived::PublicReadPolicy {
                bucket: bucket_id.clone(),
            },
            SiteAccess::CdnOnly => Derived::CdnOnlyPolicy {
                bucket: bucket_id.clone(),
                identity_arn: identity.output("iam_arn"),
            },
        };
        let policy = ResourceNode::new(Self::policy_node(name), ResourceKind::BucketPolicy)
            .with_input("bucket", Input::Output(bucket_id.clone()))
            .with_input("policy", Input::Derived(policy));

        let mut objects = Vec::new();
        for entry in content::enumerate(content_dir)? {
            let entry = entry?;
            let mut object =
                ResourceNode::new(Self::object_node(name, &entry.file_name), ResourceKind::BucketObject)
                .with_input("bucket", Input::Output(bucket_id.clone()))
                .with_input("key", Input::literal(entry.file_name.clone()))
                .with_input("source", Input::literal(entry.path.display().to_string()))
                .with_input("etag", Input::literal(entry.digest()?));
            if let Some(content_type) = entry.content_type {
                object = object.with_input("content_type", Input::literal(content_type));
            }
            objects.push(object);
        }

        let origin_id = format!("{}-origin", name);
        let mut args = DistributionArgs::new(origin_id, settings.viewer_protocol_policy);
        args.comment = settings.comment.clone();
        args.aliases = settings.aliases.clone();
        args.logging = settings.logging.clone();
        args.ordered_cache_behaviors = settings.ordered_cache_behaviors.clone();
        if let Some(price_class) = &settings.price_class {
            args.price_class = price_class.clone();
        }
        if let Some(env) = env_tag {
            args.tags.insert("Environment".to_string(), env.to_string());
        }
        let distribution = ResourceNode::new(Self::distribution_node(name), ResourceKind::Distribution)
            .with_inputs(args.to_inputs(
                bucket.output("bucket_regional_domain_name"),
                identity.output("cloudfront_access_identity_path"),
            )?);

        let site = Self {
            bucket_name: bucket_id,
            s3_url: bucket.output("website_endpoint"),
            url: distribution.output("domain_name"),
        };

        stack.add(bucket);
        stack.add(policy);
        stack.nodes.extend(objects);
        stack.add(identity);
        stack.add(distribution);

        Ok(site)
    }
}
