//! Stack declarations.
//!
//! A [`StackDeclaration`] is the desired state handed to the engine: resource nodes in
//! declaration order plus named exports. [`build_stack`] assembles the full static-site
//! stack from validated configuration.

mod site;

pub use site::*;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::config::StackConfig;
use crate::content::ContentError;
use crate::models::*;

pub const README: &str = "A stack hosting a static website from a storage bucket behind a CDN";

/// Logical name of the swag request node.
pub const SWAG_NODE: &str = "swag";

#[derive(Debug, Error)]
pub enum StackError {
    #[error(transparent)]
    Content(#[from] ContentError),

    #[error("Failed to serialize resource inputs: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StackDeclaration {
    pub name: String,
    pub nodes: Vec<ResourceNode>,
    pub exports: BTreeMap<String, Input>,
}

impl StackDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            exports: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, node: ResourceNode) {
        self.nodes.push(node);
    }

    pub fn export(&mut self, key: impl Into<String>, value: Input) {
        self.exports.insert(key.into(), value);
    }

    pub fn node(&self, name: &str) -> Option<&ResourceNode> {
        self.nodes.iter().find(|n| n.name == name)
    }
}

/// Declare the create-only swag request node.
pub fn declare_swag(stack: &mut StackDeclaration, props: &SwagProps) {
    stack.add(ResourceNode::new(SWAG_NODE, ResourceKind::SwagRequest).with_inputs(props.to_inputs()));
}

/// Build the complete stack described by `config`.
///
/// Reads the content directory listing and file digests; performs no network calls.
pub fn build_stack(config: &StackConfig) -> Result<StackDeclaration, StackError> {
    let mut stack = StackDeclaration::new(config.stack.clone());

    let site = StaticSite::declare(&mut stack, &config.site_name, &config.content_dir, &config.site)?;

    stack.export("readme", Input::literal(README));
    stack.export("bucket_name", Input::Output(site.bucket_name));
    stack.export("s3_url", Input::Output(site.s3_url));
    stack.export("url", Input::Output(site.url.clone()));
    stack.export("site", Input::Output(site.url));

    if let Some(swag) = &config.swag {
        declare_swag(&mut stack, swag);
    }

    Ok(stack)
}
