//! Bucket policy documents.
//!
//! Both builders are pure: the same inputs always produce byte-identical JSON, so a
//! recorded policy compares equal on re-apply and causes no update.

use serde::Serialize;

const POLICY_VERSION: &str = "2012-10-17";

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyDocument<'a> {
    version: &'a str,
    statement: Vec<Statement<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Statement<'a> {
    effect: &'a str,
    principal: Principal<'a>,
    action: Vec<&'a str>,
    resource: Vec<String>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Principal<'a> {
    Anyone(&'a str),
    Aws {
        #[serde(rename = "AWS")]
        aws: &'a str,
    },
}

fn objects_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{}/*", bucket)
}

fn render(document: &PolicyDocument<'_>) -> String {
    // Serializing a struct of strings and vecs cannot fail.
    serde_json::to_string(document).unwrap_or_default()
}

/// Policy granting anonymous `s3:GetObject` on every object in `bucket`.
pub fn public_read_policy(bucket: &str) -> String {
    render(&PolicyDocument {
        version: POLICY_VERSION,
        statement: vec![Statement {
            effect: "Allow",
            principal: Principal::Anyone("*"),
            action: vec!["s3:GetObject"],
            resource: vec![objects_arn(bucket)],
        }],
    })
}

/// Policy granting `s3:GetObject` on every object in `bucket` to the CDN's
/// origin-access-identity only.
pub fn cdn_only_policy(bucket: &str, identity_arn: &str) -> String {
    render(&PolicyDocument {
        version: POLICY_VERSION,
        statement: vec![Statement {
            effect: "Allow",
            principal: Principal::Aws { aws: identity_arn },
            action: vec!["s3:GetObject"],
            resource: vec![objects_arn(bucket)],
        }],
    })
}
