use std::fs;
use std::sync::Arc;

use serde_json::json;
use sitestack::config::StackConfig;
use sitestack::db::Database;
use sitestack::engine::{ApplyError, Engine, RefreshChange, StepOp, StepStatus};
use sitestack::graph::GraphError;
use sitestack::models::*;
use sitestack::provider::{Operation, ProviderCall, Providers, SimulatedCloud};
use sitestack::stack::{build_stack, StackDeclaration, StaticSite};
use tempfile::TempDir;

const BUCKET: &str = "static-site-bucket";
const POLICY: &str = "static-site-bucket-policy";
const IDENTITY: &str = "origin-access-identity-static-site";
const DISTRIBUTION: &str = "static-site";

fn object(file: &str) -> String {
    StaticSite::object_node(DISTRIBUTION, file)
}

fn setup() -> (Engine, Arc<SimulatedCloud>) {
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");
    let cloud = Arc::new(SimulatedCloud::default());
    let providers = Providers::new().with_cloud(cloud.clone());
    (Engine::new(db, providers), cloud)
}

fn site_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    for (name, body) in files {
        fs::write(dir.path().join(name), body).expect("Failed to write content file");
    }
    dir
}

fn config_for(dir: &TempDir) -> StackConfig {
    StackConfig {
        content_dir: dir.path().to_path_buf(),
        ..StackConfig::default()
    }
}

fn position(calls: &[ProviderCall], operation: Operation, name: &str) -> usize {
    calls
        .iter()
        .position(|c| c.operation == operation && c.name == name)
        .unwrap_or_else(|| panic!("No {} call for {}", operation, name))
}

mod apply {
    use super::*;

    #[tokio::test]
    async fn creates_producers_before_consumers() {
        let (engine, cloud) = setup();
        let dir = site_dir(&[("index.html", "<h1>hi</h1>")]);
        let decl = build_stack(&config_for(&dir)).unwrap();

        let report = engine.apply(&decl).await.unwrap();
        assert!(report.is_success());

        let calls = cloud.calls();
        let distribution = position(&calls, Operation::Create, DISTRIBUTION);
        assert!(position(&calls, Operation::Create, BUCKET) < distribution);
        assert!(position(&calls, Operation::Create, IDENTITY) < distribution);
        assert!(position(&calls, Operation::Create, IDENTITY) < position(&calls, Operation::Create, POLICY));
        assert!(position(&calls, Operation::Create, BUCKET) < position(&calls, Operation::Create, &object("index.html")));
    }

    #[tokio::test]
    async fn uploads_one_object_per_file() {
        let (engine, cloud) = setup();
        let dir = site_dir(&[("index.html", "<h1>hi</h1>")]);
        let decl = build_stack(&config_for(&dir)).unwrap();

        engine.apply(&decl).await.unwrap();

        let objects: Vec<ProviderCall> = cloud
            .calls()
            .into_iter()
            .filter(|c| c.kind == ResourceKind::BucketObject)
            .collect();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].operation, Operation::Create);

        let inputs = objects[0].inputs.clone().unwrap();
        assert_eq!(inputs["key"], json!("index.html"));
        assert_eq!(inputs["content_type"], json!("text/html"));

        let bucket = engine.database().get_resource("dev", BUCKET).unwrap().unwrap();
        assert_eq!(inputs["bucket"], json!(bucket.id));
    }

    #[tokio::test]
    async fn file_named_like_the_distribution_is_uploaded() {
        let (engine, cloud) = setup();
        let dir = site_dir(&[("index.html", "<h1>hi</h1>"), (DISTRIBUTION, "plain")]);
        let decl = build_stack(&config_for(&dir)).unwrap();

        let report = engine.apply(&decl).await.unwrap();
        assert!(report.is_success());

        let record = engine
            .database()
            .get_resource("dev", &object(DISTRIBUTION))
            .unwrap()
            .unwrap();
        assert_eq!(record.kind, ResourceKind::BucketObject);
        assert_eq!(record.inputs["key"], json!(DISTRIBUTION));

        let distribution = engine.database().get_resource("dev", DISTRIBUTION).unwrap().unwrap();
        assert_eq!(distribution.kind, ResourceKind::Distribution);
        position(&cloud.calls(), Operation::Create, &object(DISTRIBUTION));
    }

    #[tokio::test]
    async fn empty_content_dir_creates_no_objects() {
        let (engine, cloud) = setup();
        let dir = site_dir(&[]);
        let decl = build_stack(&config_for(&dir)).unwrap();

        let report = engine.apply(&decl).await.unwrap();
        assert!(report.is_success());
        assert!(cloud.calls().iter().all(|c| c.kind != ResourceKind::BucketObject));
        assert_eq!(report.steps.len(), 4);
    }

    #[tokio::test]
    async fn records_exports() {
        let (engine, _cloud) = setup();
        let dir = site_dir(&[("index.html", "<h1>hi</h1>")]);
        let decl = build_stack(&config_for(&dir)).unwrap();

        let report = engine.apply(&decl).await.unwrap();

        let distribution = engine.database().get_resource("dev", DISTRIBUTION).unwrap().unwrap();
        let domain = distribution.outputs["domain_name"].clone();
        assert_eq!(report.exports.get("url"), Some(&domain));
        assert_eq!(report.exports.get("site"), Some(&domain));
        assert!(report.exports.contains_key("readme"));
        assert!(report.exports.contains_key("bucket_name"));
        assert!(report.exports.contains_key("s3_url"));
        assert_eq!(engine.database().get_exports("dev").unwrap(), report.exports);
    }

    #[tokio::test]
    async fn second_apply_makes_no_mutating_calls() {
        let (engine, cloud) = setup();
        let dir = site_dir(&[("index.html", "<h1>hi</h1>"), ("error.html", "oops")]);
        let decl = build_stack(&config_for(&dir)).unwrap();

        engine.apply(&decl).await.unwrap();
        cloud.clear_calls();

        let report = engine.apply(&decl).await.unwrap();
        assert!(report.is_success());
        assert!(cloud.mutating_calls().is_empty());
        assert!(report.steps.iter().all(|s| s.status == StepStatus::Unchanged));
    }

    #[tokio::test]
    async fn changed_file_updates_only_its_object() {
        let (engine, cloud) = setup();
        let dir = site_dir(&[("index.html", "v1"), ("error.html", "oops")]);
        engine.apply(&build_stack(&config_for(&dir)).unwrap()).await.unwrap();
        cloud.clear_calls();

        fs::write(dir.path().join("index.html"), "v2").unwrap();
        let report = engine.apply(&build_stack(&config_for(&dir)).unwrap()).await.unwrap();

        let mutating = cloud.mutating_calls();
        assert_eq!(mutating.len(), 1);
        assert_eq!(mutating[0].operation, Operation::Update);
        assert_eq!(mutating[0].name, object("index.html"));
        assert_eq!(report.step(&object("error.html")).unwrap().op, StepOp::Same);
    }

    #[tokio::test]
    async fn failure_skips_dependents_and_keeps_applied_resources() {
        let (engine, cloud) = setup();
        cloud.fail_on(ResourceKind::OriginAccessIdentity);
        let dir = site_dir(&[("index.html", "<h1>hi</h1>")]);
        let decl = build_stack(&config_for(&dir)).unwrap();

        let report = engine.apply(&decl).await.unwrap();
        assert!(!report.is_success());

        assert!(matches!(report.step(IDENTITY).unwrap().status, StepStatus::Failed { .. }));
        for name in [DISTRIBUTION, POLICY] {
            assert_eq!(
                report.step(name).unwrap().status,
                StepStatus::Skipped {
                    blocked_by: IDENTITY.to_string()
                }
            );
        }
        assert!(cloud.calls().iter().all(|c| c.name != DISTRIBUTION));

        let state = engine.database().load_stack("dev").unwrap();
        assert!(state.get(BUCKET).is_some());
        assert!(state.get(&object("index.html")).is_some());
        assert!(state.get(IDENTITY).is_none());
        assert!(state.get(DISTRIBUTION).is_none());

        assert!(report.exports.contains_key("bucket_name"));
        assert!(!report.exports.contains_key("url"));
    }

    #[tokio::test]
    async fn removed_file_deletes_its_object() {
        let (engine, cloud) = setup();
        let dir = site_dir(&[("index.html", "<h1>hi</h1>"), ("old.html", "bye")]);
        engine.apply(&build_stack(&config_for(&dir)).unwrap()).await.unwrap();
        cloud.clear_calls();

        fs::remove_file(dir.path().join("old.html")).unwrap();
        let report = engine.apply(&build_stack(&config_for(&dir)).unwrap()).await.unwrap();

        assert!(report.is_success());
        let step = report.step(&object("old.html")).unwrap();
        assert_eq!(step.op, StepOp::Delete);
        assert_eq!(step.status, StepStatus::Applied);

        let mutating = cloud.mutating_calls();
        assert_eq!(mutating.len(), 1);
        assert_eq!(mutating[0].operation, Operation::Delete);
        assert_eq!(mutating[0].name, object("old.html"));
        assert!(engine.database().get_resource("dev", &object("old.html")).unwrap().is_none());
    }

    #[tokio::test]
    async fn switching_to_public_read_updates_bucket_and_policy() {
        let (engine, cloud) = setup();
        let dir = site_dir(&[("index.html", "<h1>hi</h1>")]);
        let mut config = config_for(&dir);
        engine.apply(&build_stack(&config).unwrap()).await.unwrap();
        cloud.clear_calls();

        config.site.access = SiteAccess::PublicRead;
        let report = engine.apply(&build_stack(&config).unwrap()).await.unwrap();
        assert!(report.is_success());

        let mut updated: Vec<String> = cloud
            .mutating_calls()
            .into_iter()
            .map(|c| {
                assert_eq!(c.operation, Operation::Update);
                c.name
            })
            .collect();
        updated.sort();
        assert_eq!(updated, vec![BUCKET.to_string(), POLICY.to_string()]);

        let policy = engine.database().get_resource("dev", POLICY).unwrap().unwrap();
        let document: serde_json::Value =
            serde_json::from_str(policy.inputs["policy"].as_str().unwrap()).unwrap();
        assert_eq!(document["Statement"][0]["Principal"], json!("*"));
    }

    #[tokio::test]
    async fn undeclared_producer_fails_before_any_call() {
        let (engine, cloud) = setup();
        let mut decl = StackDeclaration::new("dev");
        decl.add(
            ResourceNode::new("object", ResourceKind::BucketObject)
                .with_input("bucket", Input::Output(OutputRef::new("ghost", "id"))),
        );

        let err = engine.apply(&decl).await.unwrap_err();
        assert!(matches!(
            err,
            ApplyError::Graph(GraphError::UnknownProducer { ref consumer, ref producer })
                if consumer == "object" && producer == "ghost"
        ));
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn cycle_fails_before_any_call() {
        let (engine, cloud) = setup();
        let mut decl = StackDeclaration::new("dev");
        decl.add(
            ResourceNode::new("a", ResourceKind::Bucket)
                .with_input("x", Input::Output(OutputRef::new("b", "id"))),
        );
        decl.add(
            ResourceNode::new("b", ResourceKind::Bucket)
                .with_input("x", Input::Output(OutputRef::new("a", "id"))),
        );

        let err = engine.apply(&decl).await.unwrap_err();
        assert!(matches!(err, ApplyError::Graph(GraphError::Cycle(_))));
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_output_aborts() {
        let (engine, _cloud) = setup();
        let mut decl = StackDeclaration::new("dev");
        let bucket = ResourceNode::new("bucket", ResourceKind::Bucket);
        let missing = bucket.output("no_such_field");
        decl.add(bucket);
        decl.add(ResourceNode::new("object", ResourceKind::BucketObject).with_input("bucket", Input::Output(missing)));

        let err = engine.apply(&decl).await.unwrap_err();
        assert!(matches!(err, ApplyError::MissingOutput { ref consumer, .. } if consumer == "object"));
    }

    #[tokio::test]
    async fn failed_replace_forgets_the_deleted_resource() {
        let (engine, cloud) = setup();
        let mut first = StackDeclaration::new("dev");
        first.add(ResourceNode::new("asset", ResourceKind::Bucket));
        engine.apply(&first).await.unwrap();

        cloud.fail_on(ResourceKind::BucketObject);
        let mut second = StackDeclaration::new("dev");
        second.add(
            ResourceNode::new("asset", ResourceKind::BucketObject)
                .with_input("key", Input::literal("asset.txt")),
        );

        let report = engine.apply(&second).await.unwrap();
        let step = report.step("asset").unwrap();
        assert_eq!(step.op, StepOp::Replace);
        assert!(matches!(step.status, StepStatus::Failed { .. }));
        position(&cloud.calls(), Operation::Delete, "asset");
        assert!(engine.database().get_resource("dev", "asset").unwrap().is_none());

        let plan = engine.preview(&second).unwrap();
        assert_eq!(plan.steps[0].op, StepOp::Create);
    }

    #[tokio::test]
    async fn unregistered_kind_fails_before_any_call() {
        let (engine, cloud) = setup();
        let dir = site_dir(&[("index.html", "<h1>hi</h1>")]);
        let mut config = config_for(&dir);
        config.swag = Some(SwagProps {
            name: "A".into(),
            email: "a@x.com".into(),
            address: "addr".into(),
            size: "M".into(),
        });

        let err = engine.apply(&build_stack(&config).unwrap()).await.unwrap_err();
        assert!(matches!(err, ApplyError::NoProvider(ResourceKind::SwagRequest)));
        assert!(cloud.calls().is_empty());
    }
}

mod preview {
    use super::*;

    #[tokio::test]
    async fn fresh_stack_creates_everything() {
        let (engine, cloud) = setup();
        let dir = site_dir(&[("index.html", "<h1>hi</h1>")]);
        let decl = build_stack(&config_for(&dir)).unwrap();

        let plan = engine.preview(&decl).unwrap();
        assert_eq!(plan.steps.len(), 5);
        assert!(plan.steps.iter().all(|s| s.op == StepOp::Create));
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn applied_stack_has_no_changes() {
        let (engine, _cloud) = setup();
        let dir = site_dir(&[("index.html", "<h1>hi</h1>")]);
        let decl = build_stack(&config_for(&dir)).unwrap();
        engine.apply(&decl).await.unwrap();

        let plan = engine.preview(&decl).unwrap();
        assert_eq!(plan.changes(), 0);
    }

    #[tokio::test]
    async fn shows_added_and_removed_files() {
        let (engine, _cloud) = setup();
        let dir = site_dir(&[("index.html", "<h1>hi</h1>"), ("old.html", "bye")]);
        engine.apply(&build_stack(&config_for(&dir)).unwrap()).await.unwrap();

        fs::remove_file(dir.path().join("old.html")).unwrap();
        fs::write(dir.path().join("new.css"), "body {}").unwrap();
        let plan = engine.preview(&build_stack(&config_for(&dir)).unwrap()).unwrap();

        assert_eq!(plan.changes(), 2);
        let op = |name: &str| plan.steps.iter().find(|s| s.name == name).map(|s| s.op);
        assert_eq!(op(&object("new.css")), Some(StepOp::Create));
        assert_eq!(op(&object("old.html")), Some(StepOp::Delete));
        assert_eq!(op(&object("index.html")), Some(StepOp::Same));
    }
}

mod refresh {
    use super::*;

    #[tokio::test]
    async fn unchanged_resources_stay_unchanged() {
        let (engine, cloud) = setup();
        let dir = site_dir(&[("index.html", "<h1>hi</h1>")]);
        engine.apply(&build_stack(&config_for(&dir)).unwrap()).await.unwrap();
        cloud.clear_calls();

        let outcomes = engine.refresh("dev").await.unwrap();
        assert_eq!(outcomes.len(), 5);
        assert!(outcomes.iter().all(|o| o.change == RefreshChange::Unchanged));
        assert!(cloud.mutating_calls().is_empty());
        assert!(cloud.calls().iter().all(|c| c.operation == Operation::Read));
    }

    #[tokio::test]
    async fn empty_stack_refreshes_nothing() {
        let (engine, _cloud) = setup();
        assert!(engine.refresh("dev").await.unwrap().is_empty());
    }
}

mod destroy {
    use super::*;

    #[tokio::test]
    async fn deletes_consumers_first_and_forgets_the_stack() {
        let (engine, cloud) = setup();
        let dir = site_dir(&[("index.html", "<h1>hi</h1>")]);
        engine.apply(&build_stack(&config_for(&dir)).unwrap()).await.unwrap();
        cloud.clear_calls();

        let report = engine.destroy("dev").await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.steps.len(), 5);
        assert!(report.steps.iter().all(|s| s.op == StepOp::Delete));

        let calls = cloud.calls();
        let bucket = position(&calls, Operation::Delete, BUCKET);
        assert!(position(&calls, Operation::Delete, DISTRIBUTION) < bucket);
        assert!(position(&calls, Operation::Delete, POLICY) < bucket);
        assert!(position(&calls, Operation::Delete, &object("index.html")) < bucket);
        assert!(position(&calls, Operation::Delete, DISTRIBUTION) < position(&calls, Operation::Delete, IDENTITY));

        let state = engine.database().load_stack("dev").unwrap();
        assert!(state.is_empty());
        assert!(state.exports.is_empty());
        assert!(engine.database().list_stacks().unwrap().is_empty());
    }
}
