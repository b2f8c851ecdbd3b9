use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use sitestack::db::Database;
use sitestack::engine::{ApplyError, Engine, RefreshChange, StepOp, StepStatus};
use sitestack::models::*;
use sitestack::provider::{ProviderError, Providers, ResourceProvider, SimulatedCloud, SwagProvider};
use sitestack::stack::{declare_swag, StackDeclaration, SWAG_NODE};

#[derive(Clone)]
struct Webhook {
    status: StatusCode,
    received: Arc<Mutex<Vec<Value>>>,
}

async fn receive(State(hook): State<Webhook>, Json(body): Json<Value>) -> StatusCode {
    hook.received.lock().unwrap().push(body);
    hook.status
}

/// Serve a webhook on an ephemeral port that answers every POST with `status`.
async fn spawn_webhook(status: StatusCode) -> (String, Arc<Mutex<Vec<Value>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().route("/swag", post(receive)).with_state(Webhook {
        status,
        received: received.clone(),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/swag", addr), received)
}

fn props(size: &str) -> SwagProps {
    SwagProps {
        name: "Ada".into(),
        email: "ada@example.com".into(),
        address: "1 Analytical Way".into(),
        size: size.into(),
    }
}

fn swag_engine(url: &str) -> Engine {
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");
    let providers =
        Providers::new().register(ResourceKind::SwagRequest, Arc::new(SwagProvider::new(url)));
    Engine::new(db, providers)
}

fn swag_stack(props: &SwagProps) -> StackDeclaration {
    let mut decl = StackDeclaration::new("dev");
    declare_swag(&mut decl, props);
    decl
}

mod provider {
    use super::*;

    #[tokio::test]
    async fn ok_response_echoes_props() {
        let (url, received) = spawn_webhook(StatusCode::OK).await;
        let provider = SwagProvider::new(&url);
        let inputs = serde_json::to_value(props("M")).unwrap();

        let created = provider
            .create(SWAG_NODE, ResourceKind::SwagRequest, &inputs)
            .await
            .unwrap();

        assert_eq!(created.id, "ada@example.com");
        assert_eq!(json!(created.outputs), inputs);
        assert_eq!(*received.lock().unwrap(), vec![inputs]);
    }

    #[tokio::test]
    async fn error_response_is_fatal() {
        let (url, received) = spawn_webhook(StatusCode::INTERNAL_SERVER_ERROR).await;
        let provider = SwagProvider::new(&url);
        let inputs = serde_json::to_value(props("M")).unwrap();

        let err = provider
            .create(SWAG_NODE, ResourceKind::SwagRequest, &inputs)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Fatal(_)));
        assert!(err.is_fatal());
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn non_200_success_is_fatal() {
        let (url, _received) = spawn_webhook(StatusCode::ACCEPTED).await;
        let provider = SwagProvider::new(&url);
        let inputs = serde_json::to_value(props("M")).unwrap();

        let err = provider
            .create(SWAG_NODE, ResourceKind::SwagRequest, &inputs)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}

mod apply {
    use super::*;

    #[tokio::test]
    async fn creates_the_request_once() {
        let (url, received) = spawn_webhook(StatusCode::OK).await;
        let engine = swag_engine(&url);
        let decl = swag_stack(&props("M"));

        let first = engine.apply(&decl).await.unwrap();
        assert!(first.is_success());
        assert_eq!(first.step(SWAG_NODE).unwrap().op, StepOp::Create);

        let second = engine.apply(&decl).await.unwrap();
        assert_eq!(second.step(SWAG_NODE).unwrap().status, StepStatus::Unchanged);
        assert_eq!(received.lock().unwrap().len(), 1);

        let record = engine.database().get_resource("dev", SWAG_NODE).unwrap().unwrap();
        assert_eq!(record.id, "ada@example.com");
        assert_eq!(record.outputs["size"], json!("M"));
    }

    #[tokio::test]
    async fn error_response_aborts_without_recording() {
        let (url, _received) = spawn_webhook(StatusCode::INTERNAL_SERVER_ERROR).await;
        let engine = swag_engine(&url);

        let err = engine.apply(&swag_stack(&props("M"))).await.unwrap_err();
        assert!(matches!(
            err,
            ApplyError::Aborted { ref resource, source: ProviderError::Fatal(_) } if resource == SWAG_NODE
        ));
        assert!(engine.database().get_resource("dev", SWAG_NODE).unwrap().is_none());
    }

    #[tokio::test]
    async fn changed_props_are_refused_without_a_request() {
        let (url, received) = spawn_webhook(StatusCode::OK).await;
        let engine = swag_engine(&url);
        engine.apply(&swag_stack(&props("M"))).await.unwrap();

        let report = engine.apply(&swag_stack(&props("XL"))).await.unwrap();
        let step = report.step(SWAG_NODE).unwrap();
        assert_eq!(step.op, StepOp::Update);
        assert!(matches!(step.status, StepStatus::Failed { .. }));
        assert_eq!(received.lock().unwrap().len(), 1);

        let record = engine.database().get_resource("dev", SWAG_NODE).unwrap().unwrap();
        assert_eq!(record.outputs["size"], json!("M"));
    }

    #[tokio::test]
    async fn destroy_forgets_the_request_without_a_call() {
        let (url, received) = spawn_webhook(StatusCode::OK).await;
        let engine = swag_engine(&url);
        engine.apply(&swag_stack(&props("M"))).await.unwrap();

        let report = engine.destroy("dev").await.unwrap();
        assert!(report.is_success());
        let step = report.step(SWAG_NODE).unwrap();
        assert_eq!(step.op, StepOp::Delete);
        assert_eq!(step.status, StepStatus::Forgotten);
        assert!(engine.database().get_resource("dev", SWAG_NODE).unwrap().is_none());
        assert!(engine.database().list_stacks().unwrap().is_empty());
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dropping_swag_needs_no_webhook_provider() {
        let (url, received) = spawn_webhook(StatusCode::OK).await;
        let engine = swag_engine(&url);
        engine.apply(&swag_stack(&props("M"))).await.unwrap();

        // Later runs without swag configured register only the cloud provider.
        let cloud = Arc::new(SimulatedCloud::default());
        let later = Engine::new(
            engine.database().clone(),
            Providers::new().with_cloud(cloud.clone()),
        );

        let report = later.apply(&StackDeclaration::new("dev")).await.unwrap();
        assert!(report.is_success());
        let step = report.step(SWAG_NODE).unwrap();
        assert_eq!(step.op, StepOp::Delete);
        assert_eq!(step.status, StepStatus::Forgotten);
        assert!(later.database().get_resource("dev", SWAG_NODE).unwrap().is_none());

        let again = later.apply(&StackDeclaration::new("dev")).await.unwrap();
        assert!(again.is_success());
        assert!(again.steps.is_empty());

        assert!(later.destroy("dev").await.unwrap().is_success());
        assert!(cloud.calls().is_empty());
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn refresh_keeps_the_request_without_a_webhook_provider() {
        let (url, _received) = spawn_webhook(StatusCode::OK).await;
        let engine = swag_engine(&url);
        engine.apply(&swag_stack(&props("M"))).await.unwrap();

        let later = Engine::new(
            engine.database().clone(),
            Providers::new().with_cloud(Arc::new(SimulatedCloud::default())),
        );
        let outcomes = later.refresh("dev").await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].change, RefreshChange::Kept);
        assert!(later.database().get_resource("dev", SWAG_NODE).unwrap().is_some());
    }
}
