//! Local simulation decorator over the local backend

mod common;

use common::FakeEngine;
use compose_api::{
    ComposeBackend, ConvertOptions, CreateOptions, DownOptions, Error, ExecOptions, ImagesOptions,
    NetworkConfig, Operation, PortOptions, Project, RunOptions, ServiceConfig, UpOptions,
};
use compose_orchestration::backends::simulation::{
    CREDENTIALS_NETWORK, ENDPOINTS_SERVICE, LocalSimulation, enhance_for_local_simulation,
};
use compose_orchestration::LocalBackend;
use std::sync::Arc;

fn shop() -> Project {
    Project::new("shop")
        .with_service("db", ServiceConfig::new("postgres"))
        .with_service("web", ServiceConfig::new("nginx"))
}

fn simulation(engine: &Arc<FakeEngine>) -> LocalSimulation {
    LocalSimulation::new(Arc::new(LocalBackend::new(engine.clone())))
}

#[test]
fn test_augmentation_is_deterministic() {
    let home = tempfile::tempdir().unwrap();
    let first = enhance_for_local_simulation(&shop(), home.path()).unwrap();
    let second = enhance_for_local_simulation(&shop(), home.path()).unwrap();

    let render = |project: &Project| serde_yaml::to_string(project).unwrap();
    assert_eq!(render(&first), render(&second));

    let sidecar = first.service(ENDPOINTS_SERVICE).unwrap();
    let credentials = home.path().join(".aws");
    assert_eq!(
        sidecar.volumes[1].source.as_deref(),
        credentials.to_str()
    );
}

#[smol_potat::test]
async fn test_create_adds_sidecar_and_credentials_network() {
    let engine = FakeEngine::new();
    let backend = simulation(&engine);

    backend
        .create(&shop(), CreateOptions::default())
        .await
        .unwrap();

    let created = engine.calls_of("create");
    assert_eq!(created[0], format!("shop-{ENDPOINTS_SERVICE}-1"));
    assert!(created.contains(&"shop-db-1".to_string()));
    assert!(created.contains(&"shop-web-1".to_string()));

    let mut networks = engine.networks();
    networks.sort();
    assert_eq!(networks, vec![CREDENTIALS_NETWORK, "shop_default"]);
}

#[smol_potat::test]
async fn test_down_removes_the_sidecar_as_an_orphan() {
    let engine = FakeEngine::new();
    let backend = simulation(&engine);
    let project = shop();

    backend
        .create(&project, CreateOptions::default())
        .await
        .unwrap();
    backend
        .down(
            "shop",
            DownOptions {
                project: Some(project),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(engine.containers().is_empty());
    assert!(engine.networks().is_empty());
}

#[smol_potat::test]
async fn test_convert_renders_the_simulated_project() {
    let engine = FakeEngine::new();
    let backend = simulation(&engine);
    let mut project = shop();
    project
        .networks
        .insert("default".to_string(), NetworkConfig::default());

    let rendered = backend
        .convert(
            &project,
            ConvertOptions {
                format: "json".to_string(),
            },
        )
        .await
        .unwrap();
    let document: serde_json::Value = serde_json::from_slice(&rendered).unwrap();

    assert!(document["services"][ENDPOINTS_SERVICE].is_object());
    assert!(document["networks"][CREDENTIALS_NETWORK].is_object());
    assert!(document["networks"].get("default").is_none());
    assert_eq!(
        document["services"]["web"]["environment"]["AWS_CONTAINER_CREDENTIALS_RELATIVE_URI"],
        "/creds"
    );
    assert!(engine.calls().is_empty());

    let err = backend
        .convert(
            &project,
            ConvertOptions {
                format: "toml".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[smol_potat::test]
async fn test_refused_operations() {
    let engine = FakeEngine::new();
    let backend = simulation(&engine);
    let project = shop();

    let err = backend
        .run_one_off(&project, RunOptions::default())
        .await
        .unwrap_err();
    match err {
        Error::NotImplemented { operation, hint } => {
            assert_eq!(operation, Operation::RunOneOff);
            assert_eq!(hint.as_deref(), Some("use docker-compose run"));
        }
        other => panic!("expected sentinel, got {other:?}"),
    }

    assert!(
        backend
            .up(&project, UpOptions::default())
            .await
            .unwrap_err()
            .is_not_implemented()
    );
    assert!(
        backend
            .exec(&project, ExecOptions::default())
            .await
            .unwrap_err()
            .is_not_implemented()
    );
    assert!(
        backend
            .port("shop", "web", 80, PortOptions::default())
            .await
            .unwrap_err()
            .is_not_implemented()
    );
    assert!(
        backend
            .images("shop", ImagesOptions::default())
            .await
            .unwrap_err()
            .is_not_implemented()
    );
    assert!(engine.calls().is_empty());
}
