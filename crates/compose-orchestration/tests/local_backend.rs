//! Lifecycle tests for the local backend against an in-memory engine

mod common;

use chrono::Utc;
use common::{FakeEngine, RecordingConsumer, Script};
use compose_api::{
    ComposeBackend, Condition, CopyOptions, CreateOptions, DownOptions, Error, Event,
    EventsOptions, ExecOptions, ImagesOptions, KillOptions, ListOptions, OrchestrationError,
    PauseOptions, PortOptions, Project, PsOptions, PullOptions, RemoveOptions, RestartOptions,
    RunOptions, ServiceConfig, StartOptions, StopOptions, UpOptions, VolumeConfig,
};
use compose_orchestration::LocalBackend;
use compose_orchestration::engine::EngineEvent;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn shop() -> Project {
    Project::new("shop")
        .with_service("db", ServiceConfig::new("postgres:16"))
        .with_service(
            "api",
            ServiceConfig::new("shop/api").depends_on("db", Condition::Started),
        )
        .with_service(
            "web",
            ServiceConfig::new("nginx").depends_on("api", Condition::Started),
        )
}

fn backend(engine: &Arc<FakeEngine>) -> LocalBackend {
    LocalBackend::new(engine.clone()).with_poll_interval(Duration::from_millis(5))
}

fn position(calls: &[String], call: &str) -> usize {
    calls
        .iter()
        .position(|c| c == call)
        .unwrap_or_else(|| panic!("{call} not found in {calls:?}"))
}

#[smol_potat::test]
async fn test_create_and_start_follow_dependencies() {
    let engine = FakeEngine::new();
    let backend = backend(&engine);
    let project = shop();

    backend
        .create(&project, CreateOptions::default())
        .await
        .unwrap();
    backend
        .start(&project, StartOptions::default())
        .await
        .unwrap();

    let calls = engine.calls();
    assert!(position(&calls, "create shop-db-1") < position(&calls, "create shop-api-1"));
    assert!(position(&calls, "create shop-api-1") < position(&calls, "create shop-web-1"));
    assert!(position(&calls, "start shop-db-1") < position(&calls, "start shop-api-1"));
    assert!(position(&calls, "start shop-api-1") < position(&calls, "start shop-web-1"));
    assert_eq!(engine.networks(), vec!["shop_default"]);
}

#[smol_potat::test]
async fn test_create_is_idempotent_and_scales() {
    let engine = FakeEngine::new();
    let backend = backend(&engine);
    let mut project = shop();

    backend
        .create(&project, CreateOptions::default())
        .await
        .unwrap();
    backend
        .create(&project, CreateOptions::default())
        .await
        .unwrap();
    assert_eq!(engine.calls_of("create").len(), 3);
    assert_eq!(engine.calls_of("network").len(), 1);

    project.services[0].scale = Some(2);
    backend
        .create(&project, CreateOptions::default())
        .await
        .unwrap();
    assert_eq!(
        engine.calls_of("create"),
        vec!["shop-db-1", "shop-api-1", "shop-web-1", "shop-db-2"]
    );

    project.services[0].scale = Some(1);
    backend
        .create(&project, CreateOptions::default())
        .await
        .unwrap();
    assert_eq!(engine.calls_of("remove"), vec!["shop-db-2"]);
}

#[smol_potat::test]
async fn test_cycle_is_rejected_before_any_side_effect() {
    let engine = FakeEngine::new();
    let backend = backend(&engine);
    let project = Project::new("loop")
        .with_service("a", ServiceConfig::new("busybox").depends_on("b", Condition::Started))
        .with_service("b", ServiceConfig::new("busybox").depends_on("a", Condition::Started));

    let err = backend
        .create(&project, CreateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(engine.calls().is_empty());
}

#[smol_potat::test]
async fn test_failed_start_skips_dependents() {
    let engine = FakeEngine::new();
    let backend = backend(&engine);
    let project = shop().with_service("cache", ServiceConfig::new("redis"));
    engine.fail_start("api");

    backend
        .create(&project, CreateOptions::default())
        .await
        .unwrap();
    let err = backend
        .start(&project, StartOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Orchestration(OrchestrationError::DependencyFailed { ref service, .. }) if service == "api"
    ));
    let started = engine.calls_of("start");
    assert!(started.contains(&"shop-db-1".to_string()));
    assert!(started.contains(&"shop-cache-1".to_string()));
    assert!(!started.contains(&"shop-web-1".to_string()));
}

#[smol_potat::test]
async fn test_healthy_condition_waits_for_health() {
    let engine = FakeEngine::new();
    let backend = backend(&engine);
    let project = Project::new("shop")
        .with_service("db", ServiceConfig::new("postgres"))
        .with_service(
            "api",
            ServiceConfig::new("shop/api").depends_on("db", Condition::Healthy),
        );

    engine.script(
        "db",
        Script {
            health: Some("unhealthy".to_string()),
            ..Default::default()
        },
    );
    backend
        .create(&project, CreateOptions::default())
        .await
        .unwrap();
    let err = backend
        .start(&project, StartOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("service_healthy"));
    assert!(!engine.calls_of("start").contains(&"shop-api-1".to_string()));
}

#[smol_potat::test]
async fn test_completed_successfully_condition() {
    let engine = FakeEngine::new();
    let backend = backend(&engine);
    let project = Project::new("shop")
        .with_service("migrate", ServiceConfig::new("shop/migrate"))
        .with_service(
            "api",
            ServiceConfig::new("shop/api").depends_on("migrate", Condition::CompletedSuccessfully),
        );

    engine.script(
        "migrate",
        Script {
            exit_code: Some(0),
            ..Default::default()
        },
    );
    backend
        .create(&project, CreateOptions::default())
        .await
        .unwrap();
    backend
        .start(&project, StartOptions::default())
        .await
        .unwrap();
    assert_eq!(engine.calls_of("start"), vec!["shop-migrate-1", "shop-api-1"]);
}

#[smol_potat::test]
async fn test_stop_runs_in_reverse_order() {
    let engine = FakeEngine::new();
    let backend = backend(&engine);
    let project = shop();

    backend.create(&project, CreateOptions::default()).await.unwrap();
    backend.start(&project, StartOptions::default()).await.unwrap();
    backend.stop(&project, StopOptions::default()).await.unwrap();

    assert_eq!(
        engine.calls_of("stop"),
        vec!["shop-web-1", "shop-api-1", "shop-db-1"]
    );
}

#[smol_potat::test]
async fn test_up_attached_cascade_stop_returns_selected_exit_code() {
    let engine = FakeEngine::new();
    let backend = backend(&engine);
    let project = Project::new("ci")
        .with_service("tests", ServiceConfig::new("ci/tests"))
        .with_service("db", ServiceConfig::new("postgres"));
    engine.script(
        "tests",
        Script {
            lines: vec!["running 3 tests".to_string(), "1 failed".to_string()],
            exit_code: Some(1),
            health: None,
        },
    );
    let consumer = RecordingConsumer::new();

    let code = backend
        .up(
            &project,
            UpOptions {
                cascade_stop: true,
                exit_code_from: Some("tests".to_string()),
                consumer: Some(consumer.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(code, 1);
    let mut registered = consumer.registered();
    registered.sort();
    assert_eq!(registered, vec!["ci-db-1", "ci-tests-1"]);
    assert!(
        consumer
            .entries()
            .contains(&"status ci-tests-1: exited with code 1".to_string())
    );
    assert!(engine.calls_of("stop").contains(&"ci-db-1".to_string()));
}

#[smol_potat::test]
async fn test_up_attached_without_cascade_waits_for_every_container() {
    let engine = FakeEngine::new();
    let backend = backend(&engine);
    let project = Project::new("jobs")
        .with_service("a", ServiceConfig::new("busybox"))
        .with_service("b", ServiceConfig::new("busybox"));
    for (service, code) in [("a", 3), ("b", 0)] {
        engine.script(
            service,
            Script {
                lines: vec![format!("{service} done")],
                exit_code: Some(code),
                health: None,
            },
        );
    }
    let consumer = RecordingConsumer::new();

    let code = backend
        .up(
            &project,
            UpOptions {
                consumer: Some(consumer.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(code, 0);
    let entries = consumer.entries();
    assert!(entries.contains(&"log jobs-a-1: a done".to_string()));
    assert!(entries.contains(&"log jobs-b-1: b done".to_string()));
    assert!(engine.calls_of("stop").is_empty());
}

#[smol_potat::test]
async fn test_up_cancel_stops_the_project() {
    let engine = FakeEngine::new();
    let backend = backend(&engine);
    let project = Project::new("svc").with_service("web", ServiceConfig::new("nginx"));
    let (cancel, cancelled) = async_channel::bounded(1);
    cancel.send(()).await.unwrap();

    let code = backend
        .up(
            &project,
            UpOptions {
                consumer: Some(RecordingConsumer::new()),
                cancel: Some(cancelled),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(code, 0);
    assert_eq!(engine.calls_of("stop"), vec!["svc-web-1"]);
}

#[smol_potat::test]
async fn test_up_attached_requires_consumer() {
    let engine = FakeEngine::new();
    let err = backend(&engine)
        .up(&shop(), UpOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(engine.calls().is_empty());
}

#[smol_potat::test]
async fn test_down_removes_everything_and_warns_on_orphans() {
    let engine = FakeEngine::new();
    let backend = backend(&engine);
    let mut project = shop();
    project.volumes.insert("data".to_string(), VolumeConfig::default());

    backend.create(&project, CreateOptions::default()).await.unwrap();
    backend.start(&project, StartOptions::default()).await.unwrap();
    engine.adopt("shop", "legacy", 1, "running");

    backend
        .down(
            "shop",
            DownOptions {
                project: Some(project.clone()),
                volumes: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(
        engine.containers(),
        vec![("shop-legacy-1".to_string(), "running".to_string())]
    );
    assert!(engine.networks().is_empty());
    assert!(engine.volumes().is_empty());

    backend
        .down(
            "shop",
            DownOptions {
                project: Some(project),
                remove_orphans: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(engine.containers().is_empty());
}

#[smol_potat::test]
async fn test_remove_only_touches_stopped_containers() {
    let engine = FakeEngine::new();
    let backend = backend(&engine);
    let project = shop();
    backend.create(&project, CreateOptions::default()).await.unwrap();
    backend
        .start(
            &project,
            StartOptions {
                services: vec!["db".to_string()],
            },
        )
        .await
        .unwrap();

    backend
        .remove(&project, RemoveOptions::default())
        .await
        .unwrap();
    assert_eq!(
        engine.containers(),
        vec![("shop-db-1".to_string(), "running".to_string())]
    );

    backend
        .remove(
            &project,
            RemoveOptions {
                stop: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(engine.containers().is_empty());
}

#[smol_potat::test]
async fn test_restart_kill_pause_unpause() {
    let engine = FakeEngine::new();
    let backend = backend(&engine);
    let project = shop();
    backend.create(&project, CreateOptions::default()).await.unwrap();
    backend.start(&project, StartOptions::default()).await.unwrap();

    backend
        .restart(
            &project,
            RestartOptions {
                services: vec!["api".to_string()],
                timeout: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(engine.calls_of("restart"), vec!["shop-api-1"]);

    let only_web = PauseOptions {
        services: vec!["web".to_string()],
    };
    backend.pause("shop", only_web.clone()).await.unwrap();
    assert_eq!(engine.calls_of("pause"), vec!["shop-web-1"]);
    backend.unpause("shop", only_web).await.unwrap();
    assert_eq!(engine.calls_of("unpause"), vec!["shop-web-1"]);

    backend
        .kill(
            &project,
            KillOptions {
                services: vec!["db".to_string()],
                signal: Some("SIGTERM".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(engine.calls_of("kill"), vec!["shop-db-1 SIGTERM"]);
}

#[smol_potat::test]
async fn test_ps_and_list() {
    let engine = FakeEngine::new();
    let backend = backend(&engine);
    let project = shop();
    backend.create(&project, CreateOptions::default()).await.unwrap();
    backend
        .start(
            &project,
            StartOptions {
                services: vec!["db".to_string()],
            },
        )
        .await
        .unwrap();
    engine.adopt("blog", "web", 1, "running");

    let running = backend.ps("shop", PsOptions::default()).await.unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].service, "db");
    assert_eq!(running[0].project, "shop");

    let all = backend
        .ps(
            "shop",
            PsOptions {
                all: true,
                services: Vec::new(),
            },
        )
        .await
        .unwrap();
    assert_eq!(all.len(), 3);

    let stacks = backend.list(ListOptions { all: true }).await.unwrap();
    let names: Vec<&str> = stacks.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["blog", "shop"]);
    assert_eq!(stacks[1].status, "created(2), running(1)");
}

#[smol_potat::test]
async fn test_run_one_off_starts_dependencies() {
    let engine = FakeEngine::new();
    let backend = backend(&engine);
    let project = shop();
    engine.script(
        "api",
        Script {
            lines: vec!["migrated".to_string()],
            exit_code: Some(0),
            health: None,
        },
    );
    let consumer = RecordingConsumer::new();

    let code = backend
        .run_one_off(
            &project,
            RunOptions {
                service: "api".to_string(),
                command: vec!["migrate".to_string()],
                auto_remove: true,
                consumer: Some(consumer.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(code, 0);
    assert!(engine.calls_of("start").contains(&"shop-db-1".to_string()));
    let created = engine.calls_of("create");
    let one_off = created
        .iter()
        .find(|name| name.starts_with("shop-api-run-"))
        .unwrap();
    assert!(!created.contains(&"shop-web-1".to_string()));
    assert!(engine.calls_of("remove").contains(one_off));
    assert!(consumer.entries().contains(&format!("log {one_off}: migrated")));

    // One-off containers never show up as service containers
    let ps = backend
        .ps(
            "shop",
            PsOptions {
                all: true,
                services: vec!["api".to_string()],
            },
        )
        .await
        .unwrap();
    assert!(ps.is_empty());
}

#[smol_potat::test]
async fn test_exec_port_copy_top_images() {
    let engine = FakeEngine::new();
    let backend = backend(&engine);
    let project = shop();
    backend.create(&project, CreateOptions::default()).await.unwrap();
    backend.start(&project, StartOptions::default()).await.unwrap();

    let code = backend
        .exec(
            &project,
            ExecOptions {
                service: "db".to_string(),
                index: 1,
                command: vec!["psql".to_string(), "-l".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(code, 0);
    assert_eq!(engine.calls_of("exec"), vec!["shop-db-1 psql -l"]);

    let (host, port) = backend
        .port("shop", "web", 80, PortOptions::default())
        .await
        .unwrap();
    assert_eq!((host.as_str(), port), ("0.0.0.0", 30080));

    backend
        .copy(
            &project,
            CopyOptions {
                source: "./init.sql".to_string(),
                destination: "db:/tmp/init.sql".to_string(),
                all: true,
                index: 0,
            },
        )
        .await
        .unwrap();
    let copies = engine.calls_of("copy");
    assert_eq!(copies.len(), 1);
    assert!(copies[0].starts_with("./init.sql c"));

    let err = backend
        .copy(
            &project,
            CopyOptions {
                source: "db:/a".to_string(),
                destination: "api:/b".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));

    let top = backend.top("shop", &[]).await.unwrap();
    assert_eq!(top.len(), 3);
    assert_eq!(top[0].titles, vec!["PID", "CMD"]);

    let images = backend
        .images(
            "shop",
            ImagesOptions {
                services: vec!["db".to_string()],
            },
        )
        .await
        .unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].repository, "postgres");
    assert_eq!(images[0].tag, "16");
    assert_eq!(images[0].container_name, "shop-db-1");
}

#[smol_potat::test]
async fn test_pull_ignores_failures_when_asked() {
    let engine = FakeEngine::new();
    let backend = backend(&engine);
    let project = shop().with_service("broken", ServiceConfig::new("missing/image"));

    let err = backend
        .pull(&project, PullOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Backend { .. }));

    backend
        .pull(
            &project,
            PullOptions {
                services: Vec::new(),
                ignore_failures: true,
            },
        )
        .await
        .unwrap();
}

#[smol_potat::test]
async fn test_events_are_filtered_by_service() {
    let engine = FakeEngine::new();
    let backend = backend(&engine);
    for service in ["db", "web"] {
        engine.push_event(EngineEvent {
            timestamp: Utc::now(),
            id: format!("{service}-id"),
            action: "start".to_string(),
            attributes: HashMap::from([
                ("name".to_string(), format!("shop-{service}-1")),
                (
                    "com.docker.compose.service".to_string(),
                    service.to_string(),
                ),
                ("image".to_string(), "img".to_string()),
            ]),
        });
    }
    let seen: Arc<Mutex<Vec<Event>>> = Arc::default();
    let sink = seen.clone();

    backend
        .events(
            "shop",
            EventsOptions {
                services: vec!["web".to_string()],
                consumer: Arc::new(move |event: Event| -> compose_api::Result<()> {
                    sink.lock().unwrap().push(event);
                    Ok(())
                }),
            },
        )
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].container, "shop-web-1");
    assert_eq!(seen[0].service, "web");
    assert_eq!(seen[0].status, "start");
    assert_eq!(
        seen[0].attributes,
        HashMap::from([("image".to_string(), "img".to_string())])
    );
}
