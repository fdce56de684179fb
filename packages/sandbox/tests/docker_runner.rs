// ABOUTME: End-to-end tests running bundles against a real Docker daemon
// ABOUTME: Provision the runner image, execute bundles, and check nothing is left behind

use bollard::container::ListContainersOptions;
use bollard::Docker;
use runbox_sandbox::runtime::{ContainerRuntime, ImageRecord};
use runbox_sandbox::{
    CodeBundle, DirectorySource, DockerRuntime, ImageProvisioner, SandboxConfig,
    SandboxOrchestrator,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn config() -> SandboxConfig {
    let build_context = repo_root().join("runner");
    SandboxConfig {
        harness_source: build_context.join("timer.sh"),
        build_context,
        container_prefix: "runbox-it".to_string(),
        ..SandboxConfig::default()
    }
}

async fn sandbox(config: SandboxConfig) -> (Arc<DockerRuntime>, SandboxOrchestrator) {
    let runtime = Arc::new(
        DockerRuntime::connect()
            .await
            .expect("Failed to connect to Docker"),
    );
    let orchestrator = SandboxOrchestrator::new(runtime.clone(), config);
    (runtime, orchestrator)
}

fn bundle(main: &str) -> CodeBundle {
    let mut bundle = CodeBundle::new();
    bundle.insert("main.py", main).unwrap();
    bundle
}

#[tokio::test]
#[ignore] // Requires Docker daemon
async fn test_image_ensure_is_idempotent() {
    let config = config();
    let runtime = Arc::new(DockerRuntime::connect().await.unwrap());
    let provisioner = ImageProvisioner::new(runtime.clone());

    let first = provisioner
        .ensure(&config.image_reference, &config.build_context)
        .await
        .unwrap();
    let second = provisioner
        .ensure(&config.image_reference, &config.build_context)
        .await
        .unwrap();
    assert_eq!(first, second);

    let images: Vec<ImageRecord> = runtime.list_images(&config.image_reference).await.unwrap();
    assert!(images.iter().any(|image| image.id == first));
}

#[tokio::test]
#[ignore] // Requires Docker daemon
async fn test_demo_bundle_prints_two() {
    let (_, sandbox) = sandbox(config()).await;
    let source = DirectorySource::new(repo_root().join("demos/python"));

    let result = sandbox.run_source(&source).await.unwrap();
    assert_eq!(result.stdout_lossy(), "2\n");
    assert!(result.stderr.is_empty());
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
#[ignore] // Requires Docker daemon
async fn test_stderr_is_separated() {
    let (_, sandbox) = sandbox(config()).await;
    let result = sandbox
        .run(&bundle("import sys\nprint('out')\nprint('err', file=sys.stderr)\n"))
        .await
        .unwrap();

    assert_eq!(result.stdout_lossy(), "out\n");
    assert_eq!(result.stderr_lossy(), "err\n");
}

#[tokio::test]
#[ignore] // Requires Docker daemon
async fn test_failing_program_reports_exit_code() {
    let (_, sandbox) = sandbox(config()).await;
    let result = sandbox
        .run(&bundle("raise SystemExit(3)\n"))
        .await
        .unwrap();

    assert_eq!(result.exit_code, 3);
    assert!(!result.success());
}

#[tokio::test]
#[ignore] // Requires Docker daemon
async fn test_network_is_disabled() {
    let (_, sandbox) = sandbox(config()).await;
    let program = "import socket\ntry:\n    socket.create_connection(('1.1.1.1', 53), timeout=2)\n    print('online')\nexcept OSError:\n    print('offline')\n";

    let result = sandbox.run(&bundle(program)).await.unwrap();
    assert_eq!(result.stdout_lossy(), "offline\n");
}

#[tokio::test]
#[ignore] // Requires Docker daemon
async fn test_timeout_removes_container() {
    let mut config = config();
    config.wait_timeout = Some(Duration::from_secs(2));
    config.container_prefix = "runbox-it-timeout".to_string();
    let (_, sandbox) = sandbox(config).await;

    let err = sandbox
        .run(&bundle("import time\ntime.sleep(8)\n"))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert!(err.disposal_error().is_none());

    let docker = Docker::connect_with_defaults().unwrap();
    let mut filters = HashMap::new();
    filters.insert("name".to_string(), vec!["runbox-it-timeout".to_string()]);
    let leftovers = docker
        .list_containers(Some(ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        }))
        .await
        .unwrap();
    assert!(leftovers.is_empty(), "containers left behind: {:?}", leftovers);
}

#[tokio::test]
#[ignore] // Requires Docker daemon
async fn test_concurrent_runs_are_isolated() {
    let (_, sandbox) = sandbox(config()).await;
    let sandbox = Arc::new(sandbox);

    let mut handles = Vec::new();
    for i in 0..4 {
        let sandbox = sandbox.clone();
        handles.push(tokio::spawn(async move {
            sandbox.run(&bundle(&format!("print({i})\n"))).await
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.stdout_lossy(), format!("{i}\n"));
    }
}
