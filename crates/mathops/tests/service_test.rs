use log::LevelFilter;
use mathops::{
    Application, Operation, OperationKind, OperationStatus, Settings, SqliteConfigSerde,
    SubmitOperation,
};
use std::time::Duration;
use uuid::Uuid;

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.api_settings.domain = String::from("127.0.0.1");
    settings.api_settings.port = String::from("0");
    settings.db_settings.data_folder = format!("./test-{}", Uuid::now_v7());
    settings.db_settings.sqlite_config = SqliteConfigSerde::testing();
    settings.worker_settings.poll_interval_secs = 1;
    settings
}

async fn spawn_app() -> String {
    let application = Application::build(test_settings(), LevelFilter::Info)
        .await
        .expect("failed to build application");
    let port = application.port();
    let _ = tokio::spawn(application.run_until_stopped());

    format!("http://127.0.0.1:{}", port)
}

async fn wait_until_resolved(client: &reqwest::Client, base: &str, id: Uuid) -> Operation {
    for _ in 0..30 {
        let operation: Operation = client
            .get(format!("{}/api/v1/operations/{}", base, id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if operation.status != OperationStatus::Pending {
            return operation;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("operation {} never left pending", id);
}

#[tokio::test]
async fn test_submit_and_resolve_operations_end_to_end() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/v1/health_check", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = client
        .post(format!("{}/api/v1/operations", base))
        .json(&SubmitOperation {
            kind: OperationKind::Add,
            operand_a: 2.0,
            operand_b: 3.0,
        })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let submitted: Operation = response.json().await.unwrap();
    assert_eq!(submitted.status, OperationStatus::Pending);
    assert!(submitted.result.is_none());

    let doomed: Operation = client
        .post(format!("{}/api/v1/operations", base))
        .json(&SubmitOperation {
            kind: OperationKind::Divide,
            operand_a: 1.0,
            operand_b: 0.0,
        })
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let completed = wait_until_resolved(&client, &base, submitted.id).await;
    assert_eq!(completed.status, OperationStatus::Completed);
    assert_eq!(completed.result, Some(5.0));

    let failed = wait_until_resolved(&client, &base, doomed.id).await;
    assert_eq!(failed.status, OperationStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("cannot divide by zero"));
    assert!(failed.result.is_none());

    let completed_list: Vec<Operation> = client
        .get(format!("{}/api/v1/operations?status=completed", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(completed_list.iter().any(|op| op.id == submitted.id));
    assert!(completed_list.iter().all(|op| op.id != doomed.id));
}

#[test]
fn test_bind_failure_is_logged_and_exits_nonzero() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    let mut settings = test_settings();
    settings.api_settings.port = port.to_string();

    let config_path = std::env::temp_dir().join(format!("mathops-{}.toml", Uuid::now_v7()));
    std::fs::write(&config_path, toml::to_string(&settings).unwrap()).unwrap();

    let output = std::process::Command::new(env!("CARGO_BIN_EXE_mathops"))
        .args(["--config", config_path.to_str().unwrap(), "--level", "info"])
        .output()
        .unwrap();
    let _ = std::fs::remove_file(&config_path);

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("http_error: Failed to start service"),
        "stdout was: {}",
        stdout
    );
}

#[tokio::test]
async fn test_unknown_operation_returns_not_found() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/v1/operations/{}", base, Uuid::now_v7()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("not found"));
}
