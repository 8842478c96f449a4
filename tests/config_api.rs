use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::json;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tokio::net::TcpListener;

use tradedesk::client::{ClientError, ConfigClient};
use tradedesk::config::{
    CorsSettings, DatabaseSettings, EnvLookup, LoggingSettings, ProbeSettings, SecuritySettings,
    ServerSettings, Settings,
};
use tradedesk::domain::models::{
    DataSourceDraft, DataSourcePatch, DataSourceType, MarketCategory, SaveLlmConfigRequest,
};
use tradedesk::domain::services::AppServices;
use tradedesk::infrastructure::NetworkProber;
use tradedesk::utils::SecretCipher;

async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn settings() -> Settings {
    Settings {
        server: ServerSettings::default(),
        database: DatabaseSettings::default(),
        logging: LoggingSettings::default(),
        cors: CorsSettings::default(),
        security: SecuritySettings {
            encryption_key: "5a".repeat(32),
        },
        probe: ProbeSettings::default(),
    }
}

async fn spawn_server() -> SocketAddr {
    let pool = memory_pool().await;
    let settings = settings();
    let cipher = SecretCipher::from_hex(&settings.security.encryption_key).unwrap();
    let no_env: EnvLookup = Arc::new(|_| None);
    let services = AppServices::new(
        pool.clone(),
        cipher,
        Arc::new(NetworkProber::new().unwrap()),
        settings.probe.clone(),
        no_env,
    );
    services.cache.reload().await.unwrap();
    let app = tradedesk::build_router(pool, services, &settings);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn client() -> ConfigClient {
    let addr = spawn_server().await;
    ConfigClient::new(&format!("http://{}", addr)).unwrap()
}

fn finnhub() -> DataSourceDraft {
    DataSourceDraft {
        name: Some("finnhub".into()),
        source_type: Some(DataSourceType::Finnhub),
        api_key: Some("finnhub-secret-key-1".into()),
        enabled: true,
        priority: 2,
        market_categories: vec![MarketCategory::UsStocks],
        ..Default::default()
    }
}

fn yfinance() -> DataSourceDraft {
    DataSourceDraft {
        name: Some("yfinance".into()),
        source_type: Some(DataSourceType::Yfinance),
        enabled: true,
        priority: 1,
        ..Default::default()
    }
}

#[tokio::test]
async fn data_source_lifecycle_over_http() {
    let client = client().await;

    let created = client.add_data_source(&finnhub()).await.unwrap();
    assert_eq!(created.name, "finnhub");
    client.add_data_source(&yfinance()).await.unwrap();

    let listed = client.list_data_sources().await.unwrap();
    let stored = listed.iter().find(|s| s.name == "finnhub").unwrap();
    assert!(stored.has_api_key);
    assert_eq!(stored.api_key.as_deref(), Some("finn...ey-1"));

    client.set_default_data_source("finnhub").await.unwrap();
    let resolved = client
        .resolve_data_sources(Some(MarketCategory::UsStocks))
        .await
        .unwrap();
    let order: Vec<_> = resolved.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(order, vec!["finnhub", "yfinance"]);

    let resolved = client
        .resolve_data_sources(Some(MarketCategory::AShares))
        .await
        .unwrap();
    let order: Vec<_> = resolved.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(order, vec!["yfinance"]);

    let updated = client
        .update_data_source(
            "finnhub",
            &DataSourcePatch {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!updated.enabled);
    assert!(!updated.is_default);
    assert!(updated.has_api_key);

    client.delete_data_source("finnhub").await.unwrap();
    let err = client.delete_data_source("finnhub").await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.code(), Some("NOT_FOUND"));
}

#[tokio::test]
async fn service_errors_keep_their_envelope() {
    let client = client().await;
    client.add_data_source(&finnhub()).await.unwrap();

    let err = client.add_data_source(&finnhub()).await.unwrap_err();
    assert_eq!(err.status(), Some(409));

    let mut bad = yfinance();
    bad.endpoint = Some("not a url".into());
    bad.timeout = Some(0);
    let err = client.add_data_source(&bad).await.unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert_eq!(err.code(), Some("VALIDATION_ERROR"));
    let fields = err.field_errors();
    assert!(fields.contains_key("endpoint"));
    assert!(fields.contains_key("timeout"));

    let listed = client.list_data_sources().await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn route_segment_names_are_refused() {
    let client = client().await;

    for reserved in ["set-default", "resolve"] {
        let mut draft = yfinance();
        draft.name = Some(reserved.into());
        let err = client.add_data_source(&draft).await.unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert!(err.field_errors().contains_key("name"));
    }

    let mut draft = yfinance();
    draft.name = Some("resolver".into());
    client.add_data_source(&draft).await.unwrap();
    client
        .update_data_source(
            "resolver",
            &DataSourcePatch {
                priority: Some(4),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    client.delete_data_source("resolver").await.unwrap();
    assert!(client.list_data_sources().await.unwrap().is_empty());
}

#[tokio::test]
async fn llm_key_survives_an_update_without_one() {
    let client = client().await;

    let saved = client
        .save_llm_config(&SaveLlmConfigRequest {
            name: Some("deepseek".into()),
            display_name: Some("DeepSeek".into()),
            model: Some("deepseek-chat".into()),
            api_key: Some("sk-deepseek-abcdef0123".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    let updated = client
        .save_llm_config(&SaveLlmConfigRequest {
            id: Some(saved.id.clone()),
            name: Some("deepseek".into()),
            display_name: Some("DeepSeek".into()),
            model: Some("deepseek-reasoner".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(updated.id, saved.id);
    assert!(updated.has_api_key);
    assert_eq!(updated.api_key.as_deref(), Some("sk-d...0123"));

    let active = client.active_llm_config(Some("deepseek")).await.unwrap();
    assert_eq!(active.model, "deepseek-reasoner");
    assert_eq!(active.api_key.as_deref(), Some("sk-d...0123"));

    let templates = client.llm_templates().await.unwrap();
    assert!(templates.iter().any(|t| t.name == "deepseek"));

    let err = client.test_llm_config("missing").await.unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn export_then_import_is_a_no_op() {
    let client = client().await;
    client.add_data_source(&finnhub()).await.unwrap();
    client.add_data_source(&yfinance()).await.unwrap();
    client.set_default_data_source("yfinance").await.unwrap();
    client
        .update_settings([("max_debate_rounds".to_string(), json!(3))].into())
        .await
        .unwrap();

    let before = client.system_config().await.unwrap();
    let snapshot = client.export_config().await.unwrap();
    assert!(snapshot.data_sources.iter().all(|s| s.api_key.is_none()));

    let report = client.import_config(&snapshot).await.unwrap();
    assert_eq!(report.data_sources, 2);

    let after = client.system_config().await.unwrap();
    assert_eq!(after.data_sources, before.data_sources);
    assert_eq!(after.default_data_source.as_deref(), Some("yfinance"));
    assert_eq!(after.system_settings, before.system_settings);

    let reload = client.reload_config().await.unwrap();
    assert!(reload.success);
    assert_eq!(reload.data_sources, 2);
}

#[tokio::test]
async fn health_responses_carry_security_headers() {
    let addr = spawn_server().await;
    let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["cache-control"], "no-store");
    assert_eq!(response.headers()["x-frame-options"], "DENY");

    let ready = reqwest::get(format!("http://{}/ready", addr)).await.unwrap();
    assert_eq!(ready.status(), 200);
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ConfigClient::new(&format!("http://{}", addr)).unwrap();
    let err = client.list_data_sources().await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
}
