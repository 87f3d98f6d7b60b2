//! Router-level tests plus end-to-end scenarios. The end-to-end cases need a
//! reachable PostgreSQL (DATABASE_URL) and a local Docker daemon:
//! cargo test -p range-api --test integration -- --ignored

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use range_api::auth::jwt;
use range_api::config::Config;
use range_api::db::PgPool;
use range_api::engine::EnginePool;
use range_api::index::{InstanceIndex, MemoryIndex};
use range_api::logstore::{self, PgLogSink};
use range_api::routes;
use range_api::services::admins::AdminService;
use range_api::services::images::ImageService;
use range_api::services::instances::InstanceService;
use range_api::state::AppState;

const TEST_SECRET: &str = "integration-test-secret";

fn offline_pool() -> PgPool {
    // Nothing listens on port 9; every acquire fails fast.
    PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(200))
        .connect_lazy("postgres://postgres@127.0.0.1:9/range_test")
        .unwrap()
}

fn test_state(pool: PgPool) -> AppState {
    let config = Config {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        database_url: String::new(),
        jwt_secret: TEST_SECRET.to_string(),
        app_env: "dev".to_string(),
        instance_ttl: Duration::from_secs(3600),
        log_retention_days: 7,
        registry_url: "http://localhost:5000".to_string(),
        upload_dir: std::env::temp_dir(),
    };

    let engines = Arc::new(EnginePool::new());
    let index: Arc<dyn InstanceIndex> = Arc::new(MemoryIndex::new());
    let instances = InstanceService::new(
        pool.clone(),
        engines.clone(),
        index,
        config.instance_ttl,
    );
    let images = ImageService::new(pool.clone(), engines.clone(), config.registry_url.clone());
    let admins = AdminService::new(pool.clone(), config.jwt_secret.clone());
    let (request_logs, _writer) = logstore::start(PgLogSink::new(pool.clone()));

    AppState {
        config,
        db: pool,
        engines,
        instances,
        images,
        admins,
        request_logs,
    }
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn admin_routes_require_token() {
    let app = routes::router(test_state(offline_pool()));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/admin/instances")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], 401);
    assert_eq!(json["msg"], "未提供认证token");
}

#[tokio::test]
async fn garbage_bearer_token_is_rejected() {
    let app = routes::router(test_state(offline_pool()));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/admin/instances")
                .header("authorization", "Bearer not-a-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["msg"], "token无效或已过期");
}

#[tokio::test]
async fn user_endpoints_require_actor_header() {
    let app = routes::router(test_state(offline_pool()));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/challenges/c1/start")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn submit_rejects_empty_fields() {
    let app = routes::router(test_state(offline_pool()));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/submit")
                .header("x-user-id", "u1")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"challenge_id":"","flag":""}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], 400);
}

#[tokio::test]
async fn trace_id_is_echoed_back() {
    let app = routes::router(test_state(offline_pool()));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/admin/instances")
                .header("x-trace-id", "trace-xyz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["x-trace-id"], "trace-xyz");
}

#[tokio::test]
async fn trace_id_is_generated_when_missing() {
    let app = routes::router(test_state(offline_pool()));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/challenges")
                .header("x-user-id", "u1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let trace = response.headers().get("x-trace-id").unwrap();
    assert_eq!(trace.to_str().unwrap().len(), 36);
}

#[tokio::test]
async fn challenge_validation_runs_before_storage() {
    let token = jwt::generate_admin_token(TEST_SECRET, "admin-1", "root").unwrap();
    let app = routes::router(test_state(offline_pool()));

    let payload = serde_json::json!({
        "title": "t",
        "category": "Web",
        "difficulty": "Easy",
        "image": "nginx:alpine",
        "port": 80,
        "flag": "flag{x}",
        "points": 999999,
    });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/admin/challenges")
                .header("authorization", format!("Bearer {token}"))
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["msg"], "分值必须在 1-10000 之间");
}

#[tokio::test]
async fn upload_rejects_non_tar_archives() {
    let token = jwt::generate_admin_token(TEST_SECRET, "admin-1", "root").unwrap();
    let app = routes::router(test_state(offline_pool()));

    let boundary = "XBOUNDARYX";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"app.zip\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n\
         not-a-tar\r\n\
         --{boundary}--\r\n"
    );
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/admin/images/upload")
                .header("authorization", format!("Bearer {token}"))
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["msg"], "仅支持 .tar 或 .tar.gz 格式");
}

#[tokio::test]
async fn store_failures_surface_as_500_envelope() {
    let token = jwt::generate_admin_token(TEST_SECRET, "admin-1", "root").unwrap();
    let app = routes::router(test_state(offline_pool()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/admin/docker-hosts")
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["code"], 500);
    assert_eq!(json["msg"], "数据库操作失败");
}

// ===== End-to-end scenarios (real PostgreSQL + Docker) =====

mod e2e {
    use super::*;

    use chrono::Utc;
    use range_api::services::reaper::Reaper;
    use range_api::store;
    use uuid::Uuid;

    async fn e2e_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required for e2e tests");
        let pool = range_api::db::create_pool(&url).await.expect("connect");
        range_api::db::migrate(&pool).await.expect("migrate");
        pool
    }

    async fn seed(pool: &PgPool, suffix: &str) -> (String, String, String) {
        let host_id = format!("e2e-host-{suffix}");
        let challenge_id = format!("e2e-challenge-{suffix}");
        let user_id = format!("e2e-user-{suffix}");

        sqlx::query(
            r#"INSERT INTO docker_hosts
               (id, name, host, port_range_min, port_range_max, memory_limit, cpu_limit,
                enabled, is_default)
               VALUES ($1, 'e2e local', '', 20000, 40000, 134217728, 0.5, TRUE, TRUE)"#,
        )
        .bind(&host_id)
        .execute(pool)
        .await
        .expect("seed host");

        sqlx::query(
            r#"INSERT INTO challenges
               (id, title, category, difficulty, image, docker_host_id, port, flag, points, status)
               VALUES ($1, 'e2e nginx', 'Web', 'Easy', 'nginx:alpine', $2, 80,
                       'flag{template}', 100, 'published')"#,
        )
        .bind(&challenge_id)
        .bind(&host_id)
        .execute(pool)
        .await
        .expect("seed challenge");

        sqlx::query("INSERT INTO users (id, username) VALUES ($1, $1)")
            .bind(&user_id)
            .execute(pool)
            .await
            .expect("seed user");

        (host_id, challenge_id, user_id)
    }

    async fn user_points(pool: &PgPool, user_id: &str) -> i64 {
        let row: (i32,) = sqlx::query_as("SELECT total_points FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap();
        row.0 as i64
    }

    #[tokio::test]
    #[ignore = "requires postgres and docker"]
    async fn happy_start_duplicate_and_submission() {
        let pool = e2e_pool().await;
        let suffix = Uuid::new_v4().to_string();
        let (_, challenge_id, user_id) = seed(&pool, &suffix).await;

        let engines = Arc::new(EnginePool::new());
        let index: Arc<dyn InstanceIndex> = Arc::new(MemoryIndex::new());
        let svc = InstanceService::new(
            pool.clone(),
            engines.clone(),
            index.clone(),
            Duration::from_secs(3600),
        );

        // S1: happy start.
        let instance = svc.start(&user_id, &challenge_id).await.expect("start");
        assert_eq!(instance.status, "running");
        assert!((20000..=40000).contains(&instance.port));
        assert!(instance.flag.starts_with(&format!("flag{{{user_id}_")));
        assert!(instance.expires_at > Utc::now());
        let due = index.expired_before(instance.expires_at.timestamp()).await.unwrap();
        assert!(due.contains(&instance.id));

        // S2: duplicate start is refused.
        let err = svc.start(&user_id, &challenge_id).await.unwrap_err();
        assert!(err.to_string().contains("已经启动了该题目的实例"));

        // S3: correct submission credits points once.
        let before = user_points(&pool, &user_id).await;
        let (wrong, _) = svc.verify_flag(&user_id, &challenge_id, "flag{nope}").await.unwrap();
        assert!(!wrong);
        let (correct, message) = svc
            .verify_flag(&user_id, &challenge_id, &instance.flag)
            .await
            .unwrap();
        assert!(correct);
        assert_eq!(message, "回答正确！你获得了积分。");
        assert_eq!(user_points(&pool, &user_id).await, before + 100);

        // Idempotent stop: second call reports nothing to stop.
        svc.stop(&user_id, &challenge_id).await.expect("stop");
        let err = svc.stop(&user_id, &challenge_id).await.unwrap_err();
        assert!(err.to_string().contains("no active instance"));

        let row = store::get_instance(&pool, &instance.id).await.unwrap().unwrap();
        assert_eq!(row.status, "stopped");
    }

    #[tokio::test]
    #[ignore = "requires postgres and docker"]
    async fn reaper_terminates_expired_instances() {
        let pool = e2e_pool().await;
        let suffix = Uuid::new_v4().to_string();
        let (_, challenge_id, user_id) = seed(&pool, &suffix).await;

        let engines = Arc::new(EnginePool::new());
        let index: Arc<dyn InstanceIndex> = Arc::new(MemoryIndex::new());
        let svc = InstanceService::new(
            pool.clone(),
            engines.clone(),
            index.clone(),
            Duration::from_secs(2),
        );

        let instance = svc.start(&user_id, &challenge_id).await.expect("start");
        tokio::time::sleep(Duration::from_secs(3)).await;

        let reaper = Reaper::new(pool.clone(), engines, index.clone());
        reaper.sweep().await;

        let row = store::get_instance(&pool, &instance.id).await.unwrap().unwrap();
        assert_eq!(row.status, "expired");
        assert!(index.get_instance(&instance.id).await.unwrap().is_none());
        assert!(index.user_instances(&user_id).await.unwrap().is_empty());

        // S4 tail: the flag no longer verifies once the instance is gone.
        let (correct, message) = svc
            .verify_flag(&user_id, &challenge_id, &instance.flag)
            .await
            .unwrap();
        assert!(!correct);
        assert!(message.contains("No active instance"));
    }
}
