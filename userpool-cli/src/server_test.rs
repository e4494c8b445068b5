#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use userpool_core::auth::ApiKeyGateway;
    use userpool_core::client::LeasePool;
    use userpool_core::clock::ManualClock;
    use userpool_core::config::PoolConfig;
    use userpool_core::infrastructure_in_memory::InMemoryIdentityStore;
    use userpool_core::types::{DomainType, Environment, NewIdentity};

    use crate::server::{open_pool, router, AppState};

    const KEY: &str = "test-key";

    struct Harness {
        app: Router,
        clock: Arc<ManualClock>,
    }

    fn harness(key: Option<&str>) -> Harness {
        let clock = Arc::new(ManualClock::new(1_000));
        let config = PoolConfig::default().with_lease_timeout(Duration::from_secs(60));
        let pool = LeasePool::with_clock(Arc::new(InMemoryIdentityStore::new()), config, clock.clone());

        for (login, env, domain) in [
            ("stage-a@example.com", Environment::Stage, DomainType::Canary),
            ("stage-b@example.com", Environment::Stage, DomainType::Regular),
            ("prod-a@example.com", Environment::Prod, DomainType::Regular),
        ] {
            pool.provision(NewIdentity {
                login: login.to_string(),
                credential: format!("pw-{}", login),
                project_id: "project-a".to_string(),
                env,
                domain,
            })
            .unwrap();
        }

        let app = router(AppState {
            pool: Arc::new(pool),
            gateway: Arc::new(ApiKeyGateway::new(key.map(str::to_string))),
        });
        Harness { app, clock }
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>, bearer: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-caller", "ci-job-7");
        if let Some(token) = bearer {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn acquire(app: &Router, criteria: Value) -> (StatusCode, Value) {
        send(app, "POST", "/acquire", Some(criteria), None).await
    }

    #[tokio::test]
    async fn test_health_reports_pool_counts() {
        let h = harness(None);
        let (status, body) = send(&h.app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["free"], 3);
        assert_eq!(body["data"]["locked"], 0);
        assert_eq!(body["data"]["lease_timeout_secs"], 60);

        acquire(&h.app, json!({})).await;
        let (_, body) = send(&h.app, "GET", "/health", None, None).await;
        assert_eq!(body["data"]["free"], 2);
        assert_eq!(body["data"]["locked"], 1);
    }

    #[tokio::test]
    async fn test_acquire_and_release_cycle() {
        let h = harness(None);

        let (status, body) = acquire(&h.app, json!({ "env": "stage", "domain": "canary" })).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        let grant = &body["data"];
        assert_eq!(grant["identity"]["login"], "stage-a@example.com");
        assert_eq!(grant["credential"], "pw-stage-a@example.com");
        assert_eq!(grant["locked_at"], 1_000);
        assert_eq!(grant["expires_at"], 61_000);
        let id = grant["identity"]["id"].as_str().unwrap().to_string();
        let token = grant["holder_token"].as_str().unwrap().to_string();
        assert!(!token.is_empty());

        // Listing shows who holds it, never the token or the credential.
        let (status, body) = send(&h.app, "GET", "/identities?env=stage&domain=canary", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let listed = body["data"].as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["lock_state"]["state"], "locked");
        assert_eq!(listed[0]["lock_state"]["holder"], "ci-job-7");
        let raw = body.to_string();
        assert!(!raw.contains(&token));
        assert!(!raw.contains("pw-stage-a"));

        let (status, body) = send(
            &h.app,
            "POST",
            "/release",
            Some(json!({ "identity_id": id, "holder_token": "not-the-token" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["reason"], "NOT_HELD_BY_CALLER");

        let release = json!({ "identity_id": id, "holder_token": token });
        let (status, body) = send(&h.app, "POST", "/release", Some(release.clone()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["lock_state"]["state"], "free");

        let (status, body) = send(&h.app, "POST", "/release", Some(release), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["reason"], "NOT_HELD_BY_CALLER");
    }

    #[tokio::test]
    async fn test_exhausted_pool_is_a_conflict() {
        let h = harness(None);
        for _ in 0..2 {
            let (status, _) = acquire(&h.app, json!({ "env": "stage" })).await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = acquire(&h.app, json!({ "env": "stage" })).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
        assert_eq!(body["reason"], "NO_AVAILABLE_IDENTITY");

        // Other environments are unaffected.
        let (status, _) = acquire(&h.app, json!({ "env": "prod" })).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_unknown_identity_is_not_found() {
        let h = harness(None);

        let (status, body) = acquire(&h.app, json!({ "identity_id": "ghost" })).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["reason"], "NOT_FOUND");

        let (status, body) = send(
            &h.app,
            "POST",
            "/release",
            Some(json!({ "identity_id": "ghost", "holder_token": "t" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["reason"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected() {
        let h = harness(None);

        let (status, body) = acquire(&h.app, json!({ "env": "qa" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reason"], "INVALID_REQUEST");

        let (status, _) = send(&h.app, "GET", "/identities?domain=beta", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &h.app,
            "POST",
            "/release",
            Some(json!({ "identity_id": "", "holder_token": "t" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reason"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_provision_over_http() {
        let h = harness(None);
        let new = json!({
            "login": "preprod-a@example.com",
            "credential": "pw",
            "project_id": "project-b",
            "env": "preprod",
            "domain": "regular",
        });

        let (status, body) = send(&h.app, "POST", "/identities", Some(new.clone()), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["env"], "preprod");
        assert_eq!(body["data"]["lock_state"]["state"], "free");
        assert!(body["data"].get("credential").is_none());

        let (status, body) = send(&h.app, "POST", "/identities", Some(new), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["reason"], "DUPLICATE_LOGIN");

        let (_, body) = send(&h.app, "GET", "/identities?project_id=project-b", None, None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, body) = acquire(&h.app, json!({ "env": "preprod", "project_id": "project-b" })).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["credential"], "pw");
    }

    #[tokio::test]
    async fn test_manual_reclaim_frees_expired_leases() {
        let h = harness(None);
        let (_, body) = acquire(&h.app, json!({ "env": "prod" })).await;
        let token = body["data"]["holder_token"].as_str().unwrap().to_string();
        let id = body["data"]["identity"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(&h.app, "POST", "/reclaim", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["reclaimed"], 0);

        h.clock.advance(60_001);
        let (_, body) = send(&h.app, "POST", "/reclaim", None, None).await;
        assert_eq!(body["data"]["reclaimed"], 1);

        let (status, body) = send(
            &h.app,
            "POST",
            "/release",
            Some(json!({ "identity_id": id, "holder_token": token })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["reason"], "NOT_HELD_BY_CALLER");
    }

    #[tokio::test]
    async fn test_api_key_is_enforced() {
        let h = harness(Some(KEY));

        let (status, _) = send(&h.app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&h.app, "POST", "/acquire", Some(json!({})), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&h.app, "POST", "/acquire", Some(json!({})), Some("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&h.app, "GET", "/identities", None, Some("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(&h.app, "POST", "/acquire", Some(json!({})), Some(KEY)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["identity"]["lock_state"]["holder"], "ci-job-7");
    }

    #[test]
    fn test_blank_filters_match_anything() {
        use crate::handlers::build_criteria;
        use userpool_core::types::Criteria;

        assert_eq!(build_criteria(None, Some("  "), Some(""), None), Ok(Criteria::any()));
        assert_eq!(
            build_criteria(Some(" Stage "), None, Some(" project-a "), None),
            Ok(Criteria::any().env(Environment::Stage).project("project-a"))
        );
        assert!(build_criteria(Some("qa"), None, None, None).is_err());
    }

    #[test]
    fn test_provision_input_errors_are_reported_not_panicked() {
        use crate::parse_identities;

        assert!(parse_identities("not json").is_err());
        assert!(parse_identities(r#"[{"login": "a@example.com"}]"#).is_err());

        let parsed = parse_identities(
            r#"[{"login": "a@example.com", "credential": "pw", "project_id": "p", "env": "stage", "domain": "canary"}]"#,
        )
        .unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].env, Environment::Stage);
    }

    #[test]
    fn test_open_pool_rejects_unknown_backends() {
        assert!(open_pool("memory", PoolConfig::default()).is_ok());
        assert!(open_pool("postgres://localhost/pool", PoolConfig::default()).is_err());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_open_pool_sqlite() {
        let dir = std::env::temp_dir().join(format!("userpool-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let spec = format!("sqlite:{}", dir.join("pool.db").display());

        assert!(open_pool(&spec, PoolConfig::default()).is_ok());
        assert!(open_pool("sqlite::memory:", PoolConfig::default()).is_err());

        std::fs::remove_dir_all(&dir).ok();
    }
}
