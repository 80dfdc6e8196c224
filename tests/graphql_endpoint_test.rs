/// Integration tests for the keyspace GraphQL endpoint
///
/// These tests drive the full router against the in-crate fake session and
/// verify:
/// - Query arguments become the expected CQL statement and binds
/// - Omitted options behave exactly like the configured defaults
/// - Rows, page state and mutation outcomes come back in protocol form
/// - Identity scoping rejects requests without a resolvable token

mod graphql_tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use cassandra_data_api::gateway::{ResultSet, Row};
    use cassandra_data_api::query::Consistency;
    use cassandra_data_api::testing::{store_session, FakeSession};
    use cassandra_data_api::types::DbValue;
    use cassandra_data_api::{Config, DataApi};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn store_config() -> Config {
        let mut config = Config::default();
        config.database.keyspace = Some("store".to_string());
        config
    }

    async fn router(config: Config, session: Arc<FakeSession>) -> Router {
        DataApi::new(config, session)
            .await
            .expect("Failed to bootstrap API")
            .router()
    }

    async fn post(router: &Router, path: &str, query: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            request = request.header("X-Cassandra-Token", token);
        }
        let request = request
            .body(Body::from(json!({ "query": query }).to_string()))
            .unwrap();

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_value_argument_builds_select() {
        let session = store_session();
        let router = router(store_config(), session.clone()).await;

        let (status, body) = post(&router, "/graphql", r#"{ books(value: {title: "abc"}) { values { title } } }"#, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("errors").is_none(), "Query had errors: {}", body);

        let calls = session.data_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].statement, r#"SELECT * FROM "store"."books" WHERE "title" = ?"#);
        assert_eq!(calls[0].values, vec![Some(DbValue::Text("abc".to_string()))]);
        assert_eq!(calls[0].options.consistency, Consistency::LocalQuorum);
        assert_eq!(calls[0].options.page_size, 100);
        assert_eq!(calls[0].options.user_or_role, None);
    }

    #[tokio::test]
    async fn test_limit_option_appends_limit() {
        let session = store_session();
        let router = router(store_config(), session.clone()).await;

        post(&router, "/graphql", r#"{ books(value: {title: "abc"}, options: {limit: 3}) { values { title } } }"#, None).await;

        let calls = session.data_calls();
        assert_eq!(
            calls[0].statement,
            format!("{} LIMIT ?", r#"SELECT * FROM "store"."books" WHERE "title" = ?"#)
        );
        assert_eq!(calls[0].values.last(), Some(&Some(DbValue::Int(3))));
    }

    #[tokio::test]
    async fn test_explicit_defaults_match_omitted_options() {
        let session = store_session();
        let router = router(store_config(), session.clone()).await;

        post(&router, "/graphql", r#"{ books(value: {title: "abc"}) { values { title } } }"#, None).await;
        post(
            &router,
            "/graphql",
            r#"{ books(value: {title: "abc"}, options: {consistency: LOCAL_QUORUM, pageSize: 100}) { values { title } } }"#,
            None,
        )
        .await;

        let calls = session.data_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);
    }

    #[tokio::test]
    async fn test_rows_and_page_state_are_returned() {
        let session = store_session();
        let mut row = Row::new();
        row.insert("title".to_string(), Some(DbValue::Text("abc".to_string())));
        row.insert("author".to_string(), None);
        row.insert("pages".to_string(), Some(DbValue::Int(7)));
        session.respond(ResultSet::new(vec![row]).with_paging_state(vec![1, 2, 3]));
        let router = router(store_config(), session).await;

        let (_, body) = post(&router, "/graphql", r#"{ books { pageState values { title author pages } } }"#, None).await;
        assert!(body.get("errors").is_none(), "Query had errors: {}", body);
        assert_eq!(body["data"]["books"]["pageState"], "AQID");
        assert_eq!(
            body["data"]["books"]["values"],
            json!([{ "title": "abc", "author": null, "pages": 7 }])
        );
    }

    #[tokio::test]
    async fn test_insert_reports_applied() {
        let session = store_session();
        let router = router(store_config(), session.clone()).await;

        let (_, body) = post(
            &router,
            "/graphql",
            r#"mutation { insertBooks(value: {title: "abc", pages: 3}) { applied value { title pages } } }"#,
            None,
        )
        .await;
        assert!(body.get("errors").is_none(), "Mutation had errors: {}", body);
        assert_eq!(body["data"]["insertBooks"]["applied"], true);
        assert_eq!(body["data"]["insertBooks"]["value"]["pages"], 3);
        assert!(session.data_calls()[0].statement.starts_with(r#"INSERT INTO "store"."books""#));
    }

    #[tokio::test]
    async fn test_views_have_no_mutations() {
        let session = store_session();
        let router = router(store_config(), session).await;

        let (_, body) = post(
            &router,
            "/graphql",
            r#"mutation { insertBooksByAuthor(value: {author: "x", title: "y"}) { applied } }"#,
            None,
        )
        .await;
        assert!(body["errors"].as_array().map_or(false, |errors| !errors.is_empty()));
    }

    #[tokio::test]
    async fn test_keyspace_path_and_unknown_keyspace() {
        let session = store_session();
        let router = router(Config::default(), session).await;

        let (status, body) = post(&router, "/graphql/store", r#"{ booksByKey(title: "abc") { title } }"#, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["booksByKey"], Value::Null);

        let (status, _) = post(&router, "/graphql/missing", "{ __typename }", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    fn scoped_config() -> Config {
        let mut config = store_config();
        config.auth.use_user_or_role = true;
        config.auth.tokens = BTreeMap::from([("token1".to_string(), "user1".to_string())]);
        config
    }

    #[tokio::test]
    async fn test_token_executes_as_user() {
        let session = store_session();
        let router = router(scoped_config(), session.clone()).await;

        let (_, body) = post(&router, "/graphql", r#"{ books(value: {title: "abc"}) { values { title } } }"#, Some("token1")).await;
        assert!(body.get("errors").is_none(), "Query had errors: {}", body);
        assert_eq!(session.data_calls()[0].options.user_or_role.as_deref(), Some("user1"));
    }

    #[tokio::test]
    async fn test_missing_token_is_rejected_before_execution() {
        let session = store_session();
        let router = router(scoped_config(), session.clone()).await;

        for token in [None, Some("unknown")] {
            let (_, body) = post(&router, "/graphql", r#"{ books(value: {title: "abc"}) { values { title } } }"#, token).await;
            assert_eq!(body["errors"][0]["message"], "expected user or role for this operation");
        }
        assert!(session.data_calls().is_empty());
    }

    #[tokio::test]
    async fn test_slow_statement_is_cancelled() {
        let session = store_session();
        let mut config = store_config();
        config.query.request_timeout_ms = 50;
        let router = router(config, session.clone()).await;

        session.pause();
        let (_, body) = post(&router, "/graphql", r#"{ books { values { title } } }"#, None).await;
        session.release();

        let message = body["errors"][0]["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("Request cancelled"), "unexpected error: {}", body);
    }

    async fn playground_page(config: Config) -> String {
        let response = router(config, store_session())
            .await
            .oneshot(Request::builder().uri("/graphql-playground").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_playground_opens_first_keyspace() {
        let page = playground_page(Config::default()).await;
        assert!(page.contains("\"/graphql/store\""), "{}", page);

        let page = playground_page(store_config()).await;
        assert!(page.contains("\"/graphql\""));
        assert!(!page.contains("/graphql/store"));
    }

    #[tokio::test]
    async fn test_health_check() {
        let router = router(store_config(), store_session()).await;
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"OK");
    }
}
