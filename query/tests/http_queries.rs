//! End to end tests of URL queries and mutations against a mock HTTP server.

use std::time::Duration;

use rquery::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use wiremock::{
    matchers::{body_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

#[derive(Debug, Serialize, Deserialize)]
struct Todo {
    id: u32,
    title: String,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn client_for(server: &MockServer) -> QueryClient {
    init_tracing();
    QueryClient::builder()
        .http_client(ReqwestClient::new().base_url(server.uri()))
        .build()
}

async fn run_local<F: std::future::Future>(fut: F) -> F::Output {
    tokio::task::LocalSet::new().run_until(fut).await
}

/// Polls `condition` until it holds, failing the test after two seconds.
async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test]
async fn url_query_sends_params_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/todos"))
        .and(query_param("page", "2"))
        .and(header("x-app", "test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1, "title": "a"}])))
        .expect(1)
        .mount(&server)
        .await;

    run_local(async {
        let client = client_for(&server);
        let options = QueryOptions::url(query_key!["todos", 2], "/todos")
            .set_params(Some(Value::from(json!({"page": 2}))))
            .set_fetch_config(RequestConfig::default().header("x-app", "test"));

        let data = client.fetch_query(options.clone()).await.unwrap();
        assert_eq!(data, Value::from(json!([{"id": 1, "title": "a"}])));

        // Fresh data is served from the cache.
        let again = client.fetch_query(options).await.unwrap();
        assert!(data.ptr_eq(&again));
    })
    .await;
}

#[tokio::test]
async fn schema_failures_are_validation_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/todos/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
        .mount(&server)
        .await;

    run_local(async {
        let client = client_for(&server);
        let options = QueryOptions::url(query_key!["todo", 1], "/todos/1")
            .set_schema(SerdeSchema::<Todo>::new());

        let err = client.fetch_query(options).await.unwrap_err();
        assert!(err.is_validation(), "unexpected error: {err}");
        let state = client.get_query_state(query_key!["todo", 1]).unwrap();
        assert_eq!(state.error, Some(err));
        assert!(state.data.is_none());
    })
    .await;
}

#[tokio::test]
async fn error_statuses_are_http_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/todos"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    run_local(async {
        let client = client_for(&server);
        let err = client
            .fetch_query(QueryOptions::url("todos", "/todos"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(503));
    })
    .await;
}

#[tokio::test]
async fn mutation_invalidates_observed_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/todos/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "title": "draft"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/todos/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "title": "final"})))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/todos/1"))
        .and(body_json(json!({"title": "final"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "title": "final"})))
        .expect(1)
        .mount(&server)
        .await;

    run_local(async {
        let client = client_for(&server);
        let observer = client.observe(
            QueryOptions::url(query_key!["todos", 1], "/todos/1")
                .set_schema(SerdeSchema::<Todo>::new()),
        );
        assert!(observer.get_current_result().is_loading());

        let title = |observer: &QueryObserver| {
            observer
                .get_current_result()
                .untracked()
                .data
                .as_ref()
                .and_then(|todo| todo.get("title"))
                .and_then(|title| title.as_str().map(str::to_string))
        };
        wait_until(|| title(&observer).is_some()).await;
        assert_eq!(title(&observer).as_deref(), Some("draft"));

        let rename = client.mutation(
            MutationOptions::builder()
                .url("/todos/1")
                .method(Method::PATCH)
                .build()
                .unwrap()
                .set_invalidates([query_key!["todos"]]),
        );
        rename.mutate(json!({"title": "final"})).await.unwrap();
        assert!(rename.state().is_success());

        wait_until(|| title(&observer).as_deref() == Some("final")).await;
        let result = observer.get_current_result();
        assert!(result.is_success() && !result.is_stale());
        observer.destroy();
    })
    .await;
}

#[tokio::test]
async fn dehydrated_cache_survives_serialization() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/todos/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "title": "a"})))
        .expect(1)
        .mount(&server)
        .await;

    run_local(async {
        let server_client = client_for(&server);
        server_client
            .prefetch_query(QueryOptions::url(query_key!["todos", 1], "/todos/1"))
            .await;
        let wire = serde_json::to_string(&server_client.dehydrate()).unwrap();

        let browser = client_for(&server);
        browser.hydrate(serde_json::from_str(&wire).unwrap());

        // Hydrated data is fresh, so observing it does not hit the server again.
        let observer = browser.observe(QueryOptions::url(query_key!["todos", 1], "/todos/1"));
        let result = observer.get_current_result();
        assert!(result.is_success());
        assert!(!result.is_fetching());
        assert_eq!(
            result.data().and_then(|todo| todo.get("title")),
            Some(&Value::from("a"))
        );
    })
    .await;
}
