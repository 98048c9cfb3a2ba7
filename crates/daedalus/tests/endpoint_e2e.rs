//! End-to-end scenarios through the in-memory client.

use daedalus::prelude::*;
use daedalus_graph::ReleaseFn;
use daedalus_test::TestClient;
use std::sync::{Arc, Mutex};

struct Engine {
    echo: &'static str,
}

#[tokio::test]
async fn path_query_and_dependency() {
    let mut app = App::new();
    app.graph_mut()
        .factory(Lifetime::Reused, &[], |_| async {
            Ok(Engine { echo: "fake" })
        })
        .unwrap();
    app.route("/profile/{pid}").get(
        endpoint("getProfile", |args: Args| async move {
            let pid: String = args.get("pid")?;
            let q: i64 = args.get("q")?;
            let engine = args.instance::<Engine>("engine")?;
            assert_eq!(engine.echo, "fake");
            Reply::json(&serde_json::json!({ "id": pid, "q": q }))
        })
        .param("pid", TypeExpr::string())
        .param("q", TypeExpr::integer())
        .param("engine", TypeExpr::of::<Engine>()),
    );
    app.setup().unwrap();

    let client = TestClient::new(app);
    let response = client.get("/profile/p?q=5").send().await;

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.json_value(),
        serde_json::json!({ "id": "p", "q": 5 })
    );
}

#[tokio::test]
async fn structured_body_validation_aggregation() {
    let schema = TypeExpr::schema(StructSchema::named(
        "CreateUser",
        vec![
            FieldSchema::new(
                "name",
                TypeExpr::string().constrained(Constraints::new().min_length(1)),
            ),
            FieldSchema::new(
                "age",
                TypeExpr::integer().constrained(Constraints::new().ge(0.0).le(130.0)),
            ),
            FieldSchema::new(
                "email",
                TypeExpr::string().constrained(Constraints::new().pattern("@").unwrap()),
            ),
        ],
    ));

    let mut app = App::new();
    app.route("/users").post(
        endpoint("createUser", |_args: Args| async move {
            panic!("handler must not run when validation fails");
        })
        .param("payload", schema),
    );
    app.setup().unwrap();

    let client = TestClient::new(app);
    let response = client
        .post("/users")
        .json(&serde_json::json!({"name": "", "age": -1, "email": "no-at"}))
        .send()
        .await;

    assert_eq!(response.status(), 422);
    assert_eq!(
        response.header("content-type"),
        Some("application/problem+json")
    );
    let problem = response.json_value();
    assert_eq!(problem["type"], "invalid-request-errors");
    let details = problem["detail"].as_array().unwrap();
    assert_eq!(details.len(), 3);
    for (detail, param) in details.iter().zip(["name", "age", "email"]) {
        assert_eq!(detail["type"], "invalid-param-value");
        assert_eq!(detail["location"], "body");
        assert_eq!(detail["param"], param);
    }
}

#[tokio::test]
async fn multi_value_header() {
    let mut app = App::new();
    app.route("/items").get(
        endpoint("listItems", |args: Args| async move {
            let tokens: Vec<String> = args.get("x_token")?;
            Reply::json(&serde_json::json!({ "X-Token values": tokens }))
        })
        .param(
            "x_token",
            TypeExpr::optional(TypeExpr::list(TypeExpr::string()))
                .from_source(ParamSource::Header),
        ),
    );
    app.setup().unwrap();

    let client = TestClient::new(app);
    let response = client
        .get("/items")
        .header("x-token", "a")
        .header("x-token", "b")
        .send()
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.json_value(),
        serde_json::json!({ "X-Token values": ["a", "b"] })
    );
}

#[tokio::test]
async fn server_sent_event_stream() {
    let mut app = App::new();
    app.route("/sse").get(
        endpoint("counter", |_args: Args| async move {
            let mut events = vec![SseEvent::empty().event("start")];
            for i in 0..3 {
                events.push(
                    SseEvent::json(&serde_json::json!({ "count": i }))
                        .event("update")
                        .id(i.to_string()),
                );
            }
            events.push(SseEvent::empty().event("close").id("final"));
            Ok(Reply::events(events))
        })
        .returns(sse_stream()),
    );
    app.setup().unwrap();

    let client = TestClient::new(app);
    let response = client.get("/sse").send().await;

    assert_eq!(response.status(), 200);
    assert_eq!(response.header("content-type"), Some("text/event-stream"));
    let body = response.text();
    let mut expected = String::from("event: start\n\n");
    for i in 0..3 {
        expected.push_str(&format!(
            "event: update\nid: {i}\ndata: {{\"count\":{i}}}\n\n"
        ));
    }
    expected.push_str("event: close\nid: final\n\n");
    assert_eq!(body, expected);
}

#[tokio::test]
async fn scoped_resource_released_on_handler_error() {
    struct Conn;

    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let factory_log = Arc::clone(&log);

    let mut app = App::new();
    app.graph_mut()
        .resource(&[], move |_| {
            let log = Arc::clone(&factory_log);
            async move {
                log.lock().unwrap().push("enter");
                let release_log = Arc::clone(&log);
                let release: ReleaseFn = Box::pin(async move {
                    release_log.lock().unwrap().push("exit");
                });
                Ok((Conn, release))
            }
        })
        .unwrap();
    app.route("/work").get(
        endpoint("work", |args: Args| async move {
            let _conn = args.instance::<Conn>("conn")?;
            Err(Problem::new(ProblemKind::Conflict)
                .with_detail("the order already shipped")
                .into())
        })
        .param("conn", TypeExpr::of::<Conn>()),
    );
    app.setup().unwrap();

    let client = TestClient::new(app);
    let response = client.get("/work").send().await;

    assert_eq!(response.status(), 409);
    assert_eq!(response.json_value()["type"], "conflict");
    assert_eq!(*log.lock().unwrap(), vec!["enter", "exit"]);
}

#[tokio::test]
async fn empty_response_variant() {
    let mut app = App::new();
    app.route("/empty").post(
        endpoint("emptyReply", |_args: Args| async move {
            // Whatever the handler yields, the declared variant wins.
            Reply::json(&serde_json::json!({"ignored": true}))
        })
        .returns(empty(204)),
    );
    app.setup().unwrap();

    let client = TestClient::new(app);
    let response = client.post("/empty").send().await;

    assert_eq!(response.status(), 204);
    assert!(response.body_bytes().is_empty());
    assert_eq!(response.header("content-type"), None);
}
