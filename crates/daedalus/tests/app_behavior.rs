//! Routing, properties, lifecycle, and plugin behaviour.

use daedalus::prelude::*;
use daedalus_graph::ReleaseFn;
use daedalus_test::TestClient;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn pong() -> daedalus::EndpointDef {
    endpoint("pong", |_args: Args| async {
        Reply::json(&serde_json::json!({"pong": true}))
    })
}

#[tokio::test]
async fn unknown_path_is_a_404_problem() {
    let mut app = App::new();
    app.route("/known").get(pong());
    app.setup().unwrap();

    let client = TestClient::new(app);
    let response = client.get("/unknown").send().await;

    assert_eq!(response.status(), 404);
    assert_eq!(
        response.header("content-type"),
        Some("application/problem+json")
    );
    assert_eq!(response.json_value()["type"], "not-found");
}

#[tokio::test]
async fn method_mismatch_lists_allow() {
    let mut app = App::new();
    app.route("/known").get(pong());
    app.route("/known").post(pong());
    app.setup().unwrap();

    let client = TestClient::new(app);
    let response = client.delete("/known").send().await;

    assert_eq!(response.status(), 405);
    assert_eq!(response.header("allow"), Some("GET, POST"));
    assert_eq!(response.json_value()["type"], "method-not-allowed");
}

#[tokio::test]
async fn route_auth_scheme_guards_endpoints() {
    let mut app = App::new();
    app.route("/admin").auth(AuthScheme::Bearer);
    app.route("/admin").get(pong());
    app.setup().unwrap();

    let client = TestClient::new(app);

    let denied = client.get("/admin").send().await;
    assert_eq!(denied.status(), 401);
    assert_eq!(denied.header("www-authenticate"), Some("Bearer"));

    let allowed = client
        .get("/admin")
        .header("authorization", "Bearer token-1")
        .send()
        .await;
    assert_eq!(allowed.status(), 200);
}

#[tokio::test]
async fn plugins_fold_and_dedup_across_route_and_endpoint() {
    struct CountingPlugin {
        calls: Arc<AtomicUsize>,
    }

    impl daedalus::Plugin for CountingPlugin {
        fn install(
            &self,
            _info: &daedalus::EndpointInfo,
            next: daedalus_core::ArcHandler,
        ) -> daedalus_core::ArcHandler {
            let calls = Arc::clone(&self.calls);
            daedalus_core::handler::handler_fn(move |args| {
                let next = Arc::clone(&next);
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    next.call(args).await
                }
            })
        }
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let shared: Arc<dyn daedalus::Plugin> = Arc::new(CountingPlugin {
        calls: Arc::clone(&calls),
    });

    let mut app = App::new();
    // The same instance on the route and on the endpoint must wrap once.
    app.route("/counted").plugin(Arc::clone(&shared));
    app.route("/counted").get(pong().plugin(shared));
    app.setup().unwrap();

    let client = TestClient::new(app);
    let response = client.get("/counted").send().await;

    assert_eq!(response.status(), 200);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn timeout_plugin_answers_504() {
    let mut app = App::new();
    app.route("/slow").get(
        endpoint("slow", |_args: Args| async {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            Ok(Reply::Empty)
        })
        .plugin(Arc::new(TimeoutPlugin::new(
            std::time::Duration::from_millis(20),
        ))),
    );
    app.setup().unwrap();

    let client = TestClient::new(app);
    let response = client.get("/slow").send().await;

    assert_eq!(response.status(), 504);
    assert_eq!(response.json_value()["type"], "timeout");
}

#[tokio::test]
async fn scoped_opt_in_runs_exit_callbacks() {
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let handler_log = Arc::clone(&log);

    let mut app = App::new();
    app.route("/callbacks").get(
        endpoint("callbacks", move |args: Args| {
            let log = Arc::clone(&handler_log);
            async move {
                let scope = args.instance::<Scope>("scope")?;
                log.lock().unwrap().push("handler");
                let cb_log = Arc::clone(&log);
                scope.on_exit(move || async move {
                    cb_log.lock().unwrap().push("callback");
                });
                Ok(Reply::Empty)
            }
        })
        .param("scope", TypeExpr::of::<Scope>())
        .scoped(),
    );
    app.setup().unwrap();

    let client = TestClient::new(app);
    let response = client.get("/callbacks").send().await;

    assert_eq!(response.status(), 200);
    assert_eq!(*log.lock().unwrap(), vec!["handler", "callback"]);
}

#[tokio::test]
async fn blocking_endpoint_runs_on_the_pool() {
    let mut app = App::new();
    app.route("/sum").get(
        blocking_endpoint("sum", |args: Args| {
            let a: i64 = args.get("a")?;
            let b: i64 = args.get("b")?;
            Reply::json(&serde_json::json!({"sum": a + b}))
        })
        .param("a", TypeExpr::integer())
        .param("b", TypeExpr::integer()),
    );
    app.setup().unwrap();

    let client = TestClient::new(app);
    let response = client.get("/sum?a=20&b=22").send().await;

    assert_eq!(response.status(), 200);
    assert_eq!(response.json_value()["sum"], 42);
}

#[tokio::test]
async fn event_bus_listeners_run_in_order() {
    #[derive(Clone)]
    struct OrderPlaced {
        id: i64,
    }

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let mut app = App::new();
    for tag in ["audit", "email"] {
        let seen = Arc::clone(&seen);
        app.events_mut().listen::<OrderPlaced, _, _>(move |event| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().unwrap().push(format!("{tag}:{}", event.id));
            }
        });
    }
    app.route("/orders").post(
        endpoint("placeOrder", |args: Args| async move {
            let bus = args.instance::<EventBus>("bus")?;
            bus.publish(OrderPlaced { id: 7 }).await;
            Reply::json_status(201, &serde_json::json!({"id": 7}))
        })
        .param("bus", TypeExpr::of::<EventBus>())
        .returns(resp(TypeExpr::mapping(), 201)),
    );
    app.setup().unwrap();

    let client = TestClient::new(app);
    let response = client.post("/orders").send().await;

    assert_eq!(response.status(), 201);
    assert_eq!(*seen.lock().unwrap(), vec!["audit:7", "email:7"]);
}

#[tokio::test]
async fn startup_failure_in_resource_factory_is_reported() {
    struct Pool;

    let mut app = App::new();
    app.graph_mut()
        .resource_with_lifetime::<Pool, _, _>(Lifetime::Singleton, &[], |_| async {
            anyhow::bail!("pool refused to connect")
        })
        .unwrap();
    app.route("/ping").get(pong());
    app.setup().unwrap();

    let client = TestClient::new(app);
    let err = client.startup().await.unwrap_err();
    assert!(err.to_string().contains("pool refused to connect"));
}

#[tokio::test]
async fn singleton_resource_lifecycle_spans_the_application() {
    struct Pool;

    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let factory_log = Arc::clone(&log);

    let mut app = App::new();
    app.graph_mut()
        .resource_with_lifetime(Lifetime::Singleton, &[], move |_| {
            let log = Arc::clone(&factory_log);
            async move {
                log.lock().unwrap().push("enter");
                let release_log = Arc::clone(&log);
                let release: ReleaseFn = Box::pin(async move {
                    release_log.lock().unwrap().push("exit");
                });
                Ok((Pool, release))
            }
        })
        .unwrap();
    app.route("/pool").get(
        endpoint("usePool", |args: Args| async move {
            let _pool = args.instance::<Pool>("pool")?;
            Ok(Reply::Empty)
        })
        .param("pool", TypeExpr::of::<Pool>()),
    );
    app.setup().unwrap();

    let client = TestClient::new(app);
    client.startup().await.unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["enter"]);

    let response = client.get("/pool").send().await;
    assert_eq!(response.status(), 200);
    assert_eq!(*log.lock().unwrap(), vec!["enter"]);

    client.shutdown().await.unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["enter", "exit"]);
}

#[tokio::test]
async fn custom_problem_solver_takes_precedence() {
    let mut app = App::new();
    app.mapper_mut()
        .solver_for_kind(ProblemKind::Gone, |_meta, _problem| {
            Response::text(http::StatusCode::GONE, "long gone")
        });
    app.route("/legacy").get(endpoint("legacy", |_args: Args| async {
        Err(Problem::new(ProblemKind::Gone).into())
    }));
    app.setup().unwrap();

    let client = TestClient::new(app);
    let response = client.get("/legacy").send().await;

    assert_eq!(response.status(), 410);
    assert_eq!(response.text(), "long gone");
}

#[tokio::test]
async fn multipart_upload_reaches_the_handler() {
    const BOUNDARY: &str = "e2e-boundary";

    let schema = TypeExpr::schema(StructSchema::record(vec![
        FieldSchema::new("title", TypeExpr::string()),
        FieldSchema::new("doc", TypeExpr::upload()),
    ]))
    .from_source(ParamSource::Form);

    let mut app = App::new();
    app.route("/upload").post(
        endpoint("upload", |args: Args| async move {
            let form = args.data("form").cloned().unwrap_or_default();
            let files = args.instance::<Vec<UploadFile>>("doc")?;
            Reply::json(&serde_json::json!({
                "title": form["title"],
                "filename": files[0].filename(),
                "size": files[0].len(),
            }))
        })
        .param("form", schema),
    );
    app.setup().unwrap();

    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"title\"\r\n\r\n\
         report\r\n\
         --{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"doc\"; filename=\"r.txt\"\r\n\r\n\
         contents\r\n\
         --{BOUNDARY}--\r\n"
    );

    let client = TestClient::new(app);
    let response = client
        .post("/upload")
        .header(
            "content-type",
            &format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(body)
        .send()
        .await;

    assert_eq!(response.status(), 200);
    let value = response.json_value();
    assert_eq!(value["title"], "report");
    assert_eq!(value["filename"], "r.txt");
    assert_eq!(value["size"], 8);
}

#[tokio::test]
async fn websocket_endpoint_binds_under_upgrade() {
    let mut app = App::new();
    app.route("/live").ws(
        endpoint("live", |args: Args| async move {
            let socket = args.instance::<daedalus::WebSocketHandle>("socket")?;
            socket.accept();
            Ok(Reply::Empty)
        })
        .param("socket", TypeExpr::of::<daedalus::WebSocketHandle>()),
    );
    app.setup().unwrap();

    let client = TestClient::new(app);
    let response = client.upgrade("/live").send().await;
    assert_eq!(response.status(), 200);

    // A plain GET does not reach the upgrade endpoint.
    let plain = client.get("/live").send().await;
    assert_eq!(plain.status(), 405);
}
