use common::{CancelAfter, json, proto_dir, serve_tcp};
use echo_service::{
    CounterImpl, CounterServer, EchoServiceImpl, EchoServiceServer, GreeterImpl, GreeterServer,
    PROTO_DIR,
};
use protodial_core::invoker::{InvocationError, InvokeOptions, Invoker};
use protodial_core::message::{BuildError, FieldKind, InputField, ScalarKind};
use protodial_core::resolver::ResolveError;
use protodial_core::session::{SendError, Session, SessionError};
use protodial_core::tokio_util::sync::CancellationToken;
use std::path::Path;
use tonic::service::Routes;

mod common;

fn counter_session() -> Session {
    let session = Session::new();
    session
        .process_protos(Some(Path::new(PROTO_DIR)), &proto_dir("counter"))
        .expect("Failed to process counter protos");
    session
}

fn values(pairs: &[(u32, &str)]) -> Vec<(u32, String)> {
    pairs
        .iter()
        .map(|(tag, value)| (*tag, value.to_string()))
        .collect()
}

#[tokio::test]
async fn test_greeter_scenario() {
    let session = Session::new();

    let listing = session.process_protos(None, &proto_dir("greet")).unwrap();
    assert_eq!(listing.services, ["Greeter"]);

    let selection = session.service_selected("Greeter");
    assert_eq!(selection.methods, ["Hello"]);
    assert_eq!(selection.selected_method.as_deref(), Some("Hello"));
    let input = selection.input.unwrap();
    assert_eq!(input.message, "HelloReq");
    assert_eq!(
        input.fields,
        vec![InputField {
            label: "name".to_string(),
            tag: 1,
            kind: FieldKind::Scalar(ScalarKind::String),
        }]
    );

    let host = serve_tcp(Routes::new(GreeterServer::new(GreeterImpl))).await;
    let mut output = vec!["stale output from a previous send".to_string()];

    let report = session
        .send(
            &host,
            "Greeter",
            "Hello",
            &values(&[(1, "world")]),
            &mut output,
            &InvokeOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.blocks, 1);
    assert_eq!(output, ["{\n  \"greeting\": \"hello world\"\n}"]);
}

#[tokio::test]
async fn test_process_protos_auto_selects_first_service_and_method() {
    let session = Session::new();

    let listing = session
        .process_protos(Some(Path::new(PROTO_DIR)), &proto_dir("counter"))
        .unwrap();

    assert_eq!(listing.services, ["counter.Counter"]);
    let selection = listing.selection.unwrap();
    assert_eq!(selection.methods, ["Check", "CountUp", "Endless", "Collect"]);
    assert_eq!(selection.selected_method.as_deref(), Some("Check"));

    let input = selection.input.unwrap();
    assert_eq!(input.message, "counter.CountRequest");
    let shape: Vec<_> = input
        .fields
        .iter()
        .map(|f| (f.label.as_str(), f.tag, f.kind.to_string()))
        .collect();
    assert_eq!(
        shape,
        [
            ("count", 1, "int32".to_string()),
            ("fail_at_end", 2, "bool".to_string()),
            ("interval_ms", 3, "int64".to_string()),
            ("labels", 4, "common.Labels".to_string()),
            ("tags", 5, "repeated string".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_unknown_service_has_no_methods() {
    let session = counter_session();

    let selection = session.service_selected("counter.Ghost");

    assert!(selection.methods.is_empty());
    assert!(selection.selected_method.is_none());
    assert!(selection.input.is_none());
}

#[tokio::test]
async fn test_method_selected() {
    let session = counter_session();

    let shape = session.method_selected("counter.Counter", "Endless").unwrap();
    assert_eq!(shape.message, "counter.CountRequest");

    assert!(matches!(
        session.method_selected("counter.Counter", "Ghost"),
        Err(SendError::Invocation(InvocationError::Lookup(_)))
    ));
}

#[tokio::test]
async fn test_missing_imports_fail_processing_and_keep_previous_snapshot() {
    let session = counter_session();
    let before = session.catalog().unwrap();

    // Without the shared import root, `common/meta.proto` cannot be found.
    let result = session.process_protos(None, &proto_dir("counter"));

    assert!(matches!(
        result,
        Err(SessionError::Resolve(ResolveError::FilenameResolution { .. }))
    ));
    let after = session.catalog().unwrap();
    assert!(std::sync::Arc::ptr_eq(&before, &after));
}

#[tokio::test]
async fn test_new_snapshot_replaces_old_one_without_mutating_it() {
    let session = counter_session();
    let old = session.catalog().unwrap();

    session.process_protos(None, &proto_dir("echo")).unwrap();

    assert_eq!(old.services(), ["counter.Counter"]);
    assert_eq!(session.catalog().unwrap().services(), ["echo.EchoService"]);
}

#[tokio::test]
async fn test_send_without_catalog() {
    let session = Session::new();
    let mut invoker = Invoker::from_service(EchoServiceServer::new(EchoServiceImpl));
    let mut output = Vec::new();

    let result = session
        .send_with(
            &mut invoker,
            "echo.EchoService",
            "UnaryEcho",
            &[],
            &mut output,
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(SendError::NoCatalog)));
}

#[tokio::test]
async fn test_server_stream_blocks_arrive_in_order() {
    let session = counter_session();
    let mut invoker = Invoker::from_service(CounterServer::new(CounterImpl));
    let mut output = Vec::new();

    let report = session
        .send_with(
            &mut invoker,
            "counter.Counter",
            "CountUp",
            &values(&[(1, "3"), (2, "")]),
            &mut output,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.blocks, 3);
    let counted: Vec<_> = output.iter().map(|block| json(block)["value"].clone()).collect();
    assert_eq!(counted, [1, 2, 3]);
    assert_eq!(json(&output[1])["parity"], "PARITY_EVEN");
}

#[tokio::test]
async fn test_stream_failure_keeps_partial_output() {
    let session = counter_session();
    let mut invoker = Invoker::from_service(CounterServer::new(CounterImpl));
    let mut output = Vec::new();

    let result = session
        .send_with(
            &mut invoker,
            "counter.Counter",
            "CountUp",
            &values(&[(1, "2"), (2, "true")]),
            &mut output,
            &CancellationToken::new(),
        )
        .await;

    match result {
        Err(SendError::Interrupted {
            emitted,
            source: InvocationError::Rpc(status),
        }) => {
            assert_eq!(emitted, 2);
            assert_eq!(status.code(), tonic::Code::Aborted);
        }
        other => panic!("Expected an interrupted stream, got {other:?}"),
    }
    assert_eq!(output.len(), 2);
}

#[tokio::test]
async fn test_cancelling_mid_stream_stops_output_growth() {
    let session = counter_session();
    let mut invoker = Invoker::from_service(CounterServer::new(CounterImpl));
    let cancel = CancellationToken::new();
    let mut sink = CancelAfter {
        blocks: Vec::new(),
        limit: 3,
        cancel: cancel.clone(),
    };

    let result = session
        .send_with(
            &mut invoker,
            "counter.Counter",
            "Endless",
            &values(&[(3, "2")]),
            &mut sink,
            &cancel,
        )
        .await;

    assert!(matches!(
        result,
        Err(SendError::Interrupted {
            emitted: 3,
            source: InvocationError::Cancelled
        })
    ));
    assert_eq!(sink.blocks.len(), 3);
}

#[tokio::test]
async fn test_build_errors_abort_before_sending() {
    let session = counter_session();
    let mut invoker = Invoker::from_service(CounterServer::new(CounterImpl));
    let mut output = Vec::new();

    let result = session
        .send_with(
            &mut invoker,
            "counter.Counter",
            "Check",
            &values(&[(1, "many")]),
            &mut output,
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(
        result,
        Err(SendError::Build(BuildError::FieldCoercion { tag: 1, .. }))
    ));

    let result = session
        .send_with(
            &mut invoker,
            "counter.Counter",
            "Check",
            &values(&[(42, "1")]),
            &mut output,
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(
        result,
        Err(SendError::Build(BuildError::UnknownFieldTag { tag: 42, .. }))
    ));

    assert!(output.is_empty());
}

#[tokio::test]
async fn test_unary_over_tcp_with_headers() {
    let session = counter_session();
    let host = serve_tcp(Routes::new(CounterServer::new(CounterImpl))).await;
    let mut output = Vec::new();
    let options = InvokeOptions {
        connect_timeout: Some(std::time::Duration::from_secs(5)),
        headers: vec![("x-request-id".to_string(), "42".to_string())],
    };

    let report = session
        .send(
            &format!("http://{host}"),
            "counter.Counter",
            "Check",
            &values(&[(1, "7")]),
            &mut output,
            &options,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.blocks, 1);
    assert_eq!(json(&output[0])["value"], 7);
    assert_eq!(json(&output[0])["parity"], "PARITY_ODD");
}

#[tokio::test]
async fn test_channel_sink_receives_blocks_in_order() {
    let session = counter_session();
    let mut invoker = Invoker::from_service(CounterServer::new(CounterImpl));
    let (mut tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    let report = session
        .send_with(
            &mut invoker,
            "counter.Counter",
            "CountUp",
            &values(&[(1, "2")]),
            &mut tx,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    drop(tx);

    let mut received = Vec::new();
    while let Some(block) = rx.recv().await {
        received.push(json(&block)["value"].clone());
    }
    assert_eq!(report.blocks, 2);
    assert_eq!(received, [1, 2]);
}

#[tokio::test]
async fn test_tree_without_services_yields_empty_listing() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("types.proto"),
        "syntax = \"proto3\"; package types; message Empty {}",
    )
    .unwrap();
    let session = Session::new();

    let listing = session.process_protos(None, dir.path()).unwrap();

    assert!(listing.services.is_empty());
    assert!(listing.selection.is_none());
    assert!(session.catalog().is_some());
}

#[tokio::test]
async fn test_input_shape_follows_declaration_order() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("orders.proto"),
        r#"
syntax = "proto3";
package orders;
service Orders { rpc Place(PlaceOrder) returns (PlaceOrder); }
message PlaceOrder {
  string sku = 3;
  int32 quantity = 1;
  bool gift = 2;
}
"#,
    )
    .unwrap();
    let session = Session::new();

    let listing = session.process_protos(None, dir.path()).unwrap();

    let input = listing.selection.unwrap().input.unwrap();
    let shape: Vec<_> = input
        .fields
        .iter()
        .map(|f| (f.label.as_str(), f.tag))
        .collect();
    assert_eq!(shape, [("sku", 3), ("quantity", 1), ("gift", 2)]);
}

#[tokio::test]
async fn test_duplicate_services_fail_to_resolve() {
    let dir = tempfile::TempDir::new().unwrap();
    let greeter = r#"
syntax = "proto3";
package dup;
service Greeter { rpc Hello(Req) returns (Req); }
message Req { string name = 1; }
"#;
    std::fs::write(dir.path().join("a.proto"), greeter).unwrap();
    std::fs::write(dir.path().join("b.proto"), greeter).unwrap();
    let session = counter_session();

    let result = session.process_protos(None, dir.path());

    assert!(matches!(
        result,
        Err(SessionError::Resolve(ResolveError::Parse { .. }))
    ));
    assert_eq!(session.catalog().unwrap().services(), ["counter.Counter"]);
}
