//! End-to-end server tests over in-memory connections.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use shrike_json_rpc::RpcError;
use shrike_rpc_server::{serve_conn_with_context, CallContext, MethodRegistry};

#[derive(Debug, Default, Deserialize)]
struct NameArg {
    #[serde(default)]
    fname: String,
    #[serde(default)]
    lname: String,
}

#[derive(Debug, Serialize)]
struct NameRes {
    name: String,
}

fn test_registry() -> (Arc<MethodRegistry>, Arc<Mutex<Vec<String>>>) {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let mut registry = MethodRegistry::new();

    registry.register("Svc.Sum", |_ctx, terms: [i64; 2]| async move {
        Ok(terms[0] + terms[1])
    });
    registry.register("Svc.SumAll", |_ctx, terms: Vec<i64>| async move {
        Ok(terms.iter().sum::<i64>())
    });
    registry.register("Svc.MapLen", |_ctx, map: HashMap<String, i64>| async move {
        Ok(map.len())
    });
    registry.register("Svc.Name", |_ctx, arg: NameArg| async move {
        Ok(NameRes {
            name: format!("{} {}", arg.fname, arg.lname),
        })
    });
    registry.register("Svc.Err", |_ctx, _: HashMap<String, Value>| async move {
        Err::<(), _>(RpcError::wrap("some issue"))
    });
    registry.register("Svc.Err2", |_ctx, _: HashMap<String, Value>| async move {
        Err::<(), _>(RpcError::new(42, "some issue"))
    });
    registry.register("Svc.Err3", |_ctx, _: HashMap<String, Value>| async move {
        Err::<(), _>(RpcError::with_data(
            42,
            "some issue",
            json!({"one": 1, "two": 2}),
        ))
    });
    let sink = messages.clone();
    registry.register("Svc.Msg", move |_ctx, msg: [String; 1]| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(msg[0].clone());
            Ok(Value::Null)
        }
    });
    registry.register("Svc.Ctx", |ctx: CallContext, _: Vec<Value>| async move {
        Ok(ctx.get("peer").cloned().unwrap_or(Value::Null))
    });

    (Arc::new(registry), messages)
}

/// Serve `input` on one end of an in-memory pipe and return the framed
/// responses, one JSON value per line.
async fn run_with(registry: Arc<MethodRegistry>, ctx: CallContext, input: &str) -> Vec<Value> {
    let (client_end, server_end) = tokio::io::duplex(1 << 16);
    let server = tokio::spawn(serve_conn_with_context(registry, server_end, ctx));

    let (mut read, mut write) = tokio::io::split(client_end);
    write.write_all(input.as_bytes()).await.unwrap();
    write.shutdown().await.unwrap();

    let mut output = String::new();
    read.read_to_string(&mut output).await.unwrap();
    server.await.unwrap().unwrap();

    output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

async fn run(input: &str) -> Vec<Value> {
    let (registry, _) = test_registry();
    run_with(registry, CallContext::new(), input).await
}

#[tokio::test]
async fn parse_error_replies_with_null_id() {
    let out = run("x\n").await;
    assert_eq!(
        out,
        vec![json!({"id": null, "error": {"code": -32700, "message": "Parse error"}})]
    );
}

#[tokio::test]
async fn serving_continues_after_a_parse_error() {
    let out = run("x garbage\n{\"id\":0,\"method\":\"Svc.Sum\",\"params\":[3,5]}\n").await;
    assert_eq!(out[0]["error"]["code"], json!(-32700));
    assert_eq!(out[1], json!({"id": 0, "result": 8, "error": null}));
}

#[tokio::test]
async fn non_request_values_are_invalid_requests() {
    let out = run("null\ntrue\nfalse\n42\n\"str\"\n{}\n").await;
    assert_eq!(out.len(), 6);
    for response in out {
        assert_eq!(
            response,
            json!({"id": null, "error": {"code": -32600, "message": "Invalid request"}})
        );
    }
}

#[tokio::test]
async fn ids_echo_verbatim() {
    let out = run(concat!(
        r#"{"id":0,"method":"Svc.Sum","params":[3,5]}"#,
        "\n",
        r#"{"id":"0","method":"Svc.Sum","params":[3,5]}"#,
        "\n",
        r#"{"id":null,"method":"Svc.Sum","params":[3,5]}"#,
        "\n",
        r#"{"id":1.5,"method":"Svc.Sum","params":[3,5]}"#,
        "\n",
    ))
    .await;
    assert_eq!(out[0], json!({"id": 0, "result": 8, "error": null}));
    assert_eq!(out[1], json!({"id": "0", "result": 8, "error": null}));
    assert_eq!(out[2], json!({"id": null, "result": 8, "error": null}));
    assert_eq!(out[3], json!({"id": 1.5, "result": 8, "error": null}));
}

#[tokio::test]
async fn invalid_request_echoes_a_valid_id() {
    let out = run(concat!(
        r#"{"id":7,"params":[3,5]}"#,
        "\n",
        r#"{"id":8,"method":42}"#,
        "\n",
        r#"{"id":[9],"method":"Svc.Sum"}"#,
        "\n",
        r#"{"id":9,"method":"Svc.Sum","params":42}"#,
        "\n",
    ))
    .await;
    assert_eq!(
        out[0],
        json!({"id": 7, "error": {"code": -32600, "message": "Invalid request"}})
    );
    assert_eq!(out[1]["id"], json!(8));
    // a malformed id is not echoed
    assert_eq!(out[2]["id"], json!(null));
    assert_eq!(out[3]["id"], json!(9));
}

#[tokio::test]
async fn notifications_are_suppressed() {
    // notification and call back to back without a separator
    let out = run(concat!(
        r#"{"method":"Svc.Sum","params":[2,3]}"#,
        r#"{"id":0,"method":"Svc.Sum","params":[3,5]}"#,
        "\n",
    ))
    .await;
    assert_eq!(out, vec![json!({"id": 0, "result": 8, "error": null})]);
}

#[tokio::test]
async fn notifications_still_run() {
    let (registry, messages) = test_registry();
    let out = run_with(
        registry,
        CallContext::new(),
        concat!(
            r#"{"method":"Svc.Msg","params":["one"]}"#,
            "\n",
            r#"{"method":"Nope"}"#,
            "\n",
            r#"{"method":"Svc.Msg","params":["two"]}"#,
            "\n",
            r#"{"id":0,"method":"Svc.Sum","params":[10,5]}"#,
            "\n",
        ),
    )
    .await;
    assert_eq!(out, vec![json!({"id": 0, "result": 15, "error": null})]);
    assert_eq!(*messages.lock().unwrap(), vec!["one", "two"]);
}

#[tokio::test]
async fn absent_params_decode_to_zero_values() {
    let out = run(concat!(
        r#"{"id":0,"method":"Svc.Sum"}"#,
        "\n",
        r#"{"id":1,"method":"Svc.SumAll"}"#,
        "\n",
        r#"{"id":2,"method":"Svc.MapLen"}"#,
        "\n",
        r#"{"id":3,"method":"Svc.Name"}"#,
        "\n",
    ))
    .await;
    assert_eq!(out[0], json!({"id": 0, "result": 0, "error": null}));
    assert_eq!(out[1], json!({"id": 1, "result": 0, "error": null}));
    assert_eq!(out[2], json!({"id": 2, "result": 0, "error": null}));
    assert_eq!(out[3], json!({"id": 3, "result": {"name": " "}, "error": null}));
}

#[tokio::test]
async fn params_decode_per_target_type() {
    let out = run(concat!(
        r#"{"id":0,"method":"Svc.SumAll","params":[3,5,7]}"#,
        "\n",
        r#"{"id":1,"method":"Svc.MapLen","params":{"a":3,"b":5}}"#,
        "\n",
        r#"{"id":2,"method":"Svc.Name","params":{"fname":"John","lname":"Smith"}}"#,
        "\n",
    ))
    .await;
    assert_eq!(out[0], json!({"id": 0, "result": 15, "error": null}));
    assert_eq!(out[1], json!({"id": 1, "result": 2, "error": null}));
    assert_eq!(
        out[2],
        json!({"id": 2, "result": {"name": "John Smith"}, "error": null})
    );
}

#[tokio::test]
async fn mismatched_params_are_invalid_params() {
    let out = run(concat!(
        r#"{"id":0,"method":"Svc.Sum","params":{}}"#,
        "\n",
        r#"{"id":1,"method":"Svc.MapLen","params":[3,5]}"#,
        "\n",
        r#"{"id":2,"method":"Svc.Name","params":[3,5]}"#,
        "\n",
    ))
    .await;
    for response in &out {
        assert_eq!(response["error"]["code"], json!(-32602), "{response}");
    }
    let message = out[0]["error"]["message"].as_str().unwrap();
    assert!(message.contains("cannot decode params into"), "{message}");
}

#[tokio::test]
async fn dispatch_misses_are_method_not_found() {
    let out = run(concat!(
        r#"{"id":0,"method":"","params":[]}"#,
        "\n",
        r#"{"id":1,"method":"Sum","params":[]}"#,
        "\n",
        r#"{"id":2,"method":"Bad.Sum","params":[]}"#,
        "\n",
        r#"{"id":3,"method":"Svc.Bad","params":[]}"#,
        "\n",
    ))
    .await;
    for response in &out {
        assert_eq!(response["error"]["code"], json!(-32601), "{response}");
    }
    assert_eq!(
        out[1]["error"]["message"],
        json!("service/method request ill-formed: Sum")
    );
    assert_eq!(out[2]["error"]["message"], json!("can't find service Bad.Sum"));
    assert_eq!(out[3]["error"]["message"], json!("can't find method Svc.Bad"));
}

#[tokio::test]
async fn handler_errors_serialize_faithfully() {
    let out = run(concat!(
        r#"{"id":1,"method":"Svc.Err","params":{}}"#,
        "\n",
        r#"{"id":2,"method":"Svc.Err2","params":{}}"#,
        "\n",
        r#"{"id":3,"method":"Svc.Err3","params":{}}"#,
        "\n",
    ))
    .await;
    assert_eq!(
        out[0],
        json!({"id": 1, "error": {"code": -32000, "message": "some issue"}})
    );
    assert_eq!(
        out[1],
        json!({"id": 2, "error": {"code": 42, "message": "some issue"}})
    );
    assert_eq!(
        out[2],
        json!({"id": 3, "error": {"code": 42, "message": "some issue",
                                  "data": {"one": 1, "two": 2}}})
    );
}

#[tokio::test]
async fn batch_suppresses_notifications_and_keeps_order() {
    let out = run(concat!(
        r#"[{"method":"Svc.Msg","params":["one"]},"#,
        r#"{"id":0,"method":"Svc.Sum","params":[2,3]},"#,
        r#"{"method":"Svc.Msg","params":["two"]}]"#,
        "\n",
    ))
    .await;
    assert_eq!(out, vec![json!([{"id": 0, "result": 5, "error": null}])]);
}

#[tokio::test]
async fn batch_replies_follow_request_order() {
    let out = run(concat!(
        r#"[{"id":3,"method":"Svc.Sum","params":[3,4]},"#,
        r#"{"id":0,"method":"Svc.Sum","params":[0,1]},"#,
        r#"{"method":"Svc.Sum","params":[3,4]},"#,
        r#"{"id":2,"method":"Svc.Err2"},"#,
        r#"{"id":1,"method":"Svc.Sum","params":[1,2]}]"#,
        "\n",
    ))
    .await;
    assert_eq!(
        out,
        vec![json!([
            {"id": 3, "result": 7, "error": null},
            {"id": 0, "result": 1, "error": null},
            {"id": 2, "error": {"code": 42, "message": "some issue"}},
            {"id": 1, "result": 3, "error": null},
        ])]
    );
}

#[tokio::test]
async fn empty_batch_is_invalid_request() {
    let out = run("[]\n").await;
    assert_eq!(
        out,
        vec![json!({"id": null, "error": {"code": -32600, "message": "Invalid request"}})]
    );
}

#[tokio::test]
async fn invalid_batch_elements_get_the_canned_reply() {
    let canned = json!([{"id": null, "error": {"code": -32600, "message": "Invalid request"}}]);
    let out = run("[null]\n[true]\n[[]]\n[{\"id\":5}]\n").await;
    assert_eq!(out.len(), 4);
    for response in out {
        assert_eq!(response, canned);
    }
}

#[tokio::test]
async fn batch_of_notifications_and_invalid_elements() {
    // the notifications contribute nothing; the nested array is canned
    let out = run(concat!(
        r#"[{"method":"Svc.Msg","params":["a"]},"#,
        r#"[{"method":"x"}],"#,
        r#"{"method":"Svc.Msg","params":["b"]}]"#,
        "\n",
    ))
    .await;
    assert_eq!(
        out,
        vec![json!([{"id": null, "error": {"code": -32600, "message": "Invalid request"}}])]
    );
}

#[tokio::test]
async fn all_notification_batch_writes_nothing() {
    let out = run(concat!(
        r#"[{"method":"Svc.Msg","params":["a"]},{"method":"Svc.Msg","params":["b"]}]"#,
        r#"{"id":3,"method":"Svc.Sum","params":[3,4]}"#,
        "\n",
    ))
    .await;
    assert_eq!(out, vec![json!({"id": 3, "result": 7, "error": null})]);
}

#[tokio::test]
async fn the_internal_batch_method_is_not_callable() {
    let out = run("{\"id\":0,\"method\":\"JSONRPC1.Batch\",\"params\":[]}\n").await;
    assert_eq!(out[0]["error"]["code"], json!(-32601));
}

#[tokio::test]
async fn context_reaches_handlers_and_batch_elements() {
    let (registry, _) = test_registry();
    let ctx = CallContext::with_metadata(
        [("peer".to_string(), json!("10.0.0.1"))].into_iter().collect(),
    );
    let out = run_with(
        registry,
        ctx,
        concat!(
            r#"{"id":0,"method":"Svc.Ctx"}"#,
            "\n",
            r#"[{"id":1,"method":"Svc.Ctx"}]"#,
            "\n",
        ),
    )
    .await;
    assert_eq!(out[0], json!({"id": 0, "result": "10.0.0.1", "error": null}));
    assert_eq!(out[1], json!([{"id": 1, "result": "10.0.0.1", "error": null}]));
}
