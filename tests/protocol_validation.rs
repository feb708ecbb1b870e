//! Protocol validation tests for the Maelstrom node.
//!
//! Each test feeds newline-delimited envelopes to a [`Node`] over an
//! in-memory pipe and inspects what the node writes back:
//! 1. Initialization: `init_ok`, and rejection of requests before or after it
//! 2. Error replies: unsupported, malformed and crash codes
//! 3. Dissemination: `update` batches to neighbors and `update_ok` replies

#![cfg(feature = "tokio")]

use std::time::Duration;

use maelstrom_broadcast::{maelstrom::Node, BroadcastConfig, Error};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const NODE: &str = "n1";
const CLIENT: &str = "c1";

fn config() -> BroadcastConfig {
    BroadcastConfig::default().with_gossip_interval(Duration::from_millis(20))
}

fn envelope(src: &str, body: Value) -> Value {
    json!({ "src": src, "dest": NODE, "body": body })
}

fn init(msg_id: u64) -> Value {
    envelope(
        "c0",
        json!({ "type": "init", "msg_id": msg_id, "node_id": NODE, "node_ids": ["n0", "n1", "n2"] }),
    )
}

/// Output of one node run.
struct Exchange {
    result: maelstrom_broadcast::Result<()>,
    output: Vec<Value>,
}

impl Exchange {
    /// The reply correlated with request `msg_id` from `to`.
    fn reply(&self, to: &str, msg_id: u64) -> &Value {
        self.output
            .iter()
            .find(|env| env["dest"] == to && env["body"]["in_reply_to"] == msg_id)
            .unwrap_or_else(|| panic!("no reply to {} #{} in {:#?}", to, msg_id, self.output))
    }

    /// Bodies of every message sent to `dest` with the given type.
    fn sent(&self, dest: &str, kind: &str) -> Vec<&Value> {
        self.output
            .iter()
            .filter(|env| env["dest"] == dest && env["body"]["type"] == kind)
            .map(|env| &env["body"])
            .collect()
    }
}

/// Feed `input` lines, wait `settle`, then close the input and collect output.
async fn run_lines(input: Vec<String>, settle: Duration) -> Exchange {
    let (mut client_in, node_in) = tokio::io::duplex(64 * 1024);
    let (node_out, client_out) = tokio::io::duplex(64 * 1024);

    let feed = async move {
        for line in input {
            if client_in.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if client_in.write_all(b"\n").await.is_err() {
                break;
            }
        }
        tokio::time::sleep(settle).await;
        drop(client_in);
    };

    let collect = async move {
        let mut lines = BufReader::new(client_out).lines();
        let mut output = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            output.push(serde_json::from_str::<Value>(&line).unwrap());
        }
        output
    };

    let (result, (), output) = tokio::join!(
        Node::new(config()).run(BufReader::new(node_in), node_out),
        feed,
        collect
    );

    Exchange { result, output }
}

async fn run(requests: Vec<Value>, settle: Duration) -> Exchange {
    run_lines(requests.iter().map(Value::to_string).collect(), settle).await
}

#[tokio::test]
async fn test_init_ok() {
    let exchange = run(vec![init(1)], Duration::from_millis(50)).await;

    assert!(exchange.result.is_ok());
    let reply = exchange.reply("c0", 1);
    assert_eq!(reply["src"], NODE);
    assert_eq!(reply["body"]["type"], "init_ok");
    assert!(reply["body"]["msg_id"].is_u64());
}

#[tokio::test]
async fn test_request_before_init_is_temporarily_unavailable() {
    let exchange = run(
        vec![envelope(CLIENT, json!({ "type": "read", "msg_id": 1 }))],
        Duration::from_millis(50),
    )
    .await;

    let body = &exchange.reply(CLIENT, 1)["body"];
    assert_eq!(body["type"], "error");
    assert_eq!(body["code"], 11);
}

#[tokio::test]
async fn test_second_init_is_rejected() {
    let exchange = run(vec![init(1), init(2)], Duration::from_millis(50)).await;

    assert_eq!(exchange.reply("c0", 1)["body"]["type"], "init_ok");
    let body = &exchange.reply("c0", 2)["body"];
    assert_eq!(body["type"], "error");
    assert_eq!(body["code"], 22);
}

#[tokio::test]
async fn test_unknown_type_is_not_supported() {
    let exchange = run(
        vec![
            init(1),
            envelope(CLIENT, json!({ "type": "cas", "msg_id": 2, "key": 1 })),
        ],
        Duration::from_millis(50),
    )
    .await;

    let body = &exchange.reply(CLIENT, 2)["body"];
    assert_eq!(body["type"], "error");
    assert_eq!(body["code"], 10);
}

#[tokio::test]
async fn test_malformed_requests() {
    let exchange = run(
        vec![
            init(1),
            envelope(CLIENT, json!({ "type": "broadcast", "msg_id": 2, "message": "abc" })),
            envelope(CLIENT, json!({ "type": "broadcast", "msg_id": 3, "message": -4 })),
            envelope(CLIENT, json!({ "type": "broadcast", "msg_id": 4 })),
        ],
        Duration::from_millis(50),
    )
    .await;

    for msg_id in 2..=4 {
        let body = &exchange.reply(CLIENT, msg_id)["body"];
        assert_eq!(body["type"], "error");
        assert_eq!(body["code"], 12);
    }
    assert!(exchange.result.is_ok());
}

#[tokio::test]
async fn test_undecodable_lines_are_skipped() {
    let input = vec![
        init(1).to_string(),
        "not json".to_string(),
        String::new(),
        "[1, 2, 3]".to_string(),
        envelope(CLIENT, json!({ "type": "read", "msg_id": 2 })).to_string(),
    ];
    let exchange = run_lines(input, Duration::from_millis(50)).await;

    assert!(exchange.result.is_ok());
    assert_eq!(exchange.reply(CLIENT, 2)["body"]["type"], "read_ok");
    assert_eq!(exchange.output.len(), 2);
}

#[tokio::test]
async fn test_topology_and_broadcast_are_acknowledged() {
    let exchange = run(
        vec![
            init(1),
            envelope(CLIENT, json!({ "type": "topology", "msg_id": 2, "topology": { "n1": [] } })),
            envelope(CLIENT, json!({ "type": "broadcast", "msg_id": 3, "message": 30 })),
            envelope(CLIENT, json!({ "type": "broadcast", "msg_id": 4, "message": 4 })),
            envelope(CLIENT, json!({ "type": "broadcast", "msg_id": 5, "message": 30 })),
        ],
        Duration::from_millis(50),
    )
    .await;

    assert_eq!(exchange.reply(CLIENT, 2)["body"]["type"], "topology_ok");
    for msg_id in 3..=5 {
        assert_eq!(exchange.reply(CLIENT, msg_id)["body"]["type"], "broadcast_ok");
    }
}

#[tokio::test]
async fn test_read_returns_sorted_messages() {
    let (mut client_in, node_in) = tokio::io::duplex(64 * 1024);
    let (node_out, client_out) = tokio::io::duplex(64 * 1024);
    let mut replies = BufReader::new(client_out).lines();

    let script = async move {
        let mut requests = vec![init(1)];
        for (msg_id, message) in [(2, 30), (3, 4), (4, 17)] {
            requests.push(envelope(
                CLIENT,
                json!({ "type": "broadcast", "msg_id": msg_id, "message": message }),
            ));
        }
        for request in requests {
            client_in
                .write_all(format!("{}\n", request).as_bytes())
                .await
                .unwrap();
        }

        // Wait for every broadcast_ok before reading
        let mut acked = 0;
        while acked < 3 {
            let line = replies.next_line().await.unwrap().unwrap();
            let reply: Value = serde_json::from_str(&line).unwrap();
            if reply["body"]["type"] == "broadcast_ok" {
                acked += 1;
            }
        }

        let read = envelope(CLIENT, json!({ "type": "read", "msg_id": 5 }));
        client_in
            .write_all(format!("{}\n", read).as_bytes())
            .await
            .unwrap();
        let line = replies.next_line().await.unwrap().unwrap();
        drop(client_in);
        serde_json::from_str::<Value>(&line).unwrap()
    };

    let (result, read_ok) = tokio::join!(
        Node::new(config()).run(BufReader::new(node_in), node_out),
        script
    );

    assert!(result.is_ok());
    assert_eq!(read_ok["body"]["type"], "read_ok");
    assert_eq!(read_ok["body"]["in_reply_to"], 5);
    assert_eq!(read_ok["body"]["messages"], json!([4, 17, 30]));
}

#[tokio::test]
async fn test_missing_topology_entry_crashes() {
    let exchange = run(
        vec![
            init(1),
            envelope(CLIENT, json!({ "type": "topology", "msg_id": 2, "topology": { "n0": ["n2"] } })),
        ],
        Duration::from_millis(100),
    )
    .await;

    let body = &exchange.reply(CLIENT, 2)["body"];
    assert_eq!(body["type"], "error");
    assert_eq!(body["code"], 13);
    assert!(matches!(exchange.result, Err(Error::MissingTopology(_))));
}

#[tokio::test]
async fn test_updates_sent_to_neighbors() {
    let exchange = run(
        vec![
            init(1),
            envelope(
                CLIENT,
                json!({ "type": "topology", "msg_id": 2, "topology": { "n1": ["n0", "n2"], "n0": ["n1"], "n2": ["n1"] } }),
            ),
            envelope(CLIENT, json!({ "type": "broadcast", "msg_id": 3, "message": 8 })),
        ],
        Duration::from_millis(200),
    )
    .await;

    for neighbor in ["n0", "n2"] {
        let updates = exchange.sent(neighbor, "update");
        // Unacknowledged, so resent every round
        assert!(updates.len() >= 2, "{} got {:?}", neighbor, updates);
        assert!(updates.iter().all(|body| body["messages"] == json!([8])));
    }
    assert!(exchange.sent(CLIENT, "update").is_empty());
}

#[tokio::test]
async fn test_update_is_acknowledged_and_learned() {
    let exchange = run(
        vec![
            init(1),
            envelope(
                CLIENT,
                json!({ "type": "topology", "msg_id": 2, "topology": { "n1": ["n2"] } }),
            ),
            envelope("n2", json!({ "type": "update", "msg_id": 7, "messages": [1, 2] })),
            envelope("n2", json!({ "type": "update_ok", "msg_id": 8, "messages": [1, 2] })),
        ],
        Duration::from_millis(200),
    )
    .await;

    let ack = &exchange.reply("n2", 7)["body"];
    assert_eq!(ack["type"], "update_ok");
    assert_eq!(ack["messages"], json!([1, 2]));

    // update_ok gets no reply
    assert!(exchange
        .output
        .iter()
        .all(|env| env["body"]["in_reply_to"] != 8));
}
