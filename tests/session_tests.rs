use std::net::SocketAddr;
use std::time::Duration;

use daikin_bridge::{ConnectionStatus, DeviceSessionBuilder, Error, SessionEvent};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

/// In-process stand-in for the device's WebSocket endpoint. Returns the bound
/// address, a sender for pushing state documents to the client, and a
/// receiver yielding the text frames the client sent.
async fn start_device_stub() -> (SocketAddr, mpsc::Sender<String>, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (push_tx, mut push_rx) = mpsc::channel::<String>(8);
    let (recv_tx, recv_rx) = mpsc::channel::<String>(8);

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (mut sink, mut source) = ws.split();
        loop {
            tokio::select! {
                doc = push_rx.recv() => match doc {
                    Some(doc) => {
                        if sink.send(Message::Text(doc.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let _ = recv_tx.send(text.to_string()).await;
                    }
                    Some(Ok(_)) => {}
                    _ => break,
                },
            }
        }
    });

    (addr, push_tx, recv_rx)
}

fn full_document(target_mode: &str, current: f64, target: f64) -> String {
    json!({
        "targetMode": target_mode,
        "verticalSwing": true,
        "horizontalSwing": true,
        "quietMode": false,
        "powerfulMode": false,
        "currentTemperature": current,
        "currentHumidity": 45.0,
        "targetFanSpeed": "auto",
        "targetTemperature": target,
    })
    .to_string()
}

#[tokio::test]
async fn session_connects_and_reports_status() {
    let (addr, _push, _recv) = start_device_stub().await;
    let session = DeviceSessionBuilder::fixed("test-ac", format!("ws://{addr}")).spawn();
    let mut events = session.subscribe();

    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no status event")
        .unwrap();
    assert!(matches!(
        event,
        SessionEvent::Status(ConnectionStatus::Connected)
    ));
    assert!(session.is_connected());
}

#[tokio::test]
async fn send_while_disconnected_fails_immediately() {
    // Nothing is listening here; the session keeps retrying in the
    // background while send fails fast.
    let session = DeviceSessionBuilder::fixed("test-ac", "ws://127.0.0.1:9").spawn();
    let err = session.send(json!({"targetMode": "off"})).await.unwrap_err();
    assert!(matches!(err, Error::NotConnected));
}

#[tokio::test]
async fn inbound_documents_delivered_in_receipt_order() {
    let (addr, push, _recv) = start_device_stub().await;
    let session = DeviceSessionBuilder::fixed("test-ac", format!("ws://{addr}")).spawn();
    let mut events = session.subscribe();

    // First event is the connect status.
    timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();

    push.send(full_document("cool", 24.0, 22.0)).await.unwrap();
    push.send(full_document("heat", 18.0, 21.0)).await.unwrap();

    let first = timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    let second = timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();

    match (first, second) {
        (SessionEvent::Document(a), SessionEvent::Document(b)) => {
            assert_eq!(a["targetMode"], "cool");
            assert_eq!(b["targetMode"], "heat");
        }
        other => panic!("expected two documents, got {other:?}"),
    }
}

#[tokio::test]
async fn outbound_fragment_reaches_device() {
    let (addr, _push, mut recv) = start_device_stub().await;
    let session = DeviceSessionBuilder::fixed("test-ac", format!("ws://{addr}")).spawn();
    let mut events = session.subscribe();
    timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();

    session.send(json!({"targetMode": "heat"})).await.unwrap();

    let frame = timeout(Duration::from_secs(5), recv.recv())
        .await
        .expect("device saw no frame")
        .unwrap();
    let body: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(body, json!({"targetMode": "heat"}));
}

#[tokio::test]
async fn fragment_sent_at_connect_instant_is_delivered() {
    let (addr, _push, mut recv) = start_device_stub().await;
    let session = DeviceSessionBuilder::fixed("test-ac", format!("ws://{addr}")).spawn();
    let mut events = session.subscribe();

    // Send at the earliest moment the session admits to being connected.
    // A send accepted here must reach the socket; in particular it must not
    // be swept up by the stale-fragment drain that runs at connect time.
    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        event,
        SessionEvent::Status(ConnectionStatus::Connected)
    ));
    session.send(json!({"targetMode": "cool"})).await.unwrap();

    let frame = timeout(Duration::from_secs(5), recv.recv())
        .await
        .expect("accepted command never reached the device")
        .unwrap();
    let body: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(body, json!({"targetMode": "cool"}));
}

#[tokio::test]
async fn malformed_inbound_document_is_skipped() {
    let (addr, push, _recv) = start_device_stub().await;
    let session = DeviceSessionBuilder::fixed("test-ac", format!("ws://{addr}")).spawn();
    let mut events = session.subscribe();
    timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();

    push.send("this is not json".to_string()).await.unwrap();
    push.send(full_document("auto", 23.0, 23.0)).await.unwrap();

    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        SessionEvent::Document(doc) => assert_eq!(doc["targetMode"], "auto"),
        other => panic!("expected the valid document, got {other:?}"),
    }
}

#[tokio::test]
async fn shutdown_stops_accepting_commands() {
    let (addr, _push, _recv) = start_device_stub().await;
    let session = DeviceSessionBuilder::fixed("test-ac", format!("ws://{addr}")).spawn();
    let mut events = session.subscribe();
    timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();

    session.shutdown();
    // The connection flag drops once the loop observes cancellation.
    timeout(Duration::from_secs(5), async {
        while session.is_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session never shut down");

    let err = session.send(json!({"targetMode": "off"})).await.unwrap_err();
    assert!(matches!(err, Error::NotConnected));
}
