use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Thin wrapper driving the `{type, data}` wire envelope directly, rather
/// than through `vidmesh_api::ws::protocol`'s typed enums (those derive only
/// `Deserialize`/`Serialize` on the side a real client never needs — the
/// client side is exactly what this black-box suite plays).
pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn connect(url: &str) -> Self {
        let (stream, _) = connect_async(url).await.expect("ws connect failed");
        Self { stream }
    }

    pub async fn send(&mut self, msg_type: &str, data: Value) {
        let envelope = serde_json::json!({ "type": msg_type, "data": data });
        self.stream
            .send(Message::text(envelope.to_string()))
            .await
            .expect("ws send failed");
    }

    /// Reads the next text frame as JSON, transparently skipping ping/pong.
    pub async fn recv(&mut self) -> Value {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(&text).expect("server sent non-JSON frame")
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(other)) => panic!("unexpected frame: {other:?}"),
                Some(Err(e)) => panic!("ws error: {e}"),
                None => panic!("ws closed before expected message"),
            }
        }
    }

    /// Like `recv`, but returns `None` on timeout instead of panicking —
    /// used to assert an event does *not* arrive (testable property 5, S4).
    pub async fn try_recv_timeout(&mut self, dur: std::time::Duration) -> Option<Value> {
        tokio::time::timeout(dur, self.recv()).await.ok()
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
