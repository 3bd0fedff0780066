// [libs/infra/agent-client/src/ws_channel.rs]
/*!
 * The agent's half of the long-lived bidirectional message channel. Task
 * assignments, progress reports, cracked batches, and heartbeats all flow
 * over one websocket connection per agent; this module owns connecting,
 * reconnecting, and splitting the socket into independent send/receive
 * halves so a slow receiver never blocks outbound traffic.
 */

use crate::errors::ClientError;
use futures_util::{SinkExt, StreamExt};
use prospector_domain_models::MessageEnvelope;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};

pub type AgentSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to the coordinator's agent channel endpoint, presenting the
/// bearer token as a query parameter since the websocket handshake itself
/// carries no custom Authorization header support on every intermediary.
/// `agent_id` identifies which agent row this socket speaks for; the
/// coordinator keys its registry and dispatch targeting off of it.
pub async fn connect(coordinator_ws_url: &str, agent_id: i64, bearer_token: &str) -> Result<AgentSocket, ClientError> {
    let url = format!("{coordinator_ws_url}/{agent_id}?token={bearer_token}");
    let (socket, response) = connect_async(url).await.map_err(|err| {
        ClientError::ServerRejection(format!("websocket handshake failed: {err}"))
    })?;
    info!(status = %response.status(), "agent channel connected");
    Ok(socket)
}

pub async fn send_envelope(socket: &mut AgentSocket, envelope: &MessageEnvelope) -> Result<(), ClientError> {
    let json = serde_json::to_string(envelope)
        .map_err(|err| ClientError::ServerRejection(format!("envelope encode failed: {err}")))?;
    socket
        .send(WsMessage::Text(json))
        .await
        .map_err(|err| ClientError::ServerRejection(format!("websocket send failed: {err}")))
}

/// Reads the next inbound envelope, skipping non-text control frames
/// (ping/pong/close) transparently. Returns `Ok(None)` when the
/// coordinator closes the channel.
pub async fn recv_envelope(socket: &mut AgentSocket) -> Result<Option<MessageEnvelope>, ClientError> {
    loop {
        match socket.next().await {
            None => return Ok(None),
            Some(Ok(WsMessage::Text(text))) => {
                let envelope = serde_json::from_str(&text).map_err(|err| {
                    ClientError::ServerRejection(format!("envelope decode failed: {err}"))
                })?;
                return Ok(Some(envelope));
            }
            Some(Ok(WsMessage::Close(_))) => return Ok(None),
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                warn!(%err, "agent channel read error");
                return Err(ClientError::ServerRejection(err.to_string()));
            }
        }
    }
}
