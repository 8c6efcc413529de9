use std::error::Error;
use std::net::SocketAddr;
use std::num::NonZeroU32;

use tokio::net::TcpListener;
use tokio::io::{ AsyncRead, AsyncWrite };

use tokio_tungstenite::{ accept_async, WebSocketStream };
use tokio_tungstenite::tungstenite::protocol::Message;

use lazy_static::lazy_static;
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };

use chrono::Utc;
use futures::{ SinkExt, StreamExt };
use log::{ info, warn, error };

use crate::error::RelayError;
use crate::models::websocket::{ ClientMessage, ServerMessage };
use crate::relay::ChatRelay;
use super::AppContext;

const MAX_MESSAGE_SIZE: usize = 1 * 1024 * 1024;

lazy_static! {
    static ref CONNECTION_LIMITER: RateLimiter<NotKeyed, InMemoryState, DefaultClock> =
        RateLimiter::direct(Quota::per_second(NonZeroU32::new(10).unwrap()));
}

pub async fn start_ws_server(
    addr: &str,
    context: AppContext
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    info!("WS server listening on: {}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;

        if CONNECTION_LIMITER.check().is_err() {
            warn!("Global connection rate limit exceeded for {}. Dropping connection.", peer);
            continue;
        }

        info!("Incoming connection from: {}", peer);
        let context_clone = context.clone();

        tokio::spawn(async move {
            match accept_async(stream).await {
                Ok(ws) => handle_connection(peer, ws, context_clone).await,
                Err(e) => error!("Handshake failed for {}: {}", peer, e),
            }
        });
    }
}

pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    context: AppContext
)
    where S: AsyncRead + AsyncWrite + Unpin
{
    info!("New WebSocket connection: {}", peer);

    let (mut tx, mut rx) = websocket.split();
    let mut session = context.new_session();

    // Every connection starts with its own fresh conversation.
    match session.init_conversation().await {
        Ok(id) => {
            let started = ServerMessage::ConversationStarted { id };
            if send(&mut tx, &started).await.is_err() {
                error!("Failed to send conversation_started to {}", peer);
                return;
            }
        }
        Err(e) => {
            error!("Failed to start conversation for {}: {}", peer, e);
            let _ = send(&mut tx, &(ServerMessage::Error { message: e.to_string() })).await;
            return;
        }
    }

    while let Some(msg) = rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if text.len() > MAX_MESSAGE_SIZE {
                    warn!(
                        "Message from {} exceeds size limit ({} > {})",
                        peer,
                        text.len(),
                        MAX_MESSAGE_SIZE
                    );
                    let too_large = ServerMessage::Error {
                        message: "Message too large".to_string(),
                    };
                    let _ = send(&mut tx, &too_large).await;
                    break;
                }

                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_message) => {
                        if matches!(client_message, ClientMessage::Chat { .. }) {
                            if let Err(e) = send(&mut tx, &ServerMessage::Processing).await {
                                error!("Error sending processing status to {}: {}", peer, e);
                                break;
                            }
                        }

                        let reply = match dispatch(&mut session, client_message).await {
                            Ok(reply) => reply,
                            Err(e) => {
                                error!("Request from {} failed: {}", peer, e);
                                ServerMessage::Error { message: e.to_string() }
                            }
                        };
                        if let Err(e) = send(&mut tx, &reply).await {
                            error!("Error sending reply to {}: {}", peer, e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Failed to parse message from {}: {}", peer, e);
                        let parse_error = ServerMessage::Error {
                            message: format!("Failed to parse message: {}", e),
                        };
                        if send(&mut tx, &parse_error).await.is_err() {
                            break;
                        }
                    }
                }
            }
            Ok(Message::Close(_)) => {
                info!("Received close frame from {}", peer);
                break;
            }
            Ok(Message::Ping(ping_data)) => {
                if tx.send(Message::Pong(ping_data)).await.is_err() {
                    error!("Failed to send pong to {}", peer);
                    break;
                }
            }
            Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
            Ok(Message::Binary(_)) => {
                warn!("Ignoring binary message from {}", peer);
            }
            Err(e) => {
                match e {
                    | tokio_tungstenite::tungstenite::Error::ConnectionClosed
                    | tokio_tungstenite::tungstenite::Error::Protocol(_)
                    | tokio_tungstenite::tungstenite::Error::Utf8 => {
                        info!("WebSocket connection closed or protocol error for {}: {}", peer, e);
                    }
                    tokio_tungstenite::tungstenite::Error::Io(ref io_err) if
                        io_err.kind() == std::io::ErrorKind::ConnectionReset
                    => {
                        info!("WebSocket connection reset by peer {}", peer);
                    }
                    _ => {
                        error!("Error receiving message from {}: {}", peer, e);
                    }
                }
                break;
            }
        }
    }

    info!(
        "WebSocket connection closed for {} (Conv ID: {})",
        peer,
        session.current_conversation_id().unwrap_or("none")
    );
}

async fn dispatch(
    session: &mut ChatRelay,
    message: ClientMessage
) -> Result<ServerMessage, RelayError> {
    match message {
        ClientMessage::Chat { content, temperature } => {
            let response = session.generate(&content, temperature).await?;
            Ok(ServerMessage::Response {
                content: response,
                timestamp: Utc::now().timestamp_millis(),
            })
        }
        ClientMessage::Clear => {
            let id = session.clear_current_conversation().await?;
            Ok(ServerMessage::Cleared { id })
        }
        ClientMessage::ListConversations => {
            let conversations = session.list_conversations().await?;
            Ok(ServerMessage::Conversations { conversations })
        }
        ClientMessage::LoadConversation { id } => {
            session.load_conversation(&id).await?;
            Ok(ServerMessage::Loaded { id })
        }
        ClientMessage::ListModels => {
            let models = session.available_models().await?;
            Ok(ServerMessage::Models { models })
        }
        ClientMessage::SetModel { name } => {
            session.set_model(&name);
            Ok(ServerMessage::ModelSet { model: name })
        }
    }
}

async fn send<S>(
    tx: &mut S,
    message: &ServerMessage
) -> Result<(), S::Error>
    where S: SinkExt<Message> + Unpin
{
    let json = serde_json::to_string(message).unwrap();
    tx.send(Message::Text(json)).await
}
