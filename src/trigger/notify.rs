//! Notification bus subscriber.
//!
//! Keeps a WAMP session open to the notification router, reconnecting with
//! a capped backoff whenever the connection drops.

use super::wamp::{self, WampMessage, CLOSE_GOODBYE_AND_OUT, CLOSE_SYSTEM_SHUTDOWN, SUBPROTOCOL};
use super::{wait_for_shutdown, NotifyError, ShutdownSignal, TriggerCoordinator};
use crate::config::NotifyConfig;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Request ID of the one subscription a session makes
const SUBSCRIBE_REQUEST: u64 = 1;

enum SessionEnd {
    Closed,
    Shutdown,
}

pub struct NotifyClient {
    config: NotifyConfig,
    coordinator: TriggerCoordinator,
}

impl NotifyClient {
    pub fn new(config: NotifyConfig, coordinator: TriggerCoordinator) -> Self {
        Self {
            config,
            coordinator,
        }
    }

    /// Stay subscribed until shutdown
    pub async fn run(&self, mut shutdown: watch::Receiver<ShutdownSignal>) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            let mut joined = false;
            match self.session(&mut shutdown, &mut joined).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Closed) => info!("Component lost connection."),
                Err(e) => warn!(server = %self.config.server, error = %e, "Notification session failed"),
            }

            if joined {
                backoff = INITIAL_BACKOFF;
            }
            debug!(?backoff, "Reconnecting to notification server");

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }

        info!("Notification client stopped");
    }

    async fn session(
        &self,
        shutdown: &mut watch::Receiver<ShutdownSignal>,
        joined: &mut bool,
    ) -> Result<SessionEnd, NotifyError> {
        let mut request = self.config.server.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));

        let (mut ws, _response) = connect_async(request).await?;
        ws.send(Message::Text(wamp::hello(&self.config.realm))).await?;

        let mut subscription = None;

        loop {
            let frame = tokio::select! {
                frame = ws.next() => frame,
                _ = wait_for_shutdown(shutdown) => {
                    let _ = ws.send(Message::Text(wamp::goodbye(CLOSE_SYSTEM_SHUTDOWN))).await;
                    let _ = ws.close(None).await;
                    return Ok(SessionEnd::Shutdown);
                }
            };

            let text = match frame {
                None | Some(Ok(Message::Close(_))) => return Ok(SessionEnd::Closed),
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            };

            let message = wamp::parse(&text)?;
            match &message {
                WampMessage::Welcome { session } => {
                    *joined = true;
                    info!(session, realm = %self.config.realm, "Component connected.");
                    self.coordinator.on_connected();
                    ws.send(Message::Text(wamp::subscribe(
                        SUBSCRIBE_REQUEST,
                        &self.config.topic,
                    )))
                    .await?;
                }
                WampMessage::Subscribed {
                    request: SUBSCRIBE_REQUEST,
                    subscription: id,
                } => {
                    debug!(topic = %self.config.topic, subscription = id, "Subscribed");
                    subscription = Some(*id);
                }
                WampMessage::Event { subscription: id, .. } => {
                    if subscription == Some(*id) {
                        self.coordinator.on_upload_finished(&message.event_filenames());
                    }
                }
                WampMessage::Abort { reason } => return Err(NotifyError::Aborted(reason.clone())),
                WampMessage::Goodbye { reason } => {
                    debug!(%reason, "Router closed the session");
                    let _ = ws.send(Message::Text(wamp::goodbye(CLOSE_GOODBYE_AND_OUT))).await;
                    return Ok(SessionEnd::Closed);
                }
                WampMessage::Error { request_type, error, .. } => {
                    return Err(NotifyError::Protocol(format!(
                        "request type {} failed: {}",
                        request_type, error
                    )));
                }
                other => debug!(?other, "Ignoring message"),
            }
        }
    }
}
