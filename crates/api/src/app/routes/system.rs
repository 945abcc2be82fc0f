use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use tokio::sync::mpsc::unbounded_channel;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use shopfront_events::EventBus;

use crate::app::errors::ApiResult;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

const HEARTBEAT_EVERY: Duration = Duration::from_secs(15);

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "user_id": principal.user_id().to_string(),
        "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "permissions": principal
            .principal()
            .permissions
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>(),
    }))
}

/// GET /admin/stream
///
/// Committed store events as Server-Sent Events, one `event: <topic>` frame
/// per change, with a heartbeat frame when the bus is quiet.
pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&principal, "orders.read")?;

    let (tx, rx) = unbounded_channel::<Result<SseEvent, std::convert::Infallible>>();
    let subscription = services.bus.subscribe();

    // The bus hands out std receivers; forward them from a blocking thread.
    tokio::task::spawn_blocking(move || {
        let mut last_frame = Instant::now();
        loop {
            match subscription.recv_timeout(Duration::from_millis(1000)) {
                Ok(event) => {
                    let data = match serde_json::to_string(&event) {
                        Ok(s) => s,
                        Err(_) => continue,
                    };
                    let frame = SseEvent::default().event(event.topic.as_str()).data(data);
                    if tx.send(Ok(frame)).is_err() {
                        break;
                    }
                    last_frame = Instant::now();
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    if tx.is_closed() {
                        break;
                    }
                    if last_frame.elapsed() > HEARTBEAT_EVERY {
                        let heartbeat = SseEvent::default().event("heartbeat").data("{}");
                        if tx.send(Ok(heartbeat)).is_err() {
                            break;
                        }
                        last_frame = Instant::now();
                    }
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("event stream closed");
    });

    Ok(Sse::new(UnboundedReceiverStream::new(rx))
        .keep_alive(KeepAlive::new().interval(HEARTBEAT_EVERY))
        .into_response())
}
