//! Real-time job change feed over Server-Sent Events.
//!
//! One persistent subscription per connected client, filtered to the
//! authenticated tenant. Clients merge `insert`/`update`/`delete` events into
//! their local view and re-fetch the full list to recover from gaps.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Extension,
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse,
    },
};
use tokio::sync::mpsc::unbounded_channel;
use tokio_stream::wrappers::UnboundedReceiverStream;

use syncgate_events::TenantScoped;
use syncgate_jobs::JobStore;

use crate::app::services::AppServices;
use crate::context::TenantContext;

/// GET /integrations/jobs/stream
///
/// Each event carries the full job record as JSON; the SSE event name is the
/// change kind (`insert`/`update`/`delete`). Heartbeats keep proxies from
/// closing idle connections.
pub async fn stream_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    let tenant_id = tenant.tenant_id();

    let (tx, rx) = unbounded_channel::<Result<SseEvent, std::convert::Infallible>>();

    let subscription = services.store().changes();
    tokio::task::spawn_blocking(move || {
        let mut last_heartbeat = std::time::Instant::now();

        loop {
            match subscription.recv_timeout(Duration::from_millis(1000)) {
                Ok(change) => {
                    // Scope the feed to the session's authorization boundary.
                    if change.tenant_id() != tenant_id {
                        continue;
                    }

                    let data = match serde_json::to_string(change.record()) {
                        Ok(s) => s,
                        Err(_) => continue,
                    };

                    let sse_event = SseEvent::default().event(change.kind()).data(data);
                    if tx.send(Ok(sse_event)).is_err() {
                        break; // Receiver dropped
                    }

                    last_heartbeat = std::time::Instant::now();
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    if last_heartbeat.elapsed() > Duration::from_secs(15) {
                        let heartbeat = SseEvent::default().event("heartbeat").data("{}");
                        if tx.send(Ok(heartbeat)).is_err() {
                            break;
                        }
                        last_heartbeat = std::time::Instant::now();
                    }
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    break; // Feed closed
                }
            }
        }
    });

    let stream = UnboundedReceiverStream::new(rx);
    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}
