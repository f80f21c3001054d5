use std::{
    convert::Infallible,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::Utc;
use futures_util::Stream;
use log::info;
use stagepass_core::{RoomEvent, Subscriber, SubscriberHandle};

use crate::{
    context::{ServerContext, ServerGateway},
    errors::ServerResult,
    schemas::EventStreamParams,
};

/// Adapts a hub subscription into SSE frames
pub struct EventStream {
    handle: SubscriberHandle,
}

impl Stream for EventStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.handle).poll_next(cx) {
            Poll::Ready(Some(event)) => {
                let data = serde_json::to_string(&event).expect("serializes properly");

                Poll::Ready(Some(Ok(Event::default().data(data))))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}/events",
    tag = "events",
    params(
        ("id" = i32, Path, description = "The room to watch"),
        EventStreamParams
    ),
    responses(
        (
            status = 200,
            content_type = "text/event-stream",
            description = "One immediate status event, then a stream of status changes and keepalives"
        )
    )
)]
pub async fn room_events(
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
    Query(params): Query<EventStreamParams>,
) -> ServerResult<Sse<EventStream>> {
    let gateway = context.gateway.clone();

    gateway.access.check_access(&params.token, room_id).await?;

    let room = gateway.room(room_id).await?;
    let handle = gateway.hub().register(room_id);

    // The contract promises one status event up front
    handle.push(RoomEvent::status(room.is_active, Utc::now()));

    spawn_watchdog(
        gateway.clone(),
        handle.subscriber(),
        params.token,
        room_id,
    );

    Ok(Sse::new(EventStream { handle })
        .keep_alive(KeepAlive::new().interval(gateway.config().keepalive_interval)))
}

/// Re-checks access for one connection at the keepalive cadence, and ends
/// the connection the moment its session is denied. Revocation and grace
/// expiry reach live viewers through here.
fn spawn_watchdog(
    gateway: Arc<ServerGateway>,
    subscriber: Subscriber,
    token: String,
    room_id: i32,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(gateway.config().keepalive_interval);

        // The first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = subscriber.closed() => break,
                _ = interval.tick() => {
                    if let Err(denial) = gateway.access.check_access(&token, room_id).await {
                        info!("Closing room {} connection: {}", room_id, denial);

                        subscriber.close();
                        break;
                    }
                }
            }
        }

        // Leaving the stream ends the session either way
        let _ = gateway.access.disconnect(&token).await;
    });
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::StreamExt;
    use stagepass_core::{
        AccessCodeData, ClientInfo, CodeScope, Gateway, GatewayConfig, MemoryDatabase,
        MemoryDirectory, NewCode, RoomInfo,
    };

    use super::*;

    const ROOM: i32 = 1;

    fn context() -> ServerContext {
        let directory = Arc::new(MemoryDirectory::new());

        directory.insert(RoomInfo {
            id: ROOM,
            studio_id: 10,
            is_active: true,
        });

        let gateway = Arc::new(Gateway::with_shared(
            Arc::new(MemoryDatabase::new()),
            directory.clone(),
            GatewayConfig {
                keepalive_interval: Duration::from_millis(25),
                ..Default::default()
            },
        ));

        ServerContext { gateway, directory }
    }

    async fn admitted(context: &ServerContext) -> (AccessCodeData, String) {
        let code = context
            .gateway
            .codes
            .create_code(NewCode {
                scope: CodeScope::Room,
                target_id: ROOM,
                created_by: 7,
                expires_at: Utc::now() + chrono::Duration::hours(1),
                max_viewers: 0,
                label: "premiere".to_string(),
            })
            .await
            .unwrap();

        let session = context
            .gateway
            .access
            .admit(
                &code.code,
                ROOM,
                ClientInfo {
                    ip: "127.0.0.1".to_string(),
                    agent: "test".to_string(),
                },
            )
            .await
            .unwrap();

        (code, session.token)
    }

    #[tokio::test]
    async fn streams_deny_unknown_tokens_and_register_valid_ones() {
        let context = context();
        let (_, token) = admitted(&context).await;

        let denied = room_events(
            State(context.clone()),
            Path(ROOM),
            Query(EventStreamParams {
                token: "bogus".to_string(),
            }),
        )
        .await;

        assert!(denied.is_err());
        assert_eq!(context.gateway.hub().subscriber_count(ROOM), 0);

        let response = room_events(
            State(context.clone()),
            Path(ROOM),
            Query(EventStreamParams { token }),
        )
        .await;

        assert!(response.is_ok());
        assert_eq!(context.gateway.hub().subscriber_count(ROOM), 1);
    }

    #[tokio::test]
    async fn the_stream_opens_with_a_status_event_and_ends_on_revocation() {
        let context = context();
        let (code, token) = admitted(&context).await;
        let gateway = context.gateway.clone();

        let room = gateway.room(ROOM).await.unwrap();
        let handle = gateway.hub().register(ROOM);
        handle.push(RoomEvent::status(room.is_active, Utc::now()));
        spawn_watchdog(gateway.clone(), handle.subscriber(), token, ROOM);

        let mut stream = EventStream { handle };

        // The status payload is there before any broadcast happens
        assert!(stream.next().await.is_some());

        gateway.codes.revoke(&code.code).await.unwrap();

        // The watchdog notices on one of its next checks and ends the stream
        let end = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("the stream ends after revocation");
        assert!(end.is_none());

        // Teardown frees the viewer slot exactly once
        tokio::time::sleep(Duration::from_millis(50)).await;

        let snapshot = gateway.analytics().snapshot(code.id);
        assert_eq!(snapshot.current_viewers, 0);
        assert_eq!(snapshot.total_connections, 1);
    }

    #[tokio::test]
    async fn a_dropped_stream_ends_its_session() {
        let context = context();
        let (code, token) = admitted(&context).await;
        let gateway = context.gateway.clone();

        let handle = gateway.hub().register(ROOM);
        spawn_watchdog(gateway.clone(), handle.subscriber(), token, ROOM);
        let stream = EventStream { handle };

        assert_eq!(gateway.analytics().current_viewers(code.id), 1);

        // The client went away
        drop(stream);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!gateway.hub().has_room(ROOM));
        assert_eq!(gateway.analytics().current_viewers(code.id), 0);
    }
}
