use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};

use futures_util::Stream;
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;

use crate::{events::RoomEvent, util::Id, PrimaryKey};

pub type SubscriberId = Id<Subscriber>;

/// The process-local fan-out registry for room-status push connections.
///
/// One reader/writer lock guards the registry structure only; events are
/// delivered to a snapshot of the subscribers outside the lock, so one
/// slow consumer can never stall registration or the other deliveries.
pub struct BroadcastHub {
    me: Weak<Self>,
    rooms: RwLock<HashMap<PrimaryKey, Vec<Subscriber>>>,
}

/// One open push connection, as the hub sees it
#[derive(Clone)]
pub struct Subscriber {
    id: SubscriberId,
    inner: Arc<SubscriberInner>,
}

struct SubscriberInner {
    pending: Mutex<VecDeque<RoomEvent>>,
    waker: Mutex<Option<Waker>>,
    closed: AtomicBool,
    close_signal: Notify,
}

/// The receiving end of a registration. Yields broadcast events as a
/// stream, ends the stream when closed from either side, and unregisters
/// from the hub when dropped.
pub struct SubscriberHandle {
    id: SubscriberId,
    room_id: PrimaryKey,
    inner: Arc<SubscriberInner>,
    hub: Weak<BroadcastHub>,
}

impl BroadcastHub {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            rooms: Default::default(),
        })
    }

    /// Adds a push connection for a room.
    pub fn register(&self, room_id: PrimaryKey) -> SubscriberHandle {
        let subscriber = Subscriber::new();
        let handle = subscriber.handle(room_id, self.me.clone());

        self.rooms
            .write()
            .entry(room_id)
            .or_default()
            .push(subscriber);

        handle
    }

    /// Removes a connection by identity. A no-op when it is already gone,
    /// since teardown can race in from both the client and the server
    /// side. An emptied room is dropped from the registry entirely.
    pub fn unregister(&self, room_id: PrimaryKey, id: SubscriberId) {
        let mut rooms = self.rooms.write();

        if let Some(subscribers) = rooms.get_mut(&room_id) {
            subscribers.retain(|s| s.id != id);

            if subscribers.is_empty() {
                rooms.remove(&room_id);
            }
        }
    }

    /// Fans an event out to every open connection of a room. Best effort:
    /// a connection that has gone away is skipped or logged, never allowed
    /// to affect the rest.
    pub fn broadcast(&self, room_id: PrimaryKey, event: RoomEvent) {
        let targets: Vec<Subscriber> = {
            let rooms = self.rooms.read();

            rooms
                .get(&room_id)
                .map(|subscribers| subscribers.to_vec())
                .unwrap_or_default()
        };

        for subscriber in targets {
            if !subscriber.send(event.clone()) {
                debug!(
                    "Skipped closed subscriber {} of room {}",
                    subscriber.id, room_id
                );
            }
        }
    }

    /// How many connections a room currently has
    pub fn subscriber_count(&self, room_id: PrimaryKey) -> usize {
        self.rooms
            .read()
            .get(&room_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Whether a room has an entry in the registry at all
    pub fn has_room(&self, room_id: PrimaryKey) -> bool {
        self.rooms.read().contains_key(&room_id)
    }
}

impl Subscriber {
    fn new() -> Self {
        Self {
            id: SubscriberId::new(),
            inner: Arc::new(SubscriberInner {
                pending: Default::default(),
                waker: Default::default(),
                closed: AtomicBool::new(false),
                close_signal: Notify::new(),
            }),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Queues an event for delivery. Returns false if the connection is
    /// already done.
    fn send(&self, event: RoomEvent) -> bool {
        if self.is_closed() {
            return false;
        }

        self.inner.pending.lock().push_back(event);

        if let Some(waker) = self.inner.waker.lock().take() {
            waker.wake()
        }

        true
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Server-side teardown: ends the stream and releases anything
    /// waiting on [Subscriber::closed].
    pub fn close(&self) {
        self.inner.close();
    }

    /// Resolves once the connection is closed from either side.
    pub async fn closed(&self) {
        let notified = self.inner.close_signal.notified();
        tokio::pin!(notified);

        loop {
            // Registered before the flag check, so a close landing in
            // between cannot be missed
            notified.as_mut().enable();

            if self.is_closed() {
                return;
            }

            notified.as_mut().await;
            notified.set(self.inner.close_signal.notified());
        }
    }

    fn handle(&self, room_id: PrimaryKey, hub: Weak<BroadcastHub>) -> SubscriberHandle {
        SubscriberHandle {
            id: self.id,
            room_id,
            inner: self.inner.clone(),
            hub,
        }
    }
}

impl SubscriberInner {
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.close_signal.notify_waiters();

        if let Some(waker) = self.waker.lock().take() {
            waker.wake()
        }
    }
}

impl SubscriberHandle {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// A cloneable view of this connection for watchdog tasks.
    pub fn subscriber(&self) -> Subscriber {
        Subscriber {
            id: self.id,
            inner: self.inner.clone(),
        }
    }

    /// Queues an event on this connection only, ahead of any broadcasts
    /// that follow. Used for the initial status payload.
    pub fn push(&self, event: RoomEvent) {
        self.subscriber().send(event);
    }
}

impl Stream for SubscriberHandle {
    type Item = RoomEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Poll::Ready(None);
        }

        let next_event = self.inner.pending.lock().pop_front();

        if let Some(event) = next_event {
            return Poll::Ready(Some(event));
        }

        *self.inner.waker.lock() = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        self.inner.close();

        if let Some(hub) = self.hub.upgrade() {
            hub.unregister(self.room_id, self.id);
        } else {
            warn!("Hub dropped before subscriber {}", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use futures_util::StreamExt;

    use super::*;

    const ROOM: PrimaryKey = 1;

    fn event(is_active: bool) -> RoomEvent {
        RoomEvent::status(is_active, Utc::now())
    }

    #[tokio::test]
    async fn broadcasts_reach_every_subscriber_of_the_room() {
        let hub = BroadcastHub::new();

        let mut first = hub.register(ROOM);
        let mut second = hub.register(ROOM);
        let elsewhere = hub.register(ROOM + 1);

        let event = RoomEvent::StatusUpdate {
            is_active: true,
            timestamp: 42,
        };

        hub.broadcast(ROOM, event.clone());

        assert_eq!(first.next().await, Some(event.clone()));
        assert_eq!(second.next().await, Some(event));
        assert!(elsewhere.inner.pending.lock().is_empty());
    }

    #[tokio::test]
    async fn broadcast_to_an_empty_room_is_a_no_op() {
        let hub = BroadcastHub::new();

        hub.broadcast(ROOM, event(true));

        assert!(!hub.has_room(ROOM));
    }

    #[tokio::test]
    async fn dropping_a_handle_unregisters_exactly_once() {
        let hub = BroadcastHub::new();

        let first = hub.register(ROOM);
        let second = hub.register(ROOM);

        assert_eq!(hub.subscriber_count(ROOM), 2);

        let id = first.id();
        drop(first);
        assert_eq!(hub.subscriber_count(ROOM), 1);

        // Unregistering again is a no-op
        hub.unregister(ROOM, id);
        assert_eq!(hub.subscriber_count(ROOM), 1);

        // The room entry disappears with its last subscriber
        drop(second);
        assert!(!hub.has_room(ROOM));
    }

    #[tokio::test]
    async fn closed_subscribers_are_skipped_and_end_their_stream() {
        let hub = BroadcastHub::new();

        let mut handle = hub.register(ROOM);
        let subscriber = handle.subscriber();

        subscriber.close();
        hub.broadcast(ROOM, event(true));

        assert!(handle.inner.pending.lock().is_empty());
        assert_eq!(handle.next().await, None);
    }

    #[tokio::test]
    async fn close_resolves_waiting_watchdogs() {
        let hub = BroadcastHub::new();

        let handle = hub.register(ROOM);
        let subscriber = handle.subscriber();

        let waiter = tokio::spawn({
            let subscriber = subscriber.clone();
            async move { subscriber.closed().await }
        });

        drop(handle);
        waiter.await.expect("watchdog returns");
        assert!(subscriber.is_closed());
    }

    #[tokio::test]
    async fn close_releases_every_waiter() {
        let hub = BroadcastHub::new();

        let handle = hub.register(ROOM);
        let subscriber = handle.subscriber();

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let subscriber = subscriber.clone();
                tokio::spawn(async move { subscriber.closed().await })
            })
            .collect();

        tokio::task::yield_now().await;
        subscriber.close();

        for waiter in waiters {
            tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
                .await
                .expect("every waiter is released")
                .expect("waiter joins");
        }
    }

    #[tokio::test]
    async fn events_arrive_in_order_per_connection() {
        let hub = BroadcastHub::new();
        let mut handle = hub.register(ROOM);

        handle.push(RoomEvent::StatusUpdate {
            is_active: true,
            timestamp: 1,
        });
        hub.broadcast(
            ROOM,
            RoomEvent::StatusUpdate {
                is_active: false,
                timestamp: 2,
            },
        );

        assert_eq!(
            handle.next().await,
            Some(RoomEvent::StatusUpdate {
                is_active: true,
                timestamp: 1
            })
        );
        assert_eq!(
            handle.next().await,
            Some(RoomEvent::StatusUpdate {
                is_active: false,
                timestamp: 2
            })
        );
    }
}
