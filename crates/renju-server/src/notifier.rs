//! Notifier: translates domain events into push packets.
//!
//! Subscribes once to every event in the catalogue at startup and holds the
//! subscription handles for the server's lifetime. For each event it
//! composes zero or more push packets and addresses them (room broadcast,
//! whole-lobby broadcast, or single session), resolving recipients through
//! the `user → session` index. A missing reverse entry means the recipient
//! is offline and the packet is dropped for them.
//!
//! The notifier never touches socket state: it queues packets on the shared
//! outbox and the driver seals and sends them. Broadcasts queue recipients
//! in member-list order for rooms and ascending user-id order for the
//! lobby.

use std::sync::Arc;

use renju_core::{EventBus, GameEvent, NegStatus, ObjectStore, Subscription};
use renju_proto::{MsgType, Packet};

use crate::{
    handlers::{display_name, game_snapshot_packet, member_list_packet},
    outbox::Outbox,
};

/// Event-to-push fan-out. Holds its bus subscriptions alive.
pub struct Notifier {
    _subscriptions: Vec<Subscription>,
}

impl Notifier {
    /// Subscribe to the full event catalogue.
    #[must_use]
    pub fn attach(
        bus: &EventBus,
        store: Arc<ObjectStore>,
        outbox: Outbox,
        lobby_snapshot_max: usize,
    ) -> Self {
        let mut subscriptions = Vec::new();

        for kind in renju_core::ALL_EVENT_KINDS {
            let store = Arc::clone(&store);
            let outbox = outbox.clone();
            subscriptions.push(bus.subscribe(kind, move |event| {
                fan_out(&store, &outbox, lobby_snapshot_max, event);
            }));
        }

        Self { _subscriptions: subscriptions }
    }
}

/// Compose and address the pushes for one event.
fn fan_out(store: &ObjectStore, outbox: &Outbox, lobby_max: usize, event: &GameEvent) {
    match event {
        GameEvent::PlayerJoined { room_id, .. } | GameEvent::PlayerLeft { room_id, .. } => {
            broadcast_with(store, outbox, *room_id, |session_id| {
                Some(member_list_packet(store, *room_id, session_id))
            });
        },

        GameEvent::PiecePlaced { room_id, user_id, x, y } => {
            broadcast(
                store,
                outbox,
                *room_id,
                &Packet::new(0, MsgType::MakeMove)
                    .with("roomId", *room_id)
                    .with("userId", *user_id)
                    .with("x", *x)
                    .with("y", *y),
            );
        },

        GameEvent::GameStarted { room_id } => {
            broadcast(
                store,
                outbox,
                *room_id,
                &Packet::new(0, MsgType::GameStarted).with("roomId", *room_id),
            );
        },

        GameEvent::GameEnded { room_id, winner_id } => {
            broadcast(
                store,
                outbox,
                *room_id,
                &Packet::new(0, MsgType::GameEnded)
                    .with("roomId", *room_id)
                    .with("winnerId", *winner_id),
            );
        },

        GameEvent::RoomStatusChanged { room_id, .. } => {
            broadcast_with(store, outbox, *room_id, |session_id| {
                game_snapshot_packet(store, *room_id, session_id)
            });
        },

        GameEvent::DrawRequested { room_id, user_id } => {
            broadcast(
                store,
                outbox,
                *room_id,
                &Packet::new(0, MsgType::Draw)
                    .with("roomId", *room_id)
                    .with("userId", *user_id)
                    .with("negStatus", NegStatus::Ask.to_u32()),
            );
        },

        GameEvent::DrawAccepted { room_id, user_id } => {
            broadcast(
                store,
                outbox,
                *room_id,
                &Packet::new(0, MsgType::Draw)
                    .with("roomId", *room_id)
                    .with("userId", *user_id)
                    .with("negStatus", NegStatus::Accept.to_u32()),
            );
        },

        GameEvent::GiveUpRequested { room_id, user_id } => {
            broadcast(
                store,
                outbox,
                *room_id,
                &Packet::new(0, MsgType::GiveUp)
                    .with("roomId", *room_id)
                    .with("userId", *user_id),
            );
        },

        GameEvent::RoomCreated { room_id, .. } => {
            // Fresh room: give its members (the owner) the full picture.
            broadcast_with(store, outbox, *room_id, |session_id| {
                game_snapshot_packet(store, *room_id, session_id)
            });
            broadcast_with(store, outbox, *room_id, |session_id| {
                Some(member_list_packet(store, *room_id, session_id))
            });
        },

        GameEvent::UserLoggedIn { .. } => {
            lobby_broadcast(store, outbox, |session_id| {
                users_snapshot_packet(store, lobby_max, session_id)
            });
        },

        GameEvent::RoomListUpdated => {
            lobby_broadcast(store, outbox, |session_id| {
                rooms_snapshot_packet(store, lobby_max, session_id)
            });
        },

        GameEvent::ChatMessageRecv { room_id, user_id, message } => {
            broadcast(
                store,
                outbox,
                *room_id,
                &Packet::new(0, MsgType::ChatMessage)
                    .with("roomId", *room_id)
                    .with("userId", *user_id)
                    .with("username", display_name(store, *user_id))
                    .with("message", message.as_str()),
            );
        },

        GameEvent::SyncSeat { room_id, black_id, white_id } => {
            let p1 = if *black_id == 0 { String::new() } else { display_name(store, *black_id) };
            let p2 = if *white_id == 0 { String::new() } else { display_name(store, *white_id) };
            broadcast(
                store,
                outbox,
                *room_id,
                &Packet::new(0, MsgType::SyncSeat)
                    .with("roomId", *room_id)
                    .with("blackId", *black_id)
                    .with("whiteId", *white_id)
                    .with("p1", p1)
                    .with("p2", p2),
            );
        },
    }
}

/// Queue one fixed packet per online room member, in member-list order.
fn broadcast(store: &ObjectStore, outbox: &Outbox, room_id: u64, packet: &Packet) {
    broadcast_with(store, outbox, room_id, |session_id| {
        let mut copy = packet.clone();
        copy.session_id = session_id;
        Some(copy)
    });
}

/// Queue a per-recipient packet for every online room member.
fn broadcast_with(
    store: &ObjectStore,
    outbox: &Outbox,
    room_id: u64,
    mut make: impl FnMut(u64) -> Option<Packet>,
) {
    for member in store.room_members(room_id) {
        let Some(session_id) = store.session_for_user(member) else {
            continue; // offline: drop
        };
        if let Some(packet) = make(session_id) {
            outbox.push(packet);
        }
    }
}

/// Queue a per-recipient packet for every online user.
fn lobby_broadcast(
    store: &ObjectStore,
    outbox: &Outbox,
    mut make: impl FnMut(u64) -> Option<Packet>,
) {
    for user_id in store.online_user_ids() {
        let Some(session_id) = store.session_for_user(user_id) else {
            continue;
        };
        if let Some(packet) = make(session_id) {
            outbox.push(packet);
        }
    }
}

/// Lobby user-list push, same shape as the pull reply.
fn users_snapshot_packet(store: &ObjectStore, max: usize, session_id: u64) -> Option<Packet> {
    let lines: Vec<String> = store
        .user_summaries(max)
        .into_iter()
        .map(|(name, online)| format!("{} ({})", name, if online { "online" } else { "offline" }))
        .collect();

    Some(
        Packet::new(session_id, MsgType::UpdateUsersToLobby)
            .with("count", lines.len() as u32)
            .with("users", lines.join("\n")),
    )
}

/// Lobby room-list push, same shape as the pull reply.
fn rooms_snapshot_packet(store: &ObjectStore, max: usize, session_id: u64) -> Option<Packet> {
    let lines = store.room_summaries(max);

    Some(
        Packet::new(session_id, MsgType::UpdateRoomsToLobby)
            .with("count", lines.len() as u32)
            .with("rooms", lines.join("\n")),
    )
}
