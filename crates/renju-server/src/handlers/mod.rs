//! Request dispatcher and handler families.
//!
//! The dispatcher is a pure function of (session id, decoded packet): the
//! message-type range picks the family (1xx auth, 2xx lobby, 3xx room,
//! 4xx game) and the exact type picks the handler inside it.
//!
//! Every handler follows the same shape:
//!
//! 1. resolve the calling user from the session id (auth entry points
//!    excepted),
//! 2. resolve the room through the `user → room` index for room-scoped
//!    operations (JoinRoom carries its room id explicitly),
//! 3. mutate the resolved entity (validation lives on the entity),
//! 4. queue the response packet,
//! 5. on failure queue an Error packet carrying the entity's reason,
//! 6. publish resulting domain events AFTER the response is queued.
//!
//! Events are always published after the store lock is released: notifier
//! callbacks read the store, and publishing from inside a `with_room`
//! closure would deadlock.

mod auth;
mod game;
mod lobby;
mod room;

use std::sync::Arc;

use renju_core::{EventBus, GameEvent, GameRecord, ObjectStore, GUEST_ID_BASE};
use renju_proto::{MsgType, Packet};

use crate::outbox::Outbox;

/// Everything a handler may touch.
pub struct HandlerCtx<'a> {
    /// Shared object store.
    pub store: &'a Arc<ObjectStore>,
    /// Event bus for domain announcements.
    pub bus: &'a EventBus,
    /// Outbound packet queue.
    pub outbox: &'a Outbox,
    /// Cap for lobby list snapshots.
    pub lobby_snapshot_max: usize,
    /// Board size for freshly created rooms.
    pub default_board_size: u32,
    /// Wall-clock seconds, for persisted timestamps.
    pub unix_now_secs: u64,
}

impl HandlerCtx<'_> {
    /// Queue an outbound packet.
    pub fn send(&self, packet: Packet) {
        self.outbox.push(packet);
    }

    /// Queue an Error packet answering `request`.
    pub fn reply_error(&self, request: &Packet, reason: impl Into<String>) {
        self.send(Packet::error(request.session_id, reason));
    }

    /// Publish events in order, after any entity lock has been released.
    pub fn publish(&self, events: &[GameEvent]) {
        for event in events {
            self.bus.publish(event);
        }
    }

    /// Resolve the calling user; queues the error reply on failure.
    pub fn resolve_user(&self, request: &Packet) -> Option<u64> {
        match self.store.user_for_session(request.session_id) {
            Some(user_id) => Some(user_id),
            None => {
                self.reply_error(request, "Not logged in");
                None
            },
        }
    }

    /// Resolve the caller's room through the `user → room` index; queues the
    /// error reply on failure.
    pub fn resolve_room(&self, request: &Packet, user_id: u64) -> Option<u64> {
        match self.store.room_for_user(user_id) {
            Some(room_id) => Some(room_id),
            None => {
                self.reply_error(request, "You are not in a room");
                None
            },
        }
    }

    /// Display name for a user id; guests get a synthetic name.
    pub fn username_of(&self, user_id: u64) -> String {
        display_name(self.store, user_id)
    }
}

/// Route a decoded packet to its handler family.
///
/// Heartbeats never reach this point (the session layer consumes them);
/// anything outside the defined ranges is answered with an Error packet.
pub fn dispatch(ctx: &HandlerCtx<'_>, packet: &Packet) {
    match packet.msg_type / 100 {
        1 => auth::handle(ctx, packet),
        2 => lobby::handle(ctx, packet),
        3 => room::handle(ctx, packet),
        4 => game::handle(ctx, packet),
        _ => {
            tracing::debug!(msg_type = packet.msg_type, "unknown message type");
            ctx.reply_error(packet, "Unknown message type");
        },
    }
}

/// Display name for a user id; guests are named from their offset in the
/// reserved range.
pub(crate) fn display_name(store: &ObjectStore, user_id: u64) -> String {
    if user_id >= GUEST_ID_BASE {
        return format!("Guest-{}", user_id - GUEST_ID_BASE + 1);
    }
    store.user(user_id).map_or_else(|| format!("User-{user_id}"), |user| user.username)
}

/// Formatted member list packet (`SyncUsersToRoom`) for one recipient.
pub(crate) fn member_list_packet(
    store: &ObjectStore,
    room_id: u64,
    session_id: u64,
) -> Packet {
    let members = store.room_members(room_id);
    let lines: Vec<String> = members
        .iter()
        .map(|&user_id| {
            let state = if store.is_online(user_id) { "online" } else { "offline" };
            format!("{} ({})", display_name(store, user_id), state)
        })
        .collect();

    Packet::new(session_id, MsgType::SyncUsersToRoom)
        .with("roomId", room_id)
        .with("count", members.len() as u32)
        .with("users", lines.join("\n"))
}

/// Full game snapshot packet (`SyncGame`) for one recipient.
///
/// `None` when the room no longer exists.
pub(crate) fn game_snapshot_packet(
    store: &ObjectStore,
    room_id: u64,
    session_id: u64,
) -> Option<Packet> {
    store.with_room(room_id, |room| {
        let moves: Vec<String> =
            room.board().moves().iter().map(|(x, y)| format!("{x},{y}")).collect();
        let (last_x, last_y) = match room.board().last_move() {
            Some((x, y)) => (x as i32, y as i32),
            None => (-1, -1),
        };
        let to_move = match room.board().to_move() {
            renju_core::Cell::White => "white",
            _ => "black",
        };

        Packet::new(session_id, MsgType::SyncGame)
            .with("roomId", room_id)
            .with("status", room.status().as_str())
            .with("ownerId", room.owner_id())
            .with("blackId", room.black_seat())
            .with("whiteId", room.white_seat())
            .with("boardSize", room.board().size())
            .with("moves", moves.join(";"))
            .with("lastX", last_x)
            .with("lastY", last_y)
            .with("toMove", to_move)
    })
}

/// Data captured at game end, before any seat or membership mutation.
pub(crate) struct GameSummary {
    pub room_id: u64,
    pub black_id: u64,
    pub white_id: u64,
    pub winner_id: u64,
    pub status: &'static str,
    pub moves: Vec<(u32, u32)>,
    pub start_time_secs: u64,
}

/// Persist a finished game: append the record and update both players'
/// counters and ranks. Guests have no account and are skipped.
///
/// Gateway failures are logged and swallowed; a lost record must not take
/// the room down (the reply has already been queued).
pub(crate) fn finalize_game(store: &ObjectStore, unix_now_secs: u64, summary: &GameSummary) {
    let record = GameRecord {
        room_id: summary.room_id,
        black_player_id: summary.black_id,
        white_player_id: summary.white_id,
        winner_id: summary.winner_id,
        status: summary.status.to_string(),
        moves_json: serde_json::to_string(&summary.moves).unwrap_or_else(|_| "[]".to_string()),
        start_time_secs: summary.start_time_secs,
        end_time_secs: unix_now_secs,
    };

    if let Err(err) = store.gateway().save_game_record(&record) {
        tracing::error!(room_id = summary.room_id, %err, "failed to save game record");
    }

    for player in [summary.black_id, summary.white_id] {
        if player == 0 || player >= GUEST_ID_BASE {
            continue;
        }

        let updated = store.with_user_mut(player, |user| {
            if summary.winner_id == 0 {
                user.record_draw();
            } else if summary.winner_id == player {
                user.record_win();
            } else {
                user.record_loss();
            }
        });

        if let Some(((), user)) = updated {
            if let Err(err) = store.gateway().update_user(&user) {
                tracing::error!(user_id = player, %err, "failed to persist user results");
            }
        }
    }
}
