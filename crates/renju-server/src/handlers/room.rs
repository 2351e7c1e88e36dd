//! Room handlers (message types 300–399).
//!
//! All operations here resolve the room through the `user → room` index,
//! never from the packet body.

use renju_core::{GameEvent, RoomSettingsUpdate};
use renju_proto::{MsgType, Packet};

use super::{GameSummary, HandlerCtx};

/// Dispatch a room-family packet by exact type.
pub(super) fn handle(ctx: &HandlerCtx<'_>, packet: &Packet) {
    match packet.msg_type() {
        Some(MsgType::SyncSeat) => sync_seat(ctx, packet),
        Some(MsgType::SyncRoomSetting) => sync_room_setting(ctx, packet),
        Some(MsgType::ChatMessage) => chat_message(ctx, packet),
        Some(MsgType::ExitRoom) => exit_room(ctx, packet),
        Some(MsgType::SyncUsersToRoom) => sync_users_to_room(ctx, packet),
        _ => ctx.reply_error(packet, "Unknown message type"),
    }
}

/// Resolve a seat request name to a user id; empty string means unseat.
fn seat_occupant(ctx: &HandlerCtx<'_>, name: &str) -> Result<u64, String> {
    if name.is_empty() {
        return Ok(0);
    }
    ctx.store
        .user_by_username(name)
        .map(|user| user.id)
        .ok_or_else(|| format!("User not found: {name}"))
}

/// Seat negotiation: the caller names the intended occupant of each seat.
fn sync_seat(ctx: &HandlerCtx<'_>, packet: &Packet) {
    let Some(user_id) = ctx.resolve_user(packet) else {
        return;
    };
    let Some(room_id) = ctx.resolve_room(packet, user_id) else {
        return;
    };
    let (Some(p1), Some(p2)) = (packet.get_str("p1"), packet.get_str("p2")) else {
        ctx.reply_error(packet, "Malformed request");
        return;
    };

    let (black, white) = match (seat_occupant(ctx, p1), seat_occupant(ctx, p2)) {
        (Ok(black), Ok(white)) => (black, white),
        (Err(reason), _) | (_, Err(reason)) => {
            ctx.reply_error(packet, reason);
            return;
        },
    };

    let Some(result) = ctx.store.with_room(room_id, |room| room.sync_seat(user_id, black, white))
    else {
        ctx.reply_error(packet, "Room not found");
        return;
    };

    match result {
        Ok(events) => {
            ctx.send(
                Packet::new(packet.session_id, MsgType::SyncSeat).with("success", true),
            );
            ctx.publish(&events);
        },
        Err(err) => ctx.reply_error(packet, err.to_string()),
    }
}

/// Owner-only settings edit, refused while playing.
fn sync_room_setting(ctx: &HandlerCtx<'_>, packet: &Packet) {
    let Some(user_id) = ctx.resolve_user(packet) else {
        return;
    };
    let Some(room_id) = ctx.resolve_room(packet, user_id) else {
        return;
    };

    let update = RoomSettingsUpdate {
        board_size: packet.get_u32("boardSize"),
        ranked: packet.get_bool("ranked"),
        takeback_allowed: packet.get_bool("takebackAllowed"),
        base_time_secs: packet.get_u32("baseTime"),
        byoyomi_secs: packet.get_u32("byoyomiTime"),
        byoyomi_count: packet.get_u32("byoyomiCount"),
    };

    let Some(result) =
        ctx.store.with_room(room_id, |room| room.edit_settings(user_id, &update))
    else {
        ctx.reply_error(packet, "Room not found");
        return;
    };

    match result {
        Ok(mut events) => {
            ctx.send(
                Packet::new(packet.session_id, MsgType::SyncRoomSetting).with("success", true),
            );
            events.push(GameEvent::RoomListUpdated);
            ctx.publish(&events);
        },
        Err(err) => ctx.reply_error(packet, err.to_string()),
    }
}

/// Chat line to the caller's room; the notifier broadcasts it.
fn chat_message(ctx: &HandlerCtx<'_>, packet: &Packet) {
    let Some(user_id) = ctx.resolve_user(packet) else {
        return;
    };
    let Some(room_id) = ctx.resolve_room(packet, user_id) else {
        return;
    };
    let Some(message) = packet.get_str("message") else {
        ctx.reply_error(packet, "Malformed request");
        return;
    };

    ctx.send(Packet::new(packet.session_id, MsgType::ChatMessage).with("success", true));
    ctx.publish(&[GameEvent::ChatMessageRecv {
        room_id,
        user_id,
        message: message.to_string(),
    }]);
}

/// Leave the current room. Leaving mid-game forfeits; an emptied room is
/// destroyed.
fn exit_room(ctx: &HandlerCtx<'_>, packet: &Packet) {
    let Some(user_id) = ctx.resolve_user(packet) else {
        return;
    };
    let Some(room_id) = ctx.resolve_room(packet, user_id) else {
        return;
    };

    // Capture game data before the removal clears seats, in case the leave
    // forfeits a running game.
    let Some(result) = ctx.store.with_room(room_id, |room| {
        let summary = GameSummary {
            room_id,
            black_id: room.black_seat(),
            white_id: room.white_seat(),
            winner_id: 0,
            status: "forfeit",
            moves: room.board().moves().to_vec(),
            start_time_secs: room.start_time_secs(),
        };
        room.remove_player(user_id).map(|events| (events, summary, room.is_empty()))
    }) else {
        ctx.reply_error(packet, "Room not found");
        return;
    };

    let (events, mut summary, emptied) = match result {
        Ok(parts) => parts,
        Err(err) => {
            ctx.reply_error(packet, err.to_string());
            return;
        },
    };

    ctx.store.unmap_user_room(user_id);
    if emptied {
        // Destroy before the list update goes out, so nobody is pointed at
        // a dead room.
        ctx.store.remove_room(room_id);
        tracing::debug!(room_id, "empty room destroyed");
    }
    tracing::info!(room_id, user_id, "player left room");

    ctx.send(Packet::new(packet.session_id, MsgType::ExitRoom).with("success", true));

    let forfeited = events
        .iter()
        .find_map(|event| match event {
            GameEvent::GameEnded { winner_id, .. } => Some(*winner_id),
            _ => None,
        });

    ctx.publish(&events);
    ctx.publish(&[
        GameEvent::PlayerLeft { room_id, user_id },
        GameEvent::RoomListUpdated,
    ]);

    if let Some(winner_id) = forfeited {
        summary.winner_id = winner_id;
        super::finalize_game(ctx.store, ctx.unix_now_secs, &summary);
    }
}

/// Pull the member list of the caller's room.
fn sync_users_to_room(ctx: &HandlerCtx<'_>, packet: &Packet) {
    let Some(user_id) = ctx.resolve_user(packet) else {
        return;
    };
    let Some(room_id) = ctx.resolve_room(packet, user_id) else {
        return;
    };

    ctx.send(super::member_list_packet(ctx.store, room_id, packet.session_id));
}
