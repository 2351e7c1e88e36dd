//! Lobby handlers (message types 200–299).

use renju_core::{GameEvent, RoomConfig};
use renju_proto::{MsgType, Packet};

use super::HandlerCtx;

/// Dispatch a lobby-family packet by exact type.
pub(super) fn handle(ctx: &HandlerCtx<'_>, packet: &Packet) {
    match packet.msg_type() {
        Some(MsgType::CreateRoom) => create_room(ctx, packet),
        Some(MsgType::JoinRoom) => join_room(ctx, packet),
        Some(MsgType::QuickMatch) => quick_match(ctx, packet),
        Some(MsgType::UpdateUsersToLobby) => update_users_to_lobby(ctx, packet),
        Some(MsgType::UpdateRoomsToLobby) => update_rooms_to_lobby(ctx, packet),
        _ => ctx.reply_error(packet, "Unknown message type"),
    }
}

fn room_config(ctx: &HandlerCtx<'_>) -> RoomConfig {
    RoomConfig { board_size: ctx.default_board_size, ..RoomConfig::default() }
}

/// Allocate a room with the caller as first member and owner.
fn create_room(ctx: &HandlerCtx<'_>, packet: &Packet) {
    let Some(user_id) = ctx.resolve_user(packet) else {
        return;
    };
    if ctx.store.room_for_user(user_id).is_some() {
        ctx.reply_error(packet, "Already in a room");
        return;
    }

    let room_id = ctx.store.create_room(room_config(ctx));
    // A fresh room always has space for its creator.
    let joined = ctx.store.with_room(room_id, |room| room.add_player(user_id));
    debug_assert_eq!(joined, Some(Ok(())));
    ctx.store.map_user_room(user_id, room_id);

    tracing::info!(room_id, owner_id = user_id, "room created");

    ctx.send(
        Packet::new(packet.session_id, MsgType::CreateRoom)
            .with("success", true)
            .with("roomId", room_id),
    );
    ctx.publish(&[
        GameEvent::RoomCreated { room_id, owner_id: user_id },
        GameEvent::RoomListUpdated,
    ]);
}

/// Join a room named in the packet body, the one room-scoped operation
/// whose room id comes from the client.
fn join_room(ctx: &HandlerCtx<'_>, packet: &Packet) {
    let Some(user_id) = ctx.resolve_user(packet) else {
        return;
    };
    let Some(room_id) = packet.get_u64("roomId") else {
        ctx.reply_error(packet, "Malformed request");
        return;
    };
    if ctx.store.room_for_user(user_id).is_some() {
        ctx.reply_error(packet, "Already in a room");
        return;
    }

    let Some(result) = ctx.store.with_room(room_id, |room| room.add_player(user_id)) else {
        ctx.reply_error(packet, "Room not found");
        return;
    };

    if let Err(err) = result {
        ctx.reply_error(packet, err.to_string());
        return;
    }

    ctx.store.map_user_room(user_id, room_id);
    tracing::info!(room_id, user_id, "player joined room");

    ctx.send(
        Packet::new(packet.session_id, MsgType::JoinRoom)
            .with("success", true)
            .with("roomId", room_id),
    );
    ctx.publish(&[
        GameEvent::PlayerJoined { room_id, user_id },
        GameEvent::RoomListUpdated,
    ]);
}

/// Join the first open Free room, or create a fresh one when none exists.
fn quick_match(ctx: &HandlerCtx<'_>, packet: &Packet) {
    let Some(user_id) = ctx.resolve_user(packet) else {
        return;
    };
    if ctx.store.room_for_user(user_id).is_some() {
        ctx.reply_error(packet, "Already in a room");
        return;
    }

    if let Some(room_id) = ctx.store.find_open_room() {
        let joined = ctx.store.with_room(room_id, |room| room.add_player(user_id));
        if joined == Some(Ok(())) {
            ctx.store.map_user_room(user_id, room_id);
            tracing::info!(room_id, user_id, "quick match joined room");

            ctx.send(
                Packet::new(packet.session_id, MsgType::QuickMatch)
                    .with("success", true)
                    .with("roomId", room_id)
                    .with("created", false),
            );
            ctx.publish(&[
                GameEvent::PlayerJoined { room_id, user_id },
                GameEvent::RoomListUpdated,
            ]);
            return;
        }
    }

    let room_id = ctx.store.create_room(room_config(ctx));
    let joined = ctx.store.with_room(room_id, |room| room.add_player(user_id));
    debug_assert_eq!(joined, Some(Ok(())));
    ctx.store.map_user_room(user_id, room_id);

    tracing::info!(room_id, user_id, "quick match created room");

    ctx.send(
        Packet::new(packet.session_id, MsgType::QuickMatch)
            .with("success", true)
            .with("roomId", room_id)
            .with("created", true),
    );
    ctx.publish(&[
        GameEvent::RoomCreated { room_id, owner_id: user_id },
        GameEvent::RoomListUpdated,
    ]);
}

/// Pull model: bounded snapshot of users as `username (online|offline)`
/// lines. No event is published.
fn update_users_to_lobby(ctx: &HandlerCtx<'_>, packet: &Packet) {
    let max = packet.get_u32("maxCount").map_or(ctx.lobby_snapshot_max, |m| m as usize);
    let summaries = ctx.store.user_summaries(max);

    let lines: Vec<String> = summaries
        .iter()
        .map(|(name, online)| {
            format!("{} ({})", name, if *online { "online" } else { "offline" })
        })
        .collect();

    ctx.send(
        Packet::new(packet.session_id, MsgType::UpdateUsersToLobby)
            .with("count", lines.len() as u32)
            .with("users", lines.join("\n")),
    );
}

/// Pull model: bounded snapshot of rooms as `#<id>, <status>, <description>`
/// lines. No event is published.
fn update_rooms_to_lobby(ctx: &HandlerCtx<'_>, packet: &Packet) {
    let max = packet.get_u32("maxCount").map_or(ctx.lobby_snapshot_max, |m| m as usize);
    let lines = ctx.store.room_summaries(max);

    ctx.send(
        Packet::new(packet.session_id, MsgType::UpdateRoomsToLobby)
            .with("count", lines.len() as u32)
            .with("rooms", lines.join("\n")),
    );
}
