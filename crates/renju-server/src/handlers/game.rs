//! Game handlers (message types 400–499).

use renju_core::{GameEvent, NegStatus, NegotiationOutcome};
use renju_proto::{MsgType, Packet};

use super::{GameSummary, HandlerCtx};

/// Dispatch a game-family packet by exact type.
pub(super) fn handle(ctx: &HandlerCtx<'_>, packet: &Packet) {
    match packet.msg_type() {
        Some(MsgType::MakeMove) => make_move(ctx, packet),
        Some(MsgType::UndoMove) => undo_move(ctx, packet),
        Some(MsgType::Draw) => draw(ctx, packet),
        Some(MsgType::GiveUp) => give_up(ctx, packet),
        Some(MsgType::GameStarted) => game_started(ctx, packet),
        Some(MsgType::SyncGame) => sync_game(ctx, packet),
        _ => ctx.reply_error(packet, "Unknown message type"),
    }
}

/// Resolve caller, room, and the negotiation status parameter.
fn negotiation_args(ctx: &HandlerCtx<'_>, packet: &Packet) -> Option<(u64, u64, NegStatus)> {
    let user_id = ctx.resolve_user(packet)?;
    let room_id = ctx.resolve_room(packet, user_id)?;

    let Some(neg) = packet.get_u32("negStatus").and_then(NegStatus::from_u32) else {
        ctx.reply_error(packet, "Malformed request");
        return None;
    };

    Some((user_id, room_id, neg))
}

/// Push a negotiation packet straight to one user's session, bypassing the
/// bus (the event catalogue has no reject variants).
fn push_negotiation(
    ctx: &HandlerCtx<'_>,
    target_user: u64,
    msg_type: MsgType,
    neg: NegStatus,
    from_user: u64,
    room_id: u64,
) {
    let Some(session_id) = ctx.store.session_for_user(target_user) else {
        return;
    };
    ctx.send(
        Packet::new(session_id, msg_type)
            .with("roomId", room_id)
            .with("userId", from_user)
            .with("negStatus", neg.to_u32()),
    );
}

/// Place a stone; a completed five-in-a-row finalises the game.
fn make_move(ctx: &HandlerCtx<'_>, packet: &Packet) {
    let Some(user_id) = ctx.resolve_user(packet) else {
        return;
    };
    let Some(room_id) = ctx.resolve_room(packet, user_id) else {
        return;
    };
    let (Some(x), Some(y)) = (packet.get_u32("x"), packet.get_u32("y")) else {
        ctx.reply_error(packet, "Malformed request");
        return;
    };

    let Some(result) = ctx.store.with_room(room_id, |room| {
        room.make_move(user_id, x, y).map(|events| {
            let summary = GameSummary {
                room_id,
                black_id: room.black_seat(),
                white_id: room.white_seat(),
                winner_id: 0,
                status: "win",
                moves: room.board().moves().to_vec(),
                start_time_secs: room.start_time_secs(),
            };
            (events, summary)
        })
    }) else {
        ctx.reply_error(packet, "Room not found");
        return;
    };

    let (events, mut summary) = match result {
        Ok(parts) => parts,
        Err(err) => {
            tracing::debug!(room_id, user_id, x, y, %err, "move refused");
            ctx.reply_error(packet, err.to_string());
            return;
        },
    };

    ctx.send(
        Packet::new(packet.session_id, MsgType::MakeMove)
            .with("success", true)
            .with("x", x)
            .with("y", y),
    );

    let winner = events.iter().find_map(|event| match event {
        GameEvent::GameEnded { winner_id, .. } => Some(*winner_id),
        _ => None,
    });

    ctx.publish(&events);

    if let Some(winner_id) = winner {
        tracing::info!(room_id, winner_id, "game won");
        summary.winner_id = winner_id;
        super::finalize_game(ctx.store, ctx.unix_now_secs, &summary);
    }
}

/// Undo negotiation. The ask and reject notifications are direct pushes;
/// an accepted undo re-syncs the room through `RoomStatusChanged`.
fn undo_move(ctx: &HandlerCtx<'_>, packet: &Packet) {
    let Some((user_id, room_id, neg)) = negotiation_args(ctx, packet) else {
        return;
    };

    let Some(result) = ctx.store.with_room(room_id, |room| room.undo(user_id, neg)) else {
        ctx.reply_error(packet, "Room not found");
        return;
    };

    match result {
        Ok(NegotiationOutcome::Requested(events)) => {
            ctx.send(
                Packet::new(packet.session_id, MsgType::UndoMove)
                    .with("success", true)
                    .with("negStatus", neg.to_u32()),
            );
            for member in ctx.store.room_members(room_id) {
                if member != user_id {
                    push_negotiation(ctx, member, MsgType::UndoMove, NegStatus::Ask, user_id, room_id);
                }
            }
            ctx.publish(&events);
        },
        Ok(NegotiationOutcome::Accepted(events)) => {
            ctx.send(
                Packet::new(packet.session_id, MsgType::UndoMove)
                    .with("success", true)
                    .with("negStatus", neg.to_u32()),
            );
            ctx.publish(&events);
        },
        Ok(NegotiationOutcome::Rejected { requester }) => {
            ctx.send(
                Packet::new(packet.session_id, MsgType::UndoMove)
                    .with("success", true)
                    .with("negStatus", neg.to_u32()),
            );
            push_negotiation(ctx, requester, MsgType::UndoMove, NegStatus::Reject, user_id, room_id);
        },
        Err(err) => ctx.reply_error(packet, err.to_string()),
    }
}

/// Draw negotiation; acceptance ends the game with no winner.
fn draw(ctx: &HandlerCtx<'_>, packet: &Packet) {
    let Some((user_id, room_id, neg)) = negotiation_args(ctx, packet) else {
        return;
    };

    let Some(result) = ctx.store.with_room(room_id, |room| {
        room.draw(user_id, neg).map(|outcome| {
            let summary = GameSummary {
                room_id,
                black_id: room.black_seat(),
                white_id: room.white_seat(),
                winner_id: 0,
                status: "draw",
                moves: room.board().moves().to_vec(),
                start_time_secs: room.start_time_secs(),
            };
            (outcome, summary)
        })
    }) else {
        ctx.reply_error(packet, "Room not found");
        return;
    };

    let (outcome, summary) = match result {
        Ok(parts) => parts,
        Err(err) => {
            ctx.reply_error(packet, err.to_string());
            return;
        },
    };

    ctx.send(
        Packet::new(packet.session_id, MsgType::Draw)
            .with("success", true)
            .with("negStatus", neg.to_u32()),
    );

    match outcome {
        NegotiationOutcome::Requested(events) | NegotiationOutcome::Accepted(events) => {
            let accepted = events
                .iter()
                .any(|event| matches!(event, GameEvent::GameEnded { .. }));
            ctx.publish(&events);
            if accepted {
                tracing::info!(room_id, "game drawn");
                super::finalize_game(ctx.store, ctx.unix_now_secs, &summary);
            }
        },
        NegotiationOutcome::Rejected { requester } => {
            push_negotiation(ctx, requester, MsgType::Draw, NegStatus::Reject, user_id, room_id);
        },
    }
}

/// Unilateral resignation; the opponent wins.
fn give_up(ctx: &HandlerCtx<'_>, packet: &Packet) {
    let Some(user_id) = ctx.resolve_user(packet) else {
        return;
    };
    let Some(room_id) = ctx.resolve_room(packet, user_id) else {
        return;
    };

    let Some(result) = ctx.store.with_room(room_id, |room| {
        room.give_up(user_id).map(|events| {
            let summary = GameSummary {
                room_id,
                black_id: room.black_seat(),
                white_id: room.white_seat(),
                winner_id: 0,
                status: "give_up",
                moves: room.board().moves().to_vec(),
                start_time_secs: room.start_time_secs(),
            };
            (events, summary)
        })
    }) else {
        ctx.reply_error(packet, "Room not found");
        return;
    };

    let (events, mut summary) = match result {
        Ok(parts) => parts,
        Err(err) => {
            ctx.reply_error(packet, err.to_string());
            return;
        },
    };

    ctx.send(Packet::new(packet.session_id, MsgType::GiveUp).with("success", true));

    let winner = events.iter().find_map(|event| match event {
        GameEvent::GameEnded { winner_id, .. } => Some(*winner_id),
        _ => None,
    });

    ctx.publish(&events);

    if let Some(winner_id) = winner {
        tracing::info!(room_id, user_id, winner_id, "game resigned");
        summary.winner_id = winner_id;
        super::finalize_game(ctx.store, ctx.unix_now_secs, &summary);
    }
}

/// Owner starts the game.
fn game_started(ctx: &HandlerCtx<'_>, packet: &Packet) {
    let Some(user_id) = ctx.resolve_user(packet) else {
        return;
    };
    let Some(room_id) = ctx.resolve_room(packet, user_id) else {
        return;
    };

    let unix_now = ctx.unix_now_secs;
    let Some(result) = ctx.store.with_room(room_id, |room| {
        room.start_game(user_id).map(|events| {
            room.set_start_time_secs(unix_now);
            events
        })
    }) else {
        ctx.reply_error(packet, "Room not found");
        return;
    };

    match result {
        Ok(mut events) => {
            tracing::info!(room_id, user_id, "game started");
            ctx.send(
                Packet::new(packet.session_id, MsgType::GameStarted).with("success", true),
            );
            events.push(GameEvent::RoomListUpdated);
            ctx.publish(&events);
        },
        Err(err) => ctx.reply_error(packet, err.to_string()),
    }
}

/// Pull a full game snapshot.
fn sync_game(ctx: &HandlerCtx<'_>, packet: &Packet) {
    let Some(user_id) = ctx.resolve_user(packet) else {
        return;
    };
    let Some(room_id) = ctx.resolve_room(packet, user_id) else {
        return;
    };

    match super::game_snapshot_packet(ctx.store, room_id, packet.session_id) {
        Some(snapshot) => ctx.send(snapshot),
        None => ctx.reply_error(packet, "Room not found"),
    }
}
