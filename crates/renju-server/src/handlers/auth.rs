//! Authentication handlers (message types 100–199).

use renju_core::{GameEvent, StoreError};
use renju_proto::{MsgType, Packet};

use super::HandlerCtx;

/// Dispatch an auth-family packet by exact type.
pub(super) fn handle(ctx: &HandlerCtx<'_>, packet: &Packet) {
    match packet.msg_type() {
        Some(MsgType::Login) => login(ctx, packet),
        Some(MsgType::SignIn) => sign_in(ctx, packet),
        Some(MsgType::LoginAsGuest) => login_as_guest(ctx, packet),
        Some(MsgType::LogOut) => log_out(ctx, packet),
        Some(MsgType::GetUser) => get_user(ctx, packet),
        _ => ctx.reply_error(packet, "Unknown message type"),
    }
}

/// Verify credentials and bind the session to the account.
///
/// A user that already has a live session is refused with the same reply as
/// bad credentials; one session per user, and the reply does not leak which
/// check failed.
fn login(ctx: &HandlerCtx<'_>, packet: &Packet) {
    let (Some(username), Some(password)) =
        (packet.get_str("username"), packet.get_str("password"))
    else {
        ctx.reply_error(packet, "Malformed request");
        return;
    };

    tracing::info!(username, "login attempt");

    let Some(user) = ctx.store.user_by_username(username) else {
        ctx.reply_error(packet, "Invalid username or password");
        return;
    };

    if user.password != password || ctx.store.is_online(user.id) {
        tracing::warn!(username, "login refused");
        ctx.reply_error(packet, "Invalid username or password");
        return;
    }

    ctx.store.bind_session(packet.session_id, user.id);
    tracing::info!(username, user_id = user.id, "login successful");

    ctx.send(
        Packet::new(packet.session_id, MsgType::Login)
            .with("success", true)
            .with("username", username)
            .with("rating", user.ranking),
    );
    ctx.publish(&[GameEvent::UserLoggedIn { user_id: user.id }]);
}

/// Create an account and log it in.
fn sign_in(ctx: &HandlerCtx<'_>, packet: &Packet) {
    let (Some(username), Some(password)) =
        (packet.get_str("username"), packet.get_str("password"))
    else {
        ctx.reply_error(packet, "Malformed request");
        return;
    };

    let user = match ctx.store.create_user(username, password) {
        Ok(user) => user,
        Err(err @ StoreError::UsernameTaken) => {
            ctx.reply_error(packet, err.to_string());
            return;
        },
        Err(err) => {
            tracing::error!(%err, "signup failed");
            ctx.reply_error(packet, "internal error");
            return;
        },
    };

    ctx.store.bind_session(packet.session_id, user.id);
    tracing::info!(username, user_id = user.id, "account created");

    ctx.send(
        Packet::new(packet.session_id, MsgType::SignIn)
            .with("success", true)
            .with("username", username)
            .with("userId", user.id),
    );
    ctx.publish(&[GameEvent::UserLoggedIn { user_id: user.id }]);
}

/// Bind the session to a synthetic guest id from the reserved range.
fn login_as_guest(ctx: &HandlerCtx<'_>, packet: &Packet) {
    let guest_id = ctx.store.mint_guest_id();
    ctx.store.bind_session(packet.session_id, guest_id);

    tracing::info!(guest_id, "guest login");

    ctx.send(
        Packet::new(packet.session_id, MsgType::LoginAsGuest)
            .with("success", true)
            .with("guestId", guest_id)
            .with("username", ctx.username_of(guest_id)),
    );
    ctx.publish(&[GameEvent::UserLoggedIn { user_id: guest_id }]);
}

/// Release the session's user binding.
fn log_out(ctx: &HandlerCtx<'_>, packet: &Packet) {
    let Some(user_id) = ctx.resolve_user(packet) else {
        return;
    };

    ctx.store.unbind_session(packet.session_id);
    tracing::info!(user_id, "logout");

    ctx.send(Packet::new(packet.session_id, MsgType::LogOut).with("success", true));
}

/// Public profile lookup. No login required.
fn get_user(ctx: &HandlerCtx<'_>, packet: &Packet) {
    let Some(user_id) = packet.get_u64("userId") else {
        ctx.reply_error(packet, "Malformed request");
        return;
    };

    let Some(user) = ctx.store.user(user_id) else {
        ctx.reply_error(packet, "User not found");
        return;
    };

    ctx.send(
        Packet::new(packet.session_id, MsgType::GetUser)
            .with("userId", user.id)
            .with("username", user.username)
            .with("rank", user.rank)
            .with("score", user.score as i32)
            .with("ranking", user.ranking),
    );
}
