//! Room state machine: seating, start/end, move legality, negotiation.
//!
//! All business validation lives here, not in the handlers. Mutating methods
//! return the domain events the room announces; handlers publish them after
//! the response packet is queued, so responses always precede the pushes
//! they trigger.
//!
//! Status walks **Free → Playing → End**; End is terminal for the room
//! instance (rooms are destroyed, never recycled).
//!
//! # Invariants
//!
//! - A Playing room has both seats filled with distinct member ids.
//! - The member list never exceeds two entries; the owner is always a member
//!   while the room is non-empty.
//! - Turn order is derived from the board's stack depth, so the room only
//!   checks that the mover holds the seat of the colour to move.

use thiserror::Error;

use crate::{
    board::{Board, Cell},
    events::GameEvent,
};

/// Maximum members per room: the two players.
pub const MAX_MEMBERS: usize = 2;

/// Room lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    /// Gathering players and negotiating seats.
    Free,
    /// Game in progress.
    Playing,
    /// Game finished; terminal.
    End,
}

impl RoomStatus {
    /// Lower-case wire form, used in pushes and lobby snapshots.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Playing => "playing",
            Self::End => "end",
        }
    }
}

/// Negotiation phase carried by Draw and UndoMove requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum NegStatus {
    /// Open a request (supersedes any earlier request by the same player).
    Ask = 0,
    /// Opponent accepts the pending request.
    Accept = 1,
    /// Opponent declines; the requester alone is notified.
    Reject = 2,
}

impl NegStatus {
    /// Parse the wire value.
    #[must_use]
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Ask),
            1 => Some(Self::Accept),
            2 => Some(Self::Reject),
            _ => None,
        }
    }

    /// Wire value.
    #[must_use]
    pub fn to_u32(self) -> u32 {
        self as u32
    }
}

/// Room configuration block. Owner-editable while the room is not playing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomConfig {
    /// Board edge length.
    pub board_size: u32,
    /// Whether results feed the rating ladder.
    pub ranked: bool,
    /// Whether undo negotiation is allowed at all.
    pub takeback_allowed: bool,
    /// Base thinking time per player, seconds.
    pub base_time_secs: u32,
    /// Byoyomi period length, seconds.
    pub byoyomi_secs: u32,
    /// Number of byoyomi periods.
    pub byoyomi_count: u32,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            board_size: crate::board::DEFAULT_BOARD_SIZE,
            ranked: false,
            takeback_allowed: true,
            base_time_secs: 600,
            byoyomi_secs: 30,
            byoyomi_count: 5,
        }
    }
}

/// Partial settings edit; `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomSettingsUpdate {
    /// New board size. Resets the board when changed.
    pub board_size: Option<u32>,
    /// New ranked flag.
    pub ranked: Option<bool>,
    /// New takeback flag.
    pub takeback_allowed: Option<bool>,
    /// New base time.
    pub base_time_secs: Option<u32>,
    /// New byoyomi period length.
    pub byoyomi_secs: Option<u32>,
    /// New byoyomi period count.
    pub byoyomi_count: Option<u32>,
}

/// Validation failures; the Display string is the reason sent to clients.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomError {
    /// Join with an id already in the member list.
    #[error("Player already in room")]
    AlreadyInRoom,
    /// Join when both slots are taken.
    #[error("Room is full")]
    RoomFull,
    /// Caller is not a member of this room.
    #[error("Player not in room")]
    NotInRoom,
    /// Settings edit by a non-owner.
    #[error("Only room owner can edit settings")]
    OwnerOnlySettings,
    /// Start by a non-owner.
    #[error("Only room owner can start the game")]
    OwnerOnlyStart,
    /// Settings edit during a game.
    #[error("Cannot edit settings while playing")]
    EditWhilePlaying,
    /// Start while already playing.
    #[error("Game already started")]
    AlreadyStarted,
    /// Start after the room's game ended; End is terminal.
    #[error("Room is finished")]
    RoomFinished,
    /// Start without both seats taken by distinct players.
    #[error("Both players must choose a color")]
    SeatsIncomplete,
    /// Seat request violating the negotiation rules.
    #[error("Invalid Seat")]
    InvalidSeat,
    /// Game operation outside Playing status.
    #[error("Game not in progress")]
    NotPlaying,
    /// Game operation by an unseated user.
    #[error("Player is not in this game")]
    NotSeated,
    /// Move by the player whose colour is not to move.
    #[error("Not your turn")]
    NotYourTurn,
    /// Move out of bounds or onto an occupied cell.
    #[error("Illegal move")]
    IllegalMove,
    /// Undo negotiation in a room with takeback disabled.
    #[error("Takeback disabled")]
    TakebackDisabled,
    /// Accept/Reject with no matching pending draw request.
    #[error("No pending draw request")]
    NoPendingDraw,
    /// Accept/Reject with no matching pending undo request.
    #[error("No pending undo request")]
    NoPendingUndo,
    /// Undo accepted on an empty board.
    #[error("Nothing to undo")]
    NothingToUndo,
    /// Settings value outside the permitted range.
    #[error("Invalid board size")]
    InvalidBoardSize,
}

/// Outcome of a negotiated action (Draw, UndoMove).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationOutcome {
    /// Request recorded; events to broadcast.
    Requested(Vec<GameEvent>),
    /// Request accepted and applied; events to broadcast.
    Accepted(Vec<GameEvent>),
    /// Request declined. Only the requester is notified, by the handler.
    Rejected {
        /// The player whose request was declined.
        requester: u64,
    },
}

/// An in-memory game context.
#[derive(Debug)]
pub struct Room {
    id: u64,
    status: RoomStatus,
    owner_id: u64,
    members: Vec<u64>,
    black_seat: u64,
    white_seat: u64,
    config: RoomConfig,
    board: Board,
    pending_draw: Option<u64>,
    pending_undo: Option<u64>,
    start_time_secs: u64,
}

impl Room {
    /// Create an empty Free room.
    #[must_use]
    pub fn new(id: u64, config: RoomConfig) -> Self {
        let board = Board::new(config.board_size);
        Self {
            id,
            status: RoomStatus::Free,
            owner_id: 0,
            members: Vec::new(),
            black_seat: 0,
            white_seat: 0,
            config,
            board,
            pending_draw: None,
            pending_undo: None,
            start_time_secs: 0,
        }
    }

    /// Room id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> RoomStatus {
        self.status
    }

    /// Owner user id; 0 when the room is empty.
    #[must_use]
    pub fn owner_id(&self) -> u64 {
        self.owner_id
    }

    /// Ordered member list.
    #[must_use]
    pub fn members(&self) -> &[u64] {
        &self.members
    }

    /// Black seat occupant; 0 when empty.
    #[must_use]
    pub fn black_seat(&self) -> u64 {
        self.black_seat
    }

    /// White seat occupant; 0 when empty.
    #[must_use]
    pub fn white_seat(&self) -> u64 {
        self.white_seat
    }

    /// Configuration block.
    #[must_use]
    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// The embedded board engine.
    #[must_use]
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// True when the user is in the member list.
    #[must_use]
    pub fn is_member(&self, user_id: u64) -> bool {
        self.members.contains(&user_id)
    }

    /// True when no members remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Lobby-list line: `#<id>, <status>, <description>`.
    #[must_use]
    pub fn describe(&self) -> String {
        let kind = if self.config.ranked { "ranked" } else { "casual" };
        format!(
            "#{}, {}, {}x{} {} ({}/{})",
            self.id,
            self.status.as_str(),
            self.config.board_size,
            self.config.board_size,
            kind,
            self.members.len(),
            MAX_MEMBERS
        )
    }

    /// Append a user to the member list. First entrant becomes owner.
    ///
    /// # Errors
    ///
    /// - [`RoomError::AlreadyInRoom`] / [`RoomError::RoomFull`].
    pub fn add_player(&mut self, user_id: u64) -> Result<(), RoomError> {
        if self.is_member(user_id) {
            return Err(RoomError::AlreadyInRoom);
        }
        if self.members.len() >= MAX_MEMBERS {
            return Err(RoomError::RoomFull);
        }

        if self.members.is_empty() {
            self.owner_id = user_id;
        }
        self.members.push(user_id);
        Ok(())
    }

    /// Remove a user from the member list.
    ///
    /// Ownership falls to the remaining member. A seated leaver vacates the
    /// seat (announced via `SyncSeat`); leaving mid-game forfeits, ending
    /// the game in the opponent's favour so a Playing room always keeps both
    /// seats filled.
    ///
    /// # Errors
    ///
    /// - [`RoomError::NotInRoom`].
    pub fn remove_player(&mut self, user_id: u64) -> Result<Vec<GameEvent>, RoomError> {
        let index = self
            .members
            .iter()
            .position(|&member| member == user_id)
            .ok_or(RoomError::NotInRoom)?;

        let mut events = Vec::new();

        let was_seated = user_id == self.black_seat || user_id == self.white_seat;
        if self.status == RoomStatus::Playing && was_seated {
            let winner =
                if user_id == self.black_seat { self.white_seat } else { self.black_seat };
            self.finish_game();
            events.push(GameEvent::GameEnded { room_id: self.id, winner_id: winner });
        }

        self.members.remove(index);

        if user_id == self.owner_id {
            self.owner_id = self.members.first().copied().unwrap_or(0);
        }

        let mut seat_changed = false;
        if user_id == self.black_seat {
            self.black_seat = 0;
            seat_changed = true;
        }
        if user_id == self.white_seat {
            self.white_seat = 0;
            seat_changed = true;
        }

        if seat_changed {
            events.push(GameEvent::SyncSeat {
                room_id: self.id,
                black_id: self.black_seat,
                white_id: self.white_seat,
            });
        }

        Ok(events)
    }

    /// Seat negotiation: the caller names the intended occupant of each seat
    /// (0 means unseat).
    ///
    /// At most one seat may change per request; the changed seat's new
    /// occupant must be the caller or empty, and its previous occupant must
    /// have been the caller or empty; no other player's seat can be
    /// overwritten. A request matching the current assignment succeeds and
    /// still announces `SyncSeat` exactly once.
    ///
    /// # Errors
    ///
    /// - [`RoomError::NotInRoom`] / [`RoomError::AlreadyStarted`] /
    ///   [`RoomError::InvalidSeat`].
    pub fn sync_seat(
        &mut self,
        user_id: u64,
        requested_black: u64,
        requested_white: u64,
    ) -> Result<Vec<GameEvent>, RoomError> {
        if self.status == RoomStatus::Playing {
            return Err(RoomError::AlreadyStarted);
        }
        if !self.is_member(user_id) {
            return Err(RoomError::NotInRoom);
        }

        let black_changed = requested_black != self.black_seat;
        let white_changed = requested_white != self.white_seat;

        if black_changed && white_changed {
            return Err(RoomError::InvalidSeat);
        }

        if black_changed {
            Self::check_seat_change(user_id, self.black_seat, requested_black)?;
            self.black_seat = requested_black;
        } else if white_changed {
            Self::check_seat_change(user_id, self.white_seat, requested_white)?;
            self.white_seat = requested_white;
        }

        Ok(vec![GameEvent::SyncSeat {
            room_id: self.id,
            black_id: self.black_seat,
            white_id: self.white_seat,
        }])
    }

    /// A seat change is legal when the caller takes a free seat, or vacates
    /// or re-takes their own.
    fn check_seat_change(user_id: u64, previous: u64, requested: u64) -> Result<(), RoomError> {
        let takes_own = requested == user_id || requested == 0;
        let overwrites_nobody = previous == 0 || previous == user_id;

        if takes_own && overwrites_nobody {
            Ok(())
        } else {
            Err(RoomError::InvalidSeat)
        }
    }

    /// Owner-only settings edit, refused while playing.
    ///
    /// A board-size change rebuilds the board.
    ///
    /// # Errors
    ///
    /// - [`RoomError::NotInRoom`] / [`RoomError::OwnerOnlySettings`] /
    ///   [`RoomError::EditWhilePlaying`] / [`RoomError::InvalidBoardSize`].
    pub fn edit_settings(
        &mut self,
        user_id: u64,
        update: &RoomSettingsUpdate,
    ) -> Result<Vec<GameEvent>, RoomError> {
        if !self.is_member(user_id) {
            return Err(RoomError::NotInRoom);
        }
        if user_id != self.owner_id {
            return Err(RoomError::OwnerOnlySettings);
        }
        if self.status == RoomStatus::Playing {
            return Err(RoomError::EditWhilePlaying);
        }

        if let Some(size) = update.board_size {
            if !(5..=25).contains(&size) {
                return Err(RoomError::InvalidBoardSize);
            }
            self.config.board_size = size;
            self.board = Board::new(size);
        }
        if let Some(ranked) = update.ranked {
            self.config.ranked = ranked;
        }
        if let Some(takeback) = update.takeback_allowed {
            self.config.takeback_allowed = takeback;
        }
        if let Some(base) = update.base_time_secs {
            self.config.base_time_secs = base;
        }
        if let Some(byoyomi) = update.byoyomi_secs {
            self.config.byoyomi_secs = byoyomi;
        }
        if let Some(count) = update.byoyomi_count {
            self.config.byoyomi_count = count;
        }

        Ok(vec![GameEvent::RoomStatusChanged {
            room_id: self.id,
            user_id,
            status: "settings_updated".to_string(),
        }])
    }

    /// Owner starts the game: both seats filled with distinct members.
    ///
    /// # Errors
    ///
    /// - [`RoomError::OwnerOnlyStart`] / [`RoomError::AlreadyStarted`] /
    ///   [`RoomError::RoomFinished`] / [`RoomError::SeatsIncomplete`].
    pub fn start_game(&mut self, user_id: u64) -> Result<Vec<GameEvent>, RoomError> {
        if !self.is_member(user_id) {
            return Err(RoomError::NotInRoom);
        }
        if user_id != self.owner_id {
            return Err(RoomError::OwnerOnlyStart);
        }
        match self.status {
            RoomStatus::Playing => return Err(RoomError::AlreadyStarted),
            RoomStatus::End => return Err(RoomError::RoomFinished),
            RoomStatus::Free => {},
        }

        let seats_complete = self.black_seat != 0
            && self.white_seat != 0
            && self.black_seat != self.white_seat
            && self.is_member(self.black_seat)
            && self.is_member(self.white_seat);
        if !seats_complete || self.members.len() < 2 {
            return Err(RoomError::SeatsIncomplete);
        }

        self.board.reset();
        self.status = RoomStatus::Playing;

        Ok(vec![
            GameEvent::GameStarted { room_id: self.id },
            GameEvent::RoomStatusChanged {
                room_id: self.id,
                user_id,
                status: "playing".to_string(),
            },
        ])
    }

    /// Place a stone for `user_id` at (x, y).
    ///
    /// The mover must hold the seat of the colour to move (Black first from
    /// an empty board, strict alternation after). A five-in-a-row through
    /// the new stone ends the game with the mover as winner.
    ///
    /// # Errors
    ///
    /// - [`RoomError::NotPlaying`] / [`RoomError::NotSeated`] /
    ///   [`RoomError::NotYourTurn`] / [`RoomError::IllegalMove`]. The board
    ///   is unchanged on error.
    pub fn make_move(&mut self, user_id: u64, x: u32, y: u32) -> Result<Vec<GameEvent>, RoomError> {
        if self.status != RoomStatus::Playing {
            return Err(RoomError::NotPlaying);
        }

        let colour = self.seat_colour(user_id).ok_or(RoomError::NotSeated)?;
        if colour != self.board.to_move() {
            return Err(RoomError::NotYourTurn);
        }

        self.board.place(x, y).map_err(|_| RoomError::IllegalMove)?;

        let mut events =
            vec![GameEvent::PiecePlaced { room_id: self.id, user_id, x, y }];

        if self.board.winner_through(x, y).is_some() {
            self.finish_game();
            events.push(GameEvent::GameEnded { room_id: self.id, winner_id: user_id });
        }

        Ok(events)
    }

    /// Draw negotiation.
    ///
    /// Ask records the request (a second Ask by the same player supersedes
    /// the first); Accept by the opponent ends the game with winner 0;
    /// Reject clears the request and notifies only the requester.
    ///
    /// # Errors
    ///
    /// - [`RoomError::NotPlaying`] / [`RoomError::NotSeated`] /
    ///   [`RoomError::NoPendingDraw`].
    pub fn draw(
        &mut self,
        user_id: u64,
        neg: NegStatus,
    ) -> Result<NegotiationOutcome, RoomError> {
        if self.status != RoomStatus::Playing {
            return Err(RoomError::NotPlaying);
        }
        self.seat_colour(user_id).ok_or(RoomError::NotSeated)?;

        match neg {
            NegStatus::Ask => {
                self.pending_draw = Some(user_id);
                Ok(NegotiationOutcome::Requested(vec![GameEvent::DrawRequested {
                    room_id: self.id,
                    user_id,
                }]))
            },
            NegStatus::Accept => {
                self.take_pending_draw(user_id)?;
                self.finish_game();
                Ok(NegotiationOutcome::Accepted(vec![
                    GameEvent::DrawAccepted { room_id: self.id, user_id },
                    GameEvent::GameEnded { room_id: self.id, winner_id: 0 },
                ]))
            },
            NegStatus::Reject => {
                let requester = self.take_pending_draw(user_id)?;
                Ok(NegotiationOutcome::Rejected { requester })
            },
        }
    }

    /// Undo negotiation. Accept rolls exactly one ply; no coordinates are
    /// carried.
    ///
    /// # Errors
    ///
    /// - [`RoomError::TakebackDisabled`] / [`RoomError::NotPlaying`] /
    ///   [`RoomError::NotSeated`] / [`RoomError::NoPendingUndo`] /
    ///   [`RoomError::NothingToUndo`].
    pub fn undo(
        &mut self,
        user_id: u64,
        neg: NegStatus,
    ) -> Result<NegotiationOutcome, RoomError> {
        if !self.config.takeback_allowed {
            return Err(RoomError::TakebackDisabled);
        }
        if self.status != RoomStatus::Playing {
            return Err(RoomError::NotPlaying);
        }
        self.seat_colour(user_id).ok_or(RoomError::NotSeated)?;

        match neg {
            NegStatus::Ask => {
                if self.board.stone_count() == 0 {
                    return Err(RoomError::NothingToUndo);
                }
                self.pending_undo = Some(user_id);
                Ok(NegotiationOutcome::Requested(Vec::new()))
            },
            NegStatus::Accept => {
                self.take_pending_undo(user_id)?;
                if self.board.undo().is_none() {
                    return Err(RoomError::NothingToUndo);
                }
                Ok(NegotiationOutcome::Accepted(vec![GameEvent::RoomStatusChanged {
                    room_id: self.id,
                    user_id,
                    status: "undo".to_string(),
                }]))
            },
            NegStatus::Reject => {
                let requester = self.take_pending_undo(user_id)?;
                Ok(NegotiationOutcome::Rejected { requester })
            },
        }
    }

    /// Unilateral resignation: the opponent wins immediately.
    ///
    /// # Errors
    ///
    /// - [`RoomError::NotPlaying`] / [`RoomError::NotSeated`].
    pub fn give_up(&mut self, user_id: u64) -> Result<Vec<GameEvent>, RoomError> {
        if self.status != RoomStatus::Playing {
            return Err(RoomError::NotPlaying);
        }
        let colour = self.seat_colour(user_id).ok_or(RoomError::NotSeated)?;

        let winner = match colour {
            Cell::Black => self.white_seat,
            _ => self.black_seat,
        };

        self.finish_game();

        Ok(vec![
            GameEvent::GiveUpRequested { room_id: self.id, user_id },
            GameEvent::GameEnded { room_id: self.id, winner_id: winner },
            GameEvent::RoomStatusChanged {
                room_id: self.id,
                user_id,
                status: "give_up".to_string(),
            },
        ])
    }

    /// Unix start time of the running game; 0 before the first start.
    /// Recorded by the start handler (wall time is the caller's concern).
    #[must_use]
    pub fn start_time_secs(&self) -> u64 {
        self.start_time_secs
    }

    /// Record the game's wall-clock start time.
    pub fn set_start_time_secs(&mut self, secs: u64) {
        self.start_time_secs = secs;
    }

    /// Seat colour of a user, if seated.
    #[must_use]
    pub fn seat_colour(&self, user_id: u64) -> Option<Cell> {
        if user_id != 0 && user_id == self.black_seat {
            Some(Cell::Black)
        } else if user_id != 0 && user_id == self.white_seat {
            Some(Cell::White)
        } else {
            None
        }
    }

    fn finish_game(&mut self) {
        self.status = RoomStatus::End;
        self.pending_draw = None;
        self.pending_undo = None;
    }

    /// Pop the pending draw request if `user_id` may answer it: the request
    /// exists and was made by the other player.
    fn take_pending_draw(&mut self, user_id: u64) -> Result<u64, RoomError> {
        match self.pending_draw {
            Some(requester) if requester != user_id => {
                self.pending_draw = None;
                Ok(requester)
            },
            _ => Err(RoomError::NoPendingDraw),
        }
    }

    /// Pop the pending undo request if `user_id` may answer it.
    fn take_pending_undo(&mut self, user_id: u64) -> Result<u64, RoomError> {
        match self.pending_undo {
            Some(requester) if requester != user_id => {
                self.pending_undo = None;
                Ok(requester)
            },
            _ => Err(RoomError::NoPendingUndo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: u64 = 10;
    const BOB: u64 = 20;
    const CAROL: u64 = 30;

    fn room_with_members() -> Room {
        let mut room = Room::new(1, RoomConfig::default());
        room.add_player(ALICE).unwrap();
        room.add_player(BOB).unwrap();
        room
    }

    fn playing_room() -> Room {
        let mut room = room_with_members();
        room.sync_seat(ALICE, ALICE, 0).unwrap();
        room.sync_seat(BOB, ALICE, BOB).unwrap();
        room.start_game(ALICE).unwrap();
        room
    }

    #[test]
    fn first_entrant_becomes_owner() {
        let mut room = Room::new(1, RoomConfig::default());
        room.add_player(ALICE).unwrap();
        assert_eq!(room.owner_id(), ALICE);

        room.add_player(BOB).unwrap();
        assert_eq!(room.owner_id(), ALICE);
        assert_eq!(room.members(), &[ALICE, BOB]);
    }

    #[test]
    fn join_twice_fails() {
        let mut room = Room::new(1, RoomConfig::default());
        room.add_player(ALICE).unwrap();
        assert_eq!(room.add_player(ALICE), Err(RoomError::AlreadyInRoom));
    }

    #[test]
    fn third_member_is_refused() {
        let mut room = room_with_members();
        assert_eq!(room.add_player(CAROL), Err(RoomError::RoomFull));
    }

    #[test]
    fn owner_transfers_on_leave() {
        let mut room = room_with_members();
        room.remove_player(ALICE).unwrap();
        assert_eq!(room.owner_id(), BOB);

        room.remove_player(BOB).unwrap();
        assert_eq!(room.owner_id(), 0);
        assert!(room.is_empty());
    }

    #[test]
    fn leaving_clears_seat_and_announces_it() {
        let mut room = room_with_members();
        room.sync_seat(ALICE, ALICE, 0).unwrap();

        let events = room.remove_player(ALICE).unwrap();
        assert_eq!(room.black_seat(), 0);
        assert_eq!(
            events,
            vec![GameEvent::SyncSeat { room_id: 1, black_id: 0, white_id: 0 }]
        );
    }

    #[test]
    fn unseated_leaver_announces_nothing() {
        let mut room = room_with_members();
        let events = room.remove_player(BOB).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn leaving_mid_game_forfeits() {
        let mut room = playing_room();
        let events = room.remove_player(ALICE).unwrap();

        assert_eq!(room.status(), RoomStatus::End);
        assert!(events.contains(&GameEvent::GameEnded { room_id: 1, winner_id: BOB }));
        // Seat is vacated after the forfeit.
        assert_eq!(room.black_seat(), 0);
    }

    #[test]
    fn seat_negotiation_takes_free_seats() {
        let mut room = room_with_members();

        let events = room.sync_seat(ALICE, ALICE, 0).unwrap();
        assert_eq!(room.black_seat(), ALICE);
        assert_eq!(
            events,
            vec![GameEvent::SyncSeat { room_id: 1, black_id: ALICE, white_id: 0 }]
        );

        room.sync_seat(BOB, ALICE, BOB).unwrap();
        assert_eq!(room.white_seat(), BOB);
    }

    #[test]
    fn seat_negotiation_cannot_overwrite_other_player() {
        let mut room = room_with_members();
        room.sync_seat(ALICE, ALICE, 0).unwrap();

        assert_eq!(room.sync_seat(BOB, BOB, 0), Err(RoomError::InvalidSeat));
        assert_eq!(room.black_seat(), ALICE);
    }

    #[test]
    fn seat_negotiation_rejects_two_changes_at_once() {
        let mut room = room_with_members();
        assert_eq!(room.sync_seat(ALICE, ALICE, BOB), Err(RoomError::InvalidSeat));
    }

    #[test]
    fn player_can_vacate_own_seat() {
        let mut room = room_with_members();
        room.sync_seat(ALICE, ALICE, 0).unwrap();

        room.sync_seat(ALICE, 0, 0).unwrap();
        assert_eq!(room.black_seat(), 0);
    }

    #[test]
    fn idempotent_seat_request_still_announces_once() {
        let mut room = room_with_members();
        room.sync_seat(ALICE, ALICE, 0).unwrap();

        let events = room.sync_seat(ALICE, ALICE, 0).unwrap();
        assert_eq!(
            events,
            vec![GameEvent::SyncSeat { room_id: 1, black_id: ALICE, white_id: 0 }]
        );
    }

    #[test]
    fn seat_negotiation_requires_membership() {
        let mut room = room_with_members();
        assert_eq!(room.sync_seat(CAROL, CAROL, 0), Err(RoomError::NotInRoom));
    }

    #[test]
    fn seat_negotiation_locked_while_playing() {
        let mut room = playing_room();
        assert_eq!(room.sync_seat(ALICE, 0, 0), Err(RoomError::AlreadyStarted));
    }

    #[test]
    fn start_requires_owner() {
        let mut room = room_with_members();
        room.sync_seat(ALICE, ALICE, 0).unwrap();
        room.sync_seat(BOB, ALICE, BOB).unwrap();

        assert_eq!(room.start_game(BOB), Err(RoomError::OwnerOnlyStart));
        assert!(room.start_game(ALICE).is_ok());
    }

    #[test]
    fn start_requires_both_seats() {
        let mut room = room_with_members();
        assert_eq!(room.start_game(ALICE), Err(RoomError::SeatsIncomplete));

        room.sync_seat(ALICE, ALICE, 0).unwrap();
        assert_eq!(room.start_game(ALICE), Err(RoomError::SeatsIncomplete));
    }

    #[test]
    fn start_publishes_game_started_and_status() {
        let mut room = room_with_members();
        room.sync_seat(ALICE, ALICE, 0).unwrap();
        room.sync_seat(BOB, ALICE, BOB).unwrap();

        let events = room.start_game(ALICE).unwrap();
        assert_eq!(room.status(), RoomStatus::Playing);
        assert_eq!(events[0], GameEvent::GameStarted { room_id: 1 });
        assert!(matches!(
            &events[1],
            GameEvent::RoomStatusChanged { status, .. } if status == "playing"
        ));
    }

    #[test]
    fn start_twice_fails() {
        let mut room = playing_room();
        assert_eq!(room.start_game(ALICE), Err(RoomError::AlreadyStarted));
    }

    #[test]
    fn black_moves_first() {
        let mut room = playing_room();
        assert_eq!(room.make_move(BOB, 7, 7), Err(RoomError::NotYourTurn));

        let events = room.make_move(ALICE, 7, 7).unwrap();
        assert_eq!(
            events,
            vec![GameEvent::PiecePlaced { room_id: 1, user_id: ALICE, x: 7, y: 7 }]
        );
    }

    #[test]
    fn turns_alternate() {
        let mut room = playing_room();
        room.make_move(ALICE, 7, 7).unwrap();
        assert_eq!(room.make_move(ALICE, 8, 8), Err(RoomError::NotYourTurn));
        room.make_move(BOB, 8, 8).unwrap();
        room.make_move(ALICE, 7, 8).unwrap();
    }

    #[test]
    fn occupied_cell_is_illegal_and_board_unchanged() {
        let mut room = playing_room();
        room.make_move(ALICE, 7, 7).unwrap();

        assert_eq!(room.make_move(BOB, 7, 7), Err(RoomError::IllegalMove));
        assert_eq!(room.board().stone_count(), 1);

        // Still Bob's turn after the failed attempt.
        room.make_move(BOB, 8, 8).unwrap();
    }

    #[test]
    fn out_of_bounds_is_illegal() {
        let mut room = playing_room();
        assert_eq!(room.make_move(ALICE, 99, 0), Err(RoomError::IllegalMove));
    }

    #[test]
    fn unseated_user_cannot_move() {
        let mut room = playing_room();
        assert_eq!(room.make_move(CAROL, 3, 3), Err(RoomError::NotSeated));
    }

    #[test]
    fn move_outside_playing_fails() {
        let mut room = room_with_members();
        assert_eq!(room.make_move(ALICE, 7, 7), Err(RoomError::NotPlaying));
    }

    #[test]
    fn five_in_a_row_ends_game_with_mover_as_winner() {
        let mut room = playing_room();
        for i in 0..4 {
            room.make_move(ALICE, 7, 7 + i).unwrap();
            room.make_move(BOB, 10, i).unwrap();
        }

        let events = room.make_move(ALICE, 7, 11).unwrap();
        assert_eq!(room.status(), RoomStatus::End);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], GameEvent::GameEnded { room_id: 1, winner_id: ALICE });
    }

    #[test]
    fn four_in_a_row_does_not_end_game() {
        let mut room = playing_room();
        for i in 0..3 {
            room.make_move(ALICE, 7, 7 + i).unwrap();
            room.make_move(BOB, 10, i).unwrap();
        }

        let events = room.make_move(ALICE, 7, 10).unwrap();
        assert_eq!(room.status(), RoomStatus::Playing);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn moves_after_end_fail() {
        let mut room = playing_room();
        room.give_up(BOB).unwrap();
        assert_eq!(room.make_move(ALICE, 0, 0), Err(RoomError::NotPlaying));
    }

    #[test]
    fn draw_ask_accept_ends_with_winner_zero() {
        let mut room = playing_room();

        let outcome = room.draw(ALICE, NegStatus::Ask).unwrap();
        assert!(matches!(outcome, NegotiationOutcome::Requested(_)));

        let outcome = room.draw(BOB, NegStatus::Accept).unwrap();
        match outcome {
            NegotiationOutcome::Accepted(events) => {
                assert!(events.contains(&GameEvent::GameEnded { room_id: 1, winner_id: 0 }));
            },
            other => panic!("expected Accepted, got {other:?}"),
        }
        assert_eq!(room.status(), RoomStatus::End);
    }

    #[test]
    fn draw_accept_without_request_fails() {
        let mut room = playing_room();
        assert_eq!(room.draw(BOB, NegStatus::Accept), Err(RoomError::NoPendingDraw));
    }

    #[test]
    fn requester_cannot_accept_own_draw() {
        let mut room = playing_room();
        room.draw(ALICE, NegStatus::Ask).unwrap();
        assert_eq!(room.draw(ALICE, NegStatus::Accept), Err(RoomError::NoPendingDraw));
    }

    #[test]
    fn draw_reject_reports_requester() {
        let mut room = playing_room();
        room.draw(ALICE, NegStatus::Ask).unwrap();

        let outcome = room.draw(BOB, NegStatus::Reject).unwrap();
        assert_eq!(outcome, NegotiationOutcome::Rejected { requester: ALICE });
        assert_eq!(room.status(), RoomStatus::Playing);

        // Request is spent.
        assert_eq!(room.draw(BOB, NegStatus::Accept), Err(RoomError::NoPendingDraw));
    }

    #[test]
    fn second_ask_supersedes_first() {
        let mut room = playing_room();
        room.draw(ALICE, NegStatus::Ask).unwrap();
        room.draw(ALICE, NegStatus::Ask).unwrap();

        let outcome = room.draw(BOB, NegStatus::Accept).unwrap();
        assert!(matches!(outcome, NegotiationOutcome::Accepted(_)));
    }

    #[test]
    fn undo_accept_rolls_exactly_one_ply() {
        let mut room = playing_room();
        room.make_move(ALICE, 7, 7).unwrap();
        room.make_move(BOB, 8, 8).unwrap();

        room.undo(BOB, NegStatus::Ask).unwrap();
        let outcome = room.undo(ALICE, NegStatus::Accept).unwrap();
        assert!(matches!(outcome, NegotiationOutcome::Accepted(_)));

        assert_eq!(room.board().stone_count(), 1);
        // Bob's stone came off, so it is his turn again.
        room.make_move(BOB, 9, 9).unwrap();
    }

    #[test]
    fn undo_respects_takeback_flag() {
        let mut room = room_with_members();
        room.sync_seat(ALICE, ALICE, 0).unwrap();
        room.sync_seat(BOB, ALICE, BOB).unwrap();
        room.edit_settings(
            ALICE,
            &RoomSettingsUpdate { takeback_allowed: Some(false), ..Default::default() },
        )
        .unwrap();
        room.start_game(ALICE).unwrap();
        room.make_move(ALICE, 7, 7).unwrap();

        assert_eq!(room.undo(ALICE, NegStatus::Ask), Err(RoomError::TakebackDisabled));
    }

    #[test]
    fn undo_ask_on_empty_board_fails() {
        let mut room = playing_room();
        assert_eq!(room.undo(ALICE, NegStatus::Ask), Err(RoomError::NothingToUndo));
    }

    #[test]
    fn give_up_awards_opponent() {
        let mut room = playing_room();
        let events = room.give_up(ALICE).unwrap();

        assert_eq!(room.status(), RoomStatus::End);
        assert!(events.contains(&GameEvent::GameEnded { room_id: 1, winner_id: BOB }));
        assert!(events.contains(&GameEvent::GiveUpRequested { room_id: 1, user_id: ALICE }));
    }

    #[test]
    fn give_up_requires_seat() {
        let mut room = playing_room();
        assert_eq!(room.give_up(CAROL), Err(RoomError::NotSeated));
    }

    #[test]
    fn settings_are_owner_only_and_locked_in_game() {
        let mut room = room_with_members();
        let update = RoomSettingsUpdate { ranked: Some(true), ..Default::default() };

        assert_eq!(room.edit_settings(BOB, &update), Err(RoomError::OwnerOnlySettings));
        assert!(room.edit_settings(ALICE, &update).is_ok());
        assert!(room.config().ranked);

        room.sync_seat(ALICE, ALICE, 0).unwrap();
        room.sync_seat(BOB, ALICE, BOB).unwrap();
        room.start_game(ALICE).unwrap();
        assert_eq!(room.edit_settings(ALICE, &update), Err(RoomError::EditWhilePlaying));
    }

    #[test]
    fn board_size_change_rebuilds_board() {
        let mut room = room_with_members();
        room.edit_settings(
            ALICE,
            &RoomSettingsUpdate { board_size: Some(19), ..Default::default() },
        )
        .unwrap();

        assert_eq!(room.board().size(), 19);
        assert_eq!(
            room.edit_settings(
                ALICE,
                &RoomSettingsUpdate { board_size: Some(3), ..Default::default() }
            ),
            Err(RoomError::InvalidBoardSize)
        );
    }

    #[test]
    fn playing_room_upholds_seat_invariant() {
        let room = playing_room();
        assert_eq!(room.members().len(), 2);
        assert_ne!(room.black_seat(), 0);
        assert_ne!(room.white_seat(), 0);
        assert_ne!(room.black_seat(), room.white_seat());
        assert!(room.is_member(room.black_seat()));
        assert!(room.is_member(room.white_seat()));
    }

    #[test]
    fn describe_formats_lobby_line() {
        let room = room_with_members();
        assert_eq!(room.describe(), "#1, free, 15x15 casual (2/2)");
    }
}
