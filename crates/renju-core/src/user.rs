//! User entity: account data, result counters, and rank derivation.
//!
//! The rank name is a pure function of the numeric score through a fixed
//! threshold table. Score arithmetic itself (the rating update) is an
//! external collaborator; game finalisation only records results and
//! re-derives the rank.

/// Score thresholds and the rank names they unlock, ascending.
pub const RANK_TABLE: [(i32, &str); 14] = [
    (0, "30K"),
    (100, "25K"),
    (300, "20K"),
    (500, "15K"),
    (800, "10K"),
    (1200, "5K"),
    (1500, "1D"),
    (1800, "2D"),
    (2100, "3D"),
    (2400, "4D"),
    (2700, "5D"),
    (3000, "6D"),
    (3500, "7D"),
    (4000, "9D"),
];

/// Rank name for a score: the highest threshold not exceeding it.
#[must_use]
pub fn rank_for_score(score: f64) -> &'static str {
    let score = score as i32;
    let mut rank = RANK_TABLE[0].1;
    for (threshold, name) in RANK_TABLE {
        if score >= threshold {
            rank = name;
        } else {
            break;
        }
    }
    rank
}

use serde::{Deserialize, Serialize};

/// A persistent account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Monotonic id minted by the store or database.
    pub id: u64,
    /// Unique, case-sensitive login name.
    pub username: String,
    /// Password, compared verbatim on login.
    pub password: String,
    /// Rank name derived from score.
    pub rank: String,
    /// Position on the ladder; maintained externally.
    pub ranking: i32,
    /// Rating score; arithmetic is the rating module's concern.
    pub score: f64,
    /// Games won.
    pub win_count: u32,
    /// Games lost.
    pub lose_count: u32,
    /// Games drawn.
    pub draw_count: u32,
}

impl User {
    /// Create a fresh account with zeroed results.
    #[must_use]
    pub fn new(id: u64, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            password: password.into(),
            rank: RANK_TABLE[0].1.to_string(),
            ranking: 0,
            score: 0.0,
            win_count: 0,
            lose_count: 0,
            draw_count: 0,
        }
    }

    /// Total games played.
    #[must_use]
    pub fn games_played(&self) -> u32 {
        self.win_count + self.lose_count + self.draw_count
    }

    /// Record a win and refresh the rank.
    pub fn record_win(&mut self) {
        self.win_count += 1;
        self.refresh_rank();
    }

    /// Record a loss and refresh the rank.
    pub fn record_loss(&mut self) {
        self.lose_count += 1;
        self.refresh_rank();
    }

    /// Record a draw and refresh the rank.
    pub fn record_draw(&mut self) {
        self.draw_count += 1;
        self.refresh_rank();
    }

    /// Re-derive the rank name from the current score.
    pub fn refresh_rank(&mut self) {
        self.rank = rank_for_score(self.score).to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_user_starts_at_bottom_rank() {
        let user = User::new(1, "a", "p");
        assert_eq!(user.rank, "30K");
        assert_eq!(user.games_played(), 0);
    }

    #[test]
    fn rank_thresholds_are_inclusive() {
        assert_eq!(rank_for_score(0.0), "30K");
        assert_eq!(rank_for_score(99.9), "30K");
        assert_eq!(rank_for_score(100.0), "25K");
        assert_eq!(rank_for_score(1499.0), "5K");
        assert_eq!(rank_for_score(1500.0), "1D");
        assert_eq!(rank_for_score(3999.0), "7D");
        assert_eq!(rank_for_score(4000.0), "9D");
        assert_eq!(rank_for_score(99_999.0), "9D");
    }

    #[test]
    fn negative_score_clamps_to_bottom() {
        assert_eq!(rank_for_score(-250.0), "30K");
    }

    #[test]
    fn counters_accumulate() {
        let mut user = User::new(1, "a", "p");
        user.record_win();
        user.record_win();
        user.record_loss();
        user.record_draw();

        assert_eq!(user.win_count, 2);
        assert_eq!(user.lose_count, 1);
        assert_eq!(user.draw_count, 1);
        assert_eq!(user.games_played(), 4);
    }

    #[test]
    fn rank_follows_score_change() {
        let mut user = User::new(1, "a", "p");
        user.score = 2100.0;
        user.refresh_rank();
        assert_eq!(user.rank, "3D");
    }
}
