//! DTO definitions for the host surface, including the full snapshot pushed on every change.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::models::{Question, RoomStatus},
    dto::room::{PlayerSummary, RoomSummary},
    services::leaderboard::{self, Ranked, Vote},
    state::session::HostView,
};

/// Start a question; defaults to the first one.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct StartQuestionRequest {
    /// Zero-based question index.
    #[serde(default)]
    pub index: Option<usize>,
}

/// Player row as seen by the host, with its presence flag.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HostPlayer {
    /// Stored row.
    #[serde(flatten)]
    pub player: PlayerSummary,
    /// Device attached to the presence channel.
    pub online: bool,
}

/// Votes received by one option.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VoteCount {
    /// Option id as stored in `last_answer`.
    pub option_id: String,
    /// Number of players that picked it.
    pub votes: usize,
}

impl From<Vote> for VoteCount {
    fn from(vote: Vote) -> Self {
        Self {
            option_id: vote.option_id,
            votes: vote.votes,
        }
    }
}

/// One row of the leaderboard or podium.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    /// 1-based position.
    pub rank: usize,
    /// Ranked player.
    pub player_id: Uuid,
    /// Display name.
    pub nickname: String,
    /// Total score.
    pub score: i64,
    /// Consecutive correct answers.
    pub streak: u32,
    /// Streak above the configured threshold.
    pub on_fire: bool,
}

impl From<Ranked<'_>> for LeaderboardEntry {
    fn from(row: Ranked<'_>) -> Self {
        Self {
            rank: row.rank,
            player_id: row.player.id,
            nickname: row.player.nickname.clone(),
            score: row.player.score,
            streak: row.player.streak,
            on_fire: row.on_fire,
        }
    }
}

/// Everything the host screen renders, rebuilt after each change.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HostSnapshot {
    /// False until the mount barrier completed.
    pub ready: bool,
    /// Cached room row, absent before the first load.
    pub room: Option<RoomSummary>,
    /// Players in join order.
    pub players: Vec<HostPlayer>,
    /// Remaining seconds of the running question.
    pub time_left: Option<u32>,
    /// Current question while it is active or being reviewed.
    pub question: Option<Question>,
    /// Set when the room points at a question that does not exist.
    pub question_error: Option<String>,
    /// Votes per option while results are shown.
    pub vote_tally: Option<Vec<VoteCount>>,
    /// Standings while the leaderboard is shown.
    pub leaderboard: Option<Vec<LeaderboardEntry>>,
    /// Top three once the game finished.
    pub podium: Option<Vec<LeaderboardEntry>>,
}

impl HostSnapshot {
    /// Render the view for the host screen.
    pub fn build(view: &HostView, config: &AppConfig, ready: bool) -> Self {
        let players: Vec<_> = view.players.values().cloned().collect();
        let host_players = players
            .iter()
            .map(|player| HostPlayer {
                player: player.into(),
                online: view.is_online(&player.device_id),
            })
            .collect();

        let mut snapshot = Self {
            ready,
            room: view.room.as_ref().map(RoomSummary::from),
            players: host_players,
            time_left: view.time_left,
            question: None,
            question_error: None,
            vote_tally: None,
            leaderboard: None,
            podium: None,
        };

        let Some(room) = view.room.as_ref() else {
            return snapshot;
        };

        match room.status {
            RoomStatus::Active | RoomStatus::QuestionEnded => match room.current_question() {
                Some(question) => {
                    if room.status == RoomStatus::QuestionEnded {
                        snapshot.vote_tally = Some(
                            leaderboard::vote_tally(question, &players)
                                .into_iter()
                                .map(Into::into)
                                .collect(),
                        );
                    }
                    snapshot.question = Some(question.clone());
                }
                None => {
                    snapshot.question_error = Some(format!(
                        "question {} not found ({} questions in room)",
                        room.current_question_index,
                        room.game_data.len()
                    ));
                }
            },
            RoomStatus::Leaderboard => {
                snapshot.leaderboard = Some(
                    leaderboard::leaderboard(
                        &players,
                        config.leaderboard_size(),
                        config.streak_threshold(),
                    )
                    .into_iter()
                    .map(Into::into)
                    .collect(),
                );
            }
            RoomStatus::Finished => {
                snapshot.podium = Some(
                    leaderboard::podium(&players, config.podium_size(), config.streak_threshold())
                        .into_iter()
                        .map(Into::into)
                        .collect(),
                );
            }
            RoomStatus::Draft | RoomStatus::Waiting => {}
        }

        snapshot
    }
}

/// Countdown update pushed once per second while a question runs.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TimerTick {
    /// Question the countdown belongs to.
    pub question_index: i32,
    /// Whole seconds left.
    pub time_left: u32,
}
