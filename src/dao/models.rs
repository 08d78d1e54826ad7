use serde::{Deserialize, Serialize};
use std::{fmt, time::SystemTime};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle status of a room. Exactly one is active at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Authored but not yet published; not joinable.
    Draft,
    /// Lobby open, players may join.
    Waiting,
    /// A question is being answered.
    Active,
    /// Answers are closed and the vote tally is shown.
    QuestionEnded,
    /// Leaderboard between two questions.
    Leaderboard,
    /// Podium; terminal except for a reset.
    Finished,
}

impl RoomStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Draft => "draft",
            RoomStatus::Waiting => "waiting",
            RoomStatus::Active => "active",
            RoomStatus::QuestionEnded => "question_ended",
            RoomStatus::Leaderboard => "leaderboard",
            RoomStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-room presentation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct RoomConfig {
    /// When the leaderboard is shown (`after_question` by default).
    pub show_leaderboard: String,
    /// Factor applied to every question time limit.
    pub question_timer_multiplier: f64,
    /// Whether players may join without an account.
    pub allow_anonymous: bool,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            show_leaderboard: "after_question".into(),
            question_timer_multiplier: 1.0,
            allow_anonymous: true,
        }
    }
}

/// Room row persisted by the storage layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomEntity {
    /// Primary key of the room.
    pub id: Uuid,
    /// Six digit code players type to join.
    pub pin_code: String,
    /// Opaque identifier of the owning host.
    pub host_id: String,
    /// Display title.
    pub title: String,
    /// Gameplay settings.
    pub config: RoomConfig,
    /// Lifecycle status.
    pub status: RoomStatus,
    /// Index into `game_data`, `-1` before the first question.
    pub current_question_index: i32,
    /// Set every time a question starts.
    pub question_start_at: Option<SystemTime>,
    /// Results of the current question are on screen.
    pub is_showing_results: bool,
    /// Ordered questions of the quiz.
    pub game_data: Vec<Question>,
    /// Creation time.
    pub created_at: SystemTime,
    /// Time of the last write.
    pub updated_at: SystemTime,
}

impl RoomEntity {
    /// Question addressed by `current_question_index`, if the index is in range.
    pub fn current_question(&self) -> Option<&Question> {
        usize::try_from(self.current_question_index)
            .ok()
            .and_then(|index| self.game_data.get(index))
    }
}

/// Player row. At most one exists per `(room_id, device_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEntity {
    /// Primary key.
    pub id: Uuid,
    /// Owning room.
    pub room_id: Uuid,
    /// Display name, unique within the room.
    pub nickname: String,
    /// Opaque identifier persisted on the player's device.
    pub device_id: String,
    /// Total score as last written by the player.
    pub score: i64,
    /// Consecutive correct answers.
    pub streak: u32,
    /// Option id of the last submitted answer.
    pub last_answer: Option<String>,
    /// Insertion time; breaks ties in rankings.
    pub joined_at: SystemTime,
}

/// Best-effort answer counters for a question of a room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionStatsEntity {
    /// Room the question belongs to.
    pub room_id: Uuid,
    /// Question id within the room.
    pub question_id: String,
    /// Answers recorded.
    pub answers: u64,
    /// Correct answers among them.
    pub correct: u64,
}

/// Difficulty label attached to a question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// Easy.
    Easy,
    /// Medium, the default.
    #[default]
    Medium,
    /// Hard.
    Hard,
}

/// A quiz question. The variant-specific payload is flattened next to the
/// common fields and discriminated by `q_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Question {
    /// Identifier, unique within the room.
    pub id: String,
    /// Text shown to players.
    pub statement: String,
    /// Difficulty label.
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Seconds allowed to answer; absent or zero means the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u32>,
    /// Payload specific to the question type.
    #[serde(flatten)]
    pub content: QuestionContent,
}

/// Variant-specific question payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "q_type", rename_all = "snake_case")]
pub enum QuestionContent {
    /// Pick one of several options.
    MultipleChoice {
        /// Options in display order.
        options: Vec<ChoiceOption>,
    },
    /// Pick true or false.
    TrueFalse {
        /// The two options.
        options: Vec<TruthOption>,
    },
    /// Fill a gap in a sentence from a list of words.
    FillGapSelect {
        /// Text before the gap.
        text_start: String,
        /// Text after the gap.
        text_end: String,
        /// Candidate words.
        options: Vec<String>,
        /// Word that fills the gap.
        correct_answer: String,
    },
}

/// Option of a multiple choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChoiceOption {
    /// Option id.
    pub id: String,
    /// Label shown to players.
    pub text: String,
    /// Marks the right answer.
    #[serde(rename = "isCorrect", alias = "is_correct", default)]
    pub is_correct: bool,
}

/// Option of a true/false question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TruthOption {
    /// Which of the two values this is.
    pub id: TruthValue,
    /// Marks the right answer.
    #[serde(rename = "isCorrect", alias = "is_correct", default)]
    pub is_correct: bool,
}

/// Identifier of a true/false option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum TruthValue {
    /// `true`.
    #[serde(rename = "true")]
    True,
    /// `false`.
    #[serde(rename = "false")]
    False,
}

impl TruthValue {
    /// Serialised form, as stored in `last_answer`.
    pub fn as_str(&self) -> &'static str {
        match self {
            TruthValue::True => "true",
            TruthValue::False => "false",
        }
    }
}

impl Question {
    /// Keys players vote with, in display order.
    pub fn option_ids(&self) -> Vec<String> {
        match &self.content {
            QuestionContent::MultipleChoice { options } => {
                options.iter().map(|option| option.id.clone()).collect()
            }
            QuestionContent::TrueFalse { options } => options
                .iter()
                .map(|option| option.id.as_str().to_owned())
                .collect(),
            QuestionContent::FillGapSelect { options, .. } => options.clone(),
        }
    }

    /// Whether `answer` is a correct option id for this question.
    pub fn is_correct(&self, answer: &str) -> bool {
        match &self.content {
            QuestionContent::MultipleChoice { options } => options
                .iter()
                .any(|option| option.is_correct && option.id == answer),
            QuestionContent::TrueFalse { options } => options
                .iter()
                .any(|option| option.is_correct && option.id.as_str() == answer),
            QuestionContent::FillGapSelect { correct_answer, .. } => correct_answer == answer,
        }
    }

    /// Time limit in seconds, falling back to `default` when unset or zero.
    pub fn time_limit_secs(&self, default: u32) -> u32 {
        self.time_limit.filter(|secs| *secs > 0).unwrap_or(default)
    }
}
