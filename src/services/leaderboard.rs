//! Read-only aggregation over the player set: vote tally, leaderboard, podium.

use crate::dao::models::{PlayerEntity, Question};

/// Number of players that picked one option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    /// Option id.
    pub option_id: String,
    /// Players that picked it.
    pub votes: usize,
}

/// One ranked row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranked<'a> {
    /// 1-based position.
    pub rank: usize,
    /// Ranked row.
    pub player: &'a PlayerEntity,
    /// Streak strictly above the configured threshold.
    pub on_fire: bool,
}

/// Count `last_answer` values per option of `question`, in option order.
/// Answers that match no option are ignored.
pub fn vote_tally(question: &Question, players: &[PlayerEntity]) -> Vec<Vote> {
    question
        .option_ids()
        .into_iter()
        .map(|option_id| {
            let votes = players
                .iter()
                .filter(|player| player.last_answer.as_deref() == Some(option_id.as_str()))
                .count();
            Vote { option_id, votes }
        })
        .collect()
}

/// Top `size` players by score. `players` must be in insertion order; the sort
/// is stable so ties keep that order.
pub fn leaderboard(players: &[PlayerEntity], size: usize, streak_threshold: u32) -> Vec<Ranked<'_>> {
    let mut ranked: Vec<&PlayerEntity> = players.iter().collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked
        .into_iter()
        .take(size)
        .enumerate()
        .map(|(position, player)| Ranked {
            rank: position + 1,
            player,
            on_fire: player.streak > streak_threshold,
        })
        .collect()
}

/// Final podium; same ordering rule as [`leaderboard`].
pub fn podium(players: &[PlayerEntity], size: usize, streak_threshold: u32) -> Vec<Ranked<'_>> {
    leaderboard(players, size, streak_threshold)
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use uuid::Uuid;

    use super::*;
    use crate::dao::models::{ChoiceOption, Difficulty, QuestionContent};

    fn player(nickname: &str, score: i64, streak: u32, last_answer: Option<&str>) -> PlayerEntity {
        PlayerEntity {
            id: Uuid::new_v4(),
            room_id: Uuid::nil(),
            nickname: nickname.into(),
            device_id: format!("device-{nickname}"),
            score,
            streak,
            last_answer: last_answer.map(Into::into),
            joined_at: SystemTime::now(),
        }
    }

    fn abcd() -> Question {
        let option = |id: &str, is_correct| ChoiceOption {
            id: id.into(),
            text: id.to_uppercase(),
            is_correct,
        };
        Question {
            id: "q".into(),
            statement: "pick".into(),
            difficulty: Difficulty::Medium,
            time_limit: None,
            content: QuestionContent::MultipleChoice {
                options: vec![
                    option("a", false),
                    option("b", true),
                    option("c", false),
                    option("d", false),
                ],
            },
        }
    }

    #[test]
    fn tally_counts_each_option_in_order() {
        let players = vec![
            player("p1", 0, 0, Some("a")),
            player("p2", 0, 0, Some("a")),
            player("p3", 0, 0, Some("c")),
            player("p4", 0, 0, None),
            player("p5", 0, 0, Some("zzz")),
        ];
        let tally = vote_tally(&abcd(), &players);
        let counts: Vec<(&str, usize)> = tally
            .iter()
            .map(|vote| (vote.option_id.as_str(), vote.votes))
            .collect();
        assert_eq!(counts, vec![("a", 2), ("b", 0), ("c", 1), ("d", 0)]);
    }

    #[test]
    fn leaderboard_sorts_desc_and_keeps_join_order_on_ties() {
        let players = vec![
            player("first", 100, 0, None),
            player("second", 300, 3, None),
            player("third", 100, 2, None),
            player("fourth", 50, 0, None),
            player("fifth", 10, 0, None),
            player("sixth", 5, 0, None),
        ];
        let board = leaderboard(&players, 5, 2);
        let names: Vec<&str> = board.iter().map(|row| row.player.nickname.as_str()).collect();
        assert_eq!(names, vec!["second", "first", "third", "fourth", "fifth"]);
        assert_eq!(board[0].rank, 1);
        assert!(board[0].on_fire);
        // Streak equal to the threshold is not enough.
        assert!(!board[2].on_fire);
    }

    #[test]
    fn podium_takes_top_three() {
        let players = vec![
            player("a", 10, 0, None),
            player("b", 30, 0, None),
            player("c", 20, 0, None),
            player("d", 40, 0, None),
        ];
        let names: Vec<&str> = podium(&players, 3, 2)
            .iter()
            .map(|row| row.player.nickname.as_str())
            .collect();
        assert_eq!(names, vec!["d", "b", "c"]);
    }

    #[test]
    fn empty_room_yields_empty_rankings() {
        assert!(leaderboard(&[], 5, 2).is_empty());
        assert!(vote_tally(&abcd(), &[]).iter().all(|vote| vote.votes == 0));
    }
}
