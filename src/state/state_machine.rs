use std::{fmt, time::Instant};

use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::{RoomEntity, RoomStatus};

/// Index value meaning no question has been started yet.
pub const NOT_STARTED: i32 = -1;

/// Status of a room together with the question it points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPhase {
    /// Room status.
    pub status: RoomStatus,
    /// Current question, `NOT_STARTED` before the first one.
    pub question_index: i32,
}

impl SessionPhase {
    /// Build a phase.
    pub fn new(status: RoomStatus, question_index: i32) -> Self {
        Self {
            status,
            question_index,
        }
    }

    /// Phase mirrored from a stored room row.
    pub fn of(room: &RoomEntity) -> Self {
        Self::new(room.status, room.current_question_index)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.status, self.question_index)
    }
}

/// Why a question was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The host pressed "end question".
    HostAction,
    /// The countdown reached zero.
    TimerExpired,
}

/// Events that can be applied to the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Draft content is published and the lobby opens.
    Publish,
    /// Players are wiped and the room returns to the lobby.
    Reset,
    /// Start the question at `index`.
    StartQuestion {
        /// Zero-based position in the question list.
        index: usize,
    },
    /// Close the running question.
    EndQuestion(EndReason),
    /// Show the leaderboard after a question.
    ShowLeaderboard,
    /// Move to the next question, or to the podium after the last one.
    Advance,
}

/// Facts the transition table needs beyond the current phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionContext {
    /// Questions in the room.
    pub question_count: usize,
    /// Players in the room.
    pub player_count: usize,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: SessionPhase,
    /// The event that cannot be applied from this phase.
    pub event: SessionEvent,
}

/// Errors that can occur when planning a state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current phase.
    InvalidTransition(InvalidTransition),
    /// The transition exists but its precondition does not hold.
    Rejected(String),
}

/// Errors that can occur when applying a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// State machine phase changed since the plan was created.
    PhaseMismatch {
        /// Phase when plan was created.
        expected: SessionPhase,
        /// Current phase.
        actual: SessionPhase,
    },
    /// State machine version changed since the plan was created.
    VersionMismatch {
        /// Version when plan was created.
        expected: usize,
        /// Current version.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A planned state machine transition that has been validated but not yet applied.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Phase the state machine is currently in.
    pub from: SessionPhase,
    /// Phase the state machine will transition to.
    pub to: SessionPhase,
    /// Event that triggered this transition.
    pub event: SessionEvent,
    /// Version number after applying this transition.
    pub version_next: usize,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
}

impl Plan {
    /// Write the planned phase into `room`, returning the row to persist.
    pub fn apply_to(&self, mut room: RoomEntity, now: std::time::SystemTime) -> RoomEntity {
        room.status = self.to.status;
        room.current_question_index = self.to.question_index;
        match self.event {
            SessionEvent::Reset => {
                room.is_showing_results = false;
            }
            SessionEvent::StartQuestion { .. } | SessionEvent::Advance
                if self.to.status == RoomStatus::Active =>
            {
                room.question_start_at = Some(now);
                room.is_showing_results = false;
            }
            _ => {}
        }
        room.updated_at = now;
        room
    }
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Current phase of the state machine.
    pub phase: SessionPhase,
    /// Version number of the state machine (increments on each transition).
    pub version: usize,
    /// Pending transition phase, if a transition is planned but not yet applied.
    pub pending: Option<SessionPhase>,
}

/// State machine of a live quiz room.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    phase: SessionPhase,
    version: usize,
    pending: Option<Plan>,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new(SessionPhase::new(RoomStatus::Draft, NOT_STARTED))
    }
}

impl SessionStateMachine {
    /// Create a state machine mirroring `phase`.
    pub fn new(phase: SessionPhase) -> Self {
        Self {
            phase,
            version: 0,
            pending: None,
        }
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Create a snapshot of the current state machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to),
        }
    }

    /// Align the mirror with a phase read from the store.
    ///
    /// Ignored while a plan is pending; the plan's own outcome wins.
    pub fn observe(&mut self, phase: SessionPhase) -> bool {
        if self.pending.is_some() || self.phase == phase {
            return false;
        }
        self.phase = phase;
        self.version += 1;
        true
    }

    /// Plan a transition by validating that the event can be applied from the current phase.
    /// Returns a Plan that can later be applied or aborted.
    pub fn plan(
        &mut self,
        event: SessionEvent,
        context: TransitionContext,
    ) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = compute_transition(self.phase, event, context)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase,
            to: next,
            event,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition, moving the state machine to the next phase.
    /// Returns the new phase after the transition.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<SessionPhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected_plan_id = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected: expected_plan_id,
                got: plan_id,
            });
        }

        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.phase = plan.to;
        self.version = plan.version_next;

        Ok(self.phase)
    }

    /// Abort a planned transition without applying it, returning the state machine to its previous state.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }
}

/// Transition table. The index never moves backwards except through a reset.
pub fn compute_transition(
    from: SessionPhase,
    event: SessionEvent,
    context: TransitionContext,
) -> Result<SessionPhase, PlanError> {
    use RoomStatus::*;

    let invalid = || PlanError::InvalidTransition(InvalidTransition { from, event });

    let next = match (from.status, event) {
        (_, SessionEvent::Reset) => SessionPhase::new(Waiting, NOT_STARTED),
        (Draft, SessionEvent::Publish) => SessionPhase::new(Waiting, NOT_STARTED),
        (Waiting, SessionEvent::StartQuestion { index }) => {
            if context.player_count == 0 {
                return Err(PlanError::Rejected(
                    "at least one player must join before starting".into(),
                ));
            }
            if index >= context.question_count {
                return Err(PlanError::Rejected(format!(
                    "question index {index} is out of range ({} questions)",
                    context.question_count
                )));
            }
            let index = i32::try_from(index).map_err(|_| invalid())?;
            SessionPhase::new(Active, index)
        }
        (Active, SessionEvent::EndQuestion(_)) => {
            SessionPhase::new(QuestionEnded, from.question_index)
        }
        (QuestionEnded, SessionEvent::ShowLeaderboard) => {
            SessionPhase::new(Leaderboard, from.question_index)
        }
        (Leaderboard, SessionEvent::Advance) => {
            let next_index = from.question_index + 1;
            match usize::try_from(next_index) {
                Ok(next) if next < context.question_count => SessionPhase::new(Active, next_index),
                _ => SessionPhase::new(Finished, from.question_index),
            }
        }
        _ => return Err(invalid()),
    };

    Ok(next)
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::dao::models::RoomConfig;

    const CONTEXT: TransitionContext = TransitionContext {
        question_count: 2,
        player_count: 3,
    };

    fn apply(sm: &mut SessionStateMachine, event: SessionEvent) -> SessionPhase {
        let plan = sm.plan(event, CONTEXT).unwrap();
        sm.apply(plan.id).unwrap()
    }

    fn phase(status: RoomStatus, index: i32) -> SessionPhase {
        SessionPhase::new(status, index)
    }

    #[test]
    fn initial_state_is_draft() {
        let sm = SessionStateMachine::default();
        assert_eq!(sm.phase(), phase(RoomStatus::Draft, NOT_STARTED));
    }

    #[test]
    fn full_happy_path_through_two_questions() {
        let mut sm = SessionStateMachine::default();

        assert_eq!(
            apply(&mut sm, SessionEvent::Publish),
            phase(RoomStatus::Waiting, -1)
        );
        assert_eq!(
            apply(&mut sm, SessionEvent::StartQuestion { index: 0 }),
            phase(RoomStatus::Active, 0)
        );
        assert_eq!(
            apply(&mut sm, SessionEvent::EndQuestion(EndReason::TimerExpired)),
            phase(RoomStatus::QuestionEnded, 0)
        );
        assert_eq!(
            apply(&mut sm, SessionEvent::ShowLeaderboard),
            phase(RoomStatus::Leaderboard, 0)
        );
        assert_eq!(
            apply(&mut sm, SessionEvent::Advance),
            phase(RoomStatus::Active, 1)
        );
        assert_eq!(
            apply(&mut sm, SessionEvent::EndQuestion(EndReason::HostAction)),
            phase(RoomStatus::QuestionEnded, 1)
        );
        apply(&mut sm, SessionEvent::ShowLeaderboard);
        assert_eq!(
            apply(&mut sm, SessionEvent::Advance),
            phase(RoomStatus::Finished, 1)
        );
        assert_eq!(sm.snapshot().version, 8);
    }

    #[test]
    fn reset_is_allowed_from_every_status() {
        for status in [
            RoomStatus::Draft,
            RoomStatus::Waiting,
            RoomStatus::Active,
            RoomStatus::QuestionEnded,
            RoomStatus::Leaderboard,
            RoomStatus::Finished,
        ] {
            let mut sm = SessionStateMachine::new(phase(status, 0));
            assert_eq!(
                apply(&mut sm, SessionEvent::Reset),
                phase(RoomStatus::Waiting, NOT_STARTED)
            );
        }
    }

    #[test]
    fn finished_is_terminal_except_for_reset() {
        let mut sm = SessionStateMachine::new(phase(RoomStatus::Finished, 1));
        for event in [
            SessionEvent::Publish,
            SessionEvent::StartQuestion { index: 0 },
            SessionEvent::EndQuestion(EndReason::HostAction),
            SessionEvent::ShowLeaderboard,
            SessionEvent::Advance,
        ] {
            let err = sm.plan(event, CONTEXT).unwrap_err();
            assert!(matches!(err, PlanError::InvalidTransition(_)), "{event:?}");
        }
    }

    #[test]
    fn start_requires_players_and_valid_index() {
        let mut sm = SessionStateMachine::new(phase(RoomStatus::Waiting, NOT_STARTED));

        let empty = TransitionContext {
            question_count: 2,
            player_count: 0,
        };
        assert!(matches!(
            sm.plan(SessionEvent::StartQuestion { index: 0 }, empty),
            Err(PlanError::Rejected(_))
        ));
        assert!(matches!(
            sm.plan(SessionEvent::StartQuestion { index: 2 }, CONTEXT),
            Err(PlanError::Rejected(_))
        ));
        assert!(sm.snapshot().pending.is_none());
    }

    #[test]
    fn skipping_phases_is_rejected() {
        let mut sm = SessionStateMachine::new(phase(RoomStatus::Active, 0));
        let err = sm.plan(SessionEvent::ShowLeaderboard, CONTEXT).unwrap_err();
        match err {
            PlanError::InvalidTransition(invalid) => {
                assert_eq!(invalid.from, phase(RoomStatus::Active, 0));
                assert_eq!(invalid.event, SessionEvent::ShowLeaderboard);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn only_one_plan_may_be_pending() {
        let mut sm = SessionStateMachine::new(phase(RoomStatus::Active, 0));
        let plan = sm
            .plan(SessionEvent::EndQuestion(EndReason::TimerExpired), CONTEXT)
            .unwrap();
        assert_eq!(
            sm.plan(SessionEvent::EndQuestion(EndReason::HostAction), CONTEXT)
                .unwrap_err(),
            PlanError::AlreadyPending
        );
        sm.abort(plan.id).unwrap();
        assert_eq!(sm.phase(), phase(RoomStatus::Active, 0));
        assert!(sm.snapshot().pending.is_none());
    }

    #[test]
    fn apply_with_wrong_id_keeps_plan_pending() {
        let mut sm = SessionStateMachine::new(phase(RoomStatus::QuestionEnded, 0));
        let plan = sm.plan(SessionEvent::ShowLeaderboard, CONTEXT).unwrap();
        let err = sm.apply(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApplyError::IdMismatch { .. }));
        assert_eq!(sm.apply(plan.id).unwrap(), phase(RoomStatus::Leaderboard, 0));
    }

    #[test]
    fn observe_is_ignored_while_pending() {
        let mut sm = SessionStateMachine::new(phase(RoomStatus::Waiting, NOT_STARTED));
        let plan = sm
            .plan(SessionEvent::StartQuestion { index: 0 }, CONTEXT)
            .unwrap();
        assert!(!sm.observe(phase(RoomStatus::Finished, 1)));
        sm.abort(plan.id).unwrap();
        assert!(sm.observe(phase(RoomStatus::Finished, 1)));
        assert_eq!(sm.phase(), phase(RoomStatus::Finished, 1));
    }

    #[test]
    fn plan_writes_start_time_only_when_entering_active() {
        let room = RoomEntity {
            id: Uuid::new_v4(),
            pin_code: "123456".into(),
            host_id: "h".into(),
            title: "t".into(),
            config: RoomConfig::default(),
            status: RoomStatus::Leaderboard,
            current_question_index: 1,
            question_start_at: None,
            is_showing_results: true,
            game_data: vec![],
            created_at: SystemTime::UNIX_EPOCH,
            updated_at: SystemTime::UNIX_EPOCH,
        };
        let now = SystemTime::now();

        let mut sm = SessionStateMachine::new(SessionPhase::of(&room));
        let plan = sm.plan(SessionEvent::Advance, CONTEXT).unwrap();
        let finished = plan.apply_to(room.clone(), now);
        assert_eq!(finished.status, RoomStatus::Finished);
        assert_eq!(finished.current_question_index, 1);
        assert_eq!(finished.question_start_at, None);
        sm.abort(plan.id).unwrap();

        let plan = sm.plan(SessionEvent::Reset, CONTEXT).unwrap();
        let reset = plan.apply_to(room, now);
        assert_eq!(reset.status, RoomStatus::Waiting);
        assert_eq!(reset.current_question_index, NOT_STARTED);
        assert!(!reset.is_showing_results);
    }
}
