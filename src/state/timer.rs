use std::time::Duration;

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::debug;

use crate::dao::models::Question;

const TICK: Duration = Duration::from_secs(1);

/// Messages a running countdown sends back to its host session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSignal {
    /// Seconds left on the question at `question_index`.
    Tick {
        /// Question the countdown belongs to.
        question_index: i32,
        /// Whole seconds left.
        remaining: u32,
    },
    /// The countdown of `question_index` reached zero.
    Expired {
        /// Question that ran out of time.
        question_index: i32,
    },
}

/// Host-local countdown. At most one runs at a time; arming a new one cancels
/// the previous countdown.
pub struct TimerAuthority {
    signals: mpsc::UnboundedSender<TimerSignal>,
    running: Option<Countdown>,
}

struct Countdown {
    question_index: i32,
    task: JoinHandle<()>,
}

impl TimerAuthority {
    /// Idle authority reporting on `signals`.
    pub fn new(signals: mpsc::UnboundedSender<TimerSignal>) -> Self {
        Self {
            signals,
            running: None,
        }
    }

    /// Start counting down `seconds` for the question at `question_index`.
    pub fn arm(&mut self, question_index: i32, seconds: u32) {
        self.cancel();
        debug!(question_index, seconds, "arming question timer");
        let signals = self.signals.clone();
        let task = tokio::spawn(countdown(question_index, seconds, signals));
        self.running = Some(Countdown {
            question_index,
            task,
        });
    }

    /// Stop the running countdown, if any.
    pub fn cancel(&mut self) {
        if let Some(countdown) = self.running.take() {
            debug!(
                question_index = countdown.question_index,
                "cancelling question timer"
            );
            countdown.task.abort();
        }
    }

    /// Question index of the running countdown.
    pub fn armed_for(&self) -> Option<i32> {
        self.running
            .as_ref()
            .filter(|countdown| !countdown.task.is_finished())
            .map(|countdown| countdown.question_index)
    }
}

impl Drop for TimerAuthority {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn countdown(question_index: i32, seconds: u32, signals: mpsc::UnboundedSender<TimerSignal>) {
    let mut remaining = seconds;
    let mut ticker = interval_at(Instant::now() + TICK, TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    if signals
        .send(TimerSignal::Tick {
            question_index,
            remaining,
        })
        .is_err()
    {
        return;
    }

    while remaining > 0 {
        ticker.tick().await;
        remaining -= 1;
        if signals
            .send(TimerSignal::Tick {
                question_index,
                remaining,
            })
            .is_err()
        {
            return;
        }
    }

    let _ = signals.send(TimerSignal::Expired { question_index });
}

/// Countdown length for `question`: its time limit (or `default_secs`) scaled
/// by `multiplier`, rounded, at least one second.
pub fn seed_seconds(question: &Question, multiplier: f64, default_secs: u32) -> u32 {
    let base = f64::from(question.time_limit_secs(default_secs));
    let multiplier = if multiplier.is_finite() && multiplier > 0.0 {
        multiplier
    } else {
        1.0
    };
    let scaled = (base * multiplier).round();
    if scaled < 1.0 {
        1
    } else if scaled >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        scaled as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{Difficulty, QuestionContent};

    fn question(time_limit: Option<u32>) -> Question {
        Question {
            id: "q".into(),
            statement: "s".into(),
            difficulty: Difficulty::Medium,
            time_limit,
            content: QuestionContent::TrueFalse { options: vec![] },
        }
    }

    #[test]
    fn seed_applies_multiplier_and_floor() {
        assert_eq!(seed_seconds(&question(Some(20)), 1.0, 30), 20);
        assert_eq!(seed_seconds(&question(None), 1.0, 30), 30);
        assert_eq!(seed_seconds(&question(Some(10)), 1.5, 30), 15);
        assert_eq!(seed_seconds(&question(Some(1)), 0.1, 30), 1);
        assert_eq!(seed_seconds(&question(Some(10)), f64::NAN, 30), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_ticks_then_expires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = TimerAuthority::new(tx);
        timer.arm(0, 2);

        assert_eq!(
            rx.recv().await,
            Some(TimerSignal::Tick {
                question_index: 0,
                remaining: 2
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(TimerSignal::Tick {
                question_index: 0,
                remaining: 1
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(TimerSignal::Tick {
                question_index: 0,
                remaining: 0
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(TimerSignal::Expired { question_index: 0 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_countdown_never_expires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = TimerAuthority::new(tx.clone());
        timer.arm(3, 2);
        assert!(matches!(rx.recv().await, Some(TimerSignal::Tick { .. })));

        timer.cancel();
        assert_eq!(timer.armed_for(), None);
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(timer);
        drop(tx);

        while let Some(signal) = rx.recv().await {
            assert!(!matches!(signal, TimerSignal::Expired { .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_the_previous_countdown() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = TimerAuthority::new(tx);
        timer.arm(0, 30);
        timer.arm(1, 1);
        assert_eq!(timer.armed_for(), Some(1));

        let mut expired = None;
        while let Some(signal) = rx.recv().await {
            if let TimerSignal::Expired { question_index } = signal {
                expired = Some(question_index);
                break;
            }
        }
        assert_eq!(expired, Some(1));
    }
}
