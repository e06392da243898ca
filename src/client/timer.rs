//! Local, advisory countdown for the question in play.
//!
//! Every client runs its own timer against the question it observed. Expiry only closes
//! the local answer window; the store never checks elapsed time.

use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

/// State of the local answer window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerWindow {
    /// No question in play.
    Idle,
    /// Answers accepted.
    Open,
    /// Session paused; the countdown is stopped.
    Frozen,
    /// Countdown reached zero.
    Closed,
}

/// Emitted by [`QuestionTimer::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// The countdown of this question reached zero.
    Expired {
        /// Question whose countdown ran out.
        question_id: Uuid,
    },
}

#[derive(Debug, Clone)]
struct Countdown {
    question_id: Uuid,
    /// `None` when the question is untimed.
    limit: Option<Duration>,
    started_at: Instant,
    frozen_at: Option<Instant>,
    frozen_total: Duration,
    expired: bool,
}

impl Countdown {
    fn elapsed(&self, now: Instant) -> Duration {
        let until = self.frozen_at.unwrap_or(now);
        until
            .saturating_duration_since(self.started_at)
            .saturating_sub(self.frozen_total)
    }

    fn run_out(&self, now: Instant) -> bool {
        self.limit.is_some_and(|limit| self.elapsed(now) >= limit)
    }
}

/// Countdown of one question, freezable while the session is paused.
#[derive(Debug, Clone, Default)]
pub struct QuestionTimer {
    countdown: Option<Countdown>,
}

impl QuestionTimer {
    /// Idle timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting down `limit_sec` for `question_id`, replacing any previous countdown.
    ///
    /// A limit of zero leaves the question untimed.
    pub fn start(&mut self, question_id: Uuid, limit_sec: u32, now: Instant) {
        self.countdown = Some(Countdown {
            question_id,
            limit: (limit_sec > 0).then(|| Duration::from_secs(u64::from(limit_sec))),
            started_at: now,
            frozen_at: None,
            frozen_total: Duration::ZERO,
            expired: false,
        });
    }

    /// Stop the clock while paused.
    pub fn freeze(&mut self, now: Instant) {
        if let Some(countdown) = self.countdown.as_mut() {
            if countdown.frozen_at.is_none() && !countdown.expired {
                countdown.frozen_at = Some(now);
            }
        }
    }

    /// Restart the clock; paused time is not counted.
    pub fn resume(&mut self, now: Instant) {
        if let Some(countdown) = self.countdown.as_mut() {
            if let Some(frozen_at) = countdown.frozen_at.take() {
                countdown.frozen_total += now.saturating_duration_since(frozen_at);
            }
        }
    }

    /// Drop the countdown.
    pub fn stop(&mut self) {
        self.countdown = None;
    }

    /// Question being counted down.
    pub fn question_id(&self) -> Option<Uuid> {
        self.countdown.as_ref().map(|countdown| countdown.question_id)
    }

    /// Report expiry, at most once per started question.
    pub fn poll(&mut self, now: Instant) -> Option<TimerEvent> {
        let countdown = self.countdown.as_mut()?;
        if countdown.expired || countdown.frozen_at.is_some() || !countdown.run_out(now) {
            return None;
        }
        countdown.expired = true;
        Some(TimerEvent::Expired {
            question_id: countdown.question_id,
        })
    }

    /// Time left, or `None` when idle or untimed.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let countdown = self.countdown.as_ref()?;
        let limit = countdown.limit?;
        Some(limit.saturating_sub(countdown.elapsed(now)))
    }

    /// Active (unfrozen) time since the question started.
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.countdown
            .as_ref()
            .map_or(Duration::ZERO, |countdown| countdown.elapsed(now))
    }

    /// Whether an answer may be sent right now.
    pub fn window(&self, now: Instant) -> AnswerWindow {
        match &self.countdown {
            None => AnswerWindow::Idle,
            Some(countdown) if countdown.expired || countdown.run_out(now) => AnswerWindow::Closed,
            Some(countdown) if countdown.frozen_at.is_some() => AnswerWindow::Frozen,
            Some(_) => AnswerWindow::Open,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(value: u64) -> Duration {
        Duration::from_secs(value)
    }

    #[test]
    fn expires_once_after_the_limit() {
        let t0 = Instant::now();
        let question_id = Uuid::new_v4();
        let mut timer = QuestionTimer::new();
        assert_eq!(timer.window(t0), AnswerWindow::Idle);

        timer.start(question_id, 10, t0);
        assert_eq!(timer.window(t0 + secs(3)), AnswerWindow::Open);
        assert_eq!(timer.remaining(t0 + secs(3)), Some(secs(7)));
        assert_eq!(timer.poll(t0 + secs(9)), None);

        assert_eq!(
            timer.poll(t0 + secs(10)),
            Some(TimerEvent::Expired { question_id })
        );
        assert_eq!(timer.poll(t0 + secs(11)), None);
        assert_eq!(timer.window(t0 + secs(11)), AnswerWindow::Closed);
        assert_eq!(timer.remaining(t0 + secs(11)), Some(Duration::ZERO));
    }

    #[test]
    fn frozen_time_does_not_count() {
        let t0 = Instant::now();
        let mut timer = QuestionTimer::new();
        timer.start(Uuid::new_v4(), 10, t0);

        timer.freeze(t0 + secs(4));
        assert_eq!(timer.window(t0 + secs(30)), AnswerWindow::Frozen);
        assert_eq!(timer.poll(t0 + secs(30)), None);
        assert_eq!(timer.elapsed(t0 + secs(30)), secs(4));

        timer.resume(t0 + secs(30));
        assert_eq!(timer.remaining(t0 + secs(31)), Some(secs(5)));
        assert!(timer.poll(t0 + secs(35)).is_none());
        assert!(timer.poll(t0 + secs(36)).is_some());
    }

    #[test]
    fn zero_limit_never_expires() {
        let t0 = Instant::now();
        let mut timer = QuestionTimer::new();
        timer.start(Uuid::new_v4(), 0, t0);
        assert_eq!(timer.poll(t0 + secs(3_600)), None);
        assert_eq!(timer.remaining(t0 + secs(3_600)), None);
        assert_eq!(timer.window(t0 + secs(3_600)), AnswerWindow::Open);
    }

    #[test]
    fn restart_replaces_the_previous_question() {
        let t0 = Instant::now();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        let mut timer = QuestionTimer::new();
        timer.start(first, 5, t0);
        assert!(timer.poll(t0 + secs(5)).is_some());

        timer.start(second, 5, t0 + secs(6));
        assert_eq!(timer.question_id(), Some(second));
        assert_eq!(timer.window(t0 + secs(6)), AnswerWindow::Open);
        assert_eq!(
            timer.poll(t0 + secs(11)),
            Some(TimerEvent::Expired { question_id: second })
        );

        timer.stop();
        assert_eq!(timer.window(t0 + secs(12)), AnswerWindow::Idle);
    }
}
