//! Immutable client-side snapshot of a live session and its single merge function.
//!
//! Push notifications and poll results are both turned into [`Delta`]s and folded in
//! through [`SessionView::reconcile`], so there is one place that decides whether
//! state changed.

use indexmap::IndexMap;
use uuid::Uuid;

use crate::{
    dao::{
        models::{OptionEntity, ParticipantEntity, QuestionEntity, ScoreEntity, SessionEntity, SessionStatus},
        session_store::{ChangeRow, RowChange},
    },
    dto::{report::QuestionStats, results::ResultRow},
};

/// Question in play with its options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveQuestion {
    /// The question row.
    pub question: QuestionEntity,
    /// Its options, correct flags included.
    pub options: Vec<OptionEntity>,
}

impl ActiveQuestion {
    /// First option marked correct.
    pub fn correct_option(&self) -> Option<Uuid> {
        self.options
            .iter()
            .find(|option| option.is_correct)
            .map(|option| option.id)
    }
}

/// Everything a client knows about one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionView {
    /// Latest session row; `None` until the first snapshot arrives.
    pub session: Option<SessionEntity>,
    /// Keyed by participant id, in the order they were first seen.
    pub participants: IndexMap<Uuid, ParticipantEntity>,
    /// Running score per participant.
    pub scores: IndexMap<Uuid, i64>,
    /// Question in play, loaded once per question.
    pub question: Option<ActiveQuestion>,
    /// Option this client picked for the current question.
    pub answer: Option<Uuid>,
    /// Per-option counts, controller only.
    pub tally: Option<QuestionStats>,
    /// Correct option shown after the local countdown ran out.
    pub revealed: Option<Uuid>,
    /// Final ranking once the session ended and it was computed.
    pub results: Option<Vec<ResultRow>>,
}

/// An incoming piece of state, from push or poll.
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    /// Session row. Older versions are ignored.
    Session(SessionEntity),
    /// Full participant list or a single pushed row.
    Participants(Vec<ParticipantEntity>),
    /// Score rows of the session.
    Scores(Vec<ScoreEntity>),
    /// Question and options fetched for the question in play.
    Question(ActiveQuestion),
    /// This client's answer was recorded.
    Answered {
        /// Question answered.
        question_id: Uuid,
        /// Option picked.
        option_id: Uuid,
    },
    /// Answer counts for the question in play.
    Tally(QuestionStats),
    /// The local countdown ran out; show the correct option.
    Reveal {
        /// Question whose window closed.
        question_id: Uuid,
        /// Its correct option.
        option_id: Uuid,
    },
    /// Final ranking.
    Results(Vec<ResultRow>),
}

impl Delta {
    /// Delta carried by a change notification. Answers and results are picked up by polling.
    pub fn from_change(change: &RowChange) -> Option<Self> {
        match &change.row {
            ChangeRow::Session(session) => Some(Delta::Session(session.clone())),
            ChangeRow::Participant(participant) => {
                Some(Delta::Participants(vec![participant.clone()]))
            }
            ChangeRow::Score(score) => Some(Delta::Scores(vec![score.clone()])),
            ChangeRow::Answer(_) | ChangeRow::Result(_) => None,
        }
    }
}

/// What a merge changed, in the order reactions should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewChange {
    /// The session moved to another question, or to none.
    QuestionChanged {
        /// New question in play.
        question_id: Option<Uuid>,
        /// Countdown of the new question.
        time_limit_sec: u32,
    },
    /// The session status changed.
    Status {
        /// Previous status, `None` on the first snapshot.
        from: Option<SessionStatus>,
        /// New status.
        to: SessionStatus,
    },
    /// A participant was seen for the first time.
    ParticipantJoined(Uuid),
    /// A participant's score moved.
    ScoreChanged {
        /// Whose score.
        participant_id: Uuid,
        /// New value.
        value: i64,
    },
    /// Question details arrived.
    QuestionLoaded(Uuid),
    /// The answer to this question was recorded.
    Answered(Uuid),
    /// New answer counts.
    TallyUpdated,
    /// Correct option revealed.
    Revealed(Uuid),
    /// Results arrived.
    ResultsLoaded,
}

/// Outcome of a merge that changed something.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    /// Snapshot after the merge.
    pub view: SessionView,
    /// Differences from the previous snapshot.
    pub changes: Vec<ViewChange>,
}

impl SessionView {
    /// Status of the session, once known.
    pub fn status(&self) -> Option<SessionStatus> {
        self.session.as_ref().map(|session| session.status)
    }

    /// Question in play according to the latest session row.
    pub fn current_question_id(&self) -> Option<Uuid> {
        self.session
            .as_ref()
            .and_then(|session| session.current_question_id)
    }

    /// Score of one participant, if a score row was seen.
    pub fn score_of(&self, participant_id: Uuid) -> Option<i64> {
        self.scores.get(&participant_id).copied()
    }

    fn is_current(&self, question_id: Uuid) -> bool {
        self.current_question_id() == Some(question_id)
    }

    /// Merge `delta` into a new snapshot. `None` when nothing differs.
    pub fn reconcile(&self, delta: Delta) -> Option<Reconciled> {
        let mut next = self.clone();
        let mut changes = Vec::new();

        match delta {
            Delta::Session(incoming) => {
                if let Some(cached) = &self.session {
                    if cached.id != incoming.id || incoming.version < cached.version {
                        return None;
                    }
                    if *cached == incoming {
                        return None;
                    }
                }
                if self.current_question_id() != incoming.current_question_id {
                    changes.push(ViewChange::QuestionChanged {
                        question_id: incoming.current_question_id,
                        time_limit_sec: incoming.time_limit_sec,
                    });
                    next.question = None;
                    next.answer = None;
                    next.tally = None;
                    next.revealed = None;
                }
                if self.status() != Some(incoming.status) {
                    changes.push(ViewChange::Status {
                        from: self.status(),
                        to: incoming.status,
                    });
                }
                next.session = Some(incoming);
            }
            Delta::Participants(participants) => {
                for participant in participants {
                    if self
                        .session
                        .as_ref()
                        .is_some_and(|session| session.id != participant.session_id)
                    {
                        continue;
                    }
                    if next.participants.get(&participant.id) == Some(&participant) {
                        continue;
                    }
                    if !next.participants.contains_key(&participant.id) {
                        changes.push(ViewChange::ParticipantJoined(participant.id));
                    }
                    next.participants.insert(participant.id, participant);
                }
                if next.participants == self.participants {
                    return None;
                }
            }
            Delta::Scores(scores) => {
                for score in scores {
                    if self
                        .session
                        .as_ref()
                        .is_some_and(|session| session.id != score.session_id)
                    {
                        continue;
                    }
                    let cached = next.scores.get(&score.participant_id).copied();
                    // Scores never decrease, so an older snapshot cannot lower them.
                    if cached.is_some_and(|value| value >= score.value) {
                        continue;
                    }
                    next.scores.insert(score.participant_id, score.value);
                    changes.push(ViewChange::ScoreChanged {
                        participant_id: score.participant_id,
                        value: score.value,
                    });
                }
            }
            Delta::Question(active) => {
                let question_id = active.question.id;
                if !self.is_current(question_id) || self.question.as_ref() == Some(&active) {
                    return None;
                }
                next.question = Some(active);
                changes.push(ViewChange::QuestionLoaded(question_id));
            }
            Delta::Answered {
                question_id,
                option_id,
            } => {
                if !self.is_current(question_id) || self.answer.is_some() {
                    return None;
                }
                next.answer = Some(option_id);
                changes.push(ViewChange::Answered(option_id));
            }
            Delta::Tally(stats) => {
                if !self.is_current(stats.question_id) || self.tally.as_ref() == Some(&stats) {
                    return None;
                }
                next.tally = Some(stats);
                changes.push(ViewChange::TallyUpdated);
            }
            Delta::Reveal {
                question_id,
                option_id,
            } => {
                if !self.is_current(question_id) || self.revealed == Some(option_id) {
                    return None;
                }
                next.revealed = Some(option_id);
                changes.push(ViewChange::Revealed(option_id));
            }
            Delta::Results(rows) => {
                if self.results.as_ref() == Some(&rows) {
                    return None;
                }
                next.results = Some(rows);
                changes.push(ViewChange::ResultsLoaded);
            }
        }

        if changes.is_empty() && next == *self {
            return None;
        }
        Some(Reconciled {
            view: next,
            changes,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    fn lobby() -> SessionEntity {
        SessionEntity::lobby(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "QUIZ42".into(),
            SystemTime::now(),
        )
    }

    fn running(session: &SessionEntity, question_id: Uuid) -> SessionEntity {
        let mut next = session.clone();
        next.status = SessionStatus::Running;
        next.current_question_id = Some(question_id);
        next.time_limit_sec = 15;
        next.version = session.version + 1;
        next
    }

    fn merged(view: &SessionView, delta: Delta) -> Reconciled {
        view.reconcile(delta).expect("delta should change the view")
    }

    fn active(question_id: Uuid) -> ActiveQuestion {
        ActiveQuestion {
            question: QuestionEntity {
                id: question_id,
                quiz_id: Uuid::nil(),
                text: "2 + 2?".into(),
                order_index: 0,
                time_limit_sec: 15,
            },
            options: vec![OptionEntity {
                id: Uuid::new_v4(),
                question_id,
                text: "4".into(),
                is_correct: true,
            }],
        }
    }

    #[test]
    fn same_snapshot_twice_is_a_no_op() {
        let session = lobby();
        let first = merged(&SessionView::default(), Delta::Session(session.clone()));
        assert_eq!(
            first.changes,
            vec![ViewChange::Status {
                from: None,
                to: SessionStatus::Lobby
            }]
        );
        assert!(first.view.reconcile(Delta::Session(session)).is_none());
    }

    #[test]
    fn older_session_versions_are_ignored() {
        let session = lobby();
        let question_id = Uuid::new_v4();
        let newer = running(&session, question_id);
        let view = merged(&SessionView::default(), Delta::Session(newer)).view;

        assert!(view.reconcile(Delta::Session(session)).is_none());
        assert_eq!(view.current_question_id(), Some(question_id));
    }

    #[test]
    fn question_change_clears_question_scoped_state() {
        let session = lobby();
        let q1 = Uuid::new_v4();
        let q2 = Uuid::new_v4();
        let mut view = merged(&SessionView::default(), Delta::Session(running(&session, q1))).view;
        view = merged(&view, Delta::Question(active(q1))).view;
        view = merged(
            &view,
            Delta::Answered {
                question_id: q1,
                option_id: Uuid::new_v4(),
            },
        )
        .view;
        assert!(view.question.is_some() && view.answer.is_some());

        let mut advanced = running(view.session.as_ref().unwrap(), q2);
        advanced.time_limit_sec = 30;
        let outcome = merged(&view, Delta::Session(advanced));
        assert_eq!(
            outcome.changes,
            vec![ViewChange::QuestionChanged {
                question_id: Some(q2),
                time_limit_sec: 30
            }]
        );
        assert!(outcome.view.question.is_none());
        assert!(outcome.view.answer.is_none());
        assert!(outcome.view.tally.is_none());
    }

    #[test]
    fn stale_question_payloads_are_dropped() {
        let session = lobby();
        let q1 = Uuid::new_v4();
        let view = merged(&SessionView::default(), Delta::Session(running(&session, q1))).view;

        assert!(view.reconcile(Delta::Question(active(Uuid::new_v4()))).is_none());
        assert!(
            view.reconcile(Delta::Answered {
                question_id: Uuid::new_v4(),
                option_id: Uuid::new_v4()
            })
            .is_none()
        );
    }

    #[test]
    fn first_local_answer_stands() {
        let session = lobby();
        let q1 = Uuid::new_v4();
        let first = Uuid::new_v4();
        let mut view = merged(&SessionView::default(), Delta::Session(running(&session, q1))).view;
        view = merged(
            &view,
            Delta::Answered {
                question_id: q1,
                option_id: first,
            },
        )
        .view;
        assert!(
            view.reconcile(Delta::Answered {
                question_id: q1,
                option_id: Uuid::new_v4()
            })
            .is_none()
        );
        assert_eq!(view.answer, Some(first));
    }

    #[test]
    fn scores_only_move_up() {
        let session_id = Uuid::new_v4();
        let participant_id = Uuid::new_v4();
        let mut score = ScoreEntity::zero(session_id, participant_id, SystemTime::now());
        score.value = 200;
        let view = merged(&SessionView::default(), Delta::Scores(vec![score.clone()])).view;

        score.value = 100;
        assert!(view.reconcile(Delta::Scores(vec![score.clone()])).is_none());
        assert_eq!(view.score_of(participant_id), Some(200));

        score.value = 300;
        let outcome = merged(&view, Delta::Scores(vec![score]));
        assert_eq!(
            outcome.changes,
            vec![ViewChange::ScoreChanged {
                participant_id,
                value: 300
            }]
        );
    }

    #[test]
    fn participant_polls_upsert_and_never_shrink() {
        let session = lobby();
        let view = merged(&SessionView::default(), Delta::Session(session.clone())).view;
        let participant = |alias: &str| ParticipantEntity {
            id: Uuid::new_v4(),
            session_id: session.id,
            identity_id: None,
            alias: alias.into(),
            is_guest: true,
            joined_at: SystemTime::now(),
        };
        let ann = participant("Ann");
        let ann_again = participant("Ann");

        let outcome = merged(
            &view,
            Delta::Participants(vec![ann.clone(), ann_again.clone()]),
        );
        assert_eq!(
            outcome.changes,
            vec![
                ViewChange::ParticipantJoined(ann.id),
                ViewChange::ParticipantJoined(ann_again.id)
            ]
        );

        let view = outcome.view;
        assert!(view.reconcile(Delta::Participants(vec![ann.clone()])).is_none());
        assert!(view.reconcile(Delta::Participants(Vec::new())).is_none());
        assert_eq!(view.participants.len(), 2);
    }

    #[test]
    fn push_rows_map_to_deltas() {
        let session = lobby();
        let change = RowChange {
            kind: crate::dao::session_store::ChangeKind::Update,
            row: ChangeRow::Session(session.clone()),
        };
        assert_eq!(Delta::from_change(&change), Some(Delta::Session(session)));
    }
}
