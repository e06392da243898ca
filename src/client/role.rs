use uuid::Uuid;

use crate::client::ClientError;

/// Who a client acts for. Every client operation is checked against this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientRole {
    /// The session owner driving transitions.
    Controller {
        /// Identity owning the session.
        owner_id: Uuid,
    },
    /// A joined player.
    Participant {
        /// Participant row the client answers for.
        participant_id: Uuid,
    },
}

/// Operations gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Start, advance, pause, resume and end.
    DriveSession,
    /// Answer the question in play.
    SubmitAnswer,
    /// See per-option answer counts live.
    ViewAnswerTally,
}

impl ClientRole {
    /// Whether the role grants `capability`.
    pub fn allows(&self, capability: Capability) -> bool {
        matches!(
            (self, capability),
            (
                ClientRole::Controller { .. },
                Capability::DriveSession | Capability::ViewAnswerTally
            ) | (ClientRole::Participant { .. }, Capability::SubmitAnswer)
        )
    }

    /// Fail with [`ClientError::NotPermitted`] unless the role has `capability`.
    pub fn require(&self, capability: Capability) -> Result<(), ClientError> {
        if self.allows(capability) {
            Ok(())
        } else {
            Err(ClientError::NotPermitted(capability))
        }
    }

    /// Participant id, for participants.
    pub fn participant_id(&self) -> Option<Uuid> {
        match self {
            ClientRole::Participant { participant_id } => Some(*participant_id),
            ClientRole::Controller { .. } => None,
        }
    }

    /// Owner id, for controllers.
    pub fn owner_id(&self) -> Option<Uuid> {
        match self {
            ClientRole::Controller { owner_id } => Some(*owner_id),
            ClientRole::Participant { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_follow_the_role() {
        let controller = ClientRole::Controller {
            owner_id: Uuid::new_v4(),
        };
        let participant = ClientRole::Participant {
            participant_id: Uuid::new_v4(),
        };

        assert!(controller.allows(Capability::DriveSession));
        assert!(controller.allows(Capability::ViewAnswerTally));
        assert!(!controller.allows(Capability::SubmitAnswer));

        assert!(participant.allows(Capability::SubmitAnswer));
        assert!(matches!(
            participant.require(Capability::DriveSession),
            Err(ClientError::NotPermitted(Capability::DriveSession))
        ));
        assert!(participant.require(Capability::ViewAnswerTally).is_err());
    }
}
