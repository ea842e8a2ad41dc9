use serde::{Deserialize, Serialize};

use crate::connected::ConnectedParticipant;

/// The local user as reported by the meeting SDK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfParticipant {
    pub user_id: String,
    #[serde(default)]
    pub custom_participant_id: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub display_picture_url: Option<String>,
}

/// Any participant-shaped record the SDK hands out.
#[derive(Debug, Clone, Copy)]
pub enum ParticipantRef<'a> {
    /// A participant listed inside one of the connected meetings.
    Connected {
        participant: &'a ConnectedParticipant,
        meeting_id: &'a str,
    },
    /// The local user, which carries no meeting id.
    LocalSelf(&'a SelfParticipant),
}

impl<'a> ParticipantRef<'a> {
    pub fn connected(participant: &'a ConnectedParticipant, meeting_id: &'a str) -> Self {
        Self::Connected {
            participant,
            meeting_id,
        }
    }

    fn custom_participant_id(&self) -> Option<&'a str> {
        let id = match self {
            Self::Connected { participant, .. } => participant.custom_participant_id.as_deref(),
            Self::LocalSelf(p) => p.custom_participant_id.as_deref(),
        };
        id.filter(|id| !id.is_empty())
    }

    fn user_id(&self) -> &'a str {
        match self {
            Self::Connected { participant, .. } => &participant.user_id,
            Self::LocalSelf(p) => &p.user_id,
        }
    }
}

/// Canonical identifier of a participant.
///
/// The custom participant id survives reconnects, so it wins when present.
/// Records without one fall back to the user id.
pub fn participant_identifier(record: ParticipantRef<'_>) -> String {
    record
        .custom_participant_id()
        .unwrap_or_else(|| record.user_id())
        .to_string()
}

/// Identifier for a second session of the same person in another room.
pub fn scoped_identifier(identifier: &str, meeting_id: &str) -> String {
    format!("{identifier}@{meeting_id}")
}

/// A participant known to the draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Key used inside room rosters.
    pub identifier: String,
    /// Id passed to the SDK when moving this participant.
    pub sdk_id: String,
    pub display_name: String,
    pub picture_url: Option<String>,
}

impl Participant {
    pub fn from_record(record: ParticipantRef<'_>) -> Self {
        let identifier = participant_identifier(record);
        let (display_name, picture_url) = match record {
            ParticipantRef::Connected { participant, .. } => (
                participant.display_name.clone(),
                participant.display_picture_url.clone(),
            ),
            ParticipantRef::LocalSelf(p) => (p.display_name.clone(), p.display_picture_url.clone()),
        };
        Self {
            sdk_id: identifier.clone(),
            identifier,
            display_name,
            picture_url,
        }
    }
}

/// Ordered, duplicate-free list of every participant in the meeting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    participants: Vec<Participant>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the identifier is already known.
    pub fn add(&mut self, participant: Participant) -> bool {
        if self.contains(&participant.identifier) {
            return false;
        }
        self.participants.push(participant);
        true
    }

    pub fn remove(&mut self, identifier: &str) -> Option<Participant> {
        let idx = self
            .participants
            .iter()
            .position(|p| p.identifier == identifier)?;
        Some(self.participants.remove(idx))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.get(identifier).is_some()
    }

    pub fn get(&self, identifier: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.identifier == identifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
