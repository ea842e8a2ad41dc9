use serde::Serialize;

use crate::connected::{ConnectedMeetingsState, ConnectedParticipant};
use crate::participants::{Participant, ParticipantRef, Roster, scoped_identifier};

/// Prefix reserved for rooms that exist only in the draft.
pub const TEMP_ID_PREFIX: &str = "draft-";

pub fn temporary_meeting_id() -> String {
    format!("{TEMP_ID_PREFIX}{}", uuid::Uuid::new_v4())
}

pub fn is_temporary_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// One room of the draft layout, either the main meeting or a breakout room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftMeeting {
    pub id: String,
    pub title: Option<String>,
    pub is_parent: bool,
    /// Participant identifiers, in assignment order.
    pub participants: Vec<String>,
}

impl DraftMeeting {
    /// A breakout room that the server does not know about yet.
    pub fn new_room(title: String) -> Self {
        Self {
            id: temporary_meeting_id(),
            title: Some(title),
            is_parent: false,
            participants: Vec::new(),
        }
    }

    fn parent(id: String, title: Option<String>) -> Self {
        Self {
            id,
            title,
            is_parent: true,
            participants: Vec::new(),
        }
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.participants.iter().any(|p| p == identifier)
    }

    pub fn is_temporary(&self) -> bool {
        is_temporary_id(&self.id)
    }
}

/// Read-only copy of the draft layout handed to UI code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftSnapshot {
    pub parent_meeting: DraftMeeting,
    pub meetings: Vec<DraftMeeting>,
}

/// The hypothesised room layout.
///
/// Passive container: the manager is the only writer and keeps every
/// identifier in at most one roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftState {
    parent_meeting: DraftMeeting,
    meetings: Vec<DraftMeeting>,
    roster: Roster,
}

impl Default for DraftState {
    fn default() -> Self {
        Self {
            parent_meeting: DraftMeeting::parent(String::new(), None),
            meetings: Vec::new(),
            roster: Roster::new(),
        }
    }
}

impl DraftState {
    /// Builds a draft from a server layout.
    ///
    /// People in the main meeting land in the unassigned pool. A person seen
    /// in more than one meeting keeps one entry per session, the later ones
    /// scoped by meeting id.
    pub fn from_server(state: &ConnectedMeetingsState) -> Self {
        let parent = &state.parent_meeting;
        let mut draft = Self {
            parent_meeting: DraftMeeting::parent(parent.id.clone(), parent.title.clone()),
            meetings: Vec::with_capacity(state.meetings.len()),
            roster: Roster::new(),
        };

        for participant in &parent.participants {
            draft.register(participant, &parent.id);
        }

        for meeting in &state.meetings {
            let mut room = DraftMeeting {
                id: meeting.id.clone(),
                title: meeting.title.clone(),
                is_parent: false,
                participants: Vec::with_capacity(meeting.participants.len()),
            };
            for participant in &meeting.participants {
                if let Some(identifier) = draft.register(participant, &meeting.id) {
                    room.participants.push(identifier);
                }
            }
            draft.meetings.push(room);
        }

        draft
    }

    fn register(&mut self, participant: &ConnectedParticipant, meeting_id: &str) -> Option<String> {
        let mut entry = Participant::from_record(ParticipantRef::connected(participant, meeting_id));
        if self.roster.contains(&entry.identifier) {
            let scoped = scoped_identifier(&entry.identifier, meeting_id);
            if self.roster.contains(&scoped) {
                return None;
            }
            entry.identifier = scoped;
        }
        let identifier = entry.identifier.clone();
        self.roster.add(entry);
        Some(identifier)
    }

    pub fn parent_meeting(&self) -> &DraftMeeting {
        &self.parent_meeting
    }

    pub fn meetings(&self) -> &[DraftMeeting] {
        &self.meetings
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn snapshot(&self) -> DraftSnapshot {
        DraftSnapshot {
            parent_meeting: self.parent_meeting.clone(),
            meetings: self.meetings.clone(),
        }
    }

    /// Parent first, then breakout rooms in creation order.
    pub fn all_connected_meetings(&self) -> Vec<&DraftMeeting> {
        std::iter::once(&self.parent_meeting)
            .chain(self.meetings.iter())
            .collect()
    }

    pub fn room(&self, id: &str) -> Option<&DraftMeeting> {
        if self.parent_meeting.id == id {
            return Some(&self.parent_meeting);
        }
        self.meetings.iter().find(|m| m.id == id)
    }

    pub fn participant(&self, identifier: &str) -> Option<&Participant> {
        self.roster.get(identifier)
    }

    /// Room whose roster holds the participant, if any.
    pub fn room_of(&self, identifier: &str) -> Option<&str> {
        self.all_connected_meetings()
            .into_iter()
            .find(|m| m.contains(identifier))
            .map(|m| m.id.as_str())
    }

    /// Where the participant ends up once applied: unassigned means main room.
    pub fn effective_room(&self, identifier: &str) -> &str {
        self.room_of(identifier)
            .unwrap_or(self.parent_meeting.id.as_str())
    }

    /// Roster minus everyone placed in a room. Computed on every call.
    pub fn unassigned_participants(&self) -> Vec<&Participant> {
        self.roster
            .iter()
            .filter(|p| self.room_of(&p.identifier).is_none())
            .collect()
    }

    pub(crate) fn room_mut(&mut self, id: &str) -> Option<&mut DraftMeeting> {
        if self.parent_meeting.id == id {
            return Some(&mut self.parent_meeting);
        }
        self.meetings.iter_mut().find(|m| m.id == id)
    }

    pub(crate) fn meetings_mut(&mut self) -> &mut Vec<DraftMeeting> {
        &mut self.meetings
    }

    pub(crate) fn push_meeting(&mut self, meeting: DraftMeeting) {
        self.meetings.push(meeting);
    }

    /// Removes a breakout room. The parent can never be removed.
    pub(crate) fn remove_meeting(&mut self, id: &str) -> Option<DraftMeeting> {
        let idx = self.meetings.iter().position(|m| m.id == id)?;
        Some(self.meetings.remove(idx))
    }

    /// Takes the participant out of whichever roster holds it.
    pub(crate) fn detach(&mut self, identifier: &str) -> bool {
        let mut found = false;
        for meeting in std::iter::once(&mut self.parent_meeting).chain(self.meetings.iter_mut()) {
            let before = meeting.participants.len();
            meeting.participants.retain(|p| p != identifier);
            found |= meeting.participants.len() != before;
        }
        found
    }

    pub(crate) fn add_participant(&mut self, participant: Participant) -> bool {
        self.roster.add(participant)
    }

    pub(crate) fn remove_participant(&mut self, identifier: &str) -> bool {
        self.detach(identifier);
        self.roster.remove(identifier).is_some()
    }

    /// Replays the edits this draft made on top of `base` onto a newer
    /// server layout.
    ///
    /// Temporary rooms, renames and placements that differ from `base`
    /// survive. People the server no longer lists are dropped, and so are
    /// rooms it deleted. A server-id room `base` never had (one just
    /// created) is kept until the server shows it. Rooms the server added
    /// since `base` are appended.
    pub(crate) fn rebase(&self, base: &DraftState, latest: &DraftState) -> DraftState {
        let mut parent_meeting = DraftMeeting {
            participants: Vec::new(),
            ..latest.parent_meeting.clone()
        };
        if self.parent_meeting.title != base.parent_meeting.title {
            parent_meeting.title = self.parent_meeting.title.clone();
        }

        let mut meetings = Vec::with_capacity(self.meetings.len());
        for meeting in &self.meetings {
            let known = base.room(&meeting.id);
            let title = match latest.meetings.iter().find(|m| m.id == meeting.id) {
                _ if meeting.is_temporary() => meeting.title.clone(),
                Some(server) if known.is_some_and(|b| b.title == meeting.title) => {
                    server.title.clone()
                }
                Some(_) => meeting.title.clone(),
                None if known.is_none() => meeting.title.clone(),
                None => {
                    tracing::debug!("rebase: room {} is gone from the server", meeting.id);
                    continue;
                }
            };
            meetings.push(DraftMeeting {
                title,
                participants: Vec::new(),
                ..meeting.clone()
            });
        }
        for server in &latest.meetings {
            if self.room(&server.id).is_none() && base.room(&server.id).is_none() {
                meetings.push(DraftMeeting {
                    participants: Vec::new(),
                    ..server.clone()
                });
            }
        }

        let mut rebased = DraftState {
            parent_meeting,
            meetings,
            roster: latest.roster.clone(),
        };
        for participant in latest.roster.iter() {
            let identifier = &participant.identifier;
            let before = if base.roster.contains(identifier) {
                base.effective_room(identifier)
            } else {
                base.parent_meeting.id.as_str()
            };
            let edited =
                self.roster.contains(identifier) && self.effective_room(identifier) != before;
            let placement = if edited {
                self.room_of(identifier)
            } else {
                latest.room_of(identifier)
            };
            if let Some(room) = placement.and_then(|id| rebased.room_mut(id)) {
                room.participants.push(identifier.clone());
            }
        }
        rebased
    }

    /// Swaps a temporary id for the one the server assigned.
    pub(crate) fn rename_meeting_id(&mut self, from: &str, to: &str) {
        if let Some(meeting) = self.meetings.iter_mut().find(|m| m.id == from) {
            meeting.id = to.to_string();
        }
    }
}
