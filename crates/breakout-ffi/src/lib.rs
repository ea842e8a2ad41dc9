//! UniFFI bindings for breakout-core.
//!
//! Exposes the draft manager as a synchronous `BreakoutDraft` object. The
//! host feeds it server state, edits the draft, then runs the operations of
//! a commit request against its own meeting SDK and reports back.

use std::sync::Mutex;

use breakout_core::{
    BreakoutError as CoreBreakoutError, BreakoutRoomsManager, ChangeOperation as CoreChangeOperation,
    CommitOutcome, CommitTicket, ConnectedMeeting as CoreConnectedMeeting,
    ConnectedMeetingsState as CoreConnectedMeetingsState,
    ConnectedParticipant as CoreConnectedParticipant, DraftMeeting, DraftSnapshot as CoreDraftSnapshot,
    Participant as CoreParticipant, SettingsStore,
};

uniffi::include_scaffolding!("breakout");

// ── Namespace functions ──────────────────────────────────────────────

/// Initialize tracing/logging. Call once from the host before using BreakoutDraft.
fn init_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "breakout_core=debug,breakout_ffi=debug".parse().unwrap()),
            )
            .with_ansi(false)
            .init();
    });
}

// ── FFI-safe type conversions ──────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConnectedParticipant {
    pub id: String,
    pub user_id: String,
    pub custom_participant_id: Option<String>,
    pub display_name: String,
    pub display_picture_url: Option<String>,
}

impl From<ConnectedParticipant> for CoreConnectedParticipant {
    fn from(p: ConnectedParticipant) -> Self {
        Self {
            id: p.id,
            user_id: p.user_id,
            custom_participant_id: p.custom_participant_id,
            display_name: p.display_name,
            display_picture_url: p.display_picture_url,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectedMeeting {
    pub id: String,
    pub title: Option<String>,
    pub participants: Vec<ConnectedParticipant>,
}

impl From<ConnectedMeeting> for CoreConnectedMeeting {
    fn from(m: ConnectedMeeting) -> Self {
        Self {
            id: m.id,
            title: m.title,
            participants: m.participants.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectedMeetingsState {
    pub parent_meeting: ConnectedMeeting,
    pub meetings: Vec<ConnectedMeeting>,
}

impl From<ConnectedMeetingsState> for CoreConnectedMeetingsState {
    fn from(s: ConnectedMeetingsState) -> Self {
        Self {
            parent_meeting: s.parent_meeting.into(),
            meetings: s.meetings.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub id: String,
    pub title: Option<String>,
    pub is_parent: bool,
    pub participants: Vec<String>,
}

impl From<DraftMeeting> for Room {
    fn from(m: DraftMeeting) -> Self {
        Self {
            id: m.id,
            title: m.title,
            is_parent: m.is_parent,
            participants: m.participants,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub identifier: String,
    pub sdk_id: String,
    pub display_name: String,
    pub picture_url: Option<String>,
}

impl From<CoreParticipant> for Participant {
    fn from(p: CoreParticipant) -> Self {
        Self {
            identifier: p.identifier,
            sdk_id: p.sdk_id,
            display_name: p.display_name,
            picture_url: p.picture_url,
        }
    }
}

impl From<Participant> for CoreParticipant {
    fn from(p: Participant) -> Self {
        Self {
            identifier: p.identifier,
            sdk_id: p.sdk_id,
            display_name: p.display_name,
            picture_url: p.picture_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DraftSnapshot {
    pub parent_meeting: Room,
    pub meetings: Vec<Room>,
}

impl From<CoreDraftSnapshot> for DraftSnapshot {
    fn from(s: CoreDraftSnapshot) -> Self {
        Self {
            parent_meeting: s.parent_meeting.into(),
            meetings: s.meetings.into_iter().map(Room::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeOperation {
    Create { temp_id: String, title: String },
    Rename { meeting_id: String, title: String },
    Move {
        participant: String,
        sdk_id: String,
        source_meeting_id: String,
        destination_meeting_id: String,
    },
    Delete { meeting_id: String },
}

impl From<CoreChangeOperation> for ChangeOperation {
    fn from(op: CoreChangeOperation) -> Self {
        match op {
            CoreChangeOperation::Create(c) => Self::Create {
                temp_id: c.temp_id,
                title: c.title,
            },
            CoreChangeOperation::Rename(r) => Self::Rename {
                meeting_id: r.meeting_id,
                title: r.title,
            },
            CoreChangeOperation::Move(m) => Self::Move {
                participant: m.participant,
                sdk_id: m.sdk_id,
                source_meeting_id: m.source_meeting_id,
                destination_meeting_id: m.destination_meeting_id,
            },
            CoreChangeOperation::Delete { meeting_id } => Self::Delete { meeting_id },
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub generation: u64,
    pub operations: Vec<ChangeOperation>,
}

#[derive(Debug, Clone)]
pub struct CreatedRoom {
    pub temp_id: String,
    pub meeting_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakoutSettings {
    pub default_room_count: u32,
    pub min_rooms: u32,
    pub room_title_min_chars: u32,
    pub room_title_prefix: String,
}

impl From<breakout_core::BreakoutSettings> for BreakoutSettings {
    fn from(s: breakout_core::BreakoutSettings) -> Self {
        Self {
            default_room_count: s.default_room_count,
            min_rooms: s.min_rooms,
            room_title_min_chars: s.room_title_min_chars as u32,
            room_title_prefix: s.room_title_prefix,
        }
    }
}

// ── Error conversion ──────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum BreakoutError {
    #[error("Invalid target: {msg}")]
    InvalidTarget { msg: String },
    #[error("Invalid title: {msg}")]
    InvalidTitle { msg: String },
    #[error("Not permitted: {msg}")]
    NotPermitted { msg: String },
    #[error("Remote error: {msg}")]
    Remote { msg: String },
    #[error("Settings error: {msg}")]
    Settings { msg: String },
}

impl From<CoreBreakoutError> for BreakoutError {
    fn from(e: CoreBreakoutError) -> Self {
        tracing::error!("BreakoutError: {e}");
        match e {
            CoreBreakoutError::InvalidTarget(msg) => Self::InvalidTarget { msg },
            CoreBreakoutError::InvalidTitle(msg) => Self::InvalidTitle { msg },
            CoreBreakoutError::NotPermitted(msg) => Self::NotPermitted { msg },
            CoreBreakoutError::Remote(msg) => Self::Remote { msg },
            CoreBreakoutError::Settings(msg) => Self::Settings { msg },
        }
    }
}

// ── BreakoutDraft: main FFI object ────────────────────────────────────

pub struct BreakoutDraft {
    manager: Mutex<BreakoutRoomsManager>,
    /// Ticket of the latest commit handed to the host.
    ticket: Mutex<Option<CommitTicket>>,
    settings: SettingsStore,
}

impl BreakoutDraft {
    pub fn new(data_dir: String) -> Self {
        let settings = SettingsStore::new(&data_dir);
        let prefix = settings.get().room_title_prefix;
        Self {
            manager: Mutex::new(BreakoutRoomsManager::with_room_title_prefix(&prefix)),
            ticket: Mutex::new(None),
            settings,
        }
    }

    pub fn snapshot(&self) -> DraftSnapshot {
        self.manager.lock().unwrap().current_state().into()
    }

    pub fn unassigned_participants(&self) -> Vec<Participant> {
        self.manager
            .lock()
            .unwrap()
            .unassigned_participants()
            .into_iter()
            .map(|p| p.clone().into())
            .collect()
    }

    pub fn has_local_changes(&self) -> bool {
        self.manager.lock().unwrap().has_local_changes()
    }

    pub fn plan_changes(&self) -> Vec<ChangeOperation> {
        self.manager
            .lock()
            .unwrap()
            .plan_changes()
            .operations()
            .into_iter()
            .map(ChangeOperation::from)
            .collect()
    }

    pub fn add_new_meeting(&self) -> String {
        self.manager.lock().unwrap().add_new_meeting()
    }

    pub fn add_new_meetings(&self, count: u32) -> Vec<String> {
        self.manager.lock().unwrap().add_new_meetings(count as usize)
    }

    pub fn delete_meeting(&self, meeting_id: String) -> bool {
        self.manager.lock().unwrap().delete_meeting(&meeting_id)
    }

    pub fn delete_all_meetings(&self) {
        self.manager.lock().unwrap().delete_all_meetings();
    }

    pub fn update_meeting_title(&self, meeting_id: String, title: String) -> Result<bool, BreakoutError> {
        self.settings.get().validate_room_title(&title)?;
        Ok(self
            .manager
            .lock()
            .unwrap()
            .update_meeting_title(&meeting_id, &title))
    }

    pub fn reset_room_count(&self) {
        self.manager.lock().unwrap().reset_room_count();
    }

    pub fn assign_participants_to_meeting(
        &self,
        participant_ids: Vec<String>,
        destination_id: String,
    ) -> Result<(), BreakoutError> {
        self.manager
            .lock()
            .unwrap()
            .assign_participants_to_meeting(&participant_ids, &destination_id)
            .map_err(BreakoutError::from)
    }

    pub fn unassign_participants(&self, participant_ids: Vec<String>) {
        self.manager
            .lock()
            .unwrap()
            .unassign_participants(&participant_ids);
    }

    pub fn unassign_all_participants(&self) {
        self.manager.lock().unwrap().unassign_all_participants();
    }

    pub fn assign_participants_randomly(&self) {
        self.manager.lock().unwrap().assign_participants_randomly();
    }

    pub fn add_participants(&self, participants: Vec<Participant>) {
        self.manager
            .lock()
            .unwrap()
            .add_participants(participants.into_iter().map(Into::into).collect());
    }

    pub fn remove_participant(&self, identifier: String) -> bool {
        self.manager.lock().unwrap().remove_participant(&identifier)
    }

    pub fn discard_changes(&self) {
        self.manager.lock().unwrap().discard_changes();
        self.ticket.lock().unwrap().take();
    }

    pub fn update_current_state(&self, state: ConnectedMeetingsState) {
        self.manager.lock().unwrap().update_current_state(state.into());
    }

    /// Freezes the current diff. The host runs the operations in order:
    /// creations and renames, then moves, then deletions.
    pub fn begin_commit(&self) -> CommitRequest {
        let ticket = self.manager.lock().unwrap().begin_commit();
        let request = CommitRequest {
            generation: ticket.generation,
            operations: ticket
                .plan
                .operations()
                .into_iter()
                .map(ChangeOperation::from)
                .collect(),
        };
        *self.ticket.lock().unwrap() = Some(ticket);
        request
    }

    /// Reports how far the host got with a commit request.
    pub fn finish_commit(
        &self,
        generation: u64,
        created: Vec<CreatedRoom>,
        error: Option<String>,
    ) -> Result<(), BreakoutError> {
        let result = match error {
            Some(msg) => Err(CoreBreakoutError::Remote(msg)),
            None => Ok(()),
        };
        let ticket = {
            let mut slot = self.ticket.lock().unwrap();
            match slot.take() {
                Some(ticket) if ticket.generation == generation => ticket,
                other => {
                    *slot = other;
                    tracing::info!("finish_commit: no pending request {generation}");
                    return result.map_err(BreakoutError::from);
                }
            }
        };
        let outcome = CommitOutcome {
            created: created
                .into_iter()
                .map(|c| (c.temp_id, c.meeting_id))
                .collect(),
            result,
        };
        self.manager
            .lock()
            .unwrap()
            .finish_commit(ticket, outcome)
            .map_err(BreakoutError::from)
    }

    pub fn get_settings(&self) -> BreakoutSettings {
        self.settings.get().into()
    }

    pub fn set_default_room_count(&self, count: u32) -> Result<(), BreakoutError> {
        self.settings
            .set_default_room_count(count)
            .map_err(BreakoutError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: &str) -> ConnectedParticipant {
        ConnectedParticipant {
            id: format!("peer-{id}"),
            user_id: format!("user-{id}"),
            custom_participant_id: Some(id.to_string()),
            display_name: id.to_uppercase(),
            display_picture_url: None,
        }
    }

    fn state(parent: &[&str], rooms: &[(&str, &[&str])]) -> ConnectedMeetingsState {
        ConnectedMeetingsState {
            parent_meeting: ConnectedMeeting {
                id: "main".to_string(),
                title: None,
                participants: parent.iter().map(|p| person(p)).collect(),
            },
            meetings: rooms
                .iter()
                .map(|(id, people)| ConnectedMeeting {
                    id: id.to_string(),
                    title: Some(format!("Room {id}")),
                    participants: people.iter().map(|p| person(p)).collect(),
                })
                .collect(),
        }
    }

    fn draft() -> (tempfile::TempDir, BreakoutDraft) {
        let dir = tempfile::tempdir().unwrap();
        let draft = BreakoutDraft::new(dir.path().to_str().unwrap().to_string());
        (dir, draft)
    }

    #[test]
    fn test_snapshot_reflects_server_state() {
        let (_dir, draft) = draft();
        draft.update_current_state(state(&["a"], &[("r1", &["b"])]));
        let snapshot = draft.snapshot();
        assert_eq!(snapshot.parent_meeting.id, "main");
        assert!(snapshot.parent_meeting.is_parent);
        assert_eq!(snapshot.meetings.len(), 1);
        assert_eq!(snapshot.meetings[0].participants, ["b"]);
        assert_eq!(draft.unassigned_participants().len(), 1);
        assert!(!draft.has_local_changes());
    }

    #[test]
    fn test_commit_round_trip_swaps_temporary_ids() {
        let (_dir, draft) = draft();
        draft.update_current_state(state(&["a"], &[]));
        let room = draft.add_new_meeting();
        draft
            .assign_participants_to_meeting(vec!["a".to_string()], room.clone())
            .unwrap();

        let request = draft.begin_commit();
        assert!(matches!(
            request.operations[0],
            ChangeOperation::Create { ref temp_id, .. } if *temp_id == room
        ));
        assert!(request.operations.iter().any(|op| matches!(
            op,
            ChangeOperation::Move { destination_meeting_id, .. } if *destination_meeting_id == room
        )));

        draft
            .finish_commit(
                request.generation,
                vec![CreatedRoom {
                    temp_id: room.clone(),
                    meeting_id: "srv-1".to_string(),
                }],
                None,
            )
            .unwrap();
        assert_eq!(draft.snapshot().meetings[0].id, "srv-1");
    }

    #[test]
    fn test_finish_commit_reports_host_error() {
        let (_dir, draft) = draft();
        draft.update_current_state(state(&["a"], &[]));
        draft.add_new_meeting();
        let request = draft.begin_commit();
        let err = draft
            .finish_commit(request.generation, Vec::new(), Some("offline".to_string()))
            .unwrap_err();
        assert!(matches!(err, BreakoutError::Remote { msg } if msg == "offline"));
    }

    #[test]
    fn test_discarded_request_is_ignored() {
        let (_dir, draft) = draft();
        draft.update_current_state(state(&["a"], &[]));
        let room = draft.add_new_meeting();
        let request = draft.begin_commit();
        draft.discard_changes();
        draft
            .finish_commit(
                request.generation,
                vec![CreatedRoom {
                    temp_id: room,
                    meeting_id: "srv-1".to_string(),
                }],
                None,
            )
            .unwrap();
        assert!(draft.snapshot().meetings.is_empty());
    }

    #[test]
    fn test_short_title_is_rejected() {
        let (_dir, draft) = draft();
        let room = draft.add_new_meeting();
        assert!(matches!(
            draft.update_meeting_title(room.clone(), "ab".to_string()),
            Err(BreakoutError::InvalidTitle { .. })
        ));
        assert!(draft.update_meeting_title(room, "Design".to_string()).unwrap());
    }

    #[test]
    fn test_unknown_destination_maps_error() {
        let (_dir, draft) = draft();
        draft.update_current_state(state(&["a"], &[]));
        let err = draft
            .assign_participants_to_meeting(vec!["a".to_string()], "nope".to_string())
            .unwrap_err();
        assert!(matches!(err, BreakoutError::InvalidTarget { msg } if msg == "nope"));
    }

    #[test]
    fn test_settings_round_trip() {
        let (dir, draft) = draft();
        draft.set_default_room_count(4).unwrap();
        let reopened = BreakoutDraft::new(dir.path().to_str().unwrap().to_string());
        assert_eq!(reopened.get_settings().default_room_count, 4);
        assert_eq!(reopened.get_settings().room_title_prefix, "Room");
    }
}
