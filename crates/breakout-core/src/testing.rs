//! In-memory stand-in for the meeting SDK.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::connected::{
    ConnectedMeeting, ConnectedMeetings, ConnectedMeetingsEvent, ConnectedMeetingsState,
    ConnectedParticipant,
};
use crate::errors::BreakoutError;
use crate::participants::SelfParticipant;
use crate::permissions::ConnectedMeetingsPermissions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Create(Vec<String>),
    Rename { meeting_id: String, title: String },
    Move {
        source: String,
        destination: String,
        participants: Vec<String>,
    },
    Delete(Vec<String>),
}

pub struct FakeMeetings {
    state: Mutex<ConnectedMeetingsState>,
    calls: Mutex<Vec<RemoteCall>>,
    events: broadcast::Sender<ConnectedMeetingsEvent>,
    permissions: Mutex<ConnectedMeetingsPermissions>,
    self_participant: SelfParticipant,
    next_id: AtomicU32,
    auto_push: AtomicBool,
    fail_moves: AtomicBool,
    creation_gate: Arc<tokio::sync::Mutex<()>>,
}

fn sdk_id(p: &ConnectedParticipant) -> &str {
    p.custom_participant_id.as_deref().unwrap_or(&p.user_id)
}

impl FakeMeetings {
    pub fn new(state: ConnectedMeetingsState) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(state),
            calls: Mutex::new(Vec::new()),
            events,
            permissions: Mutex::new(ConnectedMeetingsPermissions::host()),
            self_participant: SelfParticipant {
                user_id: "user-host".to_string(),
                custom_participant_id: Some("host".to_string()),
                display_name: "Host".to_string(),
                display_picture_url: None,
            },
            next_id: AtomicU32::new(1),
            auto_push: AtomicBool::new(true),
            fail_moves: AtomicBool::new(false),
            creation_gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn state(&self) -> ConnectedMeetingsState {
        self.state.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn set_auto_push(&self, enabled: bool) {
        self.auto_push.store(enabled, Ordering::SeqCst);
    }

    pub fn fail_moves(&self, fail: bool) {
        self.fail_moves.store(fail, Ordering::SeqCst);
    }

    pub fn set_permissions(&self, permissions: ConnectedMeetingsPermissions) {
        *self.permissions.lock().unwrap() = permissions;
        let _ = self
            .events
            .send(ConnectedMeetingsEvent::PermissionsUpdate(permissions));
    }

    /// Holding this lock stalls `create_meetings`.
    pub fn creation_gate(&self) -> Arc<tokio::sync::Mutex<()>> {
        self.creation_gate.clone()
    }

    pub fn push(&self) {
        let _ = self
            .events
            .send(ConnectedMeetingsEvent::StateUpdate(self.state()));
    }

    pub fn send(&self, event: ConnectedMeetingsEvent) {
        let _ = self.events.send(event);
    }

    /// Replaces the server layout and pushes it.
    pub fn set_state(&self, state: ConnectedMeetingsState) {
        *self.state.lock().unwrap() = state;
        self.push();
    }

    pub fn receiver_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn record(&self, call: RemoteCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn changed(&self) {
        if self.auto_push.load(Ordering::SeqCst) {
            self.push();
        }
    }
}

#[async_trait]
impl ConnectedMeetings for FakeMeetings {
    async fn get_connected_meetings(&self) -> Result<ConnectedMeetingsState, BreakoutError> {
        Ok(self.state())
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectedMeetingsEvent> {
        self.events.subscribe()
    }

    fn self_participant(&self) -> SelfParticipant {
        self.self_participant.clone()
    }

    fn current_meeting_id(&self) -> String {
        self.state.lock().unwrap().parent_meeting.id.clone()
    }

    fn permissions(&self) -> ConnectedMeetingsPermissions {
        *self.permissions.lock().unwrap()
    }

    async fn create_meetings(
        &self,
        titles: Vec<String>,
    ) -> Result<Vec<ConnectedMeeting>, BreakoutError> {
        let _gate = self.creation_gate.lock().await;
        self.record(RemoteCall::Create(titles.clone()));
        let created: Vec<ConnectedMeeting> = titles
            .into_iter()
            .map(|title| ConnectedMeeting {
                id: format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
                title: Some(title),
                participants: Vec::new(),
            })
            .collect();
        self.state
            .lock()
            .unwrap()
            .meetings
            .extend(created.iter().cloned());
        self.changed();
        Ok(created)
    }

    async fn update_meeting_title(
        &self,
        meeting_id: &str,
        title: &str,
    ) -> Result<(), BreakoutError> {
        self.record(RemoteCall::Rename {
            meeting_id: meeting_id.to_string(),
            title: title.to_string(),
        });
        {
            let mut state = self.state.lock().unwrap();
            let state = &mut *state;
            let meeting = std::iter::once(&mut state.parent_meeting)
                .chain(state.meetings.iter_mut())
                .find(|m| m.id == meeting_id)
                .ok_or_else(|| BreakoutError::Remote(format!("no meeting {meeting_id}")))?;
            meeting.title = Some(title.to_string());
        }
        self.changed();
        Ok(())
    }

    async fn delete_meetings(&self, meeting_ids: Vec<String>) -> Result<(), BreakoutError> {
        self.record(RemoteCall::Delete(meeting_ids.clone()));
        {
            let mut state = self.state.lock().unwrap();
            let (gone, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.meetings)
                .into_iter()
                .partition(|m| meeting_ids.contains(&m.id));
            state.meetings = kept;
            for meeting in gone {
                state.parent_meeting.participants.extend(meeting.participants);
            }
        }
        self.changed();
        Ok(())
    }

    async fn move_participants(
        &self,
        source_meeting_id: &str,
        destination_meeting_id: &str,
        participant_ids: Vec<String>,
    ) -> Result<(), BreakoutError> {
        self.record(RemoteCall::Move {
            source: source_meeting_id.to_string(),
            destination: destination_meeting_id.to_string(),
            participants: participant_ids.clone(),
        });
        if self.fail_moves.load(Ordering::SeqCst) {
            return Err(BreakoutError::Remote("move rejected".to_string()));
        }
        {
            let mut state = self.state.lock().unwrap();
            let state = &mut *state;
            let known = |id: &str| {
                state.parent_meeting.id == id || state.meetings.iter().any(|m| m.id == id)
            };
            if !known(destination_meeting_id) {
                return Err(BreakoutError::Remote(format!(
                    "no meeting {destination_meeting_id}"
                )));
            }
            let mut moving = Vec::new();
            for meeting in std::iter::once(&mut state.parent_meeting).chain(state.meetings.iter_mut())
            {
                if meeting.id == source_meeting_id {
                    let (out, stay): (Vec<_>, Vec<_>) = std::mem::take(&mut meeting.participants)
                        .into_iter()
                        .partition(|p| participant_ids.iter().any(|id| id == sdk_id(p)));
                    meeting.participants = stay;
                    moving = out;
                }
            }
            if let Some(destination) = std::iter::once(&mut state.parent_meeting)
                .chain(state.meetings.iter_mut())
                .find(|m| m.id == destination_meeting_id)
            {
                destination.participants.extend(moving);
            }
        }
        self.changed();
        Ok(())
    }
}

mod tests {
    use super::*;
    use crate::draft::tests::server_state;

    #[tokio::test]
    async fn move_to_missing_room_leaves_state_untouched() {
        let fake = FakeMeetings::new(server_state(&["a"], &[("r1", "Room 1", &["b"])]));
        let before = fake.state();
        let err = fake
            .move_participants("r1", "gone", vec!["b".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err, BreakoutError::Remote("no meeting gone".to_string()));
        assert_eq!(fake.state(), before);
    }

    #[tokio::test]
    async fn parent_can_be_renamed() {
        let fake = FakeMeetings::new(server_state(&["a"], &[]));
        fake.update_meeting_title("main", "Plenary").await.unwrap();
        assert_eq!(fake.state().parent_meeting.title.as_deref(), Some("Plenary"));
    }
}
