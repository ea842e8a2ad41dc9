use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

use crate::commit;
use crate::connected::{ConnectedMeetings, ConnectedMeetingsEvent, ConnectedMeetingsState};
use crate::draft::{DraftMeeting, DraftSnapshot};
use crate::errors::BreakoutError;
use crate::events::{BreakoutEvent, BreakoutEventListener, EventEmitter, ListenerHandle, StatusMessage};
use crate::manager::{BreakoutRoomsManager, CommitState};
use crate::participants::{Participant, ParticipantRef, participant_identifier};
use crate::permissions::ConnectedMeetingsPermissions;
use crate::settings::BreakoutSettings;

/// Whether the user is setting up a new breakout or editing a running one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakoutMode {
    Create,
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakoutStep {
    /// Choosing how many rooms to create.
    RoomConfig,
    /// Placing participants into rooms.
    ParticipantsConfig,
}

#[derive(Debug, Clone)]
struct UiState {
    mode: BreakoutMode,
    step: BreakoutStep,
    room_count: u32,
    permissions: ConnectedMeetingsPermissions,
    applying: bool,
}

struct Inner {
    meetings: Arc<dyn ConnectedMeetings>,
    manager: Mutex<BreakoutRoomsManager>,
    ui: Mutex<UiState>,
    emitter: EventEmitter,
    settings: BreakoutSettings,
    status: std::sync::Mutex<Option<StatusMessage>>,
    status_timer: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Drives a [`BreakoutRoomsManager`] from a live meeting.
///
/// Listens to the SDK's pushes on a background task, gates edits on the
/// local user's permissions and commits without holding the draft lock,
/// so edits stay possible while remote calls are running.
pub struct BreakoutSession {
    inner: Arc<Inner>,
    event_loop: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl BreakoutSession {
    pub fn new(meetings: Arc<dyn ConnectedMeetings>, settings: BreakoutSettings) -> Self {
        let ui = UiState {
            mode: BreakoutMode::Create,
            step: BreakoutStep::RoomConfig,
            room_count: settings.default_room_count.max(settings.min_rooms),
            permissions: meetings.permissions(),
            applying: false,
        };
        let manager = BreakoutRoomsManager::with_room_title_prefix(&settings.room_title_prefix);
        Self {
            inner: Arc::new(Inner {
                meetings,
                manager: Mutex::new(manager),
                ui: Mutex::new(ui),
                emitter: EventEmitter::new(),
                settings,
                status: std::sync::Mutex::new(None),
                status_timer: std::sync::Mutex::new(None),
            }),
            event_loop: std::sync::Mutex::new(None),
        }
    }

    /// Register a listener for session events.
    pub fn add_listener(&self, listener: Arc<dyn BreakoutEventListener>) -> ListenerHandle {
        self.inner.emitter.add_listener(listener)
    }

    /// Subscribes to server pushes, then loads the current layout.
    pub async fn start(&self) -> Result<(), BreakoutError> {
        let events = self.inner.meetings.subscribe();
        let handle = tokio::spawn(self.inner.clone().event_loop(events));
        if let Some(previous) = self.event_loop.lock().unwrap().replace(handle) {
            previous.abort();
        }
        self.refresh().await
    }

    async fn refresh(&self) -> Result<(), BreakoutError> {
        let state = self.inner.meetings.get_connected_meetings().await?;
        self.inner.handle_state_update(state).await;
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub async fn current_state(&self) -> DraftSnapshot {
        self.inner.manager.lock().await.current_state()
    }

    pub async fn unassigned_participants(&self) -> Vec<Participant> {
        self.inner
            .manager
            .lock()
            .await
            .unassigned_participants()
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn all_connected_meetings(&self) -> Vec<DraftMeeting> {
        self.inner
            .manager
            .lock()
            .await
            .all_connected_meetings()
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn has_local_changes(&self) -> bool {
        self.inner.manager.lock().await.has_local_changes()
    }

    pub async fn commit_state(&self) -> CommitState {
        self.inner.manager.lock().await.commit_state()
    }

    pub async fn mode(&self) -> BreakoutMode {
        self.inner.ui.lock().await.mode
    }

    pub async fn step(&self) -> BreakoutStep {
        self.inner.ui.lock().await.step
    }

    pub async fn room_count(&self) -> u32 {
        self.inner.ui.lock().await.room_count
    }

    pub async fn permissions(&self) -> ConnectedMeetingsPermissions {
        self.inner.ui.lock().await.permissions
    }

    pub async fn is_applying(&self) -> bool {
        self.inner.ui.lock().await.applying
    }

    pub fn status(&self) -> Option<StatusMessage> {
        *self.inner.status.lock().unwrap()
    }

    /// Rooms the local user may see: all of them, or only their own.
    pub async fn permitted_rooms(&self) -> Vec<DraftMeeting> {
        let permissions = self.permissions().await;
        let rooms = self.all_connected_meetings().await;
        if permissions.can_see_all_rooms() {
            return rooms;
        }
        let current = self.inner.meetings.current_meeting_id();
        rooms.into_iter().filter(|m| m.id == current).collect()
    }

    /// Whether a breakout room may be removed without dropping below the minimum.
    pub async fn can_delete_rooms(&self) -> bool {
        let rooms = self.inner.manager.lock().await.draft().meetings().len();
        rooms > self.inner.settings.min_rooms as usize
    }

    /// Rough participants-per-room figure for the setup screen.
    pub async fn approx_distribution(&self) -> u32 {
        let unassigned = self.inner.manager.lock().await.unassigned_participants().len();
        let min_rooms = self.inner.settings.min_rooms.max(1);
        let rooms = match self.room_count().await {
            0 => min_rooms,
            n => n,
        };
        let per_room = (unassigned as f64 / rooms as f64).round() as u32;
        per_room.max(min_rooms)
    }

    // ── Draft edits ──────────────────────────────────────────────────

    pub async fn set_room_count(&self, count: u32) {
        self.inner.ui.lock().await.room_count = count.max(self.inner.settings.min_rooms);
    }

    /// Adds the configured number of rooms and moves on to assignment.
    pub async fn create_rooms(&self) -> Result<Vec<String>, BreakoutError> {
        self.ensure_can_alter().await?;
        let count = self.room_count().await;
        let ids = self
            .inner
            .manager
            .lock()
            .await
            .add_new_meetings(count as usize);
        self.inner.ui.lock().await.step = BreakoutStep::ParticipantsConfig;
        self.inner.emitter.emit(BreakoutEvent::DraftChanged);
        Ok(ids)
    }

    pub async fn add_room(&self) -> Result<String, BreakoutError> {
        self.ensure_can_alter().await?;
        let id = self.inner.manager.lock().await.add_new_meeting();
        self.inner.emitter.emit(BreakoutEvent::DraftChanged);
        Ok(id)
    }

    pub async fn rename_room(&self, meeting_id: &str, title: &str) -> Result<(), BreakoutError> {
        self.ensure_can_alter().await?;
        self.inner.settings.validate_room_title(title)?;
        if self
            .inner
            .manager
            .lock()
            .await
            .update_meeting_title(meeting_id, title)
        {
            self.inner.emitter.emit(BreakoutEvent::DraftChanged);
        }
        Ok(())
    }

    pub async fn delete_room(&self, meeting_id: &str) -> Result<(), BreakoutError> {
        self.ensure_can_alter().await?;
        if self.inner.manager.lock().await.delete_meeting(meeting_id) {
            self.inner.emitter.emit(BreakoutEvent::DraftChanged);
        }
        Ok(())
    }

    /// Moves the selected participants into a room.
    pub async fn assign_selected(
        &self,
        participant_ids: &[String],
        destination_id: &str,
    ) -> Result<(), BreakoutError> {
        self.ensure_can_alter().await?;
        if participant_ids.is_empty() {
            return Ok(());
        }
        self.inner
            .manager
            .lock()
            .await
            .assign_participants_to_meeting(participant_ids, destination_id)?;
        self.inner.emitter.emit(BreakoutEvent::DraftChanged);
        self.inner.set_status(StatusMessage::ParticipantsAssigned);
        Ok(())
    }

    pub async fn unassign(&self, participant_id: &str) -> Result<(), BreakoutError> {
        self.ensure_can_alter().await?;
        self.inner
            .manager
            .lock()
            .await
            .unassign_participants(&[participant_id.to_string()]);
        self.inner.emitter.emit(BreakoutEvent::DraftChanged);
        Ok(())
    }

    pub async fn unassign_all(&self) -> Result<(), BreakoutError> {
        self.ensure_can_alter().await?;
        self.inner.manager.lock().await.unassign_all_participants();
        self.inner.emitter.emit(BreakoutEvent::DraftChanged);
        Ok(())
    }

    pub async fn assign_randomly(&self) -> Result<(), BreakoutError> {
        self.ensure_can_alter().await?;
        {
            let mut manager = self.inner.manager.lock().await;
            if manager.unassigned_participants().is_empty() {
                return Ok(());
            }
            manager.assign_participants_randomly();
        }
        self.inner.emitter.emit(BreakoutEvent::DraftChanged);
        self.inner
            .set_status(StatusMessage::ParticipantsAssignedRandomly);
        Ok(())
    }

    // ── Commit ───────────────────────────────────────────────────────

    pub async fn apply_changes(&self) -> Result<(), BreakoutError> {
        self.ensure_can_alter().await?;
        self.commit().await
    }

    /// Moves the local user into `destination_id` and applies right away.
    pub async fn join_room(&self, destination_id: &str) -> Result<(), BreakoutError> {
        let me = self.inner.meetings.self_participant();
        let identifier = participant_identifier(ParticipantRef::LocalSelf(&me));
        {
            let permissions = self.permissions().await;
            let mut manager = self.inner.manager.lock().await;
            let is_parent = manager.draft().parent_meeting().id == destination_id;
            if !permissions.can_join(is_parent) {
                return Err(BreakoutError::NotPermitted(format!("join {destination_id}")));
            }
            manager.add_participants(vec![Participant::from_record(ParticipantRef::LocalSelf(&me))]);
            if is_parent {
                manager.unassign_participants(&[identifier]);
            } else {
                manager.assign_participants_to_meeting(&[identifier], destination_id)?;
            }
        }
        self.commit().await
    }

    /// Deletes every breakout room and applies right away.
    pub async fn close_breakout(&self) -> Result<(), BreakoutError> {
        self.ensure_can_alter().await?;
        self.inner.manager.lock().await.delete_all_meetings();
        self.commit().await
    }

    /// Throws the draft away and reloads the server layout.
    pub async fn discard_changes(&self) -> Result<(), BreakoutError> {
        self.inner.manager.lock().await.discard_changes();
        self.refresh().await?;
        self.inner.set_status(StatusMessage::ChangesDiscarded);
        Ok(())
    }

    async fn commit(&self) -> Result<(), BreakoutError> {
        self.inner.set_applying(true).await;
        let ticket = self.inner.manager.lock().await.begin_commit();
        let outcome = commit::execute(&ticket.plan, self.inner.meetings.as_ref()).await;
        let result = self.inner.manager.lock().await.finish_commit(ticket, outcome);
        self.inner.set_applying(false).await;
        self.inner.emitter.emit(BreakoutEvent::DraftChanged);
        result
    }

    async fn ensure_can_alter(&self) -> Result<(), BreakoutError> {
        if self.permissions().await.can_alter_connected_meetings {
            Ok(())
        } else {
            Err(BreakoutError::NotPermitted(
                "altering connected meetings".to_string(),
            ))
        }
    }
}

impl Drop for BreakoutSession {
    fn drop(&mut self) {
        if let Some(handle) = self.event_loop.lock().unwrap().take() {
            handle.abort();
        }
        if let Some(handle) = self.inner.status_timer.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl Inner {
    async fn event_loop(self: Arc<Self>, mut events: broadcast::Receiver<ConnectedMeetingsEvent>) {
        loop {
            match events.recv().await {
                Ok(ConnectedMeetingsEvent::StateUpdate(state)) => {
                    self.handle_state_update(state).await;
                }
                Ok(ConnectedMeetingsEvent::ChangingMeeting(meeting_id)) => {
                    tracing::info!("changing meeting to {meeting_id}, closing breakout manager");
                    self.manager.lock().await.discard_changes();
                    self.emitter.emit(BreakoutEvent::Closed);
                }
                Ok(ConnectedMeetingsEvent::PermissionsUpdate(permissions)) => {
                    tracing::debug!("permissions updated: {permissions:?}");
                    self.ui.lock().await.permissions = permissions;
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("breakout event loop lagged, {missed} events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("connected meetings channel closed");
                    break;
                }
            }
        }
    }

    async fn handle_state_update(&self, state: ConnectedMeetingsState) {
        let active = state.is_active();
        let rooms = state.meetings.len() as u32;
        {
            let mut manager = self.manager.lock().await;
            manager.update_current_state(state);
            let mut ui = self.ui.lock().await;
            if active {
                ui.mode = BreakoutMode::Edit;
            }
            if ui.mode == BreakoutMode::Create && !active {
                manager.reset_room_count();
            }
            if ui.mode == BreakoutMode::Edit {
                ui.room_count = rooms;
                ui.step = BreakoutStep::ParticipantsConfig;
            }
        }
        self.emitter.emit(BreakoutEvent::StateReconciled);
    }

    async fn set_applying(&self, applying: bool) {
        self.ui.lock().await.applying = applying;
        self.emitter.emit(BreakoutEvent::ApplyingChanged(applying));
    }

    /// Shows a confirmation and clears it after the configured delay.
    fn set_status(self: &Arc<Self>, message: StatusMessage) {
        *self.status.lock().unwrap() = Some(message);
        self.emitter.emit(BreakoutEvent::StatusChanged(Some(message)));

        let inner: Weak<Self> = Arc::downgrade(self);
        let delay = Duration::from_millis(self.settings.ephemeral_status_ms);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                *inner.status.lock().unwrap() = None;
                inner.emitter.emit(BreakoutEvent::StatusChanged(None));
            }
        });
        if let Some(previous) = self.status_timer.lock().unwrap().replace(handle) {
            previous.abort();
        }
    }
}
