use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::errors::BreakoutError;
use crate::participants::SelfParticipant;
use crate::permissions::ConnectedMeetingsPermissions;

/// A participant inside one of the connected meetings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedParticipant {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub custom_participant_id: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub display_picture_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedMeeting {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub participants: Vec<ConnectedParticipant>,
}

/// Server-confirmed layout: the main meeting plus its breakout rooms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedMeetingsState {
    pub parent_meeting: ConnectedMeeting,
    #[serde(default)]
    pub meetings: Vec<ConnectedMeeting>,
}

impl ConnectedMeetingsState {
    /// A breakout is running when at least one room exists.
    pub fn is_active(&self) -> bool {
        !self.meetings.is_empty()
    }
}

/// Push notifications from the meeting SDK.
#[derive(Debug, Clone)]
pub enum ConnectedMeetingsEvent {
    StateUpdate(ConnectedMeetingsState),
    /// The local user is being moved to another meeting.
    ChangingMeeting(String),
    PermissionsUpdate(ConnectedMeetingsPermissions),
}

/// The slice of the meeting SDK the breakout manager talks to.
///
/// Implementations wrap the SDK's `connectedMeetings` object. Every
/// mutation is asynchronous; the server answers with a `StateUpdate`
/// push once the change is visible.
#[async_trait]
pub trait ConnectedMeetings: Send + Sync {
    async fn get_connected_meetings(&self) -> Result<ConnectedMeetingsState, BreakoutError>;

    /// Subscribe to pushes. Dropping the receiver ends the subscription.
    fn subscribe(&self) -> broadcast::Receiver<ConnectedMeetingsEvent>;

    fn self_participant(&self) -> SelfParticipant;

    /// Id of the meeting the local user is currently in.
    fn current_meeting_id(&self) -> String;

    fn permissions(&self) -> ConnectedMeetingsPermissions;

    /// Creates one meeting per title, returned in the same order.
    async fn create_meetings(
        &self,
        titles: Vec<String>,
    ) -> Result<Vec<ConnectedMeeting>, BreakoutError>;

    async fn update_meeting_title(
        &self,
        meeting_id: &str,
        title: &str,
    ) -> Result<(), BreakoutError>;

    async fn delete_meetings(&self, meeting_ids: Vec<String>) -> Result<(), BreakoutError>;

    async fn move_participants(
        &self,
        source_meeting_id: &str,
        destination_meeting_id: &str,
        participant_ids: Vec<String>,
    ) -> Result<(), BreakoutError>;
}
