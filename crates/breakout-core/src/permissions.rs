use serde::{Deserialize, Serialize};

/// Breakout-related permissions of the local user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectedMeetingsPermissions {
    /// Create, edit, delete and re-assign breakout rooms.
    pub can_alter_connected_meetings: bool,
    /// Move oneself between breakout rooms.
    pub can_switch_connected_meetings: bool,
    /// Move oneself back to the main room.
    pub can_switch_to_parent_meeting: bool,
}

impl ConnectedMeetingsPermissions {
    /// Full host permissions.
    pub fn host() -> Self {
        Self {
            can_alter_connected_meetings: true,
            can_switch_connected_meetings: true,
            can_switch_to_parent_meeting: true,
        }
    }

    /// Whether the room switcher is the only thing the user may see.
    pub fn room_switcher_only(&self) -> bool {
        !self.can_alter_connected_meetings
    }

    /// Whether every room is listed, or only the one the user is in.
    pub fn can_see_all_rooms(&self) -> bool {
        self.can_alter_connected_meetings || self.can_switch_connected_meetings
    }

    pub fn can_join(&self, destination_is_parent: bool) -> bool {
        if destination_is_parent {
            self.can_switch_to_parent_meeting || self.can_alter_connected_meetings
        } else {
            self.can_switch_connected_meetings || self.can_alter_connected_meetings
        }
    }
}
