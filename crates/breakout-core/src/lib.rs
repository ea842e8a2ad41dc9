//! Breakout rooms core logic.
//!
//! Keeps a local draft of a breakout layout, reconciles it with the
//! meeting SDK's pushes and commits the difference as remote calls.
//! Consumed by native UI shells via UniFFI bindings.

pub mod commit;
pub mod connected;
pub mod draft;
pub mod errors;
pub mod events;
pub mod manager;
pub mod participants;
pub mod permissions;
pub mod session;
pub mod settings;

#[cfg(test)]
mod testing;

pub use commit::{
    ChangeOperation, ChangePlan, CommitOutcome, MeetingCreation, MeetingRename, ParticipantMove,
};
pub use connected::{
    ConnectedMeeting, ConnectedMeetings, ConnectedMeetingsEvent, ConnectedMeetingsState,
    ConnectedParticipant,
};
pub use draft::{DraftMeeting, DraftSnapshot, DraftState};
pub use errors::BreakoutError;
pub use events::{BreakoutEvent, BreakoutEventListener, EventEmitter, ListenerHandle, StatusMessage};
pub use manager::{BreakoutRoomsManager, CommitState, CommitTicket};
pub use participants::{Participant, SelfParticipant, participant_identifier};
pub use permissions::ConnectedMeetingsPermissions;
pub use session::{BreakoutMode, BreakoutSession, BreakoutStep};
pub use settings::{BreakoutSettings, SettingsStore};
