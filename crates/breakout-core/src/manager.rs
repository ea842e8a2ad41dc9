use rand::Rng;
use rand::seq::SliceRandom;

use crate::commit::{self, ChangePlan, CommitOutcome};
use crate::connected::{ConnectedMeetings, ConnectedMeetingsState};
use crate::draft::{DraftMeeting, DraftSnapshot, DraftState};
use crate::errors::BreakoutError;
use crate::participants::Participant;

pub const DEFAULT_ROOM_TITLE_PREFIX: &str = "Room";

/// Where the draft stands relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    /// Nothing in flight.
    Idle,
    /// Remote calls for this generation are running.
    Pending { generation: u64 },
    /// Calls finished; waiting for the server push that confirms them.
    AwaitingEcho { generation: u64 },
}

/// Handle for one commit attempt.
#[derive(Debug, Clone)]
pub struct CommitTicket {
    pub generation: u64,
    pub plan: ChangePlan,
    /// Server layout the plan was computed against.
    base: DraftState,
    target: DraftState,
}

/// Tracks a draft breakout layout and commits it against the server.
///
/// All draft mutations are synchronous and never fail on stale ids; they
/// just do nothing. Only [`apply_changes`](Self::apply_changes) talks to
/// the SDK.
#[derive(Debug)]
pub struct BreakoutRoomsManager {
    draft: DraftState,
    /// Last layout pushed by the server, as a draft for diffing.
    baseline: DraftState,
    room_title_prefix: String,
    next_room_number: u32,
    commit: CommitState,
    generation: u64,
    /// Draft the current commit is trying to reach, with server ids.
    applied: Option<DraftState>,
    /// A push arrived while the commit was pending.
    push_during_commit: bool,
}

impl Default for BreakoutRoomsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakoutRoomsManager {
    pub fn new() -> Self {
        Self::with_room_title_prefix(DEFAULT_ROOM_TITLE_PREFIX)
    }

    pub fn with_room_title_prefix(prefix: &str) -> Self {
        Self {
            draft: DraftState::default(),
            baseline: DraftState::default(),
            room_title_prefix: prefix.to_string(),
            next_room_number: 1,
            commit: CommitState::Idle,
            generation: 0,
            applied: None,
            push_during_commit: false,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn current_state(&self) -> DraftSnapshot {
        self.draft.snapshot()
    }

    pub fn draft(&self) -> &DraftState {
        &self.draft
    }

    pub fn unassigned_participants(&self) -> Vec<&Participant> {
        self.draft.unassigned_participants()
    }

    pub fn all_connected_meetings(&self) -> Vec<&DraftMeeting> {
        self.draft.all_connected_meetings()
    }

    /// Operations needed to turn the last server layout into the draft.
    pub fn plan_changes(&self) -> ChangePlan {
        ChangePlan::between(&self.baseline, &self.draft)
    }

    pub fn has_local_changes(&self) -> bool {
        !self.plan_changes().is_empty()
    }

    pub fn commit_state(&self) -> CommitState {
        self.commit
    }

    // ── Rooms ────────────────────────────────────────────────────────

    /// Appends an empty room with a temporary id and returns that id.
    pub fn add_new_meeting(&mut self) -> String {
        let title = format!("{} {}", self.room_title_prefix, self.next_room_number);
        self.next_room_number += 1;
        let meeting = DraftMeeting::new_room(title);
        let id = meeting.id.clone();
        tracing::debug!("draft room added: {id} ({:?})", meeting.title);
        self.draft.push_meeting(meeting);
        id
    }

    pub fn add_new_meetings(&mut self, count: usize) -> Vec<String> {
        (0..count).map(|_| self.add_new_meeting()).collect()
    }

    /// Removes a breakout room; its participants return to the pool.
    pub fn delete_meeting(&mut self, meeting_id: &str) -> bool {
        match self.draft.remove_meeting(meeting_id) {
            Some(meeting) => {
                tracing::debug!(
                    "draft room deleted: {meeting_id}, {} participants unassigned",
                    meeting.participants.len()
                );
                true
            }
            None => {
                tracing::debug!("delete_meeting: no breakout room {meeting_id}");
                false
            }
        }
    }

    /// Removes every breakout room.
    pub fn delete_all_meetings(&mut self) {
        let ids: Vec<String> = self.draft.meetings().iter().map(|m| m.id.clone()).collect();
        for id in ids {
            self.delete_meeting(&id);
        }
    }

    /// Renames a room, the parent included. Titles are not validated here.
    pub fn update_meeting_title(&mut self, meeting_id: &str, title: &str) -> bool {
        match self.draft.room_mut(meeting_id) {
            Some(meeting) => {
                meeting.title = Some(title.to_string());
                true
            }
            None => {
                tracing::debug!("update_meeting_title: no room {meeting_id}");
                false
            }
        }
    }

    /// Restarts "Room k" numbering.
    pub fn reset_room_count(&mut self) {
        self.next_room_number = self.draft.meetings().len() as u32 + 1;
    }

    // ── Participants ─────────────────────────────────────────────────

    /// Moves each participant into `destination_id`.
    ///
    /// Unknown participant ids are skipped. An unknown destination is an
    /// error and leaves the draft untouched.
    pub fn assign_participants_to_meeting(
        &mut self,
        participant_ids: &[String],
        destination_id: &str,
    ) -> Result<(), BreakoutError> {
        if self.draft.room(destination_id).is_none() {
            tracing::warn!("assign: unknown destination room {destination_id}");
            return Err(BreakoutError::InvalidTarget(destination_id.to_string()));
        }
        for identifier in participant_ids {
            if self.draft.participant(identifier).is_none() {
                tracing::debug!("assign: unknown participant {identifier}");
                continue;
            }
            if self.draft.room_of(identifier) == Some(destination_id) {
                continue;
            }
            self.draft.detach(identifier);
            if let Some(room) = self.draft.room_mut(destination_id) {
                room.participants.push(identifier.clone());
            }
        }
        Ok(())
    }

    pub fn unassign_participants(&mut self, participant_ids: &[String]) {
        for identifier in participant_ids {
            self.draft.detach(identifier);
        }
    }

    pub fn unassign_all_participants(&mut self) {
        let assigned: Vec<String> = self
            .draft
            .all_connected_meetings()
            .iter()
            .flat_map(|m| m.participants.iter().cloned())
            .collect();
        self.unassign_participants(&assigned);
    }

    pub fn assign_participants_randomly(&mut self) {
        self.assign_participants_randomly_with(&mut rand::thread_rng());
    }

    /// Shuffles the pool, then hands each participant to the breakout room
    /// with the fewest members (earliest room on ties).
    pub fn assign_participants_randomly_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut pool: Vec<String> = self
            .draft
            .unassigned_participants()
            .iter()
            .map(|p| p.identifier.clone())
            .collect();
        if pool.is_empty() || self.draft.meetings().is_empty() {
            return;
        }
        pool.shuffle(rng);

        let rooms = self.draft.meetings_mut();
        for identifier in pool {
            let smallest = rooms
                .iter()
                .enumerate()
                .min_by_key(|(idx, m)| (m.participants.len(), *idx))
                .map(|(idx, _)| idx);
            if let Some(idx) = smallest {
                rooms[idx].participants.push(identifier);
            }
        }
        tracing::debug!("participants assigned randomly across {} rooms", rooms.len());
    }

    /// Registers people who joined after the last push. They start unassigned.
    pub fn add_participants(&mut self, participants: Vec<Participant>) {
        for participant in participants {
            self.draft.add_participant(participant);
        }
    }

    pub fn remove_participant(&mut self, identifier: &str) -> bool {
        self.draft.remove_participant(identifier)
    }

    // ── Server state ─────────────────────────────────────────────────

    /// Drops local edits and returns to the last server layout.
    ///
    /// A commit still in flight is not cancelled, but its completion will
    /// be ignored.
    pub fn discard_changes(&mut self) {
        self.generation += 1;
        self.draft = self.baseline.clone();
        self.commit = CommitState::Idle;
        self.applied = None;
        self.push_during_commit = false;
        tracing::debug!("draft discarded (generation {})", self.generation);
    }

    /// Takes in a server push.
    ///
    /// While a commit is pending the draft is kept and only the baseline
    /// moves. Otherwise unapplied edits are replayed on top of the push, and
    /// a draft without edits simply becomes the push.
    pub fn update_current_state(&mut self, state: ConnectedMeetingsState) {
        let previous = std::mem::replace(&mut self.baseline, DraftState::from_server(&state));
        let rooms = state.meetings.len() as u32;
        self.next_room_number = self.next_room_number.max(rooms + 1);

        match self.commit {
            CommitState::Pending { generation } => {
                tracing::debug!("push during pending commit {generation}, draft kept");
                self.push_during_commit = true;
            }
            CommitState::AwaitingEcho { generation } => self.settle_commit(generation),
            CommitState::Idle => self.follow_server(&previous),
        }
        tracing::debug!(
            "draft reconciled: {} rooms, {} participants",
            self.draft.meetings().len(),
            self.draft.roster().len()
        );
    }

    fn follow_server(&mut self, previous: &DraftState) {
        if ChangePlan::between(previous, &self.draft).is_empty() {
            self.draft = self.baseline.clone();
        } else {
            tracing::debug!("local edits replayed on top of server push");
            self.draft = self.draft.rebase(previous, &self.baseline);
        }
    }

    /// First push after a finished commit. The server's answer is final,
    /// even when it differs from what was asked for.
    fn settle_commit(&mut self, generation: u64) {
        match self.applied.take() {
            Some(target) => {
                if ChangePlan::between(&self.baseline, &target).is_empty() {
                    tracing::info!("commit {generation} confirmed by server");
                } else {
                    tracing::info!("commit {generation} settled, server layout differs from request");
                }
                self.draft = self.draft.rebase(&target, &self.baseline);
            }
            None => self.draft = self.baseline.clone(),
        }
        self.commit = CommitState::Idle;
    }

    // ── Commit ───────────────────────────────────────────────────────

    /// Freezes the current diff and marks the draft as pending.
    ///
    /// The draft stays editable while the returned ticket is executed.
    /// Starting a new commit supersedes any earlier ticket.
    pub fn begin_commit(&mut self) -> CommitTicket {
        self.generation += 1;
        self.commit = CommitState::Pending {
            generation: self.generation,
        };
        self.push_during_commit = false;
        let plan = self.plan_changes();
        tracing::info!(
            "commit {} started: {} creations, {} renames, {} moves, {} deletions",
            self.generation,
            plan.creations.len(),
            plan.renames.len(),
            plan.moves.len(),
            plan.deletions.len()
        );
        CommitTicket {
            generation: self.generation,
            plan,
            base: self.baseline.clone(),
            target: self.draft.clone(),
        }
    }

    /// Records the outcome of a ticket and returns its result.
    ///
    /// Outcomes of superseded or discarded tickets change nothing.
    pub fn finish_commit(
        &mut self,
        ticket: CommitTicket,
        outcome: CommitOutcome,
    ) -> Result<(), BreakoutError> {
        if self.commit != (CommitState::Pending { generation: ticket.generation }) {
            tracing::info!("ignoring stale commit {}", ticket.generation);
            return outcome.result;
        }

        let mut target = ticket.target;
        for (temp_id, id) in &outcome.created {
            self.draft.rename_meeting_id(temp_id, id);
            target.rename_meeting_id(temp_id, id);
        }

        match &outcome.result {
            Ok(()) => {
                tracing::info!("commit {} applied, awaiting server", ticket.generation);
                self.commit = CommitState::AwaitingEcho {
                    generation: ticket.generation,
                };
                self.applied = Some(target);
                if self.push_during_commit {
                    self.settle_commit(ticket.generation);
                }
            }
            Err(e) => {
                tracing::warn!("commit {} failed: {e}", ticket.generation);
                if self.push_during_commit {
                    self.draft = self.draft.rebase(&ticket.base, &self.baseline);
                }
                self.commit = CommitState::Idle;
                self.applied = None;
            }
        }
        self.push_during_commit = false;
        outcome.result
    }

    /// Diffs the draft against the server and issues the calls.
    pub async fn apply_changes(
        &mut self,
        meetings: &dyn ConnectedMeetings,
    ) -> Result<(), BreakoutError> {
        let ticket = self.begin_commit();
        let outcome = commit::execute(&ticket.plan, meetings).await;
        self.finish_commit(ticket, outcome)
    }
}
