use std::collections::HashMap;

use futures_util::future::{try_join, try_join_all};
use serde::Serialize;

use crate::connected::ConnectedMeetings;
use crate::draft::DraftState;
use crate::errors::BreakoutError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeetingCreation {
    pub temp_id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeetingRename {
    pub meeting_id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantMove {
    pub participant: String,
    pub sdk_id: String,
    pub source_meeting_id: String,
    pub destination_meeting_id: String,
}

/// Flat view of a single remote operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ChangeOperation {
    Create(MeetingCreation),
    Rename(MeetingRename),
    Move(ParticipantMove),
    Delete { meeting_id: String },
}

/// Remote operations that turn the server layout into the draft layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangePlan {
    pub creations: Vec<MeetingCreation>,
    pub renames: Vec<MeetingRename>,
    pub moves: Vec<ParticipantMove>,
    pub deletions: Vec<String>,
}

impl ChangePlan {
    /// Diffs `draft` against the server-confirmed `baseline`.
    ///
    /// Rooms are matched by id only: a draft room with a temporary id is a
    /// creation, a baseline room missing from the draft is a deletion.
    /// A room with a server id that the baseline has not caught up with yet
    /// is left alone. Membership changes become one move per participant,
    /// with the unassigned pool standing for the parent meeting.
    pub fn between(baseline: &DraftState, draft: &DraftState) -> Self {
        let mut plan = Self::default();

        let parent = draft.parent_meeting();
        if let Some(title) = &parent.title {
            let confirmed = baseline.parent_meeting();
            if parent.id == confirmed.id && confirmed.title.as_ref() != Some(title) {
                plan.renames.push(MeetingRename {
                    meeting_id: parent.id.clone(),
                    title: title.clone(),
                });
            }
        }

        for meeting in draft.meetings() {
            if meeting.is_temporary() {
                plan.creations.push(MeetingCreation {
                    temp_id: meeting.id.clone(),
                    title: meeting.title.clone().unwrap_or_default(),
                });
                continue;
            }
            let Some(confirmed) = baseline.room(&meeting.id) else {
                continue;
            };
            if let Some(title) = &meeting.title {
                if confirmed.title.as_ref() != Some(title) {
                    plan.renames.push(MeetingRename {
                        meeting_id: meeting.id.clone(),
                        title: title.clone(),
                    });
                }
            }
        }

        for meeting in baseline.meetings() {
            if draft.room(&meeting.id).is_none() {
                plan.deletions.push(meeting.id.clone());
            }
        }

        for participant in draft.roster().iter() {
            let destination = draft.effective_room(&participant.identifier);
            let source = if baseline.roster().contains(&participant.identifier) {
                baseline.effective_room(&participant.identifier)
            } else {
                baseline.parent_meeting().id.as_str()
            };
            if source != destination {
                plan.moves.push(ParticipantMove {
                    participant: participant.identifier.clone(),
                    sdk_id: participant.sdk_id.clone(),
                    source_meeting_id: source.to_string(),
                    destination_meeting_id: destination.to_string(),
                });
            }
        }

        plan
    }

    pub fn is_empty(&self) -> bool {
        self.creations.is_empty()
            && self.renames.is_empty()
            && self.moves.is_empty()
            && self.deletions.is_empty()
    }

    /// Operations in the order they are issued.
    pub fn operations(&self) -> Vec<ChangeOperation> {
        self.creations
            .iter()
            .cloned()
            .map(ChangeOperation::Create)
            .chain(self.renames.iter().cloned().map(ChangeOperation::Rename))
            .chain(self.moves.iter().cloned().map(ChangeOperation::Move))
            .chain(
                self.deletions
                    .iter()
                    .map(|id| ChangeOperation::Delete {
                        meeting_id: id.clone(),
                    }),
            )
            .collect()
    }
}

/// What a commit run achieved, including partial progress on failure.
#[derive(Debug)]
pub struct CommitOutcome {
    /// Temporary id to server id, for every room the server created.
    pub created: Vec<(String, String)>,
    pub result: Result<(), BreakoutError>,
}

/// Issues the plan through the SDK.
///
/// Creations and renames go out together. Moves wait for the creations
/// because they may target a new room. Deletions go last so nobody is
/// moved out of a room that is already gone. Nothing is rolled back when a
/// step fails.
pub async fn execute(plan: &ChangePlan, meetings: &dyn ConnectedMeetings) -> CommitOutcome {
    let mut created = Vec::new();
    let result = run(plan, meetings, &mut created).await;
    if let Err(e) = &result {
        tracing::error!("commit failed after {} creations: {e}", created.len());
    }
    CommitOutcome { created, result }
}

async fn run(
    plan: &ChangePlan,
    meetings: &dyn ConnectedMeetings,
    created: &mut Vec<(String, String)>,
) -> Result<(), BreakoutError> {
    let titles: Vec<String> = plan.creations.iter().map(|c| c.title.clone()).collect();
    let create = async {
        if titles.is_empty() {
            Ok(Vec::new())
        } else {
            tracing::debug!("creating {} meetings", titles.len());
            meetings.create_meetings(titles).await
        }
    };
    let renames = try_join_all(plan.renames.iter().map(|r| {
        tracing::debug!("renaming {} to {:?}", r.meeting_id, r.title);
        meetings.update_meeting_title(&r.meeting_id, &r.title)
    }));

    let (new_meetings, _) = try_join(create, renames).await?;
    if new_meetings.len() != plan.creations.len() {
        return Err(BreakoutError::Remote(format!(
            "asked for {} meetings, server created {}",
            plan.creations.len(),
            new_meetings.len()
        )));
    }
    created.extend(
        plan.creations
            .iter()
            .zip(new_meetings)
            .map(|(c, m)| (c.temp_id.clone(), m.id)),
    );

    let ids: HashMap<&str, &str> = created
        .iter()
        .map(|(temp, real)| (temp.as_str(), real.as_str()))
        .collect();
    let resolve = |id: &str| ids.get(id).map(|s| s.to_string()).unwrap_or_else(|| id.to_string());

    for ((source, destination), participant_ids) in group_moves(&plan.moves) {
        let source = resolve(source);
        let destination = resolve(destination);
        tracing::debug!(
            "moving {} participants {source} -> {destination}",
            participant_ids.len()
        );
        meetings
            .move_participants(&source, &destination, participant_ids)
            .await?;
    }

    if !plan.deletions.is_empty() {
        tracing::debug!("deleting meetings {:?}", plan.deletions);
        meetings.delete_meetings(plan.deletions.clone()).await?;
    }

    Ok(())
}

/// Batches moves sharing a source and destination, keeping first-seen order.
fn group_moves(moves: &[ParticipantMove]) -> Vec<((&str, &str), Vec<String>)> {
    let mut groups: Vec<((&str, &str), Vec<String>)> = Vec::new();
    for m in moves {
        let key = (m.source_meeting_id.as_str(), m.destination_meeting_id.as_str());
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, ids)) => ids.push(m.sdk_id.clone()),
            None => groups.push((key, vec![m.sdk_id.clone()])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::DraftMeeting;
    use crate::draft::tests::server_state;
    use crate::testing::{FakeMeetings, RemoteCall};

    fn draft_from(state: &crate::connected::ConnectedMeetingsState) -> DraftState {
        DraftState::from_server(state)
    }

    #[test]
    fn identical_layouts_produce_empty_plan() {
        let state = server_state(&["a"], &[("r1", "Room 1", &["b"])]);
        let plan = ChangePlan::between(&draft_from(&state), &draft_from(&state));
        assert!(plan.is_empty());
        assert!(plan.operations().is_empty());
    }

    #[test]
    fn replaced_room_is_delete_plus_create_not_rename() {
        let baseline = draft_from(&server_state(&[], &[("A", "A", &[]), ("B", "B", &[])]));
        let mut draft = baseline.clone();
        draft.remove_meeting("B");
        let c = DraftMeeting::new_room("C".to_string());
        let c_id = c.id.clone();
        draft.push_meeting(c);

        let plan = ChangePlan::between(&baseline, &draft);
        assert_eq!(plan.deletions, ["B"]);
        assert_eq!(plan.creations.len(), 1);
        assert_eq!(plan.creations[0].temp_id, c_id);
        assert_eq!(plan.creations[0].title, "C");
        assert!(plan.renames.is_empty());
    }

    #[test]
    fn title_change_is_a_rename() {
        let baseline = draft_from(&server_state(&[], &[("r1", "Room 1", &[])]));
        let mut draft = baseline.clone();
        draft.room_mut("r1").unwrap().title = Some("Design".to_string());
        let plan = ChangePlan::between(&baseline, &draft);
        assert_eq!(
            plan.renames,
            [MeetingRename {
                meeting_id: "r1".to_string(),
                title: "Design".to_string()
            }]
        );
    }

    #[test]
    fn parent_title_change_is_a_rename() {
        let baseline = draft_from(&server_state(&["a"], &[]));
        let mut draft = baseline.clone();
        draft.room_mut("main").unwrap().title = Some("Plenary".to_string());
        let plan = ChangePlan::between(&baseline, &draft);
        assert_eq!(
            plan.renames,
            [MeetingRename {
                meeting_id: "main".to_string(),
                title: "Plenary".to_string()
            }]
        );
    }

    #[test]
    fn membership_changes_become_per_participant_moves() {
        let baseline = draft_from(&server_state(
            &["a", "b"],
            &[("r1", "Room 1", &["c"]), ("r2", "Room 2", &[])],
        ));
        let mut draft = baseline.clone();
        draft.room_mut("r1").unwrap().participants.push("a".to_string());
        draft.detach("c");
        draft.room_mut("r2").unwrap().participants.push("c".to_string());

        let plan = ChangePlan::between(&baseline, &draft);
        assert_eq!(plan.moves.len(), 2);
        assert_eq!(plan.moves[0].participant, "a");
        assert_eq!(plan.moves[0].source_meeting_id, "main");
        assert_eq!(plan.moves[0].destination_meeting_id, "r1");
        assert_eq!(plan.moves[1].participant, "c");
        assert_eq!(plan.moves[1].source_meeting_id, "r1");
        assert_eq!(plan.moves[1].destination_meeting_id, "r2");
    }

    #[test]
    fn unassigning_moves_back_to_parent() {
        let baseline = draft_from(&server_state(&[], &[("r1", "Room 1", &["a"])]));
        let mut draft = baseline.clone();
        draft.detach("a");
        let plan = ChangePlan::between(&baseline, &draft);
        assert_eq!(plan.moves[0].destination_meeting_id, "main");
    }

    #[test]
    fn unknown_server_room_is_not_recreated() {
        let baseline = draft_from(&server_state(&[], &[]));
        let mut draft = baseline.clone();
        let mut room = DraftMeeting::new_room("Room 1".to_string());
        room.id = "r9".to_string();
        draft.push_meeting(room);
        assert!(ChangePlan::between(&baseline, &draft).is_empty());
    }

    #[test]
    fn operations_are_ordered_create_rename_move_delete() {
        let baseline = draft_from(&server_state(
            &["a"],
            &[("r1", "Room 1", &[]), ("r2", "Room 2", &[])],
        ));
        let mut draft = baseline.clone();
        draft.remove_meeting("r2");
        draft.room_mut("r1").unwrap().title = Some("Renamed".to_string());
        draft.room_mut("r1").unwrap().participants.push("a".to_string());
        draft.push_meeting(DraftMeeting::new_room("Room 3".to_string()));

        let ops = ChangePlan::between(&baseline, &draft).operations();
        assert!(matches!(ops[0], ChangeOperation::Create(_)));
        assert!(matches!(ops[1], ChangeOperation::Rename(_)));
        assert!(matches!(ops[2], ChangeOperation::Move(_)));
        assert!(matches!(ops[3], ChangeOperation::Delete { .. }));
    }

    #[tokio::test]
    async fn moves_into_new_rooms_use_server_ids() {
        let state = server_state(&["a", "b"], &[]);
        let fake = FakeMeetings::new(state.clone());
        let baseline = draft_from(&state);
        let mut draft = baseline.clone();
        let room = DraftMeeting::new_room("Room 1".to_string());
        let temp_id = room.id.clone();
        draft.push_meeting(room);
        draft.room_mut(&temp_id).unwrap().participants.push("a".to_string());
        draft.room_mut(&temp_id).unwrap().participants.push("b".to_string());

        let plan = ChangePlan::between(&baseline, &draft);
        let outcome = execute(&plan, &fake).await;
        assert!(outcome.result.is_ok());
        assert_eq!(outcome.created.len(), 1);
        let (temp, real) = &outcome.created[0];
        assert_eq!(temp, &temp_id);

        let calls = fake.calls();
        assert_eq!(calls[0], RemoteCall::Create(vec!["Room 1".to_string()]));
        assert_eq!(
            calls[1],
            RemoteCall::Move {
                source: "main".to_string(),
                destination: real.clone(),
                participants: vec!["a".to_string(), "b".to_string()],
            }
        );
        assert_eq!(fake.state().meetings[0].participants.len(), 2);
    }

    #[tokio::test]
    async fn failure_stops_the_run_and_keeps_created_ids() {
        let state = server_state(&["a"], &[("r1", "Room 1", &[])]);
        let fake = FakeMeetings::new(state.clone());
        fake.fail_moves(true);
        let baseline = draft_from(&state);
        let mut draft = baseline.clone();
        draft.remove_meeting("r1");
        let room = DraftMeeting::new_room("Room 2".to_string());
        let temp_id = room.id.clone();
        draft.push_meeting(room);
        draft.room_mut(&temp_id).unwrap().participants.push("a".to_string());

        let outcome = execute(&ChangePlan::between(&baseline, &draft), &fake).await;
        assert!(matches!(outcome.result, Err(BreakoutError::Remote(_))));
        assert_eq!(outcome.created.len(), 1);
        assert!(
            !fake
                .calls()
                .iter()
                .any(|c| matches!(c, RemoteCall::Delete(_)))
        );
    }

    #[tokio::test]
    async fn empty_plan_issues_no_calls() {
        let fake = FakeMeetings::new(server_state(&["a"], &[]));
        let outcome = execute(&ChangePlan::default(), &fake).await;
        assert!(outcome.result.is_ok());
        assert!(fake.calls().is_empty());
    }
}
