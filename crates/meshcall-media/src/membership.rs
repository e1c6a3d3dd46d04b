//! Call membership tracking.
//!
//! Membership is read as whole snapshots from the call directory; join and
//! leave events are the set difference between consecutive snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use meshcall_shared::{CallDirectory, CallId, DirectoryError, Participant, ParticipantId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    Joined(Participant),
    Left(Participant),
}

pub struct MembershipRegistry {
    call_id: CallId,
    directory: Arc<dyn CallDirectory>,
    members: BTreeMap<ParticipantId, Participant>,
}

impl MembershipRegistry {
    pub fn new(call_id: CallId, directory: Arc<dyn CallDirectory>) -> Self {
        Self {
            call_id,
            directory,
            members: BTreeMap::new(),
        }
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    /// Fetch the current participants and diff them against the last snapshot.
    ///
    /// A directory failure leaves the known membership untouched; the caller
    /// retries later.
    pub async fn poll(&mut self) -> Result<Vec<MembershipEvent>, DirectoryError> {
        let snapshot = self.directory.participants(&self.call_id).await?;
        Ok(self.apply_snapshot(snapshot))
    }

    /// Replace the membership with `snapshot`. Events come out in id order,
    /// departures first. Applying the same snapshot twice emits nothing.
    pub fn apply_snapshot(&mut self, snapshot: Vec<Participant>) -> Vec<MembershipEvent> {
        let mut next: BTreeMap<ParticipantId, Participant> = BTreeMap::new();
        for participant in snapshot {
            next.entry(participant.user_id.clone()).or_insert(participant);
        }

        let mut events = Vec::new();
        for (id, participant) in &self.members {
            if !next.contains_key(id) {
                info!(call = %self.call_id, participant = %id.short(), "Participant left");
                events.push(MembershipEvent::Left(participant.clone()));
            }
        }
        for (id, participant) in &next {
            if !self.members.contains_key(id) {
                info!(call = %self.call_id, participant = %id.short(), "Participant joined");
                events.push(MembershipEvent::Joined(participant.clone()));
            }
        }

        if events.is_empty() {
            debug!(call = %self.call_id, members = next.len(), "Membership unchanged");
        }
        self.members = next;
        events
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.members.values().cloned().collect()
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.members.contains_key(id)
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }
}
