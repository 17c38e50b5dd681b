//! In-process storage, used by the test suite and for trying the service without a database

use std::collections::{BTreeMap, BTreeSet};

use async_std::sync::Mutex;
use chrono::Utc;
use log::*;

use super::{PollStore, Result, StoreError, VoteOutcome};
use crate::models::{Choice, ChoiceDraft, Group, Poll, PollDraft, Revision, User, Version};
use crate::permissions::{Permission, PermissionSet, Subject};

#[derive(Default)]
struct Inner {
    next_id: i32,
    users: Vec<User>,
    groups: Vec<Group>,
    polls: BTreeMap<i32, Poll>,
    poll_perms: BTreeSet<(Subject, i32, Permission)>,
    global_perms: BTreeSet<(Subject, Permission)>,
    versions: Vec<Version>,
}

impl Inner {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn add_group(&mut self, name: &str) -> Group {
        let group = Group {
            id: self.next_id(),
            name: name.to_string(),
        };
        self.groups.push(group.clone());
        group
    }

    fn apply_draft(&mut self, poll_id: i32, draft: &PollDraft) -> Result<()> {
        let existing = match self.polls.get(&poll_id) {
            Some(poll) => poll.choices.clone(),
            None => return Err(StoreError::NotFound(format!("poll {}", poll_id))),
        };

        let mut choices = Vec::with_capacity(draft.choices.len());
        for choice in draft.choices.iter() {
            let current = choice
                .id
                .and_then(|id| existing.iter().find(|c| c.id == id));
            let (id, votes) = match current {
                Some(current) => (current.id, current.votes),
                None => (self.next_id(), 0),
            };
            choices.push(to_choice(poll_id, id, votes, choice));
        }
        choices.sort_by_key(|choice| (choice.index, choice.id));

        if let Some(poll) = self.polls.get_mut(&poll_id) {
            poll.title = draft.title.clone();
            poll.text = draft.text.clone();
            poll.start_date = draft.start_date;
            poll.end_date = draft.end_date;
            poll.max_allowed_number_of_answers = draft.max_allowed_number_of_answers;
            poll.show_results_immediately = draft.show_results_immediately;
            poll.choices = choices;
        }
        Ok(())
    }

    fn push_version(&mut self, poll_id: i32, revision: &Revision) -> Result<()> {
        let snapshot = match self.polls.get(&poll_id) {
            Some(poll) => poll.draft(),
            None => return Err(StoreError::NotFound(format!("poll {}", poll_id))),
        };
        let version = Version {
            id: self.next_id(),
            poll_id,
            snapshot,
            comment: revision.comment.clone(),
            author: revision.author,
            created_at: Utc::now(),
        };
        self.versions.push(version);
        Ok(())
    }

    fn poll(&self, poll_id: i32) -> Result<Poll> {
        self.polls
            .get(&poll_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("poll {}", poll_id)))
    }
}

fn to_choice(poll_id: i32, id: i32, votes: i32, draft: &ChoiceDraft) -> Choice {
    Choice {
        id,
        poll_id,
        text: draft.text.clone(),
        description: draft.description.clone(),
        votes,
        index: draft.index,
    }
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /**
     * An empty store, except for the `Staff` group every installation starts with
     */
    pub fn new() -> Self {
        let mut inner = Inner::default();
        inner.add_group("Staff");
        Self {
            inner: Mutex::new(inner),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PollStore for MemoryStore {
    async fn create_user(&self, username: &str, is_superuser: bool) -> Result<User> {
        let mut inner = self.inner.lock().await;
        if inner.users.iter().any(|user| user.username == username) {
            return Err(StoreError::Conflict(format!("user {} exists", username)));
        }
        let user = User {
            id: inner.next_id(),
            username: username.to_string(),
            is_superuser,
            groups: Vec::new(),
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn user_by_name(&self, username: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().await;
        Ok(inner.users.iter().find(|user| user.username == username).cloned())
    }

    async fn create_group(&self, name: &str) -> Result<Group> {
        let mut inner = self.inner.lock().await;
        if inner.groups.iter().any(|group| group.name == name) {
            return Err(StoreError::Conflict(format!("group {} exists", name)));
        }
        Ok(inner.add_group(name))
    }

    async fn groups(&self) -> Result<Vec<Group>> {
        let inner = self.inner.lock().await;
        let mut groups = inner.groups.clone();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn group_by_name(&self, name: &str) -> Result<Option<Group>> {
        let inner = self.inner.lock().await;
        Ok(inner.groups.iter().find(|group| group.name == name).cloned())
    }

    async fn add_user_to_group(&self, user_id: i32, group_id: i32) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.groups.iter().any(|group| group.id == group_id) {
            return Err(StoreError::NotFound(format!("group {}", group_id)));
        }
        match inner.users.iter_mut().find(|user| user.id == user_id) {
            Some(user) => {
                if !user.groups.contains(&group_id) {
                    user.groups.push(group_id);
                }
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("user {}", user_id))),
        }
    }

    async fn assign_perm(&self, perm: Permission, subject: Subject, poll_id: i32) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.polls.contains_key(&poll_id) {
            return Err(StoreError::NotFound(format!("poll {}", poll_id)));
        }
        inner.poll_perms.insert((subject, poll_id, perm));
        Ok(())
    }

    async fn get_perms(&self, subject: Subject, poll_id: i32) -> Result<PermissionSet> {
        let inner = self.inner.lock().await;
        Ok(inner
            .poll_perms
            .iter()
            .filter(|(s, p, _)| *s == subject && *p == poll_id)
            .map(|(_, _, perm)| *perm)
            .collect())
    }

    async fn assign_global_perm(&self, perm: Permission, subject: Subject) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.global_perms.insert((subject, perm));
        Ok(())
    }

    async fn get_global_perms(&self, subject: Subject) -> Result<PermissionSet> {
        let inner = self.inner.lock().await;
        Ok(inner
            .global_perms
            .iter()
            .filter(|(s, _)| *s == subject)
            .map(|(_, perm)| *perm)
            .collect())
    }

    async fn polls(&self) -> Result<Vec<Poll>> {
        let inner = self.inner.lock().await;
        let mut polls: Vec<Poll> = inner.polls.values().cloned().collect();
        polls.sort_by(|a, b| b.start_date.cmp(&a.start_date).then(a.id.cmp(&b.id)));
        Ok(polls)
    }

    async fn poll(&self, url_title: &str) -> Result<Option<Poll>> {
        let inner = self.inner.lock().await;
        Ok(inner.polls.values().find(|poll| poll.url_title == url_title).cloned())
    }

    async fn url_title_taken(&self, url_title: &str) -> Result<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.polls.values().any(|poll| poll.url_title == url_title))
    }

    async fn create_poll(
        &self,
        url_title: &str,
        draft: &PollDraft,
        revision: &Revision,
        grants: &[(Subject, Permission)],
    ) -> Result<Poll> {
        let mut inner = self.inner.lock().await;
        if inner.polls.values().any(|poll| poll.url_title == url_title) {
            return Err(StoreError::Conflict(format!("url title {} is taken", url_title)));
        }

        let id = inner.next_id();
        inner.polls.insert(
            id,
            Poll {
                id,
                url_title: url_title.to_string(),
                title: draft.title.clone(),
                text: draft.text.clone(),
                start_date: draft.start_date,
                end_date: draft.end_date,
                max_allowed_number_of_answers: draft.max_allowed_number_of_answers,
                show_results_immediately: draft.show_results_immediately,
                participants: BTreeSet::new(),
                choices: Vec::new(),
            },
        );
        inner.apply_draft(id, draft)?;
        inner.push_version(id, revision)?;
        for (subject, perm) in grants.iter() {
            inner.poll_perms.insert((*subject, id, *perm));
        }
        debug!("Created poll {} ({})", id, url_title);
        inner.poll(id)
    }

    async fn update_poll(&self, poll_id: i32, draft: &PollDraft, revision: &Revision) -> Result<Poll> {
        let mut inner = self.inner.lock().await;
        let poll = inner.poll(poll_id)?;
        let existing: BTreeSet<i32> = poll.choices.iter().map(|choice| choice.id).collect();
        if !poll.participants.is_empty() && draft.changes_choices_of(&existing) {
            return Err(StoreError::Conflict(format!(
                "choices of poll {} can not change once votes have been cast",
                poll_id
            )));
        }

        inner.apply_draft(poll_id, draft)?;
        inner.push_version(poll_id, revision)?;
        inner.poll(poll_id)
    }

    async fn revert_poll(&self, poll_id: i32, version_id: i32, revision: &Revision) -> Result<Poll> {
        let mut inner = self.inner.lock().await;
        let poll = inner.poll(poll_id)?;
        let snapshot = match inner
            .versions
            .iter()
            .find(|version| version.id == version_id && version.poll_id == poll_id)
        {
            Some(version) => version.snapshot.clone(),
            None => return Err(StoreError::NotFound(format!("version {} of poll {}", version_id, poll_id))),
        };
        if !poll.can_be_reverted() {
            return Err(StoreError::Conflict(format!("poll {} already has votes", poll_id)));
        }

        inner.apply_draft(poll_id, &snapshot)?;
        inner.push_version(poll_id, revision)?;
        debug!("Reverted poll {} to version {}", poll_id, version_id);
        inner.poll(poll_id)
    }

    async fn delete_poll(&self, poll_id: i32) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.polls.remove(&poll_id).is_none() {
            return Err(StoreError::NotFound(format!("poll {}", poll_id)));
        }
        inner.poll_perms.retain(|(_, p, _)| *p != poll_id);
        inner.versions.retain(|version| version.poll_id != poll_id);
        Ok(())
    }

    async fn record_vote(&self, poll_id: i32, user_id: i32, choice_ids: &[i32]) -> Result<VoteOutcome> {
        let mut inner = self.inner.lock().await;
        let poll = match inner.polls.get_mut(&poll_id) {
            Some(poll) => poll,
            None => return Err(StoreError::NotFound(format!("poll {}", poll_id))),
        };

        if poll.participants.contains(&user_id) {
            return Ok(VoteOutcome::AlreadyParticipated);
        }
        let unique: BTreeSet<i32> = choice_ids.iter().copied().collect();
        if unique.len() != choice_ids.len() || !unique.iter().all(|id| poll.choice(*id).is_some()) {
            return Ok(VoteOutcome::ChoiceMismatch);
        }

        for choice in poll.choices.iter_mut().filter(|c| unique.contains(&c.id)) {
            choice.votes += 1;
        }
        poll.participants.insert(user_id);
        Ok(VoteOutcome::Recorded)
    }

    async fn versions(&self, poll_id: i32) -> Result<Vec<Version>> {
        let inner = self.inner.lock().await;
        let mut versions: Vec<Version> = inner
            .versions
            .iter()
            .filter(|version| version.poll_id == poll_id)
            .cloned()
            .collect();
        versions.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(versions)
    }
}
