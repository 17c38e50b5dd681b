//! Persistence for polls, their permissions and their version history

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use tide::StatusCode;

use crate::models::{Group, Poll, PollDraft, Revision, User, Version};
use crate::permissions::{Permission, PermissionSet, Subject};

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// SQLSTATE of a unique constraint violation
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn status(&self) -> StatusCode {
        match self {
            StoreError::NotFound(_) => StatusCode::NotFound,
            StoreError::Conflict(_) => StatusCode::Conflict,
            StoreError::Database(_) | StoreError::Migration(_) => StatusCode::InternalServerError,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let duplicate = err
            .as_database_error()
            .and_then(|db| db.code())
            .map_or(false, |code| code == UNIQUE_VIOLATION);

        if duplicate {
            StoreError::Conflict(err.to_string())
        } else {
            StoreError::Database(err)
        }
    }
}

/**
 * Convert a storage failure into a tide error carrying the matching status
 */
pub fn http_error(err: StoreError) -> tide::Error {
    if err.status().is_server_error() {
        log::error!("Storage failure: {}", err);
    }
    tide::Error::new(err.status(), err)
}

/**
 * What happened to a submitted ballot
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    Recorded,
    /// The user is already a participant, nothing was changed
    AlreadyParticipated,
    /// At least one choice does not belong to the poll, nothing was changed
    ChoiceMismatch,
}

/**
 * Storage for everything the poll service persists.
 *
 * Every method which changes a poll does so atomically: either all of its effects are visible
 * afterwards or none of them.
 */
#[async_trait::async_trait]
pub trait PollStore: Send + Sync {
    async fn create_user(&self, username: &str, is_superuser: bool) -> Result<User>;
    async fn user_by_name(&self, username: &str) -> Result<Option<User>>;
    async fn create_group(&self, name: &str) -> Result<Group>;
    async fn groups(&self) -> Result<Vec<Group>>;
    async fn group_by_name(&self, name: &str) -> Result<Option<Group>>;
    async fn add_user_to_group(&self, user_id: i32, group_id: i32) -> Result<()>;

    async fn assign_perm(&self, perm: Permission, subject: Subject, poll_id: i32) -> Result<()>;
    /// Permissions granted to exactly this subject, nothing inherited
    async fn get_perms(&self, subject: Subject, poll_id: i32) -> Result<PermissionSet>;
    async fn assign_global_perm(&self, perm: Permission, subject: Subject) -> Result<()>;
    async fn get_global_perms(&self, subject: Subject) -> Result<PermissionSet>;

    /// All polls, most recently started first
    async fn polls(&self) -> Result<Vec<Poll>>;
    async fn poll(&self, url_title: &str) -> Result<Option<Poll>>;
    async fn url_title_taken(&self, url_title: &str) -> Result<bool>;
    /// Store a new poll, the permissions granted on it and its first version
    async fn create_poll(
        &self,
        url_title: &str,
        draft: &PollDraft,
        revision: &Revision,
        grants: &[(Subject, Permission)],
    ) -> Result<Poll>;
    /**
     * Replace the editable state of a poll and record a version of it.
     *
     * Choices of the poll missing from the draft are deleted, vote counters of the remaining
     * ones are left alone. Once the poll has participants a draft which adds or drops a choice
     * fails with `Conflict` and changes nothing.
     */
    async fn update_poll(&self, poll_id: i32, draft: &PollDraft, revision: &Revision) -> Result<Poll>;
    /**
     * Restore the snapshot of one of the poll's versions and record that as a new version.
     *
     * Fails with `NotFound` when the version belongs to another poll and with `Conflict` once the
     * poll has participants.
     */
    async fn revert_poll(&self, poll_id: i32, version_id: i32, revision: &Revision) -> Result<Poll>;
    async fn delete_poll(&self, poll_id: i32) -> Result<()>;
    /**
     * Count one vote for each choice and add the user to the participants, or change nothing
     */
    async fn record_vote(&self, poll_id: i32, user_id: i32, choice_ids: &[i32]) -> Result<VoteOutcome>;

    /// Newest first
    async fn versions(&self, poll_id: i32) -> Result<Vec<Version>>;

    /**
     * Effective permissions of a user on a poll: superusers hold all of them, everybody else the
     * union of what they, their groups and the anonymous subject were granted. Votes are tied to
     * users, so nobody votes without signing in.
     */
    async fn perms_for(&self, user: Option<&User>, poll_id: i32) -> Result<PermissionSet> {
        if user.map_or(false, |user| user.is_superuser) {
            return Ok(PermissionSet::all());
        }

        let mut perms = PermissionSet::default();
        for subject in Subject::all_for(user) {
            perms.union_with(&self.get_perms(subject, poll_id).await?);
        }
        if user.is_none() {
            perms.remove(Permission::Vote);
        }
        Ok(perms)
    }

    async fn has_perm(&self, user: Option<&User>, perm: Permission, poll_id: i32) -> Result<bool> {
        Ok(self.perms_for(user, poll_id).await?.contains(perm))
    }

    async fn has_global_perm(&self, user: Option<&User>, perm: Permission) -> Result<bool> {
        if user.map_or(false, |user| user.is_superuser) {
            return Ok(true);
        }
        for subject in Subject::all_for(user) {
            if self.get_global_perms(subject).await?.contains(perm) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /**
     * Derive an unused URL title from a poll title
     */
    async fn unique_url_title(&self, title: &str) -> Result<String> {
        let base = crate::models::slugify(title);
        let mut candidate = base.clone();
        let mut suffix = 1;
        while crate::routes::is_reserved(&candidate) || self.url_title_taken(&candidate).await? {
            suffix += 1;
            candidate = format!("{}-{}", base, suffix);
        }
        Ok(candidate)
    }
}
