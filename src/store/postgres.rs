//! PostgreSQL storage through sqlx

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use log::*;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};

use super::{PollStore, Result, StoreError, VoteOutcome};
use crate::config::Settings;
use crate::models::{Choice, Group, Localized, Poll, PollDraft, Revision, User, Version};
use crate::permissions::{Permission, PermissionSet, Subject};

const POLL_COLUMNS: &str = "SELECT p.id, p.url_title, p.title_en, p.title_de, p.text_en, p.text_de,
            p.start_date, p.end_date, p.max_allowed_number_of_answers, p.show_results_immediately,
            ARRAY(SELECT user_id FROM poll_participants pp WHERE pp.poll_id = p.id) AS participants
        FROM polls p";

#[derive(sqlx::FromRow)]
struct PollRow {
    id: i32,
    url_title: String,
    title_en: String,
    title_de: String,
    text_en: String,
    text_de: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    max_allowed_number_of_answers: i32,
    show_results_immediately: bool,
    participants: Vec<i32>,
}

impl PollRow {
    fn into_poll(self, choices: Vec<Choice>) -> Poll {
        Poll {
            id: self.id,
            url_title: self.url_title,
            title: Localized::new(self.title_en, self.title_de),
            text: Localized::new(self.text_en, self.text_de),
            start_date: self.start_date,
            end_date: self.end_date,
            max_allowed_number_of_answers: self.max_allowed_number_of_answers,
            show_results_immediately: self.show_results_immediately,
            participants: self.participants.into_iter().collect(),
            choices,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ChoiceRow {
    id: i32,
    poll_id: i32,
    text_en: String,
    text_de: String,
    description_en: String,
    description_de: String,
    votes: i32,
    ordering: i32,
}

impl From<ChoiceRow> for Choice {
    fn from(row: ChoiceRow) -> Self {
        Choice {
            id: row.id,
            poll_id: row.poll_id,
            text: Localized::new(row.text_en, row.text_de),
            description: Localized::new(row.description_en, row.description_de),
            votes: row.votes,
            index: row.ordering,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i32,
    username: String,
    is_superuser: bool,
    groups: Vec<i32>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            is_superuser: row.is_superuser,
            groups: row.groups,
        }
    }
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: i32,
    name: String,
}

impl From<GroupRow> for Group {
    fn from(row: GroupRow) -> Self {
        Group {
            id: row.id,
            name: row.name,
        }
    }
}

#[derive(sqlx::FromRow)]
struct VersionRow {
    id: i32,
    poll_id: i32,
    snapshot: Json<PollDraft>,
    comment: String,
    author: Option<i32>,
    created_at: DateTime<Utc>,
}

impl From<VersionRow> for Version {
    fn from(row: VersionRow) -> Self {
        Version {
            id: row.id,
            poll_id: row.poll_id,
            snapshot: row.snapshot.0,
            comment: row.comment,
            author: row.author,
            created_at: row.created_at,
        }
    }
}

fn parse_perms(codenames: Vec<String>) -> PermissionSet {
    codenames
        .iter()
        .filter_map(|codename| {
            let perm = Permission::from_codename(codename);
            if perm.is_none() {
                warn!("Ignoring unknown permission {:?}", codename);
            }
            perm
        })
        .collect()
}

#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /**
     * Create the sqlx connection pool for postgresql
     */
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(&settings.database_url)
            .await?;
        Ok(Self { pool })
    }

    /**
     * Bring the schema up to date, this also seeds the `Staff` group
     */
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn load_polls(&self, rows: Vec<PollRow>) -> Result<Vec<Poll>> {
        let ids: Vec<i32> = rows.iter().map(|row| row.id).collect();
        let choices = sqlx::query_as::<_, ChoiceRow>(
            "SELECT id, poll_id, text_en, text_de, description_en, description_de, votes, ordering
                FROM choices WHERE poll_id = ANY($1) ORDER BY ordering ASC, id ASC",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_poll: BTreeMap<i32, Vec<Choice>> = BTreeMap::new();
        for choice in choices {
            by_poll.entry(choice.poll_id).or_default().push(choice.into());
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let choices = by_poll.remove(&row.id).unwrap_or_default();
                row.into_poll(choices)
            })
            .collect())
    }

    async fn poll_by_id(&self, poll_id: i32) -> Result<Poll> {
        let row = sqlx::query_as::<_, PollRow>(&format!("{} WHERE p.id = $1", POLL_COLUMNS))
            .bind(poll_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => self
                .load_polls(vec![row])
                .await?
                .pop()
                .ok_or_else(|| StoreError::NotFound(format!("poll {}", poll_id))),
            None => Err(StoreError::NotFound(format!("poll {}", poll_id))),
        }
    }

    /**
     * Lock the poll row until the transaction ends, ballots and edits of the poll queue up
     * behind it. Returns whether the poll has participants.
     */
    async fn lock_poll(tx: &mut Transaction<'_, Postgres>, poll_id: i32) -> Result<bool> {
        let locked = sqlx::query_scalar::<_, i32>("SELECT id FROM polls WHERE id = $1 FOR UPDATE")
            .bind(poll_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(StoreError::NotFound(format!("poll {}", poll_id)));
        }

        let voted = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM poll_participants WHERE poll_id = $1)",
        )
        .bind(poll_id)
        .fetch_one(&mut *tx)
        .await?;
        Ok(voted)
    }

    async fn choice_ids(tx: &mut Transaction<'_, Postgres>, poll_id: i32) -> Result<BTreeSet<i32>> {
        let ids = sqlx::query_scalar::<_, i32>("SELECT id FROM choices WHERE poll_id = $1")
            .bind(poll_id)
            .fetch_all(&mut *tx)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn write_poll(tx: &mut Transaction<'_, Postgres>, poll_id: i32, draft: &PollDraft) -> Result<()> {
        sqlx::query(
            "UPDATE polls SET title_en = $1, title_de = $2, text_en = $3, text_de = $4,
                start_date = $5, end_date = $6, max_allowed_number_of_answers = $7,
                show_results_immediately = $8 WHERE id = $9",
        )
        .bind(&draft.title.en)
        .bind(&draft.title.de)
        .bind(&draft.text.en)
        .bind(&draft.text.de)
        .bind(draft.start_date)
        .bind(draft.end_date)
        .bind(draft.max_allowed_number_of_answers)
        .bind(draft.show_results_immediately)
        .bind(poll_id)
        .execute(&mut *tx)
        .await?;
        Ok(())
    }

    /**
     * Write the choices of a draft, inserting the ones which do not exist (anymore) and deleting
     * the ones the draft dropped. Returns the draft as stored, every choice with its id.
     */
    async fn write_choices(
        tx: &mut Transaction<'_, Postgres>,
        poll_id: i32,
        existing: &BTreeSet<i32>,
        draft: &PollDraft,
    ) -> Result<PollDraft> {
        let mut stored = draft.clone();
        let mut kept = Vec::with_capacity(draft.choices.len());
        for choice in stored.choices.iter_mut() {
            match choice.id.filter(|id| existing.contains(id)) {
                Some(id) => {
                    sqlx::query(
                        "UPDATE choices SET text_en = $1, text_de = $2, description_en = $3,
                            description_de = $4, ordering = $5 WHERE id = $6",
                    )
                    .bind(&choice.text.en)
                    .bind(&choice.text.de)
                    .bind(&choice.description.en)
                    .bind(&choice.description.de)
                    .bind(choice.index)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                    choice.id = Some(id);
                    kept.push(id);
                }
                None => {
                    let id = sqlx::query_scalar::<_, i32>(
                        "INSERT INTO choices (poll_id, text_en, text_de, description_en, description_de, ordering)
                            VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
                    )
                    .bind(poll_id)
                    .bind(&choice.text.en)
                    .bind(&choice.text.de)
                    .bind(&choice.description.en)
                    .bind(&choice.description.de)
                    .bind(choice.index)
                    .fetch_one(&mut *tx)
                    .await?;
                    choice.id = Some(id);
                    kept.push(id);
                }
            }
        }

        sqlx::query("DELETE FROM choices WHERE poll_id = $1 AND NOT (id = ANY($2))")
            .bind(poll_id)
            .bind(kept)
            .execute(&mut *tx)
            .await?;
        Ok(stored)
    }

    async fn write_version(
        tx: &mut Transaction<'_, Postgres>,
        poll_id: i32,
        draft: &PollDraft,
        revision: &Revision,
    ) -> Result<()> {
        sqlx::query("INSERT INTO poll_versions (poll_id, snapshot, comment, author) VALUES ($1, $2, $3, $4)")
            .bind(poll_id)
            .bind(Json(draft))
            .bind(&revision.comment)
            .bind(revision.author)
            .execute(&mut *tx)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl PollStore for PostgresStore {
    async fn create_user(&self, username: &str, is_superuser: bool) -> Result<User> {
        let id = sqlx::query_scalar::<_, i32>(
            "INSERT INTO users (username, is_superuser) VALUES ($1, $2) RETURNING id",
        )
        .bind(username)
        .bind(is_superuser)
        .fetch_one(&self.pool)
        .await?;

        Ok(User {
            id,
            username: username.to_string(),
            is_superuser,
            groups: Vec::new(),
        })
    }

    async fn user_by_name(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT u.id, u.username, u.is_superuser,
                ARRAY(SELECT group_id FROM user_groups ug WHERE ug.user_id = u.id) AS groups
                FROM users u WHERE u.username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn create_group(&self, name: &str) -> Result<Group> {
        let row = sqlx::query_as::<_, GroupRow>("INSERT INTO groups (name) VALUES ($1) RETURNING id, name")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn groups(&self) -> Result<Vec<Group>> {
        let rows = sqlx::query_as::<_, GroupRow>("SELECT id, name FROM groups ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Group::from).collect())
    }

    async fn group_by_name(&self, name: &str) -> Result<Option<Group>> {
        let row = sqlx::query_as::<_, GroupRow>("SELECT id, name FROM groups WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Group::from))
    }

    async fn add_user_to_group(&self, user_id: i32, group_id: i32) -> Result<()> {
        sqlx::query("INSERT INTO user_groups (user_id, group_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(user_id)
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn assign_perm(&self, perm: Permission, subject: Subject, poll_id: i32) -> Result<()> {
        sqlx::query(
            "INSERT INTO poll_permissions (subject_kind, subject_id, poll_id, permission)
                VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
        )
        .bind(subject.kind())
        .bind(subject.id())
        .bind(poll_id)
        .bind(perm.codename())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_perms(&self, subject: Subject, poll_id: i32) -> Result<PermissionSet> {
        let codenames = sqlx::query_scalar::<_, String>(
            "SELECT permission FROM poll_permissions
                WHERE subject_kind = $1 AND subject_id = $2 AND poll_id = $3",
        )
        .bind(subject.kind())
        .bind(subject.id())
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(parse_perms(codenames))
    }

    async fn assign_global_perm(&self, perm: Permission, subject: Subject) -> Result<()> {
        sqlx::query(
            "INSERT INTO global_permissions (subject_kind, subject_id, permission)
                VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(subject.kind())
        .bind(subject.id())
        .bind(perm.codename())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_global_perms(&self, subject: Subject) -> Result<PermissionSet> {
        let codenames = sqlx::query_scalar::<_, String>(
            "SELECT permission FROM global_permissions WHERE subject_kind = $1 AND subject_id = $2",
        )
        .bind(subject.kind())
        .bind(subject.id())
        .fetch_all(&self.pool)
        .await?;
        Ok(parse_perms(codenames))
    }

    async fn polls(&self) -> Result<Vec<Poll>> {
        let rows = sqlx::query_as::<_, PollRow>(&format!(
            "{} ORDER BY p.start_date DESC, p.id ASC",
            POLL_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        self.load_polls(rows).await
    }

    async fn poll(&self, url_title: &str) -> Result<Option<Poll>> {
        let row = sqlx::query_as::<_, PollRow>(&format!("{} WHERE p.url_title = $1", POLL_COLUMNS))
            .bind(url_title)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.load_polls(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn url_title_taken(&self, url_title: &str) -> Result<bool> {
        let taken = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM polls WHERE url_title = $1)")
            .bind(url_title)
            .fetch_one(&self.pool)
            .await?;
        Ok(taken)
    }

    async fn create_poll(
        &self,
        url_title: &str,
        draft: &PollDraft,
        revision: &Revision,
        grants: &[(Subject, Permission)],
    ) -> Result<Poll> {
        let mut tx = self.pool.begin().await?;
        let poll_id = sqlx::query_scalar::<_, i32>(
            "INSERT INTO polls (url_title, title_en, title_de, text_en, text_de, start_date, end_date,
                max_allowed_number_of_answers, show_results_immediately)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING id",
        )
        .bind(url_title)
        .bind(&draft.title.en)
        .bind(&draft.title.de)
        .bind(&draft.text.en)
        .bind(&draft.text.de)
        .bind(draft.start_date)
        .bind(draft.end_date)
        .bind(draft.max_allowed_number_of_answers)
        .bind(draft.show_results_immediately)
        .fetch_one(&mut tx)
        .await?;

        let stored = Self::write_choices(&mut tx, poll_id, &BTreeSet::new(), draft).await?;
        Self::write_version(&mut tx, poll_id, &stored, revision).await?;
        for (subject, perm) in grants.iter() {
            sqlx::query(
                "INSERT INTO poll_permissions (subject_kind, subject_id, poll_id, permission)
                    VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
            )
            .bind(subject.kind())
            .bind(subject.id())
            .bind(poll_id)
            .bind(perm.codename())
            .execute(&mut tx)
            .await?;
        }
        tx.commit().await?;

        info!("Created poll {} ({})", poll_id, url_title);
        self.poll_by_id(poll_id).await
    }

    async fn update_poll(&self, poll_id: i32, draft: &PollDraft, revision: &Revision) -> Result<Poll> {
        let mut tx = self.pool.begin().await?;
        let voted = Self::lock_poll(&mut tx, poll_id).await?;
        let existing = Self::choice_ids(&mut tx, poll_id).await?;
        if voted && draft.changes_choices_of(&existing) {
            tx.rollback().await?;
            return Err(StoreError::Conflict(format!(
                "choices of poll {} can not change once votes have been cast",
                poll_id
            )));
        }

        Self::write_poll(&mut tx, poll_id, draft).await?;
        let stored = Self::write_choices(&mut tx, poll_id, &existing, draft).await?;
        Self::write_version(&mut tx, poll_id, &stored, revision).await?;
        tx.commit().await?;

        debug!("Updated poll {}", poll_id);
        self.poll_by_id(poll_id).await
    }

    async fn revert_poll(&self, poll_id: i32, version_id: i32, revision: &Revision) -> Result<Poll> {
        let mut tx = self.pool.begin().await?;
        let voted = Self::lock_poll(&mut tx, poll_id).await?;

        let version = sqlx::query_as::<_, VersionRow>(
            "SELECT id, poll_id, snapshot, comment, author, created_at FROM poll_versions
                WHERE id = $1 AND poll_id = $2",
        )
        .bind(version_id)
        .bind(poll_id)
        .fetch_optional(&mut tx)
        .await?;
        let snapshot = match version {
            Some(version) => version.snapshot.0,
            None => {
                tx.rollback().await?;
                return Err(StoreError::NotFound(format!("version {} of poll {}", version_id, poll_id)));
            }
        };
        if voted {
            tx.rollback().await?;
            return Err(StoreError::Conflict(format!("poll {} already has votes", poll_id)));
        }

        let existing = Self::choice_ids(&mut tx, poll_id).await?;
        Self::write_poll(&mut tx, poll_id, &snapshot).await?;
        let stored = Self::write_choices(&mut tx, poll_id, &existing, &snapshot).await?;
        Self::write_version(&mut tx, poll_id, &stored, revision).await?;
        tx.commit().await?;

        info!("Reverted poll {} to version {}", poll_id, version_id);
        self.poll_by_id(poll_id).await
    }

    async fn delete_poll(&self, poll_id: i32) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM polls WHERE id = $1")
            .bind(poll_id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("poll {}", poll_id)));
        }
        info!("Deleted poll {}", poll_id);
        Ok(())
    }

    async fn record_vote(&self, poll_id: i32, user_id: i32, choice_ids: &[i32]) -> Result<VoteOutcome> {
        let mut tx = self.pool.begin().await?;
        Self::lock_poll(&mut tx, poll_id).await?;

        let joined = sqlx::query(
            "INSERT INTO poll_participants (poll_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(poll_id)
        .bind(user_id)
        .execute(&mut tx)
        .await?;
        if joined.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(VoteOutcome::AlreadyParticipated);
        }

        let counted = sqlx::query("UPDATE choices SET votes = votes + 1 WHERE poll_id = $1 AND id = ANY($2)")
            .bind(poll_id)
            .bind(choice_ids.to_vec())
            .execute(&mut tx)
            .await?;
        if counted.rows_affected() != choice_ids.len() as u64 {
            tx.rollback().await?;
            return Ok(VoteOutcome::ChoiceMismatch);
        }

        tx.commit().await?;
        debug!("User {} voted in poll {}: {:?}", user_id, poll_id, choice_ids);
        Ok(VoteOutcome::Recorded)
    }

    async fn versions(&self, poll_id: i32) -> Result<Vec<Version>> {
        let rows = sqlx::query_as::<_, VersionRow>(
            "SELECT id, poll_id, snapshot, comment, author, created_at FROM poll_versions
                WHERE poll_id = $1 ORDER BY id DESC",
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Version::from).collect())
    }
}
