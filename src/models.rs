use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/**
 * The languages every user-facing string is stored in
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Language {
    English,
    German,
}

impl Language {
    /**
     * Pick the language from an `Accept-Language` header value, only the first tag counts
     */
    pub fn from_accept_language(header: Option<&str>) -> Self {
        let first = header
            .and_then(|value| value.split(',').next())
            .map(|tag| tag.trim().to_ascii_lowercase())
            .unwrap_or_default();

        if first.starts_with("de") {
            Language::German
        } else {
            Language::English
        }
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::English
    }
}

/**
 * A string with an English and a German rendition.
 *
 * English is mandatory wherever a value is required, German falls back to it.
 */
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Localized {
    pub en: String,
    pub de: String,
}

impl Localized {
    pub fn new(en: impl Into<String>, de: impl Into<String>) -> Self {
        Self {
            en: en.into(),
            de: de.into(),
        }
    }

    pub fn get(&self, language: Language) -> &str {
        match language {
            Language::German if !self.de.is_empty() => &self.de,
            _ => &self.en,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.en.is_empty() && self.de.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub is_superuser: bool,
    pub groups: Vec<i32>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Group {
    pub id: i32,
    pub name: String,
}

/**
 * A selectable option within a poll
 */
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Choice {
    pub id: i32,
    pub poll_id: i32,
    pub text: Localized,
    pub description: Localized,
    pub votes: i32,
    pub index: i32,
}

impl Choice {
    /**
     * Share of participants who picked this choice.
     *
     * The denominator is the number of participants rather than the number of votes, so in a
     * poll allowing several answers the percentages of all choices may add up to more than 100.
     */
    pub fn percentage(&self, participants: usize) -> f64 {
        if participants == 0 {
            return 0.0;
        }
        f64::from(self.votes) * 100.0 / participants as f64
    }
}

/**
 * A time-boxed question which every user can answer once
 */
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Poll {
    pub id: i32,
    pub url_title: String,
    pub title: Localized,
    pub text: Localized,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub max_allowed_number_of_answers: i32,
    pub show_results_immediately: bool,
    pub participants: BTreeSet<i32>,
    pub choices: Vec<Choice>,
}

impl Poll {
    pub fn has_started(&self, today: NaiveDate) -> bool {
        self.start_date <= today
    }

    pub fn has_ended(&self, today: NaiveDate) -> bool {
        self.end_date < today
    }

    /**
     * Once somebody voted the history of a poll is frozen, reverting would detach the recorded
     * votes from the choices they were cast for.
     */
    pub fn can_be_reverted(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn has_participant(&self, user_id: i32) -> bool {
        self.participants.contains(&user_id)
    }

    pub fn percentage(&self, choice: &Choice) -> f64 {
        choice.percentage(self.participant_count())
    }

    pub fn choice(&self, id: i32) -> Option<&Choice> {
        self.choices.iter().find(|choice| choice.id == id)
    }

    pub fn is_multiple_choice(&self) -> bool {
        self.max_allowed_number_of_answers > 1
    }

    pub fn has_descriptions(&self) -> bool {
        self.choices.iter().any(|choice| !choice.description.is_empty())
    }

    /**
     * The editable state of this poll, as stored in its version history
     */
    pub fn draft(&self) -> PollDraft {
        PollDraft {
            title: self.title.clone(),
            text: self.text.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
            max_allowed_number_of_answers: self.max_allowed_number_of_answers,
            show_results_immediately: self.show_results_immediately,
            choices: self
                .choices
                .iter()
                .map(|choice| ChoiceDraft {
                    id: Some(choice.id),
                    text: choice.text.clone(),
                    description: choice.description.clone(),
                    index: choice.index,
                })
                .collect(),
        }
    }
}

/**
 * Everything about a poll a user can edit.
 *
 * Saving a draft never touches participants or vote counters.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PollDraft {
    pub title: Localized,
    pub text: Localized,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub max_allowed_number_of_answers: i32,
    pub show_results_immediately: bool,
    pub choices: Vec<ChoiceDraft>,
}

impl PollDraft {
    /**
     * Whether saving this draft over a poll with the choices `existing` would add or drop one
     */
    pub fn changes_choices_of(&self, existing: &BTreeSet<i32>) -> bool {
        let ids: BTreeSet<i32> = self.choices.iter().filter_map(|choice| choice.id).collect();
        ids.len() != self.choices.len() || ids != *existing
    }
}

/**
 * A choice inside a draft, `id` is `None` for choices which do not exist yet.
 *
 * An `id` which no longer belongs to the poll is stored as a new choice.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChoiceDraft {
    pub id: Option<i32>,
    pub text: Localized,
    pub description: Localized,
    pub index: i32,
}

/**
 * Who made a change and why, recorded together with every saved draft
 */
#[derive(Clone, Debug, Default)]
pub struct Revision {
    pub comment: String,
    pub author: Option<i32>,
}

/**
 * A snapshot of a poll in its version history
 */
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Version {
    pub id: i32,
    pub poll_id: i32,
    pub snapshot: PollDraft,
    pub comment: String,
    pub author: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/**
 * Render a float the way templates expect it: one decimal place, omitted when it is zero
 */
pub fn floatformat(value: f64) -> String {
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{:.0}", rounded)
    } else {
        format!("{:.1}", rounded)
    }
}

/**
 * Turn a title into something usable in a URL
 */
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-').to_string();

    if slug.is_empty() {
        "poll".to_string()
    } else {
        slug
    }
}
