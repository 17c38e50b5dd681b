//! The poll create/edit form and its choice formset

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{ChoiceDraft, Localized, Poll, PollDraft};

/// Minimum number of choices a poll keeps after any edit
pub const MIN_CHOICES: usize = 2;

pub const CHOICES_FROZEN: &str = "Choices can not be added or removed once votes have been cast.";

/**
 * Browsers percent-encode the brackets of `choices[0][text_en]`, so the parser runs in non-strict
 * mode
 */
pub fn qs_config() -> serde_qs::Config {
    serde_qs::Config::new(5, false)
}

fn is_checked(value: &Option<String>) -> bool {
    matches!(value.as_deref(), Some("on") | Some("true") | Some("1"))
}

/**
 * One row of the choice formset, exactly as submitted
 */
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ChoiceRow {
    pub id: Option<String>,
    pub text_en: String,
    pub text_de: String,
    pub description_en: String,
    pub description_de: String,
    pub index: String,
    pub delete: Option<String>,
}

impl ChoiceRow {
    pub fn is_blank(&self) -> bool {
        self.id.as_deref().map_or(true, |id| id.trim().is_empty())
            && self.text_en.trim().is_empty()
            && self.text_de.trim().is_empty()
            && self.description_en.trim().is_empty()
            && self.description_de.trim().is_empty()
    }

    pub fn is_deleted(&self) -> bool {
        is_checked(&self.delete)
    }
}

/**
 * The submitted poll form, every field kept as a string so it can be rendered back unchanged
 * when validation fails
 */
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PollForm {
    pub title_en: String,
    pub title_de: String,
    pub text_en: String,
    pub text_de: String,
    pub start_date: String,
    pub end_date: String,
    pub max_allowed_number_of_answers: String,
    pub show_results_immediately: Option<String>,
    pub comment: String,
    pub group: Option<String>,
    pub vote_groups: Vec<String>,
    pub choices: Vec<ChoiceRow>,
}

/**
 * A form which passed validation
 */
#[derive(Clone, Debug)]
pub struct ValidPollForm {
    pub draft: PollDraft,
    pub comment: String,
    pub group: Option<i32>,
    pub vote_groups: Vec<i32>,
}

impl PollForm {
    pub fn parse(body: &str) -> Result<Self, serde_qs::Error> {
        qs_config().deserialize_str(body)
    }

    /**
     * The form shown when creating a poll
     */
    pub fn initial(today: NaiveDate) -> Self {
        Self {
            start_date: today.to_string(),
            end_date: today.to_string(),
            max_allowed_number_of_answers: "1".into(),
            show_results_immediately: Some("on".into()),
            ..Self::default()
        }
    }

    /**
     * The form shown when editing an existing poll
     */
    pub fn from_poll(poll: &Poll) -> Self {
        Self {
            title_en: poll.title.en.clone(),
            title_de: poll.title.de.clone(),
            text_en: poll.text.en.clone(),
            text_de: poll.text.de.clone(),
            start_date: poll.start_date.to_string(),
            end_date: poll.end_date.to_string(),
            max_allowed_number_of_answers: poll.max_allowed_number_of_answers.to_string(),
            show_results_immediately: if poll.show_results_immediately {
                Some("on".into())
            } else {
                None
            },
            comment: String::new(),
            group: None,
            vote_groups: Vec::new(),
            choices: poll
                .choices
                .iter()
                .map(|choice| ChoiceRow {
                    id: Some(choice.id.to_string()),
                    text_en: choice.text.en.clone(),
                    text_de: choice.text.de.clone(),
                    description_en: choice.description.en.clone(),
                    description_de: choice.description.de.clone(),
                    index: choice.index.to_string(),
                    delete: None,
                })
                .collect(),
        }
    }

    pub fn shows_results_immediately(&self) -> bool {
        is_checked(&self.show_results_immediately)
    }

    /**
     * Check the form against the poll being edited (`None` when creating one).
     *
     * Existing choices missing from the submission are kept as they are. Once a poll has
     * participants no choice may be added or removed.
     */
    pub fn validate(
        &self,
        today: NaiveDate,
        existing: Option<&Poll>,
    ) -> Result<ValidPollForm, Vec<String>> {
        let mut errors = Vec::new();

        let title_en = self.title_en.trim();
        if title_en.is_empty() {
            errors.push("The English title is required.".to_string());
        }

        let start_date = parse_date(&self.start_date, today, "start date", &mut errors);
        let end_date = parse_date(&self.end_date, today, "end date", &mut errors);
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if start > end {
                errors.push("The start date must not be after the end date.".to_string());
            }
        }

        let max_answers = match self.max_allowed_number_of_answers.trim() {
            "" => Some(1),
            raw => match raw.parse::<i32>() {
                Ok(n) if n >= 1 => Some(n),
                _ => {
                    errors.push("The maximum number of answers must be at least 1.".to_string());
                    None
                }
            },
        };

        let choices = self.validate_choices(existing, &mut errors);

        let group = match self.group.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match raw.parse::<i32>() {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.push(format!("Unknown group {:?}.", raw));
                    None
                }
            },
        };

        let mut vote_groups = Vec::new();
        for raw in self.vote_groups.iter().map(|raw| raw.trim()).filter(|raw| !raw.is_empty()) {
            match raw.parse::<i32>() {
                Ok(id) if !vote_groups.contains(&id) => vote_groups.push(id),
                Ok(_) => {}
                Err(_) => errors.push(format!("Unknown group {:?}.", raw)),
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        match (start_date, end_date, max_answers) {
            (Some(start_date), Some(end_date), Some(max_answers)) => Ok(ValidPollForm {
                draft: PollDraft {
                    title: Localized::new(title_en, self.title_de.trim()),
                    text: Localized::new(self.text_en.trim(), self.text_de.trim()),
                    start_date,
                    end_date,
                    max_allowed_number_of_answers: max_answers,
                    show_results_immediately: self.shows_results_immediately(),
                    choices,
                },
                comment: self.comment.trim().to_string(),
                group,
                vote_groups,
            }),
            _ => Err(vec!["The form is incomplete.".to_string()]),
        }
    }

    fn validate_choices(&self, existing: Option<&Poll>, errors: &mut Vec<String>) -> Vec<ChoiceDraft> {
        let mut kept: BTreeMap<i32, ChoiceDraft> = existing
            .map(|poll| {
                poll.draft()
                    .choices
                    .into_iter()
                    .filter_map(|choice| choice.id.map(|id| (id, choice)))
                    .collect()
            })
            .unwrap_or_default();
        let mut added = Vec::new();
        let mut removed = 0;

        for (position, row) in self.choices.iter().enumerate() {
            if row.is_blank() {
                continue;
            }

            let id = match row.id.as_deref().map(str::trim) {
                None | Some("") => None,
                Some(raw) => match raw.parse::<i32>() {
                    Ok(id) if kept.contains_key(&id) => Some(id),
                    _ => {
                        errors.push(format!("Choice {} does not belong to this poll.", raw));
                        continue;
                    }
                },
            };

            if row.is_deleted() {
                if let Some(id) = id {
                    kept.remove(&id);
                    removed += 1;
                }
                continue;
            }

            let text_en = row.text_en.trim();
            if text_en.is_empty() {
                errors.push(format!("Choice {} needs an English text.", position + 1));
                continue;
            }

            let index = match row.index.trim() {
                "" => position as i32,
                raw => match raw.parse::<i32>() {
                    Ok(index) => index,
                    Err(_) => {
                        errors.push(format!("Choice {} has an invalid position.", position + 1));
                        continue;
                    }
                },
            };

            let draft = ChoiceDraft {
                id,
                text: Localized::new(text_en, row.text_de.trim()),
                description: Localized::new(row.description_en.trim(), row.description_de.trim()),
                index,
            };

            match id {
                Some(id) => {
                    kept.insert(id, draft);
                }
                None => added.push(draft),
            }
        }

        if let Some(poll) = existing {
            if !poll.participants.is_empty() && (removed > 0 || !added.is_empty()) {
                errors.push(CHOICES_FROZEN.to_string());
            }
        }

        let mut choices: Vec<ChoiceDraft> = kept.into_iter().map(|(_, choice)| choice).collect();
        choices.extend(added);

        if choices.len() < MIN_CHOICES {
            errors.push(format!("A poll needs at least {} choices.", MIN_CHOICES));
        }

        choices.sort_by_key(|choice| (choice.index, choice.id.unwrap_or(i32::MAX)));
        choices
    }
}

fn parse_date(
    raw: &str,
    today: NaiveDate,
    field: &str,
    errors: &mut Vec<String>,
) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(today);
    }
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            errors.push(format!("The {} must look like YYYY-MM-DD.", field));
            None
        }
    }
}
