use std::collections::BTreeSet;

use serde::Deserialize;
use thiserror::Error;

use crate::models::Poll;

/**
 * The body of a vote submission, `choice[]=<id>` once per selected choice
 */
#[derive(Debug, Default, Deserialize)]
pub struct VoteForm {
    #[serde(default)]
    pub choice: Vec<i32>,
}

impl VoteForm {
    pub fn parse(body: &str) -> Result<Self, serde_qs::Error> {
        crate::forms::qs_config().deserialize_str(body)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum BallotError {
    #[error("No choice was selected")]
    Empty,
    #[error("{given} choices selected but only {allowed} allowed")]
    TooMany { allowed: i32, given: usize },
    #[error("Choice {0} does not belong to this poll")]
    UnknownChoice(i32),
    #[error("Choice {0} was selected more than once")]
    Duplicate(i32),
}

/**
 * A validated selection of choices for one poll
 */
#[derive(Debug, PartialEq)]
pub struct Ballot {
    choice_ids: Vec<i32>,
}

impl Ballot {
    pub fn validate(poll: &Poll, selected: &[i32]) -> Result<Self, BallotError> {
        if selected.is_empty() {
            return Err(BallotError::Empty);
        }
        if selected.len() > poll.max_allowed_number_of_answers.max(1) as usize {
            return Err(BallotError::TooMany {
                allowed: poll.max_allowed_number_of_answers,
                given: selected.len(),
            });
        }

        let mut seen = BTreeSet::new();
        for id in selected.iter() {
            if poll.choice(*id).is_none() {
                return Err(BallotError::UnknownChoice(*id));
            }
            if !seen.insert(*id) {
                return Err(BallotError::Duplicate(*id));
            }
        }

        Ok(Self {
            choice_ids: selected.to_vec(),
        })
    }

    pub fn choice_ids(&self) -> &[i32] {
        &self.choice_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Choice, Localized};

    fn poll(max: i32) -> Poll {
        let today = chrono::Local::now().date_naive();
        Poll {
            id: 1,
            url_title: "poll".into(),
            title: Localized::new("Poll", ""),
            text: Localized::default(),
            start_date: today,
            end_date: today,
            max_allowed_number_of_answers: max,
            show_results_immediately: true,
            participants: Default::default(),
            choices: (1..=3)
                .map(|id| Choice {
                    id,
                    poll_id: 1,
                    text: Localized::new(format!("choice {}", id), ""),
                    description: Localized::default(),
                    votes: 0,
                    index: id,
                })
                .collect(),
        }
    }

    #[test]
    fn test_single_choice() {
        let ballot = Ballot::validate(&poll(1), &[2]).expect("valid ballot");
        assert_eq!(ballot.choice_ids(), &[2]);
    }

    #[test]
    fn test_empty() {
        assert_eq!(Ballot::validate(&poll(1), &[]), Err(BallotError::Empty));
    }

    #[test]
    fn test_too_many() {
        assert_eq!(
            Ballot::validate(&poll(1), &[1, 2, 3]),
            Err(BallotError::TooMany { allowed: 1, given: 3 })
        );
        assert!(Ballot::validate(&poll(3), &[1, 2, 3]).is_ok());
    }

    #[test]
    fn test_foreign_choice() {
        assert_eq!(Ballot::validate(&poll(2), &[1, 42]), Err(BallotError::UnknownChoice(42)));
    }

    #[test]
    fn test_duplicate_choice() {
        assert_eq!(Ballot::validate(&poll(2), &[1, 1]), Err(BallotError::Duplicate(1)));
    }

    #[test]
    fn test_parse_encoded_brackets() {
        let form = VoteForm::parse("choice%5B%5D=1&choice%5B%5D=3").expect("parses");
        assert_eq!(form.choice, vec![1, 3]);
    }

    #[test]
    fn test_parse_nothing_selected() {
        let form = VoteForm::parse("").expect("parses");
        assert!(form.choice.is_empty());
    }
}
