use serde::Serialize;

use crate::models::{Language, Poll};

/**
 * Information about a poll
 */
#[derive(Debug, Serialize)]
pub struct PollSummary {
    pub url_title: String,
    pub title: String,
    pub start_date: chrono::NaiveDate,
    pub end_date: chrono::NaiveDate,
    pub max_allowed_number_of_answers: i32,
}

/**
 * The votes counted for one choice
 */
#[derive(Debug, Serialize)]
pub struct ChoiceTally {
    pub id: i32,
    pub text: String,
    pub votes: i32,
    /**
     * Share of the participants who picked this choice, unrounded
     */
    pub percentage: f64,
}

/**
 * Results from a given poll
 */
#[derive(Debug, Serialize)]
pub struct Tally {
    pub poll: PollSummary,
    pub participants: usize,
    pub choices: Vec<ChoiceTally>,
}

impl Tally {
    pub fn new(poll: &Poll, language: Language) -> Self {
        let choices = poll
            .choices
            .iter()
            .map(|choice| ChoiceTally {
                id: choice.id,
                text: choice.text.get(language).to_string(),
                votes: choice.votes,
                percentage: poll.percentage(choice),
            })
            .collect();

        Self {
            poll: PollSummary {
                url_title: poll.url_title.clone(),
                title: poll.title.get(language).to_string(),
                start_date: poll.start_date,
                end_date: poll.end_date,
                max_allowed_number_of_answers: poll.max_allowed_number_of_answers,
            },
            participants: poll.participant_count(),
            choices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Choice, Localized};
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    #[test]
    fn test_tally_percentages() {
        let choice = |id, votes| Choice {
            id,
            poll_id: 1,
            text: Localized::new(format!("Choice {}", id), format!("Auswahl {}", id)),
            description: Localized::default(),
            votes,
            index: id,
        };
        let poll = Poll {
            id: 1,
            url_title: "lunch".into(),
            title: Localized::new("Lunch", "Mittagessen"),
            text: Localized::default(),
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1).expect("valid date"),
            end_date: NaiveDate::from_ymd_opt(2020, 1, 31).expect("valid date"),
            max_allowed_number_of_answers: 1,
            show_results_immediately: true,
            participants: vec![1, 2, 3].into_iter().collect::<BTreeSet<i32>>(),
            choices: vec![choice(1, 1), choice(2, 2)],
        };

        let tally = Tally::new(&poll, Language::German);
        assert_eq!(tally.poll.title, "Mittagessen");
        assert_eq!(tally.participants, 3);
        assert!((tally.choices[0].percentage - 33.33).abs() < 0.01);
        assert!((tally.choices[1].percentage - 66.67).abs() < 0.01);
        assert_eq!(tally.choices[1].text, "Auswahl 2");
    }
}
