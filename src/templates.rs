//! HTML pages, rendered with handlebars from templates compiled into the binary

use handlebars::{Handlebars, TemplateError};
use serde::Serialize;
use tide::http::mime;
use tide::{Response, StatusCode};

use crate::forms::{ChoiceRow, PollForm};
use crate::models::{floatformat, Choice, Group, Language, Poll, User, Version};

const TEMPLATES: &[(&str, &str)] = &[
    ("polls_index", include_str!("../templates/polls_index.hbs")),
    ("polls_vote", include_str!("../templates/polls_vote.hbs")),
    ("polls_results", include_str!("../templates/polls_results.hbs")),
    ("polls_edit", include_str!("../templates/polls_edit.hbs")),
    ("versions", include_str!("../templates/versions.hbs")),
];

pub struct Templates {
    registry: Handlebars<'static>,
}

impl Templates {
    pub fn new() -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        registry.register_partial("header", include_str!("../templates/header.hbs"))?;
        registry.register_partial("footer", include_str!("../templates/footer.hbs"))?;
        for (name, source) in TEMPLATES {
            registry.register_template_string(name, source)?;
        }
        Ok(Self { registry })
    }

    /**
     * Render a full page; the template name ends up in the `data-template` attribute of the body
     */
    pub fn render<T: Serialize>(
        &self,
        template: &'static str,
        page_title: &str,
        context: &PageContext<'_>,
        body: &T,
    ) -> tide::Result<Response> {
        let page = Page {
            template,
            page_title,
            lang: match context.language {
                Language::English => "en",
                Language::German => "de",
            },
            username: context.user.map(|user| user.username.as_str()),
            body,
        };
        let html = self.registry.render(template, &page)?;

        Ok(Response::builder(StatusCode::Ok)
            .body(html)
            .content_type(mime::HTML)
            .build())
    }
}

/**
 * Who a page is rendered for
 */
pub struct PageContext<'a> {
    pub user: Option<&'a User>,
    pub language: Language,
}

#[derive(Serialize)]
struct Page<'a, T: Serialize> {
    template: &'a str,
    page_title: &'a str,
    lang: &'a str,
    username: Option<&'a str>,
    #[serde(flatten)]
    body: &'a T,
}

#[derive(Debug, Serialize)]
pub struct PollEntry {
    pub url_title: String,
    pub title: String,
    pub start_date: String,
    pub end_date: String,
    pub preview: bool,
}

impl PollEntry {
    pub fn new(poll: &Poll, language: Language, preview: bool) -> Self {
        Self {
            url_title: poll.url_title.clone(),
            title: poll.title.get(language).to_string(),
            start_date: poll.start_date.to_string(),
            end_date: poll.end_date.to_string(),
            preview,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct IndexPage {
    pub running: Vec<PollEntry>,
    pub results: Vec<PollEntry>,
    pub upcoming: Vec<PollEntry>,
    pub can_create: bool,
}

#[derive(Debug, Serialize)]
pub struct PollHeader {
    pub url_title: String,
    pub title: String,
    pub text: String,
    pub start_date: String,
    pub end_date: String,
}

impl PollHeader {
    pub fn new(poll: &Poll, language: Language) -> Self {
        Self {
            url_title: poll.url_title.clone(),
            title: poll.title.get(language).to_string(),
            text: poll.text.get(language).to_string(),
            start_date: poll.start_date.to_string(),
            end_date: poll.end_date.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChoiceView {
    pub id: i32,
    pub text: String,
    pub description: String,
    pub votes: i32,
    pub percentage: String,
}

impl ChoiceView {
    pub fn new(poll: &Poll, choice: &Choice, language: Language) -> Self {
        Self {
            id: choice.id,
            text: choice.text.get(language).to_string(),
            description: choice.description.get(language).to_string(),
            votes: choice.votes,
            percentage: floatformat(poll.percentage(choice)),
        }
    }
}

fn choice_views(poll: &Poll, language: Language) -> Vec<ChoiceView> {
    poll.choices
        .iter()
        .map(|choice| ChoiceView::new(poll, choice, language))
        .collect()
}

#[derive(Debug, Serialize)]
pub struct VotePage {
    pub poll: PollHeader,
    pub choices: Vec<ChoiceView>,
    pub input_type: &'static str,
    pub multiple: bool,
    pub max_answers: i32,
    pub has_descriptions: bool,
}

impl VotePage {
    pub fn new(poll: &Poll, language: Language) -> Self {
        Self {
            poll: PollHeader::new(poll, language),
            choices: choice_views(poll, language),
            input_type: if poll.is_multiple_choice() { "checkbox" } else { "radio" },
            multiple: poll.is_multiple_choice(),
            max_answers: poll.max_allowed_number_of_answers,
            has_descriptions: poll.has_descriptions(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResultsPage {
    pub poll: PollHeader,
    pub choices: Vec<ChoiceView>,
    pub participants: usize,
    pub has_descriptions: bool,
}

impl ResultsPage {
    pub fn new(poll: &Poll, language: Language) -> Self {
        Self {
            poll: PollHeader::new(poll, language),
            choices: choice_views(poll, language),
            participants: poll.participant_count(),
            has_descriptions: poll.has_descriptions(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GroupOption {
    pub id: i32,
    pub name: String,
    pub selected: bool,
}

impl GroupOption {
    pub fn new(group: &Group, selected: bool) -> Self {
        Self {
            id: group.id,
            name: group.name.clone(),
            selected,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RowView {
    pub position: usize,
    pub deleted: bool,
    #[serde(flatten)]
    pub row: ChoiceRow,
}

#[derive(Debug, Serialize)]
pub struct EditPage {
    pub heading: String,
    pub action: String,
    pub form: PollForm,
    pub rows: Vec<RowView>,
    pub errors: Vec<String>,
    pub groups: Vec<GroupOption>,
    pub group_hidden: bool,
    pub group_value: Option<i32>,
    pub show_vote_groups: bool,
    pub vote_groups: Vec<GroupOption>,
    pub show_results_checked: bool,
}

impl EditPage {
    /**
     * Lay the form out for rendering: the submitted rows padded to the minimum number of
     * choices, plus one blank row for adding a choice
     */
    pub fn new(heading: String, action: String, form: PollForm, errors: Vec<String>) -> Self {
        let mut rows: Vec<ChoiceRow> = form.choices.clone();
        while rows.len() < crate::forms::MIN_CHOICES {
            rows.push(ChoiceRow::default());
        }
        rows.push(ChoiceRow::default());

        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(position, mut row)| {
                if row.index.is_empty() {
                    row.index = position.to_string();
                }
                RowView {
                    position,
                    deleted: row.is_deleted(),
                    row,
                }
            })
            .collect();

        Self {
            heading,
            action,
            show_results_checked: form.shows_results_immediately(),
            form,
            rows,
            errors,
            groups: Vec::new(),
            group_hidden: false,
            group_value: None,
            show_vote_groups: false,
            vote_groups: Vec::new(),
        }
    }

    /**
     * Offer the groups a new poll can belong to, the selector is hidden when there is no choice
     */
    pub fn with_groups(mut self, groups: &[Group], all_groups: &[Group]) -> Self {
        let selected: Option<i32> = self.form.group.as_deref().and_then(|raw| raw.parse().ok());
        let vote_selected: Vec<i32> = self
            .form
            .vote_groups
            .iter()
            .filter_map(|raw| raw.parse().ok())
            .collect();

        self.group_hidden = groups.len() == 1;
        self.group_value = selected.or_else(|| groups.first().map(|group| group.id));
        self.groups = groups
            .iter()
            .map(|group| GroupOption::new(group, Some(group.id) == self.group_value))
            .collect();
        self.show_vote_groups = true;
        self.vote_groups = all_groups
            .iter()
            .map(|group| GroupOption::new(group, vote_selected.contains(&group.id)))
            .collect();
        self
    }
}

#[derive(Debug, Serialize)]
pub struct VersionView {
    pub id: i32,
    pub comment: String,
    pub author: Option<i32>,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct VersionsPage {
    pub poll: PollHeader,
    pub versions: Vec<VersionView>,
    pub can_be_reverted: bool,
}

impl VersionsPage {
    pub fn new(poll: &Poll, versions: &[Version], language: Language) -> Self {
        Self {
            poll: PollHeader::new(poll, language),
            versions: versions
                .iter()
                .map(|version| VersionView {
                    id: version.id,
                    comment: version.comment.clone(),
                    author: version.author,
                    created_at: version.created_at.format("%Y-%m-%d %H:%M").to_string(),
                })
                .collect(),
            can_be_reverted: poll.can_be_reverted(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Localized;

    fn poll(max: i32, description: &str) -> Poll {
        let today = chrono::Local::now().date_naive();
        Poll {
            id: 1,
            url_title: "lunch".into(),
            title: Localized::new("Lunch", "Mittagessen"),
            text: Localized::new("Where do we go?", ""),
            start_date: today,
            end_date: today,
            max_allowed_number_of_answers: max,
            show_results_immediately: true,
            participants: vec![1, 2, 3].into_iter().collect(),
            choices: vec![Choice {
                id: 7,
                poll_id: 1,
                text: Localized::new("Pizza", "Pizza"),
                description: Localized::new(description, ""),
                votes: 1,
                index: 0,
            }],
        }
    }

    fn context() -> PageContext<'static> {
        PageContext {
            user: None,
            language: Language::English,
        }
    }

    async fn body(response: Response) -> String {
        let mut response = response;
        response.take_body().into_string().await.expect("utf-8 body")
    }

    #[async_std::test]
    async fn test_single_choice_uses_radio_buttons() {
        let templates = Templates::new().expect("templates compile");
        let poll = poll(1, "");
        let response = templates
            .render("polls_vote", "Lunch", &context(), &VotePage::new(&poll, Language::English))
            .expect("renders");
        let html = body(response).await;
        assert!(html.contains("data-template=\"polls_vote\""));
        assert!(html.contains("radio"));
        assert!(!html.contains("checkbox"));
        assert!(!html.contains("Description"));
    }

    #[async_std::test]
    async fn test_results_show_percentage_and_description() {
        let templates = Templates::new().expect("templates compile");
        let poll = poll(2, "cheesy");
        let response = templates
            .render("polls_results", "Lunch", &context(), &ResultsPage::new(&poll, Language::German))
            .expect("renders");
        let html = body(response).await;
        assert!(html.contains("Mittagessen"));
        assert!(html.contains("33.3%"));
        assert!(html.contains("Description"));
        assert!(html.contains("cheesy"));
    }

    #[test]
    fn test_edit_page_pads_rows() {
        let page = EditPage::new("New poll".into(), "/polls/create".into(), PollForm::default(), Vec::new());
        assert_eq!(page.rows.len(), 3);
        assert_eq!(page.rows[2].row.index, "2");
    }
}
