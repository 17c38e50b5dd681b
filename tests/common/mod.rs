#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tide::http::{mime, Method, Request, Response, Url};

use pollbox::models::{ChoiceDraft, Group, Localized, Poll, PollDraft, Revision, User};
use pollbox::permissions::{Permission, Subject};
use pollbox::store::{MemoryStore, PollStore};
use pollbox::templates::Templates;
use pollbox::AppState;

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/**
 * A store with a few users and groups, plus the app serving it
 *
 * - `admin` is a superuser
 * - `staff` belongs to `Staff`, which may create polls
 * - `student` and `student2` belong to `Student`
 * - `outsider` belongs to no group
 */
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub app: tide::Server<AppState>,
    pub staff_group: Group,
    pub student_group: Group,
}

impl Fixture {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());

        let staff_group = store
            .group_by_name("Staff")
            .await
            .expect("lookup")
            .expect("seeded");
        let student_group = store.create_group("Student").await.expect("group");
        store
            .assign_global_perm(Permission::Add, Subject::Group(staff_group.id))
            .await
            .expect("grant");

        store.create_user("admin", true).await.expect("user");
        store.create_user("outsider", false).await.expect("user");
        let staff = store.create_user("staff", false).await.expect("user");
        store.add_user_to_group(staff.id, staff_group.id).await.expect("membership");
        for name in ["student", "student2"].iter() {
            let student = store.create_user(name, false).await.expect("user");
            store.add_user_to_group(student.id, student_group.id).await.expect("membership");
        }

        let state = AppState {
            store: store.clone(),
            templates: Arc::new(Templates::new().expect("templates compile")),
        };

        Self {
            app: pollbox::app(state),
            store,
            staff_group,
            student_group,
        }
    }

    pub async fn user(&self, username: &str) -> User {
        self.store
            .user_by_name(username)
            .await
            .expect("lookup")
            .expect("user exists")
    }

    /**
     * Create a poll which students can view and vote in
     */
    pub async fn poll(&self, url_title: &str, draft: PollDraft) -> Poll {
        let grants = [
            (Subject::Group(self.staff_group.id), Permission::Edit),
            (Subject::Group(self.staff_group.id), Permission::View),
            (Subject::Group(self.student_group.id), Permission::View),
            (Subject::Group(self.student_group.id), Permission::Vote),
        ];
        self.store
            .create_poll(url_title, &draft, &Revision::default(), &grants)
            .await
            .expect("poll")
    }

    pub async fn reload(&self, url_title: &str) -> Poll {
        self.store
            .poll(url_title)
            .await
            .expect("lookup")
            .expect("poll exists")
    }

    pub async fn get(&self, path: &str, username: Option<&str>) -> Response {
        self.send(Method::Get, path, username, None).await
    }

    pub async fn post(&self, path: &str, username: Option<&str>, form: &str) -> Response {
        self.send(Method::Post, path, username, Some(form)).await
    }

    async fn send(&self, method: Method, path: &str, username: Option<&str>, form: Option<&str>) -> Response {
        let url = Url::parse(&format!("http://localhost{}", path)).expect("valid url");
        let mut req = Request::new(method, url);
        if let Some(username) = username {
            req.insert_header("X-Remote-User", username);
        }
        if let Some(form) = form {
            req.set_body(form.to_string());
            req.set_content_type(mime::FORM);
        }
        self.app.respond(req).await.expect("response")
    }
}

/**
 * A poll running from `start` to `end` days relative to today
 */
pub fn draft(start: i64, end: i64, max_answers: i32, choices: &[&str]) -> PollDraft {
    PollDraft {
        title: Localized::new("Lunch", "Mittagessen"),
        text: Localized::new("Where do we go?", ""),
        start_date: today() + Duration::days(start),
        end_date: today() + Duration::days(end),
        max_allowed_number_of_answers: max_answers,
        show_results_immediately: true,
        choices: choices
            .iter()
            .enumerate()
            .map(|(index, text)| ChoiceDraft {
                id: None,
                text: Localized::new(*text, ""),
                description: Localized::default(),
                index: index as i32,
            })
            .collect(),
    }
}

pub async fn body(mut res: Response) -> String {
    res.body_string().await.expect("utf-8 body")
}

pub fn location(res: &Response) -> Option<String> {
    res.header("Location").map(|values| values.last().as_str().to_string())
}

pub fn template(html: &str) -> Option<&str> {
    let start = html.find("data-template=\"")? + "data-template=\"".len();
    let end = html[start..].find('"')?;
    Some(&html[start..start + end])
}
