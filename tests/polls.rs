mod common;

use common::*;
use tide::StatusCode;

use pollbox::permissions::{Permission, Subject};
use pollbox::store::PollStore;

#[async_std::test]
async fn test_root_redirects_to_polls() {
    let fixture = Fixture::new().await;
    let res = fixture.get("/", None).await;
    assert_eq!(res.status(), StatusCode::Found);
    assert_eq!(location(&res).as_deref(), Some("/polls"));
}

#[async_std::test]
async fn test_trailing_slash_redirects_permanently() {
    let fixture = Fixture::new().await;
    let res = fixture.get("/polls/", None).await;
    assert_eq!(res.status(), StatusCode::MovedPermanently);
    assert_eq!(location(&res).as_deref(), Some("/polls"));
}

#[async_std::test]
async fn test_empty_index() {
    let fixture = Fixture::new().await;
    let res = fixture.get("/polls", Some("student")).await;
    assert_eq!(res.status(), StatusCode::Ok);

    let html = body(res).await;
    assert_eq!(template(&html), Some("polls_index"));
    assert!(html.contains("There are no polls you can vote for."));
    assert!(html.contains("There are no results you can see."));
    assert!(!html.contains("Upcoming polls"));
    assert!(!html.contains("New poll"));
}

#[async_std::test]
async fn test_index_sections() {
    let fixture = Fixture::new().await;
    fixture.poll("running", draft(-1, 1, 1, &["a", "b"])).await;
    fixture.poll("finished", draft(-3, -1, 1, &["a", "b"])).await;
    fixture.poll("upcoming", draft(2, 3, 1, &["a", "b"])).await;

    let html = body(fixture.get("/polls", Some("student")).await).await;
    assert!(html.contains("/polls/running\""));
    assert!(html.contains("/polls/finished\""));
    assert!(!html.contains("upcoming"));
    assert!(!html.contains("fa-eye"));

    let html = body(fixture.get("/polls", Some("staff")).await).await;
    assert!(html.contains("Upcoming polls"));
    assert!(html.contains("/polls/upcoming/edit"));
    assert!(html.contains("New poll"));

    let html = body(fixture.get("/polls", Some("outsider")).await).await;
    assert!(html.contains("There are no polls you can vote for."));
    assert!(html.contains("There are no results you can see."));
}

#[async_std::test]
async fn test_unknown_user_is_unauthorized() {
    let fixture = Fixture::new().await;
    let res = fixture.get("/polls", Some("nobody")).await;
    assert_eq!(res.status(), StatusCode::Unauthorized);
}

#[async_std::test]
async fn test_unknown_poll() {
    let fixture = Fixture::new().await;
    let res = fixture.get("/polls/missing", Some("student")).await;
    assert_eq!(res.status(), StatusCode::NotFound);
    assert_eq!(template(&body(res).await), Some("error"));
}

#[async_std::test]
async fn test_single_choice_vote() {
    let fixture = Fixture::new().await;
    let poll = fixture.poll("lunch", draft(0, 0, 1, &["pizza", "pasta", "salad"])).await;

    let html = body(fixture.get("/polls/lunch", Some("student")).await).await;
    assert_eq!(template(&html), Some("polls_vote"));
    assert!(html.contains("type=\"radio\""));
    assert!(!html.contains("checkbox"));
    assert!(!html.contains("Description"));

    let pasta = poll.choices[1].id;
    let res = fixture
        .post("/polls/lunch", Some("student"), &format!("choice[]={}", pasta))
        .await;
    assert_eq!(res.status(), StatusCode::Found);
    assert_eq!(location(&res).as_deref(), Some("/polls/lunch"));

    let poll = fixture.reload("lunch").await;
    let votes: Vec<i32> = poll.choices.iter().map(|choice| choice.votes).collect();
    assert_eq!(votes, vec![0, 1, 0]);
    assert_eq!(poll.participant_count(), 1);

    let html = body(fixture.get("/polls/lunch", Some("student")).await).await;
    assert_eq!(template(&html), Some("polls_results"));
    assert!(html.contains("100%"));
}

#[async_std::test]
async fn test_multiple_choice_vote() {
    let fixture = Fixture::new().await;
    let poll = fixture.poll("lunch", draft(0, 0, 2, &["pizza", "pasta", "salad"])).await;

    let html = body(fixture.get("/polls/lunch", Some("student")).await).await;
    assert!(html.contains("type=\"checkbox\""));
    assert!(!html.contains("radio"));

    let form = format!(
        "choice%5B%5D={}&choice%5B%5D={}",
        poll.choices[0].id, poll.choices[2].id
    );
    let res = fixture.post("/polls/lunch", Some("student"), &form).await;
    assert_eq!(res.status(), StatusCode::Found);

    let poll = fixture.reload("lunch").await;
    let votes: Vec<i32> = poll.choices.iter().map(|choice| choice.votes).collect();
    assert_eq!(votes, vec![1, 0, 1]);
}

#[async_std::test]
async fn test_too_many_choices_are_rejected() {
    let fixture = Fixture::new().await;
    let poll = fixture.poll("lunch", draft(0, 0, 1, &["pizza", "pasta"])).await;

    let form = format!("choice[]={}&choice[]={}", poll.choices[0].id, poll.choices[1].id);
    let res = fixture.post("/polls/lunch", Some("student"), &form).await;
    assert_eq!(res.status(), StatusCode::Found);
    assert_eq!(location(&res).as_deref(), Some("/polls/lunch"));

    let poll = fixture.reload("lunch").await;
    assert!(poll.participants.is_empty());
    assert!(poll.choices.iter().all(|choice| choice.votes == 0));
}

#[async_std::test]
async fn test_empty_and_foreign_ballots_are_rejected() {
    let fixture = Fixture::new().await;
    let other = fixture.poll("dinner", draft(0, 0, 1, &["soup", "stew"])).await;
    fixture.poll("lunch", draft(0, 0, 1, &["pizza", "pasta"])).await;

    let res = fixture.post("/polls/lunch", Some("student"), "").await;
    assert_eq!(res.status(), StatusCode::Found);

    let form = format!("choice[]={}", other.choices[0].id);
    let res = fixture.post("/polls/lunch", Some("student"), &form).await;
    assert_eq!(location(&res).as_deref(), Some("/polls/lunch"));

    let res = fixture.post("/polls/lunch", Some("student"), "choice[]=nonsense").await;
    assert_eq!(location(&res).as_deref(), Some("/polls/lunch"));

    assert!(fixture.reload("lunch").await.participants.is_empty());
    assert!(fixture.reload("dinner").await.participants.is_empty());
}

#[async_std::test]
async fn test_voting_twice_counts_once() {
    let fixture = Fixture::new().await;
    let poll = fixture.poll("lunch", draft(0, 0, 1, &["pizza", "pasta"])).await;
    let form = format!("choice[]={}", poll.choices[0].id);

    fixture.post("/polls/lunch", Some("student"), &form).await;
    let res = fixture.post("/polls/lunch", Some("student"), &form).await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(template(&body(res).await), Some("polls_results"));

    let poll = fixture.reload("lunch").await;
    assert_eq!(poll.choices[0].votes, 1);
    assert_eq!(poll.participant_count(), 1);
}

#[async_std::test]
async fn test_hidden_results_redirect_participants() {
    let fixture = Fixture::new().await;
    let mut hidden = draft(0, 1, 1, &["pizza", "pasta"]);
    hidden.show_results_immediately = false;
    let poll = fixture.poll("lunch", hidden).await;

    let res = fixture
        .post("/polls/lunch", Some("student"), &format!("choice[]={}", poll.choices[0].id))
        .await;
    assert_eq!(location(&res).as_deref(), Some("/polls"));

    let res = fixture.get("/polls/lunch", Some("student")).await;
    assert_eq!(res.status(), StatusCode::Found);
    assert_eq!(location(&res).as_deref(), Some("/polls"));

    let res = fixture.get("/polls/lunch", Some("student2")).await;
    assert_eq!(template(&body(res).await), Some("polls_vote"));
}

#[async_std::test]
async fn test_poll_before_start_shows_index() {
    let fixture = Fixture::new().await;
    fixture.poll("later", draft(1, 2, 1, &["pizza", "pasta"])).await;

    let res = fixture.get("/polls/later", Some("outsider")).await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(template(&body(res).await), Some("polls_index"));

    let res = fixture.post("/polls/later", Some("student"), "choice[]=1").await;
    assert_eq!(template(&body(res).await), Some("polls_index"));
}

#[async_std::test]
async fn test_finished_poll_shows_results() {
    let fixture = Fixture::new().await;
    fixture.poll("over", draft(-2, -1, 1, &["pizza", "pasta"])).await;

    let html = body(fixture.get("/polls/over", Some("student")).await).await;
    assert_eq!(template(&html), Some("polls_results"));
    assert!(html.contains("0 participants"));
}

#[async_std::test]
async fn test_view_only_shows_results() {
    let fixture = Fixture::new().await;
    fixture.poll("lunch", draft(0, 0, 1, &["pizza", "pasta"])).await;

    let res = fixture.get("/polls/lunch", Some("staff")).await;
    assert_eq!(template(&body(res).await), Some("polls_results"));
}

#[async_std::test]
async fn test_no_permission_is_forbidden() {
    let fixture = Fixture::new().await;
    fixture.poll("lunch", draft(0, 0, 1, &["pizza", "pasta"])).await;

    let res = fixture.get("/polls/lunch", Some("outsider")).await;
    assert_eq!(res.status(), StatusCode::Forbidden);
    let res = fixture.get("/polls/lunch", None).await;
    assert_eq!(res.status(), StatusCode::Forbidden);
}

#[async_std::test]
async fn test_anonymous_users_do_not_vote() {
    let fixture = Fixture::new().await;
    let poll = fixture.poll("lunch", draft(0, 0, 1, &["pizza", "pasta"])).await;
    fixture
        .store
        .assign_perm(Permission::View, Subject::Anonymous, poll.id)
        .await
        .expect("grant");
    fixture
        .store
        .assign_perm(Permission::Vote, Subject::Anonymous, poll.id)
        .await
        .expect("grant");

    let res = fixture
        .post("/polls/lunch", None, &format!("choice[]={}", poll.choices[0].id))
        .await;
    assert_eq!(template(&body(res).await), Some("polls_results"));
    assert!(fixture.reload("lunch").await.participants.is_empty());
}

#[async_std::test]
async fn test_admin_preview() {
    let fixture = Fixture::new().await;
    fixture.poll("lunch", draft(0, 0, 1, &["pizza", "pasta"])).await;

    let html = body(fixture.get("/polls", Some("admin")).await).await;
    assert!(html.contains("fa fa-eye"));
    assert!(html.contains("/polls/lunch/results_for_admin"));

    let res = fixture.get("/polls/lunch/results_for_admin", Some("admin")).await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(template(&body(res).await), Some("polls_results"));

    let res = fixture.get("/polls/lunch/results_for_admin", Some("student")).await;
    assert_eq!(res.status(), StatusCode::Forbidden);
}

#[async_std::test]
async fn test_german_titles() {
    let fixture = Fixture::new().await;
    fixture.poll("lunch", draft(0, 0, 1, &["pizza", "pasta"])).await;

    let url = tide::http::Url::parse("http://localhost/polls/lunch").expect("valid url");
    let mut req = tide::http::Request::new(tide::http::Method::Get, url);
    req.insert_header("X-Remote-User", "student");
    req.insert_header("Accept-Language", "de-DE,de;q=0.9,en;q=0.8");
    let res: tide::http::Response = fixture.app.respond(req).await.expect("response");

    let html = body(res).await;
    assert!(html.contains("<h1>Mittagessen</h1>"));
    assert!(html.contains("lang=\"de\""));
}

#[async_std::test]
async fn test_json_results() {
    let fixture = Fixture::new().await;
    let poll = fixture.poll("lunch", draft(0, 0, 1, &["pizza", "pasta"])).await;

    let res = fixture.get("/api/v1/polls/lunch/results", Some("student")).await;
    assert_eq!(res.status(), StatusCode::Conflict);
    let res = fixture.get("/api/v1/polls/lunch/results", Some("outsider")).await;
    assert_eq!(res.status(), StatusCode::Forbidden);
    assert!(body(res).await.contains("\"error\""));

    fixture
        .post("/polls/lunch", Some("student"), &format!("choice[]={}", poll.choices[1].id))
        .await;
    let res = fixture.get("/api/v1/polls/lunch/results", Some("student")).await;
    assert_eq!(res.status(), StatusCode::Ok);

    let tally: serde_json::Value = serde_json::from_str(&body(res).await).expect("json");
    assert_eq!(tally["participants"], 1);
    assert!(tally["poll"].get("participants").is_none());
    assert_eq!(tally["choices"][1]["votes"], 1);
    assert_eq!(tally["choices"][1]["percentage"], 100.0);
    assert_eq!(tally["choices"][0]["percentage"], 0.0);
}
