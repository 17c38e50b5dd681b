use log::*;
use tide::{Request, StatusCode};

use super::{poll_url, redirect, requested_poll, today};
use crate::auth::{current_user, language};
use crate::ballot::{Ballot, VoteForm};
use crate::models::{Poll, User};
use crate::permissions::Permission;
use crate::store::{http_error, VoteOutcome};
use crate::templates::{IndexPage, PageContext, PollEntry, ResultsPage, VotePage};
use crate::view_state::{is_votable, resolve, PollView};
use crate::AppState;

/**
 *  GET /polls
 */
pub async fn index(req: Request<AppState>) -> tide::Result {
    let user = current_user(&req).await?;
    render_index(&req, user.as_ref()).await
}

/**
 * The listing of polls: the ones the user can vote in, the ones with visible results and, for
 * editors, the ones which have not started yet
 */
pub(crate) async fn render_index(req: &Request<AppState>, user: Option<&User>) -> tide::Result {
    let store = &req.state().store;
    let language = language(req);
    let today = today();
    let preview = user.map_or(false, |user| user.is_superuser);

    let mut page = IndexPage {
        can_create: store
            .has_global_perm(user, Permission::Add)
            .await
            .map_err(http_error)?,
        ..IndexPage::default()
    };

    for poll in store.polls().await.map_err(http_error)? {
        let perms = store.perms_for(user, poll.id).await.map_err(http_error)?;
        let participated = user.map_or(false, |user| poll.has_participant(user.id));

        if !poll.has_started(today) {
            if perms.contains(Permission::Edit) {
                page.upcoming.push(PollEntry::new(&poll, language, false));
            }
        } else if !perms.contains(Permission::View) {
            continue;
        } else if is_votable(&poll, today, &perms, participated) {
            page.running.push(PollEntry::new(&poll, language, preview));
        } else {
            page.results.push(PollEntry::new(&poll, language, false));
        }
    }

    let context = PageContext { user, language };
    req.state()
        .templates
        .render("polls_index", "Polls", &context, &page)
}

fn render_results(req: &Request<AppState>, poll: &Poll, user: Option<&User>) -> tide::Result {
    let language = language(req);
    let context = PageContext { user, language };
    req.state().templates.render(
        "polls_results",
        poll.title.get(language),
        &context,
        &ResultsPage::new(poll, language),
    )
}

/**
 * Respond with whatever the resolved view of the poll is
 */
async fn respond(
    req: &Request<AppState>,
    poll: &Poll,
    user: Option<&User>,
    view: PollView,
) -> tide::Result {
    match view {
        PollView::Index => render_index(req, user).await,
        PollView::Forbidden => Err(tide::Error::from_str(
            StatusCode::Forbidden,
            "You are not allowed to see this poll",
        )),
        PollView::Results => render_results(req, poll, user),
        PollView::ResultsHidden => Ok(redirect("/polls")),
        PollView::VoteForm => {
            let language = language(req);
            let context = PageContext { user, language };
            req.state().templates.render(
                "polls_vote",
                poll.title.get(language),
                &context,
                &VotePage::new(poll, language),
            )
        }
    }
}

async fn resolve_for(req: &Request<AppState>, poll: &Poll, user: Option<&User>) -> tide::Result<PollView> {
    let perms = req
        .state()
        .store
        .perms_for(user, poll.id)
        .await
        .map_err(http_error)?;
    let participated = user.map_or(false, |user| poll.has_participant(user.id));
    Ok(resolve(poll, today(), &perms, participated))
}

/**
 *  GET /polls/:url_title
 */
pub async fn view(req: Request<AppState>) -> tide::Result {
    let user = current_user(&req).await?;
    let poll = requested_poll(&req).await?;
    let view = resolve_for(&req, &poll, user.as_ref()).await?;
    debug!("Showing poll {} as {:?}", poll.url_title, view);
    respond(&req, &poll, user.as_ref(), view).await
}

/**
 *  POST /polls/:url_title
 *
 *  Malformed ballots never surface an error, the voter is sent back to the poll
 */
pub async fn vote(mut req: Request<AppState>) -> tide::Result {
    let body = req.body_string().await?;
    let user = current_user(&req).await?;
    let poll = requested_poll(&req).await?;

    let view = resolve_for(&req, &poll, user.as_ref()).await?;
    let voter = match (view, user.as_ref()) {
        (PollView::VoteForm, Some(voter)) => voter,
        _ => return respond(&req, &poll, user.as_ref(), view).await,
    };

    let selected = match VoteForm::parse(&body) {
        Ok(form) => form.choice,
        Err(err) => {
            info!("Malformed ballot for {}: {}", poll.url_title, err);
            return Ok(redirect(poll_url(&poll)));
        }
    };

    let ballot = match Ballot::validate(&poll, &selected) {
        Ok(ballot) => ballot,
        Err(err) => {
            info!("Rejected ballot for {}: {}", poll.url_title, err);
            return Ok(redirect(poll_url(&poll)));
        }
    };

    let outcome = req
        .state()
        .store
        .record_vote(poll.id, voter.id, ballot.choice_ids())
        .await
        .map_err(http_error)?;

    match outcome {
        VoteOutcome::Recorded => {
            info!("{} voted in {}", voter.username, poll.url_title);
            if poll.show_results_immediately {
                Ok(redirect(poll_url(&poll)))
            } else {
                Ok(redirect("/polls"))
            }
        }
        outcome => {
            warn!("Ballot of {} for {} not recorded: {:?}", voter.username, poll.url_title, outcome);
            Ok(redirect(poll_url(&poll)))
        }
    }
}

/**
 *  GET /polls/:url_title/results_for_admin
 */
pub async fn results_for_admin(req: Request<AppState>) -> tide::Result {
    let user = current_user(&req).await?;
    let poll = requested_poll(&req).await?;

    match user {
        Some(ref admin) if admin.is_superuser => render_results(&req, &poll, user.as_ref()),
        _ => Err(tide::Error::from_str(
            StatusCode::Forbidden,
            "Only administrators can preview results",
        )),
    }
}
