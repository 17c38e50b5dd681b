//! Creating, editing, deleting and reverting polls

use log::*;
use serde::Deserialize;
use tide::{Request, Response, StatusCode};

use super::{poll_url, redirect, requested_poll, today};
use crate::auth::{current_user, language};
use crate::forms::{qs_config, PollForm, CHOICES_FROZEN};
use crate::models::{Group, Poll, Revision, User};
use crate::permissions::{Permission, Subject};
use crate::store::{http_error, StoreError};
use crate::templates::{EditPage, PageContext, VersionsPage};
use crate::AppState;

/// What the owning group of a new poll may do with it
const OWNER_PERMISSIONS: [Permission; 4] = [
    Permission::Add,
    Permission::Edit,
    Permission::View,
    Permission::Delete,
];

/// What the groups which take part in a new poll may do with it
const VOTER_PERMISSIONS: [Permission; 2] = [Permission::View, Permission::Vote];

fn forbidden(message: &'static str) -> tide::Error {
    tide::Error::from_str(StatusCode::Forbidden, message)
}

fn bad_request(message: impl std::fmt::Display) -> tide::Error {
    tide::Error::from_str(StatusCode::BadRequest, message.to_string())
}

async fn require_creator(req: &Request<AppState>) -> tide::Result<User> {
    let user = current_user(req).await?;
    let allowed = req
        .state()
        .store
        .has_global_perm(user.as_ref(), Permission::Add)
        .await
        .map_err(http_error)?;

    match user {
        Some(user) if allowed => Ok(user),
        _ => Err(forbidden("You are not allowed to create polls")),
    }
}

async fn require_editor(req: &Request<AppState>, poll: &Poll) -> tide::Result<User> {
    let user = current_user(req).await?;
    let allowed = req
        .state()
        .store
        .has_perm(user.as_ref(), Permission::Edit, poll.id)
        .await
        .map_err(http_error)?;

    match user {
        Some(user) if allowed => Ok(user),
        _ => Err(forbidden("You are not allowed to edit this poll")),
    }
}

/**
 * The groups a new poll can be created for (the user's groups which may add polls) and every
 * group, for picking who may vote
 */
async fn creation_groups(req: &Request<AppState>, user: &User) -> tide::Result<(Vec<Group>, Vec<Group>)> {
    let store = &req.state().store;
    let all_groups = store.groups().await.map_err(http_error)?;

    let mut owners = Vec::new();
    for group in all_groups.iter().filter(|group| user.groups.contains(&group.id)) {
        let can_add = user.is_superuser
            || store
                .get_global_perms(Subject::Group(group.id))
                .await
                .map_err(http_error)?
                .contains(Permission::Add);
        if can_add {
            owners.push(group.clone());
        }
    }
    Ok((owners, all_groups))
}

fn render_edit(req: &Request<AppState>, user: &User, page: EditPage) -> tide::Result {
    let context = PageContext {
        user: Some(user),
        language: language(req),
    };
    let title = page.heading.clone();
    req.state().templates.render("polls_edit", &title, &context, &page)
}

/**
 *  GET /polls/create
 */
pub async fn create_form(req: Request<AppState>) -> tide::Result {
    let user = require_creator(&req).await?;
    let (owners, all_groups) = creation_groups(&req, &user).await?;

    let page = EditPage::new(
        "New poll".into(),
        "/polls/create".into(),
        PollForm::initial(today()),
        Vec::new(),
    )
    .with_groups(&owners, &all_groups);
    render_edit(&req, &user, page)
}

/**
 *  POST /polls/create
 */
pub async fn create(mut req: Request<AppState>) -> tide::Result {
    let body = req.body_string().await?;
    let user = require_creator(&req).await?;
    let form = PollForm::parse(&body).map_err(bad_request)?;
    let (owners, all_groups) = creation_groups(&req, &user).await?;

    let show_errors = |form: PollForm, errors: Vec<String>| {
        let page = EditPage::new("New poll".into(), "/polls/create".into(), form, errors)
            .with_groups(&owners, &all_groups);
        render_edit(&req, &user, page)
    };

    let valid = match form.validate(today(), None) {
        Ok(valid) => valid,
        Err(errors) => return show_errors(form, errors),
    };

    let owner = match valid.group {
        Some(id) if owners.iter().any(|group| group.id == id) => Subject::Group(id),
        Some(_) => {
            return show_errors(form, vec!["You can not create polls for this group.".into()]);
        }
        None => match owners.first() {
            Some(group) => Subject::Group(group.id),
            None => Subject::User(user.id),
        },
    };
    if let Some(unknown) = valid
        .vote_groups
        .iter()
        .find(|id| !all_groups.iter().any(|group| group.id == **id))
    {
        return show_errors(form, vec![format!("Unknown group {}.", unknown)]);
    }

    let mut grants: Vec<(Subject, Permission)> = OWNER_PERMISSIONS
        .iter()
        .map(|perm| (owner, *perm))
        .collect();
    for id in valid.vote_groups.iter() {
        grants.extend(VOTER_PERMISSIONS.iter().map(|perm| (Subject::Group(*id), *perm)));
    }

    let store = &req.state().store;
    let url_title = store
        .unique_url_title(&valid.draft.title.en)
        .await
        .map_err(http_error)?;
    let revision = Revision {
        comment: valid.comment.clone(),
        author: Some(user.id),
    };
    let poll = store
        .create_poll(&url_title, &valid.draft, &revision, &grants)
        .await
        .map_err(http_error)?;

    info!("{} created poll {}", user.username, poll.url_title);
    Ok(redirect(poll_url(&poll)))
}

/**
 *  GET /polls/:url_title/edit
 */
pub async fn edit_form(req: Request<AppState>) -> tide::Result {
    let poll = requested_poll(&req).await?;
    let user = require_editor(&req, &poll).await?;

    let page = EditPage::new(
        "Edit poll".into(),
        format!("{}/edit", poll_url(&poll)),
        PollForm::from_poll(&poll),
        Vec::new(),
    );
    render_edit(&req, &user, page)
}

/**
 *  POST /polls/:url_title/edit
 */
pub async fn edit(mut req: Request<AppState>) -> tide::Result {
    let body = req.body_string().await?;
    let poll = requested_poll(&req).await?;
    let user = require_editor(&req, &poll).await?;
    let form = PollForm::parse(&body).map_err(bad_request)?;

    let valid = match form.validate(today(), Some(&poll)) {
        Ok(valid) => valid,
        Err(errors) => {
            debug!("Rejected edit of {}: {:?}", poll.url_title, errors);
            let page = EditPage::new(
                "Edit poll".into(),
                format!("{}/edit", poll_url(&poll)),
                form,
                errors,
            );
            return render_edit(&req, &user, page);
        }
    };

    let revision = Revision {
        comment: valid.comment.clone(),
        author: Some(user.id),
    };
    let updated = req
        .state()
        .store
        .update_poll(poll.id, &valid.draft, &revision)
        .await;
    let poll = match updated {
        Ok(poll) => poll,
        Err(StoreError::Conflict(reason)) => {
            warn!("Edit of {} collided with a vote: {}", poll.url_title, reason);
            let page = EditPage::new(
                "Edit poll".into(),
                format!("{}/edit", poll_url(&poll)),
                form,
                vec![CHOICES_FROZEN.to_string()],
            );
            return render_edit(&req, &user, page);
        }
        Err(err) => return Err(http_error(err)),
    };

    info!("{} edited poll {}", user.username, poll.url_title);
    Ok(redirect(poll_url(&poll)))
}

/**
 *  POST /polls/:url_title/delete
 */
pub async fn delete(req: Request<AppState>) -> tide::Result {
    let poll = requested_poll(&req).await?;
    let user = current_user(&req).await?;
    let perms = req
        .state()
        .store
        .perms_for(user.as_ref(), poll.id)
        .await
        .map_err(http_error)?;

    if !(perms.contains(Permission::Edit) || perms.contains(Permission::Delete)) {
        return Err(forbidden("You are not allowed to delete this poll"));
    }

    req.state()
        .store
        .delete_poll(poll.id)
        .await
        .map_err(http_error)?;
    info!("Poll {} deleted", poll.url_title);
    Ok(redirect("/polls"))
}

/**
 *  GET /polls/:url_title/versions
 */
pub async fn versions(req: Request<AppState>) -> tide::Result {
    let poll = requested_poll(&req).await?;
    let user = require_editor(&req, &poll).await?;
    let versions = req
        .state()
        .store
        .versions(poll.id)
        .await
        .map_err(http_error)?;

    let language = language(&req);
    let context = PageContext {
        user: Some(&user),
        language,
    };
    req.state().templates.render(
        "versions",
        poll.title.get(language),
        &context,
        &VersionsPage::new(&poll, &versions, language),
    )
}

#[derive(Debug, Deserialize)]
struct RevertForm {
    id: i32,
    url_title: String,
}

/**
 *  POST /revert
 *
 *  Restore a poll to one of its versions. Polls which already have votes can not be reverted.
 */
pub async fn revert(mut req: Request<AppState>) -> tide::Result {
    let body = req.body_string().await?;
    let form: RevertForm = qs_config().deserialize_str(&body).map_err(bad_request)?;
    let store = &req.state().store;

    let poll = match store.poll(&form.url_title).await.map_err(http_error)? {
        Some(poll) => poll,
        None => return Err(tide::Error::from_str(StatusCode::NotFound, "Could not find poll")),
    };
    let user = require_editor(&req, &poll).await?;

    let revision = Revision {
        comment: format!("Reverted to version {}", form.id),
        author: Some(user.id),
    };
    match store.revert_poll(poll.id, form.id, &revision).await {
        Ok(_) => {}
        Err(StoreError::NotFound(_)) => return Err(bad_request("Unknown version")),
        Err(StoreError::Conflict(_)) => {
            warn!("{} tried to revert {} which already has votes", user.username, poll.url_title);
            return Err(bad_request("This Document can not be reverted!"));
        }
        Err(err) => return Err(http_error(err)),
    }

    info!("{} reverted {} to version {}", user.username, poll.url_title, form.id);
    Ok(Response::builder(StatusCode::Ok).body("reverted").build())
}
