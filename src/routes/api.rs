use tide::{Body, Request, StatusCode};

use super::requested_poll;
use crate::api_models::Tally;
use crate::auth::{current_user, language};
use crate::store::http_error;
use crate::view_state::{resolve, PollView};
use crate::AppState;

/**
 *  GET /api/v1/polls/:url_title/results
 *
 *  Only available to users who would see the results page for the poll
 */
pub async fn results(req: Request<AppState>) -> tide::Result<Body> {
    let user = current_user(&req).await?;
    let poll = requested_poll(&req).await?;
    let perms = req
        .state()
        .store
        .perms_for(user.as_ref(), poll.id)
        .await
        .map_err(http_error)?;
    let participated = user.as_ref().map_or(false, |user| poll.has_participant(user.id));

    match resolve(&poll, super::today(), &perms, participated) {
        PollView::Results => Body::from_json(&Tally::new(&poll, language(&req))),
        PollView::Forbidden => Err(tide::Error::from_str(
            StatusCode::Forbidden,
            "You are not allowed to see this poll",
        )),
        _ => Err(tide::Error::from_str(
            StatusCode::Conflict,
            "The results of this poll are not available yet",
        )),
    }
}
