//! The routes module contains all the tide routes and the logic to fulfill the responses for each
//! route.
//!
//! Modules are nested for cleaner organization here

use chrono::NaiveDate;
use tide::{Request, Response, StatusCode};

use crate::models::Poll;
use crate::store::http_error;
use crate::AppState;

pub mod api;
pub mod documents;
pub mod polls;

/// Path segments below `/polls` which are not poll URL titles
const RESERVED_URL_TITLES: &[&str] = &["create"];

pub fn is_reserved(url_title: &str) -> bool {
    RESERVED_URL_TITLES.contains(&url_title)
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

pub fn redirect(location: impl AsRef<str>) -> Response {
    Response::builder(StatusCode::Found)
        .header("Location", location.as_ref())
        .build()
}

pub fn poll_url(poll: &Poll) -> String {
    format!("/polls/{}", poll.url_title)
}

/**
 *  GET /
 */
pub async fn index(_req: Request<AppState>) -> tide::Result {
    Ok(redirect("/polls"))
}

/**
 * Look up the poll based on the `url_title` parameter in the request
 */
pub(crate) async fn requested_poll(req: &Request<AppState>) -> tide::Result<Poll> {
    let url_title = req.param("url_title")?;

    match req.state().store.poll(url_title).await.map_err(http_error)? {
        Some(poll) => Ok(poll),
        None => Err(tide::Error::from_str(StatusCode::NotFound, "Could not find poll")),
    }
}
