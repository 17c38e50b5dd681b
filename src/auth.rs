//! Identifying the requesting user.
//!
//! Authentication itself happens in front of this service: the reverse proxy signs the user in
//! and passes the username along in a header.

use log::*;
use tide::{Request, StatusCode};

use crate::models::{Language, User};
use crate::store::http_error;
use crate::AppState;

pub const REMOTE_USER_HEADER: &str = "X-Remote-User";

/**
 * The signed-in user, `None` for anonymous requests.
 *
 * A username the store does not know is rejected rather than treated as anonymous.
 */
pub async fn current_user(req: &Request<AppState>) -> tide::Result<Option<User>> {
    let username = match req.header(REMOTE_USER_HEADER) {
        Some(values) => values.last().as_str().trim().to_string(),
        None => return Ok(None),
    };
    if username.is_empty() {
        return Ok(None);
    }

    match req.state().store.user_by_name(&username).await.map_err(http_error)? {
        Some(user) => Ok(Some(user)),
        None => {
            warn!("Request for unknown user {:?}", username);
            Err(tide::Error::from_str(StatusCode::Unauthorized, "Unknown user"))
        }
    }
}

pub fn language(req: &Request<AppState>) -> Language {
    let header = req.header("Accept-Language").map(|values| values.last().as_str());
    Language::from_accept_language(header)
}
