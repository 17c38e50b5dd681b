//! A small web service for running time-boxed polls among groups of users

use std::sync::Arc;

pub mod api_models;
pub mod auth;
pub mod ballot;
pub mod config;
pub mod forms;
pub mod middleware;
pub mod models;
pub mod permissions;
pub mod routes;
pub mod store;
pub mod templates;
pub mod view_state;

use crate::store::PollStore;
use crate::templates::Templates;

/**
 * Struct for carrying application state into tide request handlers
 */
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PollStore>,
    pub templates: Arc<Templates>,
}

impl AppState {
    pub fn new(store: impl PollStore + 'static, templates: Templates) -> Self {
        Self {
            store: Arc::new(store),
            templates: Arc::new(templates),
        }
    }
}

/**
 * Build the tide application with all of its routes, requests are logged by tide itself
 */
pub fn app(state: AppState) -> tide::Server<AppState> {
    let mut app = tide::with_state(state);
    app.with(middleware::TrailingSlash);
    app.with(middleware::ErrorPage);

    app.at("/").get(routes::index);
    app.at("/polls").get(routes::polls::index);
    app.at("/polls/create")
        .get(routes::documents::create_form)
        .post(routes::documents::create);
    app.at("/polls/:url_title")
        .get(routes::polls::view)
        .post(routes::polls::vote);
    app.at("/polls/:url_title/results_for_admin")
        .get(routes::polls::results_for_admin);
    app.at("/polls/:url_title/edit")
        .get(routes::documents::edit_form)
        .post(routes::documents::edit);
    app.at("/polls/:url_title/delete")
        .post(routes::documents::delete);
    app.at("/polls/:url_title/versions")
        .get(routes::documents::versions);
    app.at("/revert").post(routes::documents::revert);
    app.at("/api/v1/polls/:url_title/results")
        .get(routes::api::results);
    app
}
