use log::*;
use tide::http::mime;
use tide::{Middleware, Next, Request, Response, StatusCode};

/**
 * Permanently redirect `/polls/lunch/` to `/polls/lunch`
 */
#[derive(Debug, Default)]
pub struct TrailingSlash;

#[tide::utils::async_trait]
impl<State: Clone + Send + Sync + 'static> Middleware<State> for TrailingSlash {
    async fn handle(&self, req: Request<State>, next: Next<'_, State>) -> tide::Result {
        let path = req.url().path();
        if path.len() > 1 && path.ends_with('/') {
            let mut location = path.trim_end_matches('/').to_string();
            if location.is_empty() {
                location.push('/');
            }
            if let Some(query) = req.url().query() {
                location.push('?');
                location.push_str(query);
            }
            debug!("Redirecting {} to {}", path, location);
            return Ok(Response::builder(StatusCode::MovedPermanently)
                .header("Location", location)
                .build());
        }
        Ok(next.run(req).await)
    }
}

/**
 * Give error responses a body: a small HTML page, or a JSON object below `/api`
 */
#[derive(Debug, Default)]
pub struct ErrorPage;

#[tide::utils::async_trait]
impl<State: Clone + Send + Sync + 'static> Middleware<State> for ErrorPage {
    async fn handle(&self, req: Request<State>, next: Next<'_, State>) -> tide::Result {
        let api = req.url().path().starts_with("/api/");
        let mut res = next.run(req).await;

        let message = match res.error() {
            Some(err) if res.status().is_client_error() || res.status().is_server_error() => {
                if res.status().is_server_error() {
                    error!("Request failed: {:?}", err);
                    res.status().canonical_reason().to_string()
                } else {
                    err.to_string()
                }
            }
            _ => return Ok(res),
        };

        if api {
            res.set_body(serde_json::json!({ "error": message }));
            res.set_content_type(mime::JSON);
        } else {
            let status = res.status();
            res.set_body(format!(
                "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{code}</title></head>\
                 <body data-template=\"error\"><h1>{code} {reason}</h1><p>{message}</p></body></html>",
                code = status as u16,
                reason = status.canonical_reason(),
                message = html_escape::encode_text(&message),
            ));
            res.set_content_type(mime::HTML);
        }
        Ok(res)
    }
}
