/*!
Per-request structured logging.

`LogMiddleware` hands each request an explicit `RequestContext`
(request id + start time) as a request extension, and writes one
log line per request once the handler is done.
*/
use std::time::Instant;

use crate::LOG;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub started: Instant,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            started: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// The `uid` (or legacy `user`) query parameter, for log lines only
fn user_param(url: &tide::http::Url) -> Option<String> {
    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    ["uid", "user"].iter().find_map(|name| {
        pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    })
}

#[derive(Debug, Default, Clone)]
pub struct LogMiddleware;

impl LogMiddleware {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl<State: Clone + Send + Sync + 'static> tide::Middleware<State> for LogMiddleware {
    async fn handle(
        &self,
        mut req: tide::Request<State>,
        next: tide::Next<'_, State>,
    ) -> tide::Result {
        let ctx = RequestContext::new();
        req.set_ext(ctx.clone());
        let method = req.method().to_string();
        let path = req.url().path().to_string();
        let query = req.url().query().unwrap_or("").to_string();
        let user_id = user_param(req.url());

        let mut res = next.run(req).await;
        res.insert_header("x-request-id", ctx.request_id.as_str());

        if let Some(err) = res.error() {
            slog::error!(
                LOG, "request failed";
                "request_id" => &ctx.request_id,
                "error" => err.to_string(),
            );
        }
        slog::info!(
            LOG, "request";
            "request_id" => &ctx.request_id,
            "method" => method,
            "path" => path,
            "query" => query,
            "user_id" => user_id,
            "status" => res.status() as u16,
            "duration_ms" => ctx.elapsed_ms(),
        );
        Ok(res)
    }
}
