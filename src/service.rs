use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;

use crate::error::BadgeError;
use crate::images::Inliner;
use crate::logging::{LogMiddleware, RequestContext};
use crate::render::{self, Theme};
use crate::spotify::SpotifyApi;
use crate::store::CredentialStore;
use crate::{caching, raster, recent, resp, utils, Config, LOG};

pub const CANONICAL_PATH: &str = "/api/recently-played";
const PNG_PATH: &str = "/api/recently-played.png";
const LEGACY_PATHS: &[&str] = &[
    "/api/recently_played",
    "/api/recently_played/",
    "/api/recentlyplayed",
    "/api/recently-played.svg",
];

#[derive(Clone)]
pub struct Context {
    pub config: Arc<Config>,
    pub store: Arc<dyn CredentialStore>,
    pub spotify: Arc<dyn SpotifyApi>,
    pub images: Arc<Inliner>,
}

pub fn build_app(ctx: Context) -> tide::Server<Context> {
    let mut app = tide::with_state(ctx);
    app.with(LogMiddleware::new());
    app.at(CANONICAL_PATH).get(recently_played);
    app.at("/api/recently-played/").get(recently_played);
    app.at(PNG_PATH).get(recently_played_png);
    for path in LEGACY_PATHS {
        app.at(path).get(legacy_redirect);
    }
    app.at("/api/ping").get(ping);
    app.at("/").get(login);
    app.at("/*").get(login);
    app
}

pub async fn start(ctx: Context) -> anyhow::Result<()> {
    let addr = ctx.config.listen_addr();
    let app = build_app(ctx);
    slog::info!(LOG, "running at {}", addr);
    app.listen(addr).await?;
    Ok(())
}

/// Anything that isn't an api route sends the user off to spotify to authorize
async fn login(req: tide::Request<Context>) -> tide::Result {
    let url = req.state().config.spotify_authorize_url();
    slog::info!(LOG, "redirecting to spotify-auth"; "path" => req.url().path());
    Ok(tide::Redirect::new(url).into())
}

async fn legacy_redirect(_req: tide::Request<Context>) -> tide::Result {
    Ok(tide::Redirect::permanent(CANONICAL_PATH).into())
}

#[derive(serde::Serialize)]
struct Ping<'a> {
    ok: bool,
    time: String,
    version: &'a str,
}

async fn ping(req: tide::Request<Context>) -> tide::Result {
    Ok(resp!(json => Ping {
        ok: true,
        time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        version: &req.state().config.version,
    }))
}

#[derive(serde::Deserialize, Default, Debug)]
struct BadgeParams {
    uid: Option<String>,
    user: Option<String>,
    limit: Option<String>,
    theme: Option<String>,
    width: Option<String>,
}

fn request_id_of(req: &tide::Request<Context>) -> String {
    req.ext::<RequestContext>()
        .map(|c| c.request_id.clone())
        .unwrap_or_default()
}

/// Badge markup for `params`. Failures are rendered into the
/// svg instead of surfacing as an error status.
async fn badge_markup(ctx: &Context, params: &BadgeParams, width: u32, request_id: &str) -> String {
    let limit = utils::parse_limit(params.limit.as_deref());
    let theme = Theme::from_param(params.theme.as_deref());
    let uid = params.uid.as_deref().or_else(|| params.user.as_deref());
    match build_badge(ctx, uid, limit, theme, width, Utc::now()).await {
        Ok(markup) => markup,
        Err(e) => {
            slog::warn!(
                LOG, "rendering error badge";
                "request_id" => request_id,
                "kind" => e.kind(),
                "error" => e.to_string(),
            );
            render::render_error(&e, width)
        }
    }
}

async fn recently_played(req: tide::Request<Context>) -> tide::Result {
    let params: BadgeParams = req.query().unwrap_or_default();
    let width = utils::parse_width(params.width.as_deref(), utils::DEFAULT_WIDTH);
    let request_id = request_id_of(&req);
    let markup = badge_markup(req.state(), &params, width, &request_id).await;
    let if_none_match = req.header("if-none-match").map(|v| v.as_str());
    Ok(caching::svg_response(markup, if_none_match))
}

/// The same badge as a png. The weak validator is taken over the
/// markup so a matching client never costs a rasterization.
async fn recently_played_png(req: tide::Request<Context>) -> tide::Result {
    let params: BadgeParams = req.query().unwrap_or_default();
    let width = utils::parse_width(params.width.as_deref(), utils::DEFAULT_PNG_WIDTH);
    let request_id = request_id_of(&req);
    let markup = badge_markup(req.state(), &params, width, &request_id).await;

    let etag = caching::weak_etag(&markup);
    let if_none_match = req.header("if-none-match").map(|v| v.as_str());
    if caching::is_not_modified(if_none_match, &etag) {
        return Ok(caching::not_modified(&etag));
    }
    let png = raster::svg_to_png(&markup).map_err(|e| {
        slog::error!(
            LOG, "png rendering failed";
            "request_id" => &request_id,
            "error" => e.to_string(),
        );
        tide::Error::from_str(500, "could not render png")
    })?;
    Ok(caching::cacheable(png, caching::PNG_CONTENT_TYPE, &etag))
}

async fn build_badge(
    ctx: &Context,
    uid: Option<&str>,
    limit: u8,
    theme: Theme,
    width: u32,
    now: DateTime<Utc>,
) -> Result<String, BadgeError> {
    let user_id = recent::resolve_user_id(ctx.store.as_ref(), uid).await?;
    let items = recent::get_recent_tracks(
        ctx.store.as_ref(),
        ctx.spotify.as_ref(),
        &user_id,
        limit,
        now.timestamp(),
    )
    .await?;
    let events = render::to_play_events(&items, limit);
    slog::debug!(
        LOG, "rendering badge";
        "user_id" => &user_id,
        "tracks" => events.len(),
    );
    Ok(render::render_badge(events, theme, width, now, &ctx.images).await)
}
