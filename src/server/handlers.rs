use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Extension, Form, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::NanorssError;
use crate::domain::user::validate_documents;
use crate::domain::{Feeditem, PagemonitorPage, User};
use crate::fetcher::RefreshReport;
use crate::server::{assets, auth, AppState};
use crate::store::keys::{self, ItemKey};

/// Error surface of the HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    NotFound,
    Failed(NanorssError),
}

impl From<NanorssError> for ApiError {
    fn from(e: NanorssError) -> Self {
        ApiError::Failed(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized => auth::unauthorized(),
            ApiError::NotFound | ApiError::Failed(NanorssError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "Not found").into_response()
            }
            ApiError::Failed(e @ NanorssError::Conflict(_)) => {
                (StatusCode::CONFLICT, e.to_string()).into_response()
            }
            ApiError::Failed(e) => {
                tracing::error!("Request failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub async fn index(headers: HeaderMap) -> Redirect {
    if auth::cookie_value(&headers).is_some() {
        Redirect::to("/feed")
    } else {
        Redirect::to("/login")
    }
}

pub async fn login_page() -> Html<&'static str> {
    Html(assets::LOGIN_HTML)
}

pub async fn feed_page() -> Html<&'static str> {
    Html(assets::FEED_HTML)
}

pub async fn settings_page() -> Html<&'static str> {
    Html(assets::SETTINGS_HTML)
}

pub async fn status_page() -> Html<&'static str> {
    Html(assets::STATUS_HTML)
}

pub async fn logout() -> impl IntoResponse {
    (
        [(header::SET_COOKIE, auth::clear_cookie_header())],
        Redirect::to("/login"),
    )
}

pub async fn favicon() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/svg+xml")], assets::FAVICON_SVG)
}

pub async fn static_file(Path(path): Path<String>) -> ApiResult<impl IntoResponse> {
    let (content_type, body) = assets::lookup(&path).ok_or(ApiError::NotFound)?;
    Ok(([(header::CONTENT_TYPE, content_type)], body))
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

pub async fn login(State(ctx): State<AppState>, Form(form): Form<LoginForm>) -> ApiResult<Response> {
    if form.username.trim().is_empty() {
        return Err(ApiError::Unauthorized);
    }
    match ctx.store.get_user(&form.username)? {
        Some(user) if user.validate_password(&form.password) => {
            let cookie = auth::sign(&auth::cookie_key(&ctx.store)?, &user.username)?;
            tracing::info!("User {} logged in", user.username);
            Ok(([(header::SET_COOKIE, auth::set_cookie_header(&cookie))], StatusCode::OK).into_response())
        }
        _ => {
            tracing::warn!("Failed login for {}", form.username.trim());
            Err(ApiError::Unauthorized)
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigurationView {
    pub username: String,
    pub opml: String,
    pub pagemonitor: String,
}

impl From<&User> for ConfigurationView {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            opml: user.opml.clone(),
            pagemonitor: user.pagemonitor.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigurationForm {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub opml: String,
    #[serde(default)]
    pub pagemonitor: String,
}

pub async fn get_configuration(Extension(user): Extension<User>) -> Json<ConfigurationView> {
    Json(ConfigurationView::from(&user))
}

/// Saves the user's documents and optionally renames the user or changes the
/// password. A rename re-issues the cookie.
pub async fn save_configuration(
    State(ctx): State<AppState>,
    Extension(mut user): Extension<User>,
    Form(form): Form<ConfigurationForm>,
) -> ApiResult<Response> {
    validate_documents(&form.opml, &form.pagemonitor)?;

    user.set_username(&form.username)?;
    if let Some(password) = form.password.as_deref().filter(|p| !p.is_empty()) {
        user.set_password(password)?;
    }
    user.opml = form.opml;
    user.pagemonitor = form.pagemonitor;

    let renamed = user.pending_username().is_some();
    ctx.store.save_user(&mut user)?;

    let view = Json(ConfigurationView::from(&user));
    if renamed {
        let cookie = auth::sign(&auth::cookie_key(&ctx.store)?, &user.username)?;
        Ok(([(header::SET_COOKIE, auth::set_cookie_header(&cookie))], view).into_response())
    } else {
        Ok(view.into_response())
    }
}

/// One row of the feed view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemView {
    pub key: String,
    pub kind: &'static str,
    pub origin: String,
    pub title: String,
    #[serde(rename = "URL")]
    pub url: String,
    pub date: Option<DateTime<Utc>>,
    pub contents: String,
    pub delta: String,
    pub is_read: bool,
}

impl ItemView {
    fn feeditem(item: Feeditem, origin: &str, is_read: bool) -> Self {
        Self {
            key: String::from_utf8_lossy(&item.key.encode()).into_owned(),
            kind: "feeditem",
            origin: origin.to_string(),
            title: item.display_title().to_string(),
            date: item.date.map(|d| d.with_timezone(&Utc)).or(item.updated),
            url: item.url,
            contents: item.contents,
            delta: String::new(),
            is_read,
        }
    }

    fn page(page: PagemonitorPage, is_read: bool) -> Self {
        Self {
            key: String::from_utf8_lossy(&page.config.encode_key()).into_owned(),
            kind: "page",
            origin: page.config.display_title().to_string(),
            title: page.config.display_title().to_string(),
            url: page.config.url.clone(),
            date: page.updated,
            contents: page.contents,
            delta: page.delta,
            is_read,
        }
    }
}

/// Joins the user's subscriptions with stored items and read markers, newest
/// first.
pub async fn feed(
    State(ctx): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<Vec<ItemView>>> {
    let read: HashSet<Vec<u8>> = ctx.store.get_read_items(&user.username)?.into_iter().collect();

    let mut views = Vec::new();
    let mut seen = HashSet::new();
    for feed in user.feeds()? {
        if !seen.insert(feed.url.clone()) {
            continue;
        }
        for item in ctx.store.get_feeditems(&feed.url)? {
            let is_read = read.contains(&item.key.encode());
            views.push(ItemView::feeditem(item, &feed.title, is_read));
        }
    }
    for page in ctx.store.get_pages(&user.pages()?)? {
        let is_read = read.contains(&page.config.encode_key());
        views.push(ItemView::page(page, is_read));
    }

    views.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(Json(views))
}

pub async fn get_item(
    State(ctx): State<AppState>,
    Extension(user): Extension<User>,
    Path(key): Path<String>,
) -> ApiResult<Json<ItemView>> {
    let item_key = ItemKey::decode(key.as_bytes()).map_err(|_| ApiError::NotFound)?;
    let is_read = ctx.store.get_read_status(&user.username, key.as_bytes())?;

    let view = match item_key {
        ItemKey::Feeditem(feeditem_key) => {
            let item = ctx
                .store
                .get_feeditem(&feeditem_key)?
                .ok_or(ApiError::NotFound)?;
            let origin = user
                .feeds()
                .unwrap_or_default()
                .into_iter()
                .find(|f| f.url == feeditem_key.feed_url)
                .map_or(feeditem_key.feed_url.clone(), |f| f.title);
            ItemView::feeditem(item, &origin, is_read)
        }
        ItemKey::Page(config) => {
            let config = user
                .pages()
                .unwrap_or_default()
                .into_iter()
                .find(|p| p.same_identity(&config))
                .unwrap_or(config);
            let page = ctx.store.get_page(&config)?.ok_or(ApiError::NotFound)?;
            ItemView::page(page, is_read)
        }
    };
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReadStatusForm {
    pub is_read: bool,
}

pub async fn set_item_read(
    State(ctx): State<AppState>,
    Extension(user): Extension<User>,
    Path(key): Path<String>,
    Form(form): Form<ReadStatusForm>,
) -> ApiResult<StatusCode> {
    ItemKey::decode(key.as_bytes()).map_err(|_| ApiError::NotFound)?;
    ctx.store
        .set_read_status(&user.username, key.as_bytes(), form.is_read)?;
    Ok(StatusCode::OK)
}

pub async fn refresh(
    State(ctx): State<AppState>,
    Extension(user): Extension<User>,
) -> Json<RefreshReport> {
    Json(
        ctx.parallel_fetcher
            .refresh_user(ctx.store_handle(), &user)
            .await,
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusView {
    pub title: String,
    #[serde(rename = "URL")]
    pub url: String,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
}

/// Fetch status of each of the user's feeds and pages.
pub async fn status(
    State(ctx): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<Vec<StatusView>>> {
    let mut subjects = Vec::new();
    for feed in user.feeds()? {
        subjects.push((feed.title, feed.url.clone(), keys::feed_key(&feed.url)));
    }
    for page in user.pages()? {
        subjects.push((page.display_title().to_string(), page.url.clone(), page.encode_key()));
    }

    let mut views = Vec::with_capacity(subjects.len());
    for (title, url, subject) in subjects {
        let status = ctx.store.get_fetch_status(&subject)?.unwrap_or_default();
        views.push(StatusView {
            title,
            url,
            last_success: status.last_success,
            last_failure: status.last_failure,
        });
    }
    Ok(Json(views))
}
