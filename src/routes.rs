use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::auth::{Authenticator, SESSION_COOKIE};
use crate::error::ChatError;
use crate::server::Server;

#[derive(Clone)]
pub struct AppState {
    pub server: Arc<Server>,
    pub auth: Arc<Authenticator>,
    pub secure_cookies: bool,
}

#[derive(Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct AvatarUpdate {
    pub avatar: String,
}

pub fn routes(
    state: AppState,
    static_dir: PathBuf,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    ws_route(state.clone())
        .or(api(state))
        .or(warp::fs::dir(static_dir))
        .with(warp::cors().allow_any_origin())
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn ws_route(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(warp::cookie::optional::<String>(SESSION_COOKIE))
        .and(with_state(state))
        .and_then(|ws: warp::ws::Ws, token: Option<String>, state: AppState| async move {
            let identity = match token {
                Some(token) => state
                    .auth
                    .current_identity(&token)
                    .await
                    .ok()
                    .map(|user| user.username),
                None => None,
            };
            let server = Arc::clone(&state.server);
            Ok::<_, Rejection>(
                ws.on_upgrade(move |socket| server.handle_connection(socket, identity)),
            )
        })
}

pub fn api(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let register = warp::path!("api" / "register")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(register);

    let login = warp::path!("api" / "login")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(login);

    let logout = warp::path!("api" / "logout")
        .and(warp::post())
        .and(warp::cookie::optional::<String>(SESSION_COOKIE))
        .and(with_state(state.clone()))
        .and_then(logout);

    let user = warp::path!("api" / "user")
        .and(warp::get())
        .and(warp::cookie::optional::<String>(SESSION_COOKIE))
        .and(with_state(state.clone()))
        .and_then(current_user);

    let avatar = warp::path!("api" / "avatar")
        .and(warp::post())
        .and(warp::cookie::optional::<String>(SESSION_COOKIE))
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(update_avatar);

    register.or(login).or(logout).or(user).or(avatar)
}

async fn register(credentials: Credentials, state: AppState) -> Result<Response, Infallible> {
    Ok(
        match state
            .auth
            .register(&credentials.username, &credentials.password)
            .await
        {
            Ok((user, token)) => with_cookie(
                json_reply(&json!({ "username": user.username }), StatusCode::CREATED),
                session_cookie(&token, &state),
            ),
            Err(e) => error_reply(&e),
        },
    )
}

async fn login(credentials: Credentials, state: AppState) -> Result<Response, Infallible> {
    Ok(
        match state
            .auth
            .login(&credentials.username, &credentials.password)
            .await
        {
            Ok((user, token)) => with_cookie(
                json_reply(&json!({ "username": user.username }), StatusCode::OK),
                session_cookie(&token, &state),
            ),
            Err(e) => error_reply(&e),
        },
    )
}

async fn logout(token: Option<String>, state: AppState) -> Result<Response, Infallible> {
    if let Some(token) = token {
        state.auth.logout(&token).await;
    }
    Ok(with_cookie(
        StatusCode::OK.into_response(),
        format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    ))
}

async fn current_user(token: Option<String>, state: AppState) -> Result<Response, Infallible> {
    Ok(match authenticated(token, &state).await {
        Ok(username) => json_reply(&json!({ "username": username }), StatusCode::OK),
        Err(e) => error_reply(&e),
    })
}

async fn update_avatar(
    token: Option<String>,
    update: AvatarUpdate,
    state: AppState,
) -> Result<Response, Infallible> {
    let result = match authenticated(token, &state).await {
        Ok(username) => state.server.store().update_avatar(&username, &update.avatar).await,
        Err(e) => Err(e),
    };
    Ok(match result {
        Ok(()) => json_reply(&json!({ "message": "Avatar updated" }), StatusCode::OK),
        Err(e) => error_reply(&e),
    })
}

async fn authenticated(token: Option<String>, state: &AppState) -> Result<String, ChatError> {
    let token = token.ok_or(ChatError::Unauthenticated)?;
    let user = state.auth.current_identity(&token).await?;
    Ok(user.username)
}

fn session_cookie(token: &str, state: &AppState) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        state.auth.ttl().as_secs()
    );
    if state.secure_cookies {
        cookie.push_str("; Secure");
    }
    cookie
}

fn with_cookie(reply: Response, cookie: String) -> Response {
    warp::reply::with_header(reply, "set-cookie", cookie).into_response()
}

fn json_reply(body: &serde_json::Value, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

fn error_reply(error: &ChatError) -> Response {
    let status = match error {
        ChatError::DuplicateUsername | ChatError::Malformed(_) => StatusCode::BAD_REQUEST,
        ChatError::InvalidCredentials | ChatError::Unauthenticated => StatusCode::UNAUTHORIZED,
        ChatError::UnknownUser(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_reply(&json!({ "message": error.to_string() }), status)
}
