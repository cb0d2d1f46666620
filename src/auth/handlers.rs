use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{info, instrument};

use crate::{
    auth::{
        cookie::{logout_cookie, session_cookie},
        dto::{
            DataResponse, Empty, ForgotPasswordRequest, LoginRequest, RegisterRequest,
            ResetPasswordRequest, TokenResponse, UpdateDetailsRequest, UpdatePasswordRequest,
        },
        extractors::{AppJson, CurrentUser},
        repo_types::User,
        services,
    },
    error::AppResult,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/forgotpassword", post(forgot_password))
        .route("/resetpassword/:resettoken", put(reset_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/updatedetails", put(update_details))
        .route("/updatepassword", put(update_password))
}

/// Sets the session cookie and echoes the token in the body.
fn token_response(
    state: &AppState,
    jar: CookieJar,
    token: String,
) -> (CookieJar, Json<TokenResponse>) {
    let jar = jar.add(session_cookie(&state.config, token.clone()));
    (jar, Json(TokenResponse::new(token)))
}

#[instrument(skip(state, jar, payload))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(payload): AppJson<RegisterRequest>,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let (_, token) = services::register(&state, payload).await?;
    Ok(token_response(&state, jar, token))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let (_, token) = services::login(&state, payload).await?;
    Ok(token_response(&state, jar, token))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<DataResponse<User>> {
    Json(DataResponse::new(user))
}

#[instrument(skip(state, jar))]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<DataResponse<Empty>>) {
    info!("session cookie cleared");
    (
        jar.add(logout_cookie(&state.config)),
        Json(DataResponse::new(Empty::default())),
    )
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ForgotPasswordRequest>,
) -> AppResult<Json<DataResponse<Empty>>> {
    services::forgot_password(&state, payload).await?;
    Ok(Json(DataResponse::new(Empty::default())))
}

#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(reset_token): Path<String>,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let (_, token) = services::reset_password(&state, &reset_token, payload).await?;
    Ok(token_response(&state, jar, token))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_details(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(payload): AppJson<UpdateDetailsRequest>,
) -> AppResult<Json<DataResponse<User>>> {
    let user = services::update_details(&state, user.id, payload).await?;
    Ok(Json(DataResponse::new(user)))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_password(
    State(state): State<AppState>,
    jar: CookieJar,
    CurrentUser(user): CurrentUser,
    AppJson(payload): AppJson<UpdatePasswordRequest>,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let (_, token) = services::update_password(&state, user.id, payload).await?;
    Ok(token_response(&state, jar, token))
}
