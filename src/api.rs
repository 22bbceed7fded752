// HTTP API - axum routes over the feed, session and domain services
// Every /api/v1 request passes through the viewer context middleware.

use axum::{
    body::Bytes,
    extract::{Path as AxumPath, Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;
use uuid::Uuid;

use crate::{
    app_state::AppState,
    content::{parse_post_content, Segment},
    error::{AppError, AppResult},
    feed::FeedRequest,
    infrastructure::{
        auth_store::{AuthUser, Session},
        middleware::{bearer_token, viewer_context_middleware, Vc},
    },
    models::{FeedPage, Post, PostWithCounts, Profile, ProfileWithCounts, UserRole},
    services::{FollowCounts, PostDraft, ProfileEdit, ProfileImage, Registration},
};

#[derive(Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct UpdatePostRequest {
    pub content: String,
}

/// Client-observed state of a toggle; the server flips it
#[derive(Deserialize)]
pub struct ToggleRequest {
    #[serde(default)]
    pub currently_set: bool,
}

#[derive(Serialize, Deserialize)]
pub struct ToggleResponse {
    pub active: bool,
}

#[derive(Deserialize)]
pub struct UsernameRequest {
    pub username: String,
}

#[derive(Deserialize)]
pub struct RoleRequest {
    pub role: UserRole,
}

#[derive(Deserialize)]
pub struct UploadQuery {
    pub file_name: String,
}

#[derive(Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Serialize)]
pub struct FollowStatus {
    #[serde(flatten)]
    pub counts: FollowCounts,
    pub is_following: bool,
}

#[derive(Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: PostWithCounts,
    pub segments: Vec<Segment>,
}

// Auth handlers

pub async fn sign_up_handler(
    State(state): State<AppState>,
    Json(req): Json<Registration>,
) -> AppResult<(StatusCode, Json<AuthUser>)> {
    let user = state.accounts.register(req).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn sign_in_handler(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> AppResult<Json<Session>> {
    let session = state.accounts.sign_in(&req.email, &req.password).await?;
    Ok(Json(session))
}

pub async fn sign_out_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    let token = bearer_token(&headers)?
        .ok_or_else(|| AppError::Unauthorized("No session to sign out".to_string()))?;
    state.accounts.sign_out(token).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Feed and post handlers

pub async fn feed_handler(
    State(state): State<AppState>,
    vc: Vc,
    Query(request): Query<FeedRequest>,
) -> AppResult<Json<FeedPage>> {
    let page = state.feed.fetch_with_retry(&request, vc.user_id).await?;
    Ok(Json(page))
}

pub async fn create_post_handler(
    State(state): State<AppState>,
    vc: Vc,
    Json(draft): Json<PostDraft>,
) -> AppResult<(StatusCode, Json<PostWithCounts>)> {
    let post = state.posts.create_post(&vc, draft).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<Uuid>,
) -> AppResult<Json<PostView>> {
    let post = state.feed.get_post(id, vc.user_id).await?;
    let segments = parse_post_content(&post.post.content);
    Ok(Json(PostView { post, segments }))
}

pub async fn update_post_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<Uuid>,
    Json(req): Json<UpdatePostRequest>,
) -> AppResult<Json<Post>> {
    let post = state.posts.update_post(&vc, id, &req.content).await?;
    Ok(Json(post))
}

pub async fn delete_post_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<Uuid>,
) -> AppResult<StatusCode> {
    state.posts.delete_post(&vc, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn upload_media_handler(
    State(state): State<AppState>,
    vc: Vc,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<UploadResponse>)> {
    let url = state.posts.upload_media(&vc, &query.file_name, &body).await?;
    Ok((StatusCode::CREATED, Json(UploadResponse { url })))
}

pub async fn like_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<Uuid>,
    Json(req): Json<ToggleRequest>,
) -> AppResult<Json<ToggleResponse>> {
    let user_id = vc.require_user()?;
    let active = state.engagement.toggle_like(user_id, id, req.currently_set).await?;
    Ok(Json(ToggleResponse { active }))
}

pub async fn bookmark_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<Uuid>,
    Json(req): Json<ToggleRequest>,
) -> AppResult<Json<ToggleResponse>> {
    let user_id = vc.require_user()?;
    let active = state.engagement.toggle_bookmark(user_id, id, req.currently_set).await?;
    Ok(Json(ToggleResponse { active }))
}

// Profile and follow handlers

pub async fn get_profile_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(username): AxumPath<String>,
) -> AppResult<Json<ProfileWithCounts>> {
    let profile = state.profiles.get_by_username(&username, vc.user_id).await?;
    Ok(Json(profile))
}

pub async fn update_profile_handler(
    State(state): State<AppState>,
    vc: Vc,
    Json(edit): Json<ProfileEdit>,
) -> AppResult<Json<Profile>> {
    let profile = state.profiles.update_profile(&vc, edit).await?;
    Ok(Json(profile))
}

pub async fn change_username_handler(
    State(state): State<AppState>,
    vc: Vc,
    Json(req): Json<UsernameRequest>,
) -> AppResult<Json<Profile>> {
    let profile = state.profiles.change_username(&vc, &req.username).await?;
    Ok(Json(profile))
}

pub async fn upload_avatar_handler(
    State(state): State<AppState>,
    vc: Vc,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> AppResult<Json<Profile>> {
    let profile = state
        .profiles
        .upload_image(&vc, ProfileImage::Avatar, &query.file_name, &body)
        .await?;
    Ok(Json(profile))
}

pub async fn upload_banner_handler(
    State(state): State<AppState>,
    vc: Vc,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> AppResult<Json<Profile>> {
    let profile = state
        .profiles
        .upload_image(&vc, ProfileImage::Banner, &query.file_name, &body)
        .await?;
    Ok(Json(profile))
}

pub async fn follow_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<Uuid>,
    Json(req): Json<ToggleRequest>,
) -> AppResult<Json<ToggleResponse>> {
    let user_id = vc.require_user()?;
    let active = state.follows.toggle(user_id, id, req.currently_set).await?;
    Ok(Json(ToggleResponse { active }))
}

pub async fn follow_status_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<Uuid>,
) -> AppResult<Json<FollowStatus>> {
    let counts = state.follows.counts(id).await?;
    let is_following = match vc.user_id {
        Some(viewer) if viewer != id => state.follows.is_following(viewer, id).await?,
        _ => false,
    };
    Ok(Json(FollowStatus { counts, is_following }))
}

// Search handlers

pub async fn search_profiles_handler(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<Profile>>> {
    Ok(Json(state.search.search_profiles(&query.q).await?))
}

pub async fn search_posts_handler(
    State(state): State<AppState>,
    vc: Vc,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<PostWithCounts>>> {
    Ok(Json(state.search.search_posts(&query.q, vc.user_id).await?))
}

// Admin handlers

pub async fn list_users_handler(
    State(state): State<AppState>,
    vc: Vc,
) -> AppResult<Json<Vec<Profile>>> {
    Ok(Json(state.admin.list_users(&vc).await?))
}

pub async fn set_role_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<Uuid>,
    Json(req): Json<RoleRequest>,
) -> AppResult<Json<Profile>> {
    Ok(Json(state.admin.set_role(&vc, id, req.role).await?))
}

pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        // Auth
        .route("/auth/signup", post(sign_up_handler))
        .route("/auth/signin", post(sign_in_handler))
        .route("/auth/signout", post(sign_out_handler))

        // Feed and posts
        .route("/feed", get(feed_handler))
        .route("/posts", post(create_post_handler))
        .route(
            "/posts/{id}",
            get(get_post_handler)
                .patch(update_post_handler)
                .delete(delete_post_handler),
        )
        .route("/posts/{id}/like", post(like_handler))
        .route("/posts/{id}/bookmark", post(bookmark_handler))
        .route("/media", post(upload_media_handler))

        // Profiles and follows
        .route("/profiles/{username}", get(get_profile_handler))
        .route("/profiles/me", patch(update_profile_handler))
        .route("/profiles/me/username", post(change_username_handler))
        .route("/profiles/me/avatar", post(upload_avatar_handler))
        .route("/profiles/me/banner", post(upload_banner_handler))
        .route("/follows/{id}", get(follow_status_handler).post(follow_handler))

        // Search
        .route("/search/profiles", get(search_profiles_handler))
        .route("/search/posts", get(search_posts_handler))

        // Admin
        .route("/admin/users", get(list_users_handler))
        .route("/admin/users/{id}/role", patch(set_role_handler))

        .layer(middleware::from_fn_with_state(
            state.clone(),
            viewer_context_middleware::<AppState>,
        ))
        .with_state(state)
}

/// API under `/api/v1` plus public object URLs served from the storage root
pub fn create_app_router(state: AppState) -> Router {
    let storage_root = state.config.storage.root.clone();
    Router::new()
        .nest("/api/v1", create_api_router(state))
        .nest_service("/storage/v1/object/public", ServeDir::new(storage_root))
}
