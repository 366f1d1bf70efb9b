//! Typed backend endpoints
//!
//! Thin wrappers over `ApiClient` for the gallery backend's JSON surface:
//! registration, feed and artwork reads, likes, comments, subscriptions,
//! profile reads, and search. Every call goes through the interceptor
//! pipeline and inherits its token handling.
//!
//! The multipart endpoints (artwork create/update, profile update with an
//! image) carry file payloads and are not wrapped here; an upload layer can
//! build on [`ApiClient::execute`] directly.

use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::error::Result;

// ── Registration ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct RegisterIdentityRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

/// Identity created at the provider; `id` is the provider-side user ID the
/// profile record is keyed on.
#[derive(Debug, Deserialize)]
pub struct IdentityCreated {
    pub id: String,
}

#[derive(Debug, Serialize)]
struct RegisterProfileRequest<'a> {
    id: &'a str,
    #[serde(rename = "userName")]
    user_name: &'a str,
}

/// Profile record returned by the backend after registration.
#[derive(Debug, Deserialize)]
pub struct ProfileCreated {
    pub id: String,
    #[serde(rename = "userName")]
    pub user_name: String,
}

/// Create the identity at the provider.
///
/// First step of the two-step registration flow; there is no compensating
/// delete if the profile step then fails.
pub async fn register_identity(
    client: &ApiClient,
    username: &str,
    email: &str,
    password: &str,
) -> Result<IdentityCreated> {
    client
        .post_json(
            "/keycloak/register",
            &RegisterIdentityRequest {
                username,
                email,
                password,
            },
        )
        .await
}

/// Create the application profile for an existing identity.
pub async fn register_profile(
    client: &ApiClient,
    identity_id: &str,
    username: &str,
) -> Result<ProfileCreated> {
    client
        .post_json(
            "/users/register",
            &RegisterProfileRequest {
                id: identity_id,
                user_name: username,
            },
        )
        .await
}

// ── Shared DTOs ────────────────────────────────────────────────────────

/// One page of a paged listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default)]
    pub total_pages: u32,
    /// Zero-based page index
    #[serde(default)]
    pub number: u32,
}

/// Artwork summary as listed in feeds, search results, and user galleries.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub author_user_name: Option<String>,
    #[serde(default)]
    pub author_avatar_url: Option<String>,
    #[serde(default)]
    pub count_likes: u64,
    #[serde(default)]
    pub count_views: u64,
    #[serde(default)]
    pub publication_time: Option<String>,
}

/// Author block returned alongside an artwork's details.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorInfo {
    pub id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub count_subscribers: u64,
}

/// Artwork details together with its author.
#[derive(Debug, Deserialize)]
pub struct ArtWithAuthor {
    pub art: ArtSummary,
    pub author: AuthorInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tag {
    pub name: String,
}

/// Comment on an artwork.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub author_user_name: Option<String>,
    #[serde(default)]
    pub author_photo_url: Option<String>,
    #[serde(default)]
    pub publication_time: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment<'a> {
    pub art_id: &'a str,
    pub text: &'a str,
}

/// Full profile as served by `/users` and `/users/me`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub count_subscribers: u64,
}

/// Minimal identity block for the signed-in user.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMin {
    pub id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SocialNetwork {
    pub name: String,
    pub url: String,
}

/// Subscribed author with a preview of their artworks.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribedAuthor {
    pub id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub arts: Vec<ArtSummary>,
}

// ── Feed, artworks, search ─────────────────────────────────────────────

/// Fetch a feed page. `feed_type` is the backend's feed selector
/// (e.g. "trending").
pub async fn get_feed(
    client: &ApiClient,
    feed_type: &str,
    page: u32,
    size: u32,
) -> Result<Page<ArtSummary>> {
    let page = page.to_string();
    let size = size.to_string();
    client
        .get_json(
            "/arts/feed",
            &[("type", feed_type), ("page", &page), ("size", &size)],
        )
        .await
}

/// Fetch one artwork's details together with its author.
pub async fn get_art_with_author(client: &ApiClient, art_id: &str) -> Result<ArtWithAuthor> {
    client.get_json("/arts/with-author", &[("id", art_id)]).await
}

/// Fetch the tags attached to an artwork.
pub async fn get_art_tags(client: &ApiClient, art_id: &str) -> Result<Vec<Tag>> {
    client.get_json("/tags/art", &[("id", art_id)]).await
}

/// Search artworks by name.
pub async fn search_arts(
    client: &ApiClient,
    query: &str,
    page: u32,
    size: u32,
) -> Result<Page<ArtSummary>> {
    let page = page.to_string();
    let size = size.to_string();
    client
        .get_json(
            "/arts/search",
            &[("query", query), ("page", &page), ("size", &size)],
        )
        .await
}

/// Delete an artwork owned by the signed-in user.
pub async fn delete_art(client: &ApiClient, art_id: &str) -> Result<()> {
    client.delete("/arts", &[("id", art_id)]).await
}

// ── Likes ──────────────────────────────────────────────────────────────

/// Whether the signed-in user has liked the artwork.
pub async fn like_status(client: &ApiClient, art_id: &str) -> Result<bool> {
    client.get_json("/arts/like", &[("id", art_id)]).await
}

/// Toggle the like and return the new status.
pub async fn toggle_like(client: &ApiClient, art_id: &str) -> Result<bool> {
    client.post_query_json("/arts/like", &[("id", art_id)]).await
}

/// Artworks the signed-in user has liked.
pub async fn get_liked_artworks(
    client: &ApiClient,
    page: u32,
    size: u32,
) -> Result<Page<ArtSummary>> {
    let page = page.to_string();
    let size = size.to_string();
    client
        .get_json("/arts/likes", &[("page", &page), ("size", &size)])
        .await
}

// ── Comments ───────────────────────────────────────────────────────────

/// Fetch one page of an artwork's comments.
pub async fn get_art_comments(
    client: &ApiClient,
    art_id: &str,
    page: u32,
    size: u32,
) -> Result<Vec<Comment>> {
    let page = page.to_string();
    let size = size.to_string();
    let paged: Page<Comment> = client
        .get_json(
            "/comments/art",
            &[("id", art_id), ("page", &page), ("size", &size)],
        )
        .await?;
    Ok(paged.content)
}

/// Post a comment on an artwork.
pub async fn post_comment(client: &ApiClient, comment: &NewComment<'_>) -> Result<Comment> {
    client.post_json("/comments/art", comment).await
}

// ── Subscriptions ──────────────────────────────────────────────────────

/// Whether the signed-in user is subscribed to the target user.
pub async fn subscription_status(client: &ApiClient, target_id: &str) -> Result<bool> {
    client.get_json("/users/subscribe", &[("id", target_id)]).await
}

/// Toggle the subscription and return the new status.
pub async fn toggle_subscription(client: &ApiClient, target_id: &str) -> Result<bool> {
    client
        .post_query_json("/users/subscribe", &[("id", target_id)])
        .await
}

/// Subscribed authors, each with a preview of their recent artworks.
pub async fn get_subscriptions_with_arts(
    client: &ApiClient,
    arts_per_author: u32,
    page: u32,
    size: u32,
) -> Result<Page<SubscribedAuthor>> {
    let arts_per_author = arts_per_author.to_string();
    let page = page.to_string();
    let size = size.to_string();
    client
        .get_json(
            "/users/subs-with-arts",
            &[
                ("artsPerAuthor", &arts_per_author),
                ("page", &page),
                ("size", &size),
            ],
        )
        .await
}

// ── Users and profiles ─────────────────────────────────────────────────

/// Fetch a user's public profile.
pub async fn get_user_profile(client: &ApiClient, user_id: &str) -> Result<UserProfile> {
    client.get_json("/users", &[("id", user_id)]).await
}

/// Fetch a user's artworks.
pub async fn get_user_artworks(
    client: &ApiClient,
    user_id: &str,
    page: u32,
    size: u32,
) -> Result<Page<ArtSummary>> {
    let page = page.to_string();
    let size = size.to_string();
    client
        .get_json(
            "/users/arts",
            &[("id", user_id), ("page", &page), ("size", &size)],
        )
        .await
}

/// Fetch a user's linked social networks.
pub async fn get_user_social_networks(
    client: &ApiClient,
    user_id: &str,
) -> Result<Vec<SocialNetwork>> {
    client
        .get_json("/users/social-networks", &[("id", user_id)])
        .await
}

/// Minimal info for the signed-in user.
pub async fn get_current_user_min(client: &ApiClient) -> Result<UserMin> {
    client.get_json("/users/me/min", &[]).await
}

/// Full profile of the signed-in user.
pub async fn get_current_user_profile(client: &ApiClient) -> Result<UserProfile> {
    client.get_json("/users/me", &[]).await
}
