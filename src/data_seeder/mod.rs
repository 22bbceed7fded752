// Sample data seeder - a small social graph for local development

use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::info;
use uuid::Uuid;

use crate::{
    app_state::AppState,
    error::AppResult,
    infrastructure::viewer::ViewerContext,
    models::{Edge, ProfileUpdate, UserRole},
    services::{PostDraft, Registration},
};

const SAMPLE_USERS: [(&str, &str); 5] = [
    ("ada", "Ada Lovelace"),
    ("grace", "Grace Hopper"),
    ("linus", "Linus Torvalds"),
    ("margaret", "Margaret Hamilton"),
    ("dennis", "Dennis Ritchie"),
];

const SAMPLE_POSTS: [&str; 8] = [
    "Shipping the new parser today #rust",
    "Anyone else reading about keyset pagination? https://use-the-index-luke.com/no-offset",
    "Coffee first, compilers second",
    "@grace the debugger found an actual bug again #history",
    "Hot take: most caches should be smaller #performance",
    "Weekend project: a tiny social feed in axum https://github.com/tokio-rs/axum",
    "Reminder that SQLite is a great default",
    "Drafting a talk on async cancellation #tokio",
];

pub const SAMPLE_PASSWORD: &str = "password123";

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SeedSummary {
    pub users: usize,
    pub posts: usize,
    pub replies: usize,
    pub likes: usize,
    pub follows: usize,
    pub bookmarks: usize,
}

/// Register the sample accounts and populate posts and edges between them.
/// The first account is promoted to admin.
pub async fn seed_sample_data(state: &AppState) -> AppResult<SeedSummary> {
    let mut summary = SeedSummary::default();
    let mut users = Vec::new();

    for (username, full_name) in SAMPLE_USERS {
        let user = state
            .accounts
            .register(Registration {
                email: format!("{}@example.com", username),
                password: SAMPLE_PASSWORD.to_string(),
                username: username.to_string(),
                full_name: full_name.to_string(),
            })
            .await?;
        users.push(user.id);
        summary.users += 1;
    }

    if let Some(admin) = users.first() {
        state
            .db
            .update_profile(
                *admin,
                &ProfileUpdate {
                    role: Some(UserRole::Admin),
                    ..Default::default()
                },
            )
            .await?;
    }

    let mut post_ids: Vec<Uuid> = Vec::new();
    for (i, content) in SAMPLE_POSTS.iter().enumerate() {
        let author = users[i % users.len()];
        let vc = ViewerContext::authenticated(author, UserRole::User, "seed");
        let post = state
            .posts
            .create_post(
                &vc,
                PostDraft {
                    content: content.to_string(),
                    ..Default::default()
                },
            )
            .await?;
        post_ids.push(post.post.id);
        summary.posts += 1;
    }

    for &user in &users {
        for &other in &users {
            let follow = rand::rng().random_bool(0.6);
            if user != other && follow {
                state.db.create_edge(Edge::follow(user, other)).await?;
                summary.follows += 1;
            }
        }

        let liked: Vec<Uuid> = post_ids
            .choose_multiple(&mut rand::rng(), 3)
            .copied()
            .collect();
        for post_id in liked {
            if state.db.create_edge(Edge::like(user, post_id)).await? {
                summary.likes += 1;
            }
        }

        let saved = post_ids.choose(&mut rand::rng()).copied();
        if let Some(post_id) = saved {
            state.db.create_edge(Edge::bookmark(user, post_id)).await?;
            summary.bookmarks += 1;
        }

        let parent = post_ids.choose(&mut rand::rng()).copied();
        if let Some(parent_id) = parent {
            let vc = ViewerContext::authenticated(user, UserRole::User, "seed");
            state
                .posts
                .create_post(
                    &vc,
                    PostDraft {
                        content: "Great point, agreed".to_string(),
                        media_urls: vec![],
                        parent_id: Some(parent_id),
                    },
                )
                .await?;
            summary.replies += 1;
        }
    }

    info!(?summary, "sample data seeded");
    Ok(summary)
}
