//! Document layout shared by every service.
//!
//! ```text
//! routes/{route}
//! routes/{route}/points/{point}
//! routes/{route}/likes/{user}
//! routes/{route}/comments/{comment}
//! routes/{route}/comments/{comment}/likes/{user}
//! users/{user}/favorites/{route}
//! ```

use domains::{CollectionPath, CommentId, DocRef, RouteId, UserId};

pub const ROUTES: &str = "routes";
pub const POINTS: &str = "points";
pub const COMMENTS: &str = "comments";
pub const LIKES: &str = "likes";
pub const USERS: &str = "users";
pub const FAVORITES: &str = "favorites";

pub fn routes() -> CollectionPath {
    CollectionPath::root(ROUTES)
}

pub fn route(id: &RouteId) -> DocRef {
    routes().doc(id.as_str())
}

pub fn points(route_id: &RouteId) -> CollectionPath {
    routes().child(route_id.as_str(), POINTS)
}

pub fn comments(route_id: &RouteId) -> CollectionPath {
    routes().child(route_id.as_str(), COMMENTS)
}

pub fn route_likes(route_id: &RouteId) -> CollectionPath {
    routes().child(route_id.as_str(), LIKES)
}

pub fn comment_likes(route_id: &RouteId, comment_id: &CommentId) -> CollectionPath {
    comments(route_id).child(comment_id.as_str(), LIKES)
}

pub fn favorites(user: &UserId) -> CollectionPath {
    CollectionPath::root(USERS).child(user.as_str(), FAVORITES)
}
