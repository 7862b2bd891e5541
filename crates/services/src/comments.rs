//! Route comments.

use std::sync::Arc;

use domains::{
    decode_all, Actor, AppError, Comment, CommentId, Direction, DocumentStore, Query, Result,
    RouteId, UserId, Writes,
};
use tracing::{info, instrument};

use crate::paths;

pub const MAX_COMMENT_CHARS: usize = 2000;

#[derive(Clone)]
pub struct CommentService {
    store: Arc<dyn DocumentStore>,
}

impl CommentService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Oldest first.
    pub async fn list(&self, route: &RouteId) -> Result<Vec<Comment>> {
        let docs = self
            .store
            .list(&Query::new(paths::comments(route)).order_by("createdAt", Direction::Asc))
            .await
            .map_err(AppError::read)?;
        Ok(decode_all(&docs)?)
    }

    #[instrument(skip(self, actor, text), fields(route = %route))]
    pub async fn add(&self, route: &RouteId, actor: Option<&Actor>, text: &str) -> Result<CommentId> {
        let actor = actor.ok_or(AppError::AuthenticationRequired)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::ValidationError("comment text is empty".into()));
        }
        let chars = text.chars().count();
        if chars > MAX_COMMENT_CHARS {
            return Err(AppError::ValidationError(format!(
                "comment is {chars} characters, the limit is {MAX_COMMENT_CHARS}"
            )));
        }

        let writes = Writes::new()
            .set("userId", actor.id.as_str())
            .set_opt("userName", actor.public_name())
            .set_opt("userPhotoUrl", actor.photo_url.clone())
            .set("text", text)
            .server_timestamp("createdAt");
        let id = self
            .store
            .create(&paths::comments(route), writes.build())
            .await
            .map_err(AppError::write)?;
        info!(comment = %id, "comment added");
        Ok(CommentId::new(id))
    }

    /// The author and the route owner may delete a comment.
    pub fn can_delete(actor: &Actor, comment: &Comment, route_owner: &UserId) -> bool {
        actor.id == comment.author_id || actor.id == *route_owner
    }

    /// Checked locally before any remote call; the store's own rules apply again on write.
    #[instrument(skip(self, comment, actor), fields(route = %route, comment = %comment.id))]
    pub async fn delete(
        &self,
        route: &RouteId,
        comment: &Comment,
        route_owner: &UserId,
        actor: Option<&Actor>,
    ) -> Result<()> {
        let actor = actor.ok_or(AppError::AuthenticationRequired)?;
        if !Self::can_delete(actor, comment, route_owner) {
            return Err(AppError::Unauthorized(format!(
                "{} may not delete comment {}",
                actor.id, comment.id
            )));
        }
        self.store
            .delete(&paths::comments(route).doc(comment.id.as_str()))
            .await
            .map_err(AppError::write)?;
        info!("comment deleted");
        Ok(())
    }
}
