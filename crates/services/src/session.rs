//! Works out who is signed in.

use domains::{ContentBackend, Viewer};
use tracing::debug;

/// Asks the backend for the signed-in user. Any failure, including a
/// backend that is down, means the viewer is anonymous.
pub async fn current_viewer(backend: &dyn ContentBackend) -> Viewer {
    match backend.current_user().await {
        Ok(user) => {
            debug!(user = %user.id, "session: signed in");
            Viewer::User(user)
        }
        Err(err) => {
            debug!(error = %err, "session: anonymous");
            Viewer::Anonymous
        }
    }
}
