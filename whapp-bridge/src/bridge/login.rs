use super::lock::SessionLock;
use crate::{
    error::BridgeError,
    session::{Session, SessionError},
};
use tokio::task::{self, JoinHandle};
use tokio_util::sync::{CancellationToken, DropGuard};

/// In-flight login code request running on the blocking pool.
///
/// The task owns the session lock until it returns. Dropping the request
/// signals cancellation; [`cancel`](Self::cancel) also waits for the task.
pub struct LoginCodeRequest {
    task: JoinHandle<Result<String, SessionError>>,
    token: CancellationToken,
    _guard: DropGuard,
}

impl LoginCodeRequest {
    pub async fn spawn<S: Session>(session: &SessionLock<S>) -> Self {
        let mut guard = session.lock_owned().await;
        let token = CancellationToken::new();
        let child = token.clone();

        Self {
            task: task::spawn_blocking(move || guard.request_login_code(&child)),
            _guard: token.clone().drop_guard(),
            token,
        }
    }

    /// Wait for the code. Must not be polled again once it has resolved.
    pub async fn wait(&mut self) -> Result<String, BridgeError> {
        Ok((&mut self.task).await??)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the request and wait until the blocking task has returned.
    pub async fn cancel(mut self) -> Result<(), BridgeError> {
        self.token.cancel();

        match (&mut self.task).await? {
            Ok(_) | Err(SessionError::Cancelled) => Ok(()),
            Err(x) => Err(x.into()),
        }
    }
}
