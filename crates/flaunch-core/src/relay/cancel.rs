use tokio::sync::watch;

/// Owner side of a cancellation signal
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Observer side, passed alongside the sink to a relay
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// A token that never fires
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. Pends forever if the handle is dropped first.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_token_fires_after_cancel() {
        let handle = CancelHandle::new();
        let mut token = handle.token();
        assert!(!token.is_cancelled());

        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("token should fire");
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_token_created_after_cancel_is_cancelled() {
        let handle = CancelHandle::new();
        handle.cancel();
        let mut token = handle.token();
        assert!(token.is_cancelled());
        token.cancelled().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_token_stays_pending() {
        let mut token = CancelToken::never();
        let fired = tokio::time::timeout(Duration::from_secs(60), token.cancelled()).await;
        assert!(fired.is_err());
    }
}
