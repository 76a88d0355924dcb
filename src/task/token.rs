use std::fmt;

/// Marker handed to every task producer.
///
/// A token is cancelled as soon as a newer task supersedes the one it was
/// minted for, or when the store is reset. Honoring it is optional: the store
/// discards stale results whether or not the producer stops early.
#[derive(Clone)]
pub struct CancellationToken {
    generation: u64,
    inner: tokio_util::sync::CancellationToken,
}

impl CancellationToken {
    pub(crate) fn new(generation: u64) -> Self {
        Self {
            generation,
            inner: tokio_util::sync::CancellationToken::new(),
        }
    }

    /// The task generation this token was minted for.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a newer task has taken over.
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Resolves once the token is cancelled.
    ///
    /// # Examples
    ///
    /// ```
    /// # use snapstore::AsyncStore;
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let store = AsyncStore::<u32>::new();
    /// let slow = store.run_task(|token, _| async move {
    ///     token.cancelled().await;
    ///     Err::<u32, _>(anyhow::anyhow!("gave up"))
    /// });
    /// let fast = store.run_task(|_, _| async { Ok::<_, anyhow::Error>(7) });
    ///
    /// assert!(fast.await.is_committed());
    /// assert!(!slow.await.is_committed());
    /// # }
    /// ```
    pub async fn cancelled(&self) {
        self.inner.cancelled().await
    }

    pub(crate) fn cancel(&self) {
        self.inner.cancel();
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("generation", &self.generation())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
