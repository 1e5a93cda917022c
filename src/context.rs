use crate::error::Error;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Cancel signal plus optional deadline for one operation. Every wait and the
/// in-flight I/O of a call are raced against it.
#[derive(Debug, Clone, Default)]
pub struct Context {
    signal: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Cancels every [`Context`] derived from the pair it was created with.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Context {
    /// A context that never cancels.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            signal: Some(rx),
            deadline: None,
        };
        (ctx, CancelHandle { tx: Arc::new(tx) })
    }

    /// Derive a context with a deadline; an earlier existing deadline wins.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        };
        Self {
            signal: self.signal.clone(),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        if let Some(rx) = &self.signal {
            if *rx.borrow() {
                return true;
            }
        }
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fails fast if the context is already done.
    pub fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the context is cancelled or past its deadline.
    pub async fn done(&self) {
        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending().await,
            }
        };
        let signal = async {
            match &self.signal {
                Some(rx) => {
                    let mut rx = rx.clone();
                    // A dropped handle can no longer cancel.
                    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = deadline => {}
            _ = signal => {}
        }
    }

    /// Run `fut` to completion unless the context finishes first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Error> {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.done() => Err(Error::Cancelled),
            out = fut => Ok(out),
        }
    }

    pub async fn sleep(&self, duration: Duration) -> Result<(), Error> {
        self.run(tokio::time::sleep(duration)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn background_never_cancels() {
        let ctx = Context::background();
        assert!(ctx.sleep(Duration::from_secs(3600)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_sleep() {
        let (ctx, handle) = Context::with_cancel();
        let started = Instant::now();
        let task = tokio::spawn(async move { ctx.sleep(Duration::from_secs(60)).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_cancelled());
        handle.cancel();
        assert!(handle.is_cancelled());
        let res = task.await.unwrap();
        assert!(matches!(res, Err(Error::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_and_earliest_wins() {
        let ctx = Context::background().with_timeout(Duration::from_secs(1));
        let later = ctx.with_timeout(Duration::from_secs(10));
        assert_eq!(ctx.deadline(), later.deadline());
        let started = Instant::now();
        assert!(matches!(
            later.sleep(Duration::from_secs(30)).await,
            Err(Error::Cancelled)
        ));
        assert!(started.elapsed() <= Duration::from_secs(2));
        assert!(later.check().is_err());
    }

    #[tokio::test]
    async fn dropped_handle_does_not_cancel() {
        let (ctx, handle) = Context::with_cancel();
        drop(handle);
        assert!(ctx.run(async { 7 }).await.is_ok());
    }
}
