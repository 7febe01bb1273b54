use std::sync::Arc;
use std::time::Duration;

use anchor::Channel;
use checker::{CheckRequest, CheckerProvider, ProviderError, ProviderResponse};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::debug;

/// A finished provider call on its way back to the session.
#[derive(Debug)]
pub struct CheckOutcome {
    pub channel: Channel,
    pub revision: u64,
    /// Text the provider was asked about.
    pub snapshot: String,
    pub result: Result<ProviderResponse, ProviderError>,
    pub latency: Duration,
}

/// Call `provider` with a deadline. Expiry is reported as
/// [`ProviderError::Timeout`].
pub async fn call_with_timeout(
    provider: &dyn CheckerProvider,
    request: &CheckRequest,
    timeout: Duration,
) -> Result<ProviderResponse, ProviderError> {
    match tokio::time::timeout(timeout, provider.check(request)).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(timeout.as_millis() as u64)),
    }
}

/// Run one check on the runtime and send its outcome to `tx`. Aborting the
/// returned handle drops the call without sending anything.
pub fn spawn_job(
    provider: Arc<dyn CheckerProvider>,
    request: CheckRequest,
    timeout: Duration,
    tx: UnboundedSender<CheckOutcome>,
) -> AbortHandle {
    let task = tokio::spawn(async move {
        let started = Instant::now();
        let result = call_with_timeout(provider.as_ref(), &request, timeout).await;
        let outcome = CheckOutcome {
            channel: request.channel,
            revision: request.revision,
            snapshot: request.text,
            result,
            latency: started.elapsed(),
        };
        if tx.send(outcome).is_err() {
            debug!("outcome_receiver_closed");
        }
    });
    task.abort_handle()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct Slow;

    #[async_trait]
    impl CheckerProvider for Slow {
        fn id(&self) -> &str {
            "slow"
        }

        async fn check(&self, _request: &CheckRequest) -> Result<ProviderResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ProviderResponse::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_a_provider_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let request = CheckRequest::new(Channel::Grammar, 3, "text");
        spawn_job(Arc::new(Slow), request, Duration::from_secs(8), tx);
        let outcome = rx.recv().await.unwrap();
        assert_eq!(outcome.revision, 3);
        assert_eq!(outcome.result.unwrap_err(), ProviderError::Timeout(8000));
        assert!(outcome.latency >= Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_job_sends_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let request = CheckRequest::new(Channel::Grammar, 1, "text");
        let handle = spawn_job(Arc::new(Slow), request, Duration::from_secs(60), tx);
        tokio::task::yield_now().await;
        handle.abort();
        assert!(rx.recv().await.is_none());
    }
}
