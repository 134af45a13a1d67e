use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::email::dispatcher::{EmailDispatcher, EmailJob};

/// Consumes email jobs one at a time until the channel closes. Every job
/// completes from the queue's point of view; the dispatch outcome is only
/// observed here, so send failures never trigger redelivery.
pub async fn run(mut jobs: mpsc::Receiver<EmailJob>, dispatcher: EmailDispatcher) {
    info!("email worker starting");
    let mut processed: u64 = 0;
    let mut failed: u64 = 0;
    while let Some(job) = jobs.recv().await {
        let outcome = dispatcher.dispatch(&job).await;
        processed += 1;
        if !outcome.is_sent() {
            failed += 1;
        }
        debug!(processed, failed, "email job completed");
    }
    info!(processed, failed, "email worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::dispatcher::test_support::{welcome_job, StubEmailClient};

    #[tokio::test]
    async fn worker_drains_the_channel_and_survives_failures() {
        let client = StubEmailClient::failing();
        let dispatcher = EmailDispatcher::new(client.clone());
        let (tx, rx) = mpsc::channel(8);

        let handle = tokio::spawn(run(rx, dispatcher));
        for i in 0..3 {
            tx.send(welcome_job(&format!("user{i}@example.com"), "U"))
                .await
                .expect("send job");
        }
        drop(tx);
        handle.await.expect("worker exits cleanly");

        assert_eq!(client.sent.lock().expect("stub lock").len(), 3);
    }
}
