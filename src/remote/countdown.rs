//! Countdown indicator for pending remote questions.
//!
//! A background task edits every delivered copy of a question as the
//! deadline approaches. Each task is tied to a [`CancellationToken`] that
//! fires as soon as the question resolves, so no edit lands after the
//! outcome has been shown.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::remote::transport::{ChannelTransport, DeliveryRef, OutboundMessage};

/// Remaining-seconds marks at which a countdown edit is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownSchedule {
    checkpoints: Vec<u64>,
    final_seconds: u64,
}

impl CountdownSchedule {
    /// Build a schedule from coarse checkpoints plus a per-second tail.
    #[must_use]
    pub fn new(checkpoints: &[u64], final_seconds: u64) -> Self {
        Self {
            checkpoints: checkpoints.to_vec(),
            final_seconds,
        }
    }

    /// Marks (seconds remaining) for a question with `total` seconds.
    ///
    /// Only marks strictly below `total` are kept; the result is in
    /// descending order and free of duplicates.
    #[must_use]
    pub fn marks(&self, total: u64) -> Vec<u64> {
        let mut marks: Vec<u64> = self
            .checkpoints
            .iter()
            .copied()
            .chain(1..=self.final_seconds)
            .filter(|mark| *mark > 0 && *mark < total)
            .collect();
        marks.sort_unstable_by(|a, b| b.cmp(a));
        marks.dedup();
        marks
    }
}

impl Default for CountdownSchedule {
    fn default() -> Self {
        Self::new(&[30, 15], 10)
    }
}

/// Footer shown with `remaining` seconds left.
#[must_use]
pub fn countdown_footer(remaining: u64) -> String {
    if remaining < 10 {
        format!("\u{26a0}\u{fe0f} **{remaining}s** remaining")
    } else {
        format!("\u{23f3} **{remaining}s** remaining")
    }
}

/// Stops a running countdown task. Dropping the handle cancels it.
#[derive(Debug)]
pub struct CountdownHandle {
    cancel: CancellationToken,
}

impl CountdownHandle {
    /// Stop the countdown. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Start a countdown for one question.
///
/// `cancel` should be a child of the manager's root token so that cleanup
/// stops every countdown at once.
#[must_use]
pub fn spawn_countdown(
    transport: Arc<dyn ChannelTransport>,
    question_id: &str,
    deliveries: Vec<DeliveryRef>,
    message: OutboundMessage,
    deadline: Instant,
    marks: Vec<u64>,
    cancel: CancellationToken,
) -> CountdownHandle {
    let task_cancel = cancel.clone();
    let span = info_span!("countdown", question_id = %question_id);
    tokio::spawn(
        async move {
            for mark in marks {
                let Some(at) = deadline.checked_sub(Duration::from_secs(mark)) else {
                    continue;
                };
                if at <= Instant::now() {
                    continue;
                }
                tokio::select! {
                    () = task_cancel.cancelled() => {
                        debug!("countdown cancelled");
                        return;
                    }
                    () = tokio::time::sleep_until(at) => {}
                }

                let update = message.footed(countdown_footer(mark));
                for delivery in &deliveries {
                    if task_cancel.is_cancelled() {
                        return;
                    }
                    if let Err(err) = transport.edit(delivery, &update).await {
                        warn!(%err, endpoint = %delivery.endpoint, remaining = mark, "countdown edit failed");
                    }
                }
            }
        }
        .instrument(span),
    );

    CountdownHandle { cancel }
}
