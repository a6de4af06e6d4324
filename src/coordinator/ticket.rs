//! Change tickets: the per-transaction promise handed back to requesters.

use crate::context::survey::SurveyOutcome;
use crate::coordinator::ResponseCallback;
use crate::error::ContextError;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

/// Settles with the outcome of the transaction a request joined.
///
/// A ticket can be polled without a runtime ([`try_verdict`](Self::try_verdict)) or
/// awaited ([`verdict`](Self::verdict)) when a subscriber deferred its answer.
#[derive(Debug)]
pub struct ChangeTicket {
    receiver: Option<oneshot::Receiver<SurveyOutcome>>,
    settled: Option<SurveyOutcome>,
}

impl ChangeTicket {
    /// A ticket plus the callback that settles it.
    pub(crate) fn pair() -> (Self, ResponseCallback) {
        let (sender, receiver) = oneshot::channel();
        let ticket = Self {
            receiver: Some(receiver),
            settled: None,
        };
        let callback: ResponseCallback = Box::new(move |outcome| {
            // The requester may have dropped its ticket; nothing to report then.
            let _ = sender.send(outcome);
        });
        (ticket, callback)
    }

    /// A ticket that is already settled.
    pub fn settled(outcome: SurveyOutcome) -> Self {
        Self {
            receiver: None,
            settled: Some(outcome),
        }
    }

    /// The outcome, if the transaction has been decided.
    pub fn try_verdict(&mut self) -> Option<SurveyOutcome> {
        if self.settled.is_none() {
            if let Some(receiver) = self.receiver.as_mut() {
                match receiver.try_recv() {
                    Ok(outcome) => {
                        self.settled = Some(outcome);
                        self.receiver = None;
                    }
                    Err(TryRecvError::Empty) => {}
                    Err(TryRecvError::Closed) => self.receiver = None,
                }
            }
        }
        self.settled.clone()
    }

    pub fn is_settled(&mut self) -> bool {
        self.try_verdict().is_some()
    }

    /// Wait for the outcome. Fails if the transaction was abandoned before a
    /// verdict could be delivered.
    pub async fn verdict(mut self) -> Result<SurveyOutcome, ContextError> {
        if let Some(outcome) = self.settled.take() {
            return Ok(outcome);
        }
        match self.receiver.take() {
            Some(receiver) => receiver.await.map_err(|_| ContextError::TicketAbandoned),
            None => Err(ContextError::TicketAbandoned),
        }
    }
}
