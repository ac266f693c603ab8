use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, ready};

use futures::future::FusedFuture;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::result::{ProofResult, ProofStatus};

/// Caller-chosen identity used to correlate a result with its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The handshake context a proof is delivered to.
///
/// Called at most once per request, on whatever thread the signing backend
/// completed on.
pub trait ProofConsumer: Send + Sync {
    fn on_proof(&self, id: RequestId, result: ProofResult);
}

/// What happened when a sink was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The receiving context was already gone; the result was dropped.
    Discarded,
}

enum Target {
    Consumer(Weak<dyn ProofConsumer>),
    Channel(oneshot::Sender<ProofResult>),
}

/// Single-use delivery target for one `get_proof` call.
///
/// [`deliver`](Self::deliver) consumes the sink, so a result can be handed
/// over at most once. A sink dropped without delivery hands over a
/// `signing-unavailable` failure instead, so the receiver always hears back.
pub struct ProofCompletionSink {
    id: RequestId,
    target: Option<Target>,
}

impl ProofCompletionSink {
    /// Deliver to a handshake context without keeping it alive.
    pub fn to_consumer<C>(id: RequestId, consumer: &Arc<C>) -> Self
    where
        C: ProofConsumer + 'static,
    {
        let weak: Weak<dyn ProofConsumer> = Arc::downgrade(consumer) as Weak<dyn ProofConsumer>;
        Self::from_weak(id, weak)
    }

    pub fn from_weak(id: RequestId, consumer: Weak<dyn ProofConsumer>) -> Self {
        Self {
            id,
            target: Some(Target::Consumer(consumer)),
        }
    }

    /// Deliver through a oneshot channel. Dropping the receiver cancels.
    pub fn channel(id: RequestId) -> (Self, ProofReceiver) {
        let (tx, rx) = oneshot::channel();
        let sink = Self {
            id,
            target: Some(Target::Channel(tx)),
        };
        (sink, ProofReceiver { id, rx: Some(rx) })
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Whether anyone is still waiting for this result.
    ///
    /// Advisory only: the context may go away right after this returns, and
    /// `deliver` checks again.
    pub fn is_live(&self) -> bool {
        match &self.target {
            Some(Target::Consumer(weak)) => weak.strong_count() > 0,
            Some(Target::Channel(tx)) => !tx.is_closed(),
            None => false,
        }
    }

    pub fn deliver(mut self, result: ProofResult) -> Delivery {
        self.settle(result)
    }

    fn settle(&mut self, result: ProofResult) -> Delivery {
        let status = result.status();
        let delivery = match self.target.take() {
            Some(Target::Consumer(weak)) => match weak.upgrade() {
                Some(consumer) => {
                    consumer.on_proof(self.id, result);
                    Delivery::Delivered
                }
                None => Delivery::Discarded,
            },
            Some(Target::Channel(tx)) => match tx.send(result) {
                Ok(()) => Delivery::Delivered,
                Err(_) => Delivery::Discarded,
            },
            None => Delivery::Discarded,
        };
        if delivery == Delivery::Discarded {
            debug!(request = %self.id, %status, "handshake context gone, proof discarded");
        }
        delivery
    }
}

impl Drop for ProofCompletionSink {
    fn drop(&mut self) {
        if self.target.is_some() {
            warn!(request = %self.id, "proof sink dropped without delivery");
            self.settle(ProofResult::failure(ProofStatus::SigningUnavailable));
        }
    }
}

impl std::fmt::Debug for ProofCompletionSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofCompletionSink")
            .field("id", &self.id)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Receiving half of [`ProofCompletionSink::channel`].
///
/// Yields the result once. After that `try_recv` returns `None` and the
/// future stays pending; [`FusedFuture::is_terminated`] reports whether the
/// result has been taken.
#[derive(Debug)]
pub struct ProofReceiver {
    id: RequestId,
    rx: Option<oneshot::Receiver<ProofResult>>,
}

impl ProofReceiver {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Returns the result if the sink has already been settled and the
    /// result has not been taken yet.
    pub fn try_recv(&mut self) -> Option<ProofResult> {
        let received = match self.rx.as_mut()?.try_recv() {
            Ok(result) => result,
            Err(oneshot::error::TryRecvError::Empty) => return None,
            Err(oneshot::error::TryRecvError::Closed) => {
                ProofResult::failure(ProofStatus::SigningUnavailable)
            }
        };
        self.rx = None;
        Some(received)
    }
}

impl Future for ProofReceiver {
    type Output = ProofResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Pending;
        };
        let result = ready!(Pin::new(rx).poll(cx))
            .unwrap_or_else(|_| ProofResult::failure(ProofStatus::SigningUnavailable));
        self.rx = None;
        Poll::Ready(result)
    }
}

impl FusedFuture for ProofReceiver {
    fn is_terminated(&self) -> bool {
        self.rx.is_none()
    }
}
