//! One-shot, deadline-bounded confirmation exchange with the operator.
//!
//! Lifecycle of a session:
//!
//! ```text
//! idle -> awaiting-reply -> resolved(..) -> acknowledged
//! ```
//!
//! The reply listener, the deadline and process shutdown all race to resolve the
//! same [`DecisionSlot`]; the first caller wins and later calls are no-ops. The
//! listener is stopped, and its shutdown awaited, before the acknowledgement is
//! sent so the operator never sees the ack interleaved with a late callback.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use tokio::{
    sync::{mpsc, oneshot},
    time::{sleep_until, Duration, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    domain::{Operator, SessionId},
    messaging::{
        port::{InboundPort, MessagingPort},
        types::TextMessage,
    },
};

pub const ACCEPT_TOKEN: &str = "/ok";
pub const CANCEL_TOKEN: &str = "/cancel";

const INBOUND_BUFFER: usize = 16;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Deny,
}

/// Interpret an operator message. Anything but the two tokens is not a decision.
pub fn parse_decision(text: &str) -> Option<Decision> {
    // Telegram may send `/ok@botname` in group chats.
    let token = text.trim();
    let token = token.split('@').next().unwrap_or(token).to_lowercase();
    match token.as_str() {
        ACCEPT_TOKEN => Some(Decision::Approve),
        CANCEL_TOKEN => Some(Decision::Deny),
        _ => None,
    }
}

/// How a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    Approved,
    DeniedExplicit,
    DeniedTimeout,
    /// The run was cancelled (process shutdown) while waiting.
    Interrupted,
    /// The report could not be delivered; nothing was awaited.
    Undeliverable,
    /// The reply listener died before any decision arrived.
    ChannelLost,
}

impl Resolution {
    pub fn is_approved(self) -> bool {
        self == Resolution::Approved
    }

    /// Stable name used in logs.
    pub fn kind(self) -> &'static str {
        match self {
            Resolution::Approved => "approved",
            Resolution::DeniedExplicit => "denied-explicit",
            Resolution::DeniedTimeout => "denied-timeout",
            Resolution::Interrupted => "interrupted",
            Resolution::Undeliverable => "undeliverable",
            Resolution::ChannelLost => "channel-lost",
        }
    }

    fn ack_html(self) -> &'static str {
        match self {
            Resolution::Approved => "Accepted ✅",
            Resolution::DeniedExplicit => "Cancelled ❌",
            Resolution::DeniedTimeout => "Cancelled ❌ (no reply before the deadline)",
            Resolution::Interrupted => "Cancelled ❌ (cleaner is shutting down)",
            Resolution::Undeliverable | Resolution::ChannelLost => {
                "Cancelled ❌ (lost connection to the chat)"
            }
        }
    }
}

impl From<Decision> for Resolution {
    fn from(d: Decision) -> Self {
        match d {
            Decision::Approve => Resolution::Approved,
            Decision::Deny => Resolution::DeniedExplicit,
        }
    }
}

/// Write-once outcome slot shared by every event source of a session.
pub struct DecisionSlot {
    tx: Mutex<Option<oneshot::Sender<Resolution>>>,
}

impl DecisionSlot {
    pub fn new() -> (Arc<Self>, oneshot::Receiver<Resolution>) {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Self {
            tx: Mutex::new(Some(tx)),
        });
        (slot, rx)
    }

    /// Record `resolution` if nothing was recorded yet. Returns whether this call won.
    pub fn resolve(&self, resolution: Resolution) -> bool {
        let tx = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match tx {
            Some(tx) => {
                let _ = tx.send(resolution);
                true
            }
            None => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingReply,
    Resolved(Resolution),
    Acknowledged(Resolution),
}

/// One confirmation request and its lifecycle.
#[derive(Debug)]
pub struct ConfirmationSession {
    id: SessionId,
    operator: Operator,
    timeout: Duration,
    /// Set once the report is delivered.
    deadline: Option<Instant>,
    state: SessionState,
}

impl ConfirmationSession {
    fn new(operator: Operator, timeout: Duration) -> Self {
        Self {
            id: SessionId(NEXT_SESSION.fetch_add(1, Ordering::Relaxed)),
            operator,
            timeout,
            deadline: None,
            state: SessionState::Idle,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn resolution(&self) -> Option<Resolution> {
        match self.state {
            SessionState::Resolved(r) | SessionState::Acknowledged(r) => Some(r),
            SessionState::Idle | SessionState::AwaitingReply => None,
        }
    }

    pub fn approved(&self) -> bool {
        self.resolution().is_some_and(Resolution::is_approved)
    }

    /// The operator's window opens only once the report has reached them.
    fn start_waiting(&mut self) -> Instant {
        let deadline = Instant::now() + self.timeout;
        self.deadline = Some(deadline);
        self.transition(SessionState::AwaitingReply);
        deadline
    }

    fn transition(&mut self, next: SessionState) {
        debug!(session = %self.id, from = ?self.state, to = ?next, "confirmation state");
        self.state = next;
    }
}

/// Drives a [`ConfirmationSession`] over the operator channel.
pub struct ConfirmationOrchestrator {
    messenger: Arc<dyn MessagingPort>,
    inbound: Arc<dyn InboundPort>,
    operator: Operator,
    timeout: Duration,
}

impl ConfirmationOrchestrator {
    pub fn new(
        cfg: &Config,
        messenger: Arc<dyn MessagingPort>,
        inbound: Arc<dyn InboundPort>,
    ) -> Self {
        Self {
            messenger,
            inbound,
            operator: cfg.operator,
            timeout: cfg.confirm_timeout,
        }
    }

    /// Send `report_html` and wait for the operator's decision.
    ///
    /// Always returns a resolved session. `shutdown` cancels the wait; the
    /// listener is still stopped cleanly in that case.
    pub async fn request_confirmation(
        &self,
        report_html: &str,
        shutdown: &CancellationToken,
    ) -> ConfirmationSession {
        let mut session = ConfirmationSession::new(self.operator, self.timeout);

        if let Err(e) = self
            .messenger
            .send_html(self.operator.chat_id, report_html)
            .await
        {
            warn!(session = %session.id, error = %e, "report undeliverable; treating as cancelled");
            session.transition(SessionState::Resolved(Resolution::Undeliverable));
            return session;
        }

        let deadline = session.start_waiting();
        info!(
            session = %session.id,
            operator = self.operator.user_id.0,
            timeout_secs = self.timeout.as_secs(),
            "awaiting operator reply"
        );

        let (slot, mut outcome) = DecisionSlot::new();
        let stop = shutdown.child_token();
        let (sink, inbox) = mpsc::channel(INBOUND_BUFFER);

        let listener = tokio::spawn({
            let inbound = self.inbound.clone();
            let stop = stop.clone();
            let slot = slot.clone();
            let id = session.id;
            async move {
                let res = inbound.listen(sink, stop.clone()).await;
                if !stop.is_cancelled() {
                    match &res {
                        Ok(()) => warn!(session = %id, "reply listener ended early"),
                        Err(e) => warn!(session = %id, error = %e, "reply listener failed"),
                    }
                    slot.resolve(Resolution::ChannelLost);
                }
                res
            }
        });
        let interpreter = tokio::spawn(interpret_replies(
            session.id,
            self.operator,
            inbox,
            slot.clone(),
        ));

        let winner = tokio::select! {
            r = &mut outcome => r.ok(),
            _ = sleep_until(deadline) => {
                slot.resolve(Resolution::DeniedTimeout);
                None
            }
            _ = shutdown.cancelled() => {
                slot.resolve(Resolution::Interrupted);
                None
            }
        };
        // A reply may have won the race against the deadline; the slot is the truth.
        let resolution = match winner {
            Some(r) => r,
            None => outcome.await.unwrap_or(Resolution::Interrupted),
        };
        session.transition(SessionState::Resolved(resolution));
        info!(session = %session.id, outcome = resolution.kind(), "confirmation resolved");

        stop.cancel();
        match listener.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(session = %session.id, error = %e, "reply listener stopped with error"),
            Err(e) => warn!(session = %session.id, error = %e, "reply listener task failed"),
        }
        if let Err(e) = interpreter.await {
            warn!(session = %session.id, error = %e, "reply interpreter task failed");
        }
        debug!(session = %session.id, "reply listener stopped");

        if let Err(e) = self
            .messenger
            .send_html(self.operator.chat_id, resolution.ack_html())
            .await
        {
            warn!(session = %session.id, error = %e, "failed to send acknowledgement");
        }
        session.transition(SessionState::Acknowledged(resolution));

        session
    }
}

/// Turn inbound traffic into decisions. Ends when the listener drops its sink.
async fn interpret_replies(
    id: SessionId,
    operator: Operator,
    mut inbox: mpsc::Receiver<TextMessage>,
    slot: Arc<DecisionSlot>,
) {
    while let Some(msg) = inbox.recv().await {
        if msg.user_id != operator.user_id {
            debug!(session = %id, user = msg.user_id.0, "ignoring message from non-operator");
            continue;
        }
        if msg.chat_id != operator.chat_id {
            debug!(session = %id, chat = msg.chat_id.0, "ignoring operator message outside the operator chat");
            continue;
        }
        let Some(decision) = parse_decision(&msg.text) else {
            debug!(session = %id, "ignoring non-decision message from operator");
            continue;
        };
        if slot.resolve(decision.into()) {
            info!(session = %id, decision = ?decision, "operator replied");
        } else {
            debug!(session = %id, decision = ?decision, "late reply ignored; already resolved");
        }
    }
}
