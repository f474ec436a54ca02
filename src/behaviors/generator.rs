use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::component::{ComponentBehavior, ComponentContext};
use crate::config::parse_duration_value;
use crate::error::AppResult;
use crate::events::actions;
use crate::execution::ScheduledTask;
use crate::sync::lock;
use crate::terminal::{Signature, Terminal, TerminalMessage, ValueType};

const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Sends `{ "seq": n, "failed": bool, "sentAt": micros }` on its output once
/// per interval while the canvas runs. Every `failEvery`-th message is flagged
/// as failed.
pub struct Generator {
    context: ComponentContext,
    output: Arc<Terminal>,
    interval: Duration,
    fail_every: u64,
    sent: Arc<AtomicU64>,
    ticker: Mutex<Option<ScheduledTask>>,
}

impl Generator {
    pub const TYPE: &'static str = "generator";
    pub const OUTPUT: &'static str = "output";
    pub const INTERVAL_ATTRIBUTE: &'static str = "interval";
    pub const FAIL_EVERY_ATTRIBUTE: &'static str = "failEvery";
    /// Send time in microseconds since the Unix epoch.
    pub const SENT_AT: &'static str = "sentAt";

    /// # Errors
    ///
    /// Returns an error when the output terminal cannot be created or the
    /// interval attribute is malformed.
    pub fn new(context: &ComponentContext) -> AppResult<Self> {
        let output = context.create_output(Self::OUTPUT, "Generated messages")?;
        let mut signature = Signature::new();
        signature.insert("seq".to_owned(), ValueType::Integer);
        signature.insert("failed".to_owned(), ValueType::Bool);
        signature.insert(Self::SENT_AT.to_owned(), ValueType::Integer);
        output.set_signature(signature)?;

        let interval = match context.attribute(Self::INTERVAL_ATTRIBUTE) {
            Some(value) => parse_duration_value(&value)?,
            None => DEFAULT_INTERVAL,
        };
        let fail_every = context
            .attribute(Self::FAIL_EVERY_ATTRIBUTE)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .unwrap_or(0);

        Ok(Self {
            context: context.clone(),
            output,
            interval,
            fail_every,
            sent: Arc::new(AtomicU64::new(0)),
            ticker: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }

    fn start_ticking(&self) {
        let scheduler = match self.context.scheduler() {
            Ok(scheduler) => scheduler,
            Err(err) => {
                warn!("Generator {} cannot start: {}", self.context.id(), err);
                return;
            }
        };
        let context = self.context.clone();
        let output = Arc::clone(&self.output);
        let sent = Arc::clone(&self.sent);
        let fail_every = self.fail_every;
        let ticker = scheduler.schedule_at_fixed_rate(self.interval, move || {
            let seq = sent.fetch_add(1, Ordering::SeqCst).saturating_add(1);
            let failed = seq.checked_rem(fail_every) == Some(0);
            let message = TerminalMessage::new()
                .with("seq", seq)
                .with("failed", failed)
                .with(Self::SENT_AT, Utc::now().timestamp_micros());
            if let Err(err) = context.send(&output, &message) {
                debug!("Generator {} dropped message {}: {}", context.id(), seq, err);
            }
        });
        *lock(&self.ticker) = Some(ticker);
    }

    fn stop_ticking(&self) {
        if let Some(ticker) = lock(&self.ticker).take() {
            ticker.cancel();
        }
    }
}

impl ComponentBehavior for Generator {
    fn on_action(&self, action: &str) {
        match action {
            actions::START => {
                self.stop_ticking();
                self.sent.store(0, Ordering::SeqCst);
                self.start_ticking();
            }
            actions::STOP | actions::CANCEL => self.stop_ticking(),
            _ => {}
        }
    }

    fn on_release(&self) {
        self.stop_ticking();
    }
}
