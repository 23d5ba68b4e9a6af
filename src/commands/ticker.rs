// ABOUTME: Long-running per-place ticker driven through activity slots
// ABOUTME: Edits its own message on platforms that support it, otherwise posts each tick

use anyhow::{Context, Result};
use async_trait::async_trait;
use scopebot_core::{
    ActivityHandle, ActivitySlots, Command, CommandHandler, CommandKind, InboundEvent, Message,
    MessageHandle, Outcome, PlatformAdapter, Reply, Scope, UserError,
};
use std::sync::Arc;
use std::time::Duration;

const CATEGORY: &str = "fun";
const DEFAULT_INTERVAL_SECS: u64 = 5;
const DEFAULT_COUNT: u32 = 10;
const MAX_INTERVAL_SECS: u64 = 3600;
const MAX_COUNT: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Start,
    Control(Control),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Stop,
    Pause,
    Resume,
}

fn parse_bounded<T>(raw: Option<&str>, default: T, max: T, what: &str) -> Result<T, UserError>
where
    T: std::str::FromStr + PartialOrd + Default + std::fmt::Display,
{
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.parse::<T>() {
        Ok(value) if value > T::default() && value <= max => Ok(value),
        _ => Err(UserError::InvalidArgument(format!(
            "{} must be a whole number from 1 to {}",
            what, max
        ))),
    }
}

/// Everything a running ticker needs after its command returned
struct TickerRun {
    adapter: Arc<dyn PlatformAdapter>,
    origin: InboundEvent,
    message: MessageHandle,
    slots: Arc<ActivitySlots>,
    place: Scope,
    handle: ActivityHandle,
    interval: Duration,
    count: u32,
}

impl TickerRun {
    async fn run(self) {
        tracing::debug!(place = %self.place, count = self.count, "Ticker started");

        for n in 1..=self.count {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.handle.stopped() => break,
            }
            if !self.handle.checkpoint().await {
                break;
            }

            let reply = Reply::text(format!(
                "Tick {}/{} at {}",
                n,
                self.count,
                chrono::Local::now().format("%H:%M:%S")
            ));
            let delivered = if self.adapter.supports_edit() {
                self.adapter.edit(&self.message, &reply).await
            } else {
                self.adapter.send(&self.origin, &reply, false).await.map(|_| ())
            };
            if let Err(e) = delivered {
                tracing::warn!(place = %self.place, error = %e, "Ticker could not post, stopping");
                break;
            }
        }

        self.slots.finish(&self.place, &self.handle).await;
        tracing::debug!(place = %self.place, "Ticker finished");
    }
}

struct Ticker {
    slots: Arc<ActivitySlots>,
    action: Action,
}

impl Ticker {
    async fn start(&self, msg: &Message) -> Result<Outcome> {
        let interval = match parse_bounded(
            msg.arg(0),
            DEFAULT_INTERVAL_SECS,
            MAX_INTERVAL_SECS,
            "interval",
        ) {
            Ok(secs) => Duration::from_secs(secs),
            Err(e) => return Ok(e.into()),
        };
        let count = match parse_bounded(msg.arg(1), DEFAULT_COUNT, MAX_COUNT, "count") {
            Ok(count) => count,
            Err(e) => return Ok(e.into()),
        };

        let place = msg.logical_scope(None).await?;
        let handle = self.slots.replace(&place).await;

        let adapter = Arc::clone(msg.adapter());
        let origin = msg.event().clone();
        let started = Reply::text(format!(
            "Ticker started: {} ticks every {}s",
            count,
            interval.as_secs()
        ));
        let message = match adapter.send(&origin, &started, false).await {
            Ok(message) => message,
            Err(e) => {
                self.slots.finish(&place, &handle).await;
                return Err(e).context("Failed to post ticker message");
            }
        };

        tokio::spawn(
            TickerRun {
                adapter,
                origin,
                message,
                slots: Arc::clone(&self.slots),
                place,
                handle,
                interval,
                count,
            }
            .run(),
        );

        // The start message above is the reply
        Ok(Outcome::Silent)
    }

    async fn control(&self, msg: &Message, control: Control) -> Result<Outcome> {
        let place = msg.logical_scope(None).await?;
        let (changed, done, idle) = match control {
            Control::Stop => (
                self.slots.stop(&place).await,
                "Ticker stopped",
                "No ticker is running here",
            ),
            Control::Pause => (
                self.slots.pause(&place).await,
                "Ticker paused",
                "No running ticker to pause here",
            ),
            Control::Resume => (
                self.slots.resume(&place).await,
                "Ticker resumed",
                "No paused ticker to resume here",
            ),
        };

        if changed {
            Ok(Outcome::text(done))
        } else {
            Ok(Outcome::user_message(idle))
        }
    }
}

#[async_trait]
impl CommandHandler for Ticker {
    async fn run(&self, msg: &Message) -> Result<Outcome> {
        match self.action {
            Action::Start => self.start(msg).await,
            Action::Control(control) => self.control(msg, control).await,
        }
    }
}

pub fn commands(slots: Arc<ActivitySlots>) -> Vec<Command> {
    let handler = |action| {
        Arc::new(Ticker {
            slots: Arc::clone(&slots),
            action,
        })
    };

    vec![Command::group("ticker", CommandKind::Advanced, CATEGORY)
        .names(&["ticker", "tick"])
        .description("Count ticks in this place")
        .child(
            Command::new("ticker.start", CommandKind::Advanced, CATEGORY, handler(Action::Start))
                .names(&["start"])
                .description("Start a ticker, replacing any running one here")
                .usage("[seconds] [count]")
                .parent("ticker"),
        )
        .child(
            Command::new(
                "ticker.stop",
                CommandKind::Advanced,
                CATEGORY,
                handler(Action::Control(Control::Stop)),
            )
            .names(&["stop"])
            .description("Stop the ticker here")
            .parent("ticker"),
        )
        .child(
            Command::new(
                "ticker.pause",
                CommandKind::Advanced,
                CATEGORY,
                handler(Action::Control(Control::Pause)),
            )
            .names(&["pause"])
            .description("Pause the ticker here")
            .parent("ticker"),
        )
        .child(
            Command::new(
                "ticker.resume",
                CommandKind::Advanced,
                CATEGORY,
                handler(Action::Control(Control::Resume)),
            )
            .names(&["resume"])
            .description("Resume a paused ticker here")
            .parent("ticker"),
        )]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bounded_defaults() {
        assert_eq!(parse_bounded(None, 5u64, 10, "interval"), Ok(5));
        assert_eq!(parse_bounded(Some("7"), 5u64, 10, "interval"), Ok(7));
        assert_eq!(parse_bounded(Some("10"), 5u64, 10, "interval"), Ok(10));
    }

    #[test]
    fn test_parse_bounded_rejects() {
        for bad in ["0", "11", "-1", "soon", "1.5"] {
            let err = parse_bounded(Some(bad), 5u32, 10, "count").unwrap_err();
            assert_eq!(
                err,
                UserError::InvalidArgument("count must be a whole number from 1 to 10".into())
            );
        }
    }
}
