//! Tick driver backed by Tokio timers.

use std::pin::Pin;
use std::time::Duration;

use tick_fsm_core::{TickDriver, TickFire};
use tokio::sync::mpsc;
use tokio::time::{Instant, Sleep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerCommand {
    Arm,
    Cancel,
}

/// [`TickDriver`] half handed to the machine.
///
/// Arm and cancel requests are forwarded to the [`TickTimer`] polled by the
/// machine task, so the machine never touches the Tokio timer directly.
#[derive(Debug, Clone)]
pub struct TokioTickDriver {
    commands: mpsc::UnboundedSender<TimerCommand>,
}

impl TokioTickDriver {
    /// Creates a driver and the timer it controls.
    pub(crate) fn new(interval: Duration) -> (Self, TickTimer) {
        let (commands, requests) = mpsc::unbounded_channel();
        let timer = TickTimer {
            requests,
            interval,
            sleep: Box::pin(tokio::time::sleep(interval)),
            armed: false,
            cancelled: false,
            open: true,
        };
        (Self { commands }, timer)
    }
}

impl TickDriver for TokioTickDriver {
    fn arm(&mut self) {
        let _ = self.commands.send(TimerCommand::Arm);
    }

    fn cancel(&mut self) {
        let _ = self.commands.send(TimerCommand::Cancel);
    }
}

/// Single-shot timer owned by the machine task.
///
/// Fires at most once per arm request. Cancelling an armed timer completes it
/// immediately with [`TickFire::Cancelled`], the way an aborted timer wait
/// reports back.
#[derive(Debug)]
pub(crate) struct TickTimer {
    requests: mpsc::UnboundedReceiver<TimerCommand>,
    interval: Duration,
    sleep: Pin<Box<Sleep>>,
    armed: bool,
    cancelled: bool,
    open: bool,
}

impl TickTimer {
    /// Waits for the next firing. Cancel safe: all progress is kept in `self`.
    pub(crate) async fn fired(&mut self) -> TickFire {
        loop {
            tokio::select! {
                () = &mut self.sleep, if self.armed => {
                    self.armed = false;
                    return if std::mem::take(&mut self.cancelled) {
                        TickFire::Cancelled
                    } else {
                        TickFire::Elapsed
                    };
                }
                request = self.requests.recv(), if self.open => match request {
                    Some(TimerCommand::Arm) => {
                        self.armed = true;
                        self.cancelled = false;
                        self.sleep.as_mut().reset(Instant::now() + self.interval);
                    }
                    Some(TimerCommand::Cancel) => {
                        if self.armed {
                            self.cancelled = true;
                            self.sleep.as_mut().reset(Instant::now());
                        }
                    }
                    None => self.open = false,
                },
                else => std::future::pending::<()>().await,
            }
        }
    }
}
