//! Tokio runtime for a [`Machine`].
//!
//! [`spawn`] moves the machine into a background task that owns it
//! exclusively. Signals, registrations and clock ticks are all processed by
//! that one task, one at a time, so no operation ever interleaves with another
//! or with a state callback.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tick_fsm_core::{
    BroadcastReport, Event, EventId, FsmError, Machine, Signal, State, StateId, Tick,
};
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::RuntimeConfig;
use crate::driver::{TickTimer, TokioTickDriver};
use crate::error::{ConfigError, HandleError, TaskError};

/// Shutdown mode for the machine task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Process every command already queued, then stop and return the
    /// machine.
    Graceful,
    /// Stop right away, dropping queued commands.
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Digest,
    Drive,
}

type Reply<T> = oneshot::Sender<T>;
type Inspector<P> = Box<dyn FnOnce(&mut Machine<P>) + Send>;

enum Command<P> {
    RegisterState(State<P>),
    RegisterEvent(Event),
    Place {
        event: EventId,
        state: StateId,
        signal: Signal,
        payload: P,
        reply: Reply<Result<(), FsmError>>,
    },
    Deliver {
        delivery: Delivery,
        event: EventId,
        signal: Signal,
        payload: P,
        reply: Reply<Result<(), FsmError>>,
    },
    Broadcast {
        signal: Signal,
        payload: P,
        reply: Reply<BroadcastReport>,
    },
    Release {
        event: EventId,
        reply: Reply<Option<Event>>,
    },
    MarkPendingExpiry(EventId),
    MarkActive(EventId),
    Stop,
    Inspect(Inspector<P>),
}

/// Starts `machine` on the current Tokio runtime.
///
/// The machine gets a Tokio tick driver firing every
/// [`RuntimeConfig::tick_interval`]; the first tick is armed immediately.
///
/// # Panics
///
/// Panics if called outside of a Tokio runtime.
pub fn spawn<P>(
    mut machine: Machine<P>,
    config: RuntimeConfig,
) -> Result<(MachineHandle<P>, MachineTask<P>), ConfigError>
where
    P: Send + 'static,
{
    config.validate()?;

    let (command_tx, command_rx) = mpsc::channel(config.channel_size());
    let (shutdown_tx, shutdown_rx) = watch::channel(None);
    let (driver, timer) = TokioTickDriver::new(config.tick_interval());
    machine.attach_driver(driver);

    tracing::debug!(
        tick_interval = ?config.tick_interval(),
        channel_size = config.channel_size(),
        "spawning machine task"
    );
    let handle = tokio::spawn(run(machine, timer, command_rx, shutdown_rx));

    Ok((
        MachineHandle {
            commands: command_tx,
            shutdown_tx: Arc::new(shutdown_tx),
        },
        MachineTask { handle },
    ))
}

async fn run<P>(
    mut machine: Machine<P>,
    mut timer: TickTimer,
    mut commands: mpsc::Receiver<Command<P>>,
    mut shutdown: watch::Receiver<Option<ShutdownMode>>,
) -> Machine<P> {
    loop {
        tokio::select! {
            fire = timer.fired() => {
                machine.handle_tick(fire);
            }
            Ok(()) = shutdown.changed() => {
                let mode = *shutdown.borrow();
                match mode {
                    Some(ShutdownMode::Immediate) => break,
                    Some(ShutdownMode::Graceful) => {
                        while let Ok(command) = commands.try_recv() {
                            apply(&mut machine, command);
                        }
                        break;
                    }
                    None => {}
                }
            }
            command = commands.recv() => {
                let Some(command) = command else { break };
                apply(&mut machine, command);
            }
        }
    }

    tracing::debug!(tick = machine.current_tick(), "machine task finished");
    machine
}

fn apply<P>(machine: &mut Machine<P>, command: Command<P>) {
    match command {
        Command::RegisterState(state) => {
            machine.register_state(state);
        }
        Command::RegisterEvent(event) => {
            machine.register_event(event);
        }
        Command::Place {
            event,
            state,
            signal,
            payload,
            reply,
        } => {
            let _ = reply.send(machine.place(event, state, signal, &payload));
        }
        Command::Deliver {
            delivery,
            event,
            signal,
            payload,
            reply,
        } => {
            let result = match delivery {
                Delivery::Digest => machine.digest(event, signal, &payload),
                Delivery::Drive => machine.drive(event, signal, &payload),
            };
            let _ = reply.send(result);
        }
        Command::Broadcast {
            signal,
            payload,
            reply,
        } => {
            let _ = reply.send(machine.broadcast(signal, &payload));
        }
        Command::Release { event, reply } => {
            let _ = reply.send(machine.release_event(event));
        }
        Command::MarkPendingExpiry(event) => machine.mark_event_pending_expiry(event),
        Command::MarkActive(event) => machine.mark_event_active(event),
        Command::Stop => machine.stop(),
        Command::Inspect(inspect) => inspect(machine),
    }
}

/// Cloneable handle for talking to a spawned machine.
///
/// Requests are queued in order. Those returning a value wait for the machine
/// task to process them; the others return once queued.
pub struct MachineHandle<P> {
    commands: mpsc::Sender<Command<P>>,
    shutdown_tx: Arc<watch::Sender<Option<ShutdownMode>>>,
}

impl<P> Clone for MachineHandle<P> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            shutdown_tx: Arc::clone(&self.shutdown_tx),
        }
    }
}

impl<P> std::fmt::Debug for MachineHandle<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineHandle")
            .field("closed", &self.commands.is_closed())
            .finish_non_exhaustive()
    }
}

impl<P: Send + 'static> MachineHandle<P> {
    /// Registers a state; see [`Machine::register_state`].
    pub async fn register_state(&self, state: State<P>) -> Result<(), HandleError> {
        self.send(Command::RegisterState(state)).await
    }

    /// Registers an event; see [`Machine::register_event`].
    pub async fn register_event(&self, event: Event) -> Result<(), HandleError> {
        self.send(Command::RegisterEvent(event)).await
    }

    /// Places a registered event into its first state.
    pub async fn place(
        &self,
        event: EventId,
        state: StateId,
        signal: Signal,
        payload: P,
    ) -> Result<(), HandleError> {
        self.request(|reply| Command::Place {
            event,
            state,
            signal,
            payload,
            reply,
        })
        .await??;
        Ok(())
    }

    /// See [`Machine::digest`].
    pub async fn digest(&self, event: EventId, signal: Signal, payload: P) -> Result<(), HandleError> {
        self.deliver(Delivery::Digest, event, signal, payload).await
    }

    /// See [`Machine::drive`].
    pub async fn drive(&self, event: EventId, signal: Signal, payload: P) -> Result<(), HandleError> {
        self.deliver(Delivery::Drive, event, signal, payload).await
    }

    /// See [`Machine::broadcast`].
    pub async fn broadcast(&self, signal: Signal, payload: P) -> Result<BroadcastReport, HandleError> {
        self.request(|reply| Command::Broadcast {
            signal,
            payload,
            reply,
        })
        .await
    }

    /// Releases an event, returning it if it was registered.
    pub async fn release_event(&self, event: EventId) -> Result<Option<Event>, HandleError> {
        self.request(|reply| Command::Release { event, reply }).await
    }

    /// See [`Machine::mark_event_pending_expiry`].
    pub async fn mark_event_pending_expiry(&self, event: EventId) -> Result<(), HandleError> {
        self.send(Command::MarkPendingExpiry(event)).await
    }

    /// See [`Machine::mark_event_active`].
    pub async fn mark_event_active(&self, event: EventId) -> Result<(), HandleError> {
        self.send(Command::MarkActive(event)).await
    }

    /// Stops the machine clock. The task keeps serving requests.
    pub async fn stop(&self) -> Result<(), HandleError> {
        self.send(Command::Stop).await
    }

    /// Runs `f` against the machine inside the machine task.
    ///
    /// ```rust,no_run
    /// # async fn demo(handle: tick_fsm::MachineHandle<()>) -> Result<(), tick_fsm::HandleError> {
    /// use tick_fsm::StateId;
    ///
    /// let residents = handle
    ///     .inspect(|machine| machine.residents(StateId(1)).map(<[_]>::to_vec))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn inspect<R>(
        &self,
        f: impl FnOnce(&mut Machine<P>) -> R + Send + 'static,
    ) -> Result<R, HandleError>
    where
        R: Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        self.send(Command::Inspect(Box::new(move |machine| {
            let _ = reply.send(f(machine));
        })))
        .await?;
        response.await.map_err(|_| HandleError::Closed)
    }

    /// Number of ticks the machine has processed.
    pub async fn current_tick(&self) -> Result<Tick, HandleError> {
        self.inspect(|machine| machine.current_tick()).await
    }

    /// Initiates a graceful shutdown. Queued requests are processed first.
    pub fn shutdown_graceful(&self) {
        let _ = self.shutdown_tx.send(Some(ShutdownMode::Graceful));
    }

    /// Initiates an immediate shutdown. Queued requests are dropped.
    pub fn shutdown_immediate(&self) {
        let _ = self.shutdown_tx.send(Some(ShutdownMode::Immediate));
    }

    async fn deliver(
        &self,
        delivery: Delivery,
        event: EventId,
        signal: Signal,
        payload: P,
    ) -> Result<(), HandleError> {
        self.request(|reply| Command::Deliver {
            delivery,
            event,
            signal,
            payload,
            reply,
        })
        .await??;
        Ok(())
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command<P>,
    ) -> Result<T, HandleError> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply)).await?;
        response.await.map_err(|_| HandleError::Closed)
    }

    async fn send(&self, command: Command<P>) -> Result<(), HandleError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| HandleError::Closed)
    }
}

/// The spawned machine task.
///
/// Resolves to the machine once the task exits, either after a shutdown
/// request or when every [`MachineHandle`] has been dropped.
#[derive(Debug)]
pub struct MachineTask<P> {
    handle: tokio::task::JoinHandle<Machine<P>>,
}

impl<P> MachineTask<P> {
    /// Aborts the task. Awaiting it afterwards yields [`TaskError::Join`].
    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl<P> Future for MachineTask<P> {
    type Output = Result<Machine<P>, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Ready(Ok(machine)) => Poll::Ready(Ok(machine)),
            Poll::Ready(Err(e)) => Poll::Ready(Err(TaskError::Join(e))),
            Poll::Pending => Poll::Pending,
        }
    }
}
