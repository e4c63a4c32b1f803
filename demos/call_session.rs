//! Example: SIP-style call sessions with ring and hangup timeouts.
//!
//! Run with `RUST_LOG=debug TICK_FSM_TICK_INTERVAL=200ms cargo run --example call_session`
//! to see the machine task logs next to the callback output.

use tick_fsm::{
    Event, EventId, FnBehavior, Label, Machine, RuntimeConfig, Signal, State, StateId, spawn,
};

const IDLE: StateId = StateId(1);
const RINGING: StateId = StateId(2);
const TALKING: StateId = StateId(3);
const CLOSED: StateId = StateId(4);

const INVITE: Signal = Signal(1);
const ANSWER: Signal = Signal(2);
const KEEPALIVE: Signal = Signal(3);
const HANGUP: Signal = Signal(4);

const NO_ANSWER: Label = Label(1);
const SESSION_EXPIRED: Label = Label(2);

#[derive(Debug, Clone)]
struct Message {
    from: &'static str,
    body: &'static str,
}

fn logging(state: &'static str) -> FnBehavior<Message> {
    FnBehavior::new()
        .on_entry(move |event: &mut Event, signal, msg: &Message| {
            tracing::info!(
                call = event.nick(),
                %signal,
                from = msg.from,
                body = msg.body,
                "entered {state}"
            );
        })
        .on_timeout(move |label, event: &mut Event| {
            tracing::warn!(call = event.nick(), %label, "timeout in {state}");
            // A session that times out is torn down the next time it moves.
            event.mark_pending_expiry();
        })
}

fn call_graph() -> Machine<Message> {
    let mut machine = Machine::new();
    machine.register_state(
        State::new(IDLE, "idle")
            .with_transition(INVITE, RINGING)
            .with_behavior(logging("idle")),
    );
    machine.register_state(
        State::new(RINGING, "ringing")
            .with_transition(ANSWER, TALKING)
            .with_transition(HANGUP, CLOSED)
            .with_timeout(NO_ANSWER, 5)
            .with_behavior(logging("ringing")),
    );
    machine.register_state(
        State::new(TALKING, "talking")
            .with_self_loop(KEEPALIVE)
            .with_transition(HANGUP, CLOSED)
            .with_timeout(SESSION_EXPIRED, 4)
            .with_behavior(logging("talking")),
    );
    machine.register_state(
        State::new(CLOSED, "closed")
            .fade(true)
            .with_behavior(logging("closed")),
    );
    machine
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::prelude::*;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = RuntimeConfig::from_env()?;
    let tick = config.tick_interval();
    let (handle, task) = spawn(call_graph(), config)?;

    let alice = EventId(1);
    let bob = EventId(2);
    handle.register_event(Event::new(alice, "alice")).await?;
    handle.register_event(Event::new(bob, "bob")).await?;

    let invite = Message {
        from: "proxy",
        body: "INVITE",
    };
    handle.place(alice, IDLE, Signal(0), invite.clone()).await?;
    handle.place(bob, IDLE, Signal(0), invite.clone()).await?;
    let report = handle.broadcast(INVITE, invite).await?;
    tracing::info!(moved = report.moved.len(), "both calls ringing");

    // Alice answers; Bob never does and rings out.
    handle
        .digest(
            alice,
            ANSWER,
            Message {
                from: "alice",
                body: "200 OK",
            },
        )
        .await?;

    for _ in 0..3 {
        tokio::time::sleep(tick * 2).await;
        handle
            .drive(
                alice,
                KEEPALIVE,
                Message {
                    from: "alice",
                    body: "OPTIONS",
                },
            )
            .await?;
    }

    handle
        .digest(
            bob,
            HANGUP,
            Message {
                from: "proxy",
                body: "CANCEL",
            },
        )
        .await?;
    handle
        .digest(
            alice,
            HANGUP,
            Message {
                from: "alice",
                body: "BYE",
            },
        )
        .await?;

    for call in [alice, bob] {
        if let Some(event) = handle.release_event(call).await? {
            tracing::info!(call = event.nick(), lifecycle = ?event.lifecycle(), "released");
        }
    }

    handle.shutdown_graceful();
    let machine = task.await?;
    tracing::info!(tick = machine.current_tick(), "machine stopped");
    Ok(())
}
