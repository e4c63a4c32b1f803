use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use tick_fsm::{Event, EventId, Machine, RuntimeConfig, Signal, State, StateId, spawn};
use tokio::runtime::Runtime;

const EVENTS: u32 = 1000;

// Two states bouncing events back and forth, each with a timeout.
fn ping_pong() -> Machine<u64> {
    let mut machine = Machine::new();
    machine.register_state(
        State::new(1, "ping")
            .with_transition(1, 2)
            .with_self_loop(3)
            .with_timeout(1, 5),
    );
    machine.register_state(State::new(2, "pong").with_transition(2, 1).with_timeout(2, 5));
    for id in 0..EVENTS {
        machine.register_event(Event::new(id, ""));
        let _ = machine.place(EventId(id), StateId(1), Signal(0), &0);
    }
    machine
}

fn benchmark_digest(c: &mut Criterion) {
    c.bench_function("digest_1000_events_round_trip", |b| {
        b.iter_batched(
            ping_pong,
            |mut machine| {
                for id in 0..EVENTS {
                    machine.digest(EventId(id), Signal(1), &1).unwrap();
                    machine.digest(EventId(id), Signal(2), &2).unwrap();
                }
                machine
            },
            BatchSize::SmallInput,
        )
    });

    c.bench_function("drive_self_loop_1000_events", |b| {
        b.iter_batched(
            ping_pong,
            |mut machine| {
                for id in 0..EVENTS {
                    machine.drive(EventId(id), Signal(3), &3).unwrap();
                }
                machine
            },
            BatchSize::SmallInput,
        )
    });
}

fn benchmark_tick(c: &mut Criterion) {
    c.bench_function("tick_1000_resident_timeouts", |b| {
        b.iter_batched(
            ping_pong,
            |mut machine| {
                for _ in 0..10 {
                    machine.tick();
                }
                machine
            },
            BatchSize::SmallInput,
        )
    });
}

fn benchmark_runtime(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("runtime_digest_1000_requests", |b| {
        b.to_async(&rt).iter(|| async {
            let (handle, task) = spawn(ping_pong(), RuntimeConfig::new()).unwrap();

            for id in 0..EVENTS {
                handle.digest(EventId(id), Signal(1), 1).await.unwrap();
            }

            handle.shutdown_immediate();
            task.await.unwrap();
        })
    });
}

criterion_group!(benches, benchmark_digest, benchmark_tick, benchmark_runtime);
criterion_main!(benches);
