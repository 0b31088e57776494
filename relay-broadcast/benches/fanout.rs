use std::thread;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use relay_broadcast::Relay;
use relay_log::{Level, LogConfig};

const MESSAGES: u64 = 1_000;

/// Spawns one reader thread per listener that counts the received values.
fn spawn_readers(
    relay: &Relay<u64>,
    listeners: usize,
    capacity: usize,
) -> Vec<thread::JoinHandle<u64>> {
    (0..listeners)
        .map(|_| {
            let listener = relay.listener(capacity);
            thread::spawn(move || listener.into_iter().count() as u64)
        })
        .collect()
}

fn bench_notify(c: &mut Criterion) {
    relay_log::init(&LogConfig {
        level: Level::Error,
        ..Default::default()
    });

    let mut group = c.benchmark_group("notify");
    group.throughput(Throughput::Elements(MESSAGES));

    for listeners in [1, 4, 16] {
        for capacity in [0, 64] {
            group.bench_with_input(
                BenchmarkId::new(format!("capacity_{capacity}"), listeners),
                &listeners,
                |b, &listeners| {
                    b.iter(|| {
                        let relay = Relay::new();
                        let readers = spawn_readers(&relay, listeners, capacity);

                        for i in 0..MESSAGES {
                            relay.notify(i);
                        }
                        relay.close();

                        for reader in readers {
                            assert_eq!(reader.join().unwrap(), MESSAGES);
                        }
                    })
                },
            );
        }
    }

    group.finish();
}

fn bench_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast");
    group.throughput(Throughput::Elements(MESSAGES));

    for listeners in [1, 4, 16] {
        group.bench_with_input(
            BenchmarkId::from_parameter(listeners),
            &listeners,
            |b, &listeners| {
                b.iter(|| {
                    let relay = Relay::new();
                    let readers = spawn_readers(&relay, listeners, 64);

                    for i in 0..MESSAGES {
                        relay.broadcast(i);
                    }
                    relay.close();

                    for reader in readers {
                        reader.join().unwrap();
                    }
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_notify, bench_broadcast);
criterion_main!(benches);
