use std::rc::{Rc, Weak};

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use pprof::criterion::{Output, PProfProfiler};

use observable_ptr::{Observable, Observer};

#[derive(Default)]
struct Payload {
    counter: i32,
    _rest: [i64; 5],
}

const SIZES: [usize; 3] = [1_000, 10_000, 100_000];

fn bench_create(c: &mut Criterion) {
    for size in SIZES {
        c.bench_with_input(BenchmarkId::new("noop", size), &size, |b, &s| {
            b.iter_batched(
                || Vec::<()>::with_capacity(s),
                |mut v| {
                    for _ in 0..s {
                        v.push(black_box(()));
                    }
                    v
                },
                BatchSize::LargeInput,
            )
        });

        c.bench_with_input(BenchmarkId::new("Box::new", size), &size, |b, &s| {
            b.iter_batched(
                || Vec::with_capacity(s),
                |mut v| {
                    for _ in 0..s {
                        v.push(Box::new(Payload::default()));
                    }
                    v
                },
                BatchSize::LargeInput,
            )
        });

        c.bench_with_input(BenchmarkId::new("Rc::new", size), &size, |b, &s| {
            b.iter_batched(
                || Vec::with_capacity(s),
                |mut v| {
                    for _ in 0..s {
                        v.push(Rc::new(Payload::default()));
                    }
                    v
                },
                BatchSize::LargeInput,
            )
        });

        c.bench_with_input(BenchmarkId::new("Observable::new", size), &size, |b, &s| {
            b.iter_batched(
                || Vec::with_capacity(s),
                |mut v| {
                    for _ in 0..s {
                        v.push(Observable::new(Payload::default()));
                    }
                    v
                },
                BatchSize::LargeInput,
            )
        });
    }
}

fn bench_attach(c: &mut Criterion) {
    for size in SIZES {
        let shared: Vec<_> = (0..size).map(|_| Rc::new(Payload::default())).collect();
        let owners: Vec<_> = (0..size).map(|_| Observable::new(Payload::default())).collect();

        c.bench_with_input(BenchmarkId::new("Rc::downgrade", size), &size, |b, &s| {
            b.iter_batched(
                || Vec::with_capacity(s),
                |mut v| {
                    for rc in &shared {
                        v.push(Rc::downgrade(rc));
                    }
                    v
                },
                BatchSize::LargeInput,
            )
        });

        c.bench_with_input(BenchmarkId::new("Observer::from", size), &size, |b, &s| {
            b.iter_batched(
                || Vec::with_capacity(s),
                |mut v| {
                    for owner in &owners {
                        v.push(Observer::from(owner));
                    }
                    v
                },
                BatchSize::LargeInput,
            )
        });
    }
}

fn bench_read(c: &mut Criterion) {
    for size in SIZES {
        let shared: Vec<_> = (0..size).map(|_| Rc::new(Payload::default())).collect();
        let weak: Vec<Weak<_>> = shared.iter().map(Rc::downgrade).collect();
        let owners: Vec<_> = (0..size).map(|_| Observable::new(Payload::default())).collect();
        let observers: Vec<_> = owners.iter().map(Observable::observe).collect();

        c.bench_with_input(BenchmarkId::new("Weak::upgrade", size), &size, |b, _| {
            b.iter(|| {
                let mut sum = 0;
                for w in &weak {
                    if let Some(rc) = w.upgrade() {
                        sum += rc.counter;
                    }
                }
                black_box(sum)
            })
        });

        c.bench_with_input(BenchmarkId::new("Observer::try_borrow", size), &size, |b, _| {
            b.iter(|| {
                let mut sum = 0;
                for o in &observers {
                    if let Some(value) = o.try_borrow() {
                        sum += value.counter;
                    }
                }
                black_box(sum)
            })
        });
    }
}

fn bench_destroy(c: &mut Criterion) {
    for size in SIZES {
        c.bench_with_input(BenchmarkId::new("drop Rc + Weak", size), &size, |b, &s| {
            b.iter_batched(
                || {
                    let shared: Vec<_> = (0..s).map(|_| Rc::new(Payload::default())).collect();
                    let weak: Vec<_> = shared.iter().map(Rc::downgrade).collect();
                    (shared, weak)
                },
                |(shared, weak)| {
                    drop(shared);
                    black_box(weak)
                },
                BatchSize::LargeInput,
            )
        });

        c.bench_with_input(
            BenchmarkId::new("drop Observable + Observer", size),
            &size,
            |b, &s| {
                b.iter_batched(
                    || {
                        let owners: Vec<_> =
                            (0..s).map(|_| Observable::new(Payload::default())).collect();
                        let observers: Vec<_> = owners.iter().map(Observable::observe).collect();
                        (owners, observers)
                    },
                    |(owners, observers)| {
                        drop(owners);
                        black_box(observers)
                    },
                    BatchSize::LargeInput,
                )
            },
        );

        c.bench_with_input(BenchmarkId::new("drop many observers", size), &size, |b, &s| {
            b.iter_batched(
                || {
                    let owner = Observable::new(Payload::default());
                    let observers: Vec<_> = (0..s).map(|_| owner.observe()).collect();
                    (owner, observers)
                },
                |(owner, observers)| {
                    black_box(owner.observer_count());
                    drop(owner);
                    black_box(observers)
                },
                BatchSize::LargeInput,
            )
        });
    }
}

fn profiled() -> Criterion {
    Criterion::default().with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)))
}

criterion_group! {
    name = benches;
    config = profiled();
    targets = bench_create, bench_attach, bench_read, bench_destroy
}
criterion_main!(benches);
