// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;
use std::time::Instant;

use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;

use vcp::timer::TimerTable;
use vcp::Timer;
use vcp::TimerKey;
use vcp::TimerQueue;

const RANGE: u64 = 10_000;

pub fn time_remaining_benchmark_with_same_owner(c: &mut Criterion) {
    let mut tq = TimerQueue::new();
    let now = Instant::now();
    for i in 0..RANGE {
        tq.add(TimerKey::new(0, Timer::Pacing), Duration::from_millis(i), now);
    }
    c.bench_function("timer queue remaining, one owner", |b| {
        b.iter(|| tq.time_remaining(Instant::now()))
    });
}

pub fn time_remaining_benchmark_with_diff_owner(c: &mut Criterion) {
    let mut tq = TimerQueue::new();
    let now = Instant::now();
    for i in 0..RANGE {
        tq.add(TimerKey::new(i, Timer::Pacing), Duration::from_millis(i), now);
        tq.add(
            TimerKey::new(i, Timer::HoldDownFirst),
            Duration::from_millis(i + 200),
            now,
        );
    }
    c.bench_function("timer queue remaining, many owners", |b| {
        b.iter(|| tq.time_remaining(Instant::now()))
    });

    let mut tables = vec![TimerTable::default(); RANGE as usize];
    for (i, t) in tables.iter_mut().enumerate() {
        t.set_after(Timer::Pacing, now, Duration::from_millis(i as u64));
        t.set_after(Timer::HoldDownFirst, now, Duration::from_millis(i as u64 + 200));
    }
    c.bench_function("timer table scan, many owners", |b| {
        b.iter(|| tables.iter().filter_map(|t| t.next_timeout()).min())
    });
}

pub fn time_expired_benchmark(c: &mut Criterion) {
    c.bench_function("timer queue expire and rearm", |b| {
        let mut tq = TimerQueue::new();
        let now = Instant::now();
        for i in 0..RANGE {
            tq.add(TimerKey::new(i, Timer::Pacing), Duration::ZERO, now);
        }
        b.iter(|| {
            if let Some(key) = tq.next_expire(Instant::now()) {
                tq.add(key, Duration::ZERO, now);
            }
        })
    });
}

pub fn del_owner_benchmark(c: &mut Criterion) {
    c.bench_function("timer queue del owner", |b| {
        let mut tq = TimerQueue::new();
        let now = Instant::now();
        for i in 0..RANGE {
            tq.add(TimerKey::new(i, Timer::Pacing), Duration::from_millis(i), now);
        }
        let mut owner = 0;
        b.iter(|| {
            tq.del_owner(owner % RANGE);
            tq.add(
                TimerKey::new(owner % RANGE, Timer::Pacing),
                Duration::from_millis(owner % RANGE),
                now,
            );
            owner += 1;
        })
    });
}

criterion_group!(
    benches,
    time_remaining_benchmark_with_same_owner,
    time_remaining_benchmark_with_diff_owner,
    time_expired_benchmark,
    del_owner_benchmark,
);
criterion_main!(benches);
