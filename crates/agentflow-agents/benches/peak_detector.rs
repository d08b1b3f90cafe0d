//! Peak detector throughput
//!
//! Measures `receive` over batches of hourly samples spread across groups.

use agentflow_agents::{Agent, Detection, PeakDetectorAgent, PeakDetectorOptions};
use agentflow_common::{from_timestamp, AgentId, Memory, Message};
use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

const BASE: i64 = 1_700_000_000;

fn batch(size: usize, groups: usize) -> Vec<Message> {
    (0..size)
        .map(|i| {
            let value = if i % 97 == 0 { 50.0 } else { (i % 7) as f64 };
            Message::from_value(
                AgentId::from("sensor"),
                json!({"count": value, "filter": format!("g{}", i % groups)}),
                from_timestamp(BASE + i as i64 * 60),
            )
        })
        .collect()
}

fn agent(detection: Detection) -> PeakDetectorAgent {
    PeakDetectorAgent::new(PeakDetectorOptions {
        value_path: "count".into(),
        group_by_path: "filter".into(),
        message: "peak of {{count}} in {{filter}}".into(),
        min_messages: Some("4".into()),
        expected_receive_period_in_days: Some("1".into()),
        detection,
        ..Default::default()
    })
}

fn bench_receive(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let mut group = c.benchmark_group("peak_detector");

    for size in [100usize, 1_000, 10_000] {
        let messages = batch(size, 8);
        group.throughput(Throughput::Elements(size as u64));

        for detection in [Detection::StdDev, Detection::RunningMax] {
            let agent = agent(detection);
            group.bench_with_input(
                BenchmarkId::new(format!("{detection:?}"), size),
                &messages,
                |b, messages| {
                    b.iter(|| {
                        runtime
                            .block_on(agent.receive(Memory::new(), black_box(messages), Utc::now()))
                            .unwrap()
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_receive);
criterion_main!(benches);
