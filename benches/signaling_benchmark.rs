use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::net::Ipv4Addr;

use arena_signal::dispatcher::Dispatcher;
use arena_signal::signaling::{Inbound, RoomCode, SignalingMessage};

const JOIN_RESPONSE: &str =
    r#"{"type":"join-response","success":true,"message":"","hostIP":"192.168.1.100","port":7777}"#;
const SPEED_PUSH: &str = r#"{"type":"player-speed-updated","speed":7.5}"#;

/// inbound decoding benchmark
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("Decode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("join_response", |b| {
        b.iter(|| black_box(Inbound::decode(black_box(JOIN_RESPONSE)).unwrap()))
    });

    group.bench_function("side_channel", |b| {
        b.iter(|| black_box(Inbound::decode(black_box(SPEED_PUSH)).unwrap()))
    });

    group.finish();
}

/// request encoding benchmark
fn bench_encode(c: &mut Criterion) {
    let request = SignalingMessage::JoinRoomRequest {
        room_code: RoomCode::from("ABC123"),
        client_address: Ipv4Addr::new(192, 168, 1, 100),
    };

    let mut group = c.benchmark_group("Encode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("join_room", |b| {
        b.iter(|| black_box(black_box(&request).encode().unwrap()))
    });

    group.finish();
}

/// enqueue + drain of a full tick's worth of events
fn bench_dispatch(c: &mut Criterion) {
    let dispatcher: Dispatcher<u64> = Dispatcher::new();

    let mut group = c.benchmark_group("Dispatch");
    group.throughput(Throughput::Elements(64));

    group.bench_function("enqueue_drain_64", |b| {
        let mut counter = 0u64;
        b.iter(|| {
            for _ in 0..64 {
                dispatcher.enqueue(|n: &mut u64| {
                    *n += 1;
                    Ok(())
                });
            }
            black_box(dispatcher.drain_once(&mut counter))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_encode, bench_dispatch);
criterion_main!(benches);
