use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rdv_common::wire::Message;
use rdv_common::ClientInfo;
use std::net::Ipv4Addr;

fn member(i: u8) -> ClientInfo {
    ClientInfo::new(Ipv4Addr::new(10, 0, 0, i), 7778, format!("client-{i}")).unwrap()
}

fn bench_broadcast_encode(c: &mut Criterion) {
    let msg = Message::broadcast(vec![0xABu8; 1024]).unwrap();
    c.bench_function("broadcast_encode_1kb", |b| {
        b.iter(|| black_box(msg.encode()));
    });
}

fn bench_broadcast_decode(c: &mut Criterion) {
    let bytes = Message::broadcast(vec![0xABu8; 1024]).unwrap().encode();
    c.bench_function("broadcast_decode_1kb", |b| {
        b.iter(|| black_box(Message::decode(&bytes).unwrap()));
    });
}

fn bench_broadcast_max_encode(c: &mut Criterion) {
    let msg = Message::broadcast(vec![0xABu8; 65_535]).unwrap();
    c.bench_function("broadcast_encode_64kb", |b| {
        b.iter(|| black_box(msg.encode()));
    });
}

fn bench_registration_response_roundtrip(c: &mut Criterion) {
    let msg = Message::RegistrationResponse {
        clients: (0..64).map(member).collect(),
    };
    c.bench_function("registration_response_roundtrip_64", |b| {
        b.iter(|| {
            let bytes = msg.encode();
            black_box(Message::decode(&bytes).unwrap())
        });
    });
}

fn bench_peer_request_decode(c: &mut Criterion) {
    let bytes = Message::PeerToPeerRequest {
        tcp_port: 7900,
        name: "initiator".to_owned(),
    }
    .encode();
    c.bench_function("peer_request_decode", |b| {
        b.iter(|| black_box(Message::decode(&bytes).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_broadcast_encode,
    bench_broadcast_decode,
    bench_broadcast_max_encode,
    bench_registration_response_roundtrip,
    bench_peer_request_decode,
);
criterion_main!(benches);
