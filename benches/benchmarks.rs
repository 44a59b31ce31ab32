//! Benchmarks for the sockweb protocol layer.
//!
//! Run with: `cargo bench`

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use sockweb::protocol::handshake::{HandshakeRequest, HandshakeResponse, compute_accept_key};
use sockweb::protocol::{Frame, FrameHeader, FrameValidator, apply_mask};

const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

fn masked_frame(payload_size: usize) -> Vec<u8> {
    let payload = vec![0xAB; payload_size];
    let encoded = Frame::binary(payload).encode();
    let header_len = encoded.len() - payload_size;

    let mut out = encoded[..header_len].to_vec();
    out[1] |= 0x80;
    out.extend_from_slice(&MASK);
    let mut body = encoded[header_len..].to_vec();
    apply_mask(&mut body, MASK);
    out.extend_from_slice(&body);
    out
}

fn bench_frame_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_parsing");

    for (name, size) in [("small_10b", 10), ("medium_1kb", 1024), ("large_64kb", 65536)] {
        let unmasked = Frame::binary(vec![0xAB; size]).encode();
        let masked = masked_frame(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("{name}_unmasked"), |b| {
            b.iter(|| Frame::parse(black_box(&unmasked)))
        });
        group.bench_function(format!("{name}_masked"), |b| {
            b.iter(|| Frame::parse(black_box(&masked)))
        });
    }

    group.finish();
}

fn bench_header_validation(c: &mut Criterion) {
    let validator = FrameValidator::default();
    let wire = masked_frame(70_000);

    c.bench_function("header_validate_64bit_len", |b| {
        b.iter(|| {
            let mut header = FrameHeader::parse([wire[0], wire[1]]).unwrap();
            header.ext_len_bytes = wire[2..10].to_vec();
            validator.validate(black_box(&header))
        })
    });
}

fn bench_frame_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encoding");

    for (name, size) in [("small_10b", 10), ("medium_1kb", 1024), ("large_64kb", 65536)] {
        let frame = Frame::binary(vec![0xAB; size]);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(name, |b| b.iter(|| black_box(&frame).encode()));
    }

    group.finish();
}

fn bench_masking(c: &mut Criterion) {
    let mut group = c.benchmark_group("masking");

    for size in [64usize, 1024, 65536, 1_048_576] {
        let mut data = vec![0xAB; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("{size}b"), |b| {
            b.iter(|| apply_mask(black_box(&mut data), black_box(MASK)))
        });
    }

    group.finish();
}

fn bench_handshake(c: &mut Criterion) {
    let mut group = c.benchmark_group("handshake");

    let request = b"GET /chat HTTP/1.1\r\n\
        Host: example.com\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\
        Origin: http://localhost\r\n\r\n";

    group.bench_function("parse_request", |b| {
        b.iter(|| HandshakeRequest::parse(black_box(request)))
    });

    let parsed = HandshakeRequest::parse(request).unwrap();
    group.bench_function("validate_request", |b| {
        b.iter(|| black_box(&parsed).validate(black_box("http://localhost")))
    });

    group.bench_function("compute_accept_key", |b| {
        b.iter(|| compute_accept_key(black_box("dGhlIHNhbXBsZSBub25jZQ==")))
    });

    let response = HandshakeResponse::new("dGhlIHNhbXBsZSBub25jZQ==");
    group.bench_function("write_response", |b| {
        b.iter(|| black_box(&response).to_bytes())
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_parsing,
    bench_header_validation,
    bench_frame_encoding,
    bench_masking,
    bench_handshake,
);
criterion_main!(benches);
