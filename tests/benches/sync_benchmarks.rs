//! # SPV Sync Benchmarks
//!
//! Hot paths of a header-first sync:
//!
//! | Path | Work per iteration |
//! |------|--------------------|
//! | Header acceptance | Connect a mined regtest batch to a fresh chain |
//! | Merkle extraction | Verify one partial merkle tree against its root |
//! | Frame decode | Parse a framed `headers` message |

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use rand::Rng;
use shared_types::Hash;
use spv_chain::test_utils::{build_headers, test_chain_state};
use spv_chain::{merkle_root, ChainParams, ChainStateApi, MerkleProof};
use spv_network::{FrameCodec, Message};
use std::time::Duration;

// ============================================================================
// Chain state
// ============================================================================

fn bench_header_acceptance(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain-state");
    group.measurement_time(Duration::from_secs(10));

    let genesis = ChainParams::for_testing().genesis;
    for count in [100usize, 500, 2000] {
        let headers = build_headers(&genesis, count, 0x11);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("accept_headers", count), &headers, |b, headers| {
            b.iter_batched(
                || (test_chain_state(), headers.clone()),
                |(mut chain, headers)| black_box(chain.accept_headers(headers).is_ok()),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

// ============================================================================
// Merkle proofs
// ============================================================================

fn random_leaves(count: usize) -> Vec<Hash> {
    let mut rng = rand::thread_rng();
    (0..count).map(|_| rng.gen()).collect()
}

fn bench_merkle_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("merkle-proof");

    for count in [16usize, 512, 4096] {
        let leaves = random_leaves(count);
        let root = merkle_root(&leaves);
        // A wallet typically matches a handful of transactions per block.
        let matches: Vec<bool> = (0..count).map(|i| i % 97 == 3).collect();
        let proof = MerkleProof::from_leaves(&leaves, &matches);

        group.bench_with_input(BenchmarkId::new("extract", count), &proof, |b, proof| {
            b.iter(|| black_box(proof.extract(&root).is_ok()))
        });
    }

    group.finish();
}

// ============================================================================
// Wire codec
// ============================================================================

fn bench_frame_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire-codec");

    let params = ChainParams::for_testing();
    let codec = FrameCodec::new(params.magic);
    let headers = build_headers(&params.genesis, 200, 0x22);
    let frame = codec.encode(&Message::Headers(headers));
    group.throughput(Throughput::Bytes(frame.len() as u64));

    group.bench_function("decode_headers_200", |b| {
        b.iter_batched(
            || frame.clone(),
            |mut buffer| black_box(codec.decode(&mut buffer).is_ok()),
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_header_acceptance,
    bench_merkle_extraction,
    bench_frame_decode
);
criterion_main!(benches);
