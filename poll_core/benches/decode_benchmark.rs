//! Frame decoder throughput.
//!
//! Decodes one full FIFO worth of frames per iteration, with and without a
//! trailing partial frame. Target: well above the 10 MB/s a crate produces.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use poll_common::Word;
use poll_common::frame::FrameHeader;
use poll_common::hal::consts::EXTERNAL_FIFO_LENGTH;
use poll_core::decoder::decode_segment;
use std::hint::black_box;

const SLOT: u8 = 2;

fn payload(frame_words: u32, total: usize) -> Vec<Word> {
    let mut words = Vec::with_capacity(total);
    let mut channel = 0u8;
    while words.len() + frame_words as usize <= total {
        words.push(FrameHeader::encode(SLOT, channel, frame_words));
        words.extend((1..frame_words).map(|i| i * 3));
        channel = (channel + 1) & 0x0F;
    }
    words
}

fn bench_decode_segment(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_segment");
    for frame_words in [4u32, 32, 256] {
        let words = payload(frame_words, EXTERNAL_FIFO_LENGTH - 1);
        group.throughput(Throughput::Bytes((words.len() * 4) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(frame_words), &words, |b, words| {
            b.iter(|| {
                let mut events = 0u64;
                let outcome = decode_segment(black_box(words), SLOT, |_| events += 1);
                black_box((outcome.map(|o| o.frames).unwrap_or(0), events))
            });
        });
    }
    group.finish();
}

fn bench_truncated_tail(c: &mut Criterion) {
    let mut words = payload(32, EXTERNAL_FIFO_LENGTH / 2);
    words.push(FrameHeader::encode(SLOT, 0, 64));
    words.extend(0..20);

    c.bench_function("decode_segment_truncated_tail", |b| {
        b.iter(|| {
            let outcome = decode_segment(black_box(&words), SLOT, |_| {});
            black_box(outcome.map(|o| o.truncated.map(|t| t.missing_words)).ok())
        });
    });
}

criterion_group!(benches, bench_decode_segment, bench_truncated_tail);
criterion_main!(benches);
