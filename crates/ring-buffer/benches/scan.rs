use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ring_buffer::{RingBuffer, Terminator, TerminatorScanner};

fn bench_scan(c: &mut Criterion) {
    let scanner = TerminatorScanner::new(Terminator::crlf());

    let mut contiguous = RingBuffer::new(1024).unwrap();
    contiguous.write(&[b'x'; 1000]);
    contiguous.write(b"\r\n");

    let mut wrapped = RingBuffer::new(1024).unwrap();
    wrapped.write(&[0u8; 600]);
    wrapped.consume(600).unwrap();
    wrapped.write(&[b'x'; 1000]);
    wrapped.write(b"\r\n");

    c.bench_function("scan_contiguous_1k", |b| {
        b.iter(|| scanner.scan(black_box(&contiguous)))
    });
    c.bench_function("scan_wrapped_1k", |b| {
        b.iter(|| scanner.scan(black_box(&wrapped)))
    });
    c.bench_function("scan_miss_1k", |b| {
        let mut miss = RingBuffer::new(1024).unwrap();
        miss.write(&[b'y'; 1024]);
        b.iter(|| scanner.scan(black_box(&miss)))
    });
}

criterion_group!(benches, bench_scan);
criterion_main!(benches);
