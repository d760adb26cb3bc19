use std::hint::black_box;
use std::io::Write;

use bencher::{Sink, TestCase, TestFile};
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use flate2::Compression;
use flate2::write::GzEncoder;
use http_tap::{Direction, ParserConfig, Session};

static SMALL_REQUEST: TestFile = TestFile::new("get_small.txt", Direction::Outbound, include_bytes!("../resources/request/get_small.txt"));
static LARGE_REQUEST: TestFile = TestFile::new("get_large.txt", Direction::Outbound, include_bytes!("../resources/request/get_large.txt"));
static CHUNKED_RESPONSE: TestFile = TestFile::new("chunked.txt", Direction::Inbound, include_bytes!("../resources/response/chunked.txt"));

fn create_test_cases() -> Vec<TestCase> {
    vec![
        TestCase::whole("small_request", SMALL_REQUEST),
        TestCase::whole("large_request", LARGE_REQUEST),
        TestCase::segments("large_request_by_byte", 1, LARGE_REQUEST),
        TestCase::whole("chunked_response", CHUNKED_RESPONSE),
        TestCase::segments("chunked_response_by_16", 16, CHUNKED_RESPONSE),
    ]
}

fn benchmark_session_input(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("session_input");

    for case in create_test_cases() {
        let pieces = case.pieces();
        group.throughput(Throughput::Bytes(case.file().content().len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(case.name()), &case, |b, case| {
            b.iter_batched_ref(
                || Session::new(1, Sink::default(), ParserConfig::default()),
                |session| {
                    for piece in &pieces {
                        session.input(case.file().direction(), piece).expect("capture should be valid http");
                    }
                    black_box(session.callbacks().messages);
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn gzip_response() -> Vec<u8> {
    let body = "lorem ipsum dolor sit amet, consectetur adipiscing elit. ".repeat(2000);
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body.as_bytes()).expect("writing to a vec never fails");
    let compressed = encoder.finish().expect("writing to a vec never fails");

    let mut raw = format!("HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Length: {}\r\n\r\n", compressed.len()).into_bytes();
    raw.extend_from_slice(&compressed);
    raw
}

fn benchmark_gzip_body(criterion: &mut Criterion) {
    let raw = gzip_response();
    let mut group = criterion.benchmark_group("gzip_body");
    group.throughput(Throughput::Bytes(raw.len() as u64));

    for decode in [false, true] {
        group.bench_with_input(BenchmarkId::new("decode", decode), &decode, |b, decode| {
            b.iter_batched_ref(
                || Session::new(1, Sink { decode: *decode, ..Sink::default() }, ParserConfig::default()),
                |session| {
                    session.input(Direction::Inbound, &raw).expect("response should be valid http");
                    black_box(session.callbacks().body_bytes);
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(session, benchmark_session_input, benchmark_gzip_body);
criterion_main!(session);
