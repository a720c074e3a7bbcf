use balance_ticker_lib::execute;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fmt::Write;

const DAY: i64 = 86_400_000;

/// One refresh per hour, each moving the reference and the end of day projection.
fn scenario(days: i64) -> String {
    let mut csv = String::from("time,type,reference,reference_time,projected,projected_time\n");
    let hours = days * 24;
    for hour in 0..hours {
        let at = hour * DAY / 24;
        let ty = if hour == 0 { "mount" } else { "balance" };
        let reference = 1_000_000 + hour * 250;
        let end_of_day = (at / DAY + 1) * DAY;
        writeln!(
            csv,
            "{at},{ty},{reference}::HUNDREDTH_CENT::ZAR,{at},{}::HUNDREDTH_CENT::ZAR,{end_of_day}",
            reference + 6_000
        )
        .unwrap();
    }
    writeln!(csv, "{},end,,,,", hours * DAY / 24).unwrap();
    csv
}

pub fn execution_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute");
    for days in [1, 30] {
        let input = scenario(days);
        group.throughput(Throughput::Elements(days as u64 * 24));

        group.bench_with_input(BenchmarkId::from_parameter(days), &input, |b, input| {
            b.iter(|| {
                let writer = Vec::with_capacity(1024 * 1024);
                execute(input.as_bytes(), writer)
            });
        });
    }
}

criterion_group!(benches, execution_bench);
criterion_main!(benches);
