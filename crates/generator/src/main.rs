use balance_ticker_lib::{EventKind, MonetaryAmount, Unit, MILLIS_PER_DAY};
use csv::WriterBuilder;
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use std::io::Write;
use strum::VariantNames;

const HEADER: [&str; 6] = [
    "time",
    "type",
    "reference",
    "reference_time",
    "projected",
    "projected_time",
];

fn zar(amount: i64) -> MonetaryAmount {
    MonetaryAmount::new(amount, Unit::HundredthCent, "ZAR")
}

#[derive(Debug, Clone)]
struct Row {
    at: i64,
    kind: EventKind,
    balance: Option<(MonetaryAmount, i64)>,
    projection: Option<(MonetaryAmount, i64)>,
}

#[derive(Debug)]
struct GeneratorState {
    now: i64,
    balance: i64,
    mounted: bool,
    rows: Vec<Row>,
}

impl GeneratorState {
    fn new(balance: i64) -> Self {
        Self {
            now: 0,
            balance,
            mounted: false,
            rows: Vec::new(),
        }
    }

    fn push_snapshot(&mut self, kind: EventKind, rng: &mut impl Rng) {
        let end_of_day = (self.now / MILLIS_PER_DAY + 1) * MILLIS_PER_DAY;
        // growth accrues toward the end of day, sometimes there is none to show
        let projection = rng
            .gen_bool(0.8)
            .then(|| (zar(self.balance + rng.gen_range(0..5_000)), end_of_day));
        self.rows.push(Row {
            at: self.now,
            kind,
            balance: Some((zar(self.balance), self.now)),
            projection,
        });
    }

    fn push(&mut self, kind: EventKind, rng: &mut impl Rng) {
        match kind {
            EventKind::Mount => {
                self.mounted = true;
                self.push_snapshot(kind, rng);
            }
            EventKind::Balance => {
                // saves, withdrawals and boosts
                self.balance = (self.balance + rng.gen_range(-20_000..50_000)).max(0);
                self.push_snapshot(kind, rng);
            }
            EventKind::Unmount | EventKind::Logout => {
                self.mounted = false;
                self.rows.push(Row {
                    at: self.now,
                    kind,
                    balance: None,
                    projection: None,
                });
            }
            EventKind::End => {}
        }
    }

    fn into_rows(mut self) -> Vec<Row> {
        self.rows.push(Row {
            at: self.now,
            kind: EventKind::End,
            balance: None,
            projection: None,
        });
        self.rows
    }
}

fn write_csv<W: Write>(rows: &[Row], writer: W) -> Result<(), std::io::Error> {
    let mut writer = WriterBuilder::new().from_writer(writer);
    writer.write_record(HEADER)?;

    let mut time_buf = itoa::Buffer::new();
    let mut reference_time_buf = itoa::Buffer::new();
    let mut projected_time_buf = itoa::Buffer::new();

    for row in rows {
        let (reference, reference_time) = match &row.balance {
            Some((amount, at)) => (amount.to_string(), reference_time_buf.format(*at)),
            None => (String::new(), ""),
        };
        let (projected, projected_time) = match &row.projection {
            Some((amount, at)) => (amount.to_string(), projected_time_buf.format(*at)),
            None => (String::new(), ""),
        };

        let kind = row.kind.to_string();

        writer.write_record([
            time_buf.format(row.at),
            kind.as_str(),
            reference.as_str(),
            reference_time,
            projected.as_str(),
            projected_time,
        ])?;
    }

    writer.flush()
}

fn main() {
    // mount, balance, unmount, logout, end
    const WEIGHTS: [usize; EventKind::VARIANTS.len()] = [0, 90, 8, 2, 0];
    let dist = WeightedIndex::new(WEIGHTS).unwrap();
    let days = std::env::args()
        .nth(1)
        .map(|days| days.parse::<i64>().expect("days must be a number"))
        .unwrap_or(1);
    let mut rng = thread_rng();

    let mut state = GeneratorState::new(rng.gen_range(0..10_000_000));
    state.push(EventKind::Mount, &mut rng);

    while state.now < days * MILLIS_PER_DAY {
        state.now += rng.gen_range(60_000..3 * 3_600_000);
        let kind = if state.mounted {
            EventKind::from_repr(dist.sample(&mut rng)).unwrap()
        } else {
            EventKind::Mount
        };
        state.push(kind, &mut rng);
    }

    write_csv(&state.into_rows(), std::io::stdout()).unwrap();
}
