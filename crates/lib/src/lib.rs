mod amount;
mod clock;
mod config;
mod controller;
mod error;
mod event;
mod interpolator;
mod parser;
mod scheduler;
mod simulation;
mod snapshot;
mod store;
mod writer;

type FRAC = fixed::types::extra::U16;

/// Fixed point whole-currency type used when a subunit amount is shown as currency.
// 16 fractional bits resolve 0.0001 cleanly once rounded for display, and the
// remaining 48 integral bits cover any balance the backend can send.
pub type ICurrency = fixed::FixedI64<FRAC>;

pub use amount::*;
pub use clock::*;
pub use config::*;
pub use controller::*;
pub use error::Error;
pub use event::*;
pub use interpolator::*;
pub use parser::{parse_csv, parse_from_reader, Header, ParserError};
pub use scheduler::*;
pub use simulation::*;
pub use snapshot::*;
pub use store::*;
pub use writer::write_csv;

/// Replays a scenario csv with the default controller settings on a UTC clock
/// and writes every persisted balance value as csv.
pub fn execute<R: std::io::Read, W: std::io::Write>(
    reader: R,
    writer: W,
) -> Result<(), error::Error> {
    execute_with(
        ControllerConfig::default(),
        ManualClock::utc(0),
        MemoryStore::default(),
        reader,
        writer,
    )
}

/// Replays a scenario csv against `store`. The clock is moved to each event's
/// time, so only its offset matters for end of day boundaries.
pub fn execute_with<St: ShownBalanceStore, R: std::io::Read, W: std::io::Write>(
    config: ControllerConfig,
    clock: ManualClock,
    store: St,
    reader: R,
    writer: W,
) -> Result<(), error::Error> {
    let events = parse_csv(reader)?.collect::<Result<Vec<_>, _>>()?;
    let report = Simulation::new(config, clock, store)?.run(events)?;

    Ok(write_csv(&report, writer)?)
}
