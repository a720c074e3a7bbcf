use crate::SimulationReport;
use csv::WriterBuilder;
use std::io::{Cursor, Write};

/// Writes one `time,shown,display` row per persisted value, `display` being
/// the value in whole currency with four decimals.
pub fn write_csv<W: Write>(report: &SimulationReport, writer: W) -> Result<(), std::io::Error> {
    let mut writer = WriterBuilder::new().from_writer(writer);
    writer.write_record(&["time", "shown", "display"])?;

    let mut time_buf = itoa::Buffer::new();
    let mut shown_buf = itoa::Buffer::new();
    let mut display_buf = [0u8; 32];

    for published in report.published() {
        let mut display_cursor = Cursor::new(&mut display_buf[..]);
        if let Some(display) = report.unit().to_currency(published.value) {
            write!(display_cursor, "{:.4}", display)?;
        }

        writer.write_record(&[
            time_buf.format(published.at).as_bytes(),
            shown_buf.format(published.value).as_bytes(),
            &display_cursor.get_ref()[..(display_cursor.position() as usize)],
        ])?;
    }

    writer.flush()
}
