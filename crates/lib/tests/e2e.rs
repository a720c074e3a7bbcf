use balance_ticker_lib::{
    execute, execute_with, ControllerConfig, Error, ManualClock, MemoryStore, SimulationError,
};
use csv_diff::{csv::Csv, csv_diff::CsvByteDiffLocal};
use eyre::Context;
use glob::glob;
use std::{fs::File, io::BufReader};

#[test]
fn run_test_files() {
    let mut inputs = glob("tests/test-cases/*.input.csv")
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let mut outputs = glob("tests/test-cases/*.output.csv")
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    inputs.sort();
    outputs.sort();
    assert_eq!(inputs.len(), outputs.len());

    let csv_byte_diff = CsvByteDiffLocal::new().unwrap();

    for (input, output) in inputs.iter().zip(outputs.iter()) {
        let file_name = input.file_name().unwrap();
        let expected = std::fs::read(output).unwrap();
        let mut actual = Vec::new();
        let mut reader = BufReader::new(File::open(input).unwrap());

        execute(&mut reader, &mut actual).unwrap();

        let mut diff = csv_byte_diff
            .diff(
                Csv::with_reader_seek(actual.as_slice()),
                Csv::with_reader_seek(expected.as_slice()),
            )
            .with_context(|| {
                format!(
                    "Failed to diff csv ({file_name:?}), actual.len() = {} and expected.len() = {}",
                    actual.len(),
                    expected.len()
                )
            })
            .unwrap();

        diff.sort_by_line();

        assert!(
            diff.as_slice().is_empty(),
            "The input file {input:?} didn't match the output file {output:?}\n{diff:#?}"
        );
    }
}

#[test]
fn resumes_from_persisted_balance() {
    let input = "time,type,reference,reference_time\n0,mount,10250::HUNDREDTH_CENT::ZAR,0\n10000,end,,\n";
    let mut actual = Vec::new();

    execute_with(
        ControllerConfig::default(),
        ManualClock::utc(0),
        MemoryStore::with_value(5000),
        input.as_bytes(),
        &mut actual,
    )
    .unwrap();

    assert_eq!(
        String::from_utf8_lossy(&actual),
        "time,shown,display\n0,5098,0.5098\n1050,6477,0.6477\n2100,7855,0.7855\n3150,9233,0.9233\n3975,10250,1.0250\n"
    );
}

#[test]
fn events_out_of_order_are_rejected() {
    let input = "time,type,reference,reference_time\n500,mount,1::WHOLE_CENT::ZAR,0\n100,end,,\n";

    assert!(matches!(
        execute(input.as_bytes(), Vec::new()),
        Err(Error::SimulationError(SimulationError::OutOfOrder {
            at: 100,
            previous: 500
        }))
    ));
}
