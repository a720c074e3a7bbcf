use crate::{
    AmountError, BalanceSnapshot, DatedAmount, EventKind, ScenarioEvent, TimedEvent,
};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug)]
pub enum Header {
    Time,
    Type,
    Reference,
    ReferenceTime,
    Projected,
    ProjectedTime,
}

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Column `{0:?}` missing")]
    MissingHeader(Header),
    #[error("Invalid value in type field: `{0}`")]
    InvalidTypeField(String),
    #[error("`{0}` events need a reference balance")]
    MissingReference(EventKind),
    #[error("Projected balance `{0}` has no time")]
    MissingProjectionTime(String),
    #[error(transparent)]
    CSVError(#[from] csv::Error),
    #[error(transparent)]
    IntParseError(#[from] std::num::ParseIntError),
    #[error(transparent)]
    AmountError(#[from] AmountError),
}

const MISSING_TIME_HEADER: ParserError = ParserError::MissingHeader(Header::Time);
const MISSING_TYPE_HEADER: ParserError = ParserError::MissingHeader(Header::Type);
const MISSING_REFERENCE_HEADER: ParserError = ParserError::MissingHeader(Header::Reference);
const MISSING_REFERENCE_TIME_HEADER: ParserError =
    ParserError::MissingHeader(Header::ReferenceTime);

pub fn parse_csv<R: std::io::Read>(
    reader: R,
) -> Result<impl Iterator<Item = Result<TimedEvent, ParserError>>, ParserError> {
    parse_from_reader(ReaderBuilder::new().trim(Trim::All).from_reader(reader))
}

pub fn parse_from_reader<R: std::io::Read>(
    mut reader: csv::Reader<R>,
) -> Result<impl Iterator<Item = Result<TimedEvent, ParserError>>, ParserError> {
    let mut header_to_index = reader
        .headers()?
        .into_iter()
        .zip(0u8..u8::MAX)
        .collect::<HashMap<_, _>>();

    // projections are optional, so are their columns
    let field_map = FieldToIndexMap {
        time: header_to_index.remove("time").ok_or(MISSING_TIME_HEADER)?,
        ty: header_to_index.remove("type").ok_or(MISSING_TYPE_HEADER)?,
        reference: header_to_index
            .remove("reference")
            .ok_or(MISSING_REFERENCE_HEADER)?,
        reference_time: header_to_index
            .remove("reference_time")
            .ok_or(MISSING_REFERENCE_TIME_HEADER)?,
        projected: header_to_index.remove("projected"),
        projected_time: header_to_index.remove("projected_time"),
    };

    Ok(reader
        .into_records()
        .map(move |res| res.map_err(ParserError::from).and_then(|rec| parse_event(&rec, field_map))))
}

#[derive(Clone, Copy)]
struct FieldToIndexMap {
    time: u8,
    ty: u8,
    reference: u8,
    reference_time: u8,
    projected: Option<u8>,
    projected_time: Option<u8>,
}

fn field(record: &StringRecord, index: Option<u8>) -> Option<&str> {
    index
        .and_then(|i| record.get(i.into()))
        .filter(|value| !value.is_empty())
}

#[inline]
fn parse_event(record: &StringRecord, field_map: FieldToIndexMap) -> Result<TimedEvent, ParserError> {
    let at = record
        .get(field_map.time.into())
        .ok_or(MISSING_TIME_HEADER)?
        .parse()?;
    let ty = record.get(field_map.ty.into()).ok_or(MISSING_TYPE_HEADER)?;
    let kind = ty
        .parse::<EventKind>()
        .map_err(|_| ParserError::InvalidTypeField(ty.to_string()))?;

    let event = match kind {
        EventKind::Mount => ScenarioEvent::Mount(parse_snapshot(record, field_map, kind)?),
        EventKind::Balance => ScenarioEvent::Balance(parse_snapshot(record, field_map, kind)?),
        EventKind::Unmount => ScenarioEvent::Unmount,
        EventKind::Logout => ScenarioEvent::Logout,
        EventKind::End => ScenarioEvent::End,
    };

    Ok(TimedEvent::new(at, event))
}

fn parse_snapshot(
    record: &StringRecord,
    field_map: FieldToIndexMap,
    kind: EventKind,
) -> Result<BalanceSnapshot, ParserError> {
    let reference = field(record, Some(field_map.reference))
        .ok_or(ParserError::MissingReference(kind))?
        .parse()?;
    let reference_time = field(record, Some(field_map.reference_time))
        .ok_or(MISSING_REFERENCE_TIME_HEADER)?
        .parse()?;
    let snapshot = BalanceSnapshot::new(DatedAmount::new(reference, reference_time));

    let Some(projected) = field(record, field_map.projected) else {
        return Ok(snapshot);
    };
    let projected_time = field(record, field_map.projected_time)
        .ok_or_else(|| ParserError::MissingProjectionTime(projected.to_string()))?
        .parse()?;

    Ok(snapshot.with_end_of_today(DatedAmount::new(projected.parse()?, projected_time)))
}
