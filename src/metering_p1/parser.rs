use super::meter_definitions;
use super::structs::{MissingValue, ObisEntry, ParserOptions, Readings, Snapshot, ValueShape};
use super::utils::{verify_checksum, ChecksumCheck};
use crate::obis_utils;
use log::{debug, warn};

/// Telegram text and staged readings, only kept while checksums are verified.
struct PendingTelegram {
    raw: String,
    readings: Readings,
}

/// Line driven P1 telegram parser, one per serial connection.
///
/// Values are written into a long lived [`Readings`]; a line beginning with `!`
/// freezes them into a [`Snapshot`]. The readings are never reset between
/// telegrams, a field the meter leaves out keeps its last value.
pub struct TelegramParser {
    options: ParserOptions,
    obis_reference: Option<String>,
    readings: Readings,
    pending: Option<PendingTelegram>,
}

impl TelegramParser {
    pub fn new(options: ParserOptions) -> Self {
        Self::with_readings(options, Readings::default())
    }

    /// Starts from known readings instead of zeroes.
    pub fn with_readings(options: ParserOptions, readings: Readings) -> Self {
        TelegramParser {
            options,
            obis_reference: None,
            readings,
            pending: None,
        }
    }

    pub fn readings(&self) -> &Readings {
        &self.readings
    }

    /// OBIS code the next value line is attributed to.
    pub fn obis_reference(&self) -> Option<&str> {
        self.obis_reference.as_deref()
    }

    /// Feeds one raw line, line terminator included. Returns a snapshot when
    /// the line completes a telegram. Malformed input is skipped, never an error.
    pub fn ingest_line(&mut self, line: &str) -> Option<Snapshot> {
        if line.is_empty() {
            return None;
        }
        debug!("parsing line: {}", line.trim_end());

        if line.starts_with('!') {
            return self.finish_telegram(line);
        }
        if line.starts_with('/') {
            self.start_telegram(line);
            return None;
        }

        if let Some(pending) = self.pending.as_mut() {
            pending.raw.push_str(line);
        }
        if line.trim().is_empty() {
            return None;
        }

        if let Some(code) = obis_utils::extract_obis_code(line) {
            self.obis_reference = Some(code.to_string());
        }
        let entry = match self.obis_reference.as_deref() {
            Some(code) => meter_definitions::lookup(code)?,
            None => return None,
        };

        let readings = if self.options.verify_checksum {
            match self.pending.as_mut() {
                Some(pending) => &mut pending.readings,
                None => {
                    debug!("No telegram start seen yet, skipping {}", entry.code);
                    return None;
                }
            }
        } else {
            &mut self.readings
        };
        apply_line(entry, line, self.options.missing_value, readings);
        None
    }

    fn start_telegram(&mut self, line: &str) {
        self.obis_reference = None;
        if !self.options.verify_checksum {
            return;
        }
        if self.pending.is_some() {
            warn!("Telegram started before the previous one ended, discarding it");
        }
        self.pending = Some(PendingTelegram {
            raw: line.to_string(),
            readings: self.readings.clone(),
        });
    }

    fn finish_telegram(&mut self, line: &str) -> Option<Snapshot> {
        self.obis_reference = None;

        if self.options.verify_checksum {
            let pending = match self.pending.take() {
                Some(pending) => pending,
                None => {
                    warn!("Telegram end without start, dropping telegram");
                    return None;
                }
            };

            match verify_checksum(&pending.raw, line) {
                ChecksumCheck::Valid => {}
                ChecksumCheck::Absent => debug!("Telegram carries no checksum, accepting it"),
                ChecksumCheck::Mismatch { provided, calculated } => {
                    warn!(
                        "Telegram checksum mismatch (got {:04X}, calculated {:04X}), dropping telegram",
                        provided, calculated
                    );
                    return None;
                }
                ChecksumCheck::Unreadable(token) => {
                    warn!("Unreadable telegram checksum '{}', dropping telegram", token);
                    return None;
                }
            }
            self.readings = pending.readings;
        }

        let snapshot = Snapshot::capture(&self.readings);
        debug!("Telegram complete: {:?}", snapshot.readings);
        Some(snapshot)
    }
}

fn apply_line(entry: &ObisEntry, line: &str, missing: MissingValue, readings: &mut Readings) {
    match entry.shape {
        ValueShape::Decimal { unit } => apply_decimal(entry, unit, line, missing, readings),
        ValueShape::TimestampedDecimal { unit } => {
            apply_timestamp(entry, line, readings);
            apply_decimal(entry, unit, line, missing, readings);
        }
        ValueShape::Timestamp => apply_timestamp(entry, line, readings),
    }
}

fn apply_decimal(
    entry: &ObisEntry,
    unit: &str,
    line: &str,
    missing: MissingValue,
    readings: &mut Readings,
) {
    let slot = match readings.value_mut(entry.field) {
        Some(slot) => slot,
        None => return,
    };

    if let Some(found) = obis_utils::extract_unit(line) {
        if !found.eq_ignore_ascii_case(unit) {
            debug!("{} reported in {}, expected {}", entry.code, found, unit);
        }
    }

    match obis_utils::extract_decimal(line) {
        Some(value) => {
            debug!("{}: {} {}", entry.description, value, unit);
            *slot = value;
        }
        None => match missing {
            MissingValue::Zero => {
                debug!("{}: no decimal value, storing 0", entry.code);
                *slot = 0.0;
            }
            MissingValue::Retain => {
                debug!("{}: no decimal value, keeping {}", entry.code, slot);
            }
        },
    }
}

fn apply_timestamp(entry: &ObisEntry, line: &str, readings: &mut Readings) {
    if let (Some(timestamp), Some(slot)) = (
        obis_utils::extract_timestamp(line),
        readings.timestamp_mut(entry.field),
    ) {
        *slot = Some(timestamp);
    }
}
