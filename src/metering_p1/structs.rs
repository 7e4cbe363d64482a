use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    DeliveredTariff1,
    DeliveredTariff2,
    ReturnedTariff1,
    ReturnedTariff2,
    PowerDelivered,
    PowerReturned,
    GasDelivered,
    TelegramTimestamp,
}

/// How the value of a registered OBIS line is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// `(12972.117*kWh)` or `(12972.117)`
    Decimal { unit: &'static str },
    /// `(201024220000S)(08950.179*m3)`, the decimal may come on a continuation line
    TimestampedDecimal { unit: &'static str },
    /// `(201024221213S)`
    Timestamp,
}

#[derive(Debug)]
pub struct ObisEntry {
    pub code: &'static str,
    pub field: Field,
    pub shape: ValueShape,
    pub description: &'static str,
}

/// What to do with a registered line that carries no decimal value.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingValue {
    /// Overwrite the field with 0
    #[default]
    Zero,
    /// Leave the previous value in place
    Retain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParserOptions {
    pub missing_value: MissingValue,
    pub verify_checksum: bool,
}

/// Last seen value of every tracked field.
///
/// Meters leave unchanged values out of a telegram, so a field keeps its value
/// until a later telegram carries it again. Nothing resets a `Readings`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Readings {
    pub telegram_timestamp: Option<NaiveDateTime>,
    pub delivered_tariff1: f64,
    pub delivered_tariff2: f64,
    pub returned_tariff1: f64,
    pub returned_tariff2: f64,
    pub power_delivered: f64,
    pub power_returned: f64,
    pub gas_delivered: f64,
    pub gas_timestamp: Option<NaiveDateTime>,
}

impl Readings {
    pub fn value_mut(&mut self, field: Field) -> Option<&mut f64> {
        match field {
            Field::DeliveredTariff1 => Some(&mut self.delivered_tariff1),
            Field::DeliveredTariff2 => Some(&mut self.delivered_tariff2),
            Field::ReturnedTariff1 => Some(&mut self.returned_tariff1),
            Field::ReturnedTariff2 => Some(&mut self.returned_tariff2),
            Field::PowerDelivered => Some(&mut self.power_delivered),
            Field::PowerReturned => Some(&mut self.power_returned),
            Field::GasDelivered => Some(&mut self.gas_delivered),
            Field::TelegramTimestamp => None,
        }
    }

    pub fn timestamp_mut(&mut self, field: Field) -> Option<&mut Option<NaiveDateTime>> {
        match field {
            Field::GasDelivered => Some(&mut self.gas_timestamp),
            Field::TelegramTimestamp => Some(&mut self.telegram_timestamp),
            _ => None,
        }
    }
}

/// Readings frozen at the end of a telegram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub captured_at: DateTime<Utc>,
    pub readings: Readings,
}

impl Snapshot {
    pub fn capture(readings: &Readings) -> Self {
        Snapshot {
            captured_at: Utc::now(),
            readings: readings.clone(),
        }
    }
}
