use super::structs::{Field, ObisEntry, ValueShape};
use lazy_static::lazy_static;
use std::collections::HashMap;

/// Every OBIS reference the P1 parser decodes. Anything else is skipped.
static P1_REGISTRY: &[ObisEntry] = &[
    ObisEntry {
        code: "1-0:1.8.1",
        field: Field::DeliveredTariff1,
        shape: ValueShape::Decimal { unit: "kWh" },
        description: "Energy delivered to client (tariff 1)",
    },
    ObisEntry {
        code: "1-0:1.8.2",
        field: Field::DeliveredTariff2,
        shape: ValueShape::Decimal { unit: "kWh" },
        description: "Energy delivered to client (tariff 2)",
    },
    ObisEntry {
        code: "1-0:2.8.1",
        field: Field::ReturnedTariff1,
        shape: ValueShape::Decimal { unit: "kWh" },
        description: "Energy delivered by client (tariff 1)",
    },
    ObisEntry {
        code: "1-0:2.8.2",
        field: Field::ReturnedTariff2,
        shape: ValueShape::Decimal { unit: "kWh" },
        description: "Energy delivered by client (tariff 2)",
    },
    ObisEntry {
        code: "1-0:1.7.0",
        field: Field::PowerDelivered,
        shape: ValueShape::Decimal { unit: "kW" },
        description: "Actual power delivered to client",
    },
    ObisEntry {
        code: "1-0:2.7.0",
        field: Field::PowerReturned,
        shape: ValueShape::Decimal { unit: "kW" },
        description: "Actual power delivered by client",
    },
    // DSMR 2.2/3: value may follow on a continuation line
    ObisEntry {
        code: "0-1:24.3.0",
        field: Field::GasDelivered,
        shape: ValueShape::TimestampedDecimal { unit: "m3" },
        description: "Gas delivered to client",
    },
    // DSMR 4/5
    ObisEntry {
        code: "0-1:24.2.1",
        field: Field::GasDelivered,
        shape: ValueShape::TimestampedDecimal { unit: "m3" },
        description: "Gas delivered to client",
    },
    ObisEntry {
        code: "0-0:1.0.0",
        field: Field::TelegramTimestamp,
        shape: ValueShape::Timestamp,
        description: "Telegram date and time",
    },
];

lazy_static! {
    static ref REGISTRY_BY_CODE: HashMap<&'static str, &'static ObisEntry> =
        P1_REGISTRY.iter().map(|entry| (entry.code, entry)).collect();
}

/// Looks up an OBIS code, `None` for codes the parser does not track.
pub fn lookup(obis_code: &str) -> Option<&'static ObisEntry> {
    REGISTRY_BY_CODE.get(obis_code).copied()
}

pub fn registry() -> &'static [ObisEntry] {
    P1_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_codes_present() {
        for code in [
            "1-0:1.8.1",
            "1-0:1.8.2",
            "1-0:2.8.1",
            "1-0:2.8.2",
            "1-0:1.7.0",
            "1-0:2.7.0",
            "0-1:24.3.0",
        ] {
            assert!(lookup(code).is_some(), "missing {code}");
        }
    }

    #[test]
    fn test_lookup_fields() {
        assert_eq!(lookup("1-0:1.8.2").unwrap().field, Field::DeliveredTariff2);
        assert_eq!(lookup("1-0:2.7.0").unwrap().field, Field::PowerReturned);

        let gas = lookup("0-1:24.3.0").unwrap();
        assert_eq!(gas.field, Field::GasDelivered);
        assert_eq!(gas.shape, ValueShape::TimestampedDecimal { unit: "m3" });
    }

    #[test]
    fn test_unknown_codes_are_not_errors() {
        assert!(lookup("0-0:96.1.1").is_none());
        assert!(lookup("1-0:32.7.0").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn test_registry_codes_unique() {
        assert_eq!(REGISTRY_BY_CODE.len(), registry().len());
    }
}
