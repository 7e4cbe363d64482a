use log::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumCheck {
    Valid,
    /// DSMR 2.2/3 terminators carry no checksum
    Absent,
    Mismatch { provided: u16, calculated: u16 },
    Unreadable(String),
}

/// CRC16/ARC over the telegram text from `/` up to and including `!`.
pub fn calculate_checksum(data: &[u8]) -> u16 {
    crc16::State::<crc16::ARC>::calculate(data)
}

/// Returns the checksum token of a terminator line, e.g. `1234` for `!1234\r\n`.
pub fn checksum_token(terminator: &str) -> &str {
    terminator.strip_prefix('!').unwrap_or(terminator).trim()
}

/// `body` is everything received before the terminator line, starting at `/`.
pub fn verify_checksum(body: &str, terminator: &str) -> ChecksumCheck {
    let token = checksum_token(terminator);
    if token.is_empty() {
        return ChecksumCheck::Absent;
    }

    if token.len() != 4 || !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return ChecksumCheck::Unreadable(token.to_string());
    }
    let provided = match u16::from_str_radix(token, 16) {
        Ok(provided) => provided,
        Err(_) => return ChecksumCheck::Unreadable(token.to_string()),
    };

    let mut data = Vec::with_capacity(body.len() + 1);
    data.extend_from_slice(body.as_bytes());
    data.push(b'!');
    let calculated = calculate_checksum(&data);

    debug!("Telegram checksum provided {:04X}, calculated {:04X}", provided, calculated);
    if provided == calculated {
        ChecksumCheck::Valid
    } else {
        ChecksumCheck::Mismatch { provided, calculated }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_checksum_arc_check_value() {
        // CRC-16/ARC check value
        assert_eq!(calculate_checksum(b"123456789"), 0xBB3D);
    }

    #[test]
    fn test_checksum_token() {
        assert_eq!(checksum_token("!1234\r\n"), "1234");
        assert_eq!(checksum_token("!\r\n"), "");
        assert_eq!(checksum_token("!"), "");
    }

    #[test]
    fn test_verify_checksum() {
        let body = "/XMX5LGBBFG10\r\n\r\n1-0:1.8.1(12972.117*kWh)\r\n";
        let mut data = body.as_bytes().to_vec();
        data.push(b'!');
        let crc = calculate_checksum(&data);

        assert_eq!(verify_checksum(body, &format!("!{:04X}\r\n", crc)), ChecksumCheck::Valid);
        assert_eq!(verify_checksum(body, &format!("!{:04x}", crc)), ChecksumCheck::Valid);
        assert_eq!(
            verify_checksum(body, &format!("!{:04X}\r\n", crc ^ 0x0101)),
            ChecksumCheck::Mismatch { provided: crc ^ 0x0101, calculated: crc }
        );
    }

    #[test]
    fn test_verify_checksum_without_token() {
        assert_eq!(verify_checksum("/ISk5\\2MT382-1000\r\n", "!\r\n"), ChecksumCheck::Absent);
    }

    #[test]
    fn test_verify_checksum_unreadable_token() {
        assert_eq!(
            verify_checksum("/X\r\n", "!ZZZZ\r\n"),
            ChecksumCheck::Unreadable("ZZZZ".to_string())
        );
        assert_eq!(
            verify_checksum("/X\r\n", "!12345\r\n"),
            ChecksumCheck::Unreadable("12345".to_string())
        );
    }
}
