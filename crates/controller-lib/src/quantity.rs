//! Kubernetes resource quantity parsing
//!
//! Converts CPU and memory quantities into the integer units used by
//! [`ResourceTier`](crate::models::ResourceTier): millicores and mebibytes.

use crate::error::QuantityError;

const MIB: f64 = 1024.0 * 1024.0;

/// Absorbs float error so exact MiB values never round up
const ROUNDING_SLACK: f64 = 1e-9;

/// Parse a CPU quantity (`250m`, `0.25`, `2`, `500000u`) into millicores
pub fn parse_cpu_millis(quantity: &str) -> Result<u32, QuantityError> {
    let q = quantity.trim();
    let (number, scale) = match q.char_indices().last() {
        Some((idx, 'm')) => (&q[..idx], 1.0),
        Some((idx, 'u')) => (&q[..idx], 0.001),
        Some((idx, 'n')) => (&q[..idx], 0.000_001),
        _ => (q, 1000.0),
    };

    let millis = parse_number(quantity, number)? * scale;
    to_u32(quantity, millis.round())
}

/// Parse a memory quantity (`250Mi`, `1Gi`, `262144000`, `256M`) into MiB
///
/// Byte counts that are not a whole number of MiB are rounded up.
pub fn parse_memory_mib(quantity: &str) -> Result<u32, QuantityError> {
    let q = quantity.trim();
    let split = q
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(q.len());
    let (number, suffix) = q.split_at(split);

    let multiplier = match suffix {
        "" => 1.0,
        "Ki" => 1024.0,
        "Mi" => MIB,
        "Gi" => MIB * 1024.0,
        "Ti" => MIB * 1024.0 * 1024.0,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        _ => return Err(QuantityError::UnknownSuffix(quantity.to_string())),
    };

    let bytes = parse_number(quantity, number)? * multiplier;
    to_u32(quantity, (bytes / MIB - ROUNDING_SLACK).ceil().max(0.0))
}

/// Render millicores the way Kubernetes would (`250m`, `2`)
pub fn format_cpu_millis(millis: u32) -> String {
    if millis != 0 && millis % 1000 == 0 {
        format!("{}", millis / 1000)
    } else {
        format!("{}m", millis)
    }
}

/// Render mebibytes as `Gi` when whole, `Mi` otherwise
pub fn format_memory_mib(mib: u32) -> String {
    if mib != 0 && mib % 1024 == 0 {
        format!("{}Gi", mib / 1024)
    } else {
        format!("{}Mi", mib)
    }
}

fn parse_number(quantity: &str, number: &str) -> Result<f64, QuantityError> {
    let value: f64 = number
        .parse()
        .map_err(|_| QuantityError::Malformed(quantity.to_string()))?;

    if !value.is_finite() || value < 0.0 {
        return Err(QuantityError::Malformed(quantity.to_string()));
    }

    Ok(value)
}

fn to_u32(quantity: &str, value: f64) -> Result<u32, QuantityError> {
    if value > u32::MAX as f64 {
        return Err(QuantityError::OutOfRange(quantity.to_string()));
    }
    Ok(value as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu() {
        assert_eq!(parse_cpu_millis("250m").unwrap(), 250);
        assert_eq!(parse_cpu_millis("0.25").unwrap(), 250);
        assert_eq!(parse_cpu_millis("2").unwrap(), 2000);
        assert_eq!(parse_cpu_millis("500000u").unwrap(), 500);
        assert_eq!(parse_cpu_millis(" 1.5 ").unwrap(), 1500);
    }

    #[test]
    fn test_parse_cpu_rejects_garbage() {
        assert!(matches!(
            parse_cpu_millis("lots"),
            Err(QuantityError::Malformed(_))
        ));
        assert!(parse_cpu_millis("-1").is_err());
        assert!(parse_cpu_millis("").is_err());
    }

    #[test]
    fn test_parse_memory() {
        assert_eq!(parse_memory_mib("250Mi").unwrap(), 250);
        assert_eq!(parse_memory_mib("1Gi").unwrap(), 1024);
        assert_eq!(parse_memory_mib("262144000").unwrap(), 250);
        assert_eq!(parse_memory_mib("512Ki").unwrap(), 1);
        // 256M is 244.14Mi, rounded up
        assert_eq!(parse_memory_mib("256M").unwrap(), 245);
    }

    #[test]
    fn test_parse_memory_unknown_suffix() {
        assert!(matches!(
            parse_memory_mib("10Xi"),
            Err(QuantityError::UnknownSuffix(_))
        ));
    }

    #[test]
    fn test_format() {
        assert_eq!(format_cpu_millis(250), "250m");
        assert_eq!(format_cpu_millis(1000), "1");
        assert_eq!(format_cpu_millis(0), "0m");
        assert_eq!(format_memory_mib(500), "500Mi");
        assert_eq!(format_memory_mib(2048), "2Gi");
    }

    #[test]
    fn test_format_parse_agree() {
        for millis in [1, 250, 999, 1000, 1500, 4000] {
            assert_eq!(parse_cpu_millis(&format_cpu_millis(millis)).unwrap(), millis);
        }
        for mib in [1, 250, 500, 1024, 3072] {
            assert_eq!(parse_memory_mib(&format_memory_mib(mib)).unwrap(), mib);
        }
    }
}
