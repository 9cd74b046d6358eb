use std::env;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

static VTENSOR_TEST_SEED: OnceLock<u64> = OnceLock::new();

/// Seed shared by every tester in this process.
///
/// `VTENSOR_TEST_SEED` pins it so a failure can be replayed; otherwise each
/// run draws a fresh value from the clock.
pub fn test_seed() -> u64 {
    *VTENSOR_TEST_SEED.get_or_init(|| match env::var("VTENSOR_TEST_SEED") {
        Ok(value) if !value.trim().is_empty() => parse_seed(&value).unwrap_or_else(|| {
            panic!("VTENSOR_TEST_SEED={value:?} is not an unsigned integer")
        }),
        _ => SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or(0x5EED),
    })
}

fn parse_seed(value: &str) -> Option<u64> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_seed;

    #[test]
    fn parses_decimal_and_hex() {
        assert_eq!(parse_seed(" 42 "), Some(42));
        assert_eq!(parse_seed("0xff"), Some(255));
        assert_eq!(parse_seed("seed"), None);
    }
}
