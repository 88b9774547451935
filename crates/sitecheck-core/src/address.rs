//! Address parsing.
//!
//! Addresses are expected in the form `"123 Main St, City, ST"`. The
//! jurisdiction is taken from the last two comma-separated parts.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::types::Jurisdiction;

lazy_static! {
    static ref ADDRESS_PATTERN: Regex =
        Regex::new(r"(?i)^.+,\s*[\w\s]+,\s*[A-Z]{2}$").expect("address pattern is valid");
}

/// Errors from address parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid address format: '{0}'. Please use '123 Main St, City, ST'.")]
    InvalidFormat(String),
}

/// Check whether an address roughly follows the `Street, City, ST` pattern.
pub fn is_well_formed(address: &str) -> bool {
    ADDRESS_PATTERN.is_match(address.trim())
}

/// Extract the jurisdiction (city, state) from a full address.
///
/// The state abbreviation is upper-cased; the city keeps its spelling.
pub fn parse_jurisdiction(address: &str) -> Result<Jurisdiction, AddressError> {
    let trimmed = address.trim();
    if !is_well_formed(trimmed) {
        return Err(AddressError::InvalidFormat(trimmed.to_string()));
    }

    let parts: Vec<&str> = trimmed
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    match parts.as_slice() {
        [.., _, city, state] => Ok(Jurisdiction::new(*city, state.to_uppercase())),
        _ => Err(AddressError::InvalidFormat(trimmed.to_string())),
    }
}

/// Normalize free-form address text for fingerprinting: trimmed,
/// lower-cased, with runs of whitespace collapsed to one space.
pub fn normalize(address: &str) -> String {
    address
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_city_and_state() {
        let j = parse_jurisdiction("123 Solar Way, Phoenix, AZ").unwrap();
        assert_eq!(j, Jurisdiction::new("Phoenix", "AZ"));
    }

    #[test]
    fn test_state_is_upper_cased() {
        let j = parse_jurisdiction("  456 Elm Street, Austin, tx ").unwrap();
        assert_eq!(j.state, "TX");
        assert_eq!(j.city, "Austin");
    }

    #[test]
    fn test_multi_part_street_uses_last_two_parts() {
        let j = parse_jurisdiction("Unit 4, 9 Ray Rd, Tempe, AZ").unwrap();
        assert_eq!(j, Jurisdiction::new("Tempe", "AZ"));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_jurisdiction("???").is_err());
        assert!(parse_jurisdiction("").is_err());
        assert!(parse_jurisdiction("Phoenix, AZ").is_err());
        assert!(parse_jurisdiction("1 Main St, Phoenix, Arizona").is_err());
    }

    #[test]
    fn test_error_message_names_expected_format() {
        let err = parse_jurisdiction("???").unwrap_err();
        assert!(err.to_string().contains("123 Main St, City, ST"));
    }

    #[test]
    fn test_normalize_collapses_whitespace_and_case() {
        assert_eq!(
            normalize("  123  Solar WAY,\tPhoenix, AZ "),
            "123 solar way, phoenix, az"
        );
    }
}
