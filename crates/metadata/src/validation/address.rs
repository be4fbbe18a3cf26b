//! Address groups: `<prefix>_line1`, `<prefix>_city`, ... expanded with
//! geography enumerations.

use std::collections::BTreeSet;

use serde_json::{Map, Value as JsonValue};

use fieldops_core::FieldViolation;

use crate::descriptor::{EntityDescriptor, FieldType};

use super::constraint::{FieldConstraint, Pattern};

pub const ADDRESS_SUFFIXES: [&str; 6] = ["line1", "line2", "city", "state", "postal_code", "country"];

pub const SUPPORTED_COUNTRIES: [&str; 2] = ["US", "CA"];

pub const US_STATES: [&str; 51] = [
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN", "IA",
    "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ", "NM",
    "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT", "VA", "WA",
    "WV", "WI", "WY",
];

pub const CA_PROVINCES: [&str; 13] = [
    "AB", "BC", "MB", "NB", "NL", "NS", "NT", "NU", "ON", "PE", "QC", "SK", "YT",
];

const POSTAL_CODE_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9 -]{2,9}$";

/// Subdivision codes of a supported country.
pub fn subdivisions(country: &str) -> Option<&'static [&'static str]> {
    match country {
        "US" => Some(&US_STATES),
        "CA" => Some(&CA_PROVINCES),
        _ => None,
    }
}

/// Prefixes of every address group the entity declares (a group exists when
/// `<prefix>_line1` is a field).
pub fn address_prefixes(descriptor: &EntityDescriptor) -> BTreeSet<String> {
    descriptor
        .fields
        .keys()
        .filter_map(|name| name.strip_suffix("_line1"))
        .filter(|prefix| !prefix.is_empty())
        .map(str::to_string)
        .collect()
}

/// The address part a field plays, if it belongs to one of `prefixes`.
pub fn address_part<'a>(field: &'a str, prefixes: &BTreeSet<String>) -> Option<&'a str> {
    prefixes.iter().find_map(|prefix| {
        let rest = field.strip_prefix(prefix.as_str())?.strip_prefix('_')?;
        ADDRESS_SUFFIXES.contains(&rest).then_some(rest)
    })
}

/// Constraint for one address part.
pub fn address_constraint(part: &str) -> Option<FieldConstraint> {
    let constraint = match part {
        "line1" => FieldConstraint::new(FieldType::String).length(Some(1), Some(255)),
        "line2" => FieldConstraint::new(FieldType::String).length(None, Some(255)),
        "city" => FieldConstraint::new(FieldType::String).length(Some(1), Some(100)),
        "state" => {
            let codes: BTreeSet<&str> = US_STATES.iter().chain(CA_PROVINCES.iter()).copied().collect();
            FieldConstraint::new(FieldType::Enum)
                .one_of(codes)
                .message("must be a supported state or province code")
        }
        "postal_code" => FieldConstraint::new(FieldType::String)
            .pattern(Pattern::new(POSTAL_CODE_PATTERN).ok()?)
            .message("must be a valid postal code"),
        "country" => FieldConstraint::new(FieldType::Enum)
            .one_of(SUPPORTED_COUNTRIES)
            .message(format!("must be one of: {}", SUPPORTED_COUNTRIES.join(", "))),
        _ => return None,
    };
    Some(constraint)
}

/// State must belong to the country when both are present.
pub fn check_coherence(prefix: &str, payload: &Map<String, JsonValue>) -> Option<FieldViolation> {
    let state_field = format!("{prefix}_state");
    let state = payload.get(&state_field)?.as_str()?;
    let country = payload.get(&format!("{prefix}_country"))?.as_str()?;
    let codes = subdivisions(country)?;
    if codes.contains(&state) {
        None
    } else {
        Some(FieldViolation::new(
            state_field,
            format!("'{state}' is not a subdivision of {country}"),
        ))
    }
}
