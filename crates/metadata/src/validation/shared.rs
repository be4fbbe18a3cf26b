//! Reusable definitions for common field names.
//!
//! A field named like one of these gets the shared definition regardless of
//! the entity it lives on, so `email` means the same thing on customers and
//! users. The entity still decides whether the field is required.

use crate::descriptor::FieldType;

use super::constraint::{FieldConstraint, Pattern};

pub const SHARED_FIELDS: [&str; 8] = [
    "email",
    "phone",
    "first_name",
    "last_name",
    "name",
    "description",
    "notes",
    "title",
];

const PHONE_PATTERN: &str = r"^\+?[0-9][0-9 ().-]{6,19}$";

pub fn shared_constraint(field: &str) -> Option<FieldConstraint> {
    let constraint = match field {
        "email" => FieldConstraint::new(FieldType::Email)
            .length(Some(3), Some(255))
            .message("must be a valid email address"),
        "phone" => FieldConstraint::new(FieldType::Phone)
            .pattern(Pattern::new(PHONE_PATTERN).ok()?)
            .message("must be a valid phone number"),
        "first_name" | "last_name" => FieldConstraint::new(FieldType::String).length(Some(1), Some(100)),
        "name" => FieldConstraint::new(FieldType::String).length(Some(1), Some(150)),
        "title" => FieldConstraint::new(FieldType::String).length(Some(1), Some(255)),
        "description" => FieldConstraint::new(FieldType::Text).length(None, Some(5000)),
        "notes" => FieldConstraint::new(FieldType::Text).length(None, Some(10000)),
        _ => return None,
    };
    Some(constraint)
}
