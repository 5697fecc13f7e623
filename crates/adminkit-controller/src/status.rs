//! Advisory status of a reference input's selected value.
//!
//! Classifies missing selected records as a warning (some of several are
//! gone) or an error (the single one, or all of them, are gone). UIs may use
//! this to flag dangling references; resolution itself never depends on it.

use std::collections::HashSet;

use serde_json::Value;

use adminkit_model::{Identifier, Record};

use crate::resolver::ResolvedChoices;

/// Message key when the single selected record is missing.
pub const SINGLE_MISSING: &str = "ra.input.references.single_missing";
/// Message key when some of several selected records are missing.
pub const MANY_MISSING: &str = "ra.input.references.many_missing";
/// Message key when every selected record is missing.
pub const ALL_MISSING: &str = "ra.input.references.all_missing";

/// Loading, warning and error state of a reference input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceStatus {
    /// Data is still loading.
    pub waiting: bool,
    /// Message key or text for a recoverable problem.
    pub warning: Option<String>,
    /// Message key or text for a blocking problem.
    pub error: Option<String>,
}

/// Status of `current_value` given a resolve result.
pub fn reference_status(resolved: &ResolvedChoices, current_value: &Value) -> ReferenceStatus {
    if resolved.is_loading {
        return ReferenceStatus {
            waiting: true,
            ..ReferenceStatus::default()
        };
    }
    if let Some(error) = &resolved.error
        && resolved.all_choices.is_empty()
    {
        return ReferenceStatus {
            error: Some(error.to_string()),
            ..ReferenceStatus::default()
        };
    }

    let ids = Identifier::list_from_value(current_value);
    let found: HashSet<&Identifier> = resolved.selected_choices.iter().map(Record::id).collect();
    let missing = ids.iter().filter(|id| !found.contains(id)).count();

    let mut status = ReferenceStatus::default();
    if missing == 0 {
        return status;
    }
    if !current_value.is_array() {
        status.error = Some(SINGLE_MISSING.to_string());
    } else if missing == ids.len() {
        status.error = Some(ALL_MISSING.to_string());
    } else {
        status.warning = Some(MANY_MISSING.to_string());
    }
    status
}
