//! Category labels from a sheet's data-validation rule.
//!
//! The category column carries a "list of items" dropdown; its items are the
//! allowed labels. Anything else (no rule, a range-based rule, a non-text
//! item) yields no categories.

pub const ONE_OF_LIST: &str = "ONE_OF_LIST";

/// Backend-neutral view of a validation condition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationRule {
    pub kind: Option<String>,
    /// `userEnteredValue` of each item; `None` when the item is not text
    pub values: Vec<Option<String>>,
}

pub fn categories_from_rule(rule: Option<&ValidationRule>) -> Vec<String> {
    let Some(rule) = rule else {
        return Vec::new();
    };
    if rule.kind.as_deref() != Some(ONE_OF_LIST) {
        return Vec::new();
    }
    rule.values
        .iter()
        .cloned()
        .collect::<Option<Vec<String>>>()
        .unwrap_or_default()
}
