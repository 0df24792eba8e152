//! Chat-facing text and keyboard layout for category prompts.
//!
//! Kept free of transport types so the layout can be tested directly.
//!
//! Button data names the prompt it belongs to as `<epoch>.<index>`:
//! `cat:<epoch>.<index>:<label>`, or `cat#<epoch>.<index>:<n>` (the n-th
//! choice) when the label would not fit.

use tally_core::{Prompt, PromptTag};

/// Callback data carrying the label itself
pub const LABEL_PREFIX: &str = "cat:";
/// Callback data carrying the label's position in the prompt's choices
pub const INDEX_PREFIX: &str = "cat#";
/// Telegram rejects callback data longer than this many bytes
pub const MAX_CALLBACK_BYTES: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub text: String,
    pub data: String,
}

/// Button payload a category press decodes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    Label(String),
    Index(usize),
}

pub fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{amount:.0}")
    } else {
        format!("{amount:.2}")
    }
}

pub fn prompt_text(prompt: &Prompt, currency: &str) -> String {
    let r = &prompt.record;
    let amount = format_amount(r.amount);
    let line = if r.is_credit() {
        format!("Received {currency}{amount} from {} on {}", r.merchant_name, r.date)
    } else {
        format!("Spent {currency}{amount} at {} on {}", r.merchant_name, r.date)
    };
    format!("What category for:\n\n🧾 {line}")
}

pub fn callback_data(tag: PromptTag, label: &str, choice: usize) -> String {
    let data = format!("{LABEL_PREFIX}{}.{}:{label}", tag.epoch, tag.index);
    if data.len() <= MAX_CALLBACK_BYTES {
        data
    } else {
        format!("{INDEX_PREFIX}{}.{}:{choice}", tag.epoch, tag.index)
    }
}

fn parse_tag(s: &str) -> Option<PromptTag> {
    let (epoch, index) = s.split_once('.')?;
    Some(PromptTag {
        epoch: epoch.parse().ok()?,
        index: index.parse().ok()?,
    })
}

pub fn parse_callback(data: &str) -> Option<(PromptTag, Choice)> {
    if let Some(rest) = data.strip_prefix(LABEL_PREFIX) {
        let (tag, label) = rest.split_once(':')?;
        return Some((parse_tag(tag)?, Choice::Label(label.to_string())));
    }
    let (tag, choice) = data.strip_prefix(INDEX_PREFIX)?.split_once(':')?;
    Some((parse_tag(tag)?, Choice::Index(choice.parse().ok()?)))
}

/// One button per choice, `columns` per row, in stored order.
pub fn keyboard_rows(prompt: &Prompt, columns: usize) -> Vec<Vec<Button>> {
    let tag = prompt.tag();
    let buttons: Vec<Button> = prompt
        .choices
        .iter()
        .enumerate()
        .map(|(i, label)| Button {
            text: label.clone(),
            data: callback_data(tag, label, i),
        })
        .collect();
    buttons
        .chunks(columns.max(1))
        .map(<[Button]>::to_vec)
        .collect()
}
