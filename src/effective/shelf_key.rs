//! Shelf keys - sortable renderings of call numbers.
//!
//! Text is uppercased and whitespace collapsed. Integer runs are left padded
//! so `QA 9` files before `QA 10`. Digits after a period, including those
//! behind cutter letters such as `.B42`, are decimal fractions and stay as is.

use crate::model::{EffectiveCallNumberComponents, Item};

const NUMBER_WIDTH: usize = 6;

/// Normalize one call number fragment.
pub fn normalize(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len() + NUMBER_WIDTH);
    let mut digits = String::new();
    let mut after_period = false;
    let mut pending_space = false;

    let flush = |out: &mut String, digits: &mut String, after_period: bool| {
        if digits.is_empty() {
            return;
        }
        if !after_period && digits.len() < NUMBER_WIDTH {
            out.extend(std::iter::repeat('0').take(NUMBER_WIDTH - digits.len()));
        }
        out.push_str(digits);
        digits.clear();
    };

    for ch in fragment.trim().chars() {
        if ch.is_ascii_digit() {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            digits.push(ch);
            continue;
        }

        flush(&mut out, &mut digits, after_period);
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            after_period = false;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        after_period = ch == '.' || (after_period && ch.is_alphabetic());
        out.extend(ch.to_uppercase());
    }
    flush(&mut out, &mut digits, after_period);
    out
}

/// Shelving order of an item from its effective call number and enumeration.
///
/// Absent when the item has no effective call number.
pub fn shelving_order(components: &EffectiveCallNumberComponents, item: &Item) -> Option<String> {
    let call_number = components.call_number.as_deref().filter(|c| !c.trim().is_empty())?;

    let parts = [
        Some(call_number),
        item.volume.as_deref(),
        item.enumeration.as_deref(),
        item.chronology.as_deref(),
        item.copy_number.as_deref(),
        components.suffix.as_deref(),
    ];

    let key = parts
        .iter()
        .flatten()
        .map(|part| normalize(part))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    Some(key)
}
