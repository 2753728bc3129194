//! Effective values - fields of an item derived from the item and its holdings.
//!
//! An item's own location and call number parts win; anything it leaves blank
//! is inherited from its holdings record. These functions are pure, callers
//! decide when to persist the result.

mod shelf_key;

use crate::model::{is_blank, EffectiveCallNumberComponents, HoldingsRecord, Item};

pub use shelf_key::{normalize as normalize_call_number, shelving_order};

/// Location an item is effectively shelved at.
///
/// Blank location ids count as absent on both records.
pub fn effective_location_id(item: &Item, holdings: Option<&HoldingsRecord>) -> Option<String> {
    let item_location = first_non_blank(
        item.temporary_location_id.as_ref(),
        item.permanent_location_id.as_ref(),
    );
    item_location.or_else(|| {
        holdings.and_then(|h| {
            first_non_blank(
                h.temporary_location_id.as_ref(),
                h.permanent_location_id.as_ref(),
            )
        })
    })
}

fn first_non_blank(preferred: Option<&String>, fallback: Option<&String>) -> Option<String> {
    preferred
        .filter(|v| !is_blank(Some(v.as_str())))
        .or_else(|| fallback.filter(|v| !is_blank(Some(v.as_str()))))
        .cloned()
}

/// Call number parts, each one inherited independently.
pub fn effective_call_number_components(
    item: &Item,
    holdings: Option<&HoldingsRecord>,
) -> EffectiveCallNumberComponents {
    EffectiveCallNumberComponents {
        call_number: first_non_blank(
            item.item_level_call_number.as_ref(),
            holdings.and_then(|h| h.call_number.as_ref()),
        ),
        prefix: first_non_blank(
            item.item_level_call_number_prefix.as_ref(),
            holdings.and_then(|h| h.call_number_prefix.as_ref()),
        ),
        suffix: first_non_blank(
            item.item_level_call_number_suffix.as_ref(),
            holdings.and_then(|h| h.call_number_suffix.as_ref()),
        ),
        type_id: first_non_blank(
            item.item_level_call_number_type_id.as_ref(),
            holdings.and_then(|h| h.call_number_type_id.as_ref()),
        ),
    }
}

/// Set every effective field of `item` against `holdings`.
pub fn populate(item: &mut Item, holdings: Option<&HoldingsRecord>) {
    let components = effective_call_number_components(item, holdings);
    item.effective_location_id = effective_location_id(item, holdings);
    item.effective_shelving_order = shelving_order(&components, item);
    item.effective_call_number_components = Some(components);
}

/// Resolved copy of `item`, leaving the input untouched.
pub fn resolved(item: &Item, holdings: Option<&HoldingsRecord>) -> Item {
    let mut copy = item.clone();
    populate(&mut copy, holdings);
    copy
}

/// True when resolving against `holdings` would change a stored effective field.
pub fn is_stale(item: &Item, holdings: Option<&HoldingsRecord>) -> bool {
    let fresh = resolved(item, holdings);
    fresh.effective_location_id != item.effective_location_id
        || fresh.effective_call_number_components != item.effective_call_number_components
        || fresh.effective_shelving_order != item.effective_shelving_order
}

/// Temporary location if set, else permanent.
pub fn populate_holdings(holdings: &mut HoldingsRecord) {
    holdings.effective_location_id = first_non_blank(
        holdings.temporary_location_id.as_ref(),
        holdings.permanent_location_id.as_ref(),
    );
}

/// Items of `holdings` whose effective values change, as `(old, new)` pairs.
///
/// Items already consistent with the holdings are left out, so callers can
/// write and announce exactly the returned set.
pub fn cascade(holdings: &HoldingsRecord, items: &[Item]) -> Vec<(Item, Item)> {
    items
        .iter()
        .filter(|item| item.belongs_to(holdings))
        .filter(|item| is_stale(item, Some(holdings)))
        .map(|item| (item.clone(), resolved(item, Some(holdings))))
        .collect()
}
