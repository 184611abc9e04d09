//! Address deduplication and padding.
//!
//! Walks a symbol group sorted by section, then address. Symbols sharing an
//! address are folded into the first one, and the gap between consecutive
//! symbols is attributed to the later symbol as padding.

use anyhow::Result;
use std::collections::HashSet;

use crate::config::PaddingThresholds;
use crate::error::IntegrityError;
use crate::symbol::SymbolGroup;

/// Folds same-address symbols and fills in `padding` for every survivor.
///
/// Returns the number of symbols removed.
pub fn remove_duplicates_and_calculate_padding(
    group: &mut SymbolGroup,
    thresholds: PaddingThresholds,
) -> Result<usize> {
    let symbols = group.as_mut_slice();
    let mut to_remove = HashSet::new();
    let Some(first) = symbols.first() else {
        return Ok(0);
    };
    let mut seen_sections = HashSet::from([first.section_name.clone()]);
    // Index of the last symbol that was not folded away.
    let mut prev_idx = 0;

    for i in 1..symbols.len() {
        let (head, tail) = symbols.split_at_mut(i);
        let prev = &mut head[prev_idx];
        let symbol = &mut tail[0];

        if prev.section_name != symbol.section_name {
            if !seen_sections.insert(symbol.section_name.clone()) {
                return Err(IntegrityError::UnsortedSections {
                    section: symbol.section_name.clone(),
                }
                .into());
            }
            prev_idx = i;
            continue;
        }
        if symbol.address <= 0 || prev.address <= 0 {
            prev_idx = i;
            continue;
        }
        if symbol.address < prev.address {
            return Err(IntegrityError::UnsortedAddresses {
                section: symbol.section_name.clone(),
                previous: prev.address,
                address: symbol.address,
            }
            .into());
        }

        // Fold symbols at the same address (nm output lists aliases).
        if symbol.address == prev.address && prev.size_without_padding() != 0 {
            let folded = prev.size_without_padding().max(symbol.size);
            prev.size = folded + prev.padding;
            to_remove.insert(i);
            continue;
        }
        prev_idx = i;

        // Overlaps are possible even without duplicates; padding goes negative.
        let padding = symbol.address - prev.end_address();
        if !symbol.is_placeholder() {
            if let Some(threshold) = thresholds.for_section(symbol.section) {
                if padding >= threshold {
                    // Data with no symbol of its own, e.g. a map line with a
                    // file but no name.
                    tracing::debug!(
                        "Large padding of {} between:\n  A) {:?}\n  B) {:?}",
                        padding,
                        prev,
                        symbol
                    );
                    continue;
                }
            }
        }
        symbol.padding = padding;
        symbol.size += padding;
        if symbol.size < 0 {
            return Err(IntegrityError::NegativeSize {
                name: symbol.name.clone(),
                address: symbol.address,
                size: symbol.size,
                padding,
            }
            .into());
        }
    }

    let removed = to_remove.len();
    if removed > 0 {
        tracing::info!("Removing {} overlapping symbols", removed);
        group.remove_indices(&to_remove);
    }
    Ok(removed)
}
