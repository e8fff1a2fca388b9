//! Per-product quantity totals.

use std::collections::HashMap;

use orderkit_io_xlsx::{SpecRow, parse_number};

use crate::group::derive_key_text;
use crate::spec::{EnumSummaryOrder, SpecSummaryEntry};

/// Sum quantities per trimmed product name.
///
/// Rows with a blank product are skipped; missing or unparseable quantities
/// count as 0. Never fails.
pub fn aggregate<'a>(
    rows: impl IntoIterator<Item = &'a SpecRow>,
    col_product: usize,
    col_quantity: usize,
    rule_order: EnumSummaryOrder,
) -> Vec<SpecSummaryEntry> {
    let mut l_entries: Vec<SpecSummaryEntry> = Vec::new();
    let mut dict_idx_by_product: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let c_product = derive_key_text(row, col_product);
        if c_product.is_empty() {
            continue;
        }
        let n_qty = parse_number(row.cell(col_quantity)).unwrap_or(0.0);
        match dict_idx_by_product.get(&c_product) {
            Some(n_idx) => l_entries[*n_idx].total += n_qty,
            None => {
                dict_idx_by_product.insert(c_product.clone(), l_entries.len());
                l_entries.push(SpecSummaryEntry {
                    product: c_product,
                    total: n_qty,
                });
            }
        }
    }

    if rule_order == EnumSummaryOrder::ByProduct {
        l_entries.sort_by(|a, b| a.product.cmp(&b.product));
    }
    l_entries
}
