//! Grouping, sorting and re-linearization of loaded rows.

use std::collections::HashMap;

use orderkit_io_xlsx::{SpecRow, derive_cell_text};

use crate::spec::{EnumBodyRow, EnumGroupRule, SpecGroup, SpecLinearized};

/// Trimmed text of `row[col]`; `""` for missing cells.
pub fn derive_key_text(row: &SpecRow, col: usize) -> String {
    derive_cell_text(row.cell(col)).trim().to_string()
}

////////////////////////////////////////////////////////////////////////////////
// #region Grouper

/// Partition `rows` into recipient groups. Rows with a blank recipient are dropped.
pub fn group_rows(rows: &[SpecRow], col_recipient: usize, rule: EnumGroupRule) -> Vec<SpecGroup> {
    match rule {
        EnumGroupRule::Contiguous => group_rows_contiguous(rows, col_recipient),
        EnumGroupRule::Keyed => group_rows_keyed(rows, col_recipient),
    }
}

fn group_rows_contiguous(rows: &[SpecRow], col_recipient: usize) -> Vec<SpecGroup> {
    let mut l_groups = Vec::new();
    let mut group_open: Option<SpecGroup> = None;

    for row in rows {
        let c_key = derive_key_text(row, col_recipient);
        if c_key.is_empty() {
            l_groups.extend(group_open.take());
            continue;
        }
        if let Some(group) = group_open.as_mut()
            && group.key == c_key
        {
            group.rows.push(row.clone());
            continue;
        }
        l_groups.extend(group_open.take());
        group_open = Some(SpecGroup {
            key: c_key,
            rows: vec![row.clone()],
        });
    }
    l_groups.extend(group_open);

    l_groups
}

fn group_rows_keyed(rows: &[SpecRow], col_recipient: usize) -> Vec<SpecGroup> {
    let mut l_groups: Vec<SpecGroup> = Vec::new();
    let mut dict_idx_by_key: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let c_key = derive_key_text(row, col_recipient);
        if c_key.is_empty() {
            continue;
        }
        match dict_idx_by_key.get(&c_key) {
            Some(n_idx) => l_groups[*n_idx].rows.push(row.clone()),
            None => {
                dict_idx_by_key.insert(c_key.clone(), l_groups.len());
                l_groups.push(SpecGroup {
                    key: c_key,
                    rows: vec![row.clone()],
                });
            }
        }
    }

    l_groups
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Sorter

/// Stable sort of one group's rows by product text (code-point order, blanks first).
pub fn sort_group(group: &SpecGroup, col_product: usize) -> SpecGroup {
    let mut l_rows = group.rows.clone();
    l_rows.sort_by_cached_key(|row| derive_key_text(row, col_product));
    SpecGroup {
        key: group.key.clone(),
        rows: l_rows,
    }
}

/// Stable sort of groups by the product text of their first row.
pub fn sequence_groups(groups: Vec<SpecGroup>, col_product: usize) -> Vec<SpecGroup> {
    let mut l_groups = groups;
    l_groups.sort_by_cached_key(|group| {
        group
            .rows
            .first()
            .map(|row| derive_key_text(row, col_product))
            .unwrap_or_default()
    });
    l_groups
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Linearizer

/// Emit groups back to back with one separator between consecutive groups.
pub fn linearize(groups: &[SpecGroup]) -> SpecLinearized {
    let mut linearized = SpecLinearized::default();
    for (n_idx_group, group) in groups.iter().enumerate() {
        if n_idx_group > 0 {
            linearized.idx_separators.push(linearized.rows.len());
            linearized.rows.push(EnumBodyRow::Separator);
        }
        linearized
            .rows
            .extend(group.rows.iter().cloned().map(EnumBodyRow::Data));
    }
    linearized
}

/// Keep source order and every row; separate adjacent rows whose non-blank
/// recipients differ.
pub fn linearize_flat(rows: &[SpecRow], col_recipient: usize) -> SpecLinearized {
    let mut linearized = SpecLinearized::default();
    let mut c_key_prev = String::new();

    for row in rows {
        let c_key = derive_key_text(row, col_recipient);
        if !c_key.is_empty() && !c_key_prev.is_empty() && c_key != c_key_prev {
            linearized.idx_separators.push(linearized.rows.len());
            linearized.rows.push(EnumBodyRow::Separator);
        }
        linearized.rows.push(EnumBodyRow::Data(row.clone()));
        c_key_prev = c_key;
    }
    linearized
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
