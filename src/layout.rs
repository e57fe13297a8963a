use serde::Serialize;

/// Columns at which two tables no longer fit next to each other.
pub const STACK_THRESHOLD: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    Single,
    Stacked,
    SideBySide,
}

/// Picks how a pair of finished tables is arranged. Passing the same table
/// on both sides means there is only one to show.
pub fn select_layout<T>(a: &T, b: &T, column_count: usize) -> Layout {
    if std::ptr::eq(a, b) {
        Layout::Single
    } else if column_count >= STACK_THRESHOLD {
        Layout::Stacked
    } else {
        Layout::SideBySide
    }
}

/// Layout for a pair where either side may be missing. Returns the layout
/// and the tables to draw, in order.
pub fn pair_layout<'a, T>(
    a: Option<&'a T>,
    b: Option<&'a T>,
    column_count: usize,
) -> Option<(Layout, Vec<&'a T>)> {
    match (a, b) {
        (Some(a), Some(b)) => {
            let layout = select_layout(a, b, column_count);
            let tables = if layout == Layout::Single { vec![a] } else { vec![a, b] };
            Some((layout, tables))
        }
        (Some(only), None) | (None, Some(only)) => {
            Some((select_layout(only, only, column_count), vec![only]))
        }
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_table_is_single() {
        let table = vec![1, 2, 3];
        assert_eq!(select_layout(&table, &table, 9), Layout::Single);
        assert_eq!(select_layout(&table, &table, 1), Layout::Single);
    }

    #[test]
    fn wide_pairs_stack() {
        let a = vec![1];
        let b = vec![1];
        assert_eq!(select_layout(&a, &b, 3), Layout::SideBySide);
        assert_eq!(select_layout(&a, &b, 4), Layout::Stacked);
        assert_eq!(select_layout(&a, &b, 0), Layout::SideBySide);
    }

    #[test]
    fn equal_but_distinct_tables_are_not_single() {
        let a = String::from("same");
        let b = a.clone();
        assert_eq!(select_layout(&a, &b, 2), Layout::SideBySide);
    }

    #[test]
    fn missing_side_collapses_to_single() {
        let a = vec![1];
        let (layout, tables) = pair_layout(Some(&a), None, 6).unwrap();
        assert_eq!(layout, Layout::Single);
        assert_eq!(tables.len(), 1);
        assert!(pair_layout::<Vec<i32>>(None, None, 6).is_none());

        let b = vec![2];
        let (layout, tables) = pair_layout(Some(&a), Some(&b), 6).unwrap();
        assert_eq!(layout, Layout::Stacked);
        assert_eq!(tables, vec![&a, &b]);
    }
}
