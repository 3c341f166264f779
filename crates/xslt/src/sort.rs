//! Stable multi-key sorting of node lists for `xsl:sort`.
use std::cmp::Ordering;
use weft_xpath1::Expression;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDataType {
    #[default]
    Text,
    Number,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub select: Expression,
    pub order: SortOrder,
    pub data_type: SortDataType,
}

#[derive(Debug, Clone, PartialEq)]
enum SortValue {
    Text(String),
    Number(f64),
}

impl SortValue {
    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            // NaN sorts before every number.
            (SortValue::Number(a), SortValue::Number(b)) => match (a.is_nan(), b.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            },
            (SortValue::Number(_), SortValue::Text(_)) => Ordering::Less,
            (SortValue::Text(_), SortValue::Number(_)) => Ordering::Greater,
        }
    }
}

/// The value of one sort key for one item, as produced by the caller's evaluator.
pub enum KeyValue {
    Text(String),
    Number(f64),
}

/// Sorts `items` by `keys`, keeping the original relative order of items whose
/// keys are all equal. `eval(key, item, position, size)` computes a key value with
/// `item` as the context node at its 1-based position in the unsorted list.
pub fn sort_by_keys<T, E, F>(items: Vec<T>, keys: &[SortKey], mut eval: F) -> Result<Vec<T>, E>
where
    T: Copy,
    F: FnMut(&SortKey, T, usize, usize) -> Result<KeyValue, E>,
{
    if keys.is_empty() || items.len() < 2 {
        return Ok(items);
    }
    let size = items.len();
    let mut rows = Vec::with_capacity(size);
    for (i, item) in items.iter().enumerate() {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            let value = match eval(key, *item, i + 1, size)? {
                KeyValue::Text(s) => SortValue::Text(s),
                KeyValue::Number(n) => SortValue::Number(n),
            };
            values.push(value);
        }
        rows.push((i, values));
    }

    // `sort_by` is stable.
    rows.sort_by(|(_, a), (_, b)| {
        for (k, key) in keys.iter().enumerate() {
            let ord = a[k].compare(&b[k]);
            let ord = match key.order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(rows.into_iter().map(|(i, _)| items[i]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use weft_xpath1::parse_expression;

    fn key(order: SortOrder, data_type: SortDataType) -> SortKey {
        SortKey {
            select: parse_expression(".").unwrap(),
            order,
            data_type,
        }
    }

    fn sort(items: Vec<(&'static str, usize)>, keys: &[SortKey]) -> Vec<usize> {
        sort_by_keys(items, keys, |key, (value, _), _, _| {
            Ok::<_, Infallible>(match key.data_type {
                SortDataType::Text => KeyValue::Text(value.to_string()),
                SortDataType::Number => KeyValue::Number(value.parse().unwrap_or(f64::NAN)),
            })
        })
        .unwrap()
        .into_iter()
        .map(|(_, id)| id)
        .collect()
    }

    #[test]
    fn test_ascending_sort_is_stable() {
        let items = vec![("b", 0), ("a", 1), ("b", 2), ("a", 3), ("b", 4)];
        let keys = [key(SortOrder::Ascending, SortDataType::Text)];
        assert_eq!(sort(items, &keys), vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn test_descending_keeps_ties_in_input_order() {
        let items = vec![("1", 0), ("2", 1), ("1", 2), ("2", 3)];
        let keys = [key(SortOrder::Descending, SortDataType::Number)];
        assert_eq!(sort(items, &keys), vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_numeric_sort_puts_nan_first() {
        let items = vec![("10", 0), ("x", 1), ("9", 2), ("-1", 3)];
        let keys = [key(SortOrder::Ascending, SortDataType::Number)];
        assert_eq!(sort(items, &keys), vec![1, 3, 2, 0]);
    }

    #[test]
    fn test_text_sort_by_codepoint() {
        let items = vec![("b", 0), ("B", 1), ("10", 2), ("9", 3)];
        let keys = [key(SortOrder::Ascending, SortDataType::Text)];
        assert_eq!(sort(items, &keys), vec![2, 3, 1, 0]);
    }

    #[test]
    fn test_positions_are_from_the_unsorted_list() {
        let items = vec![3, 1, 2];
        let mut seen = Vec::new();
        sort_by_keys(items, &[key(SortOrder::Ascending, SortDataType::Number)], |_, item, pos, size| {
            seen.push((item, pos, size));
            Ok::<_, Infallible>(KeyValue::Number(item as f64))
        })
        .unwrap();
        assert_eq!(seen, vec![(3, 1, 3), (1, 2, 3), (2, 3, 3)]);
    }
}
