use crate::entities::order;

/// Number a refund's counter hangs off: the parent's order number, or its id
/// when the store does not assign numbers.
pub fn refund_number_base(parent: &order::Model) -> String {
    let number = parent.order_number.trim();
    if number.is_empty() {
        parent.id.to_string()
    } else {
        number.to_string()
    }
}

/// Next `{base}{suffix}{n}` given the numbers of the parent's existing refunds.
///
/// `n` is one past the highest counter already issued under this base. When
/// none of the existing numbers carry the suffix the count of existing
/// refunds is used instead.
pub fn next_refund_number<S: AsRef<str>>(base: &str, suffix: &str, existing: &[S]) -> String {
    let prefix = format!("{}{}", base, suffix);
    let highest = existing
        .iter()
        .filter_map(|number| number.as_ref().strip_prefix(prefix.as_str()))
        .filter_map(|counter| counter.parse::<u64>().ok())
        .max();

    let next = match highest {
        Some(counter) => counter + 1,
        None => existing.len() as u64 + 1,
    };
    format!("{}{}", prefix, next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[], "1042-R-1")]
    #[case(&["1042-R-1"], "1042-R-2")]
    #[case(&["1042-R-1", "1042-R-2"], "1042-R-3")]
    #[case(&["1042-R-2", "1042-R-1"], "1042-R-3")]
    #[case(&["1042-R-9", "1042-R-10"], "1042-R-11")]
    fn counter_follows_highest_issued(#[case] existing: &[&str], #[case] expected: &str) {
        assert_eq!(next_refund_number("1042", "-R-", existing), expected);
    }

    #[test]
    fn unsuffixed_children_fall_back_to_count() {
        assert_eq!(next_refund_number("77", "-R-", &["legacy-a", "legacy-b"]), "77-R-3");
    }

    #[test]
    fn other_bases_are_ignored() {
        assert_eq!(
            next_refund_number("10", "-R-", &["100-R-4", "10-R-1"]),
            "10-R-2"
        );
    }

    #[test]
    fn custom_suffix() {
        assert_eq!(next_refund_number("A7", "/cr/", &["A7/cr/1"]), "A7/cr/2");
    }
}
