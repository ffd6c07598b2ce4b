use chrono::{Datelike, Months, NaiveDate};

/// Whole months elapsed from `due_date` to `calculation_date`, counting any
/// leftover day as one more month. Zero unless the due date is strictly
/// earlier.
///
/// Month arithmetic clamps to the end of shorter months, so 31 Jan to 28 Feb
/// is exactly one month.
pub fn elapsed_months(due_date: NaiveDate, calculation_date: NaiveDate) -> u32 {
    if due_date >= calculation_date {
        return 0;
    }

    let span = (calculation_date.year() - due_date.year()) * 12
        + calculation_date.month() as i32
        - due_date.month() as i32;
    let mut whole = u32::try_from(span).unwrap_or(0);

    let mut anchor = shift(due_date, whole);
    while whole > 0 && anchor > calculation_date {
        whole -= 1;
        anchor = shift(due_date, whole);
    }

    if anchor < calculation_date {
        whole + 1
    } else {
        whole
    }
}

fn shift(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months)).unwrap_or(NaiveDate::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn not_overdue_is_zero() {
        assert_eq!(elapsed_months(date(2024, 5, 10), date(2024, 5, 10)), 0);
        assert_eq!(elapsed_months(date(2024, 6, 1), date(2024, 5, 10)), 0);
    }

    #[test]
    fn single_day_counts_as_a_month() {
        assert_eq!(elapsed_months(date(2024, 5, 9), date(2024, 5, 10)), 1);
    }

    #[test]
    fn exact_months() {
        assert_eq!(elapsed_months(date(2024, 1, 15), date(2024, 2, 15)), 1);
        assert_eq!(elapsed_months(date(2022, 3, 10), date(2024, 3, 10)), 24);
    }

    #[test]
    fn partial_month_rounds_up() {
        assert_eq!(elapsed_months(date(2024, 1, 15), date(2024, 2, 16)), 2);
        assert_eq!(elapsed_months(date(2023, 12, 20), date(2024, 2, 10)), 2);
    }

    #[test]
    fn end_of_month_clamps() {
        assert_eq!(elapsed_months(date(2024, 1, 31), date(2024, 2, 29)), 1);
        assert_eq!(elapsed_months(date(2023, 1, 31), date(2023, 2, 28)), 1);
        assert_eq!(elapsed_months(date(2024, 1, 31), date(2024, 3, 1)), 2);
    }

    #[test]
    fn later_day_in_next_month_is_not_a_full_month() {
        // 20 Jan + 1 month = 20 Feb, past 5 Feb
        assert_eq!(elapsed_months(date(2024, 1, 20), date(2024, 2, 5)), 1);
    }
}
