//! The aggregation engine: pure functions that reduce a set of transactions
//! to the derived analytics views (overview totals, category breakdown,
//! monthly trends and spending patterns).
//!
//! These functions never touch the database; callers fetch the relevant
//! transactions first (see [crate::transaction::query]) and hand them in.
//! An empty transaction set always produces zero-valued/empty results,
//! never an error.

use std::collections::BTreeMap;

use serde::Serialize;
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

use crate::{
    Error,
    category::Category,
    transaction::{Transaction, TransactionKind},
};

/// The format analytics query parameters supply dates in.
const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Short month names, January first.
const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Day names indexed by day-of-week, Sunday first.
const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// An inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: Date,
    pub end_date: Date,
}

impl DateRange {
    /// Create a date range.
    ///
    /// # Errors
    /// Returns an [Error::InvalidRange] if `start_date` is after `end_date`.
    pub fn new(start_date: Date, end_date: Date) -> Result<Self, Error> {
        if start_date > end_date {
            return Err(Error::InvalidRange);
        }

        Ok(Self {
            start_date,
            end_date,
        })
    }

    /// Create a date range from optional client supplied strings.
    ///
    /// Missing bounds default to the current month to date: the first of
    /// `today`'s month through `today`.
    ///
    /// # Errors
    /// Returns an [Error::Validation] if a supplied date cannot be parsed as
    /// an ISO calendar date, or an [Error::InvalidRange] if the start is
    /// after the end.
    pub fn from_params(
        start_date: Option<&str>,
        end_date: Option<&str>,
        today: Date,
    ) -> Result<Self, Error> {
        let start_date = match start_date {
            Some(text) => parse_date(text)?,
            None => today
                .replace_day(1)
                .expect("the first of a month is always a valid date"),
        };
        let end_date = match end_date {
            Some(text) => parse_date(text)?,
            None => today,
        };

        Self::new(start_date, end_date)
    }
}

/// Parse a client supplied ISO calendar date, e.g. `2026-01-15`.
///
/// # Errors
/// Returns an [Error::Validation] if the text is not a valid date.
pub fn parse_date(text: &str) -> Result<Date, Error> {
    Date::parse(text, DATE_FORMAT)
        .map_err(|_| Error::Validation("Invalid date format".to_owned()))
}

/// Round to two decimal places, the precision used for derived rates and
/// percentages.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Income and expense totals for a period.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_income: f64,
    pub total_expenses: f64,
    /// Always exactly `total_income - total_expenses`.
    pub net_income: f64,
    /// Percentage of income kept, rounded to two decimal places. Zero when
    /// there is no income. Deliberately unclamped: expenses larger than
    /// income produce a negative rate.
    pub savings_rate: f64,
}

/// Sum transaction amounts per kind and derive net income and savings rate.
pub fn overview(transactions: &[Transaction]) -> Overview {
    let mut total_income = 0.0;
    let mut total_expenses = 0.0;

    for transaction in transactions {
        match transaction.kind {
            TransactionKind::Income => total_income += transaction.amount,
            TransactionKind::Expense => total_expenses += transaction.amount,
        }
    }

    let net_income = total_income - total_expenses;
    let savings_rate = if total_income > 0.0 {
        round2(net_income / total_income * 100.0)
    } else {
        0.0
    };

    Overview {
        total_income,
        total_expenses,
        net_income,
        savings_rate,
    }
}

/// The expense total for one category within a period.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryExpense {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub amount: f64,
    pub transaction_count: u64,
    /// Share of the period's total expenses, rounded to two decimal places.
    pub percentage: f64,
}

/// Expense totals per category, largest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdown {
    pub categories: Vec<CategoryExpense>,
    pub total_expenses: f64,
}

/// Sum expense amounts and transaction counts per category.
///
/// Categories with no expenses in the set are excluded; the rest are ordered
/// by amount descending (ties broken by name so the output is stable), with
/// percentages computed against the total across included categories.
pub fn category_breakdown(
    transactions: &[Transaction],
    categories: &[Category],
) -> CategoryBreakdown {
    let mut totals: BTreeMap<i64, (f64, u64)> = BTreeMap::new();

    for transaction in transactions {
        if transaction.kind != TransactionKind::Expense {
            continue;
        }

        let entry = totals.entry(transaction.category_id).or_insert((0.0, 0));
        entry.0 += transaction.amount;
        entry.1 += 1;
    }

    let mut included: Vec<CategoryExpense> = categories
        .iter()
        .filter_map(|category| {
            let &(amount, transaction_count) = totals.get(&category.id)?;

            (amount > 0.0).then(|| CategoryExpense {
                id: category.id,
                name: category.name.to_string(),
                color: category.color.clone(),
                amount,
                transaction_count,
                percentage: 0.0,
            })
        })
        .collect();

    included.sort_by(|a, b| {
        b.amount
            .total_cmp(&a.amount)
            .then_with(|| a.name.cmp(&b.name))
    });

    let total_expenses: f64 = included.iter().map(|category| category.amount).sum();

    for category in &mut included {
        category.percentage = if total_expenses > 0.0 {
            round2(category.amount / total_expenses * 100.0)
        } else {
            0.0
        };
    }

    CategoryBreakdown {
        categories: included,
        total_expenses,
    }
}

/// Income, expenses and net for one month of a year.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthBucket {
    /// The month in `YYYY-MM` format.
    pub month: String,
    pub month_name: &'static str,
    pub income: f64,
    pub expenses: f64,
    pub net: f64,
}

/// A fixed-length series of per-month totals for a year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTrends {
    pub year: i32,
    pub months: Vec<MonthBucket>,
}

/// Build exactly `months` zero-filled buckets for `year`, January first,
/// then overlay the actual per-month sums.
///
/// Transactions dated outside `year` or beyond the requested number of
/// months are ignored.
pub fn monthly_trends(transactions: &[Transaction], year: i32, months: u8) -> MonthlyTrends {
    let mut buckets: Vec<MonthBucket> = (0..months as usize)
        .map(|index| MonthBucket {
            month: format!("{year:04}-{month:02}", month = index + 1),
            month_name: MONTH_NAMES[index],
            income: 0.0,
            expenses: 0.0,
            net: 0.0,
        })
        .collect();

    for transaction in transactions {
        if transaction.date.year() != year {
            continue;
        }

        let month_index = transaction.date.month() as usize - 1;
        let Some(bucket) = buckets.get_mut(month_index) else {
            continue;
        };

        match transaction.kind {
            TransactionKind::Income => bucket.income += transaction.amount,
            TransactionKind::Expense => bucket.expenses += transaction.amount,
        }
    }

    for bucket in &mut buckets {
        bucket.net = bucket.income - bucket.expenses;
    }

    MonthlyTrends {
        year,
        months: buckets,
    }
}

/// The average transaction amount for one (day-of-week, hour-of-day, kind)
/// group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingPattern {
    /// Day of week, 0–6 Sunday first.
    pub day_of_week: u8,
    pub day_name: &'static str,
    /// Hour of day, 0–23, taken from the time the transaction was recorded.
    pub hour_of_day: u8,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub avg_amount: f64,
    pub transaction_count: u64,
}

/// When-money-moves histogram groups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendingPatterns {
    pub patterns: Vec<SpendingPattern>,
}

/// Group transactions by (day-of-week, hour-of-day, kind) and compute the
/// arithmetic mean amount and count per group, ordered by day then hour.
///
/// The day of week comes from the transaction's user-assigned date; the hour
/// comes from the creation timestamp, since calendar dates carry no time of
/// day.
pub fn spending_patterns(transactions: &[Transaction]) -> SpendingPatterns {
    let mut groups: BTreeMap<(u8, u8, TransactionKind), (f64, u64)> = BTreeMap::new();

    for transaction in transactions {
        let day_of_week = transaction.date.weekday().number_days_from_sunday();
        let hour_of_day = transaction.created_at.hour();

        let entry = groups
            .entry((day_of_week, hour_of_day, transaction.kind))
            .or_insert((0.0, 0));
        entry.0 += transaction.amount;
        entry.1 += 1;
    }

    let patterns = groups
        .into_iter()
        .map(|((day_of_week, hour_of_day, kind), (sum, count))| SpendingPattern {
            day_of_week,
            day_name: DAY_NAMES[day_of_week as usize],
            hour_of_day,
            kind,
            avg_amount: sum / count as f64,
            transaction_count: count,
        })
        .collect();

    SpendingPatterns { patterns }
}

#[cfg(test)]
mod date_range_tests {
    use time::macros::date;

    use crate::Error;

    use super::DateRange;

    #[test]
    fn start_after_end_fails() {
        let result = DateRange::new(date!(2026 - 02 - 01), date!(2026 - 01 - 01));

        assert_eq!(result, Err(Error::InvalidRange));
    }

    #[test]
    fn from_params_parses_iso_dates() {
        let range = DateRange::from_params(
            Some("2026-01-01"),
            Some("2026-01-31"),
            date!(2026 - 06 - 15),
        )
        .unwrap();

        assert_eq!(range.start_date, date!(2026 - 01 - 01));
        assert_eq!(range.end_date, date!(2026 - 01 - 31));
    }

    #[test]
    fn from_params_defaults_to_month_to_date() {
        let range = DateRange::from_params(None, None, date!(2026 - 06 - 15)).unwrap();

        assert_eq!(range.start_date, date!(2026 - 06 - 01));
        assert_eq!(range.end_date, date!(2026 - 06 - 15));
    }

    #[test]
    fn from_params_rejects_garbage() {
        for text in ["yesterday", "2026-13-01", "01/02/2026", ""] {
            let result =
                DateRange::from_params(Some(text), None, date!(2026 - 06 - 15));
            assert!(
                matches!(result, Err(Error::Validation(_))),
                "accepted {text:?}"
            );
        }
    }
}

#[cfg(test)]
mod aggregation_tests {
    use time::{Date, macros::datetime};

    use crate::{
        category::{Category, CategoryName},
        transaction::{Transaction, TransactionKind},
    };

    use super::{
        category_breakdown, monthly_trends, overview, spending_patterns,
    };

    fn transaction(
        amount: f64,
        kind: TransactionKind,
        category_id: i64,
        date: Date,
    ) -> Transaction {
        Transaction {
            id: 0,
            user_id: 1,
            category_id,
            amount,
            kind,
            description: None,
            date,
            created_at: datetime!(2026-01-20 12:30 UTC),
            updated_at: datetime!(2026-01-20 12:30 UTC),
        }
    }

    fn category(id: i64, name: &str) -> Category {
        Category {
            id,
            name: CategoryName::new_unchecked(name),
            description: None,
            color: "#3B82F6".to_owned(),
            created_at: datetime!(2026-01-01 0:00 UTC),
        }
    }

    #[test]
    fn overview_matches_worked_example() {
        use time::macros::date;

        let transactions = [
            transaction(50.0, TransactionKind::Expense, 1, date!(2026 - 01 - 10)),
            transaction(30.0, TransactionKind::Expense, 1, date!(2026 - 01 - 20)),
            transaction(200.0, TransactionKind::Income, 2, date!(2026 - 01 - 15)),
        ];

        let got = overview(&transactions);

        assert_eq!(got.total_income, 200.0);
        assert_eq!(got.total_expenses, 80.0);
        assert_eq!(got.net_income, 120.0);
        assert_eq!(got.savings_rate, 60.0);
    }

    #[test]
    fn overview_net_income_is_income_minus_expenses() {
        use time::macros::date;

        let transactions = [
            transaction(123.45, TransactionKind::Income, 1, date!(2026 - 03 - 01)),
            transaction(67.89, TransactionKind::Expense, 1, date!(2026 - 03 - 02)),
        ];

        let got = overview(&transactions);

        assert_eq!(got.net_income, got.total_income - got.total_expenses);
    }

    #[test]
    fn overview_savings_rate_is_zero_without_income() {
        use time::macros::date;

        let transactions = [transaction(
            42.0,
            TransactionKind::Expense,
            1,
            date!(2026 - 01 - 10),
        )];

        let got = overview(&transactions);

        assert_eq!(got.savings_rate, 0.0);
        assert_eq!(got.net_income, -42.0);
    }

    #[test]
    fn overview_savings_rate_rounds_to_two_decimals() {
        use time::macros::date;

        let transactions = [
            transaction(300.0, TransactionKind::Income, 1, date!(2026 - 01 - 10)),
            transaction(100.0, TransactionKind::Expense, 1, date!(2026 - 01 - 11)),
        ];

        // 200 / 300 * 100 = 66.666...
        assert_eq!(overview(&transactions).savings_rate, 66.67);
    }

    #[test]
    fn overview_savings_rate_is_not_clamped() {
        use time::macros::date;

        let transactions = [
            transaction(100.0, TransactionKind::Income, 1, date!(2026 - 01 - 10)),
            transaction(300.0, TransactionKind::Expense, 1, date!(2026 - 01 - 11)),
        ];

        assert_eq!(overview(&transactions).savings_rate, -200.0);
    }

    #[test]
    fn overview_of_empty_set_is_all_zeros() {
        let got = overview(&[]);

        assert_eq!(got.total_income, 0.0);
        assert_eq!(got.total_expenses, 0.0);
        assert_eq!(got.net_income, 0.0);
        assert_eq!(got.savings_rate, 0.0);
    }

    #[test]
    fn breakdown_matches_worked_example() {
        use time::macros::date;

        let categories = [category(1, "A"), category(2, "Wages")];
        let transactions = [
            transaction(50.0, TransactionKind::Expense, 1, date!(2026 - 01 - 10)),
            transaction(30.0, TransactionKind::Expense, 1, date!(2026 - 01 - 20)),
            transaction(200.0, TransactionKind::Income, 2, date!(2026 - 01 - 15)),
        ];

        let got = category_breakdown(&transactions, &categories);

        assert_eq!(got.total_expenses, 80.0);
        assert_eq!(got.categories.len(), 1);
        assert_eq!(got.categories[0].name, "A");
        assert_eq!(got.categories[0].amount, 80.0);
        assert_eq!(got.categories[0].transaction_count, 2);
        assert_eq!(got.categories[0].percentage, 100.0);
    }

    #[test]
    fn breakdown_orders_by_amount_and_percentages_sum_to_100() {
        use time::macros::date;

        let categories = [
            category(1, "Groceries"),
            category(2, "Transport"),
            category(3, "Rent"),
        ];
        let transactions = [
            transaction(20.0, TransactionKind::Expense, 1, date!(2026 - 01 - 02)),
            transaction(10.0, TransactionKind::Expense, 2, date!(2026 - 01 - 03)),
            transaction(70.0, TransactionKind::Expense, 3, date!(2026 - 01 - 04)),
        ];

        let got = category_breakdown(&transactions, &categories);

        let names: Vec<&str> = got
            .categories
            .iter()
            .map(|category| category.name.as_str())
            .collect();
        assert_eq!(names, ["Rent", "Groceries", "Transport"]);

        let percentage_sum: f64 = got
            .categories
            .iter()
            .map(|category| category.percentage)
            .sum();
        assert!(
            (percentage_sum - 100.0).abs() < 0.01,
            "percentages sum to {percentage_sum}"
        );
    }

    #[test]
    fn breakdown_excludes_categories_without_expenses() {
        use time::macros::date;

        let categories = [category(1, "Groceries"), category(2, "Wages")];
        let transactions = [
            transaction(20.0, TransactionKind::Expense, 1, date!(2026 - 01 - 02)),
            transaction(900.0, TransactionKind::Income, 2, date!(2026 - 01 - 03)),
        ];

        let got = category_breakdown(&transactions, &categories);

        assert_eq!(got.categories.len(), 1);
        assert_eq!(got.categories[0].name, "Groceries");
    }

    #[test]
    fn breakdown_of_empty_set_is_empty() {
        let got = category_breakdown(&[], &[category(1, "Groceries")]);

        assert!(got.categories.is_empty());
        assert_eq!(got.total_expenses, 0.0);
    }

    #[test]
    fn monthly_trends_always_has_requested_number_of_months() {
        let got = monthly_trends(&[], 2026, 12);

        assert_eq!(got.year, 2026);
        assert_eq!(got.months.len(), 12);
        assert_eq!(got.months[0].month, "2026-01");
        assert_eq!(got.months[0].month_name, "Jan");
        assert_eq!(got.months[11].month, "2026-12");
        assert_eq!(got.months[11].month_name, "Dec");
        assert!(
            got.months
                .iter()
                .all(|month| month.income == 0.0 && month.expenses == 0.0 && month.net == 0.0)
        );
    }

    #[test]
    fn monthly_trends_overlays_sums_on_the_right_months() {
        use time::macros::date;

        let transactions = [
            transaction(100.0, TransactionKind::Income, 1, date!(2026 - 03 - 01)),
            transaction(40.0, TransactionKind::Expense, 1, date!(2026 - 03 - 20)),
            transaction(10.0, TransactionKind::Expense, 1, date!(2026 - 11 - 05)),
            // A different year must not leak in.
            transaction(999.0, TransactionKind::Income, 1, date!(2025 - 03 - 01)),
        ];

        let got = monthly_trends(&transactions, 2026, 12);

        assert_eq!(got.months[2].income, 100.0);
        assert_eq!(got.months[2].expenses, 40.0);
        assert_eq!(got.months[2].net, 60.0);
        assert_eq!(got.months[10].expenses, 10.0);
        assert_eq!(got.months[10].net, -10.0);
        assert_eq!(got.months[0].income, 0.0);
    }

    #[test]
    fn monthly_trends_respects_shorter_series() {
        use time::macros::date;

        let transactions = [transaction(
            10.0,
            TransactionKind::Expense,
            1,
            date!(2026 - 12 - 25),
        )];

        let got = monthly_trends(&transactions, 2026, 6);

        assert_eq!(got.months.len(), 6);
    }

    #[test]
    fn spending_patterns_groups_and_averages() {
        use time::macros::date;

        // 2026-01-05 is a Monday.
        let monday = date!(2026 - 01 - 05);
        let transactions = [
            transaction(10.0, TransactionKind::Expense, 1, monday),
            transaction(30.0, TransactionKind::Expense, 1, monday),
            transaction(500.0, TransactionKind::Income, 2, monday),
        ];

        let got = spending_patterns(&transactions);

        assert_eq!(got.patterns.len(), 2);

        let expense = got
            .patterns
            .iter()
            .find(|pattern| pattern.kind == TransactionKind::Expense)
            .unwrap();
        assert_eq!(expense.day_of_week, 1);
        assert_eq!(expense.day_name, "Monday");
        assert_eq!(expense.hour_of_day, 12);
        assert_eq!(expense.avg_amount, 20.0);
        assert_eq!(expense.transaction_count, 2);
    }

    #[test]
    fn spending_patterns_of_empty_set_is_empty() {
        assert!(spending_patterns(&[]).patterns.is_empty());
    }
}
