//! Report command handler

use anyhow::Result;
use chrono::{NaiveDate, Utc};

use stockroom_core::reports::build_report;
use stockroom_core::{Collection, CollectionQuery, DateRange, ReportKind, Store};

use crate::output::Output;

/// Range for `--from`/`--to`; with neither, the last 30 days
pub fn range_for(from: Option<NaiveDate>, to: Option<NaiveDate>, today: NaiveDate) -> DateRange {
    if from.is_none() && to.is_none() {
        DateRange::default_for(today)
    } else {
        DateRange::new(from, to)
    }
}

pub fn show(
    store: &Store,
    kind: ReportKind,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    output: &Output,
) -> Result<()> {
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            anyhow::bail!("--from {} is after --to {}", from, to);
        }
    }
    let range = range_for(from, to, Utc::now().date_naive());

    let products = store.products(&CollectionQuery::new(Collection::Products))?;
    let sales = store.sales(&CollectionQuery::new(Collection::Sales))?;
    let purchases = store.purchases(&CollectionQuery::new(Collection::Purchases))?;

    let report = build_report(kind, &range, &products, &sales, &purchases);
    if !output.is_json() && !output.is_quiet() {
        println!("{} report, {}", kind, describe(&range));
        println!();
    }
    output.print_report(&report);
    Ok(())
}

fn describe(range: &DateRange) -> String {
    match (range.from, range.to) {
        (Some(from), Some(to)) => format!("{} to {}", from, to),
        (Some(from), None) => format!("since {}", from),
        (None, Some(to)) => format!("until {}", to),
        (None, None) => "all time".to_string(),
    }
}
