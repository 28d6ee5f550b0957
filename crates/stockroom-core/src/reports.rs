//! Reports and dashboard figures
//!
//! Everything here is a pure function over slices the caller has already
//! loaded, so the same code serves one-off reports and live dashboards.
//! Day boundaries are UTC.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Product, Purchase, Sale};

/// Days covered by the default report range, counting back from today
pub const DEFAULT_RANGE_DAYS: u64 = 30;

/// Rows kept in the top-selling report
pub const TOP_SELLING_LIMIT: usize = 10;

/// Days shown in the dashboard sales chart, today included
pub const DAILY_SALES_DAYS: u64 = 7;

// ==================== Date range ====================

/// Inclusive range of calendar days; an open end is unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    /// The last [`DEFAULT_RANGE_DAYS`] days up to and including `today`
    pub fn default_for(today: NaiveDate) -> Self {
        Self {
            from: today.checked_sub_days(Days::new(DEFAULT_RANGE_DAYS)),
            to: Some(today),
        }
    }

    /// Unbounded on both ends
    pub fn all() -> Self {
        Self::new(None, None)
    }

    /// Whether `at` falls on or after the start of `from` and before the
    /// start of the day after `to`
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        if let Some(from) = self.from {
            if at < start_of(from) {
                return false;
            }
        }
        if let Some(to) = self.to {
            if let Some(next) = to.succ_opt() {
                if at >= start_of(next) {
                    return false;
                }
            }
        }
        true
    }
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
    day.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// ==================== Report kinds ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Sales,
    Purchases,
    Inventory,
    TopSelling,
    Profitability,
}

impl ReportKind {
    pub const ALL: [ReportKind; 5] = [
        ReportKind::Sales,
        ReportKind::Purchases,
        ReportKind::Inventory,
        ReportKind::TopSelling,
        ReportKind::Profitability,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ReportKind::Sales => "sales",
            ReportKind::Purchases => "purchases",
            ReportKind::Inventory => "inventory",
            ReportKind::TopSelling => "top-selling",
            ReportKind::Profitability => "profitability",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = ReportKind::ALL.iter().map(|k| k.name()).collect();
                format!("unknown report '{}', expected one of: {}", s, names.join(", "))
            })
    }
}

// ==================== Rows ====================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopSellingRow {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitabilityRow {
    pub product_id: Uuid,
    pub name: String,
    pub units_sold: i64,
    pub total_revenue: f64,
    pub total_cost: f64,
    pub profit: f64,
}

/// A computed report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "rows", rename_all = "kebab-case")]
pub enum Report {
    Sales(Vec<Sale>),
    Purchases(Vec<Purchase>),
    Inventory(Vec<Product>),
    TopSelling(Vec<TopSellingRow>),
    Profitability(Vec<ProfitabilityRow>),
}

impl Report {
    pub fn kind(&self) -> ReportKind {
        match self {
            Report::Sales(_) => ReportKind::Sales,
            Report::Purchases(_) => ReportKind::Purchases,
            Report::Inventory(_) => ReportKind::Inventory,
            Report::TopSelling(_) => ReportKind::TopSelling,
            Report::Profitability(_) => ReportKind::Profitability,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Report::Sales(rows) => rows.len(),
            Report::Purchases(rows) => rows.len(),
            Report::Inventory(rows) => rows.len(),
            Report::TopSelling(rows) => rows.len(),
            Report::Profitability(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build a report of `kind`
///
/// The range filters sales and purchases; the inventory report and the
/// product list behind profitability are never filtered.
pub fn build_report(
    kind: ReportKind,
    range: &DateRange,
    products: &[Product],
    sales: &[Sale],
    purchases: &[Purchase],
) -> Report {
    match kind {
        ReportKind::Sales => Report::Sales(sales_in(range, sales).cloned().collect()),
        ReportKind::Purchases => Report::Purchases(
            purchases
                .iter()
                .filter(|p| range.contains(p.purchase_date))
                .cloned()
                .collect(),
        ),
        ReportKind::Inventory => Report::Inventory(products.to_vec()),
        ReportKind::TopSelling => Report::TopSelling(top_selling(range, sales)),
        ReportKind::Profitability => Report::Profitability(profitability(range, products, sales)),
    }
}

fn sales_in<'a>(range: &'a DateRange, sales: &'a [Sale]) -> impl Iterator<Item = &'a Sale> {
    sales.iter().filter(|s| range.contains(s.sale_date))
}

/// Units sold per product, most first
///
/// The name comes from the first sale seen for each product. Ties keep
/// first-seen order.
pub fn top_selling(range: &DateRange, sales: &[Sale]) -> Vec<TopSellingRow> {
    let mut rows: Vec<TopSellingRow> = Vec::new();
    let mut index: HashMap<Uuid, usize> = HashMap::new();

    for sale in sales_in(range, sales) {
        match index.get(&sale.product_id) {
            Some(&i) => rows[i].quantity += sale.quantity,
            None => {
                index.insert(sale.product_id, rows.len());
                rows.push(TopSellingRow {
                    product_id: sale.product_id,
                    name: sale.product_name.clone(),
                    quantity: sale.quantity,
                });
            }
        }
    }

    rows.sort_by(|a, b| b.quantity.cmp(&a.quantity));
    rows.truncate(TOP_SELLING_LIMIT);
    rows
}

/// Revenue against cost for every current product
///
/// Cost uses the product's current unit cost, not what was paid at the
/// time.
pub fn profitability(range: &DateRange, products: &[Product], sales: &[Sale]) -> Vec<ProfitabilityRow> {
    let mut sold: HashMap<Uuid, (i64, f64)> = HashMap::new();
    for sale in sales_in(range, sales) {
        let entry = sold.entry(sale.product_id).or_default();
        entry.0 += sale.quantity;
        entry.1 += sale.total;
    }

    products
        .iter()
        .map(|product| {
            let (units_sold, total_revenue) = sold.get(&product.id).copied().unwrap_or_default();
            let total_cost = units_sold as f64 * product.cost;
            ProfitabilityRow {
                product_id: product.id,
                name: product.name.clone(),
                units_sold,
                total_revenue,
                total_cost,
                profit: total_revenue - total_cost,
            }
        })
        .collect()
}

// ==================== Dashboard ====================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_products: usize,
    /// Sum of all sale totals, all time
    pub total_sales_value: f64,
    /// Number of purchase records
    pub total_purchases: usize,
}

impl DashboardStats {
    pub fn compute(products: &[Product], sales: &[Sale], purchases: &[Purchase]) -> Self {
        Self {
            total_products: products.len(),
            total_sales_value: sales.iter().map(|s| s.total).sum(),
            total_purchases: purchases.len(),
        }
    }
}

/// Products at or below their reorder point
pub fn low_stock(products: &[Product]) -> Vec<Product> {
    products.iter().filter(|p| p.is_low_stock()).cloned().collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySales {
    pub date: NaiveDate,
    pub total: f64,
}

/// Sales totals for the [`DAILY_SALES_DAYS`] days ending `today`, oldest
/// first, with zero for days without sales
pub fn daily_sales(sales: &[Sale], today: NaiveDate) -> Vec<DailySales> {
    let days: Vec<NaiveDate> = (0..DAILY_SALES_DAYS)
        .rev()
        .filter_map(|back| today.checked_sub_days(Days::new(back)))
        .collect();

    let mut totals: HashMap<NaiveDate, f64> = HashMap::new();
    for sale in sales {
        *totals.entry(sale.sale_date.date_naive()).or_default() += sale.total;
    }

    days.into_iter()
        .map(|date| DailySales {
            date,
            total: totals.get(&date).copied().unwrap_or(0.0),
        })
        .collect()
}
