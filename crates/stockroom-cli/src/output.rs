//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use stockroom_core::reports::{DailySales, DashboardStats, ProfitabilityRow, TopSellingRow};
use stockroom_core::{Product, Purchase, Report, Sale};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Everything the dashboard shows
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub stats: DashboardStats,
    pub low_stock: Vec<Product>,
    pub daily_sales: Vec<DailySales>,
    pub recent_sales: Vec<Sale>,
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
    currency: String,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            currency: "USD".to_string(),
        }
    }

    /// Use `currency` when printing money amounts
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Format a money amount in the configured currency
    pub fn money(&self, amount: f64) -> String {
        format_money(amount, &self.currency)
    }

    /// Print a single product
    pub fn print_product(&self, product: &Product) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:            {}", product.id);
                println!("Name:          {}", product.name);
                println!("Category:      {}", product.category);
                if !product.sku.is_empty() {
                    println!("SKU:           {}", product.sku);
                }
                println!("Price:         {}", self.money(product.price));
                println!("Cost:          {}", self.money(product.cost));
                println!(
                    "Stock:         {}{}",
                    product.stock_quantity,
                    if product.is_low_stock() { " (low)" } else { "" }
                );
                println!("Reorder point: {}", product.reorder_point);
                if !product.image_url.is_empty() {
                    println!("Image:         {}", product.image_url);
                }
                if !product.image_hint.is_empty() {
                    println!("Image hint:    {}", product.image_hint);
                }
                println!("Created:       {}", product.created_at.format("%Y-%m-%d %H:%M"));
                println!("Updated:       {}", product.updated_at.format("%Y-%m-%d %H:%M"));
            }
            OutputFormat::Json => print_json(product),
            OutputFormat::Quiet => println!("{}", product.id),
        }
    }

    /// Print a list of products
    pub fn print_products(&self, products: &[Product]) {
        match self.format {
            OutputFormat::Human => {
                if products.is_empty() {
                    println!("No products found.");
                    return;
                }
                for product in products {
                    println!(
                        "{} | {:<30} | {:<15} | {:>10} | {:>5}{}",
                        short_id(&product.id),
                        truncate(&product.name, 30),
                        truncate(&product.category, 15),
                        self.money(product.price),
                        product.stock_quantity,
                        if product.is_low_stock() { " !" } else { "" }
                    );
                }
                println!("\n{} product(s)", products.len());
            }
            OutputFormat::Json => print_json(&products),
            OutputFormat::Quiet => {
                for product in products {
                    println!("{}", product.id);
                }
            }
        }
    }

    pub fn print_sale(&self, sale: &Sale) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", sale.id);
                println!("Product:  {} ({})", sale.product_name, short_id(&sale.product_id));
                println!("Quantity: {}", sale.quantity);
                println!("Total:    {}", self.money(sale.total));
                println!("Date:     {}", sale.sale_date.format("%Y-%m-%d %H:%M"));
            }
            OutputFormat::Json => print_json(sale),
            OutputFormat::Quiet => println!("{}", sale.id),
        }
    }

    pub fn print_sales(&self, sales: &[Sale]) {
        match self.format {
            OutputFormat::Human => {
                if sales.is_empty() {
                    println!("No sales found.");
                    return;
                }
                for sale in sales {
                    println!(
                        "{} | {} | {:<30} | {:>5} | {:>10}",
                        short_id(&sale.id),
                        sale.sale_date.format("%Y-%m-%d"),
                        truncate(&sale.product_name, 30),
                        sale.quantity,
                        self.money(sale.total)
                    );
                }
                println!("\n{} sale(s)", sales.len());
            }
            OutputFormat::Json => print_json(&sales),
            OutputFormat::Quiet => {
                for sale in sales {
                    println!("{}", sale.id);
                }
            }
        }
    }

    pub fn print_purchase(&self, purchase: &Purchase) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:         {}", purchase.id);
                println!(
                    "Product:    {} ({})",
                    purchase.product_name,
                    short_id(&purchase.product_id)
                );
                println!("Quantity:   {}", purchase.quantity);
                println!("Unit cost:  {}", self.money(purchase.cost));
                println!("Total cost: {}", self.money(purchase.total_cost));
                println!("Date:       {}", purchase.purchase_date.format("%Y-%m-%d %H:%M"));
            }
            OutputFormat::Json => print_json(purchase),
            OutputFormat::Quiet => println!("{}", purchase.id),
        }
    }

    pub fn print_purchases(&self, purchases: &[Purchase]) {
        match self.format {
            OutputFormat::Human => {
                if purchases.is_empty() {
                    println!("No purchases found.");
                    return;
                }
                for purchase in purchases {
                    println!(
                        "{} | {} | {:<30} | {:>5} x {:>10} | {:>10}",
                        short_id(&purchase.id),
                        purchase.purchase_date.format("%Y-%m-%d"),
                        truncate(&purchase.product_name, 30),
                        purchase.quantity,
                        self.money(purchase.cost),
                        self.money(purchase.total_cost)
                    );
                }
                println!("\n{} purchase(s)", purchases.len());
            }
            OutputFormat::Json => print_json(&purchases),
            OutputFormat::Quiet => {
                for purchase in purchases {
                    println!("{}", purchase.id);
                }
            }
        }
    }

    /// Print a computed report
    pub fn print_report(&self, report: &Report) {
        match (self.format, report) {
            (OutputFormat::Json, _) => print_json(report),
            (_, Report::Sales(rows)) => self.print_sales(rows),
            (_, Report::Purchases(rows)) => self.print_purchases(rows),
            (_, Report::Inventory(rows)) => self.print_products(rows),
            (OutputFormat::Quiet, Report::TopSelling(rows)) => {
                for row in rows {
                    println!("{}", row.product_id);
                }
            }
            (OutputFormat::Quiet, Report::Profitability(rows)) => {
                for row in rows {
                    println!("{}", row.product_id);
                }
            }
            (OutputFormat::Human, Report::TopSelling(rows)) => self.print_top_selling(rows),
            (OutputFormat::Human, Report::Profitability(rows)) => self.print_profitability(rows),
        }
    }

    fn print_top_selling(&self, rows: &[TopSellingRow]) {
        if rows.is_empty() {
            println!("No sales in this period.");
            return;
        }
        for (rank, row) in rows.iter().enumerate() {
            println!("{:>2}. {:<30} {:>6} sold", rank + 1, truncate(&row.name, 30), row.quantity);
        }
    }

    fn print_profitability(&self, rows: &[ProfitabilityRow]) {
        if rows.is_empty() {
            println!("No sales in this period.");
            return;
        }
        println!(
            "{:<30} | {:>6} | {:>12} | {:>12} | {:>12}",
            "Product", "Units", "Revenue", "Cost", "Profit"
        );
        for row in rows {
            println!(
                "{:<30} | {:>6} | {:>12} | {:>12} | {:>12}",
                truncate(&row.name, 30),
                row.units_sold,
                self.money(row.total_revenue),
                self.money(row.total_cost),
                self.money(row.profit)
            );
        }
    }

    pub fn print_dashboard(&self, dashboard: &Dashboard) {
        match self.format {
            OutputFormat::Human => {
                let stats = &dashboard.stats;
                println!("Dashboard");
                println!("=========");
                println!();
                println!("Products:    {}", stats.total_products);
                println!("Sales value: {}", self.money(stats.total_sales_value));
                println!("Purchases:   {}", stats.total_purchases);
                println!();

                println!("Low stock ({}):", dashboard.low_stock.len());
                if dashboard.low_stock.is_empty() {
                    println!("  All products are above their reorder point.");
                }
                for product in &dashboard.low_stock {
                    println!(
                        "  {} | {:<30} | {} left (reorder at {})",
                        short_id(&product.id),
                        truncate(&product.name, 30),
                        product.stock_quantity,
                        product.reorder_point
                    );
                }
                println!();

                println!("Last {} days:", dashboard.daily_sales.len());
                let max = dashboard
                    .daily_sales
                    .iter()
                    .map(|d| d.total)
                    .fold(0.0_f64, f64::max);
                for day in &dashboard.daily_sales {
                    println!(
                        "  {} {:>10} {}",
                        day.date.format("%a %m-%d"),
                        self.money(day.total),
                        bar(day.total, max, 30)
                    );
                }
                println!();

                println!("Recent sales:");
                if dashboard.recent_sales.is_empty() {
                    println!("  No sales yet.");
                }
                for sale in &dashboard.recent_sales {
                    println!(
                        "  {} | {:<30} | {:>5} | {:>10}",
                        sale.sale_date.format("%Y-%m-%d"),
                        truncate(&sale.product_name, 30),
                        sale.quantity,
                        self.money(sale.total)
                    );
                }
            }
            OutputFormat::Json => print_json(dashboard),
            OutputFormat::Quiet => {
                for product in &dashboard.low_stock {
                    println!("{}", product.id);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: could not encode output: {}", e),
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Format `amount` with two decimals, prefixed by a symbol for common
/// currencies and suffixed by the code otherwise
fn format_money(amount: f64, currency: &str) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    let value = amount.abs();
    match currency {
        "USD" | "CAD" | "AUD" => format!("{}${:.2}", sign, value),
        "EUR" => format!("{}€{:.2}", sign, value),
        "GBP" => format!("{}£{:.2}", sign, value),
        other => format!("{}{:.2} {}", sign, value, other),
    }
}

/// Horizontal bar scaled against `max`
fn bar(value: f64, max: f64, width: usize) -> String {
    if max <= 0.0 || value <= 0.0 {
        return String::new();
    }
    let len = ((value / max) * width as f64).round().max(1.0) as usize;
    "█".repeat(len.min(width))
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
