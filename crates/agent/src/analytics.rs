//! Analytics Responder: read-only answers for stock, revenue, profit, sales,
//! expenses and catalog questions. A keyword classifier picks the query; every
//! answer is a parameterized read against the ledger views.

use chrono::{Duration, NaiveDate};
use ledgerbot_core::domain::ledger::{Expense, SaleStatus};
use ledgerbot_core::domain::product::Product;
use ledgerbot_core::money::format_cents;
use ledgerbot_db::{AnalyticsQueries, LedgerError, ProfitTotals, SaleSummary, StockLevel};
use tracing::info;

use crate::resolver::scoring::{score_name, ParsedReference};
use crate::resolver::text::{is_product_type, variant_of, words};

const RECENT_SALES_LIMIT: u32 = 10;
const EXPENSES_LIMIT: u32 = 20;

pub const GENERAL_GUIDANCE: &str = "No terminé de entender la consulta. Puedo ayudarte con:\n\
• Stock: \"¿cuántas pulseras negras hay?\"\n\
• Ingresos: \"¿cuánto vendí en total?\"\n\
• Ganancia: \"¿cuál es mi ganancia?\"\n\
• Ventas: \"mostrame las últimas ventas\"\n\
• Gastos: \"¿qué gastos hice esta semana?\"\n\
• Productos: \"¿qué productos tengo y a qué precio?\"";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalyticsKind {
    Stock,
    Revenue,
    Profit,
    Sales,
    Expenses,
    Products,
    General,
}

impl AnalyticsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stock => "STOCK",
            Self::Revenue => "REVENUE",
            Self::Profit => "PROFIT",
            Self::Sales => "SALES",
            Self::Expenses => "EXPENSES",
            Self::Products => "PRODUCTS",
            Self::General => "GENERAL",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeWindow {
    Today,
    Week,
    Month,
    All,
}

impl TimeWindow {
    pub fn since(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Today => Some(today),
            Self::Week => Some(today - Duration::days(7)),
            Self::Month => Some(today - Duration::days(30)),
            Self::All => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalyticsQuery {
    pub kind: AnalyticsKind,
    pub window: TimeWindow,
    /// Product-type and variant words that narrow a stock answer.
    pub product_words: Vec<String>,
}

/// Checked in order; the first rule with a matching word wins.
const RULES: &[(AnalyticsKind, &[&str])] = &[
    (
        AnalyticsKind::Profit,
        &["ganancia", "ganancias", "ganado", "gane", "profit", "utilidad", "beneficio", "perdida"],
    ),
    (
        AnalyticsKind::Expenses,
        &["gasto", "gastos", "gastado", "gaste", "expense", "expenses", "costos", "spent", "spending"],
    ),
    (
        AnalyticsKind::Revenue,
        &["ingreso", "ingresos", "revenue", "facturado", "facture", "vendido", "income"],
    ),
    (AnalyticsKind::Sales, &["venta", "ventas", "sales", "historial", "transacciones"]),
    (AnalyticsKind::Stock, &["stock", "inventario", "inventory", "quedan", "queda"]),
    (
        AnalyticsKind::Products,
        &["producto", "productos", "product", "products", "precio", "precios", "price", "prices", "sku", "catalogo", "catalog"],
    ),
    (AnalyticsKind::Stock, &["cuantas", "cuantos", "tengo", "hay", "many"]),
];

pub fn classify_question(question: &str) -> AnalyticsQuery {
    let words = words(question);
    let has = |vocabulary: &[&str]| words.iter().any(|word| vocabulary.contains(&word.as_str()));

    let kind = RULES
        .iter()
        .find(|(_, vocabulary)| has(vocabulary))
        .map(|(kind, _)| *kind)
        .unwrap_or(AnalyticsKind::General);

    let window = if has(&["semana", "week", "semanal"]) {
        TimeWindow::Week
    } else if has(&["mes", "month", "mensual"]) {
        TimeWindow::Month
    } else if has(&["hoy", "today"]) {
        TimeWindow::Today
    } else {
        TimeWindow::All
    };

    let product_words = words
        .iter()
        .filter(|word| is_product_type(word) || variant_of(word).is_some())
        .cloned()
        .collect();

    AnalyticsQuery { kind, window, product_words }
}

#[derive(Clone)]
pub struct AnalyticsResponder {
    queries: AnalyticsQueries,
}

impl AnalyticsResponder {
    pub fn new(queries: AnalyticsQueries) -> Self {
        Self { queries }
    }

    pub async fn answer(&self, question: &str, today: NaiveDate) -> Result<String, LedgerError> {
        let query = classify_question(question);
        info!(
            event_name = "pipeline.analytics.classified",
            kind = query.kind.as_str(),
            window = ?query.window,
            "analytics query selected"
        );

        let answer = match query.kind {
            AnalyticsKind::Stock => {
                format_stock(&filter_stock(self.queries.stock_levels().await?, &query.product_words))
            }
            AnalyticsKind::Revenue => format_revenue(self.queries.revenue().await?),
            AnalyticsKind::Profit => format_profit(&self.queries.profit().await?),
            AnalyticsKind::Sales => format_sales(&self.queries.recent_sales(RECENT_SALES_LIMIT).await?),
            AnalyticsKind::Expenses => format_expenses(
                &self.queries.expenses_since(query.window.since(today), EXPENSES_LIMIT).await?,
            ),
            AnalyticsKind::Products => format_products(&self.queries.active_products().await?),
            AnalyticsKind::General => GENERAL_GUIDANCE.to_string(),
        };
        Ok(answer)
    }
}

fn filter_stock(levels: Vec<StockLevel>, product_words: &[String]) -> Vec<StockLevel> {
    if product_words.is_empty() {
        return levels;
    }
    let reference = ParsedReference::parse(&product_words.join(" "));
    levels
        .into_iter()
        .filter(|level| score_name(&reference, &level.name, &level.sku) >= 1.0)
        .collect()
}

pub fn format_stock(levels: &[StockLevel]) -> String {
    if levels.is_empty() {
        return "No hay productos en el inventario.".to_string();
    }
    let lines: Vec<String> = levels
        .iter()
        .map(|level| format!("• {}: *{}* unidades", level.name, level.quantity))
        .collect();
    format!("*Stock disponible:*\n{}", lines.join("\n"))
}

pub fn format_revenue(revenue_cents: i64) -> String {
    format!("*Ingresos totales:* {}", format_cents(revenue_cents))
}

pub fn format_profit(totals: &ProfitTotals) -> String {
    let headline = if totals.profit_cents >= 0 {
        format!("*Ganancia total:* {}", format_cents(totals.profit_cents))
    } else {
        format!("*Pérdida total:* {}", format_cents(totals.profit_cents.abs()))
    };
    format!(
        "{headline}\n• Ingresos: {}\n• Gastos: {}",
        format_cents(totals.revenue_cents),
        format_cents(totals.expenses_cents)
    )
}

pub fn format_sales(sales: &[SaleSummary]) -> String {
    if sales.is_empty() {
        return "No hay ventas registradas.".to_string();
    }

    let mut lines = Vec::with_capacity(sales.len());
    for summary in sales {
        let items: Vec<String> = summary
            .lines
            .iter()
            .map(|line| format!("{} {}", line.quantity, line.product_name))
            .collect();
        let marker = if summary.sale.status == SaleStatus::Paid { "✅" } else { "⏳" };
        lines.push(format!(
            "• {} - *{}* {marker} - _{}_",
            items.join(", "),
            format_cents(summary.sale.total_amount_cents),
            summary.sale.created_at.format("%d/%m %H:%M")
        ));
    }
    let total: i64 = sales.iter().map(|summary| summary.sale.total_amount_cents).sum();
    format!("*Últimas ventas:*\n{}\n\n*Total vendido:* {}", lines.join("\n"), format_cents(total))
}

pub fn format_expenses(expenses: &[Expense]) -> String {
    if expenses.is_empty() {
        return "No hay gastos registrados.".to_string();
    }

    let lines: Vec<String> = expenses
        .iter()
        .map(|expense| {
            format!(
                "• _{}_: {} - *{}*",
                expense.expense_date.format("%d/%m"),
                expense.description,
                format_cents(expense.amount_cents)
            )
        })
        .collect();
    let total: i64 = expenses.iter().map(|expense| expense.amount_cents).sum();
    format!("*Gastos:*\n{}\n\n*Total gastado:* {}", lines.join("\n"), format_cents(total))
}

pub fn format_products(products: &[Product]) -> String {
    if products.is_empty() {
        return "No hay productos registrados.".to_string();
    }
    let lines: Vec<String> = products
        .iter()
        .map(|product| format!("• {} - *{}*", product.name, format_cents(product.unit_price_cents)))
        .collect();
    format!("*Productos:*\n{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use ledgerbot_core::domain::ledger::NewExpense;
    use ledgerbot_db::{connect_with_settings, migrations, AnalyticsQueries, DemoSeed, LedgerStore, ProfitTotals};

    use super::{classify_question, format_profit, AnalyticsKind, AnalyticsResponder, TimeWindow};

    struct Case {
        question: &'static str,
        kind: AnalyticsKind,
        window: TimeWindow,
    }

    #[test]
    fn questions_map_to_query_kinds() {
        let cases = [
            Case { question: "¿cuántas pulseras tengo?", kind: AnalyticsKind::Stock, window: TimeWindow::All },
            Case { question: "cuánto stock tengo de cada producto", kind: AnalyticsKind::Stock, window: TimeWindow::All },
            Case { question: "¿cuánto he vendido?", kind: AnalyticsKind::Revenue, window: TimeWindow::All },
            Case { question: "what's my total revenue?", kind: AnalyticsKind::Revenue, window: TimeWindow::All },
            Case { question: "cuál es mi ganancia", kind: AnalyticsKind::Profit, window: TimeWindow::All },
            Case { question: "historial de ventas", kind: AnalyticsKind::Sales, window: TimeWindow::All },
            Case { question: "gastos de la última semana", kind: AnalyticsKind::Expenses, window: TimeWindow::Week },
            Case { question: "expenses this month", kind: AnalyticsKind::Expenses, window: TimeWindow::Month },
            Case { question: "¿qué productos tengo?", kind: AnalyticsKind::Products, window: TimeWindow::All },
            Case { question: "precio de las pulseras", kind: AnalyticsKind::Products, window: TimeWindow::All },
            Case { question: "contame un chiste", kind: AnalyticsKind::General, window: TimeWindow::All },
        ];

        for case in cases {
            let query = classify_question(case.question);
            assert_eq!(query.kind, case.kind, "{}", case.question);
            assert_eq!(query.window, case.window, "{}", case.question);
        }
    }

    #[test]
    fn product_words_are_kept_for_stock_filters() {
        let query = classify_question("¿cuántas pulseras negras hay?");
        assert_eq!(query.product_words, vec!["pulseras", "negras"]);
    }

    #[test]
    fn losses_are_reported_as_positive_amounts() {
        let totals = ProfitTotals { revenue_cents: 1000, expenses_cents: 2500, profit_cents: -1500 };
        assert!(format_profit(&totals).starts_with("*Pérdida total:* $15.00"));
    }

    async fn responder() -> (AnalyticsResponder, LedgerStore) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoSeed::load(&pool).await.expect("seed");
        (AnalyticsResponder::new(AnalyticsQueries::new(pool.clone())), LedgerStore::new(pool, "USD"))
    }

    #[tokio::test]
    async fn stock_answer_filters_by_product_words() {
        let (responder, _) = responder().await;
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).expect("date");

        let answer = responder.answer("¿cuántas pulseras doradas hay?", today).await.expect("answer");
        assert_eq!(answer, "*Stock disponible:*\n• Pulsera de Granos de Café - Dorada: *20* unidades");

        let all = responder.answer("mostrame el stock", today).await.expect("answer");
        assert_eq!(all.lines().count(), 5);
    }

    #[tokio::test]
    async fn expense_answer_respects_the_window() {
        let (responder, store) = responder().await;
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).expect("date");
        for (day, amount_cents, description) in [(1, 1000, "Alquiler"), (9, 250, "Envíos")] {
            store
                .register_expense(&NewExpense {
                    expense_date: NaiveDate::from_ymd_opt(2026, 3, day).expect("date"),
                    category: "GENERAL".to_string(),
                    description: description.to_string(),
                    amount_cents,
                    currency: "USD".to_string(),
                })
                .await
                .expect("expense");
        }

        let week = responder.answer("gastos de la semana", today).await.expect("answer");
        assert_eq!(week, "*Gastos:*\n• _09/03_: Envíos - *$2.50*\n\n*Total gastado:* $2.50");

        let empty = responder.answer("gastos de hoy", today).await.expect("answer");
        assert_eq!(empty, "No hay gastos registrados.");
    }
}
