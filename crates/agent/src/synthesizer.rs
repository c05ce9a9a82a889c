//! Response Synthesizer: turns the finished request state into the reply text.
//! Pure formatting; it never touches the ledger or the language service.

use ledgerbot_core::domain::intent::Intent;
use ledgerbot_core::domain::ledger::{
    CancellationReceipt, ExpenseReceipt, OperationReport, SaleReceipt, SaleStatus, StockReceipt,
};
use ledgerbot_core::domain::request::RequestState;
use ledgerbot_core::money::format_cents;
use rand::seq::SliceRandom;

use crate::resolver::text::fold;

pub const AMBIGUOUS_REPLY: &str = "No estoy seguro de lo que necesitás. \
Aclarame si querés consultar datos (stock, ventas, precios) \
o registrar algo (venta, gasto, producto nuevo, agregar stock).\n\
- \"Mostrame el stock actual\" (consultar)\n\
- \"Registrá una venta de 5 pulseras doradas\" (operación)\n\
- \"Gasté 50 en envíos\" (gasto)";

const FALLBACK_REPLY: &str = "Procesé tu mensaje pero no tengo nada para mostrarte. ¿Podés reformularlo?";

const GREETINGS: &[&str] = &[
    "Hola! ¿En qué te puedo ayudar hoy?",
    "Hola! Decime, ¿qué necesitás?",
    "Hola! ¿Cómo te va? ¿Qué necesitás?",
    "Hola! Estoy acá para ayudarte con tu negocio.",
    "Hola! ¿Querés consultar o registrar algo?",
];

const FAREWELLS: &[&str] = &[
    "Chau! Que tengas un buen día.",
    "Hasta luego!",
    "Nos vemos! Cualquier cosa avisame.",
    "Chau! Acá estoy cuando necesites.",
];

const THANKS: &[&str] = &[
    "De nada! Para eso estoy.",
    "Un placer ayudarte!",
    "No hay problema! Acá estoy.",
    "De nada! Cualquier cosa avisame.",
];

const FAREWELL_WORDS: &[&str] = &["chau", "adios", "bye", "hasta luego", "nos vemos"];
const THANKS_WORDS: &[&str] = &["gracias", "thank", "thanks"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SmallTalk {
    Greeting,
    Farewell,
    Thanks,
}

impl SmallTalk {
    pub fn detect(text: &str) -> Self {
        let folded = fold(text);
        if FAREWELL_WORDS.iter().any(|word| folded.contains(word)) {
            Self::Farewell
        } else if THANKS_WORDS.iter().any(|word| folded.contains(word)) {
            Self::Thanks
        } else {
            Self::Greeting
        }
    }

    pub fn templates(&self) -> &'static [&'static str] {
        match self {
            Self::Greeting => GREETINGS,
            Self::Farewell => FAREWELLS,
            Self::Thanks => THANKS,
        }
    }
}

/// Technical field names as the user should read them.
pub fn field_label(field: &str) -> &str {
    match field {
        "unit_price" | "unit_price_cents" => "el precio de venta",
        "unit_cost" | "unit_cost_cents" => "el costo de producción",
        "name" => "el nombre del producto",
        "amount" | "amount_cents" => "el monto",
        "description" => "la descripción",
        "product_ref" => "el producto",
        "quantity" => "la cantidad",
        "items" => "los productos",
        "sku" => "el código del producto",
        "status" => "el estado de la venta",
        "category" => "la categoría",
        "date" => "la fecha",
        other => other,
    }
}

pub fn missing_fields_reply(fields: &[String]) -> String {
    let labels: Vec<&str> = fields.iter().map(|field| field_label(field)).collect();
    match labels.as_slice() {
        [single] => format!("Me falta un dato: *{single}*\n\n¿Me lo podés decir?"),
        _ => format!("Me faltan algunos datos:\n• {}\n\n¿Me los podés decir?", labels.join("\n• ")),
    }
}

pub fn small_talk_reply(text: &str) -> &'static str {
    let templates = SmallTalk::detect(text).templates();
    templates.choose(&mut rand::thread_rng()).copied().unwrap_or(GREETINGS[0])
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ResponseSynthesizer;

impl ResponseSynthesizer {
    /// First match wins: error, small talk, missing fields, executed write
    /// (plus analytics when mixed), analytics, clarification.
    pub fn compose(&self, state: &RequestState) -> String {
        if let Some(error) = &state.error {
            return error.clone();
        }
        if state.intent == Some(Intent::Greeting) {
            return small_talk_reply(&state.user_text).to_string();
        }
        if !state.missing_fields.is_empty() {
            return missing_fields_reply(&state.missing_fields);
        }

        match (&state.report, &state.analytics) {
            (Some(report), Some(analytics)) => {
                return format!("{}\n\n{analytics}", operation_summary(report));
            }
            (Some(report), None) => return operation_summary(report),
            (None, Some(analytics)) => return analytics.clone(),
            (None, None) => {}
        }

        match state.intent {
            None | Some(Intent::Ambiguous) => {
                state.clarification.clone().unwrap_or_else(|| AMBIGUOUS_REPLY.to_string())
            }
            _ => FALLBACK_REPLY.to_string(),
        }
    }
}

/// Business-impact summary of one executed write.
pub fn operation_summary(report: &OperationReport) -> String {
    match report {
        OperationReport::ProductRegistered(product) => format!(
            "*Producto creado!*\n\n• {}\n• Código: _{}_\n• Precio: *{}*",
            product.name,
            product.sku,
            format_cents(product.unit_price_cents)
        ),
        OperationReport::SaleRegistered(sale) => sale_summary("*Venta registrada!*", sale),
        OperationReport::SalePaid(sale) => sale_summary("*Venta cobrada!*", sale),
        OperationReport::ExpenseRegistered(expense) => expense_summary(expense),
        OperationReport::StockAdded(receipts) => stock_summary("*Stock actualizado!*", '+', receipts),
        OperationReport::StockRemoved(receipts) => stock_summary("*Stock descontado!*", '-', receipts),
        OperationReport::Cancelled(cancellation) => cancellation_summary(cancellation),
        OperationReport::ProductDeactivated(product) => format!(
            "*Producto desactivado!*\n\n• {}\n• Código: _{}_\n\nYa no aparece en el catálogo, el historial se conserva.",
            product.name, product.sku
        ),
    }
}

fn sale_summary(headline: &str, sale: &SaleReceipt) -> String {
    let items: Vec<String> =
        sale.lines.iter().map(|line| format!("{} {}", line.quantity, line.product_name)).collect();
    let mut summary = format!(
        "{headline}\n\n• {}\n• Total: *{}*",
        items.join("\n• "),
        format_cents(sale.total_cents)
    );
    if sale.status == SaleStatus::Pending {
        summary.push_str("\n• Estado: _pendiente de pago_");
    }
    summary.push_str(&format!("\n\n_Ventas totales: {}_", format_cents(sale.revenue_cents)));
    summary.push_str(&accumulated_profit(sale.profit_cents));
    summary
}

fn expense_summary(expense: &ExpenseReceipt) -> String {
    format!(
        "*Gasto registrado!*\n\n• {}\n• Monto: *{}*\n{}",
        expense.description,
        format_cents(expense.amount_cents),
        accumulated_profit(expense.profit_cents)
    )
}

fn stock_summary(headline: &str, sign: char, receipts: &[StockReceipt]) -> String {
    let lines: Vec<String> = receipts
        .iter()
        .map(|receipt| {
            format!(
                "• *{}*: {sign}{} unidades (stock actual: {})",
                receipt.product_name,
                receipt.quantity.abs(),
                receipt.current_stock
            )
        })
        .collect();
    format!("{headline}\n\n{}", lines.join("\n"))
}

fn cancellation_summary(cancellation: &CancellationReceipt) -> String {
    match cancellation {
        CancellationReceipt::Sale { sale_number, amount_cents, revenue_cents, profit_cents, .. } => {
            format!(
                "*Venta cancelada!*\n\n• Se canceló la venta {sale_number} por *{}*\n\n_Ventas totales: {}_{}",
                format_cents(*amount_cents),
                format_cents(*revenue_cents),
                accumulated_profit(*profit_cents)
            )
        }
        CancellationReceipt::Expense { description, amount_cents, profit_cents, .. } => format!(
            "*Gasto cancelado!*\n\n• Se canceló: {description}\n• Monto: *{}*\n{}",
            format_cents(*amount_cents),
            accumulated_profit(*profit_cents)
        ),
        CancellationReceipt::StockMovement {
            product_name, cancelled_quantity, current_stock, ..
        } => format!(
            "*Stock cancelado!*\n\n• Se canceló el movimiento de stock de *{product_name}*\n\
             • Cantidad cancelada: {} unidades\n• Stock actual: {current_stock} unidades",
            cancelled_quantity.abs()
        ),
    }
}

fn accumulated_profit(profit_cents: i64) -> String {
    if profit_cents >= 0 {
        format!("\n_Ganancia acumulada: {}_", format_cents(profit_cents))
    } else {
        format!("\n_Pérdida acumulada: {}_", format_cents(profit_cents.abs()))
    }
}
