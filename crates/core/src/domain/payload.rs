//! Typed write payloads built from the loosely typed entity map returned by
//! the language service. Built once per request; product references stay as
//! text until the resolver maps them to catalog ids.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::intent::OperationKind;
use crate::domain::ledger::{MovementKind, OperationTarget, SaleStatus, MAX_LINE_QUANTITY};
use crate::money::{cents_value, major_units_to_cents};

pub const DEFAULT_EXPENSE_CATEGORY: &str = "GENERAL";
pub const DEFAULT_STOCK_REASON: &str = "Entrada de stock";
pub const DEFAULT_REMOVAL_REASON: &str = "Salida de stock";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub name: String,
    pub sku: Option<String>,
    pub description: Option<String>,
    pub unit_cost_cents: i64,
    pub unit_price_cents: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLineRequest {
    pub product_ref: String,
    pub quantity: i64,
    pub unit_price_cents: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleDraft {
    pub lines: Vec<SaleLineRequest>,
    pub status: SaleStatus,
    pub customer_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseDraft {
    pub description: String,
    pub amount_cents: i64,
    pub category: String,
    /// Raw date reference (`ayer`, `2026-03-01`); resolved against the clock later.
    pub date: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLineRequest {
    pub product_ref: String,
    pub kind: MovementKind,
    pub quantity: i64,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WritePayload {
    RegisterProduct(ProductDraft),
    RegisterSale(SaleDraft),
    RegisterExpense(ExpenseDraft),
    AddStock(Vec<StockLineRequest>),
    RemoveStock(Vec<StockLineRequest>),
    MarkSalePaid(OperationTarget),
    CancelSale(OperationTarget),
    CancelExpense(OperationTarget),
    CancelStockMovement(OperationTarget),
    CancelLastOperation,
    DeactivateProduct { product_ref: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("invalid value for `{field}`: {message}")]
    InvalidField { field: String, message: String },
    #[error("operation `{0}` cannot be executed")]
    UnsupportedOperation(String),
}

impl WritePayload {
    pub fn operation_kind(&self) -> OperationKind {
        match self {
            Self::RegisterProduct(_) => OperationKind::RegisterProduct,
            Self::RegisterSale(_) => OperationKind::RegisterSale,
            Self::RegisterExpense(_) => OperationKind::RegisterExpense,
            Self::AddStock(_) => OperationKind::AddStock,
            Self::RemoveStock(_) => OperationKind::RemoveStock,
            Self::MarkSalePaid(_) => OperationKind::MarkSalePaid,
            Self::CancelSale(_) => OperationKind::CancelSale,
            Self::CancelExpense(_) => OperationKind::CancelExpense,
            Self::CancelStockMovement(_) => OperationKind::CancelStock,
            Self::CancelLastOperation => OperationKind::CancelLastOperation,
            Self::DeactivateProduct { .. } => OperationKind::DeactivateProduct,
        }
    }

    /// Validates the entity map for `kind`. Money arrives in major units
    /// (`unit_price`, `amount`) or already in cents (`*_cents`).
    pub fn from_entities(
        kind: OperationKind,
        entities: &Map<String, Value>,
    ) -> Result<Self, PayloadError> {
        let mut missing = Vec::new();
        let payload = match kind {
            OperationKind::RegisterProduct => {
                let name = text_field(entities, "name");
                let price = money_field(entities, "unit_price")?;
                if name.is_none() {
                    missing.push("name");
                }
                if price.is_none() {
                    missing.push("unit_price");
                }
                let unit_cost_cents = money_field(entities, "unit_cost")?.unwrap_or(0);
                if unit_cost_cents < 0 {
                    return Err(invalid("unit_cost", "must not be negative"));
                }
                match (name, price) {
                    (Some(name), Some(unit_price_cents)) => {
                        if unit_price_cents < 0 {
                            return Err(invalid("unit_price", "must not be negative"));
                        }
                        Some(Self::RegisterProduct(ProductDraft {
                            name,
                            sku: text_field(entities, "sku"),
                            description: text_field(entities, "description"),
                            unit_cost_cents,
                            unit_price_cents,
                        }))
                    }
                    _ => None,
                }
            }
            OperationKind::RegisterSale => {
                let lines = sale_lines(entities, &mut missing)?;
                let status = match text_field(entities, "status") {
                    None => SaleStatus::Paid,
                    Some(raw) => match raw.parse::<SaleStatus>() {
                        Ok(SaleStatus::Cancelled) | Err(_) => {
                            return Err(invalid("status", "expected PAID or PENDING"));
                        }
                        Ok(status) => status,
                    },
                };
                lines.map(|lines| {
                    Self::RegisterSale(SaleDraft {
                        lines,
                        status,
                        customer_name: text_field(entities, "customer_name"),
                    })
                })
            }
            OperationKind::RegisterExpense => {
                let amount = money_field(entities, "amount")?;
                let description = text_field(entities, "description");
                if amount.is_none() {
                    missing.push("amount");
                }
                if description.is_none() {
                    missing.push("description");
                }
                match (amount, description) {
                    (Some(amount_cents), Some(description)) => {
                        if amount_cents <= 0 {
                            return Err(invalid("amount", "must be greater than zero"));
                        }
                        Some(Self::RegisterExpense(ExpenseDraft {
                            description,
                            amount_cents,
                            category: text_field(entities, "category")
                                .map(|category| category.to_uppercase())
                                .unwrap_or_else(|| DEFAULT_EXPENSE_CATEGORY.to_owned()),
                            date: text_field(entities, "date"),
                        }))
                    }
                    _ => None,
                }
            }
            OperationKind::AddStock => {
                stock_lines(entities, MovementKind::In, DEFAULT_STOCK_REASON, &mut missing)?
                    .map(Self::AddStock)
            }
            OperationKind::RemoveStock => {
                stock_lines(entities, MovementKind::Out, DEFAULT_REMOVAL_REASON, &mut missing)?
                    .map(Self::RemoveStock)
            }
            OperationKind::MarkSalePaid => {
                Some(Self::MarkSalePaid(target_field(entities, &["sale_id", "id"])?))
            }
            OperationKind::CancelSale => {
                Some(Self::CancelSale(target_field(entities, &["sale_id", "id"])?))
            }
            OperationKind::CancelExpense => {
                Some(Self::CancelExpense(target_field(entities, &["expense_id", "id"])?))
            }
            OperationKind::CancelStock => Some(Self::CancelStockMovement(target_field(
                entities,
                &["movement_id", "id"],
            )?)),
            OperationKind::CancelLastOperation => Some(Self::CancelLastOperation),
            OperationKind::DeactivateProduct => match product_ref(entities) {
                Some(product_ref) => Some(Self::DeactivateProduct { product_ref }),
                None => {
                    missing.push("product_ref");
                    None
                }
            },
            OperationKind::Unknown => {
                return Err(PayloadError::UnsupportedOperation(kind.as_str().to_owned()));
            }
        };

        match payload {
            Some(payload) if missing.is_empty() => Ok(payload),
            _ => Err(PayloadError::MissingFields(
                missing.into_iter().map(str::to_owned).collect(),
            )),
        }
    }
}

fn invalid(field: &str, message: &str) -> PayloadError {
    PayloadError::InvalidField { field: field.to_owned(), message: message.to_owned() }
}

fn text_field(entities: &Map<String, Value>, key: &str) -> Option<String> {
    match entities.get(key)? {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_owned())
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn product_ref(entities: &Map<String, Value>) -> Option<String> {
    text_field(entities, "product_ref").or_else(|| text_field(entities, "sku"))
}

/// Reads `<base>_cents` verbatim or converts `<base>` from major units.
fn money_field(entities: &Map<String, Value>, base: &str) -> Result<Option<i64>, PayloadError> {
    let cents_key = format!("{base}_cents");
    if let Some(value) = entities.get(&cents_key).filter(|value| !value.is_null()) {
        return cents_value(value)
            .map(Some)
            .ok_or_else(|| invalid(&cents_key, "expected an integer amount of cents"));
    }
    match entities.get(base) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => major_units_to_cents(value)
            .map(Some)
            .ok_or_else(|| invalid(base, "expected a numeric amount")),
    }
}

fn quantity_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number.as_f64().filter(|v| v.fract() == 0.0 && v.is_finite()).map(|v| v as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn quantity_field(
    entities: &Map<String, Value>,
    field: &str,
) -> Result<Option<i64>, PayloadError> {
    let Some(value) = entities.get("quantity").filter(|value| !value.is_null()) else {
        return Ok(None);
    };
    let quantity = quantity_value(value).ok_or_else(|| invalid(field, "expected a whole number"))?;
    if quantity.unsigned_abs() > MAX_LINE_QUANTITY.unsigned_abs() {
        return Err(invalid(field, "exceeds the largest quantity a line can carry"));
    }
    Ok(Some(quantity))
}

/// Items come either as an `items` array or as top-level `product_ref` + `quantity`.
fn item_maps(entities: &Map<String, Value>) -> Vec<Map<String, Value>> {
    match entities.get("items") {
        Some(Value::Array(items)) if !items.is_empty() => {
            items.iter().filter_map(|item| item.as_object().cloned()).collect()
        }
        _ if product_ref(entities).is_some() || entities.contains_key("quantity") => {
            vec![entities.clone()]
        }
        _ => Vec::new(),
    }
}

fn sale_lines(
    entities: &Map<String, Value>,
    missing: &mut Vec<&'static str>,
) -> Result<Option<Vec<SaleLineRequest>>, PayloadError> {
    let items = item_maps(entities);
    if items.is_empty() {
        missing.push("items");
        return Ok(None);
    }

    let mut lines = Vec::with_capacity(items.len());
    for item in &items {
        let reference = product_ref(item);
        let quantity = quantity_field(item, "quantity")?;
        if reference.is_none() && !missing.contains(&"product_ref") {
            missing.push("product_ref");
        }
        if quantity.is_none() && !missing.contains(&"quantity") {
            missing.push("quantity");
        }
        if let (Some(product_ref), Some(quantity)) = (reference, quantity) {
            if quantity <= 0 {
                return Err(invalid("quantity", "must be greater than zero"));
            }
            let unit_price_cents = money_field(item, "unit_price")?;
            if unit_price_cents.is_some_and(|price| price < 0) {
                return Err(invalid("unit_price", "must not be negative"));
            }
            lines.push(SaleLineRequest { product_ref, quantity, unit_price_cents });
        }
    }
    Ok((lines.len() == items.len()).then_some(lines))
}

fn stock_lines(
    entities: &Map<String, Value>,
    default_kind: MovementKind,
    default_reason: &str,
    missing: &mut Vec<&'static str>,
) -> Result<Option<Vec<StockLineRequest>>, PayloadError> {
    let items = item_maps(entities);
    if items.is_empty() {
        missing.push("product_ref");
        missing.push("quantity");
        return Ok(None);
    }

    let shared_reason = text_field(entities, "reason");
    let shared_kind = text_field(entities, "movement_type");
    let mut lines = Vec::with_capacity(items.len());
    for item in &items {
        let reference = product_ref(item);
        let quantity = quantity_field(item, "quantity")?;
        if reference.is_none() && !missing.contains(&"product_ref") {
            missing.push("product_ref");
        }
        if quantity.is_none() && !missing.contains(&"quantity") {
            missing.push("quantity");
        }
        let (Some(product_ref), Some(quantity)) = (reference, quantity) else {
            continue;
        };

        let kind = match text_field(item, "movement_type").or_else(|| shared_kind.clone()) {
            None => default_kind,
            Some(raw) => raw
                .parse::<MovementKind>()
                .map_err(|message| PayloadError::InvalidField {
                    field: "movement_type".to_owned(),
                    message,
                })?,
        };
        let valid = match kind {
            MovementKind::Adjustment => quantity != 0,
            MovementKind::In | MovementKind::Out => quantity > 0,
        };
        if !valid {
            return Err(invalid("quantity", "must be greater than zero"));
        }

        lines.push(StockLineRequest {
            product_ref,
            kind,
            quantity,
            reason: text_field(item, "reason")
                .or_else(|| shared_reason.clone())
                .unwrap_or_else(|| default_reason.to_owned()),
        });
    }
    Ok((lines.len() == items.len()).then_some(lines))
}

/// Cancellation targets default to the most recent record.
fn target_field(
    entities: &Map<String, Value>,
    id_keys: &[&str],
) -> Result<OperationTarget, PayloadError> {
    for key in id_keys {
        if let Some(value) = entities.get(*key).filter(|value| !value.is_null()) {
            return quantity_value(value)
                .filter(|id| *id > 0)
                .map(OperationTarget::Id)
                .ok_or_else(|| invalid(key, "expected a record id"));
        }
    }

    match entities.get("target") {
        None | Some(Value::Null) => Ok(OperationTarget::Last),
        Some(value) => match quantity_value(value) {
            Some(id) if id > 0 => Ok(OperationTarget::Id(id)),
            _ => Ok(OperationTarget::Last),
        },
    }
}
