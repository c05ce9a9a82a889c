//! Intent Router: one language-service call that classifies a message and
//! extracts raw entities. Pure classification; nothing here reads or writes
//! the ledger.

use std::sync::Arc;
use std::time::Duration;

use ledgerbot_core::domain::intent::{Intent, OperationKind};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::llm::{complete_within, json_object_slice, LlmClient};

pub const LOW_CONFIDENCE_CLARIFICATION: &str = "Tengo dudas sobre lo que necesitas. \
Puedes decirme si quieres consultar datos (stock, ventas, precios) o registrar algo \
(venta, gasto, producto nuevo, agregar stock)?";

const ROUTER_PROMPT: &str = r#"Sos el clasificador de intenciones de un asistente de gestión para un pequeño negocio de pulseras y llaveros de granos de café.
Tu única tarea es clasificar el mensaje y extraer entidades. Nunca ejecutás consultas ni registrás nada.

El mensaje puede venir precedido por "Contexto de conversación reciente:". Combiná los datos del contexto con los del "Mensaje actual" (por ejemplo, el nombre del producto en un mensaje anterior y el precio en el actual).

Intenciones (campo "intent"):
- READ_ANALYTICS: quiere ver o consultar datos (stock, ingresos, ganancia, ventas, gastos, productos).
- WRITE_OPERATION: quiere registrar, cargar, cancelar o desactivar algo.
- MIXED: registra algo y además pregunta por el resultado ("vendí 2 negras, ¿cómo queda el stock?").
- GREETING: saludo, agradecimiento o despedida sin pedido de negocio.
- AMBIGUOUS: no queda claro qué quiere.

Operaciones (campo "operation_type", solo para WRITE_OPERATION o MIXED; si no, UNKNOWN):
- REGISTER_SALE: "vendí 3 doradas", "registrame una venta". Estado PAID salvo que diga que no pagó (PENDING).
- MARK_SALE_PAID: "ya me pagaron la venta pendiente".
- REGISTER_EXPENSE: "gasté 30 en envíos".
- REGISTER_PRODUCT: "nuevo producto", "nuevas pulseras azules". Si dice nuevo/nueva/nuevas es un producto nuevo, no stock.
- ADD_STOCK: "entraron 400 clásicas y 200 doradas", "agrego 10 negras" (producto existente).
- REMOVE_STOCK: "se rompieron 2 doradas", "saco 5 llaveros del stock".
- CANCEL_SALE, CANCEL_EXPENSE, CANCEL_STOCK: anular la última venta, gasto o entrada de stock.
- CANCEL_LAST_OPERATION: "anulá la última operación", "borrá lo último" sin decir de qué tipo.
- DEACTIVATE_PRODUCT: "eliminá el producto X", "desactivá las pulseras azules".

Entidades (campo "normalized_entities"):
- items: lista de {"product_ref", "quantity", "unit_price"?} para ventas y stock. Con un solo producto también vale product_ref + quantity.
- product_ref: la referencia tal como la dijo el usuario ("pulseras negras", "gold bracelet").
- unit_price: precio por unidad en dólares, no en centavos ("a 5 dólares" -> 5). Para productos nuevos es el precio de venta.
- unit_cost: costo por unidad en dólares, opcional.
- name, sku, description: datos de un producto nuevo.
- amount y description: monto en dólares y concepto de un gasto. category es opcional.
- date: referencia de fecha tal cual ("ayer", "2026-03-01").
- status: PAID o PENDING.
- target: "last" para cancelaciones de lo último, o sale_id / expense_id / movement_id si da un número.

Respondé solo con JSON:
{"intent": "...", "operation_type": "...", "confidence": 0.0-1.0, "missing_fields": [], "normalized_entities": {}, "reasoning": "..."}"#;

#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    pub intent: Intent,
    pub operation_kind: OperationKind,
    pub confidence: f64,
    pub missing_fields: Vec<String>,
    pub entities: Map<String, Value>,
    pub rationale: Option<String>,
    /// Set when the router itself decided the user must clarify.
    pub clarification: Option<String>,
}

impl Classification {
    /// Safe default when the language service fails or answers garbage.
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            intent: Intent::Ambiguous,
            operation_kind: OperationKind::Unknown,
            confidence: 0.0,
            missing_fields: Vec::new(),
            entities: Map::new(),
            rationale: Some(reason.into()),
            clarification: Some(LOW_CONFIDENCE_CLARIFICATION.to_string()),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("language service call failed: {0}")]
    Upstream(String),
    #[error("classification reply is not a JSON object: {0}")]
    Malformed(String),
    #[error("unknown intent label `{0}`")]
    UnknownIntent(String),
}

#[derive(Deserialize)]
struct RawClassification {
    intent: String,
    #[serde(default, alias = "operation_kind")]
    operation_type: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    missing_fields: Option<Vec<String>>,
    #[serde(default, alias = "entities")]
    normalized_entities: Option<Map<String, Value>>,
    #[serde(default)]
    reasoning: Option<String>,
}

pub struct IntentRouter {
    llm: Arc<dyn LlmClient>,
    confidence_threshold: f64,
    timeout: Duration,
}

impl IntentRouter {
    pub fn new(llm: Arc<dyn LlmClient>, confidence_threshold: f64, timeout: Duration) -> Self {
        Self { llm, confidence_threshold, timeout }
    }

    /// Never fails: upstream and parse errors degrade to an ambiguous
    /// classification that asks the user to clarify.
    pub async fn classify(&self, input: &str) -> Classification {
        let classification = match self.request(input).await {
            Ok(classification) => self.apply_threshold(classification),
            Err(error) => {
                warn!(
                    event_name = "pipeline.router.degraded",
                    model = self.llm.model_name(),
                    error = %error,
                    "classification failed, asking the user to clarify"
                );
                Classification::degraded(error.to_string())
            }
        };

        info!(
            event_name = "pipeline.router.classified",
            intent = classification.intent.as_str(),
            operation = classification.operation_kind.as_str(),
            confidence = classification.confidence,
            "message classified"
        );
        classification
    }

    async fn request(&self, input: &str) -> Result<Classification, ClassificationError> {
        let reply = complete_within(self.llm.as_ref(), self.timeout, ROUTER_PROMPT, input)
            .await
            .map_err(|error| ClassificationError::Upstream(error.to_string()))?;
        parse_classification(&reply)
    }

    /// Below the threshold the label is not trusted.
    pub fn apply_threshold(&self, mut classification: Classification) -> Classification {
        if classification.confidence < self.confidence_threshold {
            classification.intent = Intent::Ambiguous;
            classification.missing_fields.clear();
            classification.clarification = Some(LOW_CONFIDENCE_CLARIFICATION.to_string());
        }
        classification
    }
}

pub fn parse_classification(reply: &str) -> Result<Classification, ClassificationError> {
    let json = json_object_slice(reply).ok_or_else(|| ClassificationError::Malformed(preview(reply)))?;
    let raw: RawClassification = serde_json::from_str(json)
        .map_err(|error| ClassificationError::Malformed(error.to_string()))?;

    let intent = raw
        .intent
        .parse::<Intent>()
        .map_err(|_| ClassificationError::UnknownIntent(raw.intent.clone()))?;
    let operation_kind = raw
        .operation_type
        .as_deref()
        .and_then(|label| label.parse::<OperationKind>().ok())
        .unwrap_or(OperationKind::Unknown);
    let confidence =
        raw.confidence.filter(|value| value.is_finite()).unwrap_or(0.0).clamp(0.0, 1.0);

    let mut classification = Classification {
        intent,
        operation_kind,
        confidence,
        missing_fields: raw.missing_fields.unwrap_or_default(),
        entities: raw.normalized_entities.unwrap_or_default(),
        rationale: raw.reasoning,
        clarification: None,
    };

    // A write without a recognizable operation cannot go anywhere.
    if intent.is_write() && operation_kind == OperationKind::Unknown {
        classification.intent = Intent::Ambiguous;
    }
    Ok(classification)
}

fn preview(reply: &str) -> String {
    reply.chars().take(80).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use ledgerbot_core::domain::intent::{Intent, OperationKind};
    use serde_json::json;

    use super::{parse_classification, ClassificationError, IntentRouter, LOW_CONFIDENCE_CLARIFICATION};
    use crate::llm::{ScriptedLlmClient, ScriptedReply};

    fn router(replies: Vec<ScriptedReply>) -> (IntentRouter, Arc<ScriptedLlmClient>) {
        let llm = Arc::new(ScriptedLlmClient::new(replies));
        (IntentRouter::new(llm.clone(), 0.6, Duration::from_millis(50)), llm)
    }

    #[test]
    fn fenced_reply_parses_with_entities() {
        let classification = parse_classification(
            "```json\n{\"intent\": \"WRITE_OPERATION\", \"operation_type\": \"REGISTER_SALE\", \
             \"confidence\": 0.95, \"missing_fields\": [], \
             \"normalized_entities\": {\"items\": [{\"product_ref\": \"gold\", \"quantity\": 5}]}, \
             \"reasoning\": \"vendió\"}\n```",
        )
        .expect("valid reply");

        assert_eq!(classification.intent, Intent::WriteOperation);
        assert_eq!(classification.operation_kind, OperationKind::RegisterSale);
        assert_eq!(classification.entities["items"], json!([{"product_ref": "gold", "quantity": 5}]));
        assert_eq!(classification.rationale.as_deref(), Some("vendió"));
    }

    #[test]
    fn malformed_replies_are_rejected() {
        assert!(matches!(parse_classification("no sé"), Err(ClassificationError::Malformed(_))));
        assert_eq!(
            parse_classification("{\"intent\": \"SHOUT\", \"confidence\": 1}"),
            Err(ClassificationError::UnknownIntent("SHOUT".to_string()))
        );
    }

    #[test]
    fn write_without_operation_becomes_ambiguous() {
        let classification = parse_classification(
            "{\"intent\": \"WRITE_OPERATION\", \"operation_type\": \"UNKNOWN\", \"confidence\": 0.9}",
        )
        .expect("valid reply");
        assert_eq!(classification.intent, Intent::Ambiguous);
    }

    #[tokio::test]
    async fn low_confidence_is_forced_to_ambiguous() {
        let (router, _) = router(vec![ScriptedReply::Text(
            "{\"intent\": \"WRITE_OPERATION\", \"operation_type\": \"REGISTER_SALE\", \
             \"confidence\": 0.4, \"missing_fields\": [\"quantity\"]}"
                .to_string(),
        )]);

        let classification = router.classify("vendí algo").await;
        assert_eq!(classification.intent, Intent::Ambiguous);
        assert_eq!(classification.confidence, 0.4);
        assert!(classification.missing_fields.is_empty());
        assert_eq!(classification.clarification.as_deref(), Some(LOW_CONFIDENCE_CLARIFICATION));
    }

    #[tokio::test]
    async fn upstream_failures_degrade_instead_of_erroring() {
        let (router, llm) = router(vec![
            ScriptedReply::Failure("503".to_string()),
            ScriptedReply::Stall,
            ScriptedReply::Text("plain prose".to_string()),
        ]);

        for input in ["hola", "vendí 2", "gasté 30"] {
            let classification = router.classify(input).await;
            assert_eq!(classification.intent, Intent::Ambiguous, "{input}");
            assert_eq!(classification.confidence, 0.0);
            assert!(classification.clarification.is_some());
        }
        assert_eq!(llm.prompts(), vec!["hola", "vendí 2", "gasté 30"]);
    }

    #[tokio::test]
    async fn confident_greeting_passes_through() {
        let (router, _) = router(vec![ScriptedReply::Text(
            "{\"intent\": \"GREETING\", \"confidence\": 0.99}".to_string(),
        )]);

        let classification = router.classify("hola!").await;
        assert_eq!(classification.intent, Intent::Greeting);
        assert_eq!(classification.operation_kind, OperationKind::Unknown);
        assert!(classification.clarification.is_none());
    }
}
