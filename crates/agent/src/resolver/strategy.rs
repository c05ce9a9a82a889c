use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ledgerbot_core::config::PipelineConfig;
use ledgerbot_core::domain::product::{Candidate, ProductId};
use serde::Deserialize;
use tracing::warn;

use super::scoring::Ranking;
use crate::llm::{complete_within, json_object_slice, LlmClient};

const MAX_ESCALATED_CANDIDATES: usize = 5;

const DISAMBIGUATION_PROMPT: &str = "Sos el asistente de inventario de un pequeño negocio. \
El usuario mencionó un producto y hay varios candidatos posibles en el catálogo. \
Elegí el candidato que mejor corresponde a la referencia del usuario. \
Respondé solo con JSON: {\"product_id\": <id del candidato>, \"reasoning\": \"<motivo breve>\"}";

/// What the deterministic score alone allows.
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    Accept(Candidate),
    Escalate(Vec<Candidate>),
    TooGeneric(Vec<Candidate>),
    NoMatch,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConfidencePolicy {
    pub high_confidence: f64,
    pub ambiguity_margin: f64,
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self { high_confidence: 0.9, ambiguity_margin: 0.1 }
    }
}

impl ConfidencePolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            high_confidence: config.resolution_high_confidence,
            ambiguity_margin: config.ambiguity_margin,
        }
    }

    pub fn decide(&self, ranking: &Ranking) -> Decision {
        let Some(top) = ranking.top() else {
            return Decision::NoMatch;
        };

        if ranking.reference.is_generic() && ranking.candidates.len() > 1 {
            return Decision::TooGeneric(ranking.candidates.clone());
        }

        let contenders: Vec<Candidate> = ranking
            .candidates
            .iter()
            .filter(|candidate| top.score - candidate.score < self.ambiguity_margin)
            .cloned()
            .collect();

        if contenders.len() == 1 && top.score >= self.high_confidence {
            return Decision::Accept(top.clone());
        }

        let mut escalated =
            if contenders.len() > 1 { contenders } else { ranking.candidates.clone() };
        escalated.truncate(MAX_ESCALATED_CANDIDATES);
        Decision::Escalate(escalated)
    }
}

/// Picks one candidate out of a ranked, non-empty list.
#[async_trait]
pub trait ResolutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn choose(&self, reference: &str, candidates: &[Candidate]) -> Option<Candidate>;
}

/// Highest score wins.
#[derive(Clone, Copy, Debug, Default)]
pub struct TopScoreStrategy;

#[async_trait]
impl ResolutionStrategy for TopScoreStrategy {
    fn name(&self) -> &'static str {
        "top_score"
    }

    async fn choose(&self, _reference: &str, candidates: &[Candidate]) -> Option<Candidate> {
        candidates.first().cloned()
    }
}

/// Asks the language service to pick among close candidates. Any failure, or
/// a pick outside the list, falls back to the highest score.
pub struct LlmDisambiguator {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl LlmDisambiguator {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    async fn ask(&self, reference: &str, candidates: &[Candidate]) -> anyhow::Result<ProductId> {
        let mut prompt = format!("Referencia del usuario: \"{reference}\"\nCandidatos:\n");
        for candidate in candidates {
            prompt.push_str(&format!(
                "- id {}: {} (SKU {}, coincidencia {:.2})\n",
                candidate.product_id, candidate.name, candidate.sku, candidate.score
            ));
        }

        let reply =
            complete_within(self.llm.as_ref(), self.timeout, DISAMBIGUATION_PROMPT, &prompt)
                .await?;

        #[derive(Deserialize)]
        struct Choice {
            product_id: i64,
        }

        let json = json_object_slice(&reply)
            .ok_or_else(|| anyhow::anyhow!("disambiguation reply has no JSON object"))?;
        let choice: Choice = serde_json::from_str(json)?;
        Ok(ProductId(choice.product_id))
    }
}

#[async_trait]
impl ResolutionStrategy for LlmDisambiguator {
    fn name(&self) -> &'static str {
        "llm_disambiguation"
    }

    async fn choose(&self, reference: &str, candidates: &[Candidate]) -> Option<Candidate> {
        match self.ask(reference, candidates).await {
            Ok(product_id) => {
                let picked =
                    candidates.iter().find(|candidate| candidate.product_id == product_id);
                if picked.is_none() {
                    warn!(
                        event_name = "resolver.disambiguation.out_of_list",
                        reference,
                        product_id = product_id.0,
                        "language service picked a product outside the candidates"
                    );
                }
                picked.or_else(|| candidates.first()).cloned()
            }
            Err(error) => {
                warn!(
                    event_name = "resolver.disambiguation.fallback",
                    reference,
                    error = %error,
                    "disambiguation failed, using the highest score"
                );
                candidates.first().cloned()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use ledgerbot_core::domain::product::{Candidate, ProductId};

    use super::{ConfidencePolicy, Decision, LlmDisambiguator, ResolutionStrategy};
    use crate::llm::{ScriptedLlmClient, ScriptedReply};
    use crate::resolver::scoring::{ParsedReference, Ranking};

    fn candidate(id: i64, score: f64) -> Candidate {
        Candidate {
            product_id: ProductId(id),
            sku: format!("SKU-{id}"),
            name: format!("Producto {id}"),
            score,
        }
    }

    fn ranking(reference: &str, candidates: Vec<Candidate>) -> Ranking {
        Ranking { reference: ParsedReference::parse(reference), candidates }
    }

    #[test]
    fn policy_accepts_a_single_confident_candidate() {
        let policy = ConfidencePolicy::default();
        let decision = policy.decide(&ranking("dorada", vec![candidate(3, 1.0), candidate(1, 0.5)]));
        assert_eq!(decision, Decision::Accept(candidate(3, 1.0)));
    }

    #[test]
    fn policy_escalates_ties_and_weak_matches() {
        let policy = ConfidencePolicy::default();

        let tie = policy.decide(&ranking("negra dorada", vec![candidate(2, 0.5), candidate(3, 0.5)]));
        assert_eq!(tie, Decision::Escalate(vec![candidate(2, 0.5), candidate(3, 0.5)]));

        let weak = policy.decide(&ranking("dorada grande", vec![candidate(3, 0.5)]));
        assert_eq!(weak, Decision::Escalate(vec![candidate(3, 0.5)]));
    }

    #[test]
    fn policy_refuses_to_pick_for_generic_references() {
        let policy = ConfidencePolicy::default();
        let decision = policy.decide(&ranking(
            "pulsera",
            vec![candidate(1, 1.0), candidate(2, 1.0), candidate(3, 1.0)],
        ));
        assert!(matches!(decision, Decision::TooGeneric(ref options) if options.len() == 3));
        assert_eq!(policy.decide(&ranking("taza", Vec::new())), Decision::NoMatch);
    }

    #[tokio::test]
    async fn disambiguator_uses_the_service_pick() {
        let llm = Arc::new(ScriptedLlmClient::with_texts([
            "```json\n{\"product_id\": 3, \"reasoning\": \"dijo dorada\"}\n```",
        ]));
        let strategy = LlmDisambiguator::new(llm.clone(), Duration::from_secs(1));

        let picked = strategy
            .choose("negra dorada", &[candidate(2, 0.5), candidate(3, 0.5)])
            .await
            .expect("a pick");
        assert_eq!(picked.product_id, ProductId(3));
        assert!(llm.prompts()[0].contains("id 3: Producto 3"));
    }

    #[tokio::test]
    async fn disambiguator_falls_back_to_top_score() {
        let llm = Arc::new(ScriptedLlmClient::new([
            ScriptedReply::Failure("503".to_string()),
            ScriptedReply::Text("{\"product_id\": 99}".to_string()),
            ScriptedReply::Stall,
        ]));
        let strategy = LlmDisambiguator::new(llm, Duration::from_millis(20));
        let candidates = [candidate(2, 0.6), candidate(3, 0.5)];

        for _ in 0..3 {
            let picked = strategy.choose("negra", &candidates).await.expect("fallback");
            assert_eq!(picked.product_id, ProductId(2));
        }
    }
}
