//! # Pipeline Orchestrator
//!
//! Sequences the three passes for one module build: extract the Ground
//! Truth, gate on validity, resolve the protocol, transform, validate and
//! repair. Returns a single success/failure envelope with the Kit (on
//! success) or an error message, plus the ordered stage log either way.
//! Partial results are never returned as if complete.

use std::sync::Arc;

use crate::ground_truth::{extract, validate_ground_truth, GroundTruth};
use crate::kit::{self, Kit};
use crate::llm::{client_from_env, GenerateError, GenerateOptions, LlmClient};
use crate::models::ModelConfig;
use crate::protocols::ProtocolRegistry;
use crate::transform::{RetryPolicy, Transformer};
use crate::validate::{validate_and_repair, ValidateOptions, ValidationResult};

use super::{Pipeline, PipelineError, PipelineStage, StageLog};

/// Configuration for one orchestrator instance.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub generation: GenerateOptions,
    pub retry: RetryPolicy,
    pub validation: ValidateOptions,
}

impl PipelineConfig {
    /// The standard configuration: default thresholds, repair enabled.
    pub fn standard() -> Self {
        Self {
            validation: ValidateOptions {
                auto_repair: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// One build request.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub module_id: String,
    pub raw_text: String,
    /// Force a protocol instead of selecting by applicability.
    pub forced_protocol: Option<String>,
    /// Build the deterministic scaffold instead of generating.
    pub skip_generation: bool,
}

impl BuildRequest {
    pub fn new(module_id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            module_id: module_id.into(),
            raw_text: raw_text.into(),
            forced_protocol: None,
            skip_generation: false,
        }
    }

    pub fn with_protocol(mut self, protocol_id: impl Into<String>) -> Self {
        self.forced_protocol = Some(protocol_id.into());
        self
    }

    pub fn with_skip_generation(mut self) -> Self {
        self.skip_generation = true;
        self
    }
}

/// The envelope every invocation returns.
#[derive(Debug)]
pub struct PipelineReport {
    pub success: bool,
    pub module_id: String,
    pub protocol_used: Option<String>,
    /// Present only on success.
    pub kit: Option<Kit>,
    /// The Pass-1 artifact, for diagnostics, whenever extraction ran.
    pub ground_truth: Option<GroundTruth>,
    pub validation: Option<ValidationResult>,
    pub error: Option<String>,
    pub stage: PipelineStage,
    pub log: StageLog,
}

/// The pipeline orchestrator.
pub struct Orchestrator {
    client: Arc<dyn LlmClient>,
    registry: ProtocolRegistry,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            registry: ProtocolRegistry::with_defaults(),
            config: PipelineConfig::standard(),
        }
    }

    /// Resolve the client from environment variables. Fails loud with the
    /// distinct not-configured error when no provider is available.
    pub fn from_env() -> Result<Self, GenerateError> {
        Ok(Self::new(client_from_env()?))
    }

    /// Build an orchestrator for a specific provider/model configuration.
    pub fn from_model_config(config: &ModelConfig) -> Result<Self, GenerateError> {
        Ok(Self::new(config.create_client()?))
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_registry(mut self, registry: ProtocolRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Cache contract: should the module be rebuilt for the current source?
    pub fn should_rebuild(&self, existing: Option<&Kit>, current_source_hash: &str) -> bool {
        kit::should_rebuild(
            existing,
            current_source_hash,
            self.config.validation.thresholds.min_grounding,
        )
    }

    /// Run the three passes for one module.
    #[tracing::instrument(skip_all, fields(module_id = %request.module_id))]
    pub async fn run(&self, request: &BuildRequest) -> PipelineReport {
        let mut pipeline = Pipeline::new();
        let mut log = StageLog::new();

        // A forced protocol id must resolve before any extraction-rule
        // lookup happens
        let forced = match &request.forced_protocol {
            Some(id) => match self.registry.get(id) {
                Ok(protocol) => {
                    log.push(
                        PipelineStage::Extracting,
                        format!("protocol forced by caller: {}", protocol.id()),
                    );
                    Some(protocol)
                }
                Err(e) => {
                    pipeline.fail();
                    log.push(PipelineStage::Failed, e.to_string());
                    return self.failure(request, pipeline.stage, log, e, None, None, None);
                }
            },
            None => None,
        };

        // Pass 1
        let rules = match &forced {
            Some(protocol) => protocol.extraction_rules(),
            None => self.registry.pooled_rules(),
        };
        log.push(PipelineStage::Extracting, "pass 1: extracting structural cues");
        let gt = extract(&request.module_id, &request.raw_text, &rules);
        log.push(
            PipelineStage::Extracting,
            format!(
                "'{}': {} concepts, {} steps, {} warnings, {} pairs, {} media ({} words)",
                gt.title.as_deref().unwrap_or("untitled"),
                gt.key_concepts.len(),
                gt.procedures.len(),
                gt.warnings.len(),
                gt.pairs.len(),
                gt.media.len(),
                gt.word_count
            ),
        );

        let validity = validate_ground_truth(&gt);
        if !validity.is_valid {
            // Cost control: no generation for material this thin
            let error = PipelineError::InsufficientInput(validity.reasons.join("; "));
            log.push(
                PipelineStage::Extracting,
                format!("halting before generation: {}", error),
            );
            pipeline.fail();
            return self.failure(request, pipeline.stage, log, error, None, Some(gt), None);
        }

        // Protocol resolution
        pipeline.advance();
        let protocol = match forced {
            Some(protocol) => protocol,
            None => self.registry.select(&gt),
        };
        log.push(
            PipelineStage::SelectingProtocol,
            format!(
                "protocol: {} (applicability {:.2}, structural proposal {})",
                protocol.id(),
                protocol.detect_applicability(&gt),
                validity.proposed_protocol
            ),
        );

        // Pass 2
        pipeline.advance();
        let transformer = Transformer {
            client: self.client.clone(),
            generation: self.config.generation,
            retry: self.config.retry,
        };
        let kit = match transformer
            .transform(&gt, protocol.as_ref(), request.skip_generation, &mut log)
            .await
        {
            Ok(kit) => kit,
            Err(error) => {
                log.push(PipelineStage::Transforming, format!("pass 2 failed: {}", error));
                pipeline.fail();
                return self.failure(
                    request,
                    pipeline.stage,
                    log,
                    error,
                    Some(protocol.id().to_string()),
                    Some(gt),
                    None,
                );
            }
        };

        // Pass 3
        pipeline.advance();
        let outcome = validate_and_repair(kit, &gt, protocol.as_ref(), &self.config.validation);
        log.push(
            PipelineStage::Validating,
            format!(
                "grounding {:.2}, coverage {:.2}, {} errors, {} warnings{}",
                outcome.result.grounding_score,
                outcome.result.coverage_score,
                outcome.result.errors.len(),
                outcome.result.warnings.len(),
                if outcome.was_repaired { ", repaired" } else { "" }
            ),
        );

        if outcome.result.is_valid() {
            pipeline.advance();
            log.push(PipelineStage::Complete, "pipeline complete");
            PipelineReport {
                success: true,
                module_id: request.module_id.clone(),
                protocol_used: Some(protocol.id().to_string()),
                kit: Some(outcome.kit),
                ground_truth: Some(gt),
                validation: Some(outcome.result),
                error: None,
                stage: pipeline.stage,
                log,
            }
        } else {
            pipeline.fail();
            let summary = outcome
                .result
                .errors
                .iter()
                .map(|f| f.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            log.push(
                PipelineStage::Failed,
                format!("validation failed: {}", summary),
            );
            PipelineReport {
                success: false,
                module_id: request.module_id.clone(),
                protocol_used: Some(protocol.id().to_string()),
                kit: None,
                ground_truth: Some(gt),
                validation: Some(outcome.result),
                error: Some(format!("validation failed: {}", summary)),
                stage: pipeline.stage,
                log,
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn failure(
        &self,
        request: &BuildRequest,
        stage: PipelineStage,
        log: StageLog,
        error: PipelineError,
        protocol_used: Option<String>,
        ground_truth: Option<GroundTruth>,
        validation: Option<ValidationResult>,
    ) -> PipelineReport {
        PipelineReport {
            success: false,
            module_id: request.module_id.clone(),
            protocol_used,
            kit: None,
            ground_truth,
            validation,
            error: Some(error.to_string()),
            stage,
            log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit::{ActionKind, Collection};
    use crate::llm::mock::MockLlm;
    use crate::protocols::{COMMUNICATION_ID, PROCEDURAL_ID, THEORY_ID};

    const PROCEDURAL_TEXT: &str = "# Insuline injecteren met de pen\n\n\
        Een goede **injectietechniek** voorkomt complicaties bij het dagelijks toedienen van \
        insuline. In deze les oefenen studenten het volledige ritueel van voorbereiding tot \
        afronding, omdat kleine afwijkingen in de volgorde direct gevolgen hebben voor de \
        werking van het medicijn en het comfort van de cliënt. Besteed daarom ruim aandacht \
        aan de **naaldkeuze** en aan het controleren van de houdbaarheid voordat er ook maar \
        iets wordt klaargelegd. Bespreek met de groep waarom hygiëne bij elke handeling \
        terugkomt en hoe je rustig blijft werken wanneer een cliënt gespannen is, en laat \
        studenten hardop benoemen welke stap zij het lastigst vinden voordat het oefenen \
        begint, zodat de begeleiding daarop kan aansluiten.\n\n\
        stap 1: was je handen en leg de materialen klaar\n\
        stap 2: controleer de insulinepen en de houdbaarheidsdatum\n\
        stap 3: ontlucht de pen met twee eenheden\n\
        stap 4: injecteer loodrecht en tel rustig tot tien\n\n\
        let op: wissel de injectieplaats bij elke toediening\n";

    const COMMUNICATION_TEXT: &str = "# Slecht nieuws vertellen\n\n\
        Een **slechtnieuwsgesprek** vraagt om rust, eerlijkheid en aandacht voor de reactie \
        van de ander. In deze les verkennen studenten hoe woordkeuze het verschil maakt \
        tussen afstand en contact. We kijken naar **empathisch luisteren**, naar het laten \
        vallen van stiltes en naar de valkuil om moeilijke boodschappen te verpakken in \
        vaktaal die de ander niet begrijpt. Studenten oefenen met herkenbare situaties uit \
        de zorgpraktijk en ontdekken dat de eerste zin vaak bepaalt hoe de rest van het \
        gesprek verloopt, en waarom je een boodschap nooit mag verzachten tot er niets van \
        overblijft. Aan het einde van de les formuleert iedere student een eigen openingszin \
        en toetst die bij een medestudent op duidelijkheid en toon.\n\n\
        fout: de uitslag is helaas niet zo best / goed: ik heb slecht nieuws voor u\n\
        fout: direct doorgaan met praten / goed: stilte laten vallen na de boodschap\n";

    fn procedural_payload() -> String {
        serde_json::json!({
            "quick_start": {
                "one_liner": "Leer veilig insuline toedienen met de pen",
                "key_concepts": ["injectietechniek", "naaldkeuze"],
                "check": "Wat doe je voordat je de pen aanzet?",
                "time_allocation": {"start": 5, "core": 15, "closing": 5}
            },
            "teacher_script": [
                {"time": "0:00", "phase": "start", "action": "open",
                 "content": "Start met een ervaring uit de praktijk", "is_grounded": false},
                {"time": "2:00", "phase": "start", "action": "introduce",
                 "content": "Introduceer de injectietechniek",
                 "source_ref": "key_concepts[0]", "is_grounded": true},
                {"time": "5:00", "phase": "core", "action": "demo",
                 "content": "Demonstreer het handen wassen en klaarleggen",
                 "source_ref": "procedures[0]", "is_grounded": true},
                {"time": "8:00", "phase": "core", "action": "demo",
                 "content": "Demonstreer de controle van pen en datum",
                 "source_ref": "procedures[1]", "is_grounded": true},
                {"time": "11:00", "phase": "core", "action": "demo",
                 "content": "Demonstreer het ontluchten",
                 "source_ref": "procedures[2]", "is_grounded": true},
                {"time": "14:00", "phase": "core", "action": "demo",
                 "content": "Demonstreer de injectie zelf",
                 "source_ref": "procedures[3]", "is_grounded": true},
                {"time": "17:00", "phase": "core", "action": "check",
                 "content": "Vraag waarom de injectieplaats wisselt",
                 "source_ref": "warnings[0]", "is_grounded": true,
                 "expected_answers": ["om de huid te sparen"]},
                {"time": "20:00", "phase": "closing", "action": "summary",
                 "content": "Vat de vier stappen samen", "is_grounded": false}
            ],
            "discussion_questions": [],
            "group_work": {"title": "Oefenen in duo's", "duration_minutes": 10, "group_size": 2,
                           "steps": ["Om de beurt de stappen uitvoeren"]},
            "student_handout": {
                "title": "Stappenkaart insuline",
                "exercises": [{"prompt": "Zet de stappen in de juiste volgorde",
                               "source_ref": "procedures[0]"}]
            },
            "slide_assets": []
        })
        .to_string()
    }

    fn communication_payload() -> String {
        serde_json::json!({
            "quick_start": {
                "one_liner": "Oefen het brengen van slecht nieuws",
                "key_concepts": ["slechtnieuwsgesprek", "empathisch luisteren"],
                "check": "Hoe open je een slechtnieuwsgesprek?",
                "time_allocation": {"start": 5, "core": 15, "closing": 5}
            },
            "teacher_script": [
                {"time": "0:00", "phase": "start", "action": "open",
                 "content": "Vraag wie wel eens slecht nieuws heeft gekregen", "is_grounded": false},
                {"time": "3:00", "phase": "start", "action": "introduce",
                 "content": "Introduceer het slechtnieuwsgesprek",
                 "source_ref": "key_concepts[0]", "is_grounded": true},
                {"time": "5:00", "phase": "core", "action": "question",
                 "content": "Wat gaat er mis bij: de uitslag is helaas niet zo best?",
                 "source_ref": "pairs[0]", "is_grounded": true,
                 "expected_answers": ["de boodschap wordt verzacht"],
                 "if_no_answer": "Wijs op het woord helaas"},
                {"time": "11:00", "phase": "core", "action": "question",
                 "content": "Wat gaat er mis bij direct doorpraten?",
                 "source_ref": "pairs[1]", "is_grounded": true},
                {"time": "20:00", "phase": "closing", "action": "summary",
                 "content": "Vat de twee valkuilen samen", "is_grounded": false}
            ],
            "discussion_questions": [
                {"question": "Waarom werkt een verzachtende opening niet?",
                 "source_ref": "pairs[0]"},
                {"question": "Wat doet een stilte met de ontvanger?",
                 "source_ref": "pairs[1]"}
            ],
            "group_work": {"title": "Rollenspel slecht nieuws", "duration_minutes": 12,
                           "group_size": 3,
                           "roles": ["verpleegkundige", "cliënt", "observator"],
                           "steps": ["Speel het gesprek", "Bespreek na", "Wissel van rol"],
                           "rubric": ["Opent duidelijk", "Laat stilte vallen"]},
            "student_handout": {"title": "Gesprekskaart", "exercises": []},
            "slide_assets": []
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_scenario_a_procedural_end_to_end() {
        let mock = Arc::new(MockLlm::with_responses(vec![Ok(procedural_payload())]));
        let orchestrator = Orchestrator::new(mock.clone());

        let report = orchestrator
            .run(&BuildRequest::new("mod-a", PROCEDURAL_TEXT))
            .await;

        assert!(report.success, "error: {:?}\n{}", report.error, report.log.render());
        assert_eq!(report.protocol_used.as_deref(), Some(PROCEDURAL_ID));
        assert_eq!(mock.calls(), 1);

        let kit = report.kit.expect("kit on success");
        let demo_refs: Vec<usize> = kit
            .content
            .teacher_script
            .iter()
            .filter(|i| i.action == ActionKind::Demo)
            .filter_map(|i| i.source_ref)
            .filter(|r| r.collection == Collection::Procedures)
            .map(|r| r.index)
            .collect();
        assert_eq!(demo_refs, vec![0, 1, 2, 3]);

        let validation = report.validation.expect("validation on success");
        assert!(validation.errors.is_empty());
        assert_eq!(validation.grounding_score, 1.0);
    }

    #[tokio::test]
    async fn test_scenario_b_communication_end_to_end() {
        let mock = Arc::new(MockLlm::with_responses(vec![Ok(communication_payload())]));
        let orchestrator = Orchestrator::new(mock.clone());

        let report = orchestrator
            .run(&BuildRequest::new("mod-b", COMMUNICATION_TEXT))
            .await;

        assert!(report.success, "error: {:?}\n{}", report.error, report.log.render());
        assert_eq!(report.protocol_used.as_deref(), Some(COMMUNICATION_ID));

        let kit = report.kit.expect("kit on success");
        assert!(!kit.content.discussion_questions.is_empty());
        assert!(kit.content.discussion_questions.iter().all(|q| {
            q.source_ref
                .map_or(false, |r| r.collection == Collection::Pairs)
        }));
    }

    #[tokio::test]
    async fn test_scenario_c_thin_input_halts_before_generation() {
        let mock = Arc::new(MockLlm::always("{}"));
        let orchestrator = Orchestrator::new(mock.clone());

        let report = orchestrator
            .run(&BuildRequest::new(
                "mod-c",
                "Dit is veel te weinig tekst om een les van te maken.",
            ))
            .await;

        assert!(!report.success);
        assert_eq!(mock.calls(), 0, "generation must not be attempted");
        let error = report.error.expect("error message");
        assert!(error.contains("insufficient"));
        assert!(error.contains("words"));
        assert_eq!(report.stage, PipelineStage::Failed);
    }

    #[tokio::test]
    async fn test_scenario_d_unknown_forced_protocol_fails_first() {
        let mock = Arc::new(MockLlm::always("{}"));
        let orchestrator = Orchestrator::new(mock.clone());

        let report = orchestrator
            .run(&BuildRequest::new("mod-d", PROCEDURAL_TEXT).with_protocol("bogus"))
            .await;

        assert!(!report.success);
        assert_eq!(mock.calls(), 0);
        assert!(report.ground_truth.is_none(), "must fail before extraction");
        assert!(report
            .error
            .expect("error message")
            .contains("unknown protocol 'bogus'"));
    }

    #[tokio::test]
    async fn test_scaffold_request_succeeds_without_generation() {
        let mock = Arc::new(MockLlm::always("{}"));
        let orchestrator = Orchestrator::new(mock.clone());

        let report = orchestrator
            .run(
                &BuildRequest::new("mod-e", PROCEDURAL_TEXT)
                    .with_protocol(THEORY_ID)
                    .with_skip_generation(),
            )
            .await;

        assert!(report.success, "error: {:?}\n{}", report.error, report.log.render());
        assert_eq!(mock.calls(), 0);
        let kit = report.kit.expect("kit on success");
        assert!(kit.needs_review);
        assert_eq!(kit.protocol_used, THEORY_ID);
    }

    #[tokio::test]
    async fn test_no_provider_configured_fails_loud() {
        let mock = Arc::new(MockLlm::with_responses(vec![Err(
            GenerateError::NotConfigured("no key set".into()),
        )]));
        let orchestrator = Orchestrator::new(mock.clone());

        let report = orchestrator
            .run(&BuildRequest::new("mod-f", PROCEDURAL_TEXT))
            .await;

        assert!(!report.success);
        assert_eq!(mock.calls(), 1);
        assert!(report
            .error
            .expect("error message")
            .contains("no generation provider configured"));
    }

    #[tokio::test]
    async fn test_ladder_recovery_is_visible_in_log() {
        let mock = Arc::new(MockLlm::with_responses(vec![
            Ok("eerst wat proza zonder structuur".to_string()),
            Ok(procedural_payload()),
        ]));
        let orchestrator = Orchestrator::new(mock.clone());

        let report = orchestrator
            .run(&BuildRequest::new("mod-g", PROCEDURAL_TEXT))
            .await;

        assert!(report.success, "error: {:?}\n{}", report.error, report.log.render());
        assert_eq!(mock.calls(), 2);
        let rendered = report.log.render();
        assert!(rendered.contains("generation attempt: initial"));
        assert!(rendered.contains("generation attempt: strict-json"));
    }

    #[test]
    fn test_should_rebuild_uses_configured_threshold() {
        let orchestrator = Orchestrator::new(Arc::new(MockLlm::always("{}")));
        assert!(orchestrator.should_rebuild(None, "abc"));
    }
}
