//! Exam pipeline orchestrator.
//!
//! Weigh, plan and resolve run synchronously over a snapshot read from the
//! topic graph. Generation fans out over the slots with bounded parallelism,
//! retries and a request-level timeout; verification runs once every slot
//! has settled, and invalid questions get a bounded number of regeneration
//! rounds.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::error::{ExamError, ProviderError};
use crate::graph::TopicGraph;
use crate::model::{
    DistributionPlan, ExamRequest, GeneratedQuestion, PyqRecord, Slot, Subject, Topic,
    TopicWeight,
};
use crate::planner::{DistributionPlanner, PlannerConfig};
use crate::report::{ExamPaper, FailedSlot, PaperQuestion};
use crate::resolver::{DifficultyMix, SlotResolver};
use crate::traits::{GenerationRequest, QuestionGenerator, TopicGraphReader};
use crate::verifier::{VerificationReport, Verifier, VerifierConfig};
use crate::weights::{compute_rollup_weight, compute_weight, WeightConfig};

/// Which topics are planning units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Every topic in the graph is weighted and allocated on its own.
    #[default]
    Every,
    /// Only root topics are allocated; descendant history rolls up.
    Roots,
}

/// Configuration for the exam engine.
#[derive(Debug, Clone)]
pub struct ExamEngineConfig {
    /// Maximum concurrent generator calls.
    pub parallelism: usize,
    /// Retries per slot on transient generator errors.
    pub max_retries: u32,
    /// Delay before the first retry; doubles each time.
    pub retry_delay: Duration,
    /// Deadline for the whole generation phase.
    pub request_timeout: Option<Duration>,
    /// Times invalid questions are regenerated after verification.
    pub regeneration_rounds: u32,
    pub weights: WeightConfig,
    pub planner: PlannerConfig,
    pub difficulty_mix: DifficultyMix,
    pub verifier: VerifierConfig,
    pub granularity: Granularity,
}

impl Default for ExamEngineConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            request_timeout: None,
            regeneration_rounds: 2,
            weights: WeightConfig::default(),
            planner: PlannerConfig::default(),
            difficulty_mix: DifficultyMix::default(),
            verifier: VerifierConfig::default(),
            granularity: Granularity::default(),
        }
    }
}

impl ExamEngineConfig {
    pub fn validate(&self) -> Result<(), ExamError> {
        if self.parallelism == 0 {
            return Err(ExamError::Config("parallelism must be at least 1".into()));
        }
        self.weights.validate()?;
        self.planner.bucket_ratio.validate()?;
        self.difficulty_mix.validate()?;
        Ok(())
    }
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_plan_ready(&self, plan: &DistributionPlan, slots: usize);
    fn on_slot_complete(&self, slot: &Slot, completed: usize, total: usize);
    fn on_slot_error(&self, slot: &Slot, error: &str);
    fn on_regeneration(&self, round: u32, slots: usize);
    fn on_paper_complete(&self, generated: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_plan_ready(&self, _: &DistributionPlan, _: usize) {}
    fn on_slot_complete(&self, _: &Slot, _: usize, _: usize) {}
    fn on_slot_error(&self, _: &Slot, _: &str) {}
    fn on_regeneration(&self, _: u32, _: usize) {}
    fn on_paper_complete(&self, _: usize, _: usize, _: Duration) {}
}

/// Everything decided before any generator call.
#[derive(Debug, Clone)]
pub struct PlannedExam {
    pub subject: Subject,
    pub request: ExamRequest,
    /// Weights of every planning unit, in graph order.
    pub weights: Vec<TopicWeight>,
    pub plan: DistributionPlan,
    pub slots: Vec<Slot>,
    /// Display names of every topic in the subject.
    pub topic_names: Vec<String>,
}

/// Weigh, plan and resolve `request` against the topic graph.
///
/// Reader failures surface as [`ExamError::GraphUnavailable`] and are not
/// retried here.
pub async fn plan_exam(
    reader: &dyn TopicGraphReader,
    request: &ExamRequest,
    config: &ExamEngineConfig,
) -> Result<PlannedExam, ExamError> {
    request.validate()?;
    let subject_id = request.subject.trim();

    let subjects = reader.list_subjects().await.map_err(unavailable)?;
    let subject = subjects
        .into_iter()
        .find(|s| s.id == subject_id)
        .unwrap_or_else(|| Subject {
            id: subject_id.to_string(),
            name: subject_id.to_string(),
        });

    let topics = reader.list_topics(subject_id).await.map_err(unavailable)?;
    if topics.is_empty() {
        return Err(ExamError::invalid(format!(
            "subject '{subject_id}' has no topics"
        )));
    }
    let graph = TopicGraph::build(subject_id, topics).map_err(logged)?;

    let cutoff = request.cutoff_year;
    let fetched = futures::future::try_join_all(
        graph
            .topics()
            .map(|t| reader.list_pyq_records(&t.id, cutoff)),
    )
    .await
    .map_err(unavailable)?;

    let mut own_records: HashMap<&str, Vec<PyqRecord>> = HashMap::new();
    for (topic, records) in graph.topics().zip(fetched) {
        for record in &records {
            if record.topic_id != topic.id {
                return Err(logged(ExamError::integrity(format!(
                    "reader returned record '{}' of topic '{}' for topic '{}'",
                    record.id, record.topic_id, topic.id
                ))));
            }
            if record.year > cutoff {
                return Err(logged(ExamError::integrity(format!(
                    "reader returned record '{}' from {} for cutoff {cutoff}",
                    record.id, record.year
                ))));
            }
        }
        own_records.insert(topic.id.as_str(), records);
    }

    let units: Vec<&Topic> = match config.granularity {
        Granularity::Every => graph.topics().collect(),
        Granularity::Roots => graph.roots().collect(),
    };

    let mut weights = Vec::with_capacity(units.len());
    let mut records_by_topic: HashMap<String, Vec<PyqRecord>> = HashMap::new();
    for unit in &units {
        let (weight, records) = match config.granularity {
            Granularity::Every => {
                let records = own_records.remove(unit.id.as_str()).unwrap_or_default();
                let weight = compute_weight(unit, &records, cutoff, &config.weights);
                (weight, records)
            }
            Granularity::Roots => {
                let mut records = own_records.remove(unit.id.as_str()).unwrap_or_default();
                for descendant in graph.descendants(&unit.id) {
                    if let Some(more) = own_records.remove(descendant.id.as_str()) {
                        records.extend(more);
                    }
                }
                let weight = compute_rollup_weight(&graph, unit, &records, cutoff, &config.weights);
                (weight, records)
            }
        };
        let weight = weight.map_err(logged)?;
        tracing::debug!(
            topic = %weight.topic_id,
            weight = weight.weight,
            frequent = weight.breakdown.frequent,
            recent = weight.breakdown.recent,
            never_asked = weight.breakdown.never_asked,
            "weighted topic"
        );
        weights.push(weight);
        records_by_topic.insert(unit.id.clone(), records);
    }

    let filter = match &request.topics {
        Some(keys) => Some(resolve_filter(&graph, keys, config.granularity)?),
        None => None,
    };

    let plan = DistributionPlanner::new(config.planner.clone())
        .plan(request.total_questions, &weights, filter.as_deref())
        .map_err(logged)?;

    let slots = SlotResolver::new(
        config.weights.rules(cutoff),
        config.difficulty_mix.clone(),
    )
    .resolve(&plan, &records_by_topic);

    tracing::info!(
        subject = %subject.id,
        total = plan.total_questions,
        topics = plan.topics.iter().filter(|t| t.count > 0).count(),
        "planned exam"
    );

    Ok(PlannedExam {
        subject,
        request: request.clone(),
        weights,
        plan,
        slots,
        topic_names: graph.names().into_iter().map(String::from).collect(),
    })
}

/// Map filter keys (ids or names) to planning-unit ids, keeping first-seen
/// order and dropping repeats.
fn resolve_filter(
    graph: &TopicGraph,
    keys: &[String],
    granularity: Granularity,
) -> Result<Vec<String>, ExamError> {
    let mut ids: Vec<String> = Vec::new();
    for key in keys.iter().filter(|k| !k.trim().is_empty()) {
        let topic = graph
            .resolve(key)
            .ok_or_else(|| ExamError::invalid(format!("unknown topic '{}'", key.trim())))?;
        let unit = match granularity {
            Granularity::Every => topic,
            Granularity::Roots => graph.ancestors(&topic.id).last().copied().unwrap_or(topic),
        };
        if !ids.contains(&unit.id) {
            ids.push(unit.id.clone());
        }
    }
    Ok(ids)
}

fn unavailable(e: anyhow::Error) -> ExamError {
    tracing::error!("topic graph read failed: {e:#}");
    ExamError::GraphUnavailable(format!("{e:#}"))
}

fn logged(e: ExamError) -> ExamError {
    if matches!(e, ExamError::DataIntegrity(_)) {
        tracing::error!("{e}");
    }
    e
}

/// The exam engine.
pub struct ExamEngine {
    reader: Arc<dyn TopicGraphReader>,
    generator: Arc<dyn QuestionGenerator>,
    config: ExamEngineConfig,
}

impl ExamEngine {
    pub fn new(
        reader: Arc<dyn TopicGraphReader>,
        generator: Arc<dyn QuestionGenerator>,
        config: ExamEngineConfig,
    ) -> Self {
        Self {
            reader,
            generator,
            config,
        }
    }

    pub fn config(&self) -> &ExamEngineConfig {
        &self.config
    }

    /// Plan without generating anything.
    pub async fn plan(&self, request: &ExamRequest) -> Result<PlannedExam, ExamError> {
        self.config.validate()?;
        plan_exam(self.reader.as_ref(), request, &self.config).await
    }

    /// Run the full pipeline for `request`.
    ///
    /// Planning errors abort the request. Generation failures do not: the
    /// affected slots are listed in [`ExamPaper::failed`] and the paper is
    /// returned with an explicit missing count.
    pub async fn generate(
        &self,
        request: &ExamRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<ExamPaper, ExamError> {
        let start = Instant::now();
        let planned = self.plan(request).await?;
        progress.on_plan_ready(&planned.plan, planned.slots.len());

        let deadline = self
            .config
            .request_timeout
            .map(|t| tokio::time::Instant::now() + t);

        let mut outcomes: BTreeMap<usize, Result<GeneratedQuestion, String>> = self
            .dispatch(&planned.subject.name, &planned.slots, deadline, progress)
            .await;

        let verifier = Verifier::new(
            planned.topic_names.iter().cloned(),
            self.config.verifier.clone(),
        );
        let slot_by_index: HashMap<usize, &Slot> =
            planned.slots.iter().map(|s| (s.index, s)).collect();

        let mut rounds = 0;
        let verification = loop {
            let (indices, questions) = generated(&outcomes);
            let results = verifier.verify(&questions);
            let invalid: Vec<usize> = indices
                .iter()
                .zip(&results)
                .filter(|(_, r)| !r.valid)
                .map(|(&i, _)| i)
                .collect();

            let expired = deadline.is_some_and(|d| tokio::time::Instant::now() >= d);
            if invalid.is_empty() || rounds >= self.config.regeneration_rounds || expired {
                break VerificationReport::from_results(&questions, results);
            }

            rounds += 1;
            tracing::info!(round = rounds, slots = invalid.len(), "regenerating invalid questions");
            progress.on_regeneration(rounds, invalid.len());

            let retry_slots: Vec<Slot> = invalid
                .iter()
                .filter_map(|i| slot_by_index.get(i).map(|s| (*s).clone()))
                .collect();
            let replacements = self
                .dispatch(&planned.subject.name, &retry_slots, deadline, progress)
                .await;
            for (index, outcome) in replacements {
                // a failed regeneration keeps the earlier question
                if let Ok(question) = outcome {
                    outcomes.insert(index, Ok(question));
                }
            }
        };

        let mut questions = Vec::new();
        let mut failed = Vec::new();
        for slot in &planned.slots {
            match outcomes.remove(&slot.index) {
                Some(Ok(question)) => questions.push(PaperQuestion {
                    slot_index: slot.index,
                    topic_id: slot.topic_id.clone(),
                    bucket: slot.bucket,
                    target_difficulty: slot.difficulty,
                    seed_id: slot.seed_record().map(|r| r.id.clone()),
                    question,
                }),
                Some(Err(reason)) => failed.push(failed_slot(slot, reason)),
                None => failed.push(failed_slot(slot, "not dispatched".into())),
            }
        }

        let elapsed = start.elapsed();
        let missing = (planned.plan.total_questions as usize).saturating_sub(questions.len());
        if missing > 0 {
            tracing::warn!(missing, "paper is incomplete");
        }
        progress.on_paper_complete(questions.len(), failed.len(), elapsed);
        tracing::info!(
            generated = questions.len(),
            failed = failed.len(),
            valid = verification.valid,
            invalid = verification.invalid,
            "paper assembled"
        );

        Ok(ExamPaper {
            id: Uuid::new_v4(),
            created_at: chrono::Utc::now(),
            subject: planned.subject,
            cutoff_year: request.cutoff_year,
            total_requested: request.total_questions,
            distribution: planned.plan,
            questions,
            failed,
            missing,
            verification,
            regeneration_rounds: rounds,
            duration_ms: elapsed.as_millis() as u64,
        })
    }

    /// Generate every slot in `slots` with bounded parallelism.
    ///
    /// Outcomes are keyed by slot index. Slots still pending at `deadline`
    /// are cancelled and reported with a timeout reason.
    async fn dispatch(
        &self,
        subject_name: &str,
        slots: &[Slot],
        deadline: Option<tokio::time::Instant>,
        progress: &dyn ProgressReporter,
    ) -> BTreeMap<usize, Result<GeneratedQuestion, String>> {
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let completed = Arc::new(AtomicUsize::new(0));
        let total = slots.len();

        let mut futures = FuturesUnordered::new();
        for slot in slots {
            let generator = Arc::clone(&self.generator);
            let semaphore = Arc::clone(&semaphore);
            let completed = Arc::clone(&completed);
            let request = GenerationRequest::new(subject_name, slot.clone());
            let max_retries = self.config.max_retries;
            let retry_delay = self.config.retry_delay;

            futures.push(async move {
                let index = request.slot.index;
                let inner = async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
                    generate_with_retry(generator.as_ref(), &request, max_retries, retry_delay)
                        .await
                };
                let result = inner.await;
                if result.is_ok() {
                    completed.fetch_add(1, Ordering::Relaxed);
                }
                (index, result)
            });
        }

        let by_index: HashMap<usize, &Slot> = slots.iter().map(|s| (s.index, s)).collect();
        let mut outcomes = BTreeMap::new();

        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, futures.next()).await {
                    Ok(next) => next,
                    Err(_) => break,
                },
                None => futures.next().await,
            };
            let Some((index, result)) = next else { break };

            match result {
                Ok(question) => {
                    if let Some(slot) = by_index.get(&index) {
                        progress.on_slot_complete(slot, completed.load(Ordering::Relaxed), total);
                    }
                    outcomes.insert(index, Ok(question));
                }
                Err(e) => {
                    let reason = format!("{e:#}");
                    tracing::warn!(slot = index, "generation failed: {reason}");
                    if let Some(slot) = by_index.get(&index) {
                        progress.on_slot_error(slot, &reason);
                    }
                    outcomes.insert(index, Err(reason));
                }
            }
        }

        if outcomes.len() < total {
            let secs = self.config.request_timeout.map(|t| t.as_secs()).unwrap_or(0);
            for slot in slots {
                if !outcomes.contains_key(&slot.index) {
                    let reason = ProviderError::Timeout(secs).to_string();
                    tracing::warn!(slot = slot.index, "generation abandoned: {reason}");
                    progress.on_slot_error(slot, &reason);
                    outcomes.insert(slot.index, Err(reason));
                }
            }
        }

        outcomes
    }
}

/// Call the generator, retrying transient failures with exponential backoff.
async fn generate_with_retry(
    generator: &dyn QuestionGenerator,
    request: &GenerationRequest,
    max_retries: u32,
    retry_delay: Duration,
) -> anyhow::Result<GeneratedQuestion> {
    let mut last_error = None;
    let mut delay = retry_delay;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(Duration::from_secs(60));
        }
        match generator.generate(request).await {
            Ok(question) => return Ok(question),
            Err(e) => {
                if let Some(provider_error) = e.downcast_ref::<ProviderError>() {
                    if provider_error.is_permanent() {
                        return Err(e);
                    }
                    if let Some(ms) = provider_error.retry_after_ms() {
                        delay = Duration::from_millis(ms);
                    }
                }
                tracing::debug!(
                    slot = request.slot.index,
                    attempt,
                    generator = generator.name(),
                    "generation attempt failed: {e:#}"
                );
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("unknown error")))
}

/// Generated questions in slot order, with their slot indices.
fn generated(
    outcomes: &BTreeMap<usize, Result<GeneratedQuestion, String>>,
) -> (Vec<usize>, Vec<GeneratedQuestion>) {
    outcomes
        .iter()
        .filter_map(|(&i, o)| o.as_ref().ok().map(|q| (i, q.clone())))
        .unzip()
}

fn failed_slot(slot: &Slot, reason: String) -> FailedSlot {
    FailedSlot {
        slot_index: slot.index,
        topic_id: slot.topic_id.clone(),
        topic_name: slot.topic_name.clone(),
        bucket: slot.bucket,
        reason,
    }
}
