//! Chapter content generation
//!
//! The only concurrent stage. The map phase fans per-abstraction content
//! requests out to the LLM through a fixed-size worker pool with
//! independent retry and failure isolation; the reduce phase assembles
//! chapter documents in plan order once every request has settled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::GenerationConfig;
use crate::error::Result;

use super::analyzer::DependencyGraph;
use super::extractor::Abstraction;
use super::llm::{build_section_prompt, LlmClient, LlmFailure};
use super::planner::ChapterPlan;
use super::source::ProjectMetadata;

/// Generation status of one chapter document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Complete,
    Partial,
    Failed,
}

/// Generated content bound to one chapter plan entry.
///
/// A failed chapter keeps its order slot with an empty body; it is
/// reported, never dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterDocument {
    /// Order index matching the chapter plan
    pub index: usize,

    /// Chapter title carried over from the plan
    pub title: String,

    /// Rendered body text; empty when generation failed entirely
    pub body: String,

    /// Abstraction identifiers covered by the body, in plan order
    pub covered: Vec<String>,

    /// Outcome of the reduce phase for this chapter
    pub status: GenerationStatus,
}

/// Run-level accounting surfaced to the user alongside the tutorial
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub complete_chapters: usize,
    pub partial_chapters: usize,
    pub failed_chapters: usize,

    /// Names of abstractions whose content requests ultimately failed
    pub failed_sections: Vec<String>,
}

/// Map/reduce generator over the chapter plan
pub struct ContentGenerator {
    client: Arc<dyn LlmClient>,
    config: GenerationConfig,
}

impl ContentGenerator {
    pub fn new(client: Arc<dyn LlmClient>, config: &GenerationConfig) -> Self {
        Self {
            client,
            config: config.clone(),
        }
    }

    /// Produce one chapter document per plan entry, in plan order
    pub async fn generate(
        &self,
        plan: &ChapterPlan,
        abstractions: &[Abstraction],
        graph: &DependencyGraph,
        project: &ProjectMetadata,
    ) -> Result<(Vec<ChapterDocument>, GenerationSummary)> {
        let by_id: HashMap<&str, &Abstraction> =
            abstractions.iter().map(|a| (a.id.as_str(), a)).collect();

        let sections = self.map_phase(plan, &by_id, graph, project).await;
        let documents = self.reduce_phase(plan, &by_id, &sections);

        let mut summary = GenerationSummary::default();
        for document in &documents {
            match document.status {
                GenerationStatus::Complete => summary.complete_chapters += 1,
                GenerationStatus::Partial => summary.partial_chapters += 1,
                GenerationStatus::Failed => summary.failed_chapters += 1,
            }
        }
        for chapter in &plan.chapters {
            for member in &chapter.members {
                if !matches!(sections.get(member), Some(Ok(_))) {
                    if let Some(abstraction) = by_id.get(member.as_str()) {
                        summary.failed_sections.push(abstraction.name.clone());
                    }
                }
            }
        }

        info!(
            "Generated {} chapters ({} complete, {} partial, {} failed)",
            documents.len(),
            summary.complete_chapters,
            summary.partial_chapters,
            summary.failed_chapters
        );

        Ok((documents, summary))
    }

    /// Dispatch every content request through the bounded worker pool and
    /// collect results keyed by abstraction identifier.
    ///
    /// Requests complete in any order; a request that exhausts its retries
    /// fails alone and never halts its siblings. The global run timeout
    /// aborts whatever is still pending, and aborted requests count as
    /// failed.
    async fn map_phase(
        &self,
        plan: &ChapterPlan,
        by_id: &HashMap<&str, &Abstraction>,
        graph: &DependencyGraph,
        project: &ProjectMetadata,
    ) -> HashMap<String, std::result::Result<String, LlmFailure>> {
        let ordered: Vec<&str> = plan
            .chapters
            .iter()
            .flat_map(|c| c.members.iter().map(String::as_str))
            .collect();
        let total = ordered.len();

        let semaphore = Arc::new(Semaphore::new(self.config.map_concurrency));
        let mut join_set: JoinSet<(String, std::result::Result<String, LlmFailure>)> =
            JoinSet::new();

        for (position, id) in ordered.iter().enumerate() {
            let Some(abstraction) = by_id.get(id) else {
                continue;
            };
            let prompt = build_section_prompt(abstraction, graph, by_id, position, total, project);
            let id = (*id).to_string();
            let client = Arc::clone(&self.client);
            let semaphore = Arc::clone(&semaphore);
            let max_attempts = self.config.max_retries.max(1);
            let base_delay = Duration::from_millis(self.config.retry_base_delay_ms);

            join_set.spawn(async move {
                // Closed only when the whole pool is dropped
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                let outcome = request_with_retry(client, &prompt, max_attempts, base_delay).await;
                (id, outcome)
            });
        }

        let mut results: HashMap<String, std::result::Result<String, LlmFailure>> = HashMap::new();
        let deadline = Duration::from_secs(self.config.run_timeout_secs);

        let collection = async {
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((id, outcome)) => {
                        results.insert(id, outcome);
                    }
                    Err(e) => warn!("Content request task panicked: {}", e),
                }
            }
        };

        if tokio::time::timeout(deadline, collection).await.is_err() {
            warn!(
                "Run timeout of {}s reached; aborting pending content requests",
                self.config.run_timeout_secs
            );
            join_set.abort_all();
        }

        // Anything aborted or lost is a failed section
        for id in &ordered {
            results
                .entry((*id).to_string())
                .or_insert(Err(LlmFailure::Timeout));
        }

        results
    }

    /// Concatenate the successful sections of each chapter, in the member
    /// order fixed by the plan
    fn reduce_phase(
        &self,
        plan: &ChapterPlan,
        by_id: &HashMap<&str, &Abstraction>,
        sections: &HashMap<String, std::result::Result<String, LlmFailure>>,
    ) -> Vec<ChapterDocument> {
        let mut documents = Vec::with_capacity(plan.chapters.len());

        for chapter in &plan.chapters {
            let mut body = String::new();
            let mut covered = Vec::new();
            let mut omitted = Vec::new();

            for member in &chapter.members {
                let name = by_id
                    .get(member.as_str())
                    .map(|a| a.name.clone())
                    .unwrap_or_else(|| member.clone());

                match sections.get(member) {
                    Some(Ok(text)) => {
                        if !body.is_empty() {
                            // Short transition between concatenated sections
                            body.push_str(&format!("\n\n*Next up: {}.*\n\n", name));
                        }
                        body.push_str(&format!("### {}\n\n", name));
                        body.push_str(text.trim());
                        covered.push(member.clone());
                    }
                    _ => omitted.push(name),
                }
            }

            let status = if covered.is_empty() {
                GenerationStatus::Failed
            } else if omitted.is_empty() {
                GenerationStatus::Complete
            } else {
                GenerationStatus::Partial
            };

            if status == GenerationStatus::Partial {
                body.push_str(&format!(
                    "\n\n> Content for the following members could not be generated: {}.",
                    omitted.join(", ")
                ));
            }
            if status == GenerationStatus::Failed {
                body.clear();
                debug!("Chapter {} failed entirely", chapter.index);
            }

            documents.push(ChapterDocument {
                index: chapter.index,
                title: chapter.title.clone(),
                body,
                covered,
                status,
            });
        }

        documents
    }
}

/// One request with bounded attempts and exponential backoff on transient
/// failures; non-transient failures are returned immediately
async fn request_with_retry(
    client: Arc<dyn LlmClient>,
    prompt: &str,
    max_attempts: u32,
    base_delay: Duration,
) -> std::result::Result<String, LlmFailure> {
    let mut attempt = 0;
    loop {
        match client.complete(prompt).await {
            Ok(text) => return Ok(text),
            Err(failure) => {
                attempt += 1;
                if !failure.is_transient() || attempt >= max_attempts {
                    return Err(failure);
                }
                let delay = base_delay * 2u32.saturating_pow(attempt - 1);
                debug!(
                    "Transient LLM failure ({}), retrying in {:?} (attempt {}/{})",
                    failure, delay, attempt, max_attempts
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::extractor::AbstractionKind;
    use crate::core::planner::{Chapter, Difficulty};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn abstraction(id: &str, name: &str) -> Abstraction {
        Abstraction {
            id: id.to_string(),
            name: name.to_string(),
            kind: AbstractionKind::Function,
            file: PathBuf::from("demo.py"),
            line: 1,
            module: "demo".to_string(),
            language: "python".to_string(),
            doc: None,
            members: vec![],
            imports: vec![],
            supertypes: vec![],
            complexity: 3,
            body: String::new(),
        }
    }

    fn plan(chapters: &[&[&str]]) -> ChapterPlan {
        ChapterPlan {
            chapters: chapters
                .iter()
                .enumerate()
                .map(|(index, members)| Chapter {
                    index,
                    title: format!("Chapter {}", index),
                    members: members.iter().map(|m| m.to_string()).collect(),
                    difficulty: Difficulty::Beginner,
                    prerequisites: vec![],
                })
                .collect(),
        }
    }

    fn empty_graph() -> DependencyGraph {
        DependencyGraph {
            edges: vec![],
            ordering_edges: vec![],
            clusters: HashMap::new(),
            warnings: vec![],
        }
    }

    fn project() -> ProjectMetadata {
        ProjectMetadata {
            name: "demo".to_string(),
            primary_language: "python".to_string(),
            file_count: 1,
        }
    }

    /// Fails (non-transiently) for any prompt mentioning a poisoned name
    struct PoisonedClient {
        poisoned: Vec<String>,
    }

    #[async_trait::async_trait]
    impl LlmClient for PoisonedClient {
        async fn complete(&self, prompt: &str) -> std::result::Result<String, LlmFailure> {
            for name in &self.poisoned {
                if prompt.contains(&format!("Name: {}", name)) {
                    return Err(LlmFailure::InvalidRequest("poisoned".to_string()));
                }
            }
            Ok("explanation".to_string())
        }

        fn provider_name(&self) -> &str {
            "Poisoned"
        }

        fn model_name(&self) -> &str {
            "test"
        }
    }

    /// Rate-limits the first N calls, then succeeds
    struct FlakyClient {
        failures: AtomicU32,
    }

    #[async_trait::async_trait]
    impl LlmClient for FlakyClient {
        async fn complete(&self, _prompt: &str) -> std::result::Result<String, LlmFailure> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(LlmFailure::RateLimited);
            }
            Ok("recovered".to_string())
        }

        fn provider_name(&self) -> &str {
            "Flaky"
        }

        fn model_name(&self) -> &str {
            "test"
        }
    }

    /// Never answers; used to exercise the global run timeout
    struct StalledClient;

    #[async_trait::async_trait]
    impl LlmClient for StalledClient {
        async fn complete(&self, _prompt: &str) -> std::result::Result<String, LlmFailure> {
            std::future::pending::<()>().await;
            unreachable!()
        }

        fn provider_name(&self) -> &str {
            "Stalled"
        }

        fn model_name(&self) -> &str {
            "test"
        }
    }

    fn generator(client: Arc<dyn LlmClient>) -> ContentGenerator {
        let mut config = Config::default().generation;
        config.retry_base_delay_ms = 1;
        config.run_timeout_secs = 5;
        ContentGenerator::new(client, &config)
    }

    #[tokio::test(start_paused = true)]
    async fn one_failure_only_degrades_its_own_chapter() {
        let abstractions = vec![
            abstraction("id_a", "Alpha"),
            abstraction("id_b", "Beta"),
            abstraction("id_c", "Gamma"),
            abstraction("id_d", "Delta"),
        ];
        let plan = plan(&[&["id_a", "id_b"], &["id_c", "id_d"]]);
        let client = Arc::new(PoisonedClient {
            poisoned: vec!["Gamma".to_string()],
        });

        let (documents, summary) = generator(client)
            .generate(&plan, &abstractions, &empty_graph(), &project())
            .await
            .unwrap();

        assert_eq!(documents[0].status, GenerationStatus::Complete);
        assert_eq!(documents[1].status, GenerationStatus::Partial);
        assert!(documents[1].body.contains("Gamma"));
        assert_eq!(summary.complete_chapters, 1);
        assert_eq!(summary.partial_chapters, 1);
        assert_eq!(summary.failed_sections, vec!["Gamma".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn a_fully_failed_chapter_keeps_its_slot() {
        let abstractions = vec![abstraction("id_a", "Alpha"), abstraction("id_b", "Beta")];
        let plan = plan(&[&["id_a"], &["id_b"]]);
        let client = Arc::new(PoisonedClient {
            poisoned: vec!["Beta".to_string()],
        });

        let (documents, summary) = generator(client)
            .generate(&plan, &abstractions, &empty_graph(), &project())
            .await
            .unwrap();

        assert_eq!(documents.len(), 2);
        assert_eq!(documents[1].index, 1);
        assert_eq!(documents[1].status, GenerationStatus::Failed);
        assert!(documents[1].body.is_empty());
        assert_eq!(summary.failed_chapters, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_to_success() {
        let abstractions = vec![abstraction("id_a", "Alpha")];
        let plan = plan(&[&["id_a"]]);
        let client = Arc::new(FlakyClient {
            failures: AtomicU32::new(2),
        });

        let (documents, _) = generator(client)
            .generate(&plan, &abstractions, &empty_graph(), &project())
            .await
            .unwrap();

        assert_eq!(documents[0].status, GenerationStatus::Complete);
        assert!(documents[0].body.contains("recovered"));
    }

    #[tokio::test(start_paused = true)]
    async fn run_timeout_marks_pending_requests_failed() {
        let abstractions = vec![abstraction("id_a", "Alpha")];
        let plan = plan(&[&["id_a"]]);

        let (documents, summary) = generator(Arc::new(StalledClient))
            .generate(&plan, &abstractions, &empty_graph(), &project())
            .await
            .unwrap();

        assert_eq!(documents[0].status, GenerationStatus::Failed);
        assert_eq!(summary.failed_chapters, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn chapters_come_out_in_plan_order() {
        let abstractions: Vec<Abstraction> = (0..6)
            .map(|i| abstraction(&format!("id_{}", i), &format!("Item{}", i)))
            .collect();
        let plan = plan(&[&["id_0", "id_1"], &["id_2", "id_3"], &["id_4", "id_5"]]);
        let client = Arc::new(PoisonedClient { poisoned: vec![] });

        let (documents, _) = generator(client)
            .generate(&plan, &abstractions, &empty_graph(), &project())
            .await
            .unwrap();

        let indices: Vec<usize> = documents.iter().map(|d| d.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(documents
            .iter()
            .all(|d| d.status == GenerationStatus::Complete));
    }
}
