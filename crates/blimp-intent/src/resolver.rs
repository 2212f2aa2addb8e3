//! Intent resolver: prompt -> existing or newly synthesized workflow.
//!
//! Resolution runs in three steps:
//!
//! 1. **Classify** the prompt into a capability key, name and description.
//! 2. **Rank** every visible candidate (active templates plus the user's own
//!    workflows) by match tier, then similarity, then recency, then id.
//! 3. **Synthesize** a new definition when nothing qualifies, and persist it
//!    immediately.
//!
//! | Tier | Rule                                         | Also requires                  |
//! |------|----------------------------------------------|--------------------------------|
//! | 1    | classified apps == candidate apps            | similarity >= structural floor |
//! | 2    | classified apps strictly inside candidate's  | similarity >= structural floor |
//! | 3    | any                                          | similarity >= threshold        |

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use blimp_kernel::{
    AppId, CapabilityKey, ConnectionRepository, NewWorkflow, RepoResult, TemplateRepository,
    WorkflowDefinition, WorkflowScope,
};

use crate::classifier::{CatalogueEntry, ClassificationRequest, ClassifiedIntent, Classifier};
use crate::error::{ResolutionError, Result};
use crate::similarity::Similarity;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Matching thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Minimum similarity for a purely textual (tier 3) match.
    pub similarity_threshold: f64,
    /// Minimum similarity for a structural (tier 1 or 2) match.
    ///
    /// With the default floor a same-apps workflow whose text shares
    /// nothing with the prompt is dropped, and a textual match may win
    /// instead. `0.0` restores strict priority: any exact app-set match
    /// outranks every textual one.
    pub structural_floor: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.5,
            structural_floor: 0.2,
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How a candidate relates to the classified capability key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact = 1,
    Containment = 2,
    Textual = 3,
}

/// A candidate that passed its tier's threshold.
#[derive(Debug, Clone, Copy)]
pub struct RankedCandidate<'a> {
    pub workflow: &'a WorkflowDefinition,
    pub tier: MatchTier,
    pub similarity: f64,
}

impl RankedCandidate<'_> {
    fn cmp_rank(&self, other: &Self) -> Ordering {
        self.tier
            .cmp(&other.tier)
            .then_with(|| other.similarity.total_cmp(&self.similarity))
            .then_with(|| other.workflow.updated_at.cmp(&self.workflow.updated_at))
            .then_with(|| self.workflow.id.cmp(&other.workflow.id))
    }
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedWorkflow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub required_apps: CapabilityKey,
    pub category: String,
    /// `true` when the definition was created by this call.
    pub is_new: bool,
}

impl ResolvedWorkflow {
    fn from_definition(wf: &WorkflowDefinition, is_new: bool) -> Self {
        Self {
            id: wf.id.clone(),
            name: wf.name.clone(),
            description: wf.description.clone(),
            required_apps: wf.required_apps.clone(),
            category: wf.category.clone(),
            is_new,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

pub struct IntentResolver {
    classifier: Arc<dyn Classifier>,
    templates: Arc<dyn TemplateRepository>,
    connections: Option<Arc<dyn ConnectionRepository>>,
    similarity: Similarity,
    config: ResolverConfig,
}

impl IntentResolver {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        templates: Arc<dyn TemplateRepository>,
        config: ResolverConfig,
    ) -> Result<Self> {
        Ok(Self {
            classifier,
            templates,
            connections: None,
            similarity: Similarity::new()?,
            config,
        })
    }

    /// Let the classifier see which apps the user has connected.
    pub fn with_connections(mut self, connections: Arc<dyn ConnectionRepository>) -> Self {
        self.connections = Some(connections);
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve `prompt` for `user_id`.
    ///
    /// Classifier failures abort before anything is written.
    pub async fn resolve(
        &self,
        prompt: &str,
        context: &serde_json::Value,
        user_id: &str,
    ) -> Result<ResolvedWorkflow> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ResolutionError::EmptyPrompt);
        }

        let (templates, personal, connected_apps) = futures::try_join!(
            self.templates.list_templates(),
            self.templates.list_for_user(user_id),
            self.connected_apps(user_id),
        )?;
        let candidates: Vec<WorkflowDefinition> = templates
            .into_iter()
            .chain(personal)
            .filter(|wf| wf.is_active && wf.visible_to(user_id))
            .collect();

        let request = ClassificationRequest {
            prompt: prompt.to_string(),
            context: context.clone(),
            catalogue: candidates.iter().map(CatalogueEntry::from).collect(),
            connected_apps,
        };
        let intent = self.classifier.classify(&request).await?.validate()?;
        debug!(
            classifier = self.classifier.name(),
            capability = %intent.required_apps,
            candidates = candidates.len(),
            "prompt classified"
        );

        if let Some(best) = self.rank(prompt, &intent.required_apps, &candidates).first() {
            info!(
                workflow_id = %best.workflow.id,
                tier = ?best.tier,
                similarity = best.similarity,
                "matched existing workflow"
            );
            return Ok(ResolvedWorkflow::from_definition(best.workflow, false));
        }

        let created = self
            .templates
            .create(self.synthesize(prompt, context, user_id, intent))
            .await?;
        info!(
            workflow_id = %created.id,
            capability = %created.required_apps,
            template = created.is_template(),
            "created workflow definition"
        );
        Ok(ResolvedWorkflow::from_definition(&created, true))
    }

    /// Qualifying candidates, best first.
    pub fn rank<'a>(
        &self,
        prompt: &str,
        key: &CapabilityKey,
        candidates: &'a [WorkflowDefinition],
    ) -> Vec<RankedCandidate<'a>> {
        let mut ranked: Vec<RankedCandidate<'a>> = candidates
            .iter()
            .filter_map(|wf| {
                let similarity = self
                    .similarity
                    .score(prompt, &format!("{} {}", wf.name, wf.description));
                let tier = if wf.required_apps == *key {
                    MatchTier::Exact
                } else if key.is_proper_subset(&wf.required_apps) {
                    MatchTier::Containment
                } else {
                    MatchTier::Textual
                };
                let threshold = match tier {
                    MatchTier::Exact | MatchTier::Containment => self.config.structural_floor,
                    MatchTier::Textual => self.config.similarity_threshold,
                };
                debug!(workflow_id = %wf.id, ?tier, similarity, threshold, "scored candidate");
                (similarity >= threshold).then_some(RankedCandidate {
                    workflow: wf,
                    tier,
                    similarity,
                })
            })
            .collect();
        ranked.sort_by(|a, b| a.cmp_rank(b));
        ranked
    }

    fn synthesize(
        &self,
        prompt: &str,
        context: &serde_json::Value,
        user_id: &str,
        intent: ClassifiedIntent,
    ) -> NewWorkflow {
        let description = if intent.description.is_empty() {
            prompt.to_string()
        } else {
            intent.description
        };
        let scope = if wants_personal(context) {
            WorkflowScope::User {
                user_id: user_id.to_string(),
                prompt: prompt.to_string(),
            }
        } else {
            WorkflowScope::Template
        };
        NewWorkflow::template(intent.name, description, intent.required_apps)
            .with_category(intent.category)
            .with_scope(scope)
    }

    async fn connected_apps(&self, user_id: &str) -> RepoResult<Vec<AppId>> {
        match &self.connections {
            Some(connections) => Ok(connections
                .list_active(user_id)
                .await?
                .into_iter()
                .map(|c| c.app)
                .collect()),
            None => Ok(Vec::new()),
        }
    }
}

/// `context.personalize == true` or `context.scope == "user"`.
fn wants_personal(context: &serde_json::Value) -> bool {
    context.get("personalize").and_then(|v| v.as_bool()) == Some(true)
        || context.get("scope").and_then(|v| v.as_str()) == Some("user")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn wf(id: &str, name: &str, apps: &[AppId], updated: i64) -> WorkflowDefinition {
        WorkflowDefinition {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            required_apps: CapabilityKey::new(apps.iter().copied()).unwrap(),
            category: "custom".into(),
            scope: WorkflowScope::Template,
            is_active: true,
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
            updated_at: Utc.timestamp_opt(updated, 0).unwrap(),
        }
    }

    fn resolver(config: ResolverConfig) -> IntentResolver {
        IntentResolver::new(
            Arc::new(crate::KeywordClassifier::new().unwrap()),
            Arc::new(blimp_kernel::InMemoryTemplates::new()),
            config,
        )
        .unwrap()
    }

    fn key(apps: &[AppId]) -> CapabilityKey {
        CapabilityKey::new(apps.iter().copied()).unwrap()
    }

    #[test]
    fn exact_beats_containment_beats_textual() {
        let r = resolver(ResolverConfig::default());
        let candidates = vec![
            wf(
                "c",
                "email calendar slack sync",
                &[AppId::Gmail, AppId::GCalendar, AppId::Slack],
                5,
            ),
            wf("t", "email calendar", &[AppId::Notion], 9),
            wf("e", "email calendar helper", &[AppId::Gmail, AppId::GCalendar], 1),
        ];
        let ranked = r.rank(
            "email calendar",
            &key(&[AppId::Gmail, AppId::GCalendar]),
            &candidates,
        );
        let order: Vec<_> = ranked.iter().map(|c| (c.workflow.id.as_str(), c.tier)).collect();
        assert_eq!(
            order,
            vec![
                ("e", MatchTier::Exact),
                ("c", MatchTier::Containment),
                ("t", MatchTier::Textual)
            ]
        );
    }

    #[test]
    fn structural_matches_still_need_the_floor() {
        let r = resolver(ResolverConfig::default());
        let candidates = vec![wf("e", "weekly notion digest", &[AppId::Gmail], 1)];
        assert!(r.rank("email calendar", &key(&[AppId::Gmail]), &candidates).is_empty());

        let lenient = resolver(ResolverConfig {
            structural_floor: 0.0,
            ..ResolverConfig::default()
        });
        assert_eq!(lenient.rank("email calendar", &key(&[AppId::Gmail]), &candidates).len(), 1);
    }

    #[test]
    fn zero_floor_gives_exact_matches_strict_priority() {
        let candidates = vec![
            wf("e", "weekly notion digest", &[AppId::Gmail], 1),
            wf("t", "email calendar", &[AppId::Notion], 9),
        ];
        let best = |config| {
            resolver(config)
                .rank("email calendar", &key(&[AppId::Gmail]), &candidates)
                .first()
                .map(|c| (c.workflow.id.clone(), c.tier))
        };

        assert_eq!(
            best(ResolverConfig::default()),
            Some(("t".to_string(), MatchTier::Textual))
        );
        let strict = ResolverConfig {
            structural_floor: 0.0,
            ..ResolverConfig::default()
        };
        assert_eq!(best(strict), Some(("e".to_string(), MatchTier::Exact)));
    }

    #[test]
    fn ties_break_on_recency_then_id() {
        let r = resolver(ResolverConfig::default());
        let apps = [AppId::Gmail, AppId::GCalendar];
        let candidates = vec![
            wf("b", "email calendar", &apps, 10),
            wf("a", "email calendar", &apps, 10),
            wf("z", "email calendar", &apps, 20),
        ];
        let ids: Vec<_> = r
            .rank("email calendar", &key(&apps), &candidates)
            .iter()
            .map(|c| c.workflow.id.clone())
            .collect();
        assert_eq!(ids, vec!["z", "a", "b"]);
    }

    #[test]
    fn personalization_flags() {
        assert!(wants_personal(&serde_json::json!({ "personalize": true })));
        assert!(wants_personal(&serde_json::json!({ "scope": "user" })));
        assert!(!wants_personal(&serde_json::json!({ "personalize": "yes" })));
        assert!(!wants_personal(&serde_json::Value::Null));
    }
}
