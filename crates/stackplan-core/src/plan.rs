//! Action plans: the stage-ordered document a plan build produces and an
//! execution consumes.

use crate::admission::Admission;
use crate::config::Config;
use crate::error::{Result, StackplanError};
use crate::io;
use crate::paths;
use crate::registry::Registry;
use crate::types::{FieldKind, Stage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Document types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanAction {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    pub stage: Stage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub default: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub name: String,
    #[serde(default)]
    pub actions: Vec<PlanAction>,
    #[serde(default)]
    pub fields: Vec<PlanField>,
}

impl ActionPlan {
    pub fn to_document(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_document(document: &str) -> Result<Self> {
        Ok(serde_json::from_str(document)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_document(&data)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        io::atomic_write(path, self.to_document()?.as_bytes())
    }

    pub fn action(&self, name: &str) -> Option<&PlanAction> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// Every input any action needs, first-seen order.
    pub fn required_inputs(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for input in self.actions.iter().flat_map(|a| &a.inputs) {
            if !out.contains(input) {
                out.push(input.clone());
            }
        }
        out
    }

    /// Actions grouped by stage, stages ascending, plan order within a stage.
    pub fn stages(&self) -> Vec<(Stage, Vec<&PlanAction>)> {
        Stage::all()
            .iter()
            .filter_map(|&stage| {
                let members: Vec<&PlanAction> =
                    self.actions.iter().filter(|a| a.stage == stage).collect();
                (!members.is_empty()).then_some((stage, members))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// PlanStore
// ---------------------------------------------------------------------------

/// Where non-dry-run plan builds hand their document.
pub trait PlanStore: Send + Sync {
    fn store(&self, plan: &ActionPlan, document: &str) -> Result<()>;
}

/// Writes `<dir>/<name>.plan`.
#[derive(Debug, Clone)]
pub struct FilePlanStore {
    dir: PathBuf,
}

impl FilePlanStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        paths::plan_path(&self.dir, name)
    }
}

impl PlanStore for FilePlanStore {
    fn store(&self, plan: &ActionPlan, document: &str) -> Result<()> {
        let path = self.path_for(&plan.name);
        io::atomic_write(&path, document.as_bytes())?;
        info!(plan = %plan.name, path = %path.display(), "plan written");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PlanBuilder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Plan name; defaults to the repository directory name.
    pub name: Option<String>,
    /// Fail with `NoActionsAdmitted` instead of producing an empty plan.
    pub require_actions: bool,
}

/// Stateless: safe to share and to call concurrently.
pub struct PlanBuilder {
    registry: Arc<Registry>,
    store: Arc<dyn PlanStore>,
    options: PlanOptions,
}

impl PlanBuilder {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn PlanStore>) -> Self {
        Self {
            registry,
            store,
            options: PlanOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PlanOptions) -> Self {
        self.options = options;
        self
    }

    /// Evaluate, admit, group and serialize. With `dry_run` the document is
    /// only returned; otherwise it is also handed to the plan store.
    pub fn create_action_plan(&self, repo: &Path, dry_run: bool) -> Result<String> {
        let (plan, _) = self.build_plan(repo)?;
        let document = plan.to_document()?;
        if !dry_run {
            self.store.store(&plan, &document)?;
        }
        Ok(document)
    }

    /// The plan plus every resolver outcome, admitted or not.
    pub fn build_plan(&self, repo: &Path) -> Result<(ActionPlan, Vec<Admission>)> {
        let name = match &self.options.name {
            Some(name) => {
                paths::validate_plan_name(name)?;
                name.clone()
            }
            None => default_plan_name(repo)?,
        };

        let facts = self.registry.evaluate(repo)?;
        let config = Config::load(repo)?;
        debug!(plan = %name, facts = facts.len(), "facts evaluated");

        let admissions: Vec<Admission> = self
            .registry
            .actions()
            .map(|entry| entry.resolver.resolve(&facts))
            .collect();

        let mut admitted: Vec<(Stage, usize, PlanAction)> = Vec::new();
        for (position, (entry, admission)) in self.registry.actions().zip(&admissions).enumerate() {
            if !admission.admitted {
                debug!(action = %admission.action, missing = ?admission.missing_facts, "not admitted");
                continue;
            }
            let inputs =
                crate::inputs::merge_input_names(&admission.required_inputs, &entry.action.inputs);
            admitted.push((
                entry.action.stage,
                position,
                PlanAction {
                    name: entry.action.name().to_string(),
                    inputs,
                    stage: entry.action.stage,
                },
            ));
        }
        admitted.sort_by_key(|(stage, position, _)| (*stage, *position));

        if admitted.is_empty() && self.options.require_actions {
            return Err(StackplanError::NoActionsAdmitted(repo.display().to_string()));
        }

        let mut fields: Vec<PlanField> = Vec::new();
        for (_, _, planned) in &admitted {
            let Some(entry) = self.registry.get(&planned.name) else {
                continue;
            };
            for spec in &entry.action.fields {
                if fields.iter().any(|f| f.name == spec.name) {
                    continue;
                }
                fields.push(PlanField {
                    name: spec.name.to_string(),
                    kind: spec.kind,
                    default: config
                        .field_value(spec.name)
                        .unwrap_or(serde_json::Value::Null),
                });
            }
        }

        let plan = ActionPlan {
            name,
            actions: admitted.into_iter().map(|(_, _, a)| a).collect(),
            fields,
        };
        info!(plan = %plan.name, actions = plan.actions.len(), "plan built");
        Ok((plan, admissions))
    }
}

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

fn default_plan_name(repo: &Path) -> Result<String> {
    let resolved = repo.canonicalize().map_err(|e| StackplanError::RepositoryUnreadable {
        path: repo.to_path_buf(),
        reason: e.to_string(),
    })?;
    let raw = resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = sanitize_name(&raw);
    paths::validate_plan_name(&name)?;
    Ok(name)
}

fn sanitize_name(raw: &str) -> String {
    let lowered: String = raw
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    lowered
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

/// Derive a plan name from a git URL: last path segment without `.git`,
/// lower-cased, suffixed with `-<subpath>` (slashes removed) when given.
/// Plain `http://` URLs are rejected.
pub fn plan_name_from_source(url: &str, subpath: Option<&str>) -> Result<String> {
    if url.starts_with("http://") {
        return Err(StackplanError::InvalidSourceUrl(
            url.to_string(),
            "insecure http is not allowed, use https".to_string(),
        ));
    }
    let segment = url.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    let mut name = segment.replace(".git", "").to_lowercase();
    if name.is_empty() {
        return Err(StackplanError::InvalidSourceUrl(
            url.to_string(),
            "unable to derive a name from the url".to_string(),
        ));
    }
    if let Some(path) = subpath.filter(|p| !p.trim_matches('/').is_empty()) {
        name = format!("{name}-{}", path.replace('/', "").to_lowercase());
    }
    paths::validate_plan_name(&name)?;
    Ok(name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ActionPlan {
        ActionPlan {
            name: "checkout-service".into(),
            actions: vec![
                PlanAction {
                    name: "npmBuild".into(),
                    inputs: vec![],
                    stage: Stage::Build,
                },
                PlanAction {
                    name: "argocdSync".into(),
                    inputs: vec!["ARGOCD_SERVER".into(), "ARGOCD_AUTH_TOKEN".into()],
                    stage: Stage::Prerelease,
                },
            ],
            fields: vec![PlanField {
                name: "argocd.insecure".into(),
                kind: FieldKind::Bool,
                default: serde_json::Value::Bool(false),
            }],
        }
    }

    #[test]
    fn document_shape_uses_type_key() {
        let doc = sample().to_document().unwrap();
        let value: serde_json::Value = serde_json::from_str(&doc).unwrap();
        assert_eq!(value["fields"][0]["type"], "bool");
        assert_eq!(value["actions"][1]["stage"], "prerelease");
        assert_eq!(ActionPlan::from_document(&doc).unwrap(), sample());
    }

    #[test]
    fn stages_group_in_order() {
        let plan = sample();
        let stages = plan.stages();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].0, Stage::Build);
        assert_eq!(stages[1].1[0].name, "argocdSync");
        assert_eq!(
            plan.required_inputs(),
            vec!["ARGOCD_SERVER", "ARGOCD_AUTH_TOKEN"]
        );
    }

    #[test]
    fn file_store_writes_named_plan() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FilePlanStore::new(dir.path());
        let plan = sample();
        store.store(&plan, &plan.to_document().unwrap()).unwrap();
        let loaded = ActionPlan::load(&dir.path().join("checkout-service.plan")).unwrap();
        assert_eq!(loaded, plan);
    }

    #[test]
    fn name_from_source_url() {
        assert_eq!(
            plan_name_from_source("https://github.com/acme/Checkout-Service.git", None).unwrap(),
            "checkout-service"
        );
        assert_eq!(
            plan_name_from_source("git@github.com:acme/mono.git", Some("services/api")).unwrap(),
            "mono-servicesapi"
        );
        assert!(matches!(
            plan_name_from_source("http://github.com/acme/app.git", None),
            Err(StackplanError::InvalidSourceUrl(..))
        ));
    }

    #[test]
    fn sanitize_directory_names() {
        assert_eq!(sanitize_name("My Repo"), "my-repo");
        assert_eq!(sanitize_name("_tmp_"), "tmp");
    }
}
