//! `argocdSync`: create-or-update an Argo CD Application from its manifest,
//! then sync it.

use crate::action::{Action, Script};
use crate::admission::{ActionSpec, AdmissionResolver};
use crate::config::{self, Config};
use crate::error::Result;
use crate::fact::{Fact, FactDefinition, ScannedFile};
use crate::inputs::{InputKey, ResolvedInputs};
use crate::pattern::PatternMatch;
use crate::registry::RegistryBuilder;
use crate::sandbox::{argv, Sandbox};
use crate::types::Stage;
use crate::utilities::ActionUtilities;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const NAME: &str = "argocdSync";
pub const APPLICATION_FACT: &str = "argocdApplication";

const API_VERSION: &str = "argoproj.io/v1alpha1";

// ---------------------------------------------------------------------------
// Fact
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(rename = "apiVersion")]
    api_version: Option<String>,
    kind: Option<String>,
    metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    name: Option<String>,
}

/// First manifest (by path) declaring an `argoproj.io/v1alpha1` Application.
/// Records `path` and the application `name`. Files that are not UTF-8, lack
/// the marker, or do not parse as YAML (e.g. Helm templates) are skipped.
fn application(files: &[ScannedFile]) -> Result<Option<Fact>> {
    for file in files {
        let Ok(content) = std::fs::read_to_string(&file.path) else {
            debug!(fact = APPLICATION_FACT, path = %file.relative, "skipping unreadable or non-UTF-8 file");
            continue;
        };
        if !content.contains(API_VERSION) {
            continue;
        }
        if let Some(fact) = application_in(file, &content) {
            return Ok(Some(fact));
        }
    }
    Ok(None)
}

fn application_in(file: &ScannedFile, content: &str) -> Option<Fact> {
    for document in serde_yaml::Deserializer::from_str(content) {
        let manifest = match Option::<Manifest>::deserialize(document) {
            Ok(Some(manifest)) => manifest,
            Ok(None) => continue,
            Err(e) => {
                debug!(fact = APPLICATION_FACT, path = %file.relative, error = %e, "skipping unparseable manifest");
                return None;
            }
        };
        let is_application = manifest.api_version.as_deref() == Some(API_VERSION)
            && manifest.kind.as_deref() == Some("Application");
        if !is_application {
            continue;
        }
        match manifest.metadata.and_then(|m| m.name).filter(|n| !n.trim().is_empty()) {
            Some(name) => return Some(Fact::at(APPLICATION_FACT, file).with_detail("name", name)),
            None => {
                warn!(fact = APPLICATION_FACT, path = %file.relative, "application has no metadata.name");
            }
        }
    }
    None
}

pub fn fact_definitions() -> Vec<FactDefinition> {
    vec![FactDefinition::new(
        APPLICATION_FACT,
        vec![PatternMatch::file(r".*\.ya?ml")],
        application,
    )]
}

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

/// Global options derived from the `argocd` config section.
fn extra_options(config: &Config) -> Vec<String> {
    let mut opts = Vec::new();
    if config.argocd.insecure {
        opts.push("--insecure".to_string());
    }
    if config.argocd.grpc_web {
        opts.push("--grpc-web".to_string());
    }
    opts
}

struct SyncScript;

#[async_trait]
impl Script for SyncScript {
    async fn run(
        &self,
        sandbox: &mut dyn Sandbox,
        inputs: &ResolvedInputs,
        utils: &ActionUtilities,
    ) -> Result<()> {
        inputs.require(InputKey::ArgoCdServer.as_str())?;
        inputs.require(InputKey::ArgoCdAuthToken.as_str())?;

        let app = utils.require_fact(APPLICATION_FACT)?;
        let path = app.detail("path").unwrap_or_default().to_string();
        let name = app.detail("name").unwrap_or_default().to_string();
        let opts = extra_options(utils.get_config());

        let mut create = argv(["argocd", "app", "create", "-f", path.as_str(), "--upsert"]);
        create.extend(opts.iter().cloned());
        sandbox.run(&create).await?;

        let mut sync = argv(["argocd", "app", "sync", name.as_str()]);
        sync.extend(opts);
        sandbox.run(&sync).await?;

        info!(action = NAME, application = %name, "application synced");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

pub fn register(builder: &mut RegistryBuilder) -> Result<()> {
    let spec = ActionSpec::new(
        NAME,
        "ArgoCD Sync",
        "Sync the ArgoCD application with the source repo.",
    );
    let inputs = [
        InputKey::ArgoCdServer.as_str(),
        InputKey::ArgoCdAuthToken.as_str(),
    ];
    for def in fact_definitions() {
        builder.register_fact(def)?;
    }
    builder.register_admission_resolver(
        AdmissionResolver::new(spec.clone())
            .requires_facts(&[APPLICATION_FACT])
            .requires_inputs(&inputs),
    )?;
    builder.register_action(
        Action::new(
            spec,
            Stage::Prerelease,
            |c| c.argocd.image.clone(),
            Arc::new(SyncScript),
        )
        .with_inputs(&inputs)
        .with_fields(&[
            config::ARGOCD_INSECURE,
            config::ARGOCD_GRPC_WEB,
            config::ARGOCD_IMAGE,
        ]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const APP: &str =
        "apiVersion: argoproj.io/v1alpha1\nkind: Application\nmetadata:\n  name: checkout-service\n";

    fn scanned(dir: &TempDir, rel: &str, content: &str) -> ScannedFile {
        let path = dir.path().join(rel);
        std::fs::write(&path, content).unwrap();
        ScannedFile {
            path: PathBuf::from(&path),
            relative: rel.to_string(),
        }
    }

    #[test]
    fn finds_application_in_multi_document_yaml() {
        let dir = TempDir::new().unwrap();
        let file = scanned(
            &dir,
            "app.yaml",
            "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: shop\n---\napiVersion: argoproj.io/v1alpha1\nkind: Application\nmetadata:\n  name: checkout-service\n",
        );
        let fact = application(&[file]).unwrap().unwrap();
        assert_eq!(fact.detail("name"), Some("checkout-service"));
        assert_eq!(fact.detail("path"), Some("app.yaml"));
    }

    #[test]
    fn files_without_marker_are_ignored() {
        let dir = TempDir::new().unwrap();
        let file = scanned(&dir, "values.yaml", "replicas: 2\n");
        assert!(application(&[file]).unwrap().is_none());
    }

    #[test]
    fn application_without_name_is_skipped() {
        let dir = TempDir::new().unwrap();
        let nameless = scanned(
            &dir,
            "a.yaml",
            "apiVersion: argoproj.io/v1alpha1\nkind: Application\nmetadata: {}\n",
        );
        assert!(application(&[nameless.clone()]).unwrap().is_none());

        let named = scanned(&dir, "b.yaml", APP);
        let fact = application(&[nameless, named]).unwrap().unwrap();
        assert_eq!(fact.detail("path"), Some("b.yaml"));
    }

    #[test]
    fn non_utf8_and_templated_files_do_not_hide_the_application() {
        let dir = TempDir::new().unwrap();
        let latin1 = dir.path().join("a-values.yaml");
        std::fs::write(&latin1, b"greeting: caf\xe9\n").unwrap();
        let latin1 = ScannedFile {
            path: latin1,
            relative: "a-values.yaml".to_string(),
        };
        let templated = scanned(
            &dir,
            "b-proj.yaml",
            "{{- if .Values.enabled }}\napiVersion: argoproj.io/v1alpha1\nkind: AppProject\nmetadata:\n  name: {{ .Values.name }}\n{{- end }}\n",
        );
        let app = scanned(&dir, "c-app.yaml", APP);
        let fact = application(&[latin1, templated, app]).unwrap().unwrap();
        assert_eq!(fact.detail("path"), Some("c-app.yaml"));
        assert_eq!(fact.detail("name"), Some("checkout-service"));
    }

    #[test]
    fn extra_options_follow_config() {
        let mut config = Config::default();
        assert!(extra_options(&config).is_empty());
        config.argocd.insecure = true;
        config.argocd.grpc_web = true;
        assert_eq!(extra_options(&config), vec!["--insecure", "--grpc-web"]);
    }
}
