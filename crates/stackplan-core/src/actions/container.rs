//! `containerPublish`: build the repository's container image with buildah
//! and push it to a registry.

use crate::action::{Action, Script};
use crate::admission::{ActionSpec, AdmissionResolver};
use crate::config::{self, Config};
use crate::error::Result;
use crate::fact::{present, Fact, FactDefinition, ScannedFile};
use crate::inputs::{InputKey, ResolvedInputs};
use crate::pattern::PatternMatch;
use crate::registry::RegistryBuilder;
use crate::sandbox::{argv, Sandbox};
use crate::types::Stage;
use crate::utilities::ActionUtilities;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub const NAME: &str = "containerPublish";
pub const CONTAINERFILE_FACT: &str = "containerfile";
const IMAGE: &str = "quay.io/buildah/stable";

/// Credentials are read from the environment inside the sandbox so the
/// password never appears in an argv.
const LOGIN: &str = r#"printf '%s' "$CONTAINER_REGISTRY_PASSWORD" | buildah login --username "$CONTAINER_REGISTRY_USERNAME" --password-stdin "$CONTAINER_REGISTRY""#;

fn containerfile(files: &[ScannedFile]) -> Result<Option<Fact>> {
    Ok(present(CONTAINERFILE_FACT, files))
}

pub fn fact_definitions() -> Vec<FactDefinition> {
    vec![FactDefinition::new(
        CONTAINERFILE_FACT,
        vec![PatternMatch::path("Dockerfile|Containerfile")],
        containerfile,
    )]
}

/// `<registry>/<container.name>:<container.tag>`.
fn image_reference(registry: &str, config: &Config) -> String {
    format!(
        "{}/{}:{}",
        registry.trim_end_matches('/'),
        config.container.name,
        config.container.tag
    )
}

struct PublishScript;

#[async_trait]
impl Script for PublishScript {
    async fn run(
        &self,
        sandbox: &mut dyn Sandbox,
        inputs: &ResolvedInputs,
        utils: &ActionUtilities,
    ) -> Result<()> {
        let registry = inputs
            .require(InputKey::ContainerRegistry.as_str())?
            .expose()
            .to_string();
        inputs.require(InputKey::ContainerRegistryUsername.as_str())?;
        inputs.require(InputKey::ContainerRegistryPassword.as_str())?;

        let file = utils
            .require_fact(CONTAINERFILE_FACT)?
            .detail("path")
            .unwrap_or("Dockerfile")
            .to_string();
        let reference = image_reference(&registry, utils.get_config());

        sandbox.run(&argv(["sh", "-c", LOGIN])).await?;
        sandbox
            .run(&argv([
                "buildah",
                "--storage-driver",
                "vfs",
                "bud",
                "--isolation",
                "chroot",
                "-f",
                file.as_str(),
                "-t",
                reference.as_str(),
                ".",
            ]))
            .await?;
        sandbox
            .run(&argv([
                "buildah",
                "--storage-driver",
                "vfs",
                "push",
                reference.as_str(),
            ]))
            .await?;
        info!(action = NAME, image = %reference, "image published");
        Ok(())
    }
}

pub fn register(builder: &mut RegistryBuilder) -> Result<()> {
    for def in fact_definitions() {
        builder.register_fact(def)?;
    }
    let inputs = [
        InputKey::ContainerRegistry.as_str(),
        InputKey::ContainerRegistryUsername.as_str(),
        InputKey::ContainerRegistryPassword.as_str(),
    ];
    let spec = ActionSpec::new(
        NAME,
        "Container Publish",
        "Build the container image and push it to the registry.",
    );
    builder.register_admission_resolver(
        AdmissionResolver::new(spec.clone())
            .requires_facts(&[CONTAINERFILE_FACT])
            .requires_inputs(&inputs),
    )?;
    builder.register_action(
        Action::new(spec, Stage::Release, |_| IMAGE.to_string(), Arc::new(PublishScript))
            .with_inputs(&inputs)
            .with_fields(&[config::CONTAINER_NAME, config::CONTAINER_TAG]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_joins_registry_name_and_tag() {
        let mut config = Config::default();
        config.container.name = "checkout".into();
        config.container.tag = "1.4.0".into();
        assert_eq!(
            image_reference("registry.example.com/", &config),
            "registry.example.com/checkout:1.4.0"
        );
    }

    #[test]
    fn login_keeps_password_out_of_argv() {
        assert!(LOGIN.contains("$CONTAINER_REGISTRY_PASSWORD"));
        assert!(LOGIN.contains("--password-stdin"));
    }
}
