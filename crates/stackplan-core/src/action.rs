//! Runtime action definitions and the script contract.

use crate::admission::ActionSpec;
use crate::config::{Config, FieldSpec};
use crate::error::Result;
use crate::inputs::ResolvedInputs;
use crate::sandbox::Sandbox;
use crate::types::Stage;
use crate::utilities::ActionUtilities;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// The body of an action. Runs against an already provisioned sandbox with
/// every declared input bound into its environment.
#[async_trait]
pub trait Script: Send + Sync {
    async fn run(
        &self,
        sandbox: &mut dyn Sandbox,
        inputs: &ResolvedInputs,
        utils: &ActionUtilities,
    ) -> Result<()>;
}

/// Derives the sandbox image from the active configuration.
pub type ImageFn = fn(&Config) -> String;

#[derive(Clone)]
pub struct Action {
    pub spec: ActionSpec,
    pub stage: Stage,
    pub image: ImageFn,
    pub inputs: Vec<String>,
    /// Configuration fields this action reads; surfaced in plan documents.
    pub fields: Vec<FieldSpec>,
    pub script: Arc<dyn Script>,
}

impl Action {
    pub fn new(spec: ActionSpec, stage: Stage, image: ImageFn, script: Arc<dyn Script>) -> Self {
        Self {
            spec,
            stage,
            image,
            inputs: Vec::new(),
            fields: Vec::new(),
            script,
        }
    }

    pub fn with_inputs(mut self, inputs: &[&str]) -> Self {
        self.inputs.extend(inputs.iter().map(|i| i.to_string()));
        self
    }

    pub fn with_fields(mut self, fields: &[FieldSpec]) -> Self {
        self.fields.extend_from_slice(fields);
        self
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn image_for(&self, config: &Config) -> String {
        (self.image)(config)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.spec.name)
            .field("stage", &self.stage)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl Script for Noop {
        async fn run(
            &self,
            _sandbox: &mut dyn Sandbox,
            _inputs: &ResolvedInputs,
            _utils: &ActionUtilities,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn image_is_derived_from_config() {
        let action = Action::new(
            ActionSpec::new("golangTest", "Go Test", ""),
            Stage::Test,
            |c| format!("golang:{}", c.golang.version),
            Arc::new(Noop),
        );
        let mut config = Config::default();
        config.golang.version = "1.21".into();
        assert_eq!(action.image_for(&config), "golang:1.21");
        assert!(format!("{action:?}").contains("golangTest"));
    }
}
