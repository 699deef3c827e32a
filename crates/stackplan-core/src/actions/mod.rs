//! Built-in action catalog.

pub mod argocd;
pub mod container;
pub mod golang;
pub mod npm;
pub mod python;
pub mod sonar;
pub mod trivy;

use crate::error::Result;
use crate::registry::{Registry, RegistryBuilder};

/// Register every built-in action, its facts and its admission resolver.
pub fn register_all(builder: &mut RegistryBuilder) -> Result<()> {
    npm::register(builder)?;
    python::register(builder)?;
    golang::register(builder)?;
    trivy::register(builder)?;
    sonar::register(builder)?;
    argocd::register(builder)?;
    container::register(builder)?;
    Ok(())
}

/// Registry holding the full built-in catalog.
pub fn default_registry() -> Result<Registry> {
    let mut builder = RegistryBuilder::new();
    register_all(&mut builder)?;
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::is_secret_input;
    use crate::types::Stage;

    #[test]
    fn catalog_builds() {
        let registry = default_registry().unwrap();
        let names: Vec<_> = registry.actions().map(|e| e.action.name()).collect();
        assert_eq!(
            names,
            vec![
                "npmBuild",
                "npmTest",
                "pytestRun",
                "golangTest",
                "trivyFilesystemScan",
                "sonarScan",
                "argocdSync",
                "containerPublish",
            ]
        );
    }

    #[test]
    fn argocd_entry_matches_catalog() {
        let registry = default_registry().unwrap();
        let entry = registry.get(argocd::NAME).unwrap();
        assert_eq!(entry.action.stage, Stage::Prerelease);
        assert_eq!(
            entry.resolver.required_inputs,
            vec!["ARGOCD_SERVER", "ARGOCD_AUTH_TOKEN"]
        );
        assert_eq!(
            entry.action.image_for(&crate::config::Config::default()),
            "argoproj/argocd"
        );
    }

    #[test]
    fn registering_twice_is_fatal() {
        let mut builder = RegistryBuilder::new();
        register_all(&mut builder).unwrap();
        assert!(register_all(&mut builder).is_err());
    }

    #[test]
    fn every_secret_input_is_classified() {
        let registry = default_registry().unwrap();
        let secrets: Vec<_> = registry
            .actions()
            .flat_map(|e| e.action.inputs.iter())
            .filter(|i| is_secret_input(i))
            .cloned()
            .collect();
        assert_eq!(
            secrets,
            vec!["SONAR_TOKEN", "ARGOCD_AUTH_TOKEN", "CONTAINER_REGISTRY_PASSWORD"]
        );
    }
}
