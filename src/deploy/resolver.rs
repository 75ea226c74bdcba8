/*!
 * Deployment Resolver
 * Directory-backed lookup of installed deployments
 */

use super::types::{DeployError, DeployResult, Deployment};
use crate::keyfile::KeyFile;
use crate::policy::PolicyContext;
use log::debug;
use std::path::{Path, PathBuf};

/// Resolves a deployment reference (`{kind}/{name}/{arch}/{branch}`) to an
/// installed deployment. The seam exists so tests and alternate stores can
/// substitute their own lookup.
pub trait DeploymentResolver {
    fn resolve(&self, reference: &str) -> DeployResult<Deployment>;
}

/// Filesystem-backed deployment store. Each base directory holds
/// `{kind}/{name}/{arch}/{branch}/active/` with a `files/` tree and a
/// `metadata` keyfile; per-app policy overrides live at
/// `{base}/overrides/{name}`. Earlier base directories shadow later ones,
/// so the per-user store wins over the system store.
#[derive(Debug, Clone)]
pub struct DirResolver {
    bases: Vec<PathBuf>,
}

impl DirResolver {
    pub fn new(bases: Vec<PathBuf>) -> Self {
        Self { bases }
    }

    /// The conventional store locations: the per-user data directory
    /// first, then the system-wide installation.
    pub fn with_default_locations() -> Self {
        let mut bases = Vec::new();
        if let Some(data) = dirs::data_dir() {
            bases.push(data.join("cloister"));
        }
        bases.push(PathBuf::from("/var/lib/cloister"));
        Self::new(bases)
    }

    fn load_deployment(&self, base: &Path, reference: &str) -> DeployResult<Option<Deployment>> {
        let deploy_dir = base.join(reference).join("active");
        let files = deploy_dir.join("files");
        if !files.is_dir() {
            return Ok(None);
        }

        let metadata_path = deploy_dir.join("metadata");
        let metadata = if metadata_path.is_file() {
            KeyFile::load(&metadata_path)?
        } else {
            KeyFile::new()
        };

        let overrides = self.load_overrides(base, reference)?;

        debug!("resolved {} at {}", reference, deploy_dir.display());
        Ok(Some(Deployment {
            reference: reference.to_string(),
            files,
            metadata,
            overrides,
        }))
    }

    fn load_overrides(&self, base: &Path, reference: &str) -> DeployResult<PolicyContext> {
        // Overrides are keyed by name, the second ref segment.
        let name = match reference.split('/').nth(1) {
            Some(name) if !name.is_empty() => name,
            _ => return Ok(PolicyContext::new()),
        };
        let path = base.join("overrides").join(name);
        if !path.is_file() {
            return Ok(PolicyContext::new());
        }
        let keyfile = KeyFile::load(&path)?;
        Ok(PolicyContext::from_metadata(&keyfile)?)
    }
}

impl DeploymentResolver for DirResolver {
    fn resolve(&self, reference: &str) -> DeployResult<Deployment> {
        for base in &self.bases {
            if let Some(deployment) = self.load_deployment(base, reference)? {
                return Ok(deployment);
            }
        }
        Err(DeployError::NotFound(reference.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn install(base: &Path, reference: &str, metadata: &str) {
        let deploy = base.join(reference).join("active");
        fs::create_dir_all(deploy.join("files")).unwrap();
        fs::write(deploy.join("metadata"), metadata).unwrap();
    }

    #[test]
    fn test_resolve_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = DirResolver::new(vec![dir.path().to_path_buf()]);
        let err = resolver.resolve("app/org.example.App/x86_64/master").unwrap_err();
        assert!(matches!(err, DeployError::NotFound(_)));
    }

    #[test]
    fn test_resolve_reads_metadata_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let reference = "app/org.example.App/x86_64/master";
        install(
            dir.path(),
            reference,
            "[Application]\nname=org.example.App\ncommand=run-app\n",
        );
        fs::create_dir_all(dir.path().join("overrides")).unwrap();
        fs::write(
            dir.path().join("overrides/org.example.App"),
            "[Context]\nshared=network;\n",
        )
        .unwrap();

        let resolver = DirResolver::new(vec![dir.path().to_path_buf()]);
        let deployment = resolver.resolve(reference).unwrap();
        assert_eq!(
            deployment.metadata.get("Application", "command"),
            Some("run-app")
        );
        assert!(deployment
            .overrides
            .shares(crate::policy::NamespaceShare::Network));
    }

    #[test]
    fn test_earlier_base_shadows_later() {
        let user = tempfile::tempdir().unwrap();
        let system = tempfile::tempdir().unwrap();
        let reference = "runtime/org.example.Platform/x86_64/master";
        install(user.path(), reference, "[Runtime]\nname=user-copy\n");
        install(system.path(), reference, "[Runtime]\nname=system-copy\n");

        let resolver = DirResolver::new(vec![
            user.path().to_path_buf(),
            system.path().to_path_buf(),
        ]);
        let deployment = resolver.resolve(reference).unwrap();
        assert_eq!(deployment.metadata.get("Runtime", "name"), Some("user-copy"));
    }

    #[test]
    fn test_missing_metadata_yields_empty_keyfile() {
        let dir = tempfile::tempdir().unwrap();
        let reference = "runtime/org.example.Platform/x86_64/master";
        fs::create_dir_all(dir.path().join(reference).join("active/files")).unwrap();

        let resolver = DirResolver::new(vec![dir.path().to_path_buf()]);
        let deployment = resolver.resolve(reference).unwrap();
        assert!(!deployment.metadata.has_section("Runtime"));
    }
}
