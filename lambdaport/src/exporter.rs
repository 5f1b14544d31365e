//! Export of functions, their code and their roles to local storage

use crate::download::{verify_package, PackageFetcher};
use chrono::Utc;
use lambdaport_core::manifest::PACKAGE_TYPE_ZIP;
use lambdaport_core::summary::EXPORT_SUMMARY_FILE;
use lambdaport_core::{FunctionManifest, MigrateError, OutcomeAction, Result, RunSummary};
use lambdaport_iam::policy::role_name_from_arn;
use lambdaport_iam::IdentityApi;
use lambdaport_lambda::{ComputeApi, FunctionDetails};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Declared list of functions to export (`{"lambdas": [...]}`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceList {
    #[serde(default)]
    pub lambdas: Vec<String>,
}

impl ResourceList {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Names in first-seen order with duplicates dropped
pub fn dedup_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    names
        .into_iter()
        .map(Into::into)
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub folder: PathBuf,
    /// Also record the execution role and its policies
    pub capture_roles: bool,
}

/// Reads functions from the source account and writes manifests and packages
pub struct Exporter {
    compute: Arc<dyn ComputeApi>,
    identity: Arc<dyn IdentityApi>,
    fetcher: Arc<dyn PackageFetcher>,
    options: ExportOptions,
}

impl Exporter {
    pub fn new(
        compute: Arc<dyn ComputeApi>,
        identity: Arc<dyn IdentityApi>,
        fetcher: Arc<dyn PackageFetcher>,
        options: ExportOptions,
    ) -> Self {
        Self {
            compute,
            identity,
            fetcher,
            options,
        }
    }

    /// Export every name, recording one outcome each, then write the summary.
    ///
    /// Names may be function names or ARNs. A function reached through more
    /// than one name is exported once. Only an unusable export folder fails
    /// the whole run.
    pub async fn run(&self, names: &[String]) -> Result<RunSummary> {
        std::fs::create_dir_all(&self.options.folder)?;

        let mut summary = RunSummary::new();
        let mut exported = HashSet::new();
        for name in dedup_names(names.iter().cloned()) {
            info!(function_name = %name, "Exporting function");
            let details = match self.compute.get_function(&name).await {
                Ok(details) => details,
                Err(e) => {
                    error!(function_name = %name, kind = %e.kind(), error = %e, "Export failed");
                    summary.add_failure(name, &e);
                    continue;
                }
            };

            let resolved = details.configuration.function_name.clone();
            if !exported.insert(resolved.clone()) {
                debug!(function_name = %resolved, requested = %name, "Already exported");
                continue;
            }

            match self.export_details(details).await {
                Ok(_) => {
                    info!(function_name = %resolved, "Exported function");
                    summary.add_success(resolved, OutcomeAction::Exported);
                }
                Err(e) => {
                    error!(function_name = %resolved, kind = %e.kind(), error = %e, "Export failed");
                    summary.add_failure(resolved, &e);
                }
            }
        }

        summary.save(&self.options.folder.join(EXPORT_SUMMARY_FILE))?;
        info!(%summary, "Export finished");
        Ok(summary)
    }

    /// Export one function and return the manifest that was written
    pub async fn export_function(&self, name: &str) -> Result<FunctionManifest> {
        let details = self.compute.get_function(name).await?;
        self.export_details(details).await
    }

    async fn export_details(&self, details: FunctionDetails) -> Result<FunctionManifest> {
        let configuration = details.configuration;
        let name = configuration.function_name.clone();

        if configuration.package_type != PACKAGE_TYPE_ZIP {
            return Err(MigrateError::Unsupported(format!(
                "{name} is packaged as {}, only {PACKAGE_TYPE_ZIP} packages can be exported",
                configuration.package_type
            )));
        }
        let location = details.code.location.ok_or_else(|| {
            MigrateError::Unsupported(format!("{name} has no downloadable code location"))
        })?;

        let code = self.fetcher.fetch(&location).await?;
        if let Some(expected) = configuration.code_sha256.as_deref() {
            verify_package(&code, expected)?;
        }

        let mut manifest = FunctionManifest::new(configuration);
        manifest.exported_at = Some(Utc::now());
        if self.options.capture_roles {
            self.capture_role(&mut manifest).await?;
        }

        // Package first so a manifest on disk always has its package
        std::fs::write(manifest.package_path(&self.options.folder), &code)?;
        std::fs::write(
            self.options
                .folder
                .join(FunctionManifest::manifest_file_name(&manifest.function_name)),
            manifest.to_json_pretty()?,
        )?;

        Ok(manifest)
    }

    async fn capture_role(&self, manifest: &mut FunctionManifest) -> Result<()> {
        let Some(role_name) = role_name_from_arn(&manifest.configuration.role) else {
            warn!(
                function_name = %manifest.function_name,
                role = %manifest.configuration.role,
                "Role is not an IAM role ARN, skipping role capture"
            );
            return Ok(());
        };

        let role = self.identity.get_role(&role_name).await?;
        let attached = self.identity.list_attached_policies(&role_name).await?;

        let mut inline = std::collections::BTreeMap::new();
        for policy_name in self.identity.list_inline_policy_names(&role_name).await? {
            let document = self
                .identity
                .get_inline_policy(&role_name, &policy_name)
                .await?;
            inline.insert(policy_name, document);
        }

        info!(
            function_name = %manifest.function_name,
            role_name = %role_name,
            attached = attached.len(),
            inline = inline.len(),
            "Captured role"
        );

        manifest.role = Some(role);
        manifest.attached_policies = attached;
        manifest.inline_policies = inline;
        Ok(())
    }
}
