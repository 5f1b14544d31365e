//! Import of exported functions into the destination account

use crate::reconcile::{ensure_role, AccountMapping, RoleSettings};
use bytes::Bytes;
use lambdaport_core::manifest::MANIFEST_EXTENSION;
use lambdaport_core::summary::{is_summary_file, IMPORT_SUMMARY_FILE};
use lambdaport_core::{FunctionManifest, MigrateError, OutcomeAction, Result, RunSummary};
use lambdaport_iam::IdentityApi;
use lambdaport_lambda::{
    wait_for_function, ComputeApi, CreateFunctionRequest, UpdateConfigurationRequest, WaitConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub folder: PathBuf,
    pub wait: WaitConfig,
    pub role: RoleSettings,
}

/// Manifest files in `folder`, sorted by file name.
///
/// Summary files are skipped. An unreadable folder is an error.
pub fn discover_manifests(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut manifests = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_manifest = path
            .extension()
            .is_some_and(|ext| ext == MANIFEST_EXTENSION);
        let is_summary = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_summary_file);
        if is_manifest && !is_summary {
            manifests.push(path);
        }
    }
    manifests.sort();
    Ok(manifests)
}

/// Recreates exported functions and their roles in the destination account.
///
/// Only one importer may target a destination account at a time; nothing
/// here coordinates concurrent runs.
pub struct Importer {
    compute: Arc<dyn ComputeApi>,
    identity: Arc<dyn IdentityApi>,
    destination_account: String,
    options: ImportOptions,
}

impl Importer {
    pub fn new(
        compute: Arc<dyn ComputeApi>,
        identity: Arc<dyn IdentityApi>,
        destination_account: impl Into<String>,
        options: ImportOptions,
    ) -> Self {
        Self {
            compute,
            identity,
            destination_account: destination_account.into(),
            options,
        }
    }

    /// Import every manifest in the folder, then write the import summary
    pub async fn run(&self) -> Result<RunSummary> {
        let manifests = discover_manifests(&self.options.folder)?;
        warn!(
            destination_account = %self.destination_account,
            "No locking is performed: run only one import per destination account at a time"
        );
        info!(
            folder = %self.options.folder.display(),
            count = manifests.len(),
            "Importing functions"
        );

        let mut summary = RunSummary::new();
        for path in manifests {
            let label = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();

            let manifest = match FunctionManifest::load(&path) {
                Ok(manifest) => manifest,
                Err(e) => {
                    let e = match e {
                        MigrateError::Io(_) | MigrateError::Json(_) => {
                            MigrateError::malformed(&path, e.to_string())
                        }
                        other => other,
                    };
                    error!(function_name = %label, kind = %e.kind(), error = %e, "Import failed");
                    summary.add_failure(label, &e);
                    continue;
                }
            };

            let name = manifest.function_name.clone();
            match self.import_function(&manifest).await {
                Ok(action) => {
                    info!(function_name = %name, %action, "Imported function");
                    summary.add_success(name, action);
                }
                Err(e) => {
                    error!(function_name = %name, kind = %e.kind(), error = %e, "Import failed");
                    summary.add_failure(name, &e);
                }
            }
        }

        summary.save(&self.options.folder.join(IMPORT_SUMMARY_FILE))?;
        info!(%summary, "Import finished");
        Ok(summary)
    }

    /// Create or update one function from its manifest
    pub async fn import_function(&self, manifest: &FunctionManifest) -> Result<OutcomeAction> {
        let name = manifest.function_name.as_str();

        let package_path = manifest.package_path(&self.options.folder);
        if !package_path.is_file() {
            return Err(MigrateError::MissingArtifact(package_path));
        }
        let code = Bytes::from(std::fs::read(&package_path)?);

        let accounts = AccountMapping {
            source: manifest.source_account(),
            destination: self.destination_account.clone(),
        };
        let role_arn = ensure_role(
            self.identity.as_ref(),
            manifest,
            &accounts,
            &self.options.role,
        )
        .await?;

        let config = &manifest.configuration;
        let layers: Vec<String> = config
            .layer_arns()
            .iter()
            .map(|arn| accounts.rewrite_arn(arn))
            .collect();
        let runtime = config.runtime.clone().unwrap_or_default();
        let handler = config.handler.clone().unwrap_or_default();

        match self.compute.get_function(name).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                info!(function_name = %name, role = %role_arn, "Creating function");
                self.compute
                    .create_function(&CreateFunctionRequest {
                        function_name: name.to_string(),
                        runtime,
                        role: role_arn,
                        handler,
                        code,
                        description: config.description.clone(),
                        timeout: config.timeout,
                        memory_size: config.memory_size,
                        environment: config.variables(),
                        layers,
                        package_type: config.package_type.clone(),
                        architectures: config.architectures.clone(),
                        publish: true,
                    })
                    .await?;
                return Ok(OutcomeAction::Created);
            }
            Err(e) => return Err(e),
        }

        info!(function_name = %name, "Updating function code");
        let compute = self.compute.as_ref();
        wait_for_function(compute, name, &self.options.wait).await?;
        compute.update_function_code(name, &code).await?;
        wait_for_function(compute, name, &self.options.wait).await?;

        info!(function_name = %name, "Updating function configuration");
        compute
            .update_function_configuration(&UpdateConfigurationRequest {
                function_name: name.to_string(),
                role: role_arn,
                handler,
                description: config.description.clone(),
                timeout: config.timeout,
                memory_size: config.memory_size,
                environment: config.variables(),
                layers,
                runtime,
            })
            .await?;
        wait_for_function(compute, name, &self.options.wait).await?;

        Ok(OutcomeAction::Updated)
    }
}
