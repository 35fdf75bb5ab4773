//! Task settings for a provisioning run.
//!
//! [`ProvisionSettings`] is the JSON task input handed to the orchestrator
//! by the surrounding pipeline. Every field has a default so partial inputs
//! deserialize; [`ProvisionRequest::from_settings`] validates the settings
//! and loads the files they reference.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::deploy::{
    ProvisionRequest, RetryPolicy, DEFAULT_DEPLOYMENT_PREFIX, DEFAULT_LAB_NAME_PARAMETER,
    DEFAULT_RESOURCE_NAME_PARAMETER,
};
use crate::errors::{ProvisionError, ProvisionResult};
use crate::observability::LoggingConfig;
use crate::parameters::{load_parameters_file, load_template};
use crate::wait::WaitPolicy;

/// Settings for one provisioning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionSettings {
    /// Identifier of the lab that will own the virtual machine.
    #[serde(default)]
    pub lab_id: String,
    /// Name of the virtual machine to create.
    #[serde(default)]
    pub vm_name: String,
    /// Path to the deployment template.
    #[serde(default)]
    pub template_file: Option<PathBuf>,
    /// Path to the parameters file.
    #[serde(default)]
    pub parameters_file: Option<PathBuf>,
    /// Override string applied on top of the parameters file.
    #[serde(default)]
    pub parameter_overrides: String,
    /// Retry failed attempts.
    #[serde(default)]
    pub retry_on_failure: bool,
    /// Number of retries after the first attempt.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Delete failed deployments before retrying.
    #[serde(default = "default_true")]
    pub delete_deployment: bool,
    /// Delete failed virtual machines before retrying.
    #[serde(default = "default_true")]
    pub delete_lab_vm: bool,
    /// Append the attempt number to the VM name on retry.
    #[serde(default)]
    pub append_retry_number_to_vm_name: bool,
    /// Fail when any artifact fails to apply.
    #[serde(default)]
    pub fail_on_artifact_error: bool,
    /// Minutes to wait for artifacts; zero disables waiting.
    #[serde(default)]
    pub wait_minutes: i64,
    /// Template parameter that receives the lab name.
    #[serde(default = "default_lab_name_parameter")]
    pub lab_name_parameter: String,
    /// Template parameter that receives the VM name.
    #[serde(default = "default_vm_name_parameter")]
    pub vm_name_parameter: String,
    /// Prefix for generated deployment names.
    #[serde(default = "default_deployment_prefix")]
    pub deployment_prefix: String,
    /// Logging setup.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_retry_count() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_lab_name_parameter() -> String {
    DEFAULT_LAB_NAME_PARAMETER.to_string()
}

fn default_vm_name_parameter() -> String {
    DEFAULT_RESOURCE_NAME_PARAMETER.to_string()
}

fn default_deployment_prefix() -> String {
    DEFAULT_DEPLOYMENT_PREFIX.to_string()
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            lab_id: String::new(),
            vm_name: String::new(),
            template_file: None,
            parameters_file: None,
            parameter_overrides: String::new(),
            retry_on_failure: false,
            retry_count: default_retry_count(),
            delete_deployment: true,
            delete_lab_vm: true,
            append_retry_number_to_vm_name: false,
            fail_on_artifact_error: false,
            wait_minutes: 0,
            lab_name_parameter: default_lab_name_parameter(),
            vm_name_parameter: default_vm_name_parameter(),
            deployment_prefix: default_deployment_prefix(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ProvisionSettings {
    /// Creates settings for `vm_name` in `lab_id` using `template_file`.
    #[must_use]
    pub fn new(
        lab_id: impl Into<String>,
        vm_name: impl Into<String>,
        template_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            lab_id: lab_id.into(),
            vm_name: vm_name.into(),
            template_file: Some(template_file.into()),
            ..Self::default()
        }
    }

    /// Parses settings from a JSON document.
    pub fn from_json_str(json: &str) -> ProvisionResult<Self> {
        serde_json::from_str(json).map_err(|e| ProvisionError::Config(e.to_string()))
    }

    /// Reads settings from a JSON file.
    pub async fn from_file(path: &Path) -> ProvisionResult<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProvisionError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&contents)
    }

    /// Sets the parameters file.
    #[must_use]
    pub fn with_parameters_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.parameters_file = Some(path.into());
        self
    }

    /// Sets the override string.
    #[must_use]
    pub fn with_overrides(mut self, overrides: impl Into<String>) -> Self {
        self.parameter_overrides = overrides.into();
        self
    }

    /// Enables retries.
    #[must_use]
    pub fn with_retries(mut self, retry_count: u32) -> Self {
        self.retry_on_failure = true;
        self.retry_count = retry_count;
        self
    }

    /// Sets the artifact wait window.
    #[must_use]
    pub fn with_wait_minutes(mut self, minutes: i64) -> Self {
        self.wait_minutes = minutes;
        self
    }

    /// Sets whether artifact failures fail the run.
    #[must_use]
    pub fn with_fail_on_artifact_error(mut self, enabled: bool) -> Self {
        self.fail_on_artifact_error = enabled;
        self
    }

    /// The retry policy these settings describe.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_enabled(self.retry_on_failure)
            .with_retry_count(self.retry_count)
            .with_deployment_cleanup(self.delete_deployment)
            .with_resource_cleanup(self.delete_lab_vm)
            .with_name_suffix(self.append_retry_number_to_vm_name)
    }

    /// The wait policy these settings describe.
    #[must_use]
    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy::minutes(self.wait_minutes)
    }

    /// Checks that required settings are present.
    pub fn validate(&self) -> ProvisionResult<()> {
        let required = [
            ("labId", self.lab_id.as_str()),
            ("vmName", self.vm_name.as_str()),
            ("labNameParameter", self.lab_name_parameter.as_str()),
            ("vmNameParameter", self.vm_name_parameter.as_str()),
        ];
        if let Some((name, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(ProvisionError::Config(format!("'{name}' is required")));
        }
        if self.template_file.is_none() {
            return Err(ProvisionError::Config("'templateFile' is required".to_string()));
        }
        Ok(())
    }
}

impl ProvisionRequest {
    /// Builds a request from task settings, loading the template and
    /// parameters files.
    ///
    /// The template is required; a missing or broken parameters file yields
    /// an empty base parameter set.
    pub async fn from_settings(settings: &ProvisionSettings) -> ProvisionResult<Self> {
        settings.validate()?;
        let template_file = settings
            .template_file
            .as_deref()
            .ok_or_else(|| ProvisionError::Config("'templateFile' is required".to_string()))?;

        let template = load_template(template_file).await?;
        let base_parameters = load_parameters_file(settings.parameters_file.as_deref()).await;

        Ok(Self::new(template, settings.vm_name.clone(), settings.lab_id.clone())
            .with_parameters(base_parameters)
            .with_overrides(settings.parameter_overrides.clone())
            .with_retry(settings.retry_policy())
            .with_wait(settings.wait_policy())
            .with_fail_on_artifact_error(settings.fail_on_artifact_error)
            .with_forced_parameters(
                settings.lab_name_parameter.clone(),
                settings.vm_name_parameter.clone(),
            )
            .with_deployment_prefix(settings.deployment_prefix.clone()))
    }
}
