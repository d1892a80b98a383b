/// Execution engine: the single entry point callers use
///
/// Launch, then classify. Holds only the immutable profile and the launcher,
/// so one instance can be shared by any number of threads.
use crate::config::loader::SnekboxConfig;
use crate::config::profile::ResourceLimitProfile;
use crate::config::types::{Classification, ExecutionResult, Result};
use crate::exec::launcher::NsJail;
use crate::protocol::{SnekRequest, SnekResponse};
use crate::verdict::classifier::{ExitClassifier, UNKNOWN_ERROR_MESSAGE};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct Snekbox {
    profile: Arc<ResourceLimitProfile>,
    nsjail: NsJail,
}

impl Snekbox {
    /// Validate the profile and build the engine.
    pub fn new(config: SnekboxConfig) -> Result<Self> {
        let profile = config.profile.validated()?;
        let nsjail = NsJail::new(config.nsjail_binary, config.python_binary)?;
        Ok(Self {
            profile: Arc::new(profile),
            nsjail,
        })
    }

    pub fn profile(&self) -> &ResourceLimitProfile {
        &self.profile
    }

    pub fn nsjail(&self) -> &NsJail {
        &self.nsjail
    }

    /// Run `code` once in a fresh sandbox. Never fails: launch problems are
    /// reported as an unknown error without a return code.
    pub fn execute(&self, code: &str) -> ExecutionResult {
        match self.nsjail.launch(&self.profile, code) {
            Ok(raw) => ExitClassifier::classify(&raw),
            Err(e) => {
                log::error!("Failed to launch sandbox: {}", e);
                ExecutionResult::new(None, Classification::UnknownError, UNKNOWN_ERROR_MESSAGE)
            }
        }
    }

    /// Execute a validated request and key the result by its id.
    pub fn handle(&self, request: &SnekRequest) -> SnekResponse {
        log::info!("Received request {}", request.id);
        let result = self.execute(request.payload());
        log::info!(
            "Finished request {}: {} (returncode {:?})",
            request.id,
            result.classification,
            result.returncode
        );
        SnekResponse::new(request.id.clone(), result)
    }
}
