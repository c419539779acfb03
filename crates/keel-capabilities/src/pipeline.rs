//! The permission pipeline in front of every restricted method.
//!
//! Each invocation runs, in order:
//! 1. target lookup and grant lookup for the calling subject
//! 2. parameter parsing
//! 3. the unlock precondition (optionally prompting the user)
//! 4. the caveat check against the grant
//! 5. the method implementation
//!
//! Grants are read-only inputs, so invocations share nothing mutable.

use std::collections::HashMap;
use std::sync::Arc;

use keel_core::PluginId;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CapabilityError, CapabilityResult};
use crate::hooks::MethodHooks;
use crate::methods::{self, DerivationRequest, RestrictedMethod};
use crate::store::GrantStore;
use crate::target::RestrictedTarget;

/// Per-call options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationOptions {
    /// Ask the user to unlock if the application is locked.
    pub prompt_unlock: bool,
}

impl Default for InvocationOptions {
    fn default() -> Self {
        Self {
            prompt_unlock: true,
        }
    }
}

/// Gatekeeper for restricted methods.
pub struct PermissionPipeline {
    grants: Arc<GrantStore>,
    hooks: Arc<dyn MethodHooks>,
    methods: HashMap<RestrictedTarget, Arc<dyn RestrictedMethod>>,
}

impl PermissionPipeline {
    /// Build the pipeline and every method implementation over `hooks`.
    #[must_use]
    pub fn new(grants: Arc<GrantStore>, hooks: Arc<dyn MethodHooks>) -> Self {
        let methods = RestrictedTarget::ALL
            .into_iter()
            .map(|target| (target, methods::build(target, Arc::clone(&hooks))))
            .collect();
        Self {
            grants,
            hooks,
            methods,
        }
    }

    /// The grant store consulted on every call.
    #[must_use]
    pub fn grants(&self) -> &Arc<GrantStore> {
        &self.grants
    }

    /// Invoke `method` on behalf of `subject`.
    ///
    /// # Errors
    ///
    /// - [`CapabilityError::UnknownTarget`] if `method` is not restricted
    /// - [`CapabilityError::NotGranted`] if `subject` holds no grant
    /// - [`CapabilityError::InvalidParams`] / [`CapabilityError::UnsupportedCurve`]
    ///   for malformed params
    /// - [`CapabilityError::Unlock`] if the unlock hook fails
    /// - [`CapabilityError::PermissionDenied`] if the request is outside the
    ///   grant's caveats
    /// - any error of the method implementation
    pub async fn invoke(
        &self,
        subject: &PluginId,
        method: &str,
        params: Option<&Value>,
        options: InvocationOptions,
    ) -> CapabilityResult<Value> {
        let target: RestrictedTarget = method.parse()?;
        let grant = self
            .grants
            .get(subject, target)
            .ok_or_else(|| CapabilityError::NotGranted {
                subject: subject.clone(),
                target: target.to_string(),
            })?;
        let implementation = self
            .methods
            .get(&target)
            .ok_or_else(|| CapabilityError::UnknownTarget(method.to_string()))?;

        let request = DerivationRequest::from_params(params)?;

        self.hooks
            .get_unlock_promise(options.prompt_unlock)
            .await
            .map_err(|e| CapabilityError::Unlock(e.to_string()))?;

        if let Err(err) = grant.authorize(&request.entity) {
            warn!(
                subject = %subject,
                target = %target,
                path = %request.entity.path,
                curve = %request.entity.curve,
                "Restricted call outside granted caveats"
            );
            return Err(err);
        }

        debug!(subject = %subject, target = %target, "Invoking restricted method");
        implementation.invoke(&request).await
    }
}

impl std::fmt::Debug for PermissionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionPipeline")
            .field("grants", &self.grants.len())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
