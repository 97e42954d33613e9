//! Single entry point driving one policy resource through its lifecycle.
//!
//! `validate` must succeed before `check_state`, `enforce_state` or
//! `populate_output`; `cleanup` may be called at any point and more than
//! once, and runs on drop as well.

use crate::context::AgentContext;
use crate::descriptor::PolicyResource;
use crate::error::{Error, Result};
use crate::resource::{Handler, ManagedResources, Reconcile, ResourceCompliance};
use std::sync::Arc;

/// One policy resource and its validated state.
pub struct OsPolicyResource {
    ctx: Arc<AgentContext>,
    id: String,
    handler: Option<Handler>,
    managed: Option<ManagedResources>,
    in_desired_state: bool,
    validate_called: bool,
    cleaned_up: bool,
}

impl OsPolicyResource {
    /// Resource bound to a shared context.
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        Self {
            ctx,
            id: String::new(),
            handler: None,
            managed: None,
            in_desired_state: false,
            validate_called: false,
            cleaned_up: false,
        }
    }

    /// Select the variant for `descriptor` and validate it.
    ///
    /// The variant is kept even when validation fails so that `cleanup`
    /// still releases whatever it created.
    pub fn validate(&mut self, descriptor: &PolicyResource) -> Result<()> {
        if self.validate_called {
            return Err(Error::AlreadyValidated {
                id: self.id.clone(),
            });
        }
        self.validate_called = true;
        self.id = descriptor.id.clone();

        let handler = self.handler.insert(Handler::new(descriptor.kind()?));
        log::debug!("Validating {} resource {:?}", handler.resource_type(), self.id);
        let managed = handler.validate(&self.ctx)?;
        self.managed = Some(managed);
        Ok(())
    }

    fn validated(&mut self, operation: &'static str) -> Result<&mut Handler> {
        match (&self.managed, &mut self.handler) {
            (Some(_), Some(handler)) => Ok(handler),
            _ => Err(Error::NotValidated { operation }),
        }
    }

    /// Whether the host matches the resource; also recorded for
    /// [`in_desired_state`](Self::in_desired_state).
    pub fn check_state(&mut self) -> Result<bool> {
        let ctx = Arc::clone(&self.ctx);
        let in_desired_state = self.validated("check_state")?.check_state(&ctx)?;
        self.in_desired_state = in_desired_state;
        Ok(in_desired_state)
    }

    /// Bring the host to the desired state.
    pub fn enforce_state(&mut self) -> Result<()> {
        let ctx = Arc::clone(&self.ctx);
        let id = self.id.clone();
        let handler = self.validated("enforce_state")?;
        log::info!("Enforcing {} resource {:?}", handler.resource_type(), id);
        let in_desired_state = handler.enforce_state(&ctx)?;
        self.in_desired_state = in_desired_state;
        Ok(())
    }

    /// Fill resource-specific compliance details.
    pub fn populate_output(&mut self, compliance: &mut ResourceCompliance) -> Result<()> {
        self.validated("populate_output")?.populate_output(compliance);
        Ok(())
    }

    /// Release temporary files and persist the package-info cache.
    ///
    /// Idempotent; the first error is returned but every step still runs.
    pub fn cleanup(&mut self) -> Result<()> {
        if self.cleaned_up {
            return Ok(());
        }
        self.cleaned_up = true;

        let released = match &mut self.handler {
            Some(handler) => handler.cleanup(),
            None => Ok(()),
        };
        let saved = self.ctx.package_info.save();
        released.and(saved)
    }

    /// Resource id from the descriptor.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Resource type, once a variant has been selected.
    pub fn resource_type(&self) -> Option<&'static str> {
        self.handler.as_ref().map(Handler::resource_type)
    }

    /// What the resource manages; `None` until validation succeeds.
    pub fn managed_resources(&self) -> Option<&ManagedResources> {
        self.managed.as_ref()
    }

    /// Result of the last check or enforcement.
    pub fn in_desired_state(&self) -> bool {
        self.in_desired_state
    }
}

impl Drop for OsPolicyResource {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            log::warn!("Cleanup of resource {:?} failed: {}", self.id, e);
        }
    }
}

impl std::fmt::Debug for OsPolicyResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsPolicyResource")
            .field("id", &self.id)
            .field("resource_type", &self.resource_type())
            .field("managed", &self.managed)
            .field("in_desired_state", &self.in_desired_state)
            .finish_non_exhaustive()
    }
}
