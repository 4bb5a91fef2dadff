//! Authorization decision explanations for admin-tenant operators.

use invoicer_auth::{AccessRequest, Actor, AuthorizationExplanation, explain, require_admin_tenant};
use invoicer_core::{DomainError, DomainResult, UserId};
use invoicer_infra::PartyStore;

use super::BackOffice;

impl BackOffice {
    /// Run the policy for `request` as `subject` (the caller when `None`) and
    /// report the outcome without performing the request.
    ///
    /// Inactive subjects are explained too: the answer is then a denial.
    #[tracing::instrument(skip(self, actor, request), fields(user_id = %actor.user_id))]
    pub async fn explain_access(
        &self,
        actor: &Actor,
        subject: Option<UserId>,
        request: AccessRequest,
    ) -> DomainResult<AuthorizationExplanation> {
        require_admin_tenant(actor, "inspect authorization decisions")?;
        let subject = match subject {
            None => actor.clone(),
            Some(id) if id == actor.user_id => actor.clone(),
            Some(id) => {
                let user = self
                    .store
                    .user(id)
                    .await?
                    .ok_or_else(|| DomainError::not_found("User not found"))?;
                let tenant = self.load_tenant(user.tenant_id()).await?;
                user.actor(tenant.is_admin())
            }
        };
        Ok(explain(&subject, &request))
    }
}
