//! Tenant resolver: inbound address to the owning tenant's integration record.

use relay_core::address::strip_plus;
use relay_core::models::{Channel, TenantAddress, TenantIntegration};
use relay_core::{RelayError, RelayStore};

/// Find the tenant that owns `recipient` on `channel`.
///
/// Phone-number lookups retry once without a leading `+`. Meta-family ids
/// match any of the page, WhatsApp or Instagram columns; the caller keeps
/// the channel it decoded from the payload.
pub async fn resolve_tenant(
    store: &dyn RelayStore,
    channel: Channel,
    recipient: &str,
) -> Result<TenantIntegration, RelayError> {
    let recipient = recipient.trim();
    let found = match channel {
        Channel::Sms | Channel::Voice => {
            match store.find_tenant_by_address(TenantAddress::Phone(recipient)).await? {
                Some(tenant) => Some(tenant),
                None => match strip_plus(recipient) {
                    Some(bare) => store.find_tenant_by_address(TenantAddress::Phone(bare)).await?,
                    None => None,
                },
            }
        }
        Channel::Facebook | Channel::Instagram | Channel::Whatsapp => {
            store.find_tenant_by_address(TenantAddress::MetaId(recipient)).await?
        }
    };

    found.ok_or_else(|| RelayError::TenantNotFound {
        channel,
        address: recipient.to_string(),
    })
}
