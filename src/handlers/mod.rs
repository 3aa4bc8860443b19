pub mod checkout;
pub mod contracts;
pub mod health;
pub mod mp_oauth;
pub mod orders;
pub mod payment_webhooks;
pub mod quotations;

use crate::{auth::AuthUser, auth::Role, services::quotations::Party};

/// Maps the caller's role onto the marketplace side acting in an operation.
pub fn party_of(user: &AuthUser) -> Party {
    match user.role {
        Role::Client => Party::Client,
        Role::Provider => Party::Provider,
    }
}
