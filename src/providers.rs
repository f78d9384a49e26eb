use std::collections::HashSet;

use tracing::{info, instrument};

use crate::error::UserError;
use crate::state::AppState;
use crate::users::repo_types::WirelessProvider;

/// US carriers and their email-to-SMS gateway domains.
pub const DEFAULT_PROVIDERS: &[(&str, &str)] = &[
    ("AT&T", "txt.att.net"),
    ("Verizon", "vtext.com"),
    ("T-Mobile", "tmomail.net"),
    ("Sprint", "messaging.sprintpcs.com"),
    ("U.S. Cellular", "email.uscc.net"),
    ("Boost Mobile", "sms.myboostmobile.com"),
    ("Cricket", "sms.cricketwireless.net"),
    ("Virgin Mobile", "vmobl.com"),
];

/// Inserts the default carriers whose domain is not stored yet. Returns the
/// number inserted.
#[instrument(skip(st))]
pub async fn seed_defaults(st: &AppState) -> Result<usize, UserError> {
    let existing: HashSet<String> = st
        .users
        .list_providers()
        .await?
        .into_iter()
        .map(|p| p.domain)
        .collect();

    let mut inserted = 0;
    for (name, domain) in DEFAULT_PROVIDERS {
        if existing.contains(*domain) {
            continue;
        }
        st.users
            .insert_provider(&WirelessProvider::new(*name, *domain))
            .await?;
        inserted += 1;
    }
    info!(inserted, "wireless providers seeded");
    Ok(inserted)
}
