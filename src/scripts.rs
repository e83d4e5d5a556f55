//! Client-side provisioning scripts, embedded at build time and rendered
//! with the configured external base URL. `auth.sh` is also served over
//! HTTP; `setup.sh` is only ever printed via the CLI flag.

const AUTH_TEMPLATE: &str = include_str!("../templates/auth.sh");
const SETUP_TEMPLATE: &str = include_str!("../templates/setup.sh");

/// Placeholder in both templates for the server's external base URL.
const URL_PLACEHOLDER: &str = "{{keyward_url}}";

/// The AuthorizedKeysCommand script managed hosts run on every login.
pub fn auth_script(base_url: &str) -> String {
    AUTH_TEMPLATE.replace(URL_PLACEHOLDER, base_url)
}

/// The one-shot installer an administrator runs on a new host.
pub fn setup_script(base_url: &str) -> String {
    SETUP_TEMPLATE.replace(URL_PLACEHOLDER, base_url)
}
