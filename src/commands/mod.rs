pub mod check;
pub mod completions;
pub mod fetch;

use eyre::Result;

use crate::cli::SourceArgs;
use crate::config::Config;
use crate::credentials::Credentials;
use crate::terms::TrackedTerms;

/// Startup inputs shared by `fetch` and `check`; any failure here is fatal
/// before a connection is attempted
pub struct Inputs {
    pub credentials: Credentials,
    pub terms: TrackedTerms,
}

impl Inputs {
    pub fn load(source: &SourceArgs) -> Result<Self> {
        let credentials_file = source.credentials_file.as_deref().map(Config::expand_path);
        let credentials = Credentials::resolve(
            credentials_file.as_deref(),
            source.credential_values(),
            &Credentials::default_file(),
            source.save_credentials,
        )?;

        let terms = TrackedTerms::load(&Config::expand_path(&source.hashtags_file))?;

        Ok(Self { credentials, terms })
    }
}
