pub mod credentials;
pub mod request;
pub mod session;

use crate::{auth::RegisterForm, cli::globals::GlobalArgs};

// Internal "interpreter" for `Action`.
mod run;

#[derive(Debug)]
pub enum Action {
    Login(credentials::Login),
    SchoolLogin(credentials::SchoolLogin),
    Register { globals: GlobalArgs, form: RegisterForm },
    Logout(GlobalArgs),
    Whoami(GlobalArgs),
    Refresh(GlobalArgs),
    Get(request::Get),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
