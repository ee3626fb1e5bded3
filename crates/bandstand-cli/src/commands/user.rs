use anyhow::Result;
use bandstand_core::model::{User, UserId};

use super::Context;
use crate::output::print_json;

#[derive(Debug, clap::Subcommand)]
pub enum UserAction {
    /// Register a new user
    Add {
        name: String,
        email: String,
    },
    /// Show a user by id
    Show { id: i64 },
}

pub fn run(ctx: &Context, action: UserAction) -> Result<()> {
    let db = ctx.db()?;

    match action {
        UserAction::Add { name, email } => {
            let mut user = User::new(name, email);
            db.users().insert(&mut user)?;
            log::info!("Registered user {}", user.id);
            print_json(&user)
        }
        UserAction::Show { id } => print_json(&db.users().get(UserId::new(id))?),
    }
}
