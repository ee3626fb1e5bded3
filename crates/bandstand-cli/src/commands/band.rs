use anyhow::Result;
use bandstand_core::model::{BandId, BandPatch, UserId};

use super::{retry_policy, Context};
use crate::output::print_json;

#[derive(Debug, clap::Subcommand)]
pub enum BandAction {
    /// Create a band owned by the acting user
    Create { name: String },
    /// Show a band you belong to
    Show { id: i64 },
    /// Rename a band
    Rename {
        id: i64,
        name: String,

        /// Re-apply the rename this many times if someone else saved first
        #[arg(long, default_value_t = 0)]
        retry: u32,
    },
    /// Delete a band and everything in it (owner only)
    Delete { id: i64 },
    /// List a band's members
    Members { id: i64 },
    /// List the bands the acting user belongs to
    Mine,
    /// Add a user to a band
    Join { band: i64, user: i64 },
    /// Remove a user from a band (the user themself or the owner)
    Leave { band: i64, user: i64 },
}

pub fn run(ctx: &Context, action: BandAction) -> Result<()> {
    let db = ctx.db()?;
    let caller = ctx.caller()?;
    let members = db.memberships();
    let catalog = db.catalog();

    match action {
        BandAction::Create { name } => print_json(&members.create_band(&name, caller)?),
        BandAction::Show { id } => print_json(&catalog.get_band(BandId::new(id), caller)?),
        BandAction::Rename { id, name, retry } => {
            let patch = BandPatch { name: Some(name) };
            let band = catalog.update_band(BandId::new(id), &patch, caller, retry_policy(retry))?;
            print_json(&band)
        }
        BandAction::Delete { id } => {
            catalog.delete_band(BandId::new(id), caller)?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
        BandAction::Members { id } => {
            let band = catalog.get_band(BandId::new(id), caller)?;
            print_json(&members.list_members_for_band(band.id)?)
        }
        BandAction::Mine => print_json(&members.list_bands_for_user(caller)?),
        BandAction::Join { band, user } => {
            let band = catalog.get_band(BandId::new(band), caller)?;
            print_json(&members.add_member(band.id, UserId::new(user))?)
        }
        BandAction::Leave { band, user } => {
            members.remove_member(BandId::new(band), UserId::new(user), caller)?;
            print_json(&serde_json::json!({ "band_id": band, "user_id": user, "removed": true }))
        }
    }
}
