use anyhow::{bail, Result};
use bandstand_core::model::{BandId, Key, Tune, TuneId, TunePatch, TuneStatus};
use bandstand_core::TuneQuery;

use super::{retry_policy, Context};
use crate::output::print_json;

#[derive(Debug, clap::Subcommand)]
pub enum TuneAction {
    /// Add a tune to a band
    Add {
        band: i64,
        title: String,

        /// Comma-separated keys, e.g. "A major,E minor"
        #[arg(long, value_delimiter = ',', required = true)]
        keys: Vec<String>,

        /// Time signature as UPPER/LOWER
        #[arg(long, value_parser = parse_time_signature, default_value = "4/4")]
        time_signature: (u8, u8),

        #[arg(long, default_value = "germinating")]
        status: TuneStatus,
    },
    /// Show a tune
    Show { id: i64 },
    /// Change some of a tune's fields
    Update {
        id: i64,

        #[arg(long)]
        title: Option<String>,

        #[arg(long, value_delimiter = ',')]
        keys: Option<Vec<String>>,

        #[arg(long, value_parser = parse_time_signature)]
        time_signature: Option<(u8, u8)>,

        #[arg(long)]
        status: Option<TuneStatus>,

        /// Move the tune to another band
        #[arg(long)]
        band: Option<i64>,

        /// Re-apply the edit this many times if someone else saved first
        #[arg(long, default_value_t = 0)]
        retry: u32,
    },
    /// Delete a tune that has no documents
    Delete { id: i64 },
    /// List a band's tunes
    ///
    /// Parameters are NAME=VALUE pairs: title, keys, statuses, page,
    /// page_size, and sort (prefix the column with '-' for descending).
    List {
        band: i64,

        #[arg(value_name = "NAME=VALUE")]
        params: Vec<String>,
    },
}

fn parse_time_signature(s: &str) -> Result<(u8, u8), String> {
    let (upper, lower) = s
        .split_once('/')
        .ok_or_else(|| format!("expected UPPER/LOWER, got {s:?}"))?;
    let upper = upper.trim().parse().map_err(|e| format!("bad upper value: {e}"))?;
    let lower = lower.trim().parse().map_err(|e| format!("bad lower value: {e}"))?;
    Ok((upper, lower))
}

fn to_keys(keys: Vec<String>) -> Vec<Key> {
    keys.into_iter().map(Key::new).collect()
}

fn parse_params(params: &[String]) -> Result<Vec<(&str, &str)>> {
    params
        .iter()
        .map(|param| match param.split_once('=') {
            Some(pair) => Ok(pair),
            None => bail!("List parameters look like NAME=VALUE, got {param:?}"),
        })
        .collect()
}

pub fn run(ctx: &Context, action: TuneAction) -> Result<()> {
    let db = ctx.db()?;
    let caller = ctx.caller()?;
    let catalog = db.catalog();

    match action {
        TuneAction::Add {
            band,
            title,
            keys,
            time_signature: (upper, lower),
            status,
        } => {
            let tune = Tune::new(BandId::new(band), title, to_keys(keys))
                .with_time_signature(upper, lower)
                .with_status(status);
            print_json(&catalog.create_tune(tune, caller)?)
        }
        TuneAction::Show { id } => print_json(&catalog.get_tune(TuneId::new(id), caller)?),
        TuneAction::Update {
            id,
            title,
            keys,
            time_signature,
            status,
            band,
            retry,
        } => {
            let patch = TunePatch {
                title,
                keys: keys.map(to_keys),
                time_signature_upper: time_signature.map(|(upper, _)| upper),
                time_signature_lower: time_signature.map(|(_, lower)| lower),
                status,
                band_id: band.map(BandId::new),
            };
            let tune = catalog.update_tune(TuneId::new(id), &patch, caller, retry_policy(retry))?;
            print_json(&tune)
        }
        TuneAction::Delete { id } => {
            catalog.delete_tune(TuneId::new(id), caller)?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
        TuneAction::List { band, params } => {
            let query = TuneQuery::from_pairs(parse_params(&params)?)?;
            print_json(&catalog.list_tunes(BandId::new(band), &query, caller)?)
        }
    }
}
