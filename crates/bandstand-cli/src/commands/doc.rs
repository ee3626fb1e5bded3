use anyhow::{Context as _, Result};
use bandstand_core::model::{DocumentId, TuneId};
use bandstand_ingest::{delete_document, open_document, UploadPart};
use std::fs::File;
use std::io;
use std::path::PathBuf;

use super::Context;
use crate::output::print_json;

#[derive(Debug, clap::Subcommand)]
pub enum DocAction {
    /// Upload a file and attach it to a tune
    Upload {
        tune: i64,
        file: PathBuf,

        #[arg(long)]
        title: String,

        #[arg(long, default_value = "pdf")]
        file_type: String,
    },
    /// List a tune's documents
    List { tune: i64 },
    /// Show a document's metadata
    Show { id: i64 },
    /// Write a document's bytes to a file
    Download { id: i64, out: PathBuf },
    /// Delete a document (its uploader or the band owner)
    Delete { id: i64 },
}

pub fn run(ctx: &Context, action: DocAction) -> Result<()> {
    let db = ctx.db()?;
    let caller = ctx.caller()?;

    match action {
        DocAction::Upload {
            tune,
            file,
            title,
            file_type,
        } => {
            let info = serde_json::json!({
                "tune_id": tune,
                "file_type": file_type,
                "title": title,
            })
            .to_string();
            let body =
                File::open(&file).with_context(|| format!("Failed to open {}", file.display()))?;

            let pipeline = ctx.pipeline()?;
            let doc = pipeline.ingest(
                &db,
                caller,
                [
                    UploadPart::new("info", info.as_bytes()),
                    UploadPart::new("file", body),
                ],
            )?;
            print_json(&doc)
        }
        DocAction::List { tune } => {
            print_json(&db.catalog().list_documents(TuneId::new(tune), caller)?)
        }
        DocAction::Show { id } => {
            print_json(&db.catalog().get_document(DocumentId::new(id), caller)?)
        }
        DocAction::Download { id, out } => {
            let (doc, mut file) = open_document(&db, DocumentId::new(id), caller)?;
            let mut dest = File::create(&out)
                .with_context(|| format!("Failed to create {}", out.display()))?;
            let bytes = io::copy(&mut file, &mut dest)?;
            log::info!("Wrote document {} ({bytes} bytes) to {}", doc.id, out.display());
            print_json(&doc)
        }
        DocAction::Delete { id } => print_json(&delete_document(&db, DocumentId::new(id), caller)?),
    }
}
