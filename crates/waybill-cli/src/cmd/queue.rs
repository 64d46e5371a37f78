use anyhow::{bail, Context};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use waybill_core::action::{ActionPayload, Blob, Fields};

use crate::output::print_json;

#[derive(Subcommand, Debug)]
pub enum QueueSubcommand {
    /// Update fields on one record
    Update {
        /// Record id
        #[arg(long)]
        record: i64,
        /// Collection (default: targets.deliveries)
        #[arg(long)]
        collection: Option<String>,
        /// Field assignment `key=value`; values parse as JSON, else string
        #[arg(long = "set", value_name = "KEY=VALUE", required = true)]
        set: Vec<String>,
    },
    /// Upload a signature image and link it to a delivery
    Signature {
        #[arg(long)]
        delivery: i64,
        /// Object key in the signature bucket
        #[arg(long)]
        key: String,
        /// PNG file to upload
        #[arg(long)]
        file: PathBuf,
    },
    /// Upload a damage photo
    Photo {
        /// Object key in the photo bucket
        #[arg(long)]
        key: String,
        /// JPEG file to upload
        #[arg(long)]
        file: PathBuf,
    },
}

pub fn run(root: &Path, subcommand: QueueSubcommand, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(root)?;
    let payload = match subcommand {
        QueueSubcommand::Update {
            record,
            collection,
            set,
        } => ActionPayload::RecordUpdate {
            collection: collection.unwrap_or_else(|| config.targets.deliveries.clone()),
            record_id: record,
            fields: parse_fields(&set)?,
        },
        QueueSubcommand::Signature {
            delivery,
            key,
            file,
        } => ActionPayload::SignatureUpload {
            delivery_id: delivery,
            object_key: key,
            file: read_blob(&file)?,
        },
        QueueSubcommand::Photo { key, file } => ActionPayload::PhotoUpload {
            object_key: key,
            file: read_blob(&file)?,
        },
    };

    let kind = payload.kind();
    let store = super::open_store(root, &config)?;
    let id = store.enqueue(payload)?;

    if json {
        print_json(&serde_json::json!({ "id": id, "kind": kind.as_str() }))?;
    } else {
        println!("Queued {kind} action {id}");
    }
    Ok(())
}

fn parse_fields(assignments: &[String]) -> anyhow::Result<Fields> {
    let mut fields = Fields::new();
    for raw in assignments {
        let Some((key, value)) = raw.split_once('=') else {
            bail!("invalid field assignment '{raw}': expected KEY=VALUE");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("invalid field assignment '{raw}': empty key");
        }
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        fields.insert(key.to_string(), value);
    }
    Ok(fields)
}

fn read_blob(path: &Path) -> anyhow::Result<Blob> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Blob(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fields_parse_json_values_and_fall_back_to_strings() {
        let fields = parse_fields(&[
            "status=COMPLETED".into(),
            "attempts=2".into(),
            "notes={\"left_at\":\"door\"}".into(),
            "empty=".into(),
        ])
        .unwrap();
        assert_eq!(fields["status"], "COMPLETED");
        assert_eq!(fields["attempts"], 2);
        assert_eq!(fields["notes"], json!({"left_at": "door"}));
        assert_eq!(fields["empty"], "");
    }

    #[test]
    fn fields_reject_missing_equals() {
        assert!(parse_fields(&["status".into()]).is_err());
        assert!(parse_fields(&["=x".into()]).is_err());
    }
}
