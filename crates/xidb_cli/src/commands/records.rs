//! Point record commands: create, upsert, get, exists, update, delete.

use super::{parse_assignment, print_json, CliResult, StoreOptions};
use clap::Args;
use serde_json::Value;
use xidb_core::{project, FieldUpdate, Info, Metadata, Operation, Record, Xid};

/// Addresses one `(xid, path)` key.
#[derive(Args, Debug)]
pub struct KeyArgs {
    /// Path the record is stored under, e.g. /info/okta
    pub path: String,

    /// Subject the identifier is derived from
    #[arg(long, required_unless_present = "xid", conflicts_with = "xid")]
    pub id: Option<String>,

    /// Identifier as stored
    #[arg(long)]
    pub xid: Option<String>,
}

impl KeyArgs {
    /// Resolves the addressed identifier.
    pub fn xid(&self) -> CliResult<Xid> {
        match (&self.id, &self.xid) {
            (Some(id), _) => Ok(Xid::derive(id)),
            (None, Some(xid)) => Ok(Xid::parse(xid)?),
            (None, None) => Err("Either --id or --xid is required".into()),
        }
    }
}

/// A record described on the command line.
#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Path to store the record under, e.g. /info/okta
    pub path: String,

    /// Subject the identifier is derived from
    #[arg(long)]
    pub id: String,

    /// Kind of subject (email, username, hostname, ...)
    #[arg(long = "type", default_value = "")]
    pub kind: String,

    /// Tag on the subject (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Payload as JSON
    #[arg(long, default_value = "{}")]
    pub payload: String,

    /// Metadata attribute, as KEY=VALUE (repeatable)
    #[arg(long = "attr", value_name = "KEY=VALUE")]
    pub attrs: Vec<String>,

    /// Creation time in epoch milliseconds (defaults to now)
    #[arg(long)]
    pub created_at: Option<i64>,

    /// Operation recorded in the metadata
    #[arg(long, default_value = "create")]
    pub operation: String,

    /// MIME type of the payload
    #[arg(long, default_value = "application/json")]
    pub content_type: String,
}

impl RecordArgs {
    /// Builds the record.
    pub fn build(&self) -> CliResult<Record> {
        let info = self
            .tags
            .iter()
            .fold(Info::new(&self.id, &self.kind), |info, tag| info.with_tag(tag));

        let mut metadata = Metadata::new(
            self.operation.parse::<Operation>()?,
            &self.path,
            &self.content_type,
        );
        if let Some(created_at) = self.created_at {
            metadata = metadata.with_created_at(created_at);
        }
        for attr in &self.attrs {
            let (key, value) = parse_assignment(attr)?;
            metadata = metadata.with_extra(key, value);
        }

        let payload: Value = serde_json::from_str(&self.payload)
            .map_err(|e| format!("Payload is not valid JSON: {e}"))?;
        Ok(Record::new(info, metadata, payload))
    }
}

/// Runs the create command.
pub async fn create(
    opts: &StoreOptions,
    args: &RecordArgs,
    idempotency_key: Option<&str>,
) -> CliResult {
    let record = args.build()?;
    let xid = record.xid.clone();
    let (store, _) = opts.open("create", true)?;
    let outcome = store
        .create(&opts.context(), &args.path, record, idempotency_key)
        .await?;
    if outcome.is_inserted() {
        println!("Created {xid} at {} ({})", args.path, outcome.row());
    } else {
        println!("Already created {xid} at {} ({})", args.path, outcome.row());
    }
    Ok(())
}

/// Runs the upsert command.
pub async fn upsert(opts: &StoreOptions, args: &RecordArgs) -> CliResult {
    let record = args.build()?;
    let xid = record.xid.clone();
    let (store, _) = opts.open("upsert", true)?;
    let row = store.upsert(&opts.context(), record).await?;
    println!("Stored {xid} at {} ({row})", args.path);
    Ok(())
}

/// Runs the get command.
pub async fn get(opts: &StoreOptions, key: &KeyArgs, history: bool, fields: &[String]) -> CliResult {
    let xid = key.xid()?;
    let (store, backend) = opts.open("get", false)?;

    if history {
        let versions = backend.history(&key.path, &xid);
        if versions.is_empty() {
            return Err(format!("Nothing stored for {xid} at {}", key.path).into());
        }
        for version in &versions {
            print_json(version, false)?;
        }
        return Ok(());
    }

    let record = store.get_by_xid(&opts.context(), &key.path, &xid).await?;
    let record = if fields.is_empty() {
        record
    } else {
        project(&record, fields)?
    };
    print_json(&record, true)
}

/// Runs the exists command.
pub async fn exists(opts: &StoreOptions, key: &KeyArgs) -> CliResult {
    let xid = key.xid()?;
    let (store, _) = opts.open("exists", false)?;
    println!("{}", store.exists(&opts.context(), &key.path, &xid).await?);
    Ok(())
}

/// Runs the update command.
pub async fn update(opts: &StoreOptions, key: &KeyArgs, sets: &[String]) -> CliResult {
    let xid = key.xid()?;
    let update = sets
        .iter()
        .map(|set| parse_assignment(set))
        .collect::<CliResult<FieldUpdate>>()?;
    let (store, _) = opts.open("update", false)?;
    store
        .update_fields(&opts.context(), &key.path, &xid, &update)
        .await?;
    println!("Updated {} field(s) of {xid} at {}", update.len(), key.path);
    Ok(())
}

/// Runs the delete command.
pub async fn delete(opts: &StoreOptions, key: &KeyArgs, hard: bool) -> CliResult {
    let xid = key.xid()?;
    let (store, _) = opts.open("delete", false)?;
    let ctx = opts.context();
    if hard {
        store.delete_hard(&ctx, &key.path, &xid).await?;
        println!("Erased {xid} at {}", key.path);
    } else {
        store.delete_soft(&ctx, &key.path, &xid).await?;
        println!("Deleted {xid} at {}", key.path);
    }
    Ok(())
}
