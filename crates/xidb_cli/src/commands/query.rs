//! List and count commands.

use super::{parse_assignment, print_json, CliResult, StoreOptions};
use clap::Args;
use xidb_core::{Query, SortField};

/// Filters shared by `list` and `count`.
#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Path to list (every path when omitted)
    pub path: Option<String>,

    /// Exact record name
    #[arg(long)]
    pub name: Option<String>,

    /// Record name prefix
    #[arg(long)]
    pub name_prefix: Option<String>,

    /// Tag every record must carry (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Earliest createdAt, inclusive (epoch milliseconds)
    #[arg(long)]
    pub from: Option<i64>,

    /// Latest createdAt, exclusive (epoch milliseconds)
    #[arg(long)]
    pub until: Option<i64>,

    /// Metadata attribute equality, as KEY=VALUE (repeatable)
    #[arg(long = "attr", value_name = "KEY=VALUE")]
    pub attrs: Vec<String>,
}

impl FilterArgs {
    /// Builds the filtering part of a query.
    pub fn query(&self) -> CliResult<Query> {
        let mut query = Query::new(self.path.clone().unwrap_or_default())
            .created_between(self.from, self.until);
        if let Some(name) = &self.name {
            query = query.name_equals(name);
        }
        if let Some(prefix) = &self.name_prefix {
            query = query.name_prefix(prefix);
        }
        for tag in &self.tags {
            query = query.with_tag(tag);
        }
        for attr in &self.attrs {
            let (key, value) = parse_assignment(attr)?;
            query = query.attribute_eq(key, value);
        }
        Ok(query)
    }
}

/// Arguments of the list command.
#[derive(Args, Debug, Default)]
pub struct ListArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Sort field (createdAt, name, _id)
    #[arg(long, default_value = "createdAt")]
    pub sort: String,

    /// Oldest or smallest first
    #[arg(long)]
    pub asc: bool,

    /// Records per page (default 20, at most 100)
    #[arg(long, default_value_t = 0)]
    pub page_size: i64,

    /// Continue after this cursor
    #[arg(long)]
    pub after: Option<String>,

    /// Keep only these fields (repeatable)
    #[arg(long = "field")]
    pub fields: Vec<String>,

    /// Follow cursors until every page is printed
    #[arg(long)]
    pub all: bool,
}

impl ListArgs {
    /// Builds the query.
    pub fn query(&self) -> CliResult<Query> {
        let mut query = self
            .filter
            .query()?
            .sort_by(SortField::parse_lenient(&self.sort))
            .page_size(self.page_size)
            .project(self.fields.iter().cloned());
        if self.asc {
            query = query.ascending();
        }
        if let Some(cursor) = &self.after {
            query = query.after(cursor);
        }
        Ok(query)
    }
}

/// Runs the list command. Records are printed one JSON document per line.
pub async fn list(opts: &StoreOptions, args: &ListArgs) -> CliResult {
    let mut query = args.query()?;
    let (store, _) = opts.open("list", false)?;
    let ctx = opts.context();

    loop {
        let page = store.list(&ctx, &query).await?;
        for record in &page.records {
            print_json(record, false)?;
        }
        match page.next_cursor {
            Some(cursor) if args.all => query.after_cursor = Some(cursor),
            Some(cursor) => {
                eprintln!("next cursor: {cursor}");
                break;
            }
            None => break,
        }
    }
    Ok(())
}

/// Runs the count command.
pub async fn count(opts: &StoreOptions, args: &FilterArgs) -> CliResult {
    let query = args.query()?;
    let (store, _) = opts.open("count", false)?;
    println!("{}", store.count(&opts.context(), &query).await?);
    Ok(())
}
