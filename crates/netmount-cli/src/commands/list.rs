//! List command - show declared mounts in processing order.

use anyhow::Result;
use clap::Args as ClapArgs;
use comfy_table::{Cell, Color, Table};
use netmount_core::{KnownStatus, MountSpec};
use tracing::instrument;

use super::Context;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Output in JSON format (passwords omitted)
    #[arg(long)]
    pub json: bool,
}

#[instrument(level = "info", name = "cmd::list", skip_all)]
pub fn execute(ctx: &Context, args: &Args) -> Result<()> {
    let entries = ctx.entries()?;

    if args.json {
        let rows: Vec<serde_json::Value> = entries.iter().map(entry_to_json).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if entries.is_empty() {
        ctx.note("No mounts declared.");
        ctx.note("Use 'netmount add URL NAME' to declare one.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "Path", "URL", "User", "Automount", "Status"]);
    for (index, entry) in entries.iter().enumerate() {
        table.add_row(vec![
            Cell::new(index + 1),
            Cell::new(entry.path.display()),
            Cell::new(&entry.url),
            Cell::new(&entry.user),
            Cell::new(if entry.automount { "on" } else { "off" }),
            status_cell(entry.last_known_status),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn status_cell(status: KnownStatus) -> Cell {
    Cell::new(status).fg(match status {
        KnownStatus::Mounted => Color::Green,
        KnownStatus::Unmounted => Color::Yellow,
        KnownStatus::Unknown => Color::DarkGrey,
    })
}

fn entry_to_json(entry: &MountSpec) -> serde_json::Value {
    serde_json::json!({
        "path": entry.path,
        "url": entry.url,
        "protocol": entry.url.scheme(),
        "user": entry.user,
        "smb_version": entry.smb_version,
        "automount": entry.automount,
        "last_known_status": entry.last_known_status,
        "order": entry.order,
        "sshkeyvalid": entry.sshkeyvalid,
    })
}
