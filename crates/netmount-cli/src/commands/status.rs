//! Status command - probe every entry without changing anything.

use anyhow::Result;
use clap::Args as ClapArgs;
use comfy_table::{Cell, Color, Table};
use netmount_mount::{Probe, process};
use tracing::instrument;

use super::Context;
use super::list::status_cell;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

struct Row {
    mounted: bool,
    reachable: bool,
    not_actionable: Option<String>,
}

#[instrument(level = "info", name = "cmd::status", skip_all)]
pub fn execute(ctx: &Context, args: &Args) -> Result<()> {
    let entries = ctx.entries()?;
    let probe = ctx.probe();
    let executor = ctx.executor()?;
    let network_up = probe.is_network_up();
    let daemons = process::find_daemons(env!("CARGO_BIN_NAME"));

    let rows: Vec<Row> = entries
        .iter()
        .map(|entry| Row {
            mounted: probe.is_mounted(&entry.path),
            reachable: network_up && probe.is_host_reachable(&entry.url),
            not_actionable: executor
                .check_mountable(entry)
                .err()
                .map(|reason| reason.to_string()),
        })
        .collect();

    if args.json {
        let list: Vec<serde_json::Value> = entries
            .iter()
            .zip(&rows)
            .map(|(entry, row)| {
                serde_json::json!({
                    "path": entry.path,
                    "url": entry.url,
                    "automount": entry.automount,
                    "last_known_status": entry.last_known_status,
                    "mounted": row.mounted,
                    "reachable": row.reachable,
                    "actionable": row.not_actionable.is_none(),
                    "reason": row.not_actionable,
                })
            })
            .collect();
        let output = serde_json::json!({
            "network_up": network_up,
            "daemon_pids": daemons,
            "entries": list,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Path", "URL", "Mounted", "Reachable", "Mountable", "Recorded"]);
    for (entry, row) in entries.iter().zip(&rows) {
        table.add_row(vec![
            Cell::new(entry.path.display()),
            Cell::new(&entry.url),
            yes_no(row.mounted),
            yes_no(row.reachable),
            match &row.not_actionable {
                None => Cell::new("yes").fg(Color::Green),
                Some(reason) => Cell::new(format!("no: {reason}")).fg(Color::Red),
            },
            status_cell(entry.last_known_status),
        ]);
    }
    println!("{table}");

    if !network_up {
        ctx.note("Local network is down; hosts were not probed.");
    }
    match daemons.as_slice() {
        [] => ctx.note("Daemon: not running"),
        pids => ctx.note(format!("Daemon: running (PID {pids:?})")),
    }
    Ok(())
}

fn yes_no(value: bool) -> Cell {
    if value {
        Cell::new("yes").fg(Color::Green)
    } else {
        Cell::new("no").fg(Color::Yellow)
    }
}
