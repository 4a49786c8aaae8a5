//! Offline session on stdin.
//!
//! Each input line goes through the same router as lines from the host and
//! every resulting event is printed as a JSON array on stdout.

use crate::plugin::Plugin;
use anyhow::Result;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// Run the REPL on stdin/stdout.
pub async fn run_repl(plugin: &mut Plugin) -> Result<()> {
    let interactive = atty::is(atty::Stream::Stdin);
    let reader = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    run_lines(plugin, reader, &mut stdout, interactive).await
}

async fn run_lines<R, W>(plugin: &mut Plugin, reader: R, out: &mut W, interactive: bool) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    plugin.register_offline()?;
    for event in plugin.hook_events()? {
        writeln!(out, "{}", event.to_json())?;
    }

    let mut lines = reader.lines();
    loop {
        if interactive {
            eprint!("> ");
            std::io::stderr().flush()?;
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let mut events = Vec::new();
        plugin.dispatch(&line, &mut events).await;
        if events.is_empty() && interactive {
            eprintln!("(nothing sent)");
        }
        for event in events {
            writeln!(out, "{}", event.to_json())?;
        }
        out.flush()?;
    }

    for event in plugin.release_events()? {
        writeln!(out, "{}", event.to_json())?;
    }
    if interactive && !plugin.store().is_empty() {
        for record in plugin.store().iter() {
            eprintln!("{}  {}", record.key, record.content);
        }
    }
    Ok(())
}
