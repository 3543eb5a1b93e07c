//! Device information command implementation.

use {
    crate::session::Session,
    anyhow::{Context, Result},
    console::style,
    mspm0flash::DeviceInfo,
};

/// Info command implementation.
pub(crate) fn cmd_info(session: &Session, json: bool) -> Result<()> {
    if !session.quiet && !json {
        eprintln!(
            "{} Connecting via {}",
            style("🔌").cyan(),
            session.interface
        );
    }

    let info = session
        .run(|flasher| flasher.info())
        .context("Failed to read device information")?;

    if json {
        println!("{}", render_json(session, &info)?);
        return Ok(());
    }

    eprintln!("\n{}", style("Device information").bold().underlined());
    for line in info.to_string().lines() {
        eprintln!("  {line}");
    }

    Ok(())
}

fn render_json(session: &Session, info: &DeviceInfo) -> Result<String> {
    let output = serde_json::json!({
        "ok": true,
        "data": {
            "interface": session.interface.to_string(),
            "device": info,
        }
    });
    Ok(serde_json::to_string_pretty(&output)?)
}
