//! Program, verify, erase and start command implementations.

use anyhow::{Context, Result};
use console::style;
use mspm0flash::FirmwareImage;
use std::path::Path;

use crate::commands::progress_bar;
use crate::session::Session;

fn load_image(session: &Session, firmware: &Path) -> Result<FirmwareImage> {
    if !session.quiet {
        eprintln!(
            "{} Loading firmware: {}",
            style("📦").cyan(),
            firmware.display()
        );
    }
    let image = FirmwareImage::from_file(firmware)
        .with_context(|| format!("Failed to load firmware {}", firmware.display()))?;
    if !session.quiet {
        eprintln!("{} {} bytes", style("ℹ").blue(), image.len());
    }
    Ok(image)
}

fn announce_interface(session: &Session) {
    if !session.quiet {
        eprintln!(
            "{} Using {}",
            style("🔌").cyan(),
            session.interface
        );
    }
}

/// Prog command implementation.
pub(crate) fn cmd_prog(session: &Session, firmware: &Path) -> Result<()> {
    let image = load_image(session, firmware)?;
    announce_interface(session);

    let pb = progress_bar(session.quiet, image.program_data().len());
    pb.set_message("Programming");

    let result = session.run(|flasher| {
        flasher.flash(&image, |current, total| {
            pb.set_length(total as u64);
            pb.set_position(current as u64);
        })
    });

    let region = match result {
        Ok(region) => {
            pb.finish_with_message("Complete");
            region
        },
        Err(err) => {
            pb.abandon();
            return Err(err.context("Flashing failed"));
        },
    };

    if !session.quiet {
        eprintln!(
            "{} Verified {} bytes (CRC32 {:#010x})",
            style("✓").green(),
            region.length,
            region.crc
        );
        if session.options.start {
            eprintln!("{} Application started", style("✓").green());
        }
        eprintln!("\n{} Flashing completed", style("🎉").green().bold());
    }

    Ok(())
}

/// Verify command implementation.
pub(crate) fn cmd_verify(session: &Session, firmware: &Path) -> Result<()> {
    let image = load_image(session, firmware)?;
    announce_interface(session);

    let region = session
        .run(|flasher| flasher.verify(&image))
        .context("Verification failed")?;

    if !session.quiet {
        eprintln!(
            "{} Flash matches {} ({} bytes, CRC32 {:#010x})",
            style("✓").green().bold(),
            firmware.display(),
            region.length,
            region.crc
        );
    }
    Ok(())
}

/// Erase command implementation.
pub(crate) fn cmd_erase(session: &Session) -> Result<()> {
    announce_interface(session);
    if !session.quiet {
        eprintln!("{} Erasing main flash", style("🗑").red());
    }

    session
        .run(|flasher| flasher.erase())
        .context("Mass erase failed")?;

    if !session.quiet {
        eprintln!("{} Erase completed", style("✓").green().bold());
    }
    Ok(())
}

/// Start command implementation.
pub(crate) fn cmd_start(session: &Session) -> Result<()> {
    announce_interface(session);

    session
        .run(|flasher| flasher.start_application())
        .context("Failed to start the application")?;

    if !session.quiet {
        eprintln!("{} Application started", style("✓").green().bold());
    }
    Ok(())
}
