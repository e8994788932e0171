//! Handler for `osip update`: stitched-image flash and explicit-field patch.

use super::open_storage;
use crate::output::{OutputStyle, format_success};
use crate::{CommandContext, UpdateArgs};
use anyhow::{Context, bail};
use osip_storage::DescriptorPatch;
use std::fs;
use std::path::Path;
use tracing::info;

pub fn handle(args: &UpdateArgs, ctx: &CommandContext) -> anyhow::Result<()> {
    let patch = patch_from_args(args);
    if args.image.is_none() && patch.is_empty() {
        bail!("nothing to update: pass --image or descriptor field options");
    }

    let mut storage = open_storage(ctx)?;
    let style = OutputStyle::new();

    if let Some(path) = &args.image {
        check_image_extension(path)?;
        let image = fs::read(path).with_context(|| format!("reading image {path:?}"))?;
        info!("flashing {:?} ({} bytes) into slot {}", path, image.len(), args.slot);

        storage.update_slot(args.slot, &image)?;
        println!(
            "{}",
            format_success(
                &format!("Slot {} flashed and verified from {:?}", args.slot, path),
                &style
            )
        );
    }

    if !patch.is_empty() {
        storage.update_fields(args.slot, &patch)?;
        println!(
            "{}",
            format_success(&format!("Slot {} descriptor fields updated", args.slot), &style)
        );
    }

    Ok(())
}

/// Stitched images come out of the packaging tool as `*.bin`; anything else
/// is almost certainly the wrong file.
fn check_image_extension(path: &Path) -> anyhow::Result<()> {
    if path.extension().and_then(|e| e.to_str()) != Some("bin") {
        bail!("image {path:?} does not have a .bin extension");
    }
    Ok(())
}

fn patch_from_args(args: &UpdateArgs) -> DescriptorPatch {
    DescriptorPatch {
        os_rev_major: args.rev_major,
        os_rev_minor: args.rev_minor,
        logical_start_block: args.lba,
        ddr_load_address: args.addr,
        entry_point: args.entry,
        size_of_os_image: args.size,
        attribute: args.attrib,
    }
}
