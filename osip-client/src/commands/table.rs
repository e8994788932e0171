//! Handlers for the table-lifecycle commands: check, backup, restore,
//! invalidate.

use super::open_storage;
use crate::output::{
    OutputStyle, create_table, format_key_value, format_success, format_warning, header_cell,
    numeric_cell, print_section_header, regular_cell,
};
use crate::{CommandContext, InvalidateArgs, OutputFormat};
use osip_storage::{MAX_DESCRIPTORS, Osii, OsipHeader, TableReport};
use serde_json::json;

/// Dump both on-device tables.
pub fn check(ctx: &CommandContext) -> anyhow::Result<()> {
    let mut storage = open_storage(ctx)?;
    let report = storage.check()?;

    match ctx.format {
        OutputFormat::Text => {
            let style = OutputStyle::new();
            render_table("OSIP header", &report.primary, &style);
            render_table("Backup OSIP header", &report.backup, &style);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string(&report_json(&report))?),
        OutputFormat::JsonPretty => {
            println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
        }
    }
    Ok(())
}

/// Copy the primary table into the backup region.
pub fn backup(ctx: &CommandContext) -> anyhow::Result<()> {
    let mut storage = open_storage(ctx)?;
    storage.backup()?;

    let style = OutputStyle::new();
    println!(
        "{}",
        format_success("Primary table copied to backup region", &style)
    );
    Ok(())
}

/// Restore the primary table from the backup region.
pub fn restore(ctx: &CommandContext) -> anyhow::Result<()> {
    let mut storage = open_storage(ctx)?;
    let restored = storage.restore()?;

    let style = OutputStyle::new();
    println!(
        "{}",
        format_success("Backup table restored to primary", &style)
    );
    render_table("Restored OSIP header", &restored, &style);
    Ok(())
}

/// Invalidate descriptors by attribute tag.
pub fn invalidate(args: &InvalidateArgs, ctx: &CommandContext) -> anyhow::Result<()> {
    let mut storage = open_storage(ctx)?;

    if args.backup_first {
        storage.backup()?;
    }
    storage.invalidate(&args.attributes)?;

    let style = OutputStyle::new();
    println!(
        "{}",
        format_success(
            &format!("{} descriptor(s) invalidated", args.attributes.len()),
            &style
        )
    );
    Ok(())
}

fn render_table(title: &str, table: &OsipHeader, style: &OutputStyle) {
    print_section_header(title, style);

    if !table.is_valid() {
        println!(
            "{}",
            format_warning("no table present (signature mismatch)", style)
        );
        return;
    }

    println!(
        "{}",
        format_key_value("Signature", &format!("{:#010x}", table.sig), style)
    );
    println!(
        "{}",
        format_key_value(
            "Header rev",
            &format!("{}.{}", table.header_rev_major, table.header_rev_minor),
            style
        )
    );
    println!(
        "{}",
        format_key_value(
            "Checksum",
            &format!(
                "{:#04x} over {} bytes",
                table.header_checksum, table.header_size
            ),
            style
        )
    );
    println!(
        "{}",
        format_key_value(
            "Images",
            &format!("{} ({} pointers)", table.num_images, table.num_pointers),
            style
        )
    );

    let count = usize::from(table.num_pointers).min(MAX_DESCRIPTORS);
    if count == 0 {
        return;
    }

    let mut out = create_table(style);
    out.set_header(vec![
        header_cell("Slot", style),
        header_cell("Rev", style),
        header_cell("LBA", style),
        header_cell("Load addr", style),
        header_cell("Entry", style),
        header_cell("Pages", style),
        header_cell("Attr", style),
    ]);
    for (slot, d) in table.desc.iter().take(count).enumerate() {
        out.add_row(vec![
            numeric_cell(&slot.to_string()),
            regular_cell(&format!("{}.{}", d.os_rev_major, d.os_rev_minor)),
            numeric_cell(&format!("{:#x}", d.logical_start_block)),
            numeric_cell(&format!("{:#010x}", d.ddr_load_address)),
            numeric_cell(&format!("{:#010x}", d.entry_point)),
            numeric_cell(&format!("{:#x}", d.size_of_os_image)),
            numeric_cell(&format!("{:#04x}", d.attribute)),
        ]);
    }
    println!("{out}");
}

fn report_json(report: &TableReport) -> serde_json::Value {
    json!({
        "primary": table_json(&report.primary),
        "backup": table_json(&report.backup),
    })
}

fn table_json(table: &OsipHeader) -> serde_json::Value {
    json!({
        "signature": format!("{:#010x}", table.sig),
        "valid": table.is_valid(),
        "header_rev_major": table.header_rev_major,
        "header_rev_minor": table.header_rev_minor,
        "header_checksum": table.header_checksum,
        "header_size": table.header_size,
        "num_pointers": table.num_pointers,
        "num_images": table.num_images,
        "descriptors": table.desc.iter().enumerate().map(|(slot, d)| descriptor_json(slot, d)).collect::<Vec<_>>(),
    })
}

fn descriptor_json(slot: usize, d: &Osii) -> serde_json::Value {
    json!({
        "slot": slot,
        "os_rev_major": d.os_rev_major,
        "os_rev_minor": d.os_rev_minor,
        "logical_start_block": d.logical_start_block,
        "ddr_load_address": d.ddr_load_address,
        "entry_point": d.entry_point,
        "size_of_os_image": d.size_of_os_image,
        "attribute": d.attribute,
    })
}
