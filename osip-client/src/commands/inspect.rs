//! Handler for `osip inspect`: hexdump the head of a slot's payload region.

use super::open_storage;
use crate::{CommandContext, InspectArgs};
use osip_storage::device::DEVICE_BLOCK_SIZE;

const BYTES_PER_ROW: usize = 16;

pub fn handle(args: &InspectArgs, ctx: &CommandContext) -> anyhow::Result<()> {
    let mut storage = open_storage(ctx)?;

    // read_payload rejects out-of-range slots before the index below runs.
    let data = storage.read_payload(args.slot, args.length)?;
    let report = storage.check()?;
    let lba = report.primary.desc[args.slot].logical_start_block;

    let base = u64::from(lba) * u64::from(DEVICE_BLOCK_SIZE);
    for (row, chunk) in data.chunks(BYTES_PER_ROW).enumerate() {
        println!(
            "{:08x}  {}",
            base + (row * BYTES_PER_ROW) as u64,
            hex::encode(chunk)
        );
    }

    Ok(())
}
