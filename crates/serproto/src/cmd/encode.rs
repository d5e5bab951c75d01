use serproto_conn::CommandTable;
use serproto_frame::frame_for_command;

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_frame, Direction, FrameRecord, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let table = CommandTable::new(args.table.load()?)
        .map_err(|err| frame_error("invalid command table", err))?;
    let frame = frame_for_command(&table, &args.command, args.value)
        .map_err(|err| frame_error("encode failed", err))?;

    print_frame(
        &FrameRecord {
            direction: Direction::Encoded,
            port: None,
            key: &table.key_for(frame.command_id),
            frame,
        },
        format,
    );
    Ok(SUCCESS)
}
