use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum Chip8Error {
    #[error("error loading rom")]
    RomLoad(#[source] io::Error),

    #[error("rom is too large ({size} bytes), max size is {max_size} bytes")]
    RomTooLarge { size: usize, max_size: usize },

    #[error("unrecognised opcode {0:#06X}")]
    UnrecognizedOpcode(u16),

    #[error("failed to start the scheduler thread")]
    Spawn(#[source] io::Error),

    #[error("scheduler thread terminated abnormally")]
    SchedulerPanicked,
}
