//! A CHIP-8 virtual machine.
//!
//! The machine runs on its own scheduler thread at a fixed instruction rate
//! with 60 Hz timers. The display is painted to the terminal, and the session
//! is steered with commands typed on stdin, one per line:
//!
//! ```text
//! p | pause        toggle pause
//! s | step         execute one instruction while paused
//! k | keys <hex>   set the pressed-key bitmask, bit k for key k
//! q | quit         stop the machine
//! ```

use std::io::{self, BufReader};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

mod cpu;
mod emulator;
mod error;
mod framebuffer;
mod hardware;
mod opcode;
mod profile;
mod scheduler;

use crate::emulator::Emulator;
use crate::profile::{Profile, DEFAULT_INSTRUCTIONS_PER_SECOND, DEFAULT_TIMER_HZ};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(help = "ROM filename to load")]
    rom: PathBuf,

    #[arg(short, long, default_value_t = DEFAULT_INSTRUCTIONS_PER_SECOND, help = "Instructions per second")]
    ips: u32,

    #[arg(short, long, default_value_t = DEFAULT_TIMER_HZ, help = "Timer rate in Hz")]
    timer_hz: u32,

    #[arg(short, long, help = "Start paused")]
    paused: bool,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let profile = Profile::new(args.ips, args.timer_hz, args.paused);

    let emulator = Emulator::new(profile, &args.rom, io::stdout())?;
    emulator.process(BufReader::new(io::stdin()))
}
