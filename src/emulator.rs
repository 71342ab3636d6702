use std::fs::File;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::cpu::Cpu;
use crate::framebuffer::FrameBuffer;
use crate::hardware::Hardware;
use crate::profile::Profile;
use crate::scheduler::{Command, Scheduler, SchedulerHandle};

const REFRESH: Duration = Duration::from_millis(1_000 / 60);

/// Parses one controller line. Blank lines yield nothing.
fn parse_command(line: &str) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let command = match verb {
        "p" | "pause" => Command::Pause,
        "s" | "step" => Command::Step,
        "q" | "quit" => Command::Close,
        "k" | "keys" => {
            let mask = words.next().context("missing key bitmask")?;
            let digits = mask.trim_start_matches("0x");
            let keys = u16::from_str_radix(digits, 16)
                .with_context(|| format!("invalid key bitmask {mask:?}"))?;
            Command::SetKeyMap(keys)
        }
        other => bail!("unknown command {other:?}"),
    };

    if let Some(extra) = words.next() {
        bail!("unexpected argument {extra:?}");
    }

    Ok(Some(command))
}

/// Owns a session: the running scheduler, the renderer it feeds and the
/// controller commands that steer it.
pub(super) struct Emulator<W: Write> {
    hardware: Hardware<W>,
    frame_buffer: Arc<FrameBuffer>,
    scheduler: SchedulerHandle,
}

impl<W: Write> Emulator<W> {
    pub(super) fn new(profile: Profile, filename: &Path, out: W) -> Result<Self> {
        let mut f = File::open(filename)
            .with_context(|| format!("could not open rom file {}", filename.display()))?;

        let cpu = Cpu::new(&mut f, Box::new(StdRng::from_entropy()))
            .with_context(|| format!("could not load {}", filename.display()))?;

        let scheduler = Scheduler::spawn(cpu, profile)?;

        Ok(Self {
            hardware: Hardware::new(out),
            frame_buffer: scheduler.frame_buffer(),
            scheduler,
        })
    }

    /// Reads controller lines on a background thread and hands them over as
    /// commands. The channel disconnects at end of input.
    fn spawn_controller<R: BufRead + Send + 'static>(input: R) -> Result<Receiver<Command>> {
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("chip8-controller".into())
            .spawn(move || {
                for line in input.lines() {
                    let Ok(line) = line else {
                        break;
                    };
                    match parse_command(&line) {
                        Ok(Some(command)) => {
                            if tx.send(command).is_err() {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!("{e:#}"),
                    }
                }
            })
            .context("could not start controller thread")?;

        Ok(rx)
    }

    /// Repaints at 60 Hz and forwards controller input until the scheduler
    /// stops, then reports how it stopped. End of input closes the session.
    pub(super) fn process<R: BufRead + Send + 'static>(mut self, input: R) -> Result<()> {
        let controls = Self::spawn_controller(input)?;
        let mut controller_open = true;

        loop {
            let start = Instant::now();

            let frame = self.frame_buffer.snapshot();
            if frame.dirty {
                self.hardware.refresh_graphics(&frame)?;
            }

            while controller_open {
                match controls.try_recv() {
                    Ok(command) => self.dispatch(command),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        info!("Controller input closed");
                        controller_open = false;
                        self.scheduler.close();
                    }
                }
            }

            if self.scheduler.is_finished() {
                break;
            }

            thread::sleep(REFRESH.saturating_sub(start.elapsed()));
        }

        let cpu = self.scheduler.join().context("emulation stopped")?;
        info!("Session ended [pc: {:04X}]", cpu.pc());

        Ok(())
    }

    fn dispatch(&self, command: Command) {
        match command {
            Command::Pause => self.scheduler.pause(),
            Command::Step => self.scheduler.step(),
            Command::SetKeyMap(keys) => self.scheduler.set_key_map(keys),
            Command::Close => self.scheduler.close(),
        }
    }
}
