use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, trace};

use crate::cpu::Cpu;
use crate::error::Chip8Error;
use crate::framebuffer::FrameBuffer;
use crate::profile::Profile;

/// Requests accepted by the run loop, handled in the order sent.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    /// Toggle between running and paused.
    Pause,
    /// Execute exactly one instruction. Ignored unless paused.
    Step,
    /// Replace the pressed-key bitmask.
    SetKeyMap(u16),
    /// Stop the loop.
    Close,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum State {
    Running,
    Paused,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

// A periodic trigger. Deadlines missed by more than one period are dropped
// rather than replayed in a burst.
#[derive(Debug)]
struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    fn new(period: Duration, now: Instant) -> Self {
        Self {
            period,
            next: now + period,
        }
    }

    fn due(&self, now: Instant) -> bool {
        now >= self.next
    }

    fn advance(&mut self, now: Instant) {
        self.next += self.period;
        if self.next <= now {
            self.next = now + self.period;
        }
    }
}

/// Owns the Cpu and serialises every mutation of it: instruction cycles,
/// 60 Hz timer ticks and inbound commands are handled one at a time on a
/// single thread.
pub(crate) struct Scheduler {
    cpu: Cpu,
    profile: Profile,
    state: State,
    commands: Receiver<Command>,
}

impl Scheduler {
    pub(crate) fn new(cpu: Cpu, profile: Profile, commands: Receiver<Command>) -> Self {
        let state = if profile.start_paused() {
            State::Paused
        } else {
            State::Running
        };

        Self {
            cpu,
            profile,
            state,
            commands,
        }
    }

    /// Starts the run loop on its own thread.
    pub(crate) fn spawn(cpu: Cpu, profile: Profile) -> Result<SchedulerHandle, Chip8Error> {
        let (tx, rx) = mpsc::channel();
        let frame_buffer = cpu.frame_buffer();
        let mut scheduler = Self::new(cpu, profile, rx);

        let thread = thread::Builder::new()
            .name("chip8-scheduler".into())
            .spawn(move || -> Result<Cpu, Chip8Error> {
                scheduler.run()?;
                Ok(scheduler.into_cpu())
            })
            .map_err(Chip8Error::Spawn)?;

        Ok(SchedulerHandle {
            commands: tx,
            frame_buffer,
            thread: Some(thread),
        })
    }

    pub(crate) fn into_cpu(self) -> Cpu {
        self.cpu
    }

    /// Runs until `Close` arrives, every sender is gone, or the Cpu fails.
    /// Both triggers live only as long as this call.
    pub(crate) fn run(&mut self) -> Result<(), Chip8Error> {
        let now = Instant::now();
        let mut cycles = Ticker::new(self.profile.cycle_period(), now);
        let mut timers = Ticker::new(self.profile.timer_period(), now);

        info!(
            "Scheduler started [ips: {}] [timer: {} Hz] [state: {:?}]",
            self.profile.instructions_per_second(),
            self.profile.timer_hz(),
            self.state
        );

        loop {
            // commands first, so Close is honoured even when running behind
            match self.commands.try_recv() {
                Ok(command) => {
                    if self.handle(command)? == Flow::Stop {
                        break;
                    }
                    continue;
                }
                Err(TryRecvError::Disconnected) => {
                    debug!("Command channel closed");
                    break;
                }
                Err(TryRecvError::Empty) => {}
            }

            let now = Instant::now();

            if timers.due(now) {
                timers.advance(now);
                self.cpu.tick();
                continue;
            }

            if cycles.due(now) {
                cycles.advance(now);
                if self.state == State::Running {
                    self.step()?;
                }
                continue;
            }

            let wait = cycles.next.min(timers.next).saturating_duration_since(now);
            match self.commands.recv_timeout(wait) {
                Ok(command) => {
                    if self.handle(command)? == Flow::Stop {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Command channel closed");
                    break;
                }
            }
        }

        info!("Scheduler stopped [pc: {:04X}]", self.cpu.pc());
        Ok(())
    }

    fn handle(&mut self, command: Command) -> Result<Flow, Chip8Error> {
        debug!("Command: {command:?}");

        match command {
            Command::Pause => {
                self.state = match self.state {
                    State::Running => State::Paused,
                    State::Paused => State::Running,
                };
                debug!("State: {:?}", self.state);
            }
            Command::Step => {
                if self.state == State::Paused {
                    self.step()?;
                }
            }
            Command::SetKeyMap(keys) => self.cpu.key_state().set(keys),
            Command::Close => return Ok(Flow::Stop),
        }

        Ok(Flow::Continue)
    }

    fn step(&mut self) -> Result<(), Chip8Error> {
        match self.cpu.cycle() {
            Ok((pc, op)) => {
                trace!("{pc:04X} [{:04X}] {op}", op.word());
                trace!("{}", self.cpu);
                Ok(())
            }
            Err(e) => {
                error!("Halting at {:04X}: {e}", self.cpu.pc());
                Err(e)
            }
        }
    }
}

/// The outside view of a running scheduler. Commands are fire-and-forget.
/// Dropping the handle closes the loop and waits for it.
pub(crate) struct SchedulerHandle {
    commands: Sender<Command>,
    frame_buffer: Arc<FrameBuffer>,
    thread: Option<JoinHandle<Result<Cpu, Chip8Error>>>,
}

impl SchedulerHandle {
    /// Queues a command. Once the loop has exited this does nothing.
    pub(crate) fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Scheduler gone, dropped {command:?}");
        }
    }

    pub(crate) fn pause(&self) {
        self.send(Command::Pause);
    }

    pub(crate) fn step(&self) {
        self.send(Command::Step);
    }

    pub(crate) fn set_key_map(&self, keys: u16) {
        self.send(Command::SetKeyMap(keys));
    }

    pub(crate) fn close(&self) {
        self.send(Command::Close);
    }

    #[must_use]
    pub(crate) fn frame_buffer(&self) -> Arc<FrameBuffer> {
        Arc::clone(&self.frame_buffer)
    }

    #[must_use]
    pub(crate) fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the loop to exit, returning the final machine or the
    /// error that stopped it. Does not close the loop by itself.
    pub(crate) fn join(mut self) -> Result<Cpu, Chip8Error> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| Chip8Error::SchedulerPanicked)?,
            None => Err(Chip8Error::SchedulerPanicked),
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.close();
            if thread.join().is_err() {
                error!("Scheduler thread panicked");
            }
        }
    }
}
