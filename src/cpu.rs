use std::fmt;
use std::io::Read;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use log::info;
use rand::RngCore;

use crate::error::Chip8Error;
use crate::framebuffer::FrameBuffer;
use crate::opcode::{Opcode, Operation, OP_WIDTH};

const CHIP8_FONTSET: [u8; 80] = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];

const FONT_GLYPH_LEN: u16 = 5;
const MEMORY_SIZE: usize = 4096;
const PROGRAM_START: u16 = 0x200;
pub(crate) const MAX_ROM_SIZE: usize = MEMORY_SIZE - PROGRAM_START as usize;
const STACK_SIZE: usize = 32;

fn mem_index(addr: u16) -> usize {
    usize::from(addr) % MEMORY_SIZE
}

fn key_pressed(keys: u16, key: u8) -> bool {
    key < 16 && keys & (1 << key) != 0
}

/// The pressed state of the 16 virtual keys, bit `k` set while key `k` is
/// held. One writer (the input source), read by value once per cycle.
#[derive(Debug, Clone, Default)]
pub(crate) struct KeyState(Arc<AtomicU16>);

impl KeyState {
    pub(crate) fn set(&self, keys: u16) {
        self.0.store(keys, Ordering::Relaxed);
    }

    #[must_use]
    pub(crate) fn get(&self) -> u16 {
        self.0.load(Ordering::Relaxed)
    }
}

pub(crate) struct Cpu {
    v: [u8; 16], // registers, VF doubles as the flag register

    i: u16, // only ever meaningful as a 12-bit address

    pc: u16,

    // 0x000-0x04F - font set
    // 0x200-0xFFF - program ROM and work RAM
    memory: [u8; MEMORY_SIZE],

    fb: Arc<FrameBuffer>,

    delay_timer: u8,
    sound_timer: u8,

    // sp points at the most recent return address; slot 0 is never written
    stack: [u16; STACK_SIZE],
    sp: u8,

    keys: KeyState,
    // key bitmask as sampled by the previous cycle, for LD Vx, K
    last_keys: u16,

    rng: Box<dyn RngCore + Send>,
}

impl Cpu {
    /// Builds a machine with the font set at 0 and `rom` at 0x200.
    pub(crate) fn new(rom: &mut dyn Read, rng: Box<dyn RngCore + Send>) -> Result<Self, Chip8Error> {
        // one byte past the limit is enough to tell an oversized image apart
        let mut rom_data = Vec::with_capacity(MAX_ROM_SIZE + 1);
        rom.take(MAX_ROM_SIZE as u64 + 1)
            .read_to_end(&mut rom_data)
            .map_err(Chip8Error::RomLoad)?;

        if rom_data.len() > MAX_ROM_SIZE {
            return Err(Chip8Error::RomTooLarge {
                size: rom_data.len(),
                max_size: MAX_ROM_SIZE,
            });
        }

        let mut memory = [0_u8; MEMORY_SIZE];
        memory[..CHIP8_FONTSET.len()].copy_from_slice(&CHIP8_FONTSET);
        let start = usize::from(PROGRAM_START);
        memory[start..start + rom_data.len()].copy_from_slice(&rom_data);

        info!("Loaded ROM [size: {}]", rom_data.len());

        Ok(Self {
            v: [0; 16],
            i: 0,
            pc: PROGRAM_START,
            memory,
            fb: Arc::new(FrameBuffer::new()),
            delay_timer: 0,
            sound_timer: 0,
            stack: [0; STACK_SIZE],
            sp: 0,
            keys: KeyState::default(),
            last_keys: 0,
            rng,
        })
    }

    #[must_use]
    pub(crate) fn frame_buffer(&self) -> Arc<FrameBuffer> {
        Arc::clone(&self.fb)
    }

    #[must_use]
    pub(crate) fn key_state(&self) -> KeyState {
        self.keys.clone()
    }

    #[must_use]
    pub(crate) fn pc(&self) -> u16 {
        self.pc
    }

    #[cfg(test)]
    pub(crate) fn register(&self, x: usize) -> u8 {
        self.v[x]
    }

    #[cfg(test)]
    pub(crate) fn delay_timer(&self) -> u8 {
        self.delay_timer
    }

    /// Counts both timers down by one, stopping at zero. Called at 60 Hz.
    pub(crate) fn tick(&mut self) {
        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);
    }

    fn fetch(&self) -> Opcode {
        Opcode::new(u16::from_be_bytes([
            self.memory[mem_index(self.pc)],
            self.memory[mem_index(self.pc.wrapping_add(1))],
        ]))
    }

    fn carry(&mut self, val: bool) {
        self.v[0xF] = u8::from(val);
    }

    fn skip_if(cond: bool) -> u16 {
        if cond {
            OP_WIDTH * 2
        } else {
            OP_WIDTH
        }
    }

    /// Executes the instruction at PC. Returns the address it was fetched
    /// from along with the opcode itself.
    pub(crate) fn cycle(&mut self) -> Result<(u16, Opcode), Chip8Error> {
        let pc = self.pc;
        let o = self.fetch();
        let keys = self.keys.get();

        let pc_inc = match o.operation()? {
            Operation::Cls => {
                self.fb.clear();
                OP_WIDTH
            }
            Operation::Ret => {
                self.pc = self.stack[usize::from(self.sp) % STACK_SIZE];
                self.sp = self.sp.wrapping_sub(1);
                0
            }
            // 0NNN machine code routines are ignored
            Operation::Sys => OP_WIDTH,
            Operation::JpAddr => {
                self.pc = o.addr();
                0
            }
            Operation::CallAddr => {
                self.sp = self.sp.wrapping_add(1);
                self.stack[usize::from(self.sp) % STACK_SIZE] = self.pc.wrapping_add(OP_WIDTH);
                self.pc = o.addr();
                0
            }
            Operation::SeVxByte => Self::skip_if(self.v[o.vx()] == o.byte()),
            Operation::SneVxByte => Self::skip_if(self.v[o.vx()] != o.byte()),
            Operation::SeVxVy => Self::skip_if(self.v[o.vx()] == self.v[o.vy()]),
            Operation::SneVxVy => Self::skip_if(self.v[o.vx()] != self.v[o.vy()]),
            Operation::LdVxByte => {
                self.v[o.vx()] = o.byte();
                OP_WIDTH
            }
            Operation::AddVxByte => {
                self.v[o.vx()] = self.v[o.vx()].wrapping_add(o.byte());
                OP_WIDTH
            }
            Operation::LdVxVy => {
                self.v[o.vx()] = self.v[o.vy()];
                OP_WIDTH
            }
            Operation::OrVxVy => self.op_or_vx_vy(o),
            Operation::AndVxVy => self.op_and_vx_vy(o),
            Operation::XorVxVy => self.op_xor_vx_vy(o),
            Operation::AddVxVy => self.op_add_vx_vy(o),
            Operation::SubVxVy => self.op_sub_vx_vy(o),
            Operation::ShrVxVy => self.op_shr_vx_vy(o),
            Operation::SubnVxVy => self.op_subn_vx_vy(o),
            Operation::ShlVxVy => self.op_shl_vx_vy(o),
            Operation::LdIAddr => {
                self.i = o.addr();
                OP_WIDTH
            }
            Operation::JpV0Addr => {
                self.pc = o.addr().wrapping_add(u16::from(self.v[0]));
                0
            }
            Operation::RndVxByte => {
                let random = self.rng.next_u32().to_le_bytes()[0];
                self.v[o.vx()] = random & o.byte();
                OP_WIDTH
            }
            Operation::DrwVxVyNibble => self.op_drw_vx_vy_nibble(o),
            Operation::SkpVx => Self::skip_if(key_pressed(keys, self.v[o.vx()])),
            Operation::SknpVx => Self::skip_if(!key_pressed(keys, self.v[o.vx()])),
            Operation::LdVxDt => {
                self.v[o.vx()] = self.delay_timer;
                OP_WIDTH
            }
            Operation::LdVxK => self.op_ld_vx_k(o, keys),
            Operation::LdDtVx => {
                self.delay_timer = self.v[o.vx()];
                OP_WIDTH
            }
            Operation::LdStVx => {
                self.sound_timer = self.v[o.vx()];
                OP_WIDTH
            }
            Operation::AddIVx => {
                self.i = self.i.wrapping_add(u16::from(self.v[o.vx()]));
                OP_WIDTH
            }
            Operation::LdFVx => {
                self.i = u16::from(self.v[o.vx()]) * FONT_GLYPH_LEN;
                OP_WIDTH
            }
            Operation::LdBVx => self.op_ld_b_vx(o),
            Operation::LdIVx => self.op_ld_i_vx(o),
            Operation::LdVxI => self.op_ld_vx_i(o),
        };

        self.pc = self.pc.wrapping_add(pc_inc);
        self.last_keys = keys;

        Ok((pc, o))
    }

    fn op_or_vx_vy(&mut self, o: Opcode) -> u16 {
        self.v[o.vx()] |= self.v[o.vy()];
        self.carry(false);
        OP_WIDTH
    }

    fn op_and_vx_vy(&mut self, o: Opcode) -> u16 {
        self.v[o.vx()] &= self.v[o.vy()];
        self.carry(false);
        OP_WIDTH
    }

    fn op_xor_vx_vy(&mut self, o: Opcode) -> u16 {
        self.v[o.vx()] ^= self.v[o.vy()];
        self.carry(false);
        OP_WIDTH
    }

    fn op_add_vx_vy(&mut self, o: Opcode) -> u16 {
        let (sum, overflow) = self.v[o.vx()].overflowing_add(self.v[o.vy()]);
        self.v[o.vx()] = sum;
        self.carry(overflow);
        OP_WIDTH
    }

    fn op_sub_vx_vy(&mut self, o: Opcode) -> u16 {
        let (x, y) = (self.v[o.vx()], self.v[o.vy()]);
        self.v[o.vx()] = x.wrapping_sub(y);
        self.carry(x > y);
        OP_WIDTH
    }

    fn op_subn_vx_vy(&mut self, o: Opcode) -> u16 {
        let (x, y) = (self.v[o.vx()], self.v[o.vy()]);
        self.v[o.vx()] = y.wrapping_sub(x);
        self.carry(y > x);
        OP_WIDTH
    }

    fn op_shr_vx_vy(&mut self, o: Opcode) -> u16 {
        let y = self.v[o.vy()];
        self.v[o.vx()] = y >> 1;
        self.carry(y & 0x01 == 0x01);
        OP_WIDTH
    }

    fn op_shl_vx_vy(&mut self, o: Opcode) -> u16 {
        let y = self.v[o.vy()];
        self.v[o.vx()] = y << 1;
        self.carry(y & 0x80 == 0x80);
        OP_WIDTH
    }

    fn op_drw_vx_vy_nibble(&mut self, o: Opcode) -> u16 {
        let sprite: Vec<u8> = (0..u16::from(o.nibble()))
            .map(|row| self.memory[mem_index(self.i.wrapping_add(row))])
            .collect();
        let collision = self.fb.draw(&sprite, self.v[o.vx()], self.v[o.vy()]);
        self.carry(collision);
        OP_WIDTH
    }

    // Completes once a key that was held at the previous cycle has been
    // released, storing the lowest such key. Otherwise PC stays put.
    fn op_ld_vx_k(&mut self, o: Opcode, keys: u16) -> u16 {
        let released = self.last_keys & !keys;
        if released == 0 {
            return 0;
        }

        // trailing_zeros of a non-zero u16 is at most 15
        self.v[o.vx()] = released.trailing_zeros().to_le_bytes()[0];
        OP_WIDTH
    }

    fn op_ld_b_vx(&mut self, o: Opcode) -> u16 {
        let x = self.v[o.vx()];
        for (offset, digit) in (0_u16..).zip([x / 100, (x / 10) % 10, x % 10]) {
            self.memory[mem_index(self.i.wrapping_add(offset))] = digit;
        }
        OP_WIDTH
    }

    // V0..=Vx
    // LD [I], Vx: store V0..=Vx at I
    fn op_ld_i_vx(&mut self, o: Opcode) -> u16 {
        let mut count = 0_u16;
        for x in 0..=o.vx() {
            self.memory[mem_index(self.i.wrapping_add(count))] = self.v[x];
            count += 1;
        }
        self.i = self.i.wrapping_add(count);
        OP_WIDTH
    }

    // LD Vx, [I]: fill V0..=Vx from I
    fn op_ld_vx_i(&mut self, o: Opcode) -> u16 {
        let mut count = 0_u16;
        for x in 0..=o.vx() {
            self.v[x] = self.memory[mem_index(self.i.wrapping_add(count))];
            count += 1;
        }
        self.i = self.i.wrapping_add(count);
        OP_WIDTH
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "pc:{:04x} sp:{:02} i:{:04x} dt:{:02} st:{:02} km:{:016b}",
            self.pc,
            self.sp,
            self.i,
            self.delay_timer,
            self.sound_timer,
            self.keys.get()
        )?;
        for (x, value) in self.v.iter().enumerate() {
            if x > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{x:X}:{value:02x}")?;
        }
        Ok(())
    }
}
