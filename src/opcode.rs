use std::fmt;

use crate::error::Chip8Error;

pub(crate) const OP_WIDTH: u16 = 2;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Operation {
    Cls,
    Ret,
    Sys,
    JpAddr,
    CallAddr,
    SeVxByte,
    SneVxByte,
    SeVxVy,
    LdVxByte,
    AddVxByte,
    LdVxVy,
    OrVxVy,
    AndVxVy,
    XorVxVy,
    AddVxVy,
    SubVxVy,
    ShrVxVy,
    SubnVxVy,
    ShlVxVy,
    SneVxVy,
    LdIAddr,
    JpV0Addr,
    RndVxByte,
    DrwVxVyNibble,
    SkpVx,
    SknpVx,
    LdVxDt,
    LdVxK,
    LdDtVx,
    LdStVx,
    AddIVx,
    LdFVx,
    LdBVx,
    LdIVx,
    LdVxI,
}

// (operation, value, mask): matches when word & mask == value.
// CLS and RET must be tested before the SYS catch-all for 0NNN.
const OPERATIONS: [(Operation, u16, u16); 35] = [
    (Operation::Cls, 0x00E0, 0xFFFF),
    (Operation::Ret, 0x00EE, 0xFFFF),
    (Operation::Sys, 0x0000, 0xF000),
    (Operation::JpAddr, 0x1000, 0xF000),
    (Operation::CallAddr, 0x2000, 0xF000),
    (Operation::SeVxByte, 0x3000, 0xF000),
    (Operation::SneVxByte, 0x4000, 0xF000),
    (Operation::SeVxVy, 0x5000, 0xF00F),
    (Operation::LdVxByte, 0x6000, 0xF000),
    (Operation::AddVxByte, 0x7000, 0xF000),
    (Operation::LdVxVy, 0x8000, 0xF00F),
    (Operation::OrVxVy, 0x8001, 0xF00F),
    (Operation::AndVxVy, 0x8002, 0xF00F),
    (Operation::XorVxVy, 0x8003, 0xF00F),
    (Operation::AddVxVy, 0x8004, 0xF00F),
    (Operation::SubVxVy, 0x8005, 0xF00F),
    (Operation::ShrVxVy, 0x8006, 0xF00F),
    (Operation::SubnVxVy, 0x8007, 0xF00F),
    (Operation::ShlVxVy, 0x800E, 0xF00F),
    (Operation::SneVxVy, 0x9000, 0xF00F),
    (Operation::LdIAddr, 0xA000, 0xF000),
    (Operation::JpV0Addr, 0xB000, 0xF000),
    (Operation::RndVxByte, 0xC000, 0xF000),
    (Operation::DrwVxVyNibble, 0xD000, 0xF000),
    (Operation::SkpVx, 0xE09E, 0xF0FF),
    (Operation::SknpVx, 0xE0A1, 0xF0FF),
    (Operation::LdVxDt, 0xF007, 0xF0FF),
    (Operation::LdVxK, 0xF00A, 0xF0FF),
    (Operation::LdDtVx, 0xF015, 0xF0FF),
    (Operation::LdStVx, 0xF018, 0xF0FF),
    (Operation::AddIVx, 0xF01E, 0xF0FF),
    (Operation::LdFVx, 0xF029, 0xF0FF),
    (Operation::LdBVx, 0xF033, 0xF0FF),
    (Operation::LdIVx, 0xF055, 0xF0FF),
    (Operation::LdVxI, 0xF065, 0xF0FF),
];

/// A raw 16-bit instruction word.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Opcode(u16);

impl Opcode {
    #[must_use]
    pub(crate) fn new(word: u16) -> Self {
        Self(word)
    }

    #[must_use]
    pub(crate) fn word(self) -> u16 {
        self.0
    }

    /// Looks the word up in the operation table.
    pub(crate) fn operation(self) -> Result<Operation, Chip8Error> {
        OPERATIONS
            .iter()
            .find(|&&(_, value, mask)| self.0 & mask == value)
            .map(|&(operation, _, _)| operation)
            .ok_or(Chip8Error::UnrecognizedOpcode(self.0))
    }

    #[must_use]
    pub(crate) fn addr(self) -> u16 {
        self.0 & 0x0FFF
    }

    #[must_use]
    pub(crate) fn vx(self) -> usize {
        usize::from((self.0 >> 8) & 0x0F)
    }

    #[must_use]
    pub(crate) fn vy(self) -> usize {
        usize::from((self.0 >> 4) & 0x0F)
    }

    #[must_use]
    pub(crate) fn byte(self) -> u8 {
        self.0.to_be_bytes()[1]
    }

    #[must_use]
    pub(crate) fn nibble(self) -> u8 {
        self.byte() & 0x0F
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(operation) = self.operation() else {
            return write!(f, "???? {:04X}", self.0);
        };

        let (x, y, addr, byte) = (self.vx(), self.vy(), self.addr(), self.byte());

        match operation {
            Operation::Cls => write!(f, "CLS"),
            Operation::Ret => write!(f, "RET"),
            Operation::Sys => write!(f, "SYS {addr:03X}"),
            Operation::JpAddr => write!(f, "JP {addr:03X}"),
            Operation::CallAddr => write!(f, "CALL {addr:03X}"),
            Operation::SeVxByte => write!(f, "SE V{x:X}, {byte:02X}"),
            Operation::SneVxByte => write!(f, "SNE V{x:X}, {byte:02X}"),
            Operation::SeVxVy => write!(f, "SE V{x:X}, V{y:X}"),
            Operation::LdVxByte => write!(f, "LD V{x:X}, {byte:02X}"),
            Operation::AddVxByte => write!(f, "ADD V{x:X}, {byte:02X}"),
            Operation::LdVxVy => write!(f, "LD V{x:X}, V{y:X}"),
            Operation::OrVxVy => write!(f, "OR V{x:X}, V{y:X}"),
            Operation::AndVxVy => write!(f, "AND V{x:X}, V{y:X}"),
            Operation::XorVxVy => write!(f, "XOR V{x:X}, V{y:X}"),
            Operation::AddVxVy => write!(f, "ADD V{x:X}, V{y:X}"),
            Operation::SubVxVy => write!(f, "SUB V{x:X}, V{y:X}"),
            Operation::ShrVxVy => write!(f, "SHR V{x:X}, V{y:X}"),
            Operation::SubnVxVy => write!(f, "SUBN V{x:X}, V{y:X}"),
            Operation::ShlVxVy => write!(f, "SHL V{x:X}, V{y:X}"),
            Operation::SneVxVy => write!(f, "SNE V{x:X}, V{y:X}"),
            Operation::LdIAddr => write!(f, "LD I, {addr:03X}"),
            Operation::JpV0Addr => write!(f, "JP V0, {addr:03X}"),
            Operation::RndVxByte => write!(f, "RND V{x:X}, {byte:02X}"),
            Operation::DrwVxVyNibble => write!(f, "DRW V{x:X}, V{y:X}, {:X}", self.nibble()),
            Operation::SkpVx => write!(f, "SKP V{x:X}"),
            Operation::SknpVx => write!(f, "SKNP V{x:X}"),
            Operation::LdVxDt => write!(f, "LD V{x:X}, DT"),
            Operation::LdVxK => write!(f, "LD V{x:X}, K"),
            Operation::LdDtVx => write!(f, "LD DT, V{x:X}"),
            Operation::LdStVx => write!(f, "LD ST, V{x:X}"),
            Operation::AddIVx => write!(f, "ADD I, V{x:X}"),
            Operation::LdFVx => write!(f, "LD F, V{x:X}"),
            Operation::LdBVx => write!(f, "LD B, V{x:X}"),
            Operation::LdIVx => write!(f, "LD [I], V{x:X}"),
            Operation::LdVxI => write!(f, "LD V{x:X}, [I]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_fields() {
        let op = Opcode::new(0xD12F);
        assert_eq!(op.addr(), 0x012F);
        assert_eq!(op.vx(), 0x1);
        assert_eq!(op.vy(), 0x2);
        assert_eq!(op.byte(), 0x2F);
        assert_eq!(op.nibble(), 0xF);
    }

    #[test]
    fn test_cls_and_ret_win_over_sys() {
        assert_eq!(Opcode::new(0x00E0).operation().unwrap(), Operation::Cls);
        assert_eq!(Opcode::new(0x00EE).operation().unwrap(), Operation::Ret);
        assert_eq!(Opcode::new(0x0123).operation().unwrap(), Operation::Sys);
    }

    #[test]
    fn test_decodes_full_instruction_set() {
        let cases = [
            (0x1ABC, Operation::JpAddr),
            (0x2ABC, Operation::CallAddr),
            (0x3A10, Operation::SeVxByte),
            (0x4A10, Operation::SneVxByte),
            (0x5AB0, Operation::SeVxVy),
            (0x6A10, Operation::LdVxByte),
            (0x7A10, Operation::AddVxByte),
            (0x8AB0, Operation::LdVxVy),
            (0x8AB1, Operation::OrVxVy),
            (0x8AB2, Operation::AndVxVy),
            (0x8AB3, Operation::XorVxVy),
            (0x8AB4, Operation::AddVxVy),
            (0x8AB5, Operation::SubVxVy),
            (0x8AB6, Operation::ShrVxVy),
            (0x8AB7, Operation::SubnVxVy),
            (0x8ABE, Operation::ShlVxVy),
            (0x9AB0, Operation::SneVxVy),
            (0xAABC, Operation::LdIAddr),
            (0xBABC, Operation::JpV0Addr),
            (0xCA10, Operation::RndVxByte),
            (0xDAB5, Operation::DrwVxVyNibble),
            (0xEA9E, Operation::SkpVx),
            (0xEAA1, Operation::SknpVx),
            (0xFA07, Operation::LdVxDt),
            (0xFA0A, Operation::LdVxK),
            (0xFA15, Operation::LdDtVx),
            (0xFA18, Operation::LdStVx),
            (0xFA1E, Operation::AddIVx),
            (0xFA29, Operation::LdFVx),
            (0xFA33, Operation::LdBVx),
            (0xFA55, Operation::LdIVx),
            (0xFA65, Operation::LdVxI),
        ];

        for (word, expected) in cases {
            assert_eq!(Opcode::new(word).operation().unwrap(), expected, "{word:04X}");
        }
    }

    #[test]
    fn test_unrecognised_words() {
        for word in [0x5AB1, 0x8AB8, 0x9AB1, 0xEA00, 0xF0FF, 0xFFFF] {
            match Opcode::new(word).operation() {
                Err(Chip8Error::UnrecognizedOpcode(raw)) => assert_eq!(raw, word),
                other => panic!("{word:04X} decoded as {other:?}"),
            }
        }
    }

    #[test]
    fn test_mnemonics() {
        assert_eq!(Opcode::new(0x00E0).to_string(), "CLS");
        assert_eq!(Opcode::new(0x1234).to_string(), "JP 234");
        assert_eq!(Opcode::new(0x8AB4).to_string(), "ADD VA, VB");
        assert_eq!(Opcode::new(0xD015).to_string(), "DRW V0, V1, 5");
        assert_eq!(Opcode::new(0xF355).to_string(), "LD [I], V3");
        assert_eq!(Opcode::new(0xF365).to_string(), "LD V3, [I]");
        assert_eq!(Opcode::new(0xFFFF).to_string(), "???? FFFF");
    }
}
