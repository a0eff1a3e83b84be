use std::fmt;

pub const ADDRESS_WIDTH: usize = 6;
pub const ADDRESS_LIMIT: usize = 1usize << ADDRESS_WIDTH;

/// every instruction is clocked out as one 32-bit word, MSB first
pub const WORD_BITS: usize = 32;

const START_BIT: u16 = 0x100;
const ADDRESS_MASK: u16 = (ADDRESS_LIMIT - 1) as u16;

// opcode << 6
const OP_EXTENDED: u16 = 0b00 << ADDRESS_WIDTH;
const OP_WRITE: u16 = 0b01 << ADDRESS_WIDTH;
const OP_READ: u16 = 0b10 << ADDRESS_WIDTH;
const OP_ERASE: u16 = 0b11 << ADDRESS_WIDTH;

// address bits selecting the extended (opcode 00) instructions
const EXT_EWDS: u16 = 0b00_0000;
const EXT_WRAL: u16 = 0b01_0000;
const EXT_ERAL: u16 = 0b10_0000;
const EXT_EWEN: u16 = 0b11_0000;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Command {
	WriteDisable,
	WriteAll(u16),
	EraseAll,
	WriteEnable,
	Write(u8, u16),
	Read(u8),
	Erase(u8),
}

impl Command {
	/// start bit, opcode and address (9 bits)
	pub fn instruction(&self) -> u16 {
		let address = |a: u8| {
			debug_assert!((a as usize) < ADDRESS_LIMIT);
			a as u16 & ADDRESS_MASK
		};
		START_BIT | match *self {
			Command::WriteDisable => OP_EXTENDED | EXT_EWDS,
			Command::WriteAll(_) => OP_EXTENDED | EXT_WRAL,
			Command::EraseAll => OP_EXTENDED | EXT_ERAL,
			Command::WriteEnable => OP_EXTENDED | EXT_EWEN,
			Command::Write(a, _) => OP_WRITE | address(a),
			Command::Read(a) => OP_READ | address(a),
			Command::Erase(a) => OP_ERASE | address(a),
		}
	}

	pub fn data(&self) -> Option<u16> {
		match *self {
			Command::WriteAll(data) | Command::Write(_, data) => Some(data),
			_ => None,
		}
	}

	/// whether the device answers with 16 data bits
	pub fn responds(&self) -> bool {
		match self {
			Command::Read(_) => true,
			_ => false,
		}
	}

	/// whether the device runs a self-timed erase/write cycle afterwards
	pub fn programs(&self) -> bool {
		match self {
			Command::WriteAll(_) | Command::EraseAll | Command::Write(..) | Command::Erase(_) => true,
			_ => false,
		}
	}

	/// 32-bit transmission word
	///
	/// Data commands carry the instruction in the high half and the data in
	/// the low half; all other instructions are right-aligned. The device
	/// ignores the leading zeros before the start bit.
	pub fn encode(&self) -> u32 {
		let instruction = self.instruction() as u32;
		match self.data() {
			Some(data) => (instruction << 16) | data as u32,
			None => instruction,
		}
	}

	pub fn mnemonic(&self) -> &'static str {
		match self {
			Command::WriteDisable => "EWDS",
			Command::WriteAll(_) => "WRAL",
			Command::EraseAll => "ERAL",
			Command::WriteEnable => "EWEN",
			Command::Write(..) => "WRITE",
			Command::Read(_) => "READ",
			Command::Erase(_) => "ERASE",
		}
	}
}

impl fmt::Display for Command {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			Command::Write(a, d) => write!(f, "WRITE @{:02x} {:04x}", a, d),
			Command::WriteAll(d) => write!(f, "WRAL {:04x}", d),
			Command::Read(a) => write!(f, "READ @{:02x}", a),
			Command::Erase(a) => write!(f, "ERASE @{:02x}", a),
			_ => f.write_str(self.mnemonic()),
		}
	}
}
