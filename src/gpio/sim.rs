//! In-memory 93C46 (64 x 16 bit) driven by line edges.
//!
//! Enough of the datasheet behaviour to exercise the protocol without
//! hardware: start bit detection, 2-bit opcode + 6-bit address, 16 data bits
//! for WRITE/WRAL, a dummy 0 bit before read data, the EWEN/EWDS latch and a
//! self-timed programming cycle during which DO reports BUSY (low) after chip
//! select. Time only advances through `sleep_microseconds`.

use crate::gpio::{
	GpioPort,
	Line,
};

pub const WORDS: usize = 64;

// typical tWC of a 93C46
const DEFAULT_PROGRAM_TIME_US: u64 = 4_000;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Program {
	Erase(usize),
	EraseAll,
	Write(usize, u16),
	WriteAll(u16),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
	// chip select low
	Standby,
	// selected, waiting for a start bit; DO shows READY/BUSY
	Idle,
	Instruction { bits: u16, count: u8 },
	Data { instruction: u16, bits: u16, count: u8 },
	// dummy 0 bit followed by 16 data bits, MSB first
	ReadOut { shift: u32, remaining: u8 },
	// instruction complete; programming starts when chip select drops
	Complete(Option<Program>),
}

pub struct SimulatedEeprom {
	words: [u16; WORDS],
	write_enabled: bool,
	stuck_busy: bool,
	program_time_us: u64,
	now_us: u64,
	busy_until_us: u64,
	chip_select: bool,
	clock: bool,
	data: bool,
	state: State,
	selects: usize,
	instructions: Vec<u16>,
}

impl Default for SimulatedEeprom {
	fn default() -> Self {
		SimulatedEeprom::with_words([0xffff; WORDS])
	}
}

impl SimulatedEeprom {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_words(words: [u16; WORDS]) -> Self {
		SimulatedEeprom {
			words,
			write_enabled: false,
			stuck_busy: false,
			program_time_us: DEFAULT_PROGRAM_TIME_US,
			now_us: 0,
			busy_until_us: 0,
			chip_select: false,
			clock: false,
			data: false,
			state: State::Standby,
			selects: 0,
			instructions: Vec::new(),
		}
	}

	pub fn set_program_time_us(&mut self, us: u64) {
		self.program_time_us = us;
	}

	/// never leave the BUSY state (a dead or missing device)
	pub fn set_stuck_busy(&mut self, stuck: bool) {
		self.stuck_busy = stuck;
	}

	pub fn words(&self) -> &[u16; WORDS] {
		&self.words
	}

	pub fn is_write_enabled(&self) -> bool {
		self.write_enabled
	}

	pub fn is_busy(&self) -> bool {
		self.stuck_busy || self.now_us < self.busy_until_us
	}

	/// how often chip select was raised
	pub fn selects(&self) -> usize {
		self.selects
	}

	/// every decoded 9-bit instruction (start bit, opcode, address)
	pub fn instructions(&self) -> &[u16] {
		&self.instructions
	}

	pub fn elapsed_us(&self) -> u64 {
		self.now_us
	}

	fn decode(&mut self, instruction: u16) -> State {
		self.instructions.push(instruction);
		let address = (instruction & 0x3f) as usize;
		match (instruction >> 6) & 0b11 {
			0b10 => State::ReadOut {
				shift: self.words[address] as u32,
				remaining: 17,
			},
			0b01 => State::Data { instruction, bits: 0, count: 0 },
			0b11 => State::Complete(Some(Program::Erase(address))),
			_ => match address >> 4 {
				0b00 => {
					self.write_enabled = false;
					State::Complete(None)
				},
				0b01 => State::Data { instruction, bits: 0, count: 0 },
				0b10 => State::Complete(Some(Program::EraseAll)),
				_ => {
					self.write_enabled = true;
					State::Complete(None)
				},
			},
		}
	}

	fn rising_clock(&mut self) {
		let bit = self.data as u16;
		self.state = match self.state {
			State::Standby => State::Standby,
			State::Idle => {
				// leading zeros are ignored, no instructions while busy
				if self.data && !self.is_busy() {
					State::Instruction { bits: 0, count: 0 }
				} else {
					State::Idle
				}
			},
			State::Instruction { bits, count } => {
				let bits = (bits << 1) | bit;
				if count + 1 == 8 {
					self.decode(0x100 | bits)
				} else {
					State::Instruction { bits, count: count + 1 }
				}
			},
			State::Data { instruction, bits, count } => {
				let bits = (bits << 1) | bit;
				if count + 1 < 16 {
					State::Data { instruction, bits, count: count + 1 }
				} else if instruction & 0xc0 == 0x40 {
					State::Complete(Some(Program::Write((instruction & 0x3f) as usize, bits)))
				} else {
					State::Complete(Some(Program::WriteAll(bits)))
				}
			},
			State::ReadOut { shift, remaining } => State::ReadOut {
				shift,
				remaining: remaining.saturating_sub(1),
			},
			State::Complete(p) => State::Complete(p),
		};
	}

	fn deselect(&mut self) {
		if let State::Complete(Some(program)) = self.state {
			if self.write_enabled {
				match program {
					Program::Erase(address) => self.words[address] = 0xffff,
					Program::EraseAll => self.words = [0xffff; WORDS],
					Program::Write(address, word) => self.words[address] = word,
					Program::WriteAll(word) => self.words = [word; WORDS],
				}
				self.busy_until_us = self.now_us + self.program_time_us;
			}
		}
		self.state = State::Standby;
	}
}

impl GpioPort for SimulatedEeprom {
	fn configure_output(&mut self, _line: Line) {
	}

	fn configure_input(&mut self, _line: Line) {
	}

	fn write_line(&mut self, line: Line, level: bool) {
		match line {
			Line::ChipSelect => {
				if level && !self.chip_select {
					self.selects += 1;
					self.state = State::Idle;
				} else if !level && self.chip_select {
					self.deselect();
				}
				self.chip_select = level;
			},
			Line::Clock => {
				if level && !self.clock && self.chip_select {
					self.rising_clock();
				}
				self.clock = level;
			},
			Line::DataOut => self.data = level,
			Line::DataIn => warn!("simulated EEPROM: host drives {}", line),
		}
	}

	fn read_line(&mut self, line: Line) -> bool {
		if line != Line::DataIn {
			return false;
		}
		match self.state {
			// DO floats while deselected; pulled up
			State::Standby => true,
			State::Idle => !self.is_busy(),
			State::ReadOut { shift, remaining } if remaining > 0 => {
				0 != shift & (1 << (remaining - 1))
			},
			_ => true,
		}
	}

	fn sleep_microseconds(&mut self, us: u32) {
		self.now_us += us as u64;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn select(sim: &mut SimulatedEeprom) {
		sim.write_line(Line::ChipSelect, true);
	}

	fn clock_bits(sim: &mut SimulatedEeprom, word: u32, count: usize) {
		for bit in (0..count).rev() {
			sim.write_line(Line::DataOut, 0 != word & (1 << bit));
			sim.write_line(Line::Clock, true);
			sim.write_line(Line::Clock, false);
		}
	}

	#[test]
	fn read_has_dummy_zero_then_msb_first() {
		let mut words = [0u16; WORDS];
		words[5] = 0b1000_0000_0000_0001;
		let mut sim = SimulatedEeprom::with_words(words);
		select(&mut sim);
		clock_bits(&mut sim, 0x185, 9);
		sim.write_line(Line::DataOut, false);

		let mut bits = Vec::new();
		for _ in 0..17 {
			bits.push(sim.read_line(Line::DataIn));
			sim.write_line(Line::Clock, true);
			sim.write_line(Line::Clock, false);
		}
		assert!(!bits[0]);
		assert!(bits[1]);
		assert!(bits[1..16].iter().skip(1).all(|b| !b));
		assert!(bits[16]);
		assert_eq!(sim.instructions(), &[0x185]);
	}

	#[test]
	fn write_needs_enable_and_is_self_timed() {
		let mut sim = SimulatedEeprom::new();
		sim.set_program_time_us(1_000);

		// disabled: ignored
		select(&mut sim);
		clock_bits(&mut sim, (0x143 << 16) | 0x1234, 25);
		sim.write_line(Line::ChipSelect, false);
		assert_eq!(sim.words()[3], 0xffff);
		assert!(!sim.is_busy());

		select(&mut sim);
		clock_bits(&mut sim, 0x130, 9);
		sim.write_line(Line::ChipSelect, false);
		assert!(sim.is_write_enabled());

		select(&mut sim);
		clock_bits(&mut sim, (0x143 << 16) | 0x1234, 25);
		sim.write_line(Line::ChipSelect, false);
		assert_eq!(sim.words()[3], 0x1234);
		assert!(sim.is_busy());

		select(&mut sim);
		assert!(!sim.read_line(Line::DataIn));
		sim.write_line(Line::ChipSelect, false);
		sim.sleep_microseconds(1_000);
		assert_eq!(sim.elapsed_us(), 1_000);
		select(&mut sim);
		assert!(sim.read_line(Line::DataIn));
	}

	#[test]
	fn write_all_and_erase_all() {
		let mut sim = SimulatedEeprom::new();
		sim.set_program_time_us(0);
		select(&mut sim);
		clock_bits(&mut sim, 0x130, 9);
		sim.write_line(Line::ChipSelect, false);

		select(&mut sim);
		clock_bits(&mut sim, (0x110 << 16) | 0xa5a5, 25);
		sim.write_line(Line::ChipSelect, false);
		assert!(sim.words().iter().all(|w| *w == 0xa5a5));

		select(&mut sim);
		clock_bits(&mut sim, 0x1c7, 9);
		sim.write_line(Line::ChipSelect, false);
		assert_eq!(sim.words()[7], 0xffff);
		assert_eq!(sim.words()[8], 0xa5a5);

		select(&mut sim);
		clock_bits(&mut sim, 0x120, 9);
		sim.write_line(Line::ChipSelect, false);
		assert!(sim.words().iter().all(|w| *w == 0xffff));
	}
}
