use crate::microwire::ADDRESS_LIMIT;

pub const REGISTER_COUNT: usize = ADDRESS_LIMIT;

/// content of an erased cell
pub const ERASED: u16 = 0xffff;

/// Host-side image of the EEPROM: 64 registers, each either unknown
/// ("never read or written this session") or holding a 16-bit word.
///
/// Addresses are checked by the callers; an address >= 64 panics.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct RegisterStore {
	registers: [Option<u16>; REGISTER_COUNT],
}

impl Default for RegisterStore {
	fn default() -> Self {
		RegisterStore {
			registers: [None; REGISTER_COUNT],
		}
	}
}

impl RegisterStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_words(words: &[u16; REGISTER_COUNT]) -> Self {
		let mut store = Self::new();
		for (address, word) in words.iter().enumerate() {
			store.set(address, *word);
		}
		store
	}

	pub fn get(&self, address: usize) -> Option<u16> {
		self.registers[address]
	}

	pub fn set(&mut self, address: usize, value: u16) {
		self.registers[address] = Some(value);
	}

	/// same word in every register (what WRAL does on the device)
	pub fn fill(&mut self, value: u16) {
		self.registers = [Some(value); REGISTER_COUNT];
	}

	pub fn is_populated(&self, address: usize) -> bool {
		self.registers[address].is_some()
	}

	pub fn all_populated(&self) -> bool {
		self.registers.iter().all(Option::is_some)
	}

	pub fn populated_count(&self) -> usize {
		self.registers.iter().filter(|r| r.is_some()).count()
	}

	pub fn iter<'a>(&'a self) -> impl Iterator<Item = (usize, Option<u16>)> + 'a {
		self.registers.iter().cloned().enumerate()
	}

	/// all words, if every register is known
	pub fn words(&self) -> Option<[u16; REGISTER_COUNT]> {
		let mut words = [ERASED; REGISTER_COUNT];
		for (address, value) in self.iter() {
			words[address] = value?;
		}
		Some(words)
	}
}
